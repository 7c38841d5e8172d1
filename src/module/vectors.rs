//! 모듈 기능 벡터
//!
//! 모듈이 활성화된 뒤 커널에 노출하는 호출 가능한 진입점 표.
//! 종류는 닫힌 집합이며 슬롯마다 하나의 호출자를 가진다.

use alloc::sync::Arc;
use core::fmt;

/// 기능 종류 (숫자 값은 시스템 콜 ABI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CapabilityKind {
    /// 시스템 콜 기록 출력
    ShowSyscall = 0,
    /// 시스템 콜 횟수 집계
    CountSyscall = 1,
    /// 현재 시각 출력
    ShowTime = 2,
    /// 로드 직후 한 번 호출되는 디버그 훅
    TestApi = 3,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::ShowSyscall,
        CapabilityKind::CountSyscall,
        CapabilityKind::ShowTime,
        CapabilityKind::TestApi,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for CapabilityKind {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CapabilityKind::ShowSyscall),
            1 => Ok(CapabilityKind::CountSyscall),
            2 => Ok(CapabilityKind::ShowTime),
            3 => Ok(CapabilityKind::TestApi),
            other => Err(other),
        }
    }
}

/// 모듈이 등록하는 호출자
pub type Capability = Arc<dyn Fn() -> i32 + Send + Sync>;

/// 슬롯별 기능 벡터 표
#[derive(Clone, Default)]
pub struct CapabilityVectorTable {
    slots: [Option<Capability>; 4],
}

impl CapabilityVectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 등록 (마지막 등록이 이긴다)
    pub fn register(&mut self, kind: CapabilityKind, capability: Capability) {
        self.slots[kind.index()] = Some(capability);
    }

    pub fn get(&self, kind: CapabilityKind) -> Option<Capability> {
        self.slots[kind.index()].clone()
    }

    pub fn is_registered(&self, kind: CapabilityKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// 모든 슬롯 비우기
    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}

impl fmt::Debug for CapabilityVectorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for kind in CapabilityKind::ALL {
            if self.is_registered(kind) {
                list.entry(&kind);
            }
        }
        list.finish()
    }
}
