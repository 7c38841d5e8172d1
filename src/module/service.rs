//! 모듈 서비스
//!
//! 레지스트리와 전역 심볼 테이블을 하나의 잠금 아래 묶은 단일 핸들.
//! load/unload 한 번이 잠금 하나 안에서 끝나므로 반쯤 로드된 모듈은
//! 다른 호출자에게 보이지 않는다.
//!
//! 기능 호출은 잠금 밖에서 한다. 호출자는 잠금 안에서 복제하고
//! 잠금을 푼 뒤 실행되므로, 기능이 다른 모듈의 로드와 겹쳐도 된다.
//!
//! init_module/cleanup_module은 잠금을 쥔 채 실행된다. 그 안에서 들어오는
//! 기능 등록은 대기열에 쌓였다가 루틴이 돌아오는 즉시 반영된다.

use alloc::vec::Vec;

use log::{debug, warn};
use spin::{Mutex, MutexGuard};

use crate::config::{LoaderConfig, MAX_MODULES};

use super::loader::ModuleError;
use super::registry::{ModuleInfo, ModuleListing, ModuleRegistry, RoutineInvoker};
use super::symbol::{KernelSymbolTable, SymbolTable};
use super::vectors::{Capability, CapabilityKind, CapabilityVectorTable};

/// 시스템 콜 기록/집계 테스트 모듈
pub const SYSCALL_TEST_MODULE: &str = "testmod_syscall.o";
/// 시각 출력 테스트 모듈
pub const SHOW_TIME_TEST_MODULE: &str = "testmod_showtime.o";

struct ServiceState {
    registry: ModuleRegistry,
    symbols: KernelSymbolTable,
}

/// 아직 레지스트리에 반영되지 않은 기능 등록
type PendingRegistration = (usize, CapabilityKind, Capability);

/// 모듈 서비스
pub struct ModuleService {
    state: Mutex<ServiceState>,
    /// 상태 잠금 없이 받은 등록. 잠금 순서는 항상 state → pending.
    pending: Mutex<Vec<PendingRegistration>>,
}

/// 루틴이 돌아오면 그 슬롯 앞으로 쌓인 등록을 벡터 표에 옮긴다
///
/// 반영은 레지스트리가 루틴 결과를 보기 전에 끝나므로 init 실패 롤백이
/// 이 등록까지 함께 지운다.
struct DrainingInvoker<'a> {
    inner: &'a mut dyn RoutineInvoker,
    pending: &'a Mutex<Vec<PendingRegistration>>,
}

impl RoutineInvoker for DrainingInvoker<'_> {
    fn call_routine(&mut self, address: u32, slot: usize, vectors: &mut CapabilityVectorTable) -> i32 {
        let code = self.inner.call_routine(address, slot, vectors);
        self.pending.lock().retain(|(target, kind, capability)| {
            if *target != slot {
                return true;
            }
            vectors.register(*kind, capability.clone());
            false
        });
        code
    }
}

impl ModuleService {
    pub fn new(config: LoaderConfig) -> Result<Self, ModuleError> {
        Self::with_symbols(config, KernelSymbolTable::new())
    }

    /// 커널 심볼이 미리 등록된 테이블로 생성
    pub fn with_symbols(config: LoaderConfig, symbols: KernelSymbolTable) -> Result<Self, ModuleError> {
        Ok(Self {
            state: Mutex::new(ServiceState {
                registry: ModuleRegistry::new(config)?,
                symbols,
            }),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// 상태 잠금 (대기 중인 등록을 먼저 반영)
    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        let mut state = self.state.lock();
        Self::apply_pending(&mut state, &self.pending);
        state
    }

    fn apply_pending(state: &mut ServiceState, pending: &Mutex<Vec<PendingRegistration>>) {
        for (slot, kind, capability) in pending.lock().drain(..) {
            // 슬롯 범위는 대기열에 넣을 때 확인했다
            if let Err(e) = state.registry.register_capability(slot, kind, capability) {
                warn!("[module] dropped pending registration: {}", e);
            }
        }
    }

    /// 모듈 로드
    ///
    /// init_module 안에서 `register_capability*`를 불러도 된다.
    pub fn load(
        &self,
        name: &str,
        image: &[u8],
        invoker: &mut dyn RoutineInvoker,
    ) -> Result<usize, ModuleError> {
        let (slot, hook) = {
            let mut state = self.lock();
            let ServiceState { registry, symbols } = &mut *state;
            let mut invoker = DrainingInvoker {
                inner: invoker,
                pending: &self.pending,
            };
            let slot = registry.load(name, image, symbols, &mut invoker)?;
            (slot, registry.slot_capability(slot, CapabilityKind::TestApi))
        };

        // 디버그 훅
        if let Some(hook) = hook {
            let ret = hook();
            debug!("[module] test_api of {} returned {}", name, ret);
        }
        Ok(slot)
    }

    /// 모듈 언로드
    pub fn unload(&self, name: &str, invoker: &mut dyn RoutineInvoker) -> Result<(), ModuleError> {
        let mut state = self.lock();
        let ServiceState { registry, symbols } = &mut *state;
        let mut invoker = DrainingInvoker {
            inner: invoker,
            pending: &self.pending,
        };
        registry.unload(name, symbols, &mut invoker)
    }

    pub fn list(&self) -> Vec<ModuleInfo> {
        self.lock().registry.list()
    }

    pub fn listing(&self) -> ModuleListing {
        self.lock().registry.listing()
    }

    pub fn info(&self, name: &str) -> Option<ModuleInfo> {
        self.lock().registry.info(name)
    }

    pub fn module_count(&self) -> usize {
        self.lock().registry.module_count()
    }

    pub fn bitmap(&self) -> u16 {
        self.lock().registry.bitmap()
    }

    /// 기능 등록
    ///
    /// 상태 잠금을 기다리지 않는다. 다른 호출(모듈 루틴 포함)이 잠금을
    /// 쥐고 있으면 대기열에 남고, 루틴 복귀나 다음 잠금 때 반영된다.
    pub fn register_capability(
        &self,
        slot: usize,
        kind: CapabilityKind,
        capability: Capability,
    ) -> Result<(), ModuleError> {
        if slot >= MAX_MODULES {
            return Err(ModuleError::InvalidSlot(slot));
        }
        self.pending.lock().push((slot, kind, capability));
        if let Some(mut state) = self.state.try_lock() {
            Self::apply_pending(&mut state, &self.pending);
        }
        Ok(())
    }

    /// 숫자 종류로 기능 등록 (시스템 콜 경로)
    ///
    /// 알 수 없는 종류는 무시한다.
    pub fn register_capability_raw(
        &self,
        slot: usize,
        kind: u32,
        capability: Capability,
    ) -> Result<(), ModuleError> {
        match CapabilityKind::try_from(kind) {
            Ok(kind) => self.register_capability(slot, kind, capability),
            Err(kind) => {
                warn!("[module] module {} registered unknown vector type {}", slot, kind);
                Ok(())
            }
        }
    }

    /// 이름으로 찾은 모듈의 기능 호출
    ///
    /// 등록되지 않은 기능이면 아무것도 하지 않고 `Ok(None)`.
    pub fn invoke_capability(&self, name: &str, kind: CapabilityKind) -> Result<Option<i32>, ModuleError> {
        let capability = self.lock().registry.capability(name, kind)?;
        Ok(capability.map(|cap| cap()))
    }

    /// 시스템 콜 집계 기능 호출
    pub fn invoke_count_syscall(&self) -> Option<i32> {
        self.invoke_if_loaded(SYSCALL_TEST_MODULE, CapabilityKind::CountSyscall)
    }

    /// 시스템 콜 기록 출력 기능 호출
    pub fn invoke_show_syscall(&self) -> Option<i32> {
        self.invoke_if_loaded(SYSCALL_TEST_MODULE, CapabilityKind::ShowSyscall)
    }

    /// 시각 출력 기능 호출
    pub fn invoke_show_time(&self) -> Option<i32> {
        self.invoke_if_loaded(SHOW_TIME_TEST_MODULE, CapabilityKind::ShowTime)
    }

    /// 커널 심볼 등록
    pub fn insert_symbol(&self, name: &str, address: u32) {
        self.lock().symbols.insert(name, address);
    }

    pub fn lookup_symbol(&self, name: &str) -> Option<u32> {
        self.lock().symbols.lookup(name)
    }

    /// 레지스트리 읽기 접근
    pub fn with_registry<R>(&self, f: impl FnOnce(&ModuleRegistry) -> R) -> R {
        f(&self.lock().registry)
    }

    fn invoke_if_loaded(&self, module: &str, kind: CapabilityKind) -> Option<i32> {
        // 모듈이 없으면 할 수 있는 일이 없다
        self.invoke_capability(module, kind).ok().flatten()
    }
}
