//! 모듈 데이터 영역
//!
//! 모듈 슬롯마다 고정 크기(기본 한 페이지)의 메모리를 예약한다.
//! 슬롯 i의 주소 공간은 `base + i * slot_size`부터 시작하며,
//! 로더는 주소 기반으로 접근하되 모든 쓰기는 슬롯 경계 안으로 검사된다.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use thiserror::Error;

/// 영역 접근 에러
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("access of {len} bytes at {addr:#x} outside module region")]
    OutOfRange { addr: u32, len: usize },
    #[error("{slot_count} slots of {slot_size:#x} bytes at {base:#x} do not fit the 32-bit address space")]
    InvalidLayout {
        base: u32,
        slot_size: usize,
        slot_count: usize,
    },
}

/// 모든 모듈 슬롯의 예약 메모리
pub struct ModuleRegion {
    /// 슬롯 0의 가상 주소
    base: u32,
    /// 슬롯당 크기
    slot_size: usize,
    slots: Vec<Box<[u8]>>,
}

impl ModuleRegion {
    /// 영역 예약
    ///
    /// 마지막 슬롯의 끝 주소까지 u32로 표현돼야 한다. 이후의 주소 계산은
    /// 이 불변식에 기대므로 넘치지 않는다.
    pub fn new(base: u32, slot_size: usize, slot_count: usize) -> Result<Self, RegionError> {
        let invalid = RegionError::InvalidLayout {
            base,
            slot_size,
            slot_count,
        };
        if slot_size == 0 {
            return Err(invalid);
        }
        let end = (slot_size as u64)
            .checked_mul(slot_count as u64)
            .and_then(|len| len.checked_add(base as u64))
            .ok_or(invalid)?;
        if end > u32::MAX as u64 {
            return Err(invalid);
        }

        let slots = (0..slot_count)
            .map(|_| vec![0u8; slot_size].into_boxed_slice())
            .collect();
        Ok(Self {
            base,
            slot_size,
            slots,
        })
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 슬롯의 시작 주소
    ///
    /// 범위 밖 인덱스는 `None`.
    pub fn slot_base(&self, index: usize) -> Option<u32> {
        if index >= self.slots.len() {
            return None;
        }
        let offset = u32::try_from(index * self.slot_size).ok()?;
        self.base.checked_add(offset)
    }

    /// 슬롯 내용 (읽기 전용)
    pub fn slot_bytes(&self, index: usize) -> &[u8] {
        &self.slots[index]
    }

    /// 슬롯 메모리 핸들
    pub fn slot_mut(&mut self, index: usize) -> Option<SlotMemory<'_>> {
        let base = self.slot_base(index)?;
        Some(SlotMemory {
            base,
            bytes: &mut self.slots[index],
        })
    }
}

/// 한 슬롯의 메모리에 대한 주소 기반 접근자
pub struct SlotMemory<'a> {
    base: u32,
    bytes: &'a mut [u8],
}

impl<'a> SlotMemory<'a> {
    /// 슬롯 시작 주소
    pub fn base(&self) -> u32 {
        self.base
    }

    /// 슬롯 크기
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// 슬롯 끝 주소 (exclusive)
    ///
    /// `ModuleRegion::new`가 끝 주소가 u32 안에 들어오는 슬롯만 만든다.
    pub fn end(&self) -> u32 {
        self.base.saturating_add(self.bytes.len() as u32)
    }

    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>, RegionError> {
        let err = RegionError::OutOfRange { addr, len };
        let start = addr.checked_sub(self.base).ok_or(err)? as usize;
        let end = start.checked_add(len).ok_or(err)?;
        if end > self.bytes.len() {
            return Err(err);
        }
        Ok(start..end)
    }

    /// 데이터 복사
    pub fn copy_in(&mut self, addr: u32, data: &[u8]) -> Result<(), RegionError> {
        let range = self.range(addr, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// 0으로 채우기
    pub fn zero(&mut self, addr: u32, len: usize) -> Result<(), RegionError> {
        let range = self.range(addr, len)?;
        self.bytes[range].fill(0);
        Ok(())
    }

    /// 주소 범위의 바이트
    pub fn bytes(&self, addr: u32, len: usize) -> Result<&[u8], RegionError> {
        let range = self.range(addr, len)?;
        Ok(&self.bytes[range])
    }

    #[cfg(test)]
    pub fn read_u32(&self, addr: u32) -> Result<u32, RegionError> {
        let b = self.bytes(addr, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// 32비트 리틀 엔디안 쓰기
    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), RegionError> {
        self.copy_in(addr, &value.to_le_bytes())
    }

    /// 슬롯 전체를 0으로
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }
}
