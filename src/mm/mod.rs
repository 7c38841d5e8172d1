//! Memory Management
//!
//! 모듈 로더가 사용하는 메모리 영역
//! - 페이지 크기 상수
//! - 모듈 슬롯별 예약 영역 (페이지 단위)

pub mod region;

pub use region::{ModuleRegion, RegionError, SlotMemory};

/// 페이지 크기: 4KB
pub const PAGE_SIZE: usize = 4096;
