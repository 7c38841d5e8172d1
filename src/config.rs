//! 모듈 로더 설정
//!
//! 고정 용량 상수와 메모리 배치 설정을 한곳에 모은다.
//! 용량을 넘는 입력은 잘라내지 않고 로드 실패로 처리한다.

use crate::mm::PAGE_SIZE;

/// 동시에 로드 가능한 모듈 수 (슬롯 비트맵 폭)
pub const MAX_MODULES: usize = 16;
/// 모듈 이름 최대 길이 (NUL 포함)
pub const MAX_MODULE_NAMELEN: usize = 32;
/// 섹션 이름 기록 길이 (NUL 포함)
pub const MAX_SECTION_NAMELEN: usize = 16;
/// 심볼 이름 기록 길이 (NUL 포함)
pub const MAX_SYM_NAMELEN: usize = 16;
/// 모듈당 기록 가능한 로드 섹션 수
pub const MAX_SECTIONS: usize = 10;
/// 모듈당 재배치 엔트리 수
pub const MAX_REL_ENTRIES: usize = 100;
/// 모듈당 심볼 테이블 엔트리 수
pub const MAX_SYM_TABLE_SIZE: usize = 100;

/// 모듈 데이터 영역 기본 주소 (슬롯 0)
pub const MODULE_DATA_BASE: u32 = 0xef00_0000;

/// 모듈 로더 설정
///
/// 값 검사는 `ModuleRegistry::new`에서 한다. 마지막 슬롯의 끝 주소가
/// u32 범위를 넘거나 슬롯 크기가 0이면 거부된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// 슬롯 0의 가상 주소. 슬롯 i는 `module_data_base + i * region_size`
    pub module_data_base: u32,
    /// 슬롯당 예약 영역 크기
    pub region_size: usize,
}

impl LoaderConfig {
    pub const fn new(module_data_base: u32) -> Self {
        Self {
            module_data_base,
            region_size: PAGE_SIZE,
        }
    }

    pub const fn with_region_size(mut self, region_size: usize) -> Self {
        self.region_size = region_size;
        self
    }

    /// 전체 모듈 영역의 끝 주소 (exclusive)
    pub fn region_end(&self) -> u64 {
        let span = (self.region_size as u64).saturating_mul(MAX_MODULES as u64);
        (self.module_data_base as u64).saturating_add(span)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new(MODULE_DATA_BASE)
    }
}
