//! 모듈 로더
//!
//! ELF32 i386 relocatable object (.o) 링크 파이프라인
//! - 섹션 로딩 (슬롯 메모리에 bump 배치)
//! - 심볼 해석 및 공개 후보 수집
//! - 재배치 처리 (R_386_32, R_386_PC32)
//!
//! 여기서는 메모리와 기록만 만든다. 슬롯 할당, 진입 함수 호출,
//! 전역 심볼 커밋은 레지스트리가 맡는다.

use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, info};
use thiserror::Error;

use crate::mm::{RegionError, SlotMemory};

use super::elf::{Elf32, ElfError};
use super::reloc::{apply_relocations, RelocationRecord};
use super::resolve::{resolve_symbols, StagedSymbols, SymbolRecord};
use super::section::{place_sections, SectionKind, SectionRecord};
use super::symbol::SymbolTable;

// ============================================================================
// 모듈 에러 및 상태
// ============================================================================

/// 모듈 에러
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// ELF 포맷 에러
    #[error("invalid module image: {0}")]
    Format(#[from] ElfError),
    /// 이미 같은 이름의 모듈이 활성 상태
    #[error("module '{0}' is already loaded")]
    DuplicateName(String),
    /// 빈 슬롯 없음
    #[error("no free module slot")]
    OutOfSlots,
    /// 모듈을 찾을 수 없음
    #[error("module '{0}' not found")]
    NotFound(String),
    /// 고정 용량 초과
    #[error("too many {what} (limit {limit})")]
    CapacityExceeded { what: &'static str, limit: usize },
    /// 재배치 대상 심볼 없음
    #[error("unresolved symbol '{0}'")]
    UnresolvedSymbol(String),
    /// 지원하지 않는 재배치 타입
    #[error("unsupported relocation type {0}")]
    UnsupportedRelocation(u8),
    /// 패치 위치가 .text 밖
    #[error("relocation at .text+{offset:#x} out of range")]
    RelocationOutOfRange { offset: u32 },
    /// .rodata 문자열이 NUL로 끝나지 않음
    #[error("unterminated .rodata string at {0:#x}")]
    MalformedReadOnlyData(u32),
    /// COMMON 심볼 정렬값이 0
    #[error("common symbol '{0}' has zero alignment")]
    BadCommonAlignment(String),
    /// init_module 없음
    #[error("module has no init_module")]
    MissingEntry,
    /// 초기화 함수 실패
    #[error("init_module returned {0}")]
    InitFailed(i32),
    /// 잘못된 모듈 이름
    #[error("invalid module name")]
    InvalidName,
    /// 범위를 벗어난 슬롯 번호
    #[error("module slot {0} out of range")]
    InvalidSlot(usize),
    /// 슬롯 메모리 접근 실패
    #[error(transparent)]
    Region(#[from] RegionError),
}

/// 모듈 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// 슬롯 할당 후 링크 중
    Initializing,
    /// 활성 상태
    Active,
}

// ============================================================================
// 링크 결과
// ============================================================================

/// 슬롯 메모리에 링크된 모듈 (아직 활성화 전)
#[derive(Debug, Clone)]
pub struct LinkedModule {
    pub sections: Vec<SectionRecord>,
    pub symbols: Vec<SymbolRecord>,
    pub relocations: Vec<RelocationRecord>,
    /// 로드된 섹션 총 크기
    pub size: u32,
    /// init_module 주소
    pub entry: u32,
    /// cleanup_module 주소
    pub teardown: Option<u32>,
    /// 커밋 대기 중인 공개 심볼
    pub exports: StagedSymbols,
}

/// Relocatable object를 슬롯 메모리에 링크
///
/// 실패하면 슬롯 메모리는 일부만 채워져 있을 수 있으므로 호출자가 지운다.
/// `global`은 조회만 하며 수정하지 않는다.
pub fn link_object(
    elf: &Elf32,
    mem: &mut SlotMemory,
    global: &dyn SymbolTable,
) -> Result<LinkedModule, ModuleError> {
    // 섹션 로드 및 주소 매핑
    let placement = place_sections(elf, mem)?;
    info!(
        "[module] Loaded {} sections ({} bytes) at {:#x}",
        placement.sections.len(),
        placement.size,
        mem.base()
    );

    // 심볼 해석
    let symtab = elf.symbol_table()?;
    let resolution = resolve_symbols(
        &symtab,
        &placement,
        mem.base() + placement.size,
        mem.end(),
    )?;
    let entry = resolution.entry.ok_or(ModuleError::MissingEntry)?;
    debug!("[module] Found init_module at {:#x}", entry);
    if let Some(teardown) = resolution.teardown {
        debug!("[module] Found cleanup_module at {:#x}", teardown);
    }

    // 재배치 적용 (모듈 자신의 심볼 먼저)
    let text_header = placement
        .sections
        .iter()
        .position(|s| s.kind == SectionKind::Text)
        .and_then(|idx| placement.header_index_of(idx))
        .map(|idx| idx as u32);
    let staged = &resolution.staged;
    let lookup = |name: &str| staged.resolve(name, global);
    let relocations = match elf.text_relocations(text_header)? {
        Some(rels) => apply_relocations(&rels, &symtab, &placement, mem, &lookup)?,
        None => Vec::new(),
    };
    debug!("[module] Applied {} relocations", relocations.len());

    Ok(LinkedModule {
        sections: placement.sections,
        symbols: resolution.symbols,
        relocations,
        size: placement.size,
        entry,
        teardown: resolution.teardown,
        exports: resolution.staged,
    })
}
