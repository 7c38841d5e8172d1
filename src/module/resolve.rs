//! 심볼 해석
//!
//! 모듈 심볼 테이블을 순회하며 각 심볼의 최종 주소를 계산하고,
//! 함수/데이터 심볼을 전역 심볼 테이블에 공개할 후보로 모은다.
//! 공개는 로드가 끝까지 성공한 뒤에만 커밋된다.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, warn};

use crate::config::{MAX_SYM_NAMELEN, MAX_SYM_TABLE_SIZE};

use super::elf::{section_index, symbol_type, SymTab};
use super::loader::ModuleError;
use super::section::{bounded_name, Placement, SectionKind};
use super::symbol::SymbolTable;

/// 모듈 진입 함수 이름
pub const ENTRY_SYMBOL: &str = "init_module";
/// 모듈 정리 함수 이름
pub const TEARDOWN_SYMBOL: &str = "cleanup_module";

/// 모듈 심볼 기록 (원본 심볼 테이블과 같은 인덱스)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    /// 심볼 이름 (MAX_SYM_NAMELEN - 1 바이트까지)
    pub name: String,
    /// 해석된 주소
    pub address: u32,
}

/// 커밋 전 공개 심볼
///
/// 재배치 단계는 여기서 먼저 찾고 없으면 전역 테이블을 본다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedSymbols {
    entries: Vec<(String, u32)>,
}

impl StagedSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// 등록 (같은 이름은 교체)
    pub fn insert(&mut self, name: &str, address: u32) {
        if let Some(pos) = self.entries.iter().position(|(n, _)| n == name) {
            self.entries[pos].1 = address;
        } else {
            self.entries.push((String::from(name), address));
        }
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, a)| *a)
    }

    /// 스테이징 → 전역 테이블 → 없음 순으로 조회
    pub fn resolve(&self, name: &str, global: &dyn SymbolTable) -> Option<u32> {
        self.lookup(name).or_else(|| global.lookup(name))
    }

    /// 전역 테이블에 반영
    pub fn commit(&self, global: &mut dyn SymbolTable) {
        for (name, address) in &self.entries {
            global.insert(name, *address);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, u32)> {
        self.entries
    }
}

/// 심볼 해석 결과
#[derive(Debug, Clone)]
pub struct Resolution {
    /// 심볼 테이블과 같은 순서의 기록
    pub symbols: Vec<SymbolRecord>,
    /// 공개 대기 중인 심볼
    pub staged: StagedSymbols,
    /// init_module 주소
    pub entry: Option<u32>,
    /// cleanup_module 주소
    pub teardown: Option<u32>,
    /// COMMON 블록 워터마크 최종값
    pub common_end: u32,
}

/// 심볼 해석
///
/// `common_start`는 로드된 내용 바로 다음 주소, `region_end`는 슬롯 끝이다.
pub fn resolve_symbols(
    symtab: &SymTab,
    placement: &Placement,
    common_start: u32,
    region_end: u32,
) -> Result<Resolution, ModuleError> {
    if symtab.len() > MAX_SYM_TABLE_SIZE {
        return Err(ModuleError::CapacityExceeded {
            what: "symbols",
            limit: MAX_SYM_TABLE_SIZE,
        });
    }

    // 섹션이 없으면 0을 기준 주소로 쓴다 (참조될 때만 의미가 있음)
    let text_base = placement.base_of(SectionKind::Text).unwrap_or(0);
    let bss_base = placement.base_of(SectionKind::Bss).unwrap_or(0);
    let data_base = placement.base_of(SectionKind::Data).unwrap_or(0);

    let mut symbols = Vec::with_capacity(symtab.len());
    let mut staged = StagedSymbols::new();
    let mut entry = None;
    let mut teardown = None;
    let mut watermark = common_start;

    for sym in symtab.iter() {
        let sym = sym?;
        let name = symtab.name(&sym)?;
        let mut address = sym.st_value;
        let mut publish = false;

        match sym.sym_type() {
            symbol_type::STT_FUNC => {
                address = text_base.wrapping_add(sym.st_value);
                publish = true;
            }
            symbol_type::STT_OBJECT if sym.st_shndx == section_index::SHN_COMMON => {
                // value는 주소가 아니라 정렬값. 이미 정렬돼 있어도 한 단위 전진한다.
                let align = sym.st_value;
                if align == 0 {
                    return Err(ModuleError::BadCommonAlignment(name.into_owned()));
                }
                let overflow = ModuleError::CapacityExceeded {
                    what: "common block",
                    limit: region_end.saturating_sub(common_start) as usize,
                };
                watermark = (watermark - watermark % align)
                    .checked_add(align)
                    .ok_or_else(|| overflow.clone())?;
                if watermark as u64 + sym.st_size as u64 > region_end as u64 {
                    return Err(overflow);
                }
                address = watermark;
                publish = true;
                watermark += sym.st_size;
            }
            symbol_type::STT_OBJECT => {
                let home = placement
                    .record_for_header(sym.st_shndx as u32)
                    .map(|s| s.kind);
                match home {
                    Some(SectionKind::Bss) => {
                        address = bss_base.wrapping_add(sym.st_value);
                        publish = true;
                    }
                    Some(SectionKind::Data) => {
                        address = data_base.wrapping_add(sym.st_value);
                        publish = true;
                    }
                    _ => {}
                }
            }
            _ => {}
        }

        if publish {
            match &name {
                Cow::Borrowed(exact) => staged.insert(exact, address),
                Cow::Owned(lossy) => warn!("[module] symbol '{}' is not UTF-8, not exported", lossy),
            }
        }

        // 진입/정리 함수는 심볼 타입과 무관하게 이름으로 찾는다
        if name == ENTRY_SYMBOL {
            entry = Some(text_base.wrapping_add(sym.st_value));
        } else if name == TEARDOWN_SYMBOL {
            teardown = Some(text_base.wrapping_add(sym.st_value));
        }

        if !name.is_empty() {
            debug!("[module] symbol '{}' -> {:#x}", name, address);
        }
        symbols.push(SymbolRecord {
            name: bounded_name(&name, MAX_SYM_NAMELEN),
            address,
        });
    }

    Ok(Resolution {
        symbols,
        staged,
        entry,
        teardown,
        common_end: watermark,
    })
}
