//! i386 재배치 처리
//!
//! `.rel.text`의 각 엔트리를 기록하고 로드된 `.text`를 패치한다.
//! 모든 쓰기는 `text_base + offset` 위치의 32비트 리틀 엔디안 값이다.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;

use log::debug;

use crate::config::{MAX_REL_ENTRIES, MAX_SYM_NAMELEN};
use crate::mm::SlotMemory;

use super::elf::{reloc_i386, RelTable, SymTab};
use super::loader::ModuleError;
use super::section::{bounded_name, Placement, SectionKind};

/// 지원하는 재배치 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    /// R_386_NONE
    None,
    /// R_386_32: S
    Absolute32,
    /// R_386_PC32: S - P
    PcRelative32,
}

impl TryFrom<u8> for RelocationKind {
    type Error = ModuleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            reloc_i386::R_386_NONE => Ok(RelocationKind::None),
            reloc_i386::R_386_32 => Ok(RelocationKind::Absolute32),
            reloc_i386::R_386_PC32 => Ok(RelocationKind::PcRelative32),
            other => Err(ModuleError::UnsupportedRelocation(other)),
        }
    }
}

/// 재배치 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationRecord {
    /// 참조 심볼 이름 (빈 문자열이면 섹션 상대 참조)
    pub name: String,
    pub kind: RelocationKind,
    /// .text 내 패치 오프셋
    pub offset: u32,
}

/// 섹션 상대 참조용 커서
///
/// .rodata는 NUL로 끝나는 문자열이 재배치 순서대로 놓여 있다고 가정한다.
struct Cursors {
    rodata: u32,
    rodata_end: u32,
    data: u32,
    bss: u32,
}

impl Cursors {
    fn new(placement: &Placement) -> Self {
        let rodata = placement.find(SectionKind::ReadOnlyData);
        Self {
            rodata: rodata.map(|s| s.start).unwrap_or(0),
            rodata_end: rodata.map(|s| s.end()).unwrap_or(0),
            data: placement.base_of(SectionKind::Data).unwrap_or(0),
            bss: placement.base_of(SectionKind::Bss).unwrap_or(0),
        }
    }

    /// 현재 문자열 주소를 돌려주고 다음 문자열로 이동
    fn next_string(&mut self, mem: &SlotMemory) -> Result<u32, ModuleError> {
        let at = self.rodata;
        let remaining = self.rodata_end.saturating_sub(at) as usize;
        let run = mem.bytes(at, remaining)?;
        let len = run
            .iter()
            .position(|&b| b == 0)
            .ok_or(ModuleError::MalformedReadOnlyData(at))?;
        self.rodata = at + len as u32 + 1;
        Ok(at)
    }
}

/// 재배치 적용
///
/// `lookup`은 이름 있는 심볼의 주소를 찾는다 (모듈 자신의 공개 심볼 포함).
pub fn apply_relocations(
    rels: &RelTable,
    symtab: &SymTab,
    placement: &Placement,
    mem: &mut SlotMemory,
    lookup: &dyn Fn(&str) -> Option<u32>,
) -> Result<Vec<RelocationRecord>, ModuleError> {
    if rels.len() > MAX_REL_ENTRIES {
        return Err(ModuleError::CapacityExceeded {
            what: "relocations",
            limit: MAX_REL_ENTRIES,
        });
    }

    let text = placement.find(SectionKind::Text);
    let text_base = text.map(|s| s.start).unwrap_or(0);
    let text_size = text.map(|s| s.size).unwrap_or(0);
    let mut cursors = Cursors::new(placement);
    let mut records = Vec::with_capacity(rels.len());

    for rel in rels.iter() {
        let sym = symtab.get(rel.symbol())?;
        let name = symtab.name(&sym)?;
        let kind = RelocationKind::try_from(rel.rel_type())?;
        let offset = rel.r_offset;
        // 치환된 이름은 어떤 심볼과도 일치하지 않는다
        let resolve = || match &name {
            Cow::Borrowed(exact) => lookup(*exact),
            Cow::Owned(_) => None,
        };
        let unresolved = || ModuleError::UnresolvedSymbol(name.clone().into_owned());

        records.push(RelocationRecord {
            name: bounded_name(&name, MAX_SYM_NAMELEN),
            kind,
            offset,
        });

        if kind == RelocationKind::None {
            continue;
        }
        if text.is_none() || offset as u64 + 4 > text_size as u64 {
            return Err(ModuleError::RelocationOutOfRange { offset });
        }
        let site = text_base + offset;

        let value = match kind {
            RelocationKind::Absolute32 if name.is_empty() => {
                // 심볼이 속한 섹션으로 대상 결정
                let target = placement
                    .record_for_header(sym.st_shndx as u32)
                    .map(|s| s.kind);
                match target {
                    Some(SectionKind::ReadOnlyData) => cursors.next_string(mem)?,
                    Some(SectionKind::Bss) => cursors.bss,
                    Some(SectionKind::Data) => {
                        let at = cursors.data;
                        cursors.data = at.wrapping_add(sym.st_size);
                        at
                    }
                    _ => return Err(ModuleError::UnsupportedRelocation(rel.rel_type())),
                }
            }
            RelocationKind::Absolute32 => resolve().ok_or_else(unresolved)?,
            RelocationKind::PcRelative32 => {
                resolve().ok_or_else(unresolved)?.wrapping_sub(site.wrapping_add(4))
            }
            RelocationKind::None => continue,
        };

        debug!(
            "[module] reloc {:?} '{}' at +{:#x} <- {:#x}",
            kind, name, offset, value
        );
        mem.write_u32(site, value)?;
    }

    Ok(records)
}
