//! 섹션 로더
//!
//! ALLOC 섹션을 모듈 슬롯 메모리에 순서대로 배치한다.
//! 주소는 섹션 테이블 순서의 단순 bump 할당이며 정렬은 적용하지 않는다.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use log::debug;

use crate::config::{MAX_SECTIONS, MAX_SECTION_NAMELEN};
use crate::mm::SlotMemory;

use super::elf::{section_type, string_at, Elf32};
use super::loader::ModuleError;

/// 이름으로 구분한 섹션 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// .text
    Text,
    /// .rodata
    ReadOnlyData,
    /// .bss
    Bss,
    /// .data
    Data,
    Other,
}

impl SectionKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            ".text" => SectionKind::Text,
            ".rodata" => SectionKind::ReadOnlyData,
            ".bss" => SectionKind::Bss,
            ".data" => SectionKind::Data,
            _ => SectionKind::Other,
        }
    }
}

/// 로드된 섹션 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRecord {
    /// 섹션 이름 (MAX_SECTION_NAMELEN - 1 바이트까지)
    pub name: String,
    /// 배치된 시작 주소
    pub start: u32,
    pub size: u32,
    /// ELF 섹션 타입
    pub sh_type: u32,
    /// 섹션 이름 문자열 테이블 오프셋
    pub name_offset: u32,
    pub kind: SectionKind,
}

impl SectionRecord {
    pub fn end(&self) -> u32 {
        self.start.wrapping_add(self.size)
    }
}

/// 섹션 배치 결과
#[derive(Debug, Clone)]
pub struct Placement {
    /// 배치 순서대로의 섹션 기록
    pub sections: Vec<SectionRecord>,
    /// 섹션 헤더 인덱스 → 기록 인덱스
    header_map: Vec<Option<usize>>,
    /// 배치된 총 바이트 수
    pub size: u32,
}

impl Placement {
    /// 섹션 헤더 인덱스에 대응하는 로드 섹션
    pub fn record_for_header(&self, shndx: u32) -> Option<&SectionRecord> {
        let idx = (*self.header_map.get(shndx as usize)?)?;
        self.sections.get(idx)
    }

    /// 해당 종류의 첫 섹션
    pub fn find(&self, kind: SectionKind) -> Option<&SectionRecord> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// 해당 종류의 섹션 시작 주소
    pub fn base_of(&self, kind: SectionKind) -> Option<u32> {
        self.find(kind).map(|s| s.start)
    }

    /// 헤더 인덱스로 찾은 섹션 기록 인덱스 (테스트 및 진단용)
    pub fn header_index_of(&self, record: usize) -> Option<usize> {
        self.header_map.iter().position(|&r| r == Some(record))
    }
}

/// 용량 안에서 이름을 자른다 (NUL 자리 제외, 문자 경계 유지)
pub(crate) fn bounded_name(name: &str, capacity: usize) -> String {
    let limit = capacity.saturating_sub(1);
    if name.len() <= limit {
        return String::from(name);
    }
    let mut end = limit;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    String::from(&name[..end])
}

/// 섹션들을 슬롯 메모리에 로드
pub fn place_sections(elf: &Elf32, mem: &mut SlotMemory) -> Result<Placement, ModuleError> {
    let mut sections = Vec::new();
    let mut header_map = vec![None; elf.sections().len()];
    let mut offset = 0u32;

    for (idx, sh) in elf.sections().iter().enumerate() {
        // ALLOC 플래그가 있고 크기가 있는 섹션만
        if !sh.is_alloc() || sh.sh_size == 0 {
            continue;
        }
        if sh.sh_addr != 0 {
            debug!("[module] section {} already placed at {:#x}, skipping", idx, sh.sh_addr);
            continue;
        }

        if sections.len() >= MAX_SECTIONS {
            return Err(ModuleError::CapacityExceeded {
                what: "sections",
                limit: MAX_SECTIONS,
            });
        }

        // 남은 영역 확인 후 복사
        let end = offset as u64 + sh.sh_size as u64;
        if end > mem.capacity() as u64 {
            return Err(ModuleError::CapacityExceeded {
                what: "module region",
                limit: mem.capacity(),
            });
        }

        let addr = mem.base() + offset;
        if sh.sh_type == section_type::SHT_NOBITS {
            mem.zero(addr, sh.sh_size as usize)?;
        } else {
            let data = elf.section_data(idx as u32, sh)?;
            mem.copy_in(addr, data)?;
        }
        offset += sh.sh_size;

        header_map[idx] = Some(sections.len());
        sections.push(SectionRecord {
            name: String::new(),
            start: addr,
            size: sh.sh_size,
            sh_type: sh.sh_type,
            name_offset: sh.sh_name,
            kind: SectionKind::Other,
        });
    }

    // 두 번째 패스: 섹션 이름 해석
    for record in sections.iter_mut() {
        let name = string_at(elf.shstrtab(), record.name_offset)?;
        record.kind = SectionKind::from_name(&name);
        record.name = bounded_name(&name, MAX_SECTION_NAMELEN);
        debug!(
            "[module] Loaded section '{}' ({} bytes) at {:#x}",
            record.name, record.size, record.start
        );
    }

    Ok(Placement {
        sections,
        header_map,
        size: offset,
    })
}
