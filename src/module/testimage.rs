//! 테스트용 ELF32 relocatable 이미지 빌더
//!
//! 툴체인 없이 i386 .o 파일을 바이트 단위로 조립한다.
//! 레이아웃: ELF 헤더 | 섹션 내용 | 섹션 헤더 테이블 (파일 끝)

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::elf::{section_index, section_type, symbol_type, SectionFlags, ELF32_HEADER_SIZE};

const STB_LOCAL: u8 = 0;
const STB_GLOBAL: u8 = 1;

/// 심볼이 속한 섹션
#[derive(Debug, Clone, Copy)]
pub enum SymSection {
    Undef,
    Common,
    Abs,
    Named(&'static str),
}

/// 심볼 명세
#[derive(Debug, Clone)]
pub struct SymbolSpec {
    /// strtab에 그대로 들어가는 이름 바이트
    pub name: Vec<u8>,
    pub value: u32,
    pub size: u32,
    pub sym_type: u8,
    pub bind: u8,
    pub section: SymSection,
}

impl SymbolSpec {
    /// .text 내 함수
    pub fn func(name: &str, value: u32) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            value,
            size: 0,
            sym_type: symbol_type::STT_FUNC,
            bind: STB_GLOBAL,
            section: SymSection::Named(".text"),
        }
    }

    /// 초기화된/0 초기화 데이터 객체
    pub fn object(name: &str, section: &'static str, value: u32, size: u32) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            value,
            size,
            sym_type: symbol_type::STT_OBJECT,
            bind: STB_GLOBAL,
            section: SymSection::Named(section),
        }
    }

    /// COMMON 심볼 (value = 정렬값)
    pub fn common(name: &str, align: u32, size: u32) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            value: align,
            size,
            sym_type: symbol_type::STT_OBJECT,
            bind: STB_GLOBAL,
            section: SymSection::Common,
        }
    }

    /// 외부 (미정의) 심볼
    pub fn undefined(name: &str) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            value: 0,
            size: 0,
            sym_type: symbol_type::STT_NOTYPE,
            bind: STB_GLOBAL,
            section: SymSection::Undef,
        }
    }

    /// 섹션 심볼 (이름 없음)
    pub fn section(section: &'static str) -> Self {
        Self {
            name: Vec::new(),
            value: 0,
            size: 0,
            sym_type: symbol_type::STT_SECTION,
            bind: STB_LOCAL,
            section: SymSection::Named(section),
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn with_type(mut self, sym_type: u8) -> Self {
        self.sym_type = sym_type;
        self
    }

    /// UTF-8이 아닌 이름 등 임의 바이트 이름
    pub fn with_raw_name(mut self, name: &[u8]) -> Self {
        self.name = name.to_vec();
        self
    }
}

/// 재배치가 참조하는 심볼
#[derive(Debug, Clone, Copy)]
pub enum SymRef {
    /// 이름으로 찾음 (없으면 미정의 심볼 추가)
    Name(&'static str),
    /// 바이트 이름으로 찾음
    Raw(&'static [u8]),
    /// 해당 섹션의 섹션 심볼 (없으면 추가)
    Section(&'static str),
}

struct RelSpec {
    offset: u32,
    kind: u8,
    target: SymRef,
}

struct SectionSpec {
    name: String,
    sh_type: u32,
    flags: u32,
    data: Vec<u8>,
    size: u32,
}

/// ELF32 이미지 빌더
pub struct ImageBuilder {
    sections: Vec<SectionSpec>,
    symbols: Vec<SymbolSpec>,
    rels: Vec<RelSpec>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
            symbols: Vec::new(),
            rels: Vec::new(),
        }
    }

    pub fn section(mut self, name: &str, sh_type: u32, flags: SectionFlags, data: &[u8]) -> Self {
        self.sections.push(SectionSpec {
            name: String::from(name),
            sh_type,
            flags: flags.bits(),
            data: data.to_vec(),
            size: data.len() as u32,
        });
        self
    }

    pub fn text(self, code: &[u8]) -> Self {
        self.section(
            ".text",
            section_type::SHT_PROGBITS,
            SectionFlags::ALLOC | SectionFlags::EXECINSTR,
            code,
        )
    }

    pub fn rodata(self, bytes: &[u8]) -> Self {
        self.section(".rodata", section_type::SHT_PROGBITS, SectionFlags::ALLOC, bytes)
    }

    pub fn data(self, bytes: &[u8]) -> Self {
        self.section(
            ".data",
            section_type::SHT_PROGBITS,
            SectionFlags::ALLOC | SectionFlags::WRITE,
            bytes,
        )
    }

    pub fn bss(mut self, size: u32) -> Self {
        self.sections.push(SectionSpec {
            name: String::from(".bss"),
            sh_type: section_type::SHT_NOBITS,
            flags: (SectionFlags::ALLOC | SectionFlags::WRITE).bits(),
            data: Vec::new(),
            size,
        });
        self
    }

    pub fn symbol(mut self, spec: SymbolSpec) -> Self {
        self.symbols.push(spec);
        self
    }

    pub fn rel(mut self, offset: u32, kind: u8, target: SymRef) -> Self {
        self.rels.push(RelSpec { offset, kind, target });
        self
    }

    fn section_number(&self, name: &str) -> u16 {
        let pos = self
            .sections
            .iter()
            .position(|s| s.name == name)
            .unwrap_or_else(|| panic!("test image has no section {}", name));
        (pos + 1) as u16
    }

    fn symbol_number(&mut self, target: SymRef) -> u32 {
        let pos = match target {
            SymRef::Name(name) => self.symbols.iter().position(|s| s.name == name.as_bytes()),
            SymRef::Raw(name) => self.symbols.iter().position(|s| s.name == name),
            SymRef::Section(sec) => self.symbols.iter().position(|s| {
                s.sym_type == symbol_type::STT_SECTION
                    && matches!(s.section, SymSection::Named(n) if n == sec)
            }),
        };
        let pos = pos.unwrap_or_else(|| {
            self.symbols.push(match target {
                SymRef::Name(name) => SymbolSpec::undefined(name),
                SymRef::Raw(name) => SymbolSpec::undefined("").with_raw_name(name),
                SymRef::Section(sec) => SymbolSpec::section(sec),
            });
            self.symbols.len() - 1
        });
        (pos + 1) as u32
    }

    /// 이미지 조립
    pub fn build(mut self) -> Vec<u8> {
        let targets: Vec<SymRef> = self.rels.iter().map(|r| r.target).collect();
        let sym_numbers: Vec<u32> = targets.into_iter().map(|t| self.symbol_number(t)).collect();

        // .strtab / .symtab
        let mut strtab = vec![0u8];
        let mut symtab = vec![0u8; 16];
        for sym in &self.symbols {
            let name_off = if sym.name.is_empty() {
                0
            } else {
                let off = strtab.len() as u32;
                strtab.extend_from_slice(&sym.name);
                strtab.push(0);
                off
            };
            let shndx = match sym.section {
                SymSection::Undef => section_index::SHN_UNDEF,
                SymSection::Common => section_index::SHN_COMMON,
                SymSection::Abs => section_index::SHN_ABS,
                SymSection::Named(n) => self.section_number(n),
            };
            symtab.extend_from_slice(&name_off.to_le_bytes());
            symtab.extend_from_slice(&sym.value.to_le_bytes());
            symtab.extend_from_slice(&sym.size.to_le_bytes());
            symtab.push((sym.bind << 4) | (sym.sym_type & 0xf));
            symtab.push(0);
            symtab.extend_from_slice(&shndx.to_le_bytes());
        }

        // .rel.text
        let mut reltab = Vec::new();
        for (rel, sym) in self.rels.iter().zip(&sym_numbers) {
            reltab.extend_from_slice(&rel.offset.to_le_bytes());
            reltab.extend_from_slice(&((sym << 8) | rel.kind as u32).to_le_bytes());
        }

        let user_count = self.sections.len() as u32;
        let text_index = self
            .sections
            .iter()
            .position(|s| s.name == ".text")
            .map(|p| p as u32 + 1)
            .unwrap_or(0);
        let has_rel = !self.rels.is_empty();
        let symtab_index = user_count + 1 + has_rel as u32;
        let strtab_index = symtab_index + 1;

        let mut all: Vec<(SectionSpec, u32, u32)> = Vec::new();
        for spec in self.sections.drain(..) {
            all.push((spec, 0, 0));
        }
        if has_rel {
            let size = reltab.len() as u32;
            all.push((
                SectionSpec {
                    name: String::from(".rel.text"),
                    sh_type: section_type::SHT_REL,
                    flags: 0,
                    data: reltab,
                    size,
                },
                symtab_index,
                text_index,
            ));
        }
        let size = symtab.len() as u32;
        all.push((
            SectionSpec {
                name: String::from(".symtab"),
                sh_type: section_type::SHT_SYMTAB,
                flags: 0,
                data: symtab,
                size,
            },
            strtab_index,
            1,
        ));
        let size = strtab.len() as u32;
        all.push((
            SectionSpec {
                name: String::from(".strtab"),
                sh_type: section_type::SHT_STRTAB,
                flags: 0,
                data: strtab,
                size,
            },
            0,
            0,
        ));

        // .shstrtab
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for (spec, _, _) in &all {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(spec.name.as_bytes());
            shstrtab.push(0);
        }
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(b".shstrtab\0");
        let size = shstrtab.len() as u32;
        all.push((
            SectionSpec {
                name: String::from(".shstrtab"),
                sh_type: section_type::SHT_STRTAB,
                flags: 0,
                data: shstrtab,
                size,
            },
            0,
            0,
        ));
        let shstrndx = all.len() as u16;

        // 섹션 내용 배치
        let mut out = vec![0u8; ELF32_HEADER_SIZE];
        let mut offsets = Vec::new();
        for (spec, _, _) in &all {
            while out.len() % 4 != 0 {
                out.push(0);
            }
            offsets.push(out.len() as u32);
            out.extend_from_slice(&spec.data);
        }
        while out.len() % 4 != 0 {
            out.push(0);
        }
        let shoff = out.len() as u32;

        // 섹션 헤더 테이블 (null 엔트리 포함)
        out.extend_from_slice(&[0u8; 40]);
        for (i, (spec, link, info)) in all.iter().enumerate() {
            for word in [
                name_offsets[i],
                spec.sh_type,
                spec.flags,
                0,
                offsets[i],
                spec.size,
                *link,
                *info,
                4,
                0,
            ] {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }

        // ELF 헤더
        out[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        out[4] = 1; // ELFCLASS32
        out[5] = 1; // ELFDATA2LSB
        out[6] = 1; // EV_CURRENT
        out[16..18].copy_from_slice(&1u16.to_le_bytes()); // ET_REL
        out[18..20].copy_from_slice(&3u16.to_le_bytes()); // EM_386
        out[20..24].copy_from_slice(&1u32.to_le_bytes());
        out[32..36].copy_from_slice(&shoff.to_le_bytes());
        out[40..42].copy_from_slice(&(ELF32_HEADER_SIZE as u16).to_le_bytes());
        out[46..48].copy_from_slice(&40u16.to_le_bytes());
        out[48..50].copy_from_slice(&(all.len() as u16 + 1).to_le_bytes());
        out[50..52].copy_from_slice(&shstrndx.to_le_bytes());
        out
    }
}
