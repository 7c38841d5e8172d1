//! ELF32 파서
//!
//! i386 relocatable object (.o) 포맷 파싱 및 검증
//! 참조: https://refspecs.linuxfoundation.org/elf/gabi4+/ch4.eheader.html
//!
//! 모듈 이미지는 신뢰할 수 없는 입력이므로 모든 필드 접근은
//! 경계 검사된 리더를 거친다. 포인터 캐스팅은 하지 않는다.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;
use thiserror::Error;

/// ELF 매직 넘버
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF32 헤더 크기
pub const ELF32_HEADER_SIZE: usize = 52;
/// ELF32 섹션 헤더 크기
pub const ELF32_SHDR_SIZE: usize = 40;
/// ELF32 심볼 엔트리 크기
pub const ELF32_SYM_SIZE: usize = 16;
/// ELF32 재배치 엔트리 크기 (Rel, addend 없음)
pub const ELF32_REL_SIZE: usize = 8;

/// e_ident[EI_CLASS]: 32비트
const ELFCLASS32: u8 = 1;
/// e_ident[EI_DATA]: 리틀 엔디안
const ELFDATA2LSB: u8 = 1;
/// e_type: relocatable
const ET_REL: u16 = 1;
/// e_machine: Intel 80386
const EM_386: u16 = 3;

/// ELF32 헤더
#[derive(Debug, Clone, Copy)]
pub struct Elf32Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u32,
    pub e_phoff: u32,
    /// 섹션 헤더 테이블 오프셋
    pub e_shoff: u32,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    /// 섹션 헤더 엔트리 크기
    pub e_shentsize: u16,
    /// 섹션 헤더 엔트리 개수
    pub e_shnum: u16,
    /// 섹션 이름 문자열 테이블 인덱스
    pub e_shstrndx: u16,
}

/// ELF32 섹션 헤더
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elf32SectionHeader {
    /// 섹션 이름 (문자열 테이블 인덱스)
    pub sh_name: u32,
    /// 섹션 타입
    pub sh_type: u32,
    /// 섹션 플래그
    pub sh_flags: u32,
    /// 메모리 주소 (relocatable이면 0)
    pub sh_addr: u32,
    /// 파일 내 오프셋
    pub sh_offset: u32,
    /// 섹션 크기
    pub sh_size: u32,
    /// 연관 섹션 인덱스
    pub sh_link: u32,
    /// 추가 정보 (REL의 경우 대상 섹션)
    pub sh_info: u32,
    pub sh_addralign: u32,
    pub sh_entsize: u32,
}

impl Elf32SectionHeader {
    pub fn flags(&self) -> SectionFlags {
        SectionFlags::from_bits_truncate(self.sh_flags)
    }

    /// 런타임에 메모리를 차지하는 섹션인지
    pub fn is_alloc(&self) -> bool {
        self.flags().contains(SectionFlags::ALLOC)
    }
}

/// 섹션 타입
pub mod section_type {
    pub const SHT_NULL: u32 = 0;
    pub const SHT_PROGBITS: u32 = 1; // 코드/데이터
    pub const SHT_SYMTAB: u32 = 2; // 심볼 테이블
    pub const SHT_STRTAB: u32 = 3; // 문자열 테이블
    pub const SHT_RELA: u32 = 4; // 재배치 (addend 포함)
    pub const SHT_NOBITS: u32 = 8; // BSS (파일에 없음)
    pub const SHT_REL: u32 = 9; // 재배치 (addend 없음)
}

bitflags! {
    /// 섹션 플래그
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        const WRITE = 0x1;
        const ALLOC = 0x2;
        const EXECINSTR = 0x4;
    }
}

/// 특수 섹션 인덱스
pub mod section_index {
    pub const SHN_UNDEF: u16 = 0; // 미정의
    pub const SHN_ABS: u16 = 0xfff1; // 절대값
    pub const SHN_COMMON: u16 = 0xfff2; // 공통
}

/// 심볼 타입 (st_info 하위 4비트)
pub mod symbol_type {
    pub const STT_NOTYPE: u8 = 0;
    pub const STT_OBJECT: u8 = 1;
    pub const STT_FUNC: u8 = 2;
    pub const STT_SECTION: u8 = 3;
    pub const STT_FILE: u8 = 4;
}

/// i386 재배치 타입
pub mod reloc_i386 {
    pub const R_386_NONE: u8 = 0;
    pub const R_386_32: u8 = 1; // S (절대 주소)
    pub const R_386_PC32: u8 = 2; // S - P (PC 상대)
}

/// ELF32 심볼 테이블 엔트리
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elf32Symbol {
    /// 심볼 이름 (문자열 테이블 인덱스)
    pub st_name: u32,
    /// 심볼 값 (섹션 내 오프셋, COMMON이면 정렬값)
    pub st_value: u32,
    /// 심볼 크기
    pub st_size: u32,
    /// 심볼 정보 (바인딩 + 타입)
    pub st_info: u8,
    pub st_other: u8,
    /// 관련 섹션 인덱스
    pub st_shndx: u16,
}

impl Elf32Symbol {
    /// 심볼 바인딩 (상위 4비트)
    pub fn binding(&self) -> u8 {
        self.st_info >> 4
    }

    /// 심볼 타입 (하위 4비트)
    pub fn sym_type(&self) -> u8 {
        self.st_info & 0xf
    }
}

/// ELF32 재배치 엔트리 (Rel)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Elf32Rel {
    /// 재배치 적용 오프셋 (대상 섹션 기준)
    pub r_offset: u32,
    /// 재배치 정보 (심볼 + 타입)
    pub r_info: u32,
}

impl Elf32Rel {
    /// 심볼 인덱스 (상위 24비트)
    pub fn symbol(&self) -> u32 {
        self.r_info >> 8
    }

    /// 재배치 타입 (하위 8비트)
    pub fn rel_type(&self) -> u8 {
        (self.r_info & 0xff) as u8
    }
}

/// ELF32 파서 에러
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ElfError {
    #[error("image too small for an ELF header")]
    TooSmall,
    #[error("bad ELF magic")]
    InvalidMagic,
    #[error("not a 32-bit ELF image")]
    Not32Bit,
    #[error("unsupported byte order")]
    UnsupportedEndian,
    #[error("not a relocatable object")]
    NotRelocatable,
    #[error("unsupported machine type {0}")]
    UnsupportedMachine(u16),
    #[error("section header table out of bounds")]
    InvalidSectionHeader,
    #[error("section index {0} out of range")]
    BadSectionIndex(u32),
    #[error("section {0} data out of bounds")]
    SectionOutOfBounds(u32),
    #[error("string offset {0} out of bounds")]
    BadStringOffset(u32),
    #[error("no symbol table")]
    MissingSymbolTable,
    #[error("symbol index {0} out of range")]
    BadSymbolIndex(u32),
}

fn read_u16(data: &[u8], off: usize) -> Option<u16> {
    let bytes = data.get(off..off.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], off: usize) -> Option<u32> {
    let bytes = data.get(off..off.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// 문자열 테이블에서 NUL로 끝나는 바이트열 조회
///
/// NUL이 없으면 테이블 끝까지를 이름으로 본다.
pub fn string_bytes(strtab: &[u8], offset: u32) -> Result<&[u8], ElfError> {
    let start = offset as usize;
    let tail = strtab.get(start..).ok_or(ElfError::BadStringOffset(offset))?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(&tail[..end])
}

/// 문자열 테이블의 이름
///
/// UTF-8이면 원본을 빌려 주고(`Cow::Borrowed`), 아니면 U+FFFD로 치환한
/// 사본을 준다. 치환된 이름은 원본 바이트와 같지 않으므로 조회/공개에 쓰지 않는다.
pub fn string_at(strtab: &[u8], offset: u32) -> Result<Cow<'_, str>, ElfError> {
    Ok(String::from_utf8_lossy(string_bytes(strtab, offset)?))
}

/// 심볼 테이블 뷰 (.symtab + 연결된 .strtab)
#[derive(Clone, Copy)]
pub struct SymTab<'a> {
    entries: &'a [u8],
    strtab: &'a [u8],
}

impl<'a> SymTab<'a> {
    /// 엔트리 개수
    pub fn len(&self) -> usize {
        self.entries.len() / ELF32_SYM_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 인덱스로 심볼 조회
    pub fn get(&self, index: u32) -> Result<Elf32Symbol, ElfError> {
        let idx = index as usize;
        if idx >= self.len() {
            return Err(ElfError::BadSymbolIndex(index));
        }
        let raw = &self.entries[idx * ELF32_SYM_SIZE..(idx + 1) * ELF32_SYM_SIZE];
        let bad = ElfError::BadSymbolIndex(index);
        Ok(Elf32Symbol {
            st_name: read_u32(raw, 0).ok_or(bad)?,
            st_value: read_u32(raw, 4).ok_or(bad)?,
            st_size: read_u32(raw, 8).ok_or(bad)?,
            st_info: raw[12],
            st_other: raw[13],
            st_shndx: read_u16(raw, 14).ok_or(bad)?,
        })
    }

    /// 심볼 이름 조회
    pub fn name(&self, sym: &Elf32Symbol) -> Result<Cow<'a, str>, ElfError> {
        string_at(self.strtab, sym.st_name)
    }

    /// 전체 심볼 순회
    pub fn iter(&self) -> impl Iterator<Item = Result<Elf32Symbol, ElfError>> + '_ {
        (0..self.len() as u32).map(move |i| self.get(i))
    }
}

/// 재배치 테이블 뷰 (.rel.text)
#[derive(Clone, Copy)]
pub struct RelTable<'a> {
    entries: &'a [u8],
    /// 재배치 대상 섹션 인덱스
    pub target: u32,
}

impl<'a> RelTable<'a> {
    pub fn len(&self) -> usize {
        self.entries.len() / ELF32_REL_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Elf32Rel> + '_ {
        self.entries.chunks_exact(ELF32_REL_SIZE).map(|raw| Elf32Rel {
            r_offset: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            r_info: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        })
    }
}

/// 파싱된 ELF32 파일
pub struct Elf32<'a> {
    /// 원본 데이터
    data: &'a [u8],
    /// ELF 헤더
    pub header: Elf32Header,
    /// 섹션 헤더 테이블
    section_headers: Vec<Elf32SectionHeader>,
    /// 섹션 이름 문자열 테이블
    shstrtab: &'a [u8],
}

impl<'a> Elf32<'a> {
    /// 매직 넘버만 확인 (다른 필드는 읽지 않음)
    pub fn check_magic(data: &[u8]) -> Result<(), ElfError> {
        if data.len() < ELF_MAGIC.len() || data[0..4] != ELF_MAGIC {
            return Err(ElfError::InvalidMagic);
        }
        Ok(())
    }

    /// ELF32 파일 파싱
    pub fn parse(data: &'a [u8]) -> Result<Self, ElfError> {
        // 매직 넘버를 가장 먼저 확인
        Self::check_magic(data)?;
        if data.len() < ELF32_HEADER_SIZE {
            return Err(ElfError::TooSmall);
        }

        let mut e_ident = [0u8; 16];
        e_ident.copy_from_slice(&data[0..16]);

        if e_ident[4] != ELFCLASS32 {
            return Err(ElfError::Not32Bit);
        }
        if e_ident[5] != ELFDATA2LSB {
            return Err(ElfError::UnsupportedEndian);
        }

        let h16 = |off| read_u16(data, off).ok_or(ElfError::TooSmall);
        let h32 = |off| read_u32(data, off).ok_or(ElfError::TooSmall);
        let header = Elf32Header {
            e_ident,
            e_type: h16(16)?,
            e_machine: h16(18)?,
            e_version: h32(20)?,
            e_entry: h32(24)?,
            e_phoff: h32(28)?,
            e_shoff: h32(32)?,
            e_flags: h32(36)?,
            e_ehsize: h16(40)?,
            e_phentsize: h16(42)?,
            e_phnum: h16(44)?,
            e_shentsize: h16(46)?,
            e_shnum: h16(48)?,
            e_shstrndx: h16(50)?,
        };

        if header.e_type != ET_REL {
            return Err(ElfError::NotRelocatable);
        }
        if header.e_machine != EM_386 {
            return Err(ElfError::UnsupportedMachine(header.e_machine));
        }

        // 섹션 헤더 테이블 파싱
        let sh_offset = header.e_shoff as usize;
        let sh_count = header.e_shnum as usize;
        let sh_size = header.e_shentsize as usize;
        if sh_count > 0 && sh_size < ELF32_SHDR_SIZE {
            return Err(ElfError::InvalidSectionHeader);
        }
        let table_end = sh_count
            .checked_mul(sh_size)
            .and_then(|len| len.checked_add(sh_offset))
            .ok_or(ElfError::InvalidSectionHeader)?;
        if table_end > data.len() {
            return Err(ElfError::InvalidSectionHeader);
        }

        let mut section_headers = Vec::with_capacity(sh_count);
        for i in 0..sh_count {
            let raw = &data[sh_offset + i * sh_size..sh_offset + i * sh_size + ELF32_SHDR_SIZE];
            let f = |off| read_u32(raw, off).ok_or(ElfError::InvalidSectionHeader);
            section_headers.push(Elf32SectionHeader {
                sh_name: f(0)?,
                sh_type: f(4)?,
                sh_flags: f(8)?,
                sh_addr: f(12)?,
                sh_offset: f(16)?,
                sh_size: f(20)?,
                sh_link: f(24)?,
                sh_info: f(28)?,
                sh_addralign: f(32)?,
                sh_entsize: f(36)?,
            });
        }

        let mut elf = Self {
            data,
            header,
            section_headers,
            shstrtab: &[],
        };

        // 섹션 이름 문자열 테이블
        let shstrndx = header.e_shstrndx as u32;
        let shstr_sh = *elf.section(shstrndx)?;
        elf.shstrtab = elf.section_data(shstrndx, &shstr_sh)?;

        Ok(elf)
    }

    /// 섹션 헤더 목록
    pub fn sections(&self) -> &[Elf32SectionHeader] {
        &self.section_headers
    }

    /// 인덱스로 섹션 헤더 조회
    pub fn section(&self, index: u32) -> Result<&Elf32SectionHeader, ElfError> {
        self.section_headers
            .get(index as usize)
            .ok_or(ElfError::BadSectionIndex(index))
    }

    /// 섹션 이름 문자열 테이블 (원시 바이트)
    pub fn shstrtab(&self) -> &'a [u8] {
        self.shstrtab
    }

    /// 섹션 이름 조회
    pub fn section_name(&self, sh: &Elf32SectionHeader) -> Result<Cow<'a, str>, ElfError> {
        string_at(self.shstrtab, sh.sh_name)
    }

    /// 섹션 데이터 반환 (NOBITS는 빈 슬라이스)
    pub fn section_data(&self, index: u32, sh: &Elf32SectionHeader) -> Result<&'a [u8], ElfError> {
        if sh.sh_type == section_type::SHT_NOBITS {
            return Ok(&[]);
        }
        let start = sh.sh_offset as usize;
        let end = start
            .checked_add(sh.sh_size as usize)
            .ok_or(ElfError::SectionOutOfBounds(index))?;
        self.data
            .get(start..end)
            .ok_or(ElfError::SectionOutOfBounds(index))
    }

    /// 이름으로 섹션 인덱스 찾기
    pub fn find_section(&self, name: &str) -> Option<u32> {
        self.section_headers
            .iter()
            .position(|sh| self.section_name(sh).map(|n| n == name).unwrap_or(false))
            .map(|i| i as u32)
    }

    /// 심볼 테이블 (sh_link가 가리키는 문자열 테이블 포함)
    pub fn symbol_table(&self) -> Result<SymTab<'a>, ElfError> {
        let (idx, sh) = self
            .section_headers
            .iter()
            .enumerate()
            .find(|(_, sh)| sh.sh_type == section_type::SHT_SYMTAB)
            .ok_or(ElfError::MissingSymbolTable)?;
        let entries = self.section_data(idx as u32, sh)?;
        let strtab_sh = self.section(sh.sh_link)?;
        let strtab = self.section_data(sh.sh_link, strtab_sh)?;
        Ok(SymTab { entries, strtab })
    }

    /// 코드 섹션을 대상으로 하는 재배치 테이블
    ///
    /// `sh_info`가 `text_index`를 가리키는 REL 섹션을 우선하고,
    /// 없으면 마지막 REL 섹션을 사용한다.
    pub fn text_relocations(&self, text_index: Option<u32>) -> Result<Option<RelTable<'a>>, ElfError> {
        let mut chosen = None;
        for (idx, sh) in self.section_headers.iter().enumerate() {
            if sh.sh_type != section_type::SHT_REL {
                continue;
            }
            if text_index.is_some_and(|t| t == sh.sh_info) {
                chosen = Some((idx, sh));
                break;
            }
            chosen = Some((idx, sh));
        }

        match chosen {
            Some((idx, sh)) => Ok(Some(RelTable {
                entries: self.section_data(idx as u32, sh)?,
                target: sh.sh_info,
            })),
            None => Ok(None),
        }
    }
}
