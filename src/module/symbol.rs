//! 커널 심볼 테이블
//!
//! 모듈이 커널 함수를 호출할 수 있도록 이름 → 주소 매핑을 관리한다.
//! - 커널이 미리 등록하는 정적 심볼
//! - 로드된 모듈이 공개하는 함수/데이터 심볼
//!
//! 같은 이름으로 다시 등록하면 마지막 등록이 이긴다.

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;

/// 전역 심볼 테이블 경계
///
/// 로더는 이 테이블의 소유자가 아니라 클라이언트다.
pub trait SymbolTable {
    /// 심볼 등록 (기존 항목은 교체)
    fn insert(&mut self, name: &str, address: u32);

    /// 심볼 조회
    fn lookup(&self, name: &str) -> Option<u32>;

    /// 심볼 해제
    fn remove(&mut self, name: &str) -> Option<u32>;
}

/// 커널 심볼 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSymbol {
    /// 심볼 이름
    pub name: String,
    /// 심볼 주소
    pub address: u32,
}

impl KernelSymbol {
    pub fn new(name: &str, address: u32) -> Self {
        Self {
            name: String::from(name),
            address,
        }
    }
}

/// 해시맵 기반 커널 심볼 테이블
#[derive(Debug, Default, Clone)]
pub struct KernelSymbolTable {
    symbols: HashMap<String, u32>,
}

impl KernelSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 심볼 목록으로 생성
    pub fn with_symbols<'a>(symbols: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let mut table = Self::new();
        for (name, address) in symbols {
            table.insert(name, address);
        }
        table
    }

    /// 등록된 심볼 목록 (이름순)
    pub fn list(&self) -> Vec<KernelSymbol> {
        let mut list: Vec<KernelSymbol> = self
            .symbols
            .iter()
            .map(|(name, &address)| KernelSymbol::new(name, address))
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// 심볼 개수
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolTable for KernelSymbolTable {
    fn insert(&mut self, name: &str, address: u32) {
        log::debug!("[symbol] {} -> {:#x}", name, address);
        self.symbols.insert(String::from(name), address);
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.symbols.get(name).copied()
    }

    fn remove(&mut self, name: &str) -> Option<u32> {
        self.symbols.remove(name)
    }
}
