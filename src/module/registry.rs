//! 모듈 레지스트리
//!
//! 고정 크기 슬롯 표와 점유 비트맵으로 모듈 라이프사이클을 관리한다.
//! - load: 슬롯 할당 → 링크 → 심볼 커밋 → 활성화 → init_module 호출
//! - unload: cleanup_module 호출 → 심볼 회수 → 슬롯 메모리/기록 초기화
//!
//! 실패한 로드는 슬롯을 점유한 채로 남기지 않는다.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use log::{info, warn};

use crate::config::{LoaderConfig, MAX_MODULES, MAX_MODULE_NAMELEN};
use crate::mm::ModuleRegion;

use super::elf::Elf32;
use super::loader::{link_object, ModuleError, ModuleState};
use super::reloc::RelocationRecord;
use super::resolve::SymbolRecord;
use super::section::SectionRecord;
use super::symbol::SymbolTable;
use super::vectors::{Capability, CapabilityKind, CapabilityVectorTable};

/// 모듈 루틴 실행 경계
///
/// 로더는 주소를 함수 포인터로 바꾸지 않는다. 실제 호출은 임베딩 커널이 한다.
/// 루틴은 자기 슬롯의 기능 벡터 표를 받아 등록할 수 있다.
pub trait RoutineInvoker {
    fn call_routine(&mut self, address: u32, slot: usize, vectors: &mut CapabilityVectorTable) -> i32;
}

/// 로드된 모듈 기록
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub name: String,
    pub slot: usize,
    /// 슬롯 메모리 시작 주소
    pub base: u32,
    /// 로드된 섹션 총 크기
    pub size: u32,
    pub state: ModuleState,
    pub entry: u32,
    pub teardown: Option<u32>,
    pub sections: Vec<SectionRecord>,
    pub relocations: Vec<RelocationRecord>,
    pub symbols: Vec<SymbolRecord>,
    /// 전역 심볼 테이블에 공개한 심볼
    exports: Vec<(String, u32)>,
}

impl ModuleDescriptor {
    fn new(name: &str, slot: usize, base: u32) -> Self {
        Self {
            name: String::from(name),
            slot,
            base,
            size: 0,
            state: ModuleState::Initializing,
            entry: 0,
            teardown: None,
            sections: Vec::new(),
            relocations: Vec::new(),
            symbols: Vec::new(),
            exports: Vec::new(),
        }
    }

    pub fn exports(&self) -> &[(String, u32)] {
        &self.exports
    }

    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: self.name.clone(),
            slot: self.slot,
            base: self.base,
            size: self.size,
            state: self.state,
            entry: self.entry,
            teardown: self.teardown,
            section_count: self.sections.len(),
            relocation_count: self.relocations.len(),
            symbol_count: self.symbols.len(),
            exported_symbol_count: self.exports.len(),
        }
    }
}

/// 모듈 상세 정보 (조회용)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub slot: usize,
    pub base: u32,
    pub size: u32,
    pub state: ModuleState,
    pub entry: u32,
    pub teardown: Option<u32>,
    pub section_count: usize,
    pub relocation_count: usize,
    pub symbol_count: usize,
    pub exported_symbol_count: usize,
}

/// 사람이 읽는 모듈 목록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleListing(pub Vec<ModuleInfo>);

impl fmt::Display for ModuleListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "There are no modules loaded in kernel");
        }
        writeln!(f, "Total number of modules: {}", self.0.len())?;
        for m in &self.0 {
            writeln!(f)?;
            writeln!(f, "Name             : {}", m.name)?;
            writeln!(f, "Index            : {}", m.slot)?;
            writeln!(f, "Base Address     : {:#x}", m.base)?;
            writeln!(f, "Size             : {} bytes", m.size)?;
            writeln!(f, "Module Entry     : {:#x}", m.entry)?;
            writeln!(f, "Module Exit      : {:#x}", m.teardown.unwrap_or(0))?;
            writeln!(f, "No of Sections   : {}", m.section_count)?;
            writeln!(f, "No of Relocations: {}", m.relocation_count)?;
            writeln!(f, "No of Symbols    : {}", m.symbol_count)?;
        }
        Ok(())
    }
}

/// 모듈 레지스트리
pub struct ModuleRegistry {
    /// 슬롯별 예약 메모리
    region: ModuleRegion,
    slots: Vec<Option<ModuleDescriptor>>,
    /// 슬롯별 기능 벡터 (모듈 활성 여부와 무관하게 존재)
    vectors: Vec<CapabilityVectorTable>,
    /// 점유 비트맵 (bit i = 슬롯 i)
    bitmap: u16,
    /// 활성 모듈 수
    count: usize,
}

impl ModuleRegistry {
    /// 레지스트리 생성
    ///
    /// 모든 슬롯이 32비트 주소 공간 안에 들어가지 않는 설정은 거부한다.
    pub fn new(config: LoaderConfig) -> Result<Self, ModuleError> {
        let region = ModuleRegion::new(config.module_data_base, config.region_size, MAX_MODULES)
            .inspect_err(|e| warn!("[module] rejected loader config: {}", e))?;
        Ok(Self {
            region,
            slots: (0..MAX_MODULES).map(|_| None).collect(),
            vectors: (0..MAX_MODULES).map(|_| CapabilityVectorTable::new()).collect(),
            bitmap: 0,
            count: 0,
        })
    }

    /// 모듈 로드
    ///
    /// 성공하면 모듈이 들어간 슬롯 번호를 돌려준다.
    pub fn load(
        &mut self,
        name: &str,
        image: &[u8],
        symbols: &mut dyn SymbolTable,
        invoker: &mut dyn RoutineInvoker,
    ) -> Result<usize, ModuleError> {
        if name.is_empty() || name.len() >= MAX_MODULE_NAMELEN {
            warn!("[module] rejected module name '{}'", name);
            return Err(ModuleError::InvalidName);
        }

        // 매직 넘버만 먼저 확인하고, 나머지 헤더 검사는 슬롯을 찾은 뒤에 한다
        Elf32::check_magic(image)?;

        if self.find(name).is_some() {
            warn!("[module] module {} is already loaded", name);
            return Err(ModuleError::DuplicateName(String::from(name)));
        }
        let slot = self.free_slot().ok_or_else(|| {
            warn!("[module] can't load module {} due to lack of space", name);
            ModuleError::OutOfSlots
        })?;

        let elf = Elf32::parse(image)?;
        let base = self
            .region
            .slot_base(slot)
            .ok_or(ModuleError::InvalidSlot(slot))?;

        info!("[module] Loading relocatable object: {} (slot {})", name, slot);
        self.bitmap |= 1 << slot;
        self.slots[slot] = Some(ModuleDescriptor::new(name, slot, base));

        let result = match self.region.slot_mut(slot) {
            Some(mut mem) => link_object(&elf, &mut mem, &*symbols),
            None => Err(ModuleError::InvalidSlot(slot)),
        };
        let linked = match result {
            Ok(linked) => linked,
            Err(e) => {
                warn!("[module] failed to link {}: {}", name, e);
                self.release(slot);
                return Err(e);
            }
        };

        // 링크가 끝난 뒤에만 공개
        linked.exports.commit(symbols);
        let descriptor = ModuleDescriptor {
            name: String::from(name),
            slot,
            base,
            size: linked.size,
            state: ModuleState::Active,
            entry: linked.entry,
            teardown: linked.teardown,
            sections: linked.sections,
            relocations: linked.relocations,
            symbols: linked.symbols,
            exports: linked.exports.into_vec(),
        };
        info!(
            "[module] Exported {} symbols from {}",
            descriptor.exports.len(),
            name
        );
        let entry = descriptor.entry;
        self.slots[slot] = Some(descriptor);
        self.count += 1;

        // init 함수 호출
        let code = invoker.call_routine(entry, slot, &mut self.vectors[slot]);
        if code != 0 {
            warn!("[module] init_module of {} returned {}, rolling back", name, code);
            self.withdraw(slot, symbols);
            self.release(slot);
            self.count -= 1;
            return Err(ModuleError::InitFailed(code));
        }

        info!("[module] Module '{}' loaded successfully", name);
        Ok(slot)
    }

    /// 모듈 언로드
    pub fn unload(
        &mut self,
        name: &str,
        symbols: &mut dyn SymbolTable,
        invoker: &mut dyn RoutineInvoker,
    ) -> Result<(), ModuleError> {
        let Some(slot) = self.find(name) else {
            warn!("[module] cannot find module {}", name);
            return Err(ModuleError::NotFound(String::from(name)));
        };

        // exit 함수 호출
        if let Some(teardown) = self.slots[slot].as_ref().and_then(|m| m.teardown) {
            let code = invoker.call_routine(teardown, slot, &mut self.vectors[slot]);
            if code != 0 {
                warn!("[module] cleanup_module of {} returned {}", name, code);
            }
        }

        self.withdraw(slot, symbols);
        self.release(slot);
        self.count -= 1;

        info!("[module] Module '{}' unloaded", name);
        Ok(())
    }

    /// 활성 모듈 목록 (슬롯 순)
    pub fn list(&self) -> Vec<ModuleInfo> {
        self.slots
            .iter()
            .flatten()
            .filter(|m| m.state == ModuleState::Active)
            .map(ModuleDescriptor::info)
            .collect()
    }

    /// 모듈 상세 정보
    pub fn info(&self, name: &str) -> Option<ModuleInfo> {
        self.find(name).and_then(|slot| self.slots[slot].as_ref()).map(ModuleDescriptor::info)
    }

    pub fn listing(&self) -> ModuleListing {
        ModuleListing(self.list())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.find(name).and_then(|slot| self.slots[slot].as_ref())
    }

    /// 기능 등록
    ///
    /// 슬롯의 모듈이 활성인지 확인하지 않는다.
    pub fn register_capability(
        &mut self,
        slot: usize,
        kind: CapabilityKind,
        capability: Capability,
    ) -> Result<(), ModuleError> {
        let vectors = self
            .vectors
            .get_mut(slot)
            .ok_or(ModuleError::InvalidSlot(slot))?;
        info!("[module] module {} registered {:?}", slot, kind);
        vectors.register(kind, capability);
        Ok(())
    }

    /// 이름으로 찾은 모듈의 기능 (등록되지 않았으면 None)
    pub fn capability(&self, name: &str, kind: CapabilityKind) -> Result<Option<Capability>, ModuleError> {
        let slot = self
            .find(name)
            .ok_or_else(|| ModuleError::NotFound(String::from(name)))?;
        Ok(self.vectors[slot].get(kind))
    }

    /// 슬롯 번호로 찾은 기능
    pub fn slot_capability(&self, slot: usize, kind: CapabilityKind) -> Option<Capability> {
        self.vectors.get(slot).and_then(|v| v.get(kind))
    }

    pub fn module_count(&self) -> usize {
        self.count
    }

    pub fn bitmap(&self) -> u16 {
        self.bitmap
    }

    pub fn is_slot_occupied(&self, slot: usize) -> bool {
        slot < MAX_MODULES && self.bitmap & (1 << slot) != 0
    }

    pub fn region(&self) -> &ModuleRegion {
        &self.region
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|m| m.as_ref().is_some_and(|m| m.name == name))
    }

    fn free_slot(&self) -> Option<usize> {
        (0..MAX_MODULES).find(|&slot| self.bitmap & (1 << slot) == 0)
    }

    /// 공개했던 심볼 회수 (다른 모듈이 덮어쓴 이름은 그대로 둔다)
    fn withdraw(&self, slot: usize, symbols: &mut dyn SymbolTable) {
        let Some(module) = self.slots[slot].as_ref() else {
            return;
        };
        for (name, address) in &module.exports {
            if symbols.lookup(name) == Some(*address) {
                symbols.remove(name);
            }
        }
    }

    /// 슬롯 메모리, 기록, 벡터, 비트 해제
    fn release(&mut self, slot: usize) {
        if let Some(mut mem) = self.region.slot_mut(slot) {
            mem.clear();
        }
        self.slots[slot] = None;
        self.vectors[slot].clear();
        self.bitmap &= !(1 << slot);
    }
}
