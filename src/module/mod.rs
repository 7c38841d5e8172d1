//! 커널 모듈 시스템
//!
//! ELF32 i386 relocatable object 로딩 및 동적 모듈 관리
//! - ELF32 파서
//! - 섹션 로딩, 심볼 해석, 재배치 처리
//! - 심볼 테이블 관리
//! - 모듈 라이프사이클과 기능 벡터

pub mod elf;
pub mod loader;
pub mod registry;
pub mod reloc;
pub mod resolve;
pub mod section;
pub mod service;
pub mod symbol;
pub mod vectors;

#[cfg(test)]
pub(crate) mod testimage;

pub use elf::{Elf32, ElfError};
pub use loader::{link_object, LinkedModule, ModuleError, ModuleState};
pub use registry::{ModuleDescriptor, ModuleInfo, ModuleListing, ModuleRegistry, RoutineInvoker};
pub use service::ModuleService;
pub use symbol::{KernelSymbol, KernelSymbolTable, SymbolTable};
pub use vectors::{Capability, CapabilityKind, CapabilityVectorTable};
