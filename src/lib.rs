//! kmodld: 커널 런타임 모듈 로더
//!
//! i386 relocatable object를 예약된 모듈 슬롯에 적재하고, 심볼을 전역
//! 심볼 테이블과 연결하고, 코드를 재배치한 뒤 모듈 라이프사이클을 관리한다.
//!
//! 로거 설치, 루틴 실행, 프로세스 생성은 임베딩 커널의 몫이다.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod mm;
pub mod module;
pub mod proc;

pub use config::LoaderConfig;
pub use module::{
    CapabilityKind, KernelSymbolTable, ModuleError, ModuleInfo, ModuleListing, ModuleRegistry,
    ModuleService, RoutineInvoker, SymbolTable,
};
pub use proc::{HelperProgram, ProcessSpawner};
