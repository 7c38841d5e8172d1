//! 프로세스 경계
//!
//! 로더는 스케줄러를 구현하지 않는다. 모듈 적재/해제 요청을 처리하는
//! 도우미 사용자 프로세스를 만들고 CPU를 넘기는 일만 임베딩 커널에 맡긴다.

use log::info;

/// 도우미 사용자 프로그램
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperProgram {
    /// 모듈 적재 요청
    Insmod,
    /// 모듈 해제 요청
    Rmmod,
    /// 시스템 콜 발생기
    TestSyscall,
}

impl HelperProgram {
    pub fn name(self) -> &'static str {
        match self {
            HelperProgram::Insmod => "user_insmod",
            HelperProgram::Rmmod => "user_rmmod",
            HelperProgram::TestSyscall => "user_test_syscall",
        }
    }
}

/// 프로세스 생성/양보 경계
pub trait ProcessSpawner {
    /// 도우미 프로세스 생성
    fn create_process(&mut self, program: HelperProgram);

    /// CPU 양보
    fn yield_now(&mut self);
}

fn spawn_and_yield(spawner: &mut dyn ProcessSpawner, program: HelperProgram) {
    info!("[module] launching {}", program.name());
    spawner.create_process(program);
    spawner.yield_now();
}

/// insmod 프로세스 실행
pub fn invoke_insmod(spawner: &mut dyn ProcessSpawner) {
    spawn_and_yield(spawner, HelperProgram::Insmod);
}

/// rmmod 프로세스 실행
pub fn invoke_rmmod(spawner: &mut dyn ProcessSpawner) {
    spawn_and_yield(spawner, HelperProgram::Rmmod);
}

/// 시스템 콜 테스트 프로세스 실행
pub fn invoke_test_syscall(spawner: &mut dyn ProcessSpawner) {
    spawn_and_yield(spawner, HelperProgram::TestSyscall);
}
