//! Cycle-counted CPU interpreters and the machinery to run several of them
//! against one master clock.
//!
//! A machine is a set of [`ExecutionUnit`]s, each owning its [`Bus`], driven
//! by a [`Scheduler`]. Two cores are provided: [`Cpu6502`] and [`Cpu8086`].

pub mod bus;
pub mod config;
pub mod cpu_6502;
pub mod cpu_8086;
pub mod engine;
pub mod error;
pub mod interrupt;
pub mod logging;
pub mod scheduler;

pub use bus::{
    AddressSpace, BankSelect, BankSwitchRegister, Bus, FlatMemory, MemoryDevice, SharedRam,
};
pub use config::{DeviceConfig, IsaConfig, SchedulerConfig};
pub use cpu_6502::Cpu6502;
pub use cpu_8086::Cpu8086;
pub use engine::{
    AbortHandle, DebugHook, ExecutionUnit, HookAction, HookContext, IdlePolicy, RegisterView,
    RunState,
};
pub use error::{ConfigError, SchedulerError, StateError};
pub use interrupt::{InputLine, LineState, LineStatus};
pub use scheduler::{
    ClockedDevice, DeviceUnit, LineSender, Period, PeriodicTimer, Scheduler, UnitId,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> Vec<Box<dyn ExecutionUnit>> {
        let mut rom = FlatMemory::new(16);
        rom.load(0xFFFC, &[0x00, 0x02]);
        rom.load(0x0200, &[0xA9, 0x42]);
        let mut cpu = Cpu6502::new(rom);
        cpu.reset();

        let mut pc = FlatMemory::new(20);
        pc.load(0xFFFF0, &[0xF4]);
        vec![Box::new(cpu), Box::new(Cpu8086::new(pc))]
    }

    #[test]
    fn cores_run_behind_the_common_trait() {
        let mut units = units();
        assert_eq!(units[0].step(), 2);
        assert_eq!(units[0].registers().register("A"), Some(0x42));

        assert_eq!(units[1].step(), 2);
        assert!(units[1].is_idle());
        assert_eq!(units[1].pc(), 0xFFFF1);
    }

    #[test]
    fn save_states_name_their_core() {
        for unit in units() {
            let state = unit.save_state();
            assert_eq!(state["version"], engine::STATE_VERSION);
            assert!(state["cpu"].is_string());
        }
    }
}
