//! MOS 6502 CPU core
//!
//! A generic, table-driven NMOS 6502 that works with any [`Bus`]. Each opcode
//! byte maps to an [`OpcodeEntry`](table::OpcodeEntry) giving the operation,
//! addressing mode and base cost; the engine charges that cost, plus page
//! crossing, taken-branch and wait-state cycles, once per instruction.
//!
//! Covered: all 256 opcodes including the undocumented ones, NMOS decimal
//! flag behaviour, dummy reads on indexed fixups, RMW double writes, the
//! JMP ($xxFF) page wrap, JAM lock-up and the one-instruction IRQ latency
//! after CLI/SEI/PLP. The Ricoh 2A03 variant ignores the D flag.

mod addressing;
mod execute;
pub mod registers;
pub mod table;


use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bus::Bus;
use crate::config::{DeviceConfig, IsaConfig};
use crate::engine::{
    check_envelope, forward_engine_state, run_core, EngineState, ExecutionUnit, IdlePolicy,
    InstructionCore, RegisterView, RunState, STATE_VERSION,
};
use crate::error::{ConfigError, StateError};
use crate::interrupt::InputLine;
use crate::logging::{log, LogCategory, LogLevel};

pub use registers::{
    Registers, FLAG_B, FLAG_C, FLAG_D, FLAG_I, FLAG_N, FLAG_U, FLAG_V, FLAG_Z,
};

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Cycles taken by the NMI/IRQ entry sequence.
const INTERRUPT_CYCLES: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Nmos6502,
    /// NES CPU: decimal mode is wired off.
    Ricoh2A03,
}

impl Variant {
    pub fn has_decimal_mode(self) -> bool {
        self == Variant::Nmos6502
    }
}

/// MOS 6502 CPU state and execution engine
pub struct Cpu6502<B: Bus> {
    pub regs: Registers,
    /// Memory interface
    pub bus: B,
    pub engine: EngineState,
    variant: Variant,
    ane_magic: u8,
    reset_vector: Option<u16>,
    run_state: RunState,
    /// I flag from before the last CLI/SEI/PLP, used for the next interrupt poll.
    delayed_i: Option<bool>,
}

impl<B: Bus> Cpu6502<B> {
    /// A 1 MHz NMOS part with one IRQ line. Call [`reset`](Self::reset) before running.
    pub fn new(bus: B) -> Self {
        Self {
            regs: Registers::default(),
            bus,
            engine: EngineState::new("6502", 1_000_000, 1, IdlePolicy::Spin),
            variant: Variant::Nmos6502,
            ane_magic: 0xEE,
            reset_vector: None,
            run_state: RunState::Running,
            delayed_i: None,
        }
    }

    /// Build and power on a core described by `cfg`.
    pub fn from_config(cfg: &DeviceConfig, bus: B) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let IsaConfig::Mos6502 { variant, ane_magic } = cfg.isa else {
            return Err(ConfigError::WrongIsa {
                unit: cfg.name.clone(),
                found: cfg.isa.label(),
                expected: "6502",
            });
        };
        table::validate(&table::OPCODES)?;

        let mut cpu = Self::new(bus);
        cpu.engine = EngineState::new(&cfg.name, cfg.clock_hz, cfg.irq_lines, cfg.idle_policy);
        cpu.variant = variant;
        cpu.ane_magic = ane_magic;
        cpu.reset_vector = cfg.reset_vector.map(|v| v as u16);
        cpu.reset();
        Ok(cpu)
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Reset to initial state (preserves memory and interrupt lines).
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.run_state = RunState::Running;
        self.delayed_i = None;
        self.regs.pc = match self.reset_vector {
            Some(pc) => pc,
            None => self.read_u16(RESET_VECTOR),
        };
        self.regs.prev_pc = self.regs.pc;
    }

    #[inline]
    fn read(&mut self, addr: u16) -> u8 {
        self.bus.read_byte(addr as u32)
    }

    #[inline]
    fn write(&mut self, addr: u16, val: u8) {
        self.bus.write_byte(addr as u32, val);
    }

    fn read_u16(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn fetch_opcode(&mut self) -> u8 {
        let v = self.bus.read_opcode(self.regs.pc as u32);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        v
    }

    #[inline]
    fn fetch_u8(&mut self) -> u8 {
        let v = self.bus.read_opcode_arg(self.regs.pc as u32);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        v
    }

    #[inline]
    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8() as u16;
        let hi = self.fetch_u8() as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn push_u8(&mut self, v: u8) {
        let addr = 0x0100 | self.regs.sp as u16;
        self.write(addr, v);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    #[inline]
    fn pop_u8(&mut self) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let addr = 0x0100 | self.regs.sp as u16;
        self.read(addr)
    }

    fn push_u16(&mut self, v: u16) {
        self.push_u8((v >> 8) as u8);
        self.push_u8(v as u8);
    }

    fn pop_u16(&mut self) -> u16 {
        let lo = self.pop_u8() as u16;
        let hi = self.pop_u8() as u16;
        (hi << 8) | lo
    }

    /// Push PC and P, set I, load PC from `vector`. Shared by BRK, NMI and IRQ.
    fn enter_interrupt(&mut self, vector: u16, from_brk: bool) {
        self.push_u16(self.regs.pc);
        let mut s = self.regs.p | FLAG_U;
        if from_brk {
            s |= FLAG_B;
        } else {
            s &= !FLAG_B;
        }
        self.push_u8(s);
        self.regs.set_flag(FLAG_I, true);
        self.regs.pc = self.read_u16(vector);
    }

    fn jam(&mut self, opcode: u8) {
        self.run_state = RunState::Jammed;
        self.regs.pc = self.regs.prev_pc;
        log(LogCategory::CPU, LogLevel::Warn, || {
            format!(
                "{}: JAM opcode {:02X} at PC={:04X}, halted until reset",
                self.engine.name, opcode, self.regs.prev_pc
            )
        });
    }
}

impl<B: Bus> InstructionCore for Cpu6502<B> {
    fn engine(&mut self) -> &mut EngineState {
        &mut self.engine
    }

    fn hook_parts(&mut self) -> (&mut EngineState, &dyn RegisterView, u32) {
        let pc = self.regs.pc as u32;
        (&mut self.engine, &self.regs, pc)
    }

    fn state(&self) -> RunState {
        self.run_state
    }

    fn take_interrupt(&mut self) -> Option<u32> {
        if self.run_state == RunState::Jammed {
            return None;
        }
        // Peek only: a hook break at this boundary must see the same mask on resume.
        let masked = self.delayed_i.unwrap_or_else(|| self.regs.flag(FLAG_I));
        let line = self.engine.interrupts.highest_pending(!masked)?;
        self.engine.interrupts.acknowledge(line)?;
        self.delayed_i = None;
        let vector = match line {
            InputLine::Nmi => NMI_VECTOR,
            InputLine::Irq(_) => IRQ_VECTOR,
        };
        self.enter_interrupt(vector, false);
        Some(INTERRUPT_CYCLES)
    }

    fn execute(&mut self) -> u32 {
        self.execute_instruction()
    }

    fn wait_states(&mut self) -> u32 {
        self.bus.take_wait_states()
    }
}

impl<B: Bus> ExecutionUnit for Cpu6502<B> {
    forward_engine_state!();

    fn reset(&mut self) {
        Cpu6502::reset(self);
    }

    fn run(&mut self, budget: i32) -> i32 {
        run_core(self, budget)
    }

    fn run_state(&self) -> RunState {
        self.run_state
    }

    fn pc(&self) -> u32 {
        self.regs.pc as u32
    }

    fn registers(&self) -> &dyn RegisterView {
        &self.regs
    }

    fn save_state(&self) -> Value {
        json!({
            "version": STATE_VERSION,
            "cpu": "6502",
            "variant": self.variant,
            "registers": self.regs,
            "run_state": self.run_state,
            "delayed_i": self.delayed_i,
            "engine": self.engine.save(),
            "bus": self.bus.save_state(),
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), StateError> {
        check_envelope(v, "6502")?;
        let variant: Variant = serde_json::from_value(v["variant"].clone())?;
        if variant != self.variant {
            return Err(StateError::CpuMismatch {
                found: format!("{:?}", variant),
                expected: format!("{:?}", self.variant),
            });
        }
        let regs: Registers = serde_json::from_value(v["registers"].clone())?;
        let run_state: RunState = serde_json::from_value(v["run_state"].clone())?;
        let delayed_i: Option<bool> = serde_json::from_value(v["delayed_i"].clone())?;

        self.engine
            .load_with_bus(&mut self.bus, &v["bus"], &v["engine"])?;
        self.regs = regs;
        self.run_state = run_state;
        self.delayed_i = delayed_i;
        Ok(())
    }
}
