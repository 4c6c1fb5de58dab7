//! Intel 8086/8088 CPU core
//!
//! Real-mode 8086 working against any [`Bus`] with a 20-bit address space.
//! Opcodes are decoded through a prefix loop and a ModRM resolver; cycle
//! costs are the documented base clocks plus effective-address clocks plus
//! four clocks per word transfer on an odd address (every word transfer on
//! the 8-bit-bus 8088).
//!
//! Covered: the full 8086 instruction set including string instructions with
//! REP/REPE/REPNE, segment overrides, LOCK, HLT, divide error (INT 0),
//! single-step trap (INT 1), NMI (INT 2) and vectored INTR, plus the
//! documented aliases of undefined encodings.

mod alu;
mod decode;
mod execute;
mod modrm;
pub mod registers;
mod strings;
mod timing;

#[cfg(test)]
mod tests;

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

pub use registers::{
    Registers, FLAG_AF, FLAG_CF, FLAG_DF, FLAG_IF, FLAG_OF, FLAG_PF, FLAG_SF, FLAG_TF, FLAG_ZF,
};
use registers::{CS, SS};
use strings::RepResume;

const ADDRESS_MASK: u32 = 0xF_FFFF;

/// Exception and fixed interrupt numbers.
pub const INT_DIVIDE_ERROR: u8 = 0;
pub const INT_SINGLE_STEP: u8 = 1;
pub const INT_NMI: u8 = 2;

/// CPU model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuModel {
    /// 16-bit data bus: odd-address word transfers cost 4 extra clocks.
    #[default]
    Intel8086,
    /// 8-bit data bus: every word transfer costs 4 extra clocks.
    Intel8088,
}

impl CpuModel {
    pub fn name(&self) -> &'static str {
        match self {
            CpuModel::Intel8086 => "8086",
            CpuModel::Intel8088 => "8088",
        }
    }

    #[inline]
    fn word_penalty(self, addr: u16) -> u32 {
        match self {
            CpuModel::Intel8088 => 4,
            CpuModel::Intel8086 if addr & 1 != 0 => 4,
            CpuModel::Intel8086 => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Rep {
    /// F3: REP / REPE / REPZ
    Equal,
    /// F2: REPNE / REPNZ
    NotEqual,
}

/// Prefix state of the instruction being decoded.
#[derive(Debug, Clone, Copy, Default)]
struct Prefixes {
    seg: Option<usize>,
    rep: Option<Rep>,
    /// IP of the last prefix byte, where an interrupted REP resumes.
    last_ip: Option<u16>,
}

/// Intel 8086 CPU state
pub struct Cpu8086<B: Bus> {
    pub regs: Registers,
    pub bus: B,
    pub engine: EngineState,
    model: CpuModel,
    reset_vector: Option<u32>,
    run_state: RunState,
    prefix: Prefixes,
    /// Clocks charged by EA resolution and word transfers in the current instruction.
    extra: u32,
    /// Offset of the most recent memory operand.
    last_ea: u16,
    /// Interrupts and trap are held off for one instruction (after MOV/POP SS, STI).
    inhibit: bool,
    trap_pending: bool,
    rep: Option<RepResume>,
}

impl<B: Bus> Cpu8086<B> {
    pub fn new(bus: B) -> Self {
        Self::with_model(bus, CpuModel::Intel8086)
    }

    pub fn with_model(bus: B, model: CpuModel) -> Self {
        let mut engine = EngineState::new(model.name(), 5_000_000, 1, IdlePolicy::Spin);
        engine.interrupts.set_line_vector(InputLine::Irq(0), 0x08);
        Self {
            regs: Registers::default(),
            bus,
            engine,
            model,
            reset_vector: None,
            run_state: RunState::Running,
            prefix: Prefixes::default(),
            extra: 0,
            last_ea: 0,
            inhibit: false,
            trap_pending: false,
            rep: None,
        }
    }

    /// Build and power on a core described by `cfg`. IRQ line `n` acknowledges
    /// with vector `default_intr_vector + n` until reprogrammed.
    pub fn from_config(cfg: &DeviceConfig, bus: B) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let IsaConfig::Intel8086 {
            model,
            default_intr_vector,
        } = cfg.isa
        else {
            return Err(ConfigError::WrongIsa {
                unit: cfg.name.clone(),
                found: cfg.isa.label(),
                expected: "8086",
            });
        };

        let mut cpu = Self::with_model(bus, model);
        cpu.engine = EngineState::new(&cfg.name, cfg.clock_hz, cfg.irq_lines, cfg.idle_policy);
        for n in 0..cfg.irq_lines {
            let vector = default_intr_vector.wrapping_add(n) as u32;
            cpu.engine.interrupts.set_line_vector(InputLine::Irq(n), vector);
        }
        cpu.reset_vector = cfg.reset_vector;
        cpu.reset();
        Ok(cpu)
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    /// Power-on state: CS:IP = FFFF:0000 unless a reset vector is configured.
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        if let Some(addr) = self.reset_vector {
            self.regs.sregs[CS] = (addr >> 4) as u16;
            self.regs.ip = (addr & 0xF) as u16;
        }
        self.run_state = RunState::Running;
        self.prefix = Prefixes::default();
        self.inhibit = false;
        self.trap_pending = false;
        self.rep = None;
    }

    /// 20-bit physical address of `seg:off`.
    #[inline]
    pub fn physical(seg: u16, off: u16) -> u32 {
        (((seg as u32) << 4) + off as u32) & ADDRESS_MASK
    }

    /// Data segment for `default`, honouring a segment override prefix.
    #[inline]
    fn segment(&self, default: usize) -> u16 {
        self.regs.sregs[self.prefix.seg.unwrap_or(default)]
    }

    #[inline]
    fn read8(&mut self, seg: u16, off: u16) -> u8 {
        self.bus.read_byte(Self::physical(seg, off))
    }

    #[inline]
    fn write8(&mut self, seg: u16, off: u16, val: u8) {
        self.bus.write_byte(Self::physical(seg, off), val);
    }

    /// Word read; the high byte comes from `off + 1` within the same segment.
    fn read16(&mut self, seg: u16, off: u16) -> u16 {
        self.extra += self.model.word_penalty(off);
        let lo = self.read8(seg, off) as u16;
        let hi = self.read8(seg, off.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write16(&mut self, seg: u16, off: u16, val: u16) {
        self.extra += self.model.word_penalty(off);
        self.write8(seg, off, val as u8);
        self.write8(seg, off.wrapping_add(1), (val >> 8) as u8);
    }

    #[inline]
    fn fetch_opcode(&mut self) -> u8 {
        let addr = Self::physical(self.regs.sregs[CS], self.regs.ip);
        self.regs.ip = self.regs.ip.wrapping_add(1);
        self.bus.read_opcode(addr)
    }

    #[inline]
    fn fetch_u8(&mut self) -> u8 {
        let addr = Self::physical(self.regs.sregs[CS], self.regs.ip);
        self.regs.ip = self.regs.ip.wrapping_add(1);
        self.bus.read_opcode_arg(addr)
    }

    #[inline]
    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8() as u16;
        let hi = self.fetch_u8() as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, val: u16) {
        let sp = self.regs.w[registers::SP].wrapping_sub(2);
        self.regs.w[registers::SP] = sp;
        self.write16(self.regs.sregs[SS], sp, val);
    }

    fn pop(&mut self) -> u16 {
        let sp = self.regs.w[registers::SP];
        let val = self.read16(self.regs.sregs[SS], sp);
        self.regs.w[registers::SP] = sp.wrapping_add(2);
        val
    }

    fn io_in(&mut self, port: u16, word: bool) -> u16 {
        if word {
            self.extra += self.model.word_penalty(port);
            let lo = self.bus.io_read(port) as u16;
            let hi = self.bus.io_read(port.wrapping_add(1)) as u16;
            (hi << 8) | lo
        } else {
            self.bus.io_read(port) as u16
        }
    }

    fn io_out(&mut self, port: u16, word: bool, val: u16) {
        self.bus.io_write(port, val as u8);
        if word {
            self.extra += self.model.word_penalty(port);
            self.bus.io_write(port.wrapping_add(1), (val >> 8) as u8);
        }
    }

    /// Push FLAGS, CS, IP and jump through interrupt vector `num`.
    fn enter_interrupt(&mut self, num: u8) {
        self.push(self.regs.flags());
        self.push(self.regs.sregs[CS]);
        self.push(self.regs.ip);
        self.regs.set_flag(FLAG_IF, false);
        self.regs.set_flag(FLAG_TF, false);
        let slot = (num as u16) << 2;
        self.regs.ip = self.read16(0, slot);
        self.regs.sregs[CS] = self.read16(0, slot.wrapping_add(2));
        self.rep = None;
    }

    /// Load a segment register; SS loads hold off interrupts for one instruction.
    fn set_sreg(&mut self, sreg: usize, val: u16) {
        self.regs.sregs[sreg] = val;
        if sreg == SS {
            self.inhibit = true;
        }
    }
}

impl<B: Bus> InstructionCore for Cpu8086<B> {
    fn engine(&mut self) -> &mut EngineState {
        &mut self.engine
    }

    fn hook_parts(&mut self) -> (&mut EngineState, &dyn RegisterView, u32) {
        let pc = Self::physical(self.regs.sregs[CS], self.regs.ip);
        (&mut self.engine, &self.regs, pc)
    }

    fn state(&self) -> RunState {
        self.run_state
    }

    fn take_interrupt(&mut self) -> Option<u32> {
        // Cleared by the next executed instruction, not here, so a hook break
        // at this boundary leaves the window intact.
        if self.inhibit {
            return None;
        }
        self.extra = 0;
        let pending = self
            .engine
            .interrupts
            .highest_pending(self.regs.flag(FLAG_IF));
        let (num, cost) = match pending {
            Some(line) => {
                let vector = self.engine.interrupts.acknowledge(line)?;
                match line {
                    InputLine::Nmi => (INT_NMI, timing::NMI),
                    InputLine::Irq(_) => (vector as u8, timing::INTR),
                }
            }
            // A trap still pending after an NMI/INTR entry fires at the next
            // boundary, ahead of the handler's first instruction.
            None if self.trap_pending => {
                self.trap_pending = false;
                (INT_SINGLE_STEP, timing::EXCEPTION)
            }
            None => return None,
        };
        self.run_state = RunState::Running;
        self.enter_interrupt(num);
        Some(cost + self.extra)
    }

    fn execute(&mut self) -> u32 {
        self.execute_instruction()
    }

    fn wait_states(&mut self) -> u32 {
        self.bus.take_wait_states()
    }
}

impl<B: Bus> ExecutionUnit for Cpu8086<B> {
    forward_engine_state!();

    fn reset(&mut self) {
        Cpu8086::reset(self);
    }

    fn run(&mut self, budget: i32) -> i32 {
        run_core(self, budget)
    }

    fn run_state(&self) -> RunState {
        self.run_state
    }

    fn pc(&self) -> u32 {
        Self::physical(self.regs.sregs[CS], self.regs.ip)
    }

    fn registers(&self) -> &dyn RegisterView {
        &self.regs
    }

    fn save_state(&self) -> Value {
        json!({
            "version": STATE_VERSION,
            "cpu": "8086",
            "model": self.model,
            "registers": self.regs,
            "run_state": self.run_state,
            "inhibit": self.inhibit,
            "trap_pending": self.trap_pending,
            "rep": self.rep,
            "last_ea": self.last_ea,
            "engine": self.engine.save(),
            "bus": self.bus.save_state(),
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), StateError> {
        check_envelope(v, "8086")?;
        let model: CpuModel = serde_json::from_value(v["model"].clone())?;
        if model != self.model {
            return Err(StateError::CpuMismatch {
                found: model.name().to_string(),
                expected: self.model.name().to_string(),
            });
        }
        let regs: Registers = serde_json::from_value(v["registers"].clone())?;
        let run_state: RunState = serde_json::from_value(v["run_state"].clone())?;
        let inhibit = v["inhibit"].as_bool().unwrap_or(false);
        let trap_pending = v["trap_pending"].as_bool().unwrap_or(false);
        let rep: Option<RepResume> = serde_json::from_value(v["rep"].clone())?;
        let last_ea = v["last_ea"].as_u64().unwrap_or(0) as u16;

        self.engine
            .load_with_bus(&mut self.bus, &v["bus"], &v["engine"])?;
        self.regs = regs;
        self.run_state = run_state;
        self.inhibit = inhibit;
        self.trap_pending = trap_pending;
        self.rep = rep;
        self.last_ea = last_ea;
        self.prefix = Prefixes::default();
        Ok(())
    }
}
