//! Tests for the 8086 core
//!
//! - `tests_addressing`: effective addresses, segment rules and their clock costs
//! - `tests_alu`: arithmetic, logic, shifts, multiply/divide and BCD through real opcodes
//! - `tests_jumps`: jumps, calls, returns, loops
//! - `tests_misc`: interrupts, string instructions, I/O, aliases and save states

mod tests_misc;

use super::registers::{CS, DS, ES, SP, SS};
use super::{Cpu8086, CpuModel};
use crate::bus::{Bus, FlatMemory};

/// Physical address the test programs are loaded at (CS=0100, IP=0000).
const CODE: u32 = 0x1000;

fn cpu_with(code: &[u8]) -> Cpu8086<FlatMemory> {
    cpu_model(code, CpuModel::Intel8086)
}

fn cpu_model(code: &[u8], model: CpuModel) -> Cpu8086<FlatMemory> {
    let mut mem = FlatMemory::new(20);
    mem.load(CODE, code);
    let mut cpu = Cpu8086::with_model(mem, model);
    cpu.regs.sregs[CS] = 0x0100;
    cpu.regs.ip = 0;
    cpu.regs.sregs[SS] = 0x2000;
    cpu.regs.w[SP] = 0x0100;
    cpu.regs.sregs[DS] = 0x3000;
    cpu.regs.sregs[ES] = 0x4000;
    cpu
}

/// Point interrupt vector `num` at `seg:off`.
fn set_vector(cpu: &mut Cpu8086<FlatMemory>, num: u8, seg: u16, off: u16) {
    let slot = num as u32 * 4;
    cpu.bus.write_word(slot, off);
    cpu.bus.write_word(slot + 2, seg);
}

/// Word on top of the stack, `depth` words down.
fn stack_word(cpu: &mut Cpu8086<FlatMemory>, depth: u16) -> u16 {
    let sp = cpu.regs.w[SP].wrapping_add(depth * 2);
    let addr = Cpu8086::<FlatMemory>::physical(cpu.regs.sregs[SS], sp);
    cpu.bus.read_word(addr)
}
