//! Effective-address resolution for the 6502 addressing modes.
//!
//! Operand bytes are consumed through `read_opcode_arg`. The NMOS dummy
//! reads that hit the bus while an address is being formed are reproduced:
//! the unindexed zero-page base for `zp,X`/`zp,Y`/`(zp,X)`, and the
//! not-yet-fixed-up address for indexed modes when the index carries into
//! the high byte (always, for stores and read-modify-write).

use super::table::{Mode, OpcodeEntry};
use super::Cpu6502;
use crate::bus::Bus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Operand {
    None,
    Accumulator,
    /// Immediate value, or the signed offset of a branch.
    Immediate(u8),
    Address {
        addr: u16,
        /// Address before indexing; SHA/SHX/SHY/TAS use its high byte.
        base: u16,
        crossed: bool,
    },
}

impl Operand {
    fn at(addr: u16) -> Self {
        Operand::Address {
            addr,
            base: addr,
            crossed: false,
        }
    }

    pub(super) fn crossed_page(&self) -> bool {
        matches!(self, Operand::Address { crossed: true, .. })
    }
}

impl<B: Bus> Cpu6502<B> {
    pub(super) fn resolve(&mut self, entry: &OpcodeEntry) -> Operand {
        let writes = entry.op.is_store() || entry.op.is_rmw();
        match entry.mode {
            Mode::Implied => Operand::None,
            Mode::Accumulator => Operand::Accumulator,
            Mode::Immediate | Mode::Relative => Operand::Immediate(self.fetch_u8()),
            Mode::ZeroPage => Operand::at(self.fetch_u8() as u16),
            Mode::ZeroPageX => {
                let zp = self.fetch_u8();
                self.read(zp as u16);
                Operand::at(zp.wrapping_add(self.regs.x) as u16)
            }
            Mode::ZeroPageY => {
                let zp = self.fetch_u8();
                self.read(zp as u16);
                Operand::at(zp.wrapping_add(self.regs.y) as u16)
            }
            Mode::Absolute => Operand::at(self.fetch_u16()),
            Mode::AbsoluteX => {
                let base = self.fetch_u16();
                self.indexed(base, self.regs.x, writes)
            }
            Mode::AbsoluteY => {
                let base = self.fetch_u16();
                self.indexed(base, self.regs.y, writes)
            }
            Mode::Indirect => {
                // The pointer's high byte is fetched without carrying into the page.
                let ptr = self.fetch_u16();
                let lo = self.read(ptr) as u16;
                let hi = self.read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
                Operand::at((hi << 8) | lo)
            }
            Mode::IndirectX => {
                let zp = self.fetch_u8();
                self.read(zp as u16);
                let ptr = zp.wrapping_add(self.regs.x);
                let lo = self.read(ptr as u16) as u16;
                let hi = self.read(ptr.wrapping_add(1) as u16) as u16;
                Operand::at((hi << 8) | lo)
            }
            Mode::IndirectY => {
                let zp = self.fetch_u8();
                let lo = self.read(zp as u16) as u16;
                let hi = self.read(zp.wrapping_add(1) as u16) as u16;
                self.indexed((hi << 8) | lo, self.regs.y, writes)
            }
        }
    }

    fn indexed(&mut self, base: u16, index: u8, writes: bool) -> Operand {
        let addr = base.wrapping_add(index as u16);
        let crossed = (base ^ addr) & 0xFF00 != 0;
        if crossed || writes {
            self.read((base & 0xFF00) | (addr & 0x00FF));
        }
        Operand::Address {
            addr,
            base,
            crossed,
        }
    }

    /// Value of a read operand.
    pub(super) fn load(&mut self, operand: Operand) -> u8 {
        match operand {
            Operand::Immediate(v) => v,
            Operand::Accumulator => self.regs.a,
            Operand::Address { addr, .. } => self.read(addr),
            Operand::None => 0,
        }
    }

    pub(super) fn store(&mut self, operand: Operand, val: u8) {
        if let Operand::Address { addr, .. } = operand {
            self.write(addr, val);
        }
    }
}
