//! ModRM decoding and effective-address resolution.
//!
//! The resolver charges the effective-address clocks as it goes, so an
//! instruction only adds its own base cost. Offsets wrap at 64K inside the
//! segment; the physical address is `(segment << 4) + offset` over 20 bits.

use super::registers::{BP, BX, DI, DS, SI, SS};
use super::timing::{ea_cycles, RmTiming};
use super::Cpu8086;
use crate::bus::Bus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ModRm {
    pub md: u8,
    pub reg: u8,
    pub rm: u8,
}

impl ModRm {
    pub fn new(byte: u8) -> Self {
        Self {
            md: byte >> 6,
            reg: (byte >> 3) & 7,
            rm: byte & 7,
        }
    }
}

/// Where an operand lives once the ModRM byte has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Place {
    Reg(u8),
    Mem { seg: u16, off: u16 },
}

impl Place {
    pub fn cost(&self, t: RmTiming) -> u32 {
        match self {
            Place::Reg(_) => t.reg,
            Place::Mem { .. } => t.mem,
        }
    }
}

impl<B: Bus> Cpu8086<B> {
    pub(super) fn fetch_modrm(&mut self) -> ModRm {
        ModRm::new(self.fetch_u8())
    }

    /// Resolve the r/m half of a ModRM byte, consuming any displacement.
    pub(super) fn resolve(&mut self, m: ModRm) -> Place {
        if m.md == 3 {
            return Place::Reg(m.rm);
        }
        let w = self.regs.w;
        let disp = match m.md {
            1 => self.fetch_u8() as i8 as u16,
            2 => self.fetch_u16(),
            _ => 0,
        };
        let (base, default_seg) = match m.rm {
            0 => (w[BX].wrapping_add(w[SI]), DS),
            1 => (w[BX].wrapping_add(w[DI]), DS),
            2 => (w[BP].wrapping_add(w[SI]), SS),
            3 => (w[BP].wrapping_add(w[DI]), SS),
            4 => (w[SI], DS),
            5 => (w[DI], DS),
            6 if m.md == 0 => (self.fetch_u16(), DS),
            6 => (w[BP], SS),
            _ => (w[BX], DS),
        };
        let off = base.wrapping_add(disp);
        self.extra += ea_cycles(m.md, m.rm);
        self.last_ea = off;
        Place::Mem {
            seg: self.segment(default_seg),
            off,
        }
    }

    /// Operand of width `word` at `place`.
    pub(super) fn read_place(&mut self, place: Place, word: bool) -> u16 {
        match (place, word) {
            (Place::Reg(r), true) => self.regs.w[r as usize],
            (Place::Reg(r), false) => self.regs.byte(r) as u16,
            (Place::Mem { seg, off }, true) => self.read16(seg, off),
            (Place::Mem { seg, off }, false) => self.read8(seg, off) as u16,
        }
    }

    pub(super) fn write_place(&mut self, place: Place, word: bool, val: u16) {
        match (place, word) {
            (Place::Reg(r), true) => self.regs.w[r as usize] = val,
            (Place::Reg(r), false) => self.regs.set_byte(r, val as u8),
            (Place::Mem { seg, off }, true) => self.write16(seg, off, val),
            (Place::Mem { seg, off }, false) => self.write8(seg, off, val as u8),
        }
    }

    /// General register named by a ModRM `reg` field.
    pub(super) fn read_reg(&self, r: u8, word: bool) -> u16 {
        if word {
            self.regs.w[r as usize]
        } else {
            self.regs.byte(r) as u16
        }
    }

    pub(super) fn write_reg(&mut self, r: u8, word: bool, val: u16) {
        if word {
            self.regs.w[r as usize] = val;
        } else {
            self.regs.set_byte(r, val as u8);
        }
    }

    /// Segment and offset of a memory operand. Register operands stand in for
    /// the most recently computed effective address, as LEA/LES/LDS and far
    /// indirect transfers do on the 8086 when given a register.
    pub(super) fn place_address(&self, place: Place) -> (u16, u16) {
        match place {
            Place::Mem { seg, off } => (seg, off),
            Place::Reg(_) => (self.segment(DS), self.last_ea),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FlatMemory;
    use crate::cpu_8086::registers::{CS, ES};

    fn cpu_with(code: &[u8]) -> Cpu8086<FlatMemory> {
        let mut mem = FlatMemory::new(20);
        mem.load(0x1000, code);
        let mut cpu = Cpu8086::new(mem);
        cpu.regs.sregs[CS] = 0x0100;
        cpu.regs.ip = 0;
        cpu
    }

    #[test]
    fn decode_fields() {
        let m = ModRm::new(0b10_011_101);
        assert_eq!((m.md, m.reg, m.rm), (2, 3, 5));
    }

    #[test]
    fn register_mode_has_no_address_or_cost() {
        let mut cpu = cpu_with(&[]);
        assert_eq!(cpu.resolve(ModRm::new(0xC3)), Place::Reg(3));
        assert_eq!(cpu.extra, 0);
    }

    #[test]
    fn bp_forms_default_to_stack_segment() {
        let mut cpu = cpu_with(&[0x10]);
        cpu.regs.sregs[SS] = 0x2000;
        cpu.regs.sregs[DS] = 0x3000;
        cpu.regs.w[BP] = 0x0100;
        let place = cpu.resolve(ModRm::new(0b01_000_110));
        assert_eq!(
            place,
            Place::Mem {
                seg: 0x2000,
                off: 0x0110
            }
        );
        assert_eq!(cpu.extra, 9);
    }

    #[test]
    fn direct_address_and_override() {
        let mut cpu = cpu_with(&[0x34, 0x12]);
        cpu.regs.sregs[ES] = 0x4000;
        cpu.prefix.seg = Some(ES);
        let place = cpu.resolve(ModRm::new(0b00_000_110));
        assert_eq!(
            place,
            Place::Mem {
                seg: 0x4000,
                off: 0x1234
            }
        );
        assert_eq!(cpu.extra, 6);
    }

    #[test]
    fn negative_displacement_wraps_offset() {
        let mut cpu = cpu_with(&[0xFE]);
        cpu.regs.w[SI] = 0x0001;
        let place = cpu.resolve(ModRm::new(0b01_000_100));
        assert_eq!(place, Place::Mem { seg: 0, off: 0xFFFF });
    }
}
