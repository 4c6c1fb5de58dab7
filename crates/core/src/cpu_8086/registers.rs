//! 8086 register file.
//!
//! General registers are stored in ModRM encoding order so a `reg`/`rm` field
//! indexes them directly. Byte registers 0-3 are the low halves of AX/CX/DX/BX
//! and 4-7 the high halves.

use serde::{Deserialize, Serialize};

use crate::engine::RegisterView;

pub const AX: usize = 0;
pub const CX: usize = 1;
pub const DX: usize = 2;
pub const BX: usize = 3;
pub const SP: usize = 4;
pub const BP: usize = 5;
pub const SI: usize = 6;
pub const DI: usize = 7;

pub const ES: usize = 0;
pub const CS: usize = 1;
pub const SS: usize = 2;
pub const DS: usize = 3;

pub const FLAG_CF: u16 = 0x0001;
pub const FLAG_PF: u16 = 0x0004;
pub const FLAG_AF: u16 = 0x0010;
pub const FLAG_ZF: u16 = 0x0040;
pub const FLAG_SF: u16 = 0x0080;
pub const FLAG_TF: u16 = 0x0100;
pub const FLAG_IF: u16 = 0x0200;
pub const FLAG_DF: u16 = 0x0400;
pub const FLAG_OF: u16 = 0x0800;

/// Bits that read back as 1 on the 8086 (1 and 12-15).
const FLAGS_FIXED: u16 = 0xF002;
const FLAGS_WRITABLE: u16 = 0x0FD5;

const NAMES: &[&str] = &[
    "AX", "CX", "DX", "BX", "SP", "BP", "SI", "DI", "ES", "CS", "SS", "DS", "IP", "FLAGS",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub w: [u16; 8],
    pub sregs: [u16; 4],
    pub ip: u16,
    flags: u16,
}

impl Default for Registers {
    fn default() -> Self {
        let mut sregs = [0; 4];
        sregs[CS] = 0xFFFF;
        Self {
            w: [0; 8],
            sregs,
            ip: 0,
            flags: FLAGS_FIXED,
        }
    }
}

impl Registers {
    #[inline]
    pub fn byte(&self, r: u8) -> u8 {
        let word = self.w[(r & 3) as usize];
        if r < 4 {
            word as u8
        } else {
            (word >> 8) as u8
        }
    }

    #[inline]
    pub fn set_byte(&mut self, r: u8, val: u8) {
        let word = &mut self.w[(r & 3) as usize];
        if r < 4 {
            *word = (*word & 0xFF00) | val as u16;
        } else {
            *word = (*word & 0x00FF) | ((val as u16) << 8);
        }
    }

    #[inline]
    pub fn al(&self) -> u8 {
        self.w[AX] as u8
    }

    #[inline]
    pub fn set_al(&mut self, val: u8) {
        self.set_byte(0, val);
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Load FLAGS, forcing the fixed bits.
    #[inline]
    pub fn set_flags(&mut self, val: u16) {
        self.flags = (val & FLAGS_WRITABLE) | FLAGS_FIXED;
    }

    #[inline]
    pub fn flag(&self, mask: u16) -> bool {
        self.flags & mask != 0
    }

    #[inline]
    pub fn set_flag(&mut self, mask: u16, on: bool) {
        if on {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
    }

    /// Condition codes 0-15 as used by Jcc (low nibble of 0x70-0x7F).
    pub fn condition(&self, cc: u8) -> bool {
        let (cf, zf, sf, of, pf) = (
            self.flag(FLAG_CF),
            self.flag(FLAG_ZF),
            self.flag(FLAG_SF),
            self.flag(FLAG_OF),
            self.flag(FLAG_PF),
        );
        let taken = match cc >> 1 {
            0 => of,
            1 => cf,
            2 => zf,
            3 => cf || zf,
            4 => sf,
            5 => pf,
            6 => sf != of,
            _ => zf || sf != of,
        };
        taken != (cc & 1 != 0)
    }
}

impl RegisterView for Registers {
    fn register(&self, name: &str) -> Option<u32> {
        let idx = NAMES.iter().position(|n| n.eq_ignore_ascii_case(name))?;
        let v = match idx {
            0..=7 => self.w[idx],
            8..=11 => self.sregs[idx - 8],
            12 => self.ip,
            _ => self.flags,
        };
        Some(v as u32)
    }

    fn register_names(&self) -> &'static [&'static str] {
        NAMES
    }
}
