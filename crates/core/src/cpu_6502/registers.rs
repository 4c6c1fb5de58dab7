//! 6502 register file.

use serde::{Deserialize, Serialize};

use crate::engine::RegisterView;

pub const FLAG_C: u8 = 0x01;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_D: u8 = 0x08;
/// Only exists in pushed copies of P.
pub const FLAG_B: u8 = 0x10;
/// Always reads back as 1.
pub const FLAG_U: u8 = 0x20;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_N: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer; the stack lives at $0100 + sp.
    pub sp: u8,
    /// Status register (NV-BDIZC)
    pub p: u8,
    pub pc: u16,
    /// Address of the instruction being (or last) executed.
    pub prev_pc: u16,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            p: FLAG_U | FLAG_I,
            pc: 0,
            prev_pc: 0,
        }
    }
}

impl Registers {
    #[inline]
    pub fn flag(&self, mask: u8) -> bool {
        self.p & mask != 0
    }

    #[inline]
    pub fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.p |= mask;
        } else {
            self.p &= !mask;
        }
    }

    #[inline]
    pub fn set_zn(&mut self, v: u8) {
        self.set_flag(FLAG_Z, v == 0);
        self.set_flag(FLAG_N, v & 0x80 != 0);
    }
}

const NAMES: &[&str] = &["A", "X", "Y", "SP", "P", "PC", "PPC"];

impl RegisterView for Registers {
    fn register(&self, name: &str) -> Option<u32> {
        let v = match name {
            "A" => self.a as u32,
            "X" => self.x as u32,
            "Y" => self.y as u32,
            "SP" => self.sp as u32,
            "P" => self.p as u32,
            "PC" => self.pc as u32,
            "PPC" => self.prev_pc as u32,
            _ => return None,
        };
        Some(v)
    }

    fn register_names(&self) -> &'static [&'static str] {
        NAMES
    }
}
