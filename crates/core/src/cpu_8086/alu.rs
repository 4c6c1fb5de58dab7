//! Arithmetic, logic, shift and BCD helpers.
//!
//! All helpers work on either operand width: `word` selects 16-bit, otherwise
//! only the low byte of the arguments is significant. Flags the 8086 leaves
//! undefined are left unchanged, except AF after logic ops, which is cleared.

use super::registers::{AX, DX, FLAG_AF, FLAG_CF, FLAG_OF, FLAG_PF, FLAG_SF, FLAG_ZF};
use super::Cpu8086;
use crate::bus::Bus;

#[inline]
fn width(word: bool) -> (u32, u32) {
    if word {
        (0xFFFF, 0x8000)
    } else {
        (0xFF, 0x80)
    }
}

#[inline]
fn parity(val: u16) -> bool {
    (val as u8).count_ones() % 2 == 0
}

impl<B: Bus> Cpu8086<B> {
    pub(super) fn set_szp(&mut self, res: u16, word: bool) {
        let (mask, sign) = width(word);
        let res = res as u32 & mask;
        self.regs.set_flag(FLAG_ZF, res == 0);
        self.regs.set_flag(FLAG_SF, res & sign != 0);
        self.regs.set_flag(FLAG_PF, parity(res as u16));
    }

    /// One of the eight ModRM-group ALU operations (ADD OR ADC SBB AND SUB XOR CMP).
    /// CMP returns `a` unchanged so callers can skip the write-back.
    pub(super) fn alu(&mut self, op: u8, a: u16, b: u16, word: bool) -> u16 {
        let carry = self.regs.flag(FLAG_CF);
        match op & 7 {
            0 => self.add(a, b, false, word),
            1 => self.logic(a | b, word),
            2 => self.add(a, b, carry, word),
            3 => self.sub(a, b, carry, word),
            4 => self.logic(a & b, word),
            5 => self.sub(a, b, false, word),
            6 => self.logic(a ^ b, word),
            _ => {
                self.sub(a, b, false, word);
                a
            }
        }
    }

    pub(super) fn add(&mut self, a: u16, b: u16, carry: bool, word: bool) -> u16 {
        let (mask, sign) = width(word);
        let (a, b) = (a as u32 & mask, b as u32 & mask);
        let sum = a + b + carry as u32;
        let res = sum & mask;
        self.regs.set_flag(FLAG_CF, sum > mask);
        self.regs.set_flag(FLAG_AF, (a ^ b ^ res) & 0x10 != 0);
        self.regs.set_flag(FLAG_OF, (a ^ res) & (b ^ res) & sign != 0);
        self.set_szp(res as u16, word);
        res as u16
    }

    pub(super) fn sub(&mut self, a: u16, b: u16, borrow: bool, word: bool) -> u16 {
        let (mask, sign) = width(word);
        let (a, b) = (a as u32 & mask, b as u32 & mask);
        let res = a.wrapping_sub(b).wrapping_sub(borrow as u32) & mask;
        self.regs.set_flag(FLAG_CF, b + borrow as u32 > a);
        self.regs.set_flag(FLAG_AF, (a ^ b ^ res) & 0x10 != 0);
        self.regs.set_flag(FLAG_OF, (a ^ b) & (a ^ res) & sign != 0);
        self.set_szp(res as u16, word);
        res as u16
    }

    pub(super) fn logic(&mut self, res: u16, word: bool) -> u16 {
        let (mask, _) = width(word);
        self.regs.set_flag(FLAG_CF, false);
        self.regs.set_flag(FLAG_OF, false);
        self.regs.set_flag(FLAG_AF, false);
        self.set_szp(res, word);
        (res as u32 & mask) as u16
    }

    /// INC/DEC leave CF alone.
    pub(super) fn inc_dec(&mut self, val: u16, dec: bool, word: bool) -> u16 {
        let carry = self.regs.flag(FLAG_CF);
        let res = if dec {
            self.sub(val, 1, false, word)
        } else {
            self.add(val, 1, false, word)
        };
        self.regs.set_flag(FLAG_CF, carry);
        res
    }

    pub(super) fn neg(&mut self, val: u16, word: bool) -> u16 {
        self.sub(0, val, false, word)
    }

    /// Shift group 0xD0-0xD3 `/op`, applied `count` times. A zero count
    /// changes nothing. `/6` is the undocumented SETMO.
    pub(super) fn shift(&mut self, op: u8, val: u16, count: u8, word: bool) -> u16 {
        if count == 0 {
            return val;
        }
        let (mask, sign) = width(word);
        let val = val as u32 & mask;
        let mut res = val;
        let mut cf = self.regs.flag(FLAG_CF);

        match op & 7 {
            0 => {
                for _ in 0..count {
                    cf = res & sign != 0;
                    res = ((res << 1) | cf as u32) & mask;
                }
                self.regs.set_flag(FLAG_OF, (res & sign != 0) != cf);
            }
            1 => {
                for _ in 0..count {
                    cf = res & 1 != 0;
                    res = (res >> 1) | if cf { sign } else { 0 };
                }
                self.regs
                    .set_flag(FLAG_OF, ((res ^ (res << 1)) & sign) != 0);
            }
            2 => {
                for _ in 0..count {
                    let out = res & sign != 0;
                    res = ((res << 1) | cf as u32) & mask;
                    cf = out;
                }
                self.regs.set_flag(FLAG_OF, (res & sign != 0) != cf);
            }
            3 => {
                for _ in 0..count {
                    let out = res & 1 != 0;
                    res = (res >> 1) | if cf { sign } else { 0 };
                    cf = out;
                }
                self.regs
                    .set_flag(FLAG_OF, ((res ^ (res << 1)) & sign) != 0);
            }
            4 => {
                for _ in 0..count {
                    cf = res & sign != 0;
                    res = (res << 1) & mask;
                }
                self.regs.set_flag(FLAG_OF, (res & sign != 0) != cf);
                self.set_szp(res as u16, word);
            }
            5 => {
                for _ in 0..count {
                    cf = res & 1 != 0;
                    res >>= 1;
                }
                self.regs.set_flag(FLAG_OF, val & sign != 0);
                self.set_szp(res as u16, word);
            }
            6 => {
                res = mask;
                cf = false;
                self.regs.set_flag(FLAG_OF, false);
                self.regs.set_flag(FLAG_AF, false);
                self.set_szp(res as u16, word);
            }
            _ => {
                for _ in 0..count {
                    cf = res & 1 != 0;
                    res = (res >> 1) | (res & sign);
                }
                self.regs.set_flag(FLAG_OF, false);
                self.set_szp(res as u16, word);
            }
        }
        self.regs.set_flag(FLAG_CF, cf);
        res as u16
    }

    /// MUL/IMUL into AX or DX:AX. CF and OF report a significant upper half.
    pub(super) fn multiply(&mut self, val: u16, signed: bool, word: bool) {
        let upper = if word {
            let product = if signed {
                (self.regs.w[AX] as i16 as i32 * val as i16 as i32) as u32
            } else {
                self.regs.w[AX] as u32 * val as u32
            };
            self.regs.w[AX] = product as u16;
            self.regs.w[DX] = (product >> 16) as u16;
            if signed {
                product as i32 != product as u16 as i16 as i32
            } else {
                product >> 16 != 0
            }
        } else {
            let product = if signed {
                (self.regs.al() as i8 as i16 * val as u8 as i8 as i16) as u16
            } else {
                self.regs.al() as u16 * (val as u8) as u16
            };
            self.regs.w[AX] = product;
            if signed {
                product as i16 != product as u8 as i8 as i16
            } else {
                product >> 8 != 0
            }
        };
        self.regs.set_flag(FLAG_CF, upper);
        self.regs.set_flag(FLAG_OF, upper);
    }

    /// DIV/IDIV from AX or DX:AX. Returns false on divide error (zero
    /// divisor or quotient out of range), leaving the registers untouched.
    pub(super) fn divide(&mut self, val: u16, signed: bool, word: bool) -> bool {
        if word {
            let dividend = ((self.regs.w[DX] as u32) << 16) | self.regs.w[AX] as u32;
            let (q, r) = if signed {
                let d = val as i16 as i32;
                let n = dividend as i32;
                let (Some(q), Some(r)) = (n.checked_div(d), n.checked_rem(d)) else {
                    return false;
                };
                if !(-0x7FFF..=0x7FFF).contains(&q) {
                    return false;
                }
                (q as u16, r as u16)
            } else {
                let d = val as u32;
                if d == 0 || dividend / d > 0xFFFF {
                    return false;
                }
                ((dividend / d) as u16, (dividend % d) as u16)
            };
            self.regs.w[AX] = q;
            self.regs.w[DX] = r;
        } else {
            let dividend = self.regs.w[AX];
            let (q, r) = if signed {
                let d = val as u8 as i8 as i16;
                let n = dividend as i16;
                let (Some(q), Some(r)) = (n.checked_div(d), n.checked_rem(d)) else {
                    return false;
                };
                if !(-0x7F..=0x7F).contains(&q) {
                    return false;
                }
                (q as u8, r as u8)
            } else {
                let d = val as u8 as u16;
                if d == 0 || dividend / d > 0xFF {
                    return false;
                }
                ((dividend / d) as u8, (dividend % d) as u8)
            };
            self.regs.w[AX] = ((r as u16) << 8) | q as u16;
        }
        true
    }

    pub(super) fn daa(&mut self) {
        let old_al = self.regs.al();
        let old_cf = self.regs.flag(FLAG_CF);
        let mut al = old_al;
        if old_al & 0x0F > 9 || self.regs.flag(FLAG_AF) {
            al = al.wrapping_add(6);
            self.regs.set_flag(FLAG_AF, true);
        } else {
            self.regs.set_flag(FLAG_AF, false);
        }
        if old_al > 0x99 || old_cf {
            al = al.wrapping_add(0x60);
            self.regs.set_flag(FLAG_CF, true);
        } else {
            self.regs.set_flag(FLAG_CF, false);
        }
        self.regs.set_al(al);
        self.set_szp(al as u16, false);
    }

    pub(super) fn das(&mut self) {
        let old_al = self.regs.al();
        let old_cf = self.regs.flag(FLAG_CF);
        let mut al = old_al;
        if old_al & 0x0F > 9 || self.regs.flag(FLAG_AF) {
            al = al.wrapping_sub(6);
            self.regs.set_flag(FLAG_AF, true);
        } else {
            self.regs.set_flag(FLAG_AF, false);
        }
        if old_al > 0x99 || old_cf {
            al = al.wrapping_sub(0x60);
            self.regs.set_flag(FLAG_CF, true);
        } else {
            self.regs.set_flag(FLAG_CF, false);
        }
        self.regs.set_al(al);
        self.set_szp(al as u16, false);
    }

    /// AAA (`sub == false`) and AAS.
    pub(super) fn ascii_adjust(&mut self, sub: bool) {
        let ax = self.regs.w[AX];
        let adjust = ax & 0x0F > 9 || self.regs.flag(FLAG_AF);
        let ax = match (adjust, sub) {
            (false, _) => ax,
            (true, false) => ax.wrapping_add(0x106),
            (true, true) => ax.wrapping_sub(6).wrapping_sub(0x100),
        };
        self.regs.w[AX] = ax & 0xFF0F;
        self.regs.set_flag(FLAG_AF, adjust);
        self.regs.set_flag(FLAG_CF, adjust);
    }

    /// AAM; false when `base` is zero (divide error).
    pub(super) fn aam(&mut self, base: u8) -> bool {
        if base == 0 {
            return false;
        }
        let al = self.regs.al();
        let (ah, al) = (al / base, al % base);
        self.regs.w[AX] = ((ah as u16) << 8) | al as u16;
        self.set_szp(al as u16, false);
        true
    }

    pub(super) fn aad(&mut self, base: u8) {
        let ax = self.regs.w[AX];
        let al = ((ax >> 8) as u8).wrapping_mul(base).wrapping_add(ax as u8);
        self.regs.w[AX] = al as u16;
        self.set_szp(al as u16, false);
    }
}
