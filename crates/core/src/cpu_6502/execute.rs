//! Instruction semantics. One `match` arm per operation; the opcode table
//! supplies the addressing mode and base cost.

use super::addressing::Operand;
use super::registers::{FLAG_B, FLAG_C, FLAG_D, FLAG_I, FLAG_N, FLAG_U, FLAG_V, FLAG_Z};
use super::table::{Op, OPCODES};
use super::{Cpu6502, IRQ_VECTOR};
use crate::bus::Bus;
use crate::logging::{log, LogCategory, LogLevel};

impl<B: Bus> Cpu6502<B> {
    /// Execute one instruction and return its cost (wait states excluded).
    pub(super) fn execute_instruction(&mut self) -> u32 {
        self.regs.prev_pc = self.regs.pc;
        self.delayed_i = None;
        let opcode = self.fetch_opcode();
        let entry = OPCODES[opcode as usize];

        if entry.op.is_unstable() {
            log(LogCategory::Stubs, LogLevel::Debug, || {
                format!(
                    "unstable opcode {:02X} ({:?}) at {:04X}, magic {:02X}",
                    opcode, entry.op, self.regs.prev_pc, self.ane_magic
                )
            });
        } else if entry.op.is_undocumented() {
            log(LogCategory::CPU, LogLevel::Trace, || {
                format!(
                    "undocumented opcode {:02X} ({:?}) at {:04X}",
                    opcode, entry.op, self.regs.prev_pc
                )
            });
        }

        let operand = self.resolve(&entry);
        let mut cycles = entry.cycles as u32;
        if entry.page_penalty && operand.crossed_page() {
            cycles += 1;
        }

        match entry.op {
            Op::Adc => {
                let v = self.load(operand);
                self.adc(v);
            }
            Op::And => {
                let v = self.load(operand);
                self.regs.a &= v;
                self.regs.set_zn(self.regs.a);
            }
            Op::Asl => {
                self.modify(operand, Self::asl);
            }
            Op::Bcc => cycles += self.branch(!self.regs.flag(FLAG_C), operand),
            Op::Bcs => cycles += self.branch(self.regs.flag(FLAG_C), operand),
            Op::Beq => cycles += self.branch(self.regs.flag(FLAG_Z), operand),
            Op::Bmi => cycles += self.branch(self.regs.flag(FLAG_N), operand),
            Op::Bne => cycles += self.branch(!self.regs.flag(FLAG_Z), operand),
            Op::Bpl => cycles += self.branch(!self.regs.flag(FLAG_N), operand),
            Op::Bvc => cycles += self.branch(!self.regs.flag(FLAG_V), operand),
            Op::Bvs => cycles += self.branch(self.regs.flag(FLAG_V), operand),
            Op::Bit => {
                let v = self.load(operand);
                self.regs.set_flag(FLAG_Z, self.regs.a & v == 0);
                self.regs.set_flag(FLAG_N, v & 0x80 != 0);
                self.regs.set_flag(FLAG_V, v & 0x40 != 0);
            }
            Op::Brk => {
                // Skips the padding byte after the opcode.
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.enter_interrupt(IRQ_VECTOR, true);
            }
            Op::Clc => self.regs.set_flag(FLAG_C, false),
            Op::Cld => self.regs.set_flag(FLAG_D, false),
            Op::Cli => self.set_i_delayed(false),
            Op::Clv => self.regs.set_flag(FLAG_V, false),
            Op::Cmp => {
                let v = self.load(operand);
                self.compare(self.regs.a, v);
            }
            Op::Cpx => {
                let v = self.load(operand);
                self.compare(self.regs.x, v);
            }
            Op::Cpy => {
                let v = self.load(operand);
                self.compare(self.regs.y, v);
            }
            Op::Dec => {
                self.modify(operand, Self::dec);
            }
            Op::Dex => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.regs.set_zn(self.regs.x);
            }
            Op::Dey => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.regs.set_zn(self.regs.y);
            }
            Op::Eor => {
                let v = self.load(operand);
                self.regs.a ^= v;
                self.regs.set_zn(self.regs.a);
            }
            Op::Inc => {
                self.modify(operand, Self::inc);
            }
            Op::Inx => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.regs.set_zn(self.regs.x);
            }
            Op::Iny => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.regs.set_zn(self.regs.y);
            }
            Op::Jmp => {
                if let Operand::Address { addr, .. } = operand {
                    self.regs.pc = addr;
                }
            }
            Op::Jsr => {
                if let Operand::Address { addr, .. } = operand {
                    self.push_u16(self.regs.pc.wrapping_sub(1));
                    self.regs.pc = addr;
                }
            }
            Op::Lda => {
                self.regs.a = self.load(operand);
                self.regs.set_zn(self.regs.a);
            }
            Op::Ldx => {
                self.regs.x = self.load(operand);
                self.regs.set_zn(self.regs.x);
            }
            Op::Ldy => {
                self.regs.y = self.load(operand);
                self.regs.set_zn(self.regs.y);
            }
            Op::Lsr => {
                self.modify(operand, Self::lsr);
            }
            Op::Nop => {
                // Memory forms still perform their read.
                if let Operand::Address { .. } = operand {
                    self.load(operand);
                }
            }
            Op::Ora => {
                let v = self.load(operand);
                self.regs.a |= v;
                self.regs.set_zn(self.regs.a);
            }
            Op::Pha => self.push_u8(self.regs.a),
            Op::Php => self.push_u8(self.regs.p | FLAG_B | FLAG_U),
            Op::Pla => {
                self.regs.a = self.pop_u8();
                self.regs.set_zn(self.regs.a);
            }
            Op::Plp => {
                let old_i = self.regs.flag(FLAG_I);
                let s = self.pop_u8();
                self.regs.p = (s & !FLAG_B) | FLAG_U;
                self.delayed_i = Some(old_i);
            }
            Op::Rol => {
                self.modify(operand, Self::rol);
            }
            Op::Ror => {
                self.modify(operand, Self::ror);
            }
            Op::Rti => {
                let s = self.pop_u8();
                self.regs.p = (s & !FLAG_B) | FLAG_U;
                self.regs.pc = self.pop_u16();
            }
            Op::Rts => {
                self.regs.pc = self.pop_u16().wrapping_add(1);
            }
            Op::Sbc => {
                let v = self.load(operand);
                self.sbc(v);
            }
            Op::Sec => self.regs.set_flag(FLAG_C, true),
            Op::Sed => self.regs.set_flag(FLAG_D, true),
            Op::Sei => self.set_i_delayed(true),
            Op::Sta => self.store(operand, self.regs.a),
            Op::Stx => self.store(operand, self.regs.x),
            Op::Sty => self.store(operand, self.regs.y),
            Op::Tax => {
                self.regs.x = self.regs.a;
                self.regs.set_zn(self.regs.x);
            }
            Op::Tay => {
                self.regs.y = self.regs.a;
                self.regs.set_zn(self.regs.y);
            }
            Op::Tsx => {
                self.regs.x = self.regs.sp;
                self.regs.set_zn(self.regs.x);
            }
            Op::Txa => {
                self.regs.a = self.regs.x;
                self.regs.set_zn(self.regs.a);
            }
            Op::Txs => self.regs.sp = self.regs.x,
            Op::Tya => {
                self.regs.a = self.regs.y;
                self.regs.set_zn(self.regs.a);
            }

            // Undocumented NMOS opcodes
            Op::Alr => {
                let v = self.load(operand);
                let a = self.regs.a & v;
                self.regs.a = self.lsr(a);
            }
            Op::Anc => {
                let v = self.load(operand);
                self.regs.a &= v;
                self.regs.set_zn(self.regs.a);
                self.regs.set_flag(FLAG_C, self.regs.a & 0x80 != 0);
            }
            Op::Ane => {
                let v = self.load(operand);
                self.regs.a = (self.regs.a | self.ane_magic) & self.regs.x & v;
                self.regs.set_zn(self.regs.a);
            }
            Op::Arr => {
                let v = self.load(operand);
                self.arr(v);
            }
            Op::Dcp => {
                let r = self.modify(operand, Self::dec);
                self.compare(self.regs.a, r);
            }
            Op::Isc => {
                let r = self.modify(operand, Self::inc);
                self.sbc(r);
            }
            Op::Jam => self.jam(opcode),
            Op::Las => {
                let v = self.load(operand) & self.regs.sp;
                self.regs.a = v;
                self.regs.x = v;
                self.regs.sp = v;
                self.regs.set_zn(v);
            }
            Op::Lax => {
                let v = self.load(operand);
                self.regs.a = v;
                self.regs.x = v;
                self.regs.set_zn(v);
            }
            Op::Lxa => {
                let v = (self.regs.a | self.ane_magic) & self.load(operand);
                self.regs.a = v;
                self.regs.x = v;
                self.regs.set_zn(v);
            }
            Op::Rla => {
                let r = self.modify(operand, Self::rol);
                self.regs.a &= r;
                self.regs.set_zn(self.regs.a);
            }
            Op::Rra => {
                let r = self.modify(operand, Self::ror);
                self.adc(r);
            }
            Op::Sax => self.store(operand, self.regs.a & self.regs.x),
            Op::Sbx => {
                let v = self.load(operand);
                let t = self.regs.a & self.regs.x;
                self.regs.set_flag(FLAG_C, t >= v);
                self.regs.x = t.wrapping_sub(v);
                self.regs.set_zn(self.regs.x);
            }
            Op::Sha => self.store_and_high(operand, self.regs.a & self.regs.x),
            Op::Shx => self.store_and_high(operand, self.regs.x),
            Op::Shy => self.store_and_high(operand, self.regs.y),
            Op::Slo => {
                let r = self.modify(operand, Self::asl);
                self.regs.a |= r;
                self.regs.set_zn(self.regs.a);
            }
            Op::Sre => {
                let r = self.modify(operand, Self::lsr);
                self.regs.a ^= r;
                self.regs.set_zn(self.regs.a);
            }
            Op::Tas => {
                self.regs.sp = self.regs.a & self.regs.x;
                self.store_and_high(operand, self.regs.sp);
            }
        }

        cycles
    }

    fn set_i_delayed(&mut self, on: bool) {
        self.delayed_i = Some(self.regs.flag(FLAG_I));
        self.regs.set_flag(FLAG_I, on);
    }

    /// Returns the extra cycles: +1 taken, +1 more if the target is on another page.
    fn branch(&mut self, taken: bool, operand: Operand) -> u32 {
        let Operand::Immediate(offset) = operand else {
            return 0;
        };
        if !taken {
            return 0;
        }
        let target = self.regs.pc.wrapping_add(offset as i8 as u16);
        let extra = if (target ^ self.regs.pc) & 0xFF00 != 0 { 2 } else { 1 };
        self.regs.pc = target;
        extra
    }

    /// Read-modify-write. Memory operands see the unmodified value written
    /// back before the result, as NMOS parts do.
    fn modify(&mut self, operand: Operand, f: fn(&mut Self, u8) -> u8) -> u8 {
        match operand {
            Operand::Accumulator => {
                let a = self.regs.a;
                let r = f(self, a);
                self.regs.a = r;
                r
            }
            Operand::Address { addr, .. } => {
                let v = self.read(addr);
                self.write(addr, v);
                let r = f(self, v);
                self.write(addr, r);
                r
            }
            Operand::None | Operand::Immediate(_) => 0,
        }
    }

    /// SHA/SHX/SHY/TAS: value ANDed with (base high byte + 1). When the index
    /// crosses a page the stored value also replaces the address high byte.
    fn store_and_high(&mut self, operand: Operand, val: u8) {
        if let Operand::Address {
            addr,
            base,
            crossed,
        } = operand
        {
            let v = val & ((base >> 8) as u8).wrapping_add(1);
            let addr = if crossed {
                ((v as u16) << 8) | (addr & 0x00FF)
            } else {
                addr
            };
            self.write(addr, v);
        }
    }

    fn compare(&mut self, reg: u8, v: u8) {
        self.regs.set_flag(FLAG_C, reg >= v);
        self.regs.set_zn(reg.wrapping_sub(v));
    }

    fn asl(&mut self, v: u8) -> u8 {
        self.regs.set_flag(FLAG_C, v & 0x80 != 0);
        let r = v << 1;
        self.regs.set_zn(r);
        r
    }

    fn lsr(&mut self, v: u8) -> u8 {
        self.regs.set_flag(FLAG_C, v & 0x01 != 0);
        let r = v >> 1;
        self.regs.set_zn(r);
        r
    }

    fn rol(&mut self, v: u8) -> u8 {
        let carry_in = self.regs.flag(FLAG_C) as u8;
        self.regs.set_flag(FLAG_C, v & 0x80 != 0);
        let r = (v << 1) | carry_in;
        self.regs.set_zn(r);
        r
    }

    fn ror(&mut self, v: u8) -> u8 {
        let carry_in = self.regs.flag(FLAG_C) as u8;
        self.regs.set_flag(FLAG_C, v & 0x01 != 0);
        let r = (v >> 1) | (carry_in << 7);
        self.regs.set_zn(r);
        r
    }

    fn inc(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.regs.set_zn(r);
        r
    }

    fn dec(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.regs.set_zn(r);
        r
    }

    fn decimal_active(&self) -> bool {
        self.regs.flag(FLAG_D) && self.variant.has_decimal_mode()
    }

    fn adc(&mut self, v: u8) {
        if self.decimal_active() {
            self.adc_decimal(v);
        } else {
            self.adc_binary(v);
        }
    }

    fn sbc(&mut self, v: u8) {
        if self.decimal_active() {
            self.sbc_decimal(v);
        } else {
            self.adc_binary(!v);
        }
    }

    fn adc_binary(&mut self, v: u8) {
        let a = self.regs.a as u16;
        let m = v as u16;
        let sum = a + m + self.regs.flag(FLAG_C) as u16;
        self.regs.set_flag(FLAG_C, sum > 0xFF);
        self.regs
            .set_flag(FLAG_V, (!(a ^ m) & (a ^ sum) & 0x80) != 0);
        self.regs.a = sum as u8;
        self.regs.set_zn(self.regs.a);
    }

    /// NMOS decimal add. Z comes from the binary sum; N and V from the
    /// intermediate high nibble before the final adjust.
    fn adc_decimal(&mut self, v: u8) {
        let a = self.regs.a;
        let c = self.regs.flag(FLAG_C) as u8;
        let mut lo = (a & 0x0F) + (v & 0x0F) + c;
        if lo > 9 {
            lo += 6;
        }
        let mut hi = (a >> 4) + (v >> 4) + (lo > 0x0F) as u8;

        self.regs.p &= !(FLAG_N | FLAG_V | FLAG_Z | FLAG_C);
        if a.wrapping_add(v).wrapping_add(c) == 0 {
            self.regs.p |= FLAG_Z;
        } else if hi & 0x08 != 0 {
            self.regs.p |= FLAG_N;
        }
        if !(a ^ v) & (a ^ (hi << 4)) & 0x80 != 0 {
            self.regs.p |= FLAG_V;
        }
        if hi > 9 {
            hi += 6;
        }
        if hi > 0x0F {
            self.regs.p |= FLAG_C;
        }
        self.regs.a = (hi << 4) | (lo & 0x0F);
    }

    /// NMOS decimal subtract. All flags follow the binary difference.
    fn sbc_decimal(&mut self, v: u8) {
        let a = self.regs.a;
        let borrow = !self.regs.flag(FLAG_C) as u8;
        let diff = (a as u16)
            .wrapping_sub(v as u16)
            .wrapping_sub(borrow as u16);
        let mut lo = (a & 0x0F).wrapping_sub(v & 0x0F).wrapping_sub(borrow);
        if (lo as i8) < 0 {
            lo = lo.wrapping_sub(6);
        }
        let mut hi = (a >> 4)
            .wrapping_sub(v >> 4)
            .wrapping_sub(((lo as i8) < 0) as u8);

        self.regs.p &= !(FLAG_N | FLAG_V | FLAG_Z | FLAG_C);
        if diff as u8 == 0 {
            self.regs.p |= FLAG_Z;
        } else if diff & 0x80 != 0 {
            self.regs.p |= FLAG_N;
        }
        if (a ^ v) & (a ^ diff as u8) & 0x80 != 0 {
            self.regs.p |= FLAG_V;
        }
        if diff & 0xFF00 == 0 {
            self.regs.p |= FLAG_C;
        }
        if (hi as i8) < 0 {
            hi = hi.wrapping_sub(6);
        }
        self.regs.a = (hi << 4) | (lo & 0x0F);
    }

    /// AND then ROR A, with the odd ARR flag rules (and BCD fixups in decimal mode).
    fn arr(&mut self, v: u8) {
        let t = self.regs.a & v;
        let carry_in = if self.regs.flag(FLAG_C) { 0x80 } else { 0x00 };
        let mut r = (t >> 1) | carry_in;

        if !self.decimal_active() {
            self.regs.a = r;
            self.regs.set_zn(r);
            self.regs.set_flag(FLAG_C, r & 0x40 != 0);
            self.regs.set_flag(FLAG_V, ((r >> 6) ^ (r >> 5)) & 0x01 != 0);
            return;
        }

        self.regs.p &= !(FLAG_N | FLAG_V | FLAG_Z | FLAG_C);
        if carry_in != 0 {
            self.regs.p |= FLAG_N;
        }
        if r == 0 {
            self.regs.p |= FLAG_Z;
        }
        if (t ^ r) & 0x40 != 0 {
            self.regs.p |= FLAG_V;
        }
        if (t & 0x0F) + (t & 0x01) > 5 {
            r = (r & 0xF0) | (r.wrapping_add(6) & 0x0F);
        }
        if (t & 0xF0) as u16 + (t & 0x10) as u16 > 0x50 {
            self.regs.p |= FLAG_C;
            r = r.wrapping_add(0x60);
        }
        self.regs.a = r;
    }
}
