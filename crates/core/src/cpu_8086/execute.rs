//! Opcode dispatch.

use super::decode::canonical;
use super::modrm::{ModRm, Place};
use super::registers::{
    AX, BX, CS, CX, DS, DX, ES, FLAG_AF, FLAG_CF, FLAG_DF, FLAG_IF, FLAG_OF, FLAG_PF, FLAG_SF,
    FLAG_TF, FLAG_ZF, SP, SS,
};
use super::timing::{self as t, RmTiming};
use super::{Cpu8086, INT_DIVIDE_ERROR};
use crate::bus::Bus;
use crate::engine::RunState;
use crate::logging::{log, LogCategory, LogLevel};

/// Flags SAHF copies from AH.
const SAHF_MASK: u16 = FLAG_SF | FLAG_ZF | FLAG_AF | FLAG_PF | FLAG_CF;

impl<B: Bus> Cpu8086<B> {
    pub(super) fn execute_instruction(&mut self) -> u32 {
        let trap = self.regs.flag(FLAG_TF);
        self.inhibit = false;
        self.extra = 0;
        let cycles = match self.rep.take() {
            Some(resume) => self.rep_continue(resume),
            None => match self.decode_prefixes() {
                (Some(opcode), prefix_cycles) => prefix_cycles + self.dispatch(opcode),
                (None, prefix_cycles) => prefix_cycles,
            },
        };
        if trap {
            self.trap_pending = true;
        }
        cycles + self.extra
    }

    fn fetch_imm(&mut self, word: bool) -> u16 {
        if word {
            self.fetch_u16()
        } else {
            self.fetch_u8() as u16
        }
    }

    fn modrm_place(&mut self) -> (ModRm, Place) {
        let m = self.fetch_modrm();
        let place = self.resolve(m);
        (m, place)
    }

    fn jump_rel8(&mut self, taken: bool, cost: (u32, u32)) -> u32 {
        let rel = self.fetch_u8() as i8 as u16;
        if taken {
            self.regs.ip = self.regs.ip.wrapping_add(rel);
            cost.0
        } else {
            cost.1
        }
    }

    /// INT 0 with the return address after the faulting instruction.
    fn divide_error(&mut self) -> u32 {
        log(LogCategory::CPU, LogLevel::Debug, || {
            format!(
                "{}: divide error at {:04X}:{:04X}",
                self.engine.name, self.regs.sregs[CS], self.regs.ip
            )
        });
        self.enter_interrupt(INT_DIVIDE_ERROR);
        t::EXCEPTION
    }

    fn dispatch(&mut self, op: u8) -> u32 {
        match op {
            0x00..=0x05
            | 0x08..=0x0D
            | 0x10..=0x15
            | 0x18..=0x1D
            | 0x20..=0x25
            | 0x28..=0x2D
            | 0x30..=0x35
            | 0x38..=0x3D => self.alu_op(op),
            0x06 | 0x0E | 0x16 | 0x1E => {
                self.push(self.regs.sregs[(op >> 3) as usize]);
                t::PUSH_SREG
            }
            // 0x0F is POP CS on the 8086.
            0x07 | 0x0F | 0x17 | 0x1F => {
                let v = self.pop();
                self.set_sreg((op >> 3) as usize, v);
                t::POP_SREG
            }
            0x27 => {
                self.daa();
                t::BCD_ADJUST
            }
            0x2F => {
                self.das();
                t::BCD_ADJUST
            }
            0x37 => {
                self.ascii_adjust(false);
                t::BCD_ADJUST
            }
            0x3F => {
                self.ascii_adjust(true);
                t::BCD_ADJUST
            }
            0x40..=0x4F => {
                let r = (op & 7) as usize;
                let v = self.inc_dec(self.regs.w[r], op & 8 != 0, true);
                self.regs.w[r] = v;
                t::INC_DEC_R16
            }
            0x50..=0x57 => {
                let r = (op & 7) as usize;
                if r == SP {
                    // The 8086 pushes SP after the decrement.
                    let sp = self.regs.w[SP].wrapping_sub(2);
                    self.regs.w[SP] = sp;
                    self.write16(self.regs.sregs[SS], sp, sp);
                } else {
                    self.push(self.regs.w[r]);
                }
                t::PUSH_R
            }
            0x58..=0x5F => {
                let v = self.pop();
                self.regs.w[(op & 7) as usize] = v;
                t::POP_R
            }
            0x70..=0x7F => {
                let taken = self.regs.condition(op & 0x0F);
                self.jump_rel8(taken, t::JCC)
            }
            0x80 | 0x81 | 0x83 => {
                let word = op & 1 != 0;
                let (m, place) = self.modrm_place();
                let imm = match op {
                    0x83 => self.fetch_u8() as i8 as u16,
                    _ => self.fetch_imm(word),
                };
                let a = self.read_place(place, word);
                let res = self.alu(m.reg, a, imm, word);
                if m.reg == 7 {
                    place.cost(t::CMP_RM_IMM)
                } else {
                    self.write_place(place, word, res);
                    place.cost(t::ALU_RM_IMM)
                }
            }
            0x84 | 0x85 => {
                let word = op & 1 != 0;
                let (m, place) = self.modrm_place();
                let a = self.read_place(place, word);
                let b = self.read_reg(m.reg, word);
                self.logic(a & b, word);
                place.cost(t::TEST_RM_R)
            }
            0x86 | 0x87 => {
                let word = op & 1 != 0;
                let (m, place) = self.modrm_place();
                let a = self.read_place(place, word);
                let b = self.read_reg(m.reg, word);
                self.write_place(place, word, b);
                self.write_reg(m.reg, word, a);
                place.cost(t::XCHG_RM_R)
            }
            0x88 | 0x89 => {
                let word = op & 1 != 0;
                let (m, place) = self.modrm_place();
                let v = self.read_reg(m.reg, word);
                self.write_place(place, word, v);
                place.cost(t::MOV_RM_R)
            }
            0x8A | 0x8B => {
                let word = op & 1 != 0;
                let (m, place) = self.modrm_place();
                let v = self.read_place(place, word);
                self.write_reg(m.reg, word, v);
                place.cost(t::MOV_R_RM)
            }
            // The segment field is two bits wide; reg 4-7 alias 0-3.
            0x8C => {
                let (m, place) = self.modrm_place();
                let v = self.regs.sregs[(m.reg & 3) as usize];
                self.write_place(place, true, v);
                place.cost(t::MOV_RM_SREG)
            }
            0x8D => {
                let (m, place) = self.modrm_place();
                let (_, off) = self.place_address(place);
                self.write_reg(m.reg, true, off);
                t::LEA
            }
            0x8E => {
                let (m, place) = self.modrm_place();
                let v = self.read_place(place, true);
                self.set_sreg((m.reg & 3) as usize, v);
                place.cost(t::MOV_SREG_RM)
            }
            0x8F => {
                let (_, place) = self.modrm_place();
                let v = self.pop();
                self.write_place(place, true, v);
                place.cost(t::POP_RM)
            }
            0x90..=0x97 => {
                let r = (op & 7) as usize;
                self.regs.w.swap(AX, r);
                t::XCHG_AX_R
            }
            0x98 => {
                self.regs.w[AX] = self.regs.al() as i8 as i16 as u16;
                t::CBW
            }
            0x99 => {
                self.regs.w[DX] = if self.regs.w[AX] & 0x8000 != 0 {
                    0xFFFF
                } else {
                    0
                };
                t::CWD
            }
            0x9A => {
                let off = self.fetch_u16();
                let seg = self.fetch_u16();
                self.push(self.regs.sregs[CS]);
                self.push(self.regs.ip);
                self.regs.sregs[CS] = seg;
                self.regs.ip = off;
                t::CALL_FAR
            }
            0x9B => t::WAIT,
            0x9C => {
                self.push(self.regs.flags());
                t::PUSHF
            }
            0x9D => {
                let v = self.pop();
                self.regs.set_flags(v);
                t::POPF
            }
            0x9E => {
                let ah = self.regs.byte(4) as u16;
                let flags = (self.regs.flags() & !SAHF_MASK) | (ah & SAHF_MASK);
                self.regs.set_flags(flags);
                t::LAHF_SAHF
            }
            0x9F => {
                let low = self.regs.flags() as u8;
                self.regs.set_byte(4, low);
                t::LAHF_SAHF
            }
            0xA0..=0xA3 => {
                let word = op & 1 != 0;
                let off = self.fetch_u16();
                let seg = self.segment(DS);
                if op & 2 == 0 {
                    let v = self.read_mem(seg, off, word);
                    self.write_reg(0, word, v);
                } else {
                    let v = self.read_reg(0, word);
                    self.write_mem(seg, off, word, v);
                }
                t::MOV_ACC_MEM
            }
            0xA4..=0xA7 | 0xAA..=0xAF => self.string_instruction(op),
            0xA8 | 0xA9 => {
                let word = op & 1 != 0;
                let imm = self.fetch_imm(word);
                self.logic(self.regs.w[AX] & imm, word);
                t::ALU_ACC_IMM
            }
            0xB0..=0xB7 => {
                let v = self.fetch_u8();
                self.regs.set_byte(op & 7, v);
                t::MOV_R_IMM
            }
            0xB8..=0xBF => {
                self.regs.w[(op & 7) as usize] = self.fetch_u16();
                t::MOV_R_IMM
            }
            0xC2 => {
                let n = self.fetch_u16();
                self.regs.ip = self.pop();
                self.regs.w[SP] = self.regs.w[SP].wrapping_add(n);
                t::RET_NEAR_IMM
            }
            0xC3 => {
                self.regs.ip = self.pop();
                t::RET_NEAR
            }
            0xC4 | 0xC5 => {
                let (m, place) = self.modrm_place();
                let (seg, off) = self.place_address(place);
                let target = self.read16(seg, off);
                let sreg = self.read16(seg, off.wrapping_add(2));
                self.write_reg(m.reg, true, target);
                self.set_sreg(if op == 0xC4 { ES } else { DS }, sreg);
                t::LOAD_FAR_PTR
            }
            0xC6 | 0xC7 => {
                let word = op & 1 != 0;
                let (_, place) = self.modrm_place();
                let imm = self.fetch_imm(word);
                self.write_place(place, word, imm);
                place.cost(t::MOV_RM_IMM)
            }
            0xCA => {
                let n = self.fetch_u16();
                self.regs.ip = self.pop();
                self.regs.sregs[CS] = self.pop();
                self.regs.w[SP] = self.regs.w[SP].wrapping_add(n);
                t::RET_FAR_IMM
            }
            0xCB => {
                self.regs.ip = self.pop();
                self.regs.sregs[CS] = self.pop();
                t::RET_FAR
            }
            0xCC => {
                self.enter_interrupt(3);
                t::INT3
            }
            0xCD => {
                let n = self.fetch_u8();
                self.enter_interrupt(n);
                t::INT
            }
            0xCE => {
                if self.regs.flag(FLAG_OF) {
                    self.enter_interrupt(4);
                    t::INTO.0
                } else {
                    t::INTO.1
                }
            }
            0xCF => {
                self.regs.ip = self.pop();
                self.regs.sregs[CS] = self.pop();
                let flags = self.pop();
                self.regs.set_flags(flags);
                t::IRET
            }
            0xD0..=0xD3 => {
                let word = op & 1 != 0;
                let (m, place) = self.modrm_place();
                let by_cl = op & 2 != 0;
                let count = if by_cl { self.regs.byte(1) } else { 1 };
                let v = self.read_place(place, word);
                let res = self.shift(m.reg, v, count, word);
                self.write_place(place, word, res);
                if by_cl {
                    place.cost(t::SHIFT_CL) + t::SHIFT_PER_BIT * count as u32
                } else {
                    place.cost(t::SHIFT_1)
                }
            }
            0xD4 => {
                let base = self.fetch_u8();
                if self.aam(base) {
                    t::AAM
                } else {
                    t::AAM + self.divide_error()
                }
            }
            0xD5 => {
                let base = self.fetch_u8();
                self.aad(base);
                t::AAD
            }
            // SALC: AL = CF ? FF : 00
            0xD6 => {
                let v = if self.regs.flag(FLAG_CF) { 0xFF } else { 0x00 };
                self.regs.set_al(v);
                t::SALC
            }
            0xD7 => {
                let off = self.regs.w[BX].wrapping_add(self.regs.al() as u16);
                let seg = self.segment(DS);
                let v = self.read8(seg, off);
                self.regs.set_al(v);
                t::XLAT
            }
            // ESC: no coprocessor; memory operands are still read.
            0xD8..=0xDF => {
                let (_, place) = self.modrm_place();
                if let Place::Mem { seg, off } = place {
                    self.read8(seg, off);
                }
                place.cost(t::ESC)
            }
            0xE0..=0xE2 => {
                let cx = self.regs.w[CX].wrapping_sub(1);
                self.regs.w[CX] = cx;
                let zf = self.regs.flag(FLAG_ZF);
                let (taken, cost) = match op {
                    0xE0 => (cx != 0 && !zf, t::LOOPNE),
                    0xE1 => (cx != 0 && zf, t::LOOPE),
                    _ => (cx != 0, t::LOOP),
                };
                self.jump_rel8(taken, cost)
            }
            0xE3 => {
                let taken = self.regs.w[CX] == 0;
                self.jump_rel8(taken, t::JCXZ)
            }
            0xE4 | 0xE5 | 0xEC | 0xED => {
                let word = op & 1 != 0;
                let (port, cost) = if op & 8 == 0 {
                    (self.fetch_u8() as u16, t::IO_IMM)
                } else {
                    (self.regs.w[DX], t::IO_DX)
                };
                let v = self.io_in(port, word);
                self.write_reg(0, word, v);
                cost
            }
            0xE6 | 0xE7 | 0xEE | 0xEF => {
                let word = op & 1 != 0;
                let (port, cost) = if op & 8 == 0 {
                    (self.fetch_u8() as u16, t::IO_IMM)
                } else {
                    (self.regs.w[DX], t::IO_DX)
                };
                let v = self.read_reg(0, word);
                self.io_out(port, word, v);
                cost
            }
            0xE8 => {
                let rel = self.fetch_u16();
                self.push(self.regs.ip);
                self.regs.ip = self.regs.ip.wrapping_add(rel);
                t::CALL_NEAR
            }
            0xE9 => {
                let rel = self.fetch_u16();
                self.regs.ip = self.regs.ip.wrapping_add(rel);
                t::JMP_NEAR
            }
            0xEA => {
                let off = self.fetch_u16();
                let seg = self.fetch_u16();
                self.regs.sregs[CS] = seg;
                self.regs.ip = off;
                t::JMP_FAR
            }
            0xEB => self.jump_rel8(true, (t::JMP_NEAR, t::JMP_NEAR)),
            0xF4 => {
                self.run_state = RunState::Halted;
                t::HLT
            }
            0xF5 => {
                let cf = self.regs.flag(FLAG_CF);
                self.regs.set_flag(FLAG_CF, !cf);
                t::FLAG_OP
            }
            0xF6 | 0xF7 => self.group3(op & 1 != 0),
            0xF8 | 0xF9 => {
                self.regs.set_flag(FLAG_CF, op & 1 != 0);
                t::FLAG_OP
            }
            0xFA => {
                self.regs.set_flag(FLAG_IF, false);
                t::FLAG_OP
            }
            0xFB => {
                // Interrupts are recognised only after the following instruction.
                if !self.regs.flag(FLAG_IF) {
                    self.inhibit = true;
                }
                self.regs.set_flag(FLAG_IF, true);
                t::FLAG_OP
            }
            0xFC | 0xFD => {
                self.regs.set_flag(FLAG_DF, op & 1 != 0);
                t::FLAG_OP
            }
            0xFE | 0xFF => self.group45(op & 1 != 0),
            0x60..=0x6F | 0x82 | 0xC0 | 0xC1 | 0xC8 | 0xC9 => self.dispatch(canonical(op)),
            // Consumed by decode_prefixes.
            0x26 | 0x2E | 0x36 | 0x3E | 0xF0..=0xF3 => 0,
        }
    }

    /// The eight ALU operations in their six register/memory/immediate forms.
    fn alu_op(&mut self, op: u8) -> u32 {
        let alu = op >> 3;
        let word = op & 1 != 0;
        let is_cmp = alu == 7;
        match op & 7 {
            0 | 1 => {
                let (m, place) = self.modrm_place();
                let a = self.read_place(place, word);
                let b = self.read_reg(m.reg, word);
                let res = self.alu(alu, a, b, word);
                if is_cmp {
                    place.cost(t::CMP_RM_R)
                } else {
                    self.write_place(place, word, res);
                    place.cost(t::ALU_RM_R)
                }
            }
            2 | 3 => {
                let (m, place) = self.modrm_place();
                let b = self.read_place(place, word);
                let a = self.read_reg(m.reg, word);
                let res = self.alu(alu, a, b, word);
                if !is_cmp {
                    self.write_reg(m.reg, word, res);
                }
                place.cost(t::ALU_R_RM)
            }
            _ => {
                let imm = self.fetch_imm(word);
                let a = self.regs.w[AX];
                let res = self.alu(alu, a, imm, word);
                if !is_cmp {
                    self.write_reg(0, word, res);
                }
                t::ALU_ACC_IMM
            }
        }
    }

    /// 0xF6/0xF7: TEST NOT NEG MUL IMUL DIV IDIV. `/1` is an alias of TEST.
    fn group3(&mut self, word: bool) -> u32 {
        let (m, place) = self.modrm_place();
        let pick = |byte: RmTiming, wide: RmTiming| if word { wide } else { byte };
        match m.reg {
            0 | 1 => {
                let imm = self.fetch_imm(word);
                let v = self.read_place(place, word);
                self.logic(v & imm, word);
                place.cost(t::TEST_RM_IMM)
            }
            2 => {
                let v = self.read_place(place, word);
                self.write_place(place, word, !v);
                place.cost(t::NEG_NOT_RM)
            }
            3 => {
                let v = self.read_place(place, word);
                let res = self.neg(v, word);
                self.write_place(place, word, res);
                place.cost(t::NEG_NOT_RM)
            }
            4 | 5 => {
                let v = self.read_place(place, word);
                let signed = m.reg == 5;
                self.multiply(v, signed, word);
                if signed {
                    place.cost(pick(t::IMUL8, t::IMUL16))
                } else {
                    place.cost(pick(t::MUL8, t::MUL16))
                }
            }
            _ => {
                let v = self.read_place(place, word);
                let signed = m.reg == 7;
                let cost = if signed {
                    place.cost(pick(t::IDIV8, t::IDIV16))
                } else {
                    place.cost(pick(t::DIV8, t::DIV16))
                };
                if self.divide(v, signed, word) {
                    cost
                } else {
                    cost + self.divide_error()
                }
            }
        }
    }

    /// 0xFE/0xFF: INC DEC CALL CALLF JMP JMPF PUSH. 0xFE `/2`-`/7` take a
    /// byte operand, zero-extended. `/7` is an alias of PUSH.
    fn group45(&mut self, word: bool) -> u32 {
        let (m, place) = self.modrm_place();
        match m.reg {
            0 | 1 => {
                let v = self.read_place(place, word);
                let res = self.inc_dec(v, m.reg == 1, word);
                self.write_place(place, word, res);
                place.cost(t::INC_DEC_RM)
            }
            2 => {
                let target = self.read_place(place, word);
                self.push(self.regs.ip);
                self.regs.ip = target;
                place.cost(t::CALL_RM)
            }
            3 => {
                let (seg, off) = self.place_address(place);
                let ip = self.read16(seg, off);
                let cs = self.read16(seg, off.wrapping_add(2));
                self.push(self.regs.sregs[CS]);
                self.push(self.regs.ip);
                self.regs.sregs[CS] = cs;
                self.regs.ip = ip;
                t::CALL_FAR_MEM
            }
            4 => {
                self.regs.ip = self.read_place(place, word);
                place.cost(t::JMP_RM)
            }
            5 => {
                let (seg, off) = self.place_address(place);
                self.regs.ip = self.read16(seg, off);
                self.regs.sregs[CS] = self.read16(seg, off.wrapping_add(2));
                t::JMP_FAR_MEM
            }
            _ => {
                let v = self.read_place(place, word);
                self.push(v);
                place.cost(t::PUSH_RM)
            }
        }
    }
}
