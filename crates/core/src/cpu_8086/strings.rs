//! String instructions and the REP loop.
//!
//! A repeated string instruction runs one element per instruction boundary:
//! the first boundary pays the REP setup plus one element, later boundaries
//! pay one element each. Between elements IP points at the last prefix byte,
//! so an interrupt taken there returns to that byte and earlier prefixes are
//! lost on resume, as on the real 8086.

use serde::{Deserialize, Serialize};

use super::registers::{AX, CX, DI, DS, ES, FLAG_DF, FLAG_ZF, SI};
use super::timing::{string_cycles, REP_BASE};
use super::{Cpu8086, Rep};
use crate::bus::Bus;

/// A REP string instruction still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct RepResume {
    op: u8,
    rep: Rep,
    seg: Option<usize>,
    /// IP of the last prefix byte.
    resume_ip: u16,
    /// IP after the string opcode.
    next_ip: u16,
}

impl<B: Bus> Cpu8086<B> {
    /// String opcode 0xA4-0xA7 or 0xAA-0xAF after its prefixes were decoded.
    pub(super) fn string_instruction(&mut self, op: u8) -> u32 {
        let (single, _) = string_cycles(op);
        let Some(rep) = self.prefix.rep else {
            self.string_element(op);
            return single;
        };
        let resume = RepResume {
            op,
            rep,
            seg: self.prefix.seg,
            resume_ip: self.prefix.last_ip.unwrap_or(self.regs.ip),
            next_ip: self.regs.ip,
        };
        REP_BASE + self.rep_iteration(resume)
    }

    /// Continue a REP instruction interrupted at an instruction boundary.
    pub(super) fn rep_continue(&mut self, resume: RepResume) -> u32 {
        self.prefix.seg = resume.seg;
        self.prefix.rep = Some(resume.rep);
        self.rep_iteration(resume)
    }

    fn rep_iteration(&mut self, resume: RepResume) -> u32 {
        if self.regs.w[CX] == 0 {
            self.regs.ip = resume.next_ip;
            return 0;
        }
        self.string_element(resume.op);
        self.regs.w[CX] = self.regs.w[CX].wrapping_sub(1);

        let compares = matches!(resume.op & 0xFE, 0xA6 | 0xAE);
        let zf = self.regs.flag(FLAG_ZF);
        let stop = self.regs.w[CX] == 0
            || (compares && (resume.rep == Rep::Equal) != zf);
        if stop {
            self.regs.ip = resume.next_ip;
        } else {
            self.regs.ip = resume.resume_ip;
            self.rep = Some(resume);
        }
        string_cycles(resume.op).1
    }

    fn string_element(&mut self, op: u8) {
        let word = op & 1 != 0;
        let step = if word { 2u16 } else { 1 };
        let delta = if self.regs.flag(FLAG_DF) {
            step.wrapping_neg()
        } else {
            step
        };
        let src = self.segment(DS);
        let es = self.regs.sregs[ES];
        let (si, di) = (self.regs.w[SI], self.regs.w[DI]);
        let mut advance_si = true;
        let mut advance_di = true;

        match op & 0xFE {
            0xA4 => {
                let v = self.read_mem(src, si, word);
                self.write_mem(es, di, word, v);
            }
            0xA6 => {
                let a = self.read_mem(src, si, word);
                let b = self.read_mem(es, di, word);
                self.sub(a, b, false, word);
            }
            0xAA => {
                let v = self.regs.w[AX];
                self.write_mem(es, di, word, v);
                advance_si = false;
            }
            0xAC => {
                let v = self.read_mem(src, si, word);
                self.write_reg(0, word, v);
                advance_di = false;
            }
            _ => {
                let b = self.read_mem(es, di, word);
                let a = self.regs.w[AX];
                self.sub(a, b, false, word);
                advance_si = false;
            }
        }
        if advance_si {
            self.regs.w[SI] = si.wrapping_add(delta);
        }
        if advance_di {
            self.regs.w[DI] = di.wrapping_add(delta);
        }
    }

    pub(super) fn read_mem(&mut self, seg: u16, off: u16, word: bool) -> u16 {
        if word {
            self.read16(seg, off)
        } else {
            self.read8(seg, off) as u16
        }
    }

    pub(super) fn write_mem(&mut self, seg: u16, off: u16, word: bool, val: u16) {
        if word {
            self.write16(seg, off, val);
        } else {
            self.write8(seg, off, val as u8);
        }
    }
}
