//! Static NMOS 6502 opcode table.
//!
//! One entry per opcode byte: operation, addressing mode, base cycle cost and
//! whether an indexed read pays +1 for crossing a page. Branch penalties are
//! added by the branch handler. Undocumented opcodes are listed with the
//! behaviour and timing of NMOS silicon.

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// JMP ($nnnn) only
    Indirect,
    /// ($nn,X)
    IndirectX,
    /// ($nn),Y
    IndirectY,
    Relative,
}

impl Mode {
    fn indexed(self) -> bool {
        matches!(self, Mode::AbsoluteX | Mode::AbsoluteY | Mode::IndirectY)
    }
}

#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Documented
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    // Undocumented
    Alr, Anc, Ane, Arr, Dcp, Isc, Jam, Las, Lax, Lxa, Rla, Rra, Sax, Sbx,
    Sha, Shx, Shy, Slo, Sre, Tas,
}

impl Op {
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Op::Bcc | Op::Bcs | Op::Beq | Op::Bmi | Op::Bne | Op::Bpl | Op::Bvc | Op::Bvs
        )
    }

    /// Writes its effective address without reading it first.
    pub fn is_store(self) -> bool {
        matches!(
            self,
            Op::Sta | Op::Stx | Op::Sty | Op::Sax | Op::Sha | Op::Shx | Op::Shy | Op::Tas
        )
    }

    /// Read-modify-write: reads, writes the old value back, then the new one.
    pub fn is_rmw(self) -> bool {
        matches!(
            self,
            Op::Asl
                | Op::Lsr
                | Op::Rol
                | Op::Ror
                | Op::Inc
                | Op::Dec
                | Op::Slo
                | Op::Rla
                | Op::Sre
                | Op::Rra
                | Op::Dcp
                | Op::Isc
        )
    }

    /// Opcodes whose result depends on analog effects on real parts.
    pub fn is_unstable(self) -> bool {
        matches!(
            self,
            Op::Ane | Op::Lxa | Op::Sha | Op::Shx | Op::Shy | Op::Tas
        )
    }

    pub fn is_undocumented(self) -> bool {
        matches!(
            self,
            Op::Alr
                | Op::Anc
                | Op::Ane
                | Op::Arr
                | Op::Dcp
                | Op::Isc
                | Op::Jam
                | Op::Las
                | Op::Lax
                | Op::Lxa
                | Op::Rla
                | Op::Rra
                | Op::Sax
                | Op::Sbx
                | Op::Sha
                | Op::Shx
                | Op::Shy
                | Op::Slo
                | Op::Sre
                | Op::Tas
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
    pub op: Op,
    pub mode: Mode,
    pub cycles: u8,
    pub page_penalty: bool,
}

const fn e(op: Op, mode: Mode, cycles: u8) -> OpcodeEntry {
    OpcodeEntry {
        op,
        mode,
        cycles,
        page_penalty: false,
    }
}

/// Entry that pays +1 when the indexed address crosses a page.
const fn p(op: Op, mode: Mode, cycles: u8) -> OpcodeEntry {
    OpcodeEntry {
        op,
        mode,
        cycles,
        page_penalty: true,
    }
}

const IMP: Mode = Mode::Implied;
const ACC: Mode = Mode::Accumulator;
const IMM: Mode = Mode::Immediate;
const ZP: Mode = Mode::ZeroPage;
const ZPX: Mode = Mode::ZeroPageX;
const ZPY: Mode = Mode::ZeroPageY;
const ABS: Mode = Mode::Absolute;
const ABX: Mode = Mode::AbsoluteX;
const ABY: Mode = Mode::AbsoluteY;
const IND: Mode = Mode::Indirect;
const IZX: Mode = Mode::IndirectX;
const IZY: Mode = Mode::IndirectY;
const REL: Mode = Mode::Relative;

use Op::*;

#[rustfmt::skip]
pub static OPCODES: [OpcodeEntry; 256] = [
    // 0x00
    e(Brk, IMP, 7), e(Ora, IZX, 6), e(Jam, IMP, 2), e(Slo, IZX, 8),
    e(Nop, ZP, 3),  e(Ora, ZP, 3),  e(Asl, ZP, 5),  e(Slo, ZP, 5),
    e(Php, IMP, 3), e(Ora, IMM, 2), e(Asl, ACC, 2), e(Anc, IMM, 2),
    e(Nop, ABS, 4), e(Ora, ABS, 4), e(Asl, ABS, 6), e(Slo, ABS, 6),
    // 0x10
    e(Bpl, REL, 2), p(Ora, IZY, 5), e(Jam, IMP, 2), e(Slo, IZY, 8),
    e(Nop, ZPX, 4), e(Ora, ZPX, 4), e(Asl, ZPX, 6), e(Slo, ZPX, 6),
    e(Clc, IMP, 2), p(Ora, ABY, 4), e(Nop, IMP, 2), e(Slo, ABY, 7),
    p(Nop, ABX, 4), p(Ora, ABX, 4), e(Asl, ABX, 7), e(Slo, ABX, 7),
    // 0x20
    e(Jsr, ABS, 6), e(And, IZX, 6), e(Jam, IMP, 2), e(Rla, IZX, 8),
    e(Bit, ZP, 3),  e(And, ZP, 3),  e(Rol, ZP, 5),  e(Rla, ZP, 5),
    e(Plp, IMP, 4), e(And, IMM, 2), e(Rol, ACC, 2), e(Anc, IMM, 2),
    e(Bit, ABS, 4), e(And, ABS, 4), e(Rol, ABS, 6), e(Rla, ABS, 6),
    // 0x30
    e(Bmi, REL, 2), p(And, IZY, 5), e(Jam, IMP, 2), e(Rla, IZY, 8),
    e(Nop, ZPX, 4), e(And, ZPX, 4), e(Rol, ZPX, 6), e(Rla, ZPX, 6),
    e(Sec, IMP, 2), p(And, ABY, 4), e(Nop, IMP, 2), e(Rla, ABY, 7),
    p(Nop, ABX, 4), p(And, ABX, 4), e(Rol, ABX, 7), e(Rla, ABX, 7),
    // 0x40
    e(Rti, IMP, 6), e(Eor, IZX, 6), e(Jam, IMP, 2), e(Sre, IZX, 8),
    e(Nop, ZP, 3),  e(Eor, ZP, 3),  e(Lsr, ZP, 5),  e(Sre, ZP, 5),
    e(Pha, IMP, 3), e(Eor, IMM, 2), e(Lsr, ACC, 2), e(Alr, IMM, 2),
    e(Jmp, ABS, 3), e(Eor, ABS, 4), e(Lsr, ABS, 6), e(Sre, ABS, 6),
    // 0x50
    e(Bvc, REL, 2), p(Eor, IZY, 5), e(Jam, IMP, 2), e(Sre, IZY, 8),
    e(Nop, ZPX, 4), e(Eor, ZPX, 4), e(Lsr, ZPX, 6), e(Sre, ZPX, 6),
    e(Cli, IMP, 2), p(Eor, ABY, 4), e(Nop, IMP, 2), e(Sre, ABY, 7),
    p(Nop, ABX, 4), p(Eor, ABX, 4), e(Lsr, ABX, 7), e(Sre, ABX, 7),
    // 0x60
    e(Rts, IMP, 6), e(Adc, IZX, 6), e(Jam, IMP, 2), e(Rra, IZX, 8),
    e(Nop, ZP, 3),  e(Adc, ZP, 3),  e(Ror, ZP, 5),  e(Rra, ZP, 5),
    e(Pla, IMP, 4), e(Adc, IMM, 2), e(Ror, ACC, 2), e(Arr, IMM, 2),
    e(Jmp, IND, 5), e(Adc, ABS, 4), e(Ror, ABS, 6), e(Rra, ABS, 6),
    // 0x70
    e(Bvs, REL, 2), p(Adc, IZY, 5), e(Jam, IMP, 2), e(Rra, IZY, 8),
    e(Nop, ZPX, 4), e(Adc, ZPX, 4), e(Ror, ZPX, 6), e(Rra, ZPX, 6),
    e(Sei, IMP, 2), p(Adc, ABY, 4), e(Nop, IMP, 2), e(Rra, ABY, 7),
    p(Nop, ABX, 4), p(Adc, ABX, 4), e(Ror, ABX, 7), e(Rra, ABX, 7),
    // 0x80
    e(Nop, IMM, 2), e(Sta, IZX, 6), e(Nop, IMM, 2), e(Sax, IZX, 6),
    e(Sty, ZP, 3),  e(Sta, ZP, 3),  e(Stx, ZP, 3),  e(Sax, ZP, 3),
    e(Dey, IMP, 2), e(Nop, IMM, 2), e(Txa, IMP, 2), e(Ane, IMM, 2),
    e(Sty, ABS, 4), e(Sta, ABS, 4), e(Stx, ABS, 4), e(Sax, ABS, 4),
    // 0x90
    e(Bcc, REL, 2), e(Sta, IZY, 6), e(Jam, IMP, 2), e(Sha, IZY, 6),
    e(Sty, ZPX, 4), e(Sta, ZPX, 4), e(Stx, ZPY, 4), e(Sax, ZPY, 4),
    e(Tya, IMP, 2), e(Sta, ABY, 5), e(Txs, IMP, 2), e(Tas, ABY, 5),
    e(Shy, ABX, 5), e(Sta, ABX, 5), e(Shx, ABY, 5), e(Sha, ABY, 5),
    // 0xA0
    e(Ldy, IMM, 2), e(Lda, IZX, 6), e(Ldx, IMM, 2), e(Lax, IZX, 6),
    e(Ldy, ZP, 3),  e(Lda, ZP, 3),  e(Ldx, ZP, 3),  e(Lax, ZP, 3),
    e(Tay, IMP, 2), e(Lda, IMM, 2), e(Tax, IMP, 2), e(Lxa, IMM, 2),
    e(Ldy, ABS, 4), e(Lda, ABS, 4), e(Ldx, ABS, 4), e(Lax, ABS, 4),
    // 0xB0
    e(Bcs, REL, 2), p(Lda, IZY, 5), e(Jam, IMP, 2), p(Lax, IZY, 5),
    e(Ldy, ZPX, 4), e(Lda, ZPX, 4), e(Ldx, ZPY, 4), e(Lax, ZPY, 4),
    e(Clv, IMP, 2), p(Lda, ABY, 4), e(Tsx, IMP, 2), p(Las, ABY, 4),
    p(Ldy, ABX, 4), p(Lda, ABX, 4), p(Ldx, ABY, 4), p(Lax, ABY, 4),
    // 0xC0
    e(Cpy, IMM, 2), e(Cmp, IZX, 6), e(Nop, IMM, 2), e(Dcp, IZX, 8),
    e(Cpy, ZP, 3),  e(Cmp, ZP, 3),  e(Dec, ZP, 5),  e(Dcp, ZP, 5),
    e(Iny, IMP, 2), e(Cmp, IMM, 2), e(Dex, IMP, 2), e(Sbx, IMM, 2),
    e(Cpy, ABS, 4), e(Cmp, ABS, 4), e(Dec, ABS, 6), e(Dcp, ABS, 6),
    // 0xD0
    e(Bne, REL, 2), p(Cmp, IZY, 5), e(Jam, IMP, 2), e(Dcp, IZY, 8),
    e(Nop, ZPX, 4), e(Cmp, ZPX, 4), e(Dec, ZPX, 6), e(Dcp, ZPX, 6),
    e(Cld, IMP, 2), p(Cmp, ABY, 4), e(Nop, IMP, 2), e(Dcp, ABY, 7),
    p(Nop, ABX, 4), p(Cmp, ABX, 4), e(Dec, ABX, 7), e(Dcp, ABX, 7),
    // 0xE0
    e(Cpx, IMM, 2), e(Sbc, IZX, 6), e(Nop, IMM, 2), e(Isc, IZX, 8),
    e(Cpx, ZP, 3),  e(Sbc, ZP, 3),  e(Inc, ZP, 5),  e(Isc, ZP, 5),
    e(Inx, IMP, 2), e(Sbc, IMM, 2), e(Nop, IMP, 2), e(Sbc, IMM, 2),
    e(Cpx, ABS, 4), e(Sbc, ABS, 4), e(Inc, ABS, 6), e(Isc, ABS, 6),
    // 0xF0
    e(Beq, REL, 2), p(Sbc, IZY, 5), e(Jam, IMP, 2), e(Isc, IZY, 8),
    e(Nop, ZPX, 4), e(Sbc, ZPX, 4), e(Inc, ZPX, 6), e(Isc, ZPX, 6),
    e(Sed, IMP, 2), p(Sbc, ABY, 4), e(Nop, IMP, 2), e(Isc, ABY, 7),
    p(Nop, ABX, 4), p(Sbc, ABX, 4), e(Inc, ABX, 7), e(Isc, ABX, 7),
];

/// Consistency checks run when a core is built from a config.
pub fn validate(table: &[OpcodeEntry; 256]) -> Result<(), ConfigError> {
    for (opcode, entry) in table.iter().enumerate() {
        let opcode = opcode as u8;
        if !(2..=8).contains(&entry.cycles) {
            return Err(ConfigError::OpcodeTable {
                opcode,
                reason: "base cost outside 2..=8 cycles",
            });
        }
        if entry.page_penalty && !entry.mode.indexed() {
            return Err(ConfigError::OpcodeTable {
                opcode,
                reason: "page penalty on a mode that cannot cross pages",
            });
        }
        if entry.page_penalty && (entry.op.is_store() || entry.op.is_rmw()) {
            return Err(ConfigError::OpcodeTable {
                opcode,
                reason: "writes always pay the index fixup cycle",
            });
        }
        if entry.op.is_branch() != (entry.mode == Mode::Relative) {
            return Err(ConfigError::OpcodeTable {
                opcode,
                reason: "branch/relative mismatch",
            });
        }
    }
    Ok(())
}
