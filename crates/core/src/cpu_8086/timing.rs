//! 8086 clock counts.
//!
//! Base costs are the Intel 8086 family user's manual figures. Effective
//! address cycles and the per-word-transfer penalty are added on top by the
//! resolver and the bus helpers, so the constants here never include them.
//! MUL/DIV use the low end of their documented ranges.

/// Register form / memory form of an instruction with a ModRM operand.
#[derive(Debug, Clone, Copy)]
pub(super) struct RmTiming {
    pub reg: u32,
    pub mem: u32,
}

const fn rm(reg: u32, mem: u32) -> RmTiming {
    RmTiming { reg, mem }
}

pub(super) const SEG_OVERRIDE: u32 = 2;
pub(super) const LOCK: u32 = 2;

pub(super) const ALU_RM_R: RmTiming = rm(3, 16);
pub(super) const ALU_R_RM: RmTiming = rm(3, 9);
pub(super) const CMP_RM_R: RmTiming = rm(3, 9);
pub(super) const ALU_RM_IMM: RmTiming = rm(4, 17);
pub(super) const CMP_RM_IMM: RmTiming = rm(4, 10);
pub(super) const ALU_ACC_IMM: u32 = 4;

pub(super) const TEST_RM_R: RmTiming = rm(3, 9);
pub(super) const TEST_RM_IMM: RmTiming = rm(5, 11);

pub(super) const MOV_RM_R: RmTiming = rm(2, 9);
pub(super) const MOV_R_RM: RmTiming = rm(2, 8);
pub(super) const MOV_RM_IMM: RmTiming = rm(4, 10);
pub(super) const MOV_R_IMM: u32 = 4;
pub(super) const MOV_ACC_MEM: u32 = 10;
pub(super) const MOV_SREG_RM: RmTiming = rm(2, 8);
pub(super) const MOV_RM_SREG: RmTiming = rm(2, 9);

pub(super) const XCHG_RM_R: RmTiming = rm(4, 17);
pub(super) const XCHG_AX_R: u32 = 3;
pub(super) const LEA: u32 = 2;
pub(super) const LOAD_FAR_PTR: u32 = 16;

pub(super) const INC_DEC_R16: u32 = 2;
pub(super) const INC_DEC_RM: RmTiming = rm(3, 15);
pub(super) const NEG_NOT_RM: RmTiming = rm(3, 16);

pub(super) const SHIFT_1: RmTiming = rm(2, 15);
pub(super) const SHIFT_CL: RmTiming = rm(8, 20);
pub(super) const SHIFT_PER_BIT: u32 = 4;

pub(super) const MUL8: RmTiming = rm(70, 76);
pub(super) const MUL16: RmTiming = rm(118, 124);
pub(super) const IMUL8: RmTiming = rm(80, 86);
pub(super) const IMUL16: RmTiming = rm(128, 134);
pub(super) const DIV8: RmTiming = rm(80, 86);
pub(super) const DIV16: RmTiming = rm(144, 150);
pub(super) const IDIV8: RmTiming = rm(101, 107);
pub(super) const IDIV16: RmTiming = rm(165, 171);

pub(super) const PUSH_R: u32 = 11;
pub(super) const PUSH_SREG: u32 = 10;
pub(super) const PUSH_RM: RmTiming = rm(11, 16);
pub(super) const POP_R: u32 = 8;
pub(super) const POP_SREG: u32 = 8;
pub(super) const POP_RM: RmTiming = rm(8, 17);
pub(super) const PUSHF: u32 = 10;
pub(super) const POPF: u32 = 8;

pub(super) const CBW: u32 = 2;
pub(super) const CWD: u32 = 5;
pub(super) const LAHF_SAHF: u32 = 4;
pub(super) const FLAG_OP: u32 = 2;
pub(super) const BCD_ADJUST: u32 = 4;
pub(super) const AAM: u32 = 83;
pub(super) const AAD: u32 = 60;
pub(super) const SALC: u32 = 3;
pub(super) const XLAT: u32 = 11;
pub(super) const HLT: u32 = 2;
pub(super) const WAIT: u32 = 3;
pub(super) const ESC: RmTiming = rm(2, 8);

pub(super) const IO_IMM: u32 = 10;
pub(super) const IO_DX: u32 = 8;

pub(super) const JMP_NEAR: u32 = 15;
pub(super) const JMP_FAR: u32 = 15;
pub(super) const JMP_RM: RmTiming = rm(11, 18);
pub(super) const JMP_FAR_MEM: u32 = 24;
pub(super) const CALL_NEAR: u32 = 19;
pub(super) const CALL_FAR: u32 = 28;
pub(super) const CALL_RM: RmTiming = rm(16, 21);
pub(super) const CALL_FAR_MEM: u32 = 37;
pub(super) const RET_NEAR: u32 = 8;
pub(super) const RET_NEAR_IMM: u32 = 12;
pub(super) const RET_FAR: u32 = 18;
pub(super) const RET_FAR_IMM: u32 = 17;

/// Taken / not taken.
pub(super) const JCC: (u32, u32) = (16, 4);
pub(super) const JCXZ: (u32, u32) = (18, 6);
pub(super) const LOOP: (u32, u32) = (17, 5);
pub(super) const LOOPE: (u32, u32) = (18, 6);
pub(super) const LOOPNE: (u32, u32) = (19, 5);

pub(super) const INT: u32 = 51;
pub(super) const INT3: u32 = 52;
pub(super) const INTO: (u32, u32) = (53, 4);
pub(super) const IRET: u32 = 24;
pub(super) const INTR: u32 = 61;
pub(super) const NMI: u32 = 50;
/// Divide error and single-step entry, on top of the instruction that raised them.
pub(super) const EXCEPTION: u32 = 51;

pub(super) const REP_BASE: u32 = 9;

/// Cost of one string element: (without REP, per REP iteration).
pub(super) fn string_cycles(op: u8) -> (u32, u32) {
    match op & 0xFE {
        0xA4 => (18, 17),
        0xA6 => (22, 22),
        0xAA => (11, 10),
        0xAC => (12, 13),
        _ => (15, 15),
    }
}

/// Extra clocks added to every memory operand, by ModRM `mod` and `rm`.
pub(super) fn ea_cycles(md: u8, rm: u8) -> u32 {
    match (md, rm) {
        (0, 6) => 6,
        (0, 0) | (0, 3) => 7,
        (0, 1) | (0, 2) => 8,
        (0, _) => 5,
        (_, 0) | (_, 3) => 11,
        (_, 1) | (_, 2) => 12,
        _ => 9,
    }
}
