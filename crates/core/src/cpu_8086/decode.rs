//! Prefix loop and opcode aliasing.

use super::timing::{LOCK, SEG_OVERRIDE};
use super::{Cpu8086, Prefixes, Rep};
use crate::bus::Bus;
use crate::logging::{log, LogCategory, LogLevel};

/// Prefix bytes accepted before an instruction is cut short.
const MAX_PREFIXES: usize = 15;

/// Map an undefined 8086 encoding onto the documented opcode it behaves as.
pub(super) fn canonical(opcode: u8) -> u8 {
    match opcode {
        0x60..=0x6F => opcode | 0x10,
        0xC0 | 0xC1 | 0xC8 | 0xC9 => opcode | 0x02,
        0x82 => 0x80,
        _ => opcode,
    }
}

fn is_alias(opcode: u8) -> bool {
    canonical(opcode) != opcode || matches!(opcode, 0x0F | 0xD6 | 0xF1)
}

impl<B: Bus> Cpu8086<B> {
    /// Consume prefixes and return the opcode that follows them with the
    /// prefix clocks, or `None` when the prefix run exceeded the limit.
    pub(super) fn decode_prefixes(&mut self) -> (Option<u8>, u32) {
        self.prefix = Prefixes::default();
        let mut cycles = 0;
        for _ in 0..=MAX_PREFIXES {
            let ip = self.regs.ip;
            let byte = self.fetch_opcode();
            match byte {
                0x26 | 0x2E | 0x36 | 0x3E => {
                    self.prefix.seg = Some(((byte >> 3) & 3) as usize);
                    cycles += SEG_OVERRIDE;
                }
                // LOCK has no effect without other bus masters.
                0xF0 | 0xF1 => cycles += LOCK,
                0xF2 => self.prefix.rep = Some(Rep::NotEqual),
                0xF3 => self.prefix.rep = Some(Rep::Equal),
                _ => {
                    if is_alias(byte) {
                        log(LogCategory::Stubs, LogLevel::Debug, || {
                            format!(
                                "{}: undefined opcode {:02X} at {:04X}:{:04X} (aliased)",
                                self.engine.name, byte, self.regs.sregs[super::CS], ip
                            )
                        });
                    }
                    return (Some(canonical(byte)), cycles);
                }
            }
            self.prefix.last_ip = Some(ip);
        }
        log(LogCategory::CPU, LogLevel::Warn, || {
            format!(
                "{}: more than {} prefix bytes, instruction dropped",
                self.engine.name, MAX_PREFIXES
            )
        });
        (None, cycles)
    }
}
