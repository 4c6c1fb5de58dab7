//! Error types surfaced at configuration and persistence boundaries.
//!
//! Nothing on the instruction-execution path returns these; they are raised
//! before `run()` is first called or when a save state is loaded.

use thiserror::Error;

/// Fatal start-up problems. Execution never begins with one of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{unit}: clock rate must be non-zero")]
    ZeroClock { unit: String },
    #[error("{unit}: {isa} needs a {expected}-bit address space, got {got}")]
    AddressWidth {
        unit: String,
        isa: &'static str,
        expected: u8,
        got: u8,
    },
    #[error("{unit}: reset vector {vector:#X} lies outside the {bits}-bit address space")]
    ResetVectorOutOfRange { unit: String, vector: u32, bits: u8 },
    #[error("{unit}: irq line count {count} outside 1..=8")]
    IrqLineCount { unit: String, count: u8 },
    #[error("scheduler: {0} must be non-zero")]
    ZeroTiming(&'static str),
    #[error("scheduler: slice length rounds to zero master ticks")]
    ZeroSlice,
    #[error("opcode table entry {opcode:#04X}: {reason}")]
    OpcodeTable { opcode: u8, reason: &'static str },
    #[error("region {name:?} [{start:#X}..={end:#X}] overlaps region {other:?}")]
    RegionOverlap {
        name: String,
        other: String,
        start: u32,
        end: u32,
    },
    #[error("region {name:?} ends at {end:#X}, past the {bits}-bit address space")]
    RegionOutOfRange { name: String, end: u32, bits: u8 },
    #[error("region {name:?}: {reason}")]
    InvalidRegion { name: String, reason: String },
    #[error("duplicate unit name {0:?}")]
    DuplicateUnit(String),
    #[error("{unit}: configured as {found}, cannot build a {expected} core")]
    WrongIsa {
        unit: String,
        found: &'static str,
        expected: &'static str,
    },
}

/// Save-state restore failures.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("unsupported save-state version {found} (expected {expected})")]
    Version { found: u64, expected: u64 },
    #[error("save state is for {found}, this unit is {expected}")]
    CpuMismatch { found: String, expected: String },
    #[error("save state is missing field {0:?}")]
    MissingField(&'static str),
    #[error("save state does not match machine: {0}")]
    Layout(String),
    #[error("malformed save state: {0}")]
    Json(#[from] serde_json::Error),
}

/// Misuse of the scheduler's unit handles.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no unit named {0:?}")]
    UnknownUnit(String),
    #[error("unit index {0} out of range")]
    BadIndex(usize),
    #[error("unit {unit:?} has {lines} irq line(s), line {line} requested")]
    NoSuchLine {
        unit: String,
        line: u8,
        lines: u8,
    },
    #[error("periodic interrupt period must be non-zero")]
    ZeroPeriod,
}
