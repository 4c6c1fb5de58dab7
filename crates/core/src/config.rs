//! Start-up configuration for execution units and the scheduler.
//!
//! Everything here is plain serde data read once before the first `run()`.
//! `validate()` catches what would otherwise be undefined at run time.

use serde::{Deserialize, Serialize};

use crate::cpu_6502::Variant;
use crate::cpu_8086::CpuModel;
use crate::engine::IdlePolicy;
use crate::error::ConfigError;

/// Instruction set plus the per-chip quirks it understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IsaConfig {
    #[serde(rename = "6502")]
    Mos6502 {
        #[serde(default)]
        variant: Variant,
        /// Constant ORed into A by the unstable ANE/LXA opcodes.
        #[serde(default = "default_ane_magic")]
        ane_magic: u8,
    },
    #[serde(rename = "8086")]
    Intel8086 {
        #[serde(default)]
        model: CpuModel,
        /// Vector supplied on INTR acknowledge when the line has none set.
        #[serde(default = "default_intr_vector")]
        default_intr_vector: u8,
    },
}

impl IsaConfig {
    pub fn mos6502() -> Self {
        IsaConfig::Mos6502 {
            variant: Variant::default(),
            ane_magic: default_ane_magic(),
        }
    }

    pub fn intel8086() -> Self {
        IsaConfig::Intel8086 {
            model: CpuModel::default(),
            default_intr_vector: default_intr_vector(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IsaConfig::Mos6502 { .. } => "6502",
            IsaConfig::Intel8086 { .. } => "8086",
        }
    }

    /// Width of the address bus the ISA drives.
    pub fn address_bits(&self) -> u8 {
        match self {
            IsaConfig::Mos6502 { .. } => 16,
            IsaConfig::Intel8086 { .. } => 20,
        }
    }
}

fn default_ane_magic() -> u8 {
    0xEE
}

fn default_intr_vector() -> u8 {
    0x08
}

fn default_irq_lines() -> u8 {
    1
}

/// One execution unit as the driver layer describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub isa: IsaConfig,
    pub clock_hz: u32,
    pub address_bits: u8,
    /// Fixed start address, bypassing the ISA's reset sequence.
    #[serde(default)]
    pub reset_vector: Option<u32>,
    #[serde(default = "default_irq_lines")]
    pub irq_lines: u8,
    #[serde(default)]
    pub idle_policy: IdlePolicy,
}

impl DeviceConfig {
    pub fn new(name: &str, isa: IsaConfig, clock_hz: u32) -> Self {
        Self {
            name: name.to_string(),
            isa,
            clock_hz,
            address_bits: isa.address_bits(),
            reset_vector: None,
            irq_lines: default_irq_lines(),
            idle_policy: IdlePolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_hz == 0 {
            return Err(ConfigError::ZeroClock {
                unit: self.name.clone(),
            });
        }
        let expected = self.isa.address_bits();
        if self.address_bits != expected {
            return Err(ConfigError::AddressWidth {
                unit: self.name.clone(),
                isa: self.isa.label(),
                expected,
                got: self.address_bits,
            });
        }
        if let Some(vector) = self.reset_vector {
            if (vector as u64) >> self.address_bits != 0 {
                return Err(ConfigError::ResetVectorOutOfRange {
                    unit: self.name.clone(),
                    vector,
                    bits: self.address_bits,
                });
            }
        }
        if !(1..=8).contains(&self.irq_lines) {
            return Err(ConfigError::IrqLineCount {
                unit: self.name.clone(),
                count: self.irq_lines,
            });
        }
        Ok(())
    }
}

/// Master clock and slicing for a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub master_hz: u64,
    pub frame_rate: u32,
    /// Slices per frame.
    #[serde(default = "default_interleave")]
    pub interleave: u32,
}

fn default_interleave() -> u32 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            master_hz: 1_000_000,
            frame_rate: 60,
            interleave: 1,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.master_hz == 0 {
            return Err(ConfigError::ZeroTiming("master_hz"));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::ZeroTiming("frame_rate"));
        }
        if self.interleave == 0 {
            return Err(ConfigError::ZeroTiming("interleave"));
        }
        if self.slice_ticks() == 0 {
            return Err(ConfigError::ZeroSlice);
        }
        Ok(())
    }

    /// Master ticks per slice.
    pub fn slice_ticks(&self) -> u64 {
        self.master_hz / (self.frame_rate as u64 * self.interleave as u64)
    }

    /// Master ticks per frame. The last slice of a frame absorbs the remainder.
    pub fn frame_ticks(&self) -> u64 {
        self.master_hz / self.frame_rate as u64
    }
}
