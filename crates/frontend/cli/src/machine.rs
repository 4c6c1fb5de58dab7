//! JSON machine descriptions: which units exist, what each one's bus looks
//! like, and which periodic interrupts drive them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use arcemu_core::bus::{AddressSpace, SharedRam};
use arcemu_core::{
    Cpu6502, Cpu8086, DeviceConfig, ExecutionUnit, InputLine, IsaConfig, LineState, Period,
    Scheduler, SchedulerConfig,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// RAM blocks that several units map, e.g. a dual-CPU mailbox.
    #[serde(default)]
    pub shared: Vec<SharedConfig>,
    pub units: Vec<UnitConfig>,
    #[serde(default)]
    pub periodic: Vec<PeriodicConfig>,
}

#[derive(Debug, Deserialize)]
pub struct SharedConfig {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Deserialize)]
pub struct UnitConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
    pub open_bus: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegionConfig {
    Ram {
        name: String,
        start: u32,
        len: usize,
        #[serde(default)]
        wait_states: u32,
    },
    Rom {
        name: String,
        start: u32,
        /// Image file, relative to the machine description.
        path: Option<PathBuf>,
        /// Inline image, for tiny test programs.
        bytes: Option<Vec<u8>>,
        #[serde(default)]
        wait_states: u32,
    },
    Shared {
        name: String,
        start: u32,
        shared: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct PeriodicConfig {
    pub unit: String,
    pub line: InputLine,
    pub state: LineState,
    pub period: Period,
}

/// A built machine plus the handles a driver needs to inspect it.
pub struct Machine {
    pub scheduler: Scheduler,
    pub shared: HashMap<String, SharedRam>,
}

impl MachineConfig {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("malformed machine description")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading machine description {}", path.display()))?;
        Self::parse(&text)
    }

    /// Build every unit. ROM paths are resolved against `base_dir`.
    pub fn build(&self, base_dir: &Path) -> Result<Machine> {
        if self.units.is_empty() {
            bail!("machine has no units");
        }
        let mut scheduler = Scheduler::new(self.scheduler)?;

        let mut shared = HashMap::new();
        for block in &self.shared {
            if shared
                .insert(block.name.clone(), SharedRam::new(block.size))
                .is_some()
            {
                bail!("shared block {:?} declared twice", block.name);
            }
        }

        for unit in &self.units {
            let name = &unit.device.name;
            let space = build_space(unit, &shared, base_dir)
                .with_context(|| format!("unit {:?}: building address space", name))?;
            let cpu: Box<dyn ExecutionUnit> = match unit.device.isa {
                IsaConfig::Mos6502 { .. } => Box::new(Cpu6502::from_config(&unit.device, space)?),
                IsaConfig::Intel8086 { .. } => {
                    Box::new(Cpu8086::from_config(&unit.device, space)?)
                }
            };
            scheduler.add_unit(cpu)?;
            log::debug!(
                "unit {:?}: {} at {} Hz",
                name,
                unit.device.isa.label(),
                unit.device.clock_hz
            );
        }

        for p in &self.periodic {
            let id = scheduler.find(&p.unit)?;
            scheduler
                .add_periodic(id, p.line, p.state, p.period)
                .with_context(|| format!("periodic interrupt on {:?}", p.unit))?;
        }

        Ok(Machine { scheduler, shared })
    }
}

fn build_space(
    unit: &UnitConfig,
    shared: &HashMap<String, SharedRam>,
    base_dir: &Path,
) -> Result<AddressSpace> {
    let mut space = AddressSpace::new(unit.device.address_bits);
    if let Some(val) = unit.open_bus {
        space.set_open_bus(val);
    }
    for region in &unit.regions {
        match region {
            RegionConfig::Ram {
                name,
                start,
                len,
                wait_states,
            } => {
                space.map_ram(name, *start, *len)?;
                space.set_wait_states(name, *wait_states)?;
            }
            RegionConfig::Rom {
                name,
                start,
                path,
                bytes,
                wait_states,
            } => {
                let image = match (path, bytes) {
                    (Some(path), None) => {
                        let full = base_dir.join(path);
                        fs::read(&full)
                            .with_context(|| format!("reading ROM image {}", full.display()))?
                    }
                    (None, Some(bytes)) => bytes.clone(),
                    _ => bail!("ROM region {:?} needs exactly one of path or bytes", name),
                };
                space.map_rom(name, *start, image)?;
                space.set_wait_states(name, *wait_states)?;
            }
            RegionConfig::Shared {
                name,
                start,
                shared: block,
            } => {
                let ram = shared
                    .get(block)
                    .with_context(|| format!("region {:?}: no shared block {:?}", name, block))?;
                space.map_shared(name, *start, ram.clone())?;
            }
        }
    }
    Ok(space)
}
