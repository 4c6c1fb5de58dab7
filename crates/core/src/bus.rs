//! Memory/bus interface consumed by the execution engines.
//!
//! [`Bus`] is what a CPU core talks to. [`AddressSpace`] is the stock
//! implementation: a sorted set of non-overlapping regions (RAM, ROM,
//! shared RAM, banked windows, memory-mapped devices) with an open-bus
//! default for everything left unmapped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ConfigError, StateError};
use crate::logging::{log, LogCategory, LogLevel};

/// Read/write surface a CPU core drives.
///
/// Reads take `&mut self` because memory-mapped devices may change state
/// when read (status registers that clear on read, FIFOs).
pub trait Bus {
    fn read_byte(&mut self, addr: u32) -> u8;
    fn write_byte(&mut self, addr: u32, val: u8);

    /// Little-endian word at `addr`, `addr + 1`.
    fn read_word(&mut self, addr: u32) -> u16 {
        let lo = self.read_byte(addr) as u16;
        let hi = self.read_byte(addr.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    fn write_word(&mut self, addr: u32, val: u16) {
        self.write_byte(addr, val as u8);
        self.write_byte(addr.wrapping_add(1), (val >> 8) as u8);
    }

    /// Opcode fetch. Differs from `read_byte` when a decryption overlay is mapped.
    fn read_opcode(&mut self, addr: u32) -> u8 {
        self.read_byte(addr)
    }

    /// Operand fetch from the instruction stream.
    fn read_opcode_arg(&mut self, addr: u32) -> u8 {
        self.read_byte(addr)
    }

    /// Port space read for ISAs with a separate I/O space.
    fn io_read(&mut self, _port: u16) -> u8 {
        0xFF
    }

    fn io_write(&mut self, _port: u16, _val: u8) {}

    /// Drain wait-state cycles accumulated by accesses since the last call.
    fn take_wait_states(&mut self) -> u32 {
        0
    }

    fn save_state(&self) -> Value {
        Value::Null
    }

    fn load_state(&mut self, _v: &Value) -> Result<(), StateError> {
        Ok(())
    }
}

/// A memory-mapped device register block. Offsets are relative to the region start.
pub trait MemoryDevice {
    fn read(&mut self, offset: u32) -> u8;
    fn write(&mut self, offset: u32, val: u8);

    fn save_state(&self) -> Value {
        Value::Null
    }

    fn load_state(&mut self, _v: &Value) -> Result<(), StateError> {
        Ok(())
    }
}

/// Flat, wait-state free memory. Handy for tests and benchmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatMemory {
    pub data: Vec<u8>,
    mask: u32,
}

impl FlatMemory {
    /// Zeroed memory covering a `bits`-wide address space.
    pub fn new(bits: u8) -> Self {
        let size = 1usize << bits;
        Self {
            data: vec![0; size],
            mask: (size - 1) as u32,
        }
    }

    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            let a = (addr as usize + i) & self.mask as usize;
            self.data[a] = *b;
        }
    }
}

impl Bus for FlatMemory {
    fn read_byte(&mut self, addr: u32) -> u8 {
        self.data[(addr & self.mask) as usize]
    }

    fn write_byte(&mut self, addr: u32, val: u8) {
        self.data[(addr & self.mask) as usize] = val;
    }

    fn save_state(&self) -> Value {
        json!({ "data": self.data })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), StateError> {
        let data: Vec<u8> = serde_json::from_value(v["data"].clone())?;
        if data.len() != self.data.len() {
            return Err(StateError::Layout(format!(
                "memory size {} != {}",
                data.len(),
                self.data.len()
            )));
        }
        self.data = data;
        Ok(())
    }
}

/// RAM that can be mapped into more than one address space (dual-CPU boards).
///
/// Scheduling is cooperative, so no two engines ever touch it at the same time.
#[derive(Debug, Clone)]
pub struct SharedRam(Rc<RefCell<Vec<u8>>>);

impl SharedRam {
    pub fn new(size: usize) -> Self {
        Self(Rc::new(RefCell::new(vec![0; size])))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self, offset: usize) -> u8 {
        self.0.borrow()[offset]
    }

    pub fn write(&self, offset: usize, val: u8) {
        self.0.borrow_mut()[offset] = val;
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    pub fn replace(&self, data: &[u8]) {
        self.0.borrow_mut().copy_from_slice(data);
    }
}

/// Handle to the bank currently visible through a banked window.
#[derive(Debug, Clone, Default)]
pub struct BankSelect(Rc<Cell<usize>>);

impl BankSelect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, bank: usize) {
        self.0.set(bank);
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

/// Write-only latch that drives a [`BankSelect`]. Reads return the current bank.
pub struct BankSwitchRegister {
    select: BankSelect,
    mask: u8,
}

impl BankSwitchRegister {
    pub fn new(select: BankSelect, mask: u8) -> Self {
        Self { select, mask }
    }
}

impl MemoryDevice for BankSwitchRegister {
    fn read(&mut self, _offset: u32) -> u8 {
        self.select.get() as u8
    }

    fn write(&mut self, _offset: u32, val: u8) {
        self.select.set((val & self.mask) as usize);
    }
}

enum RegionKind {
    Ram(Vec<u8>),
    Rom(Vec<u8>),
    Shared(SharedRam),
    Banked {
        data: Vec<u8>,
        window: usize,
        select: BankSelect,
        writable: bool,
    },
    Device(Box<dyn MemoryDevice>),
}

impl RegionKind {
    fn label(&self) -> &'static str {
        match self {
            RegionKind::Ram(_) => "ram",
            RegionKind::Rom(_) => "rom",
            RegionKind::Shared(_) => "shared",
            RegionKind::Banked { .. } => "banked",
            RegionKind::Device(_) => "device",
        }
    }
}

struct Region {
    name: String,
    start: u32,
    end: u32,
    wait_states: u32,
    kind: RegionKind,
}

impl Region {
    fn read(&mut self, addr: u32) -> u8 {
        let offset = (addr - self.start) as usize;
        match &mut self.kind {
            RegionKind::Ram(data) | RegionKind::Rom(data) => data[offset],
            RegionKind::Shared(ram) => ram.read(offset),
            RegionKind::Banked {
                data,
                window,
                select,
                ..
            } => data[bank_offset(data.len(), *window, select, offset)],
            RegionKind::Device(dev) => dev.read(offset as u32),
        }
    }

    fn write(&mut self, addr: u32, val: u8) {
        let offset = (addr - self.start) as usize;
        match &mut self.kind {
            RegionKind::Ram(data) => data[offset] = val,
            RegionKind::Banked {
                data,
                window,
                select,
                writable: true,
            } => {
                let at = bank_offset(data.len(), *window, select, offset);
                data[at] = val;
            }
            RegionKind::Rom(_) | RegionKind::Banked { .. } => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!(
                        "write {:02X} to read-only {:?} at {:X} ignored",
                        val, self.name, addr
                    )
                });
            }
            RegionKind::Shared(ram) => ram.write(offset, val),
            RegionKind::Device(dev) => dev.write(offset as u32, val),
        }
    }
}

struct OpcodeOverlay {
    start: u32,
    data: Vec<u8>,
    decrypt_args: bool,
}

impl OpcodeOverlay {
    fn get(&self, addr: u32) -> Option<u8> {
        addr.checked_sub(self.start)
            .and_then(|off| self.data.get(off as usize).copied())
    }
}

struct PortRange {
    start: u16,
    end: u16,
    device: Box<dyn MemoryDevice>,
}

/// Region-mapped implementation of [`Bus`].
pub struct AddressSpace {
    bits: u8,
    mask: u32,
    open_bus: u8,
    regions: Vec<Region>,
    overlay: Option<OpcodeOverlay>,
    ports: Vec<PortRange>,
    pending_wait: u32,
}

impl AddressSpace {
    /// Empty space of `bits` address lines. Every address starts unmapped.
    pub fn new(bits: u8) -> Self {
        let mask = if bits >= 32 {
            u32::MAX
        } else {
            (1u32 << bits) - 1
        };
        Self {
            bits,
            mask,
            open_bus: 0xFF,
            regions: Vec::new(),
            overlay: None,
            ports: Vec::new(),
            pending_wait: 0,
        }
    }

    pub fn address_bits(&self) -> u8 {
        self.bits
    }

    /// Value returned for reads of unmapped addresses.
    pub fn set_open_bus(&mut self, val: u8) {
        self.open_bus = val;
    }

    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    fn insert(
        &mut self,
        name: &str,
        start: u32,
        len: usize,
        kind: RegionKind,
    ) -> Result<(), ConfigError> {
        if len == 0 {
            return Err(ConfigError::InvalidRegion {
                name: name.to_string(),
                reason: "zero length".to_string(),
            });
        }
        let end = start as u64 + len as u64 - 1;
        if end > self.mask as u64 {
            return Err(ConfigError::RegionOutOfRange {
                name: name.to_string(),
                end: end.min(u32::MAX as u64) as u32,
                bits: self.bits,
            });
        }
        let end = end as u32;
        if let Some(other) = self
            .regions
            .iter()
            .find(|r| r.start <= end && start <= r.end)
        {
            return Err(ConfigError::RegionOverlap {
                name: name.to_string(),
                other: other.name.clone(),
                start,
                end,
            });
        }
        let at = self.regions.partition_point(|r| r.start < start);
        self.regions.insert(
            at,
            Region {
                name: name.to_string(),
                start,
                end,
                wait_states: 0,
                kind,
            },
        );
        Ok(())
    }

    pub fn map_ram(&mut self, name: &str, start: u32, len: usize) -> Result<(), ConfigError> {
        self.insert(name, start, len, RegionKind::Ram(vec![0; len]))
    }

    /// ROM image; writes are dropped and logged.
    pub fn map_rom(&mut self, name: &str, start: u32, image: Vec<u8>) -> Result<(), ConfigError> {
        let len = image.len();
        self.insert(name, start, len, RegionKind::Rom(image))
    }

    pub fn map_shared(&mut self, name: &str, start: u32, ram: SharedRam) -> Result<(), ConfigError> {
        let len = ram.len();
        self.insert(name, start, len, RegionKind::Shared(ram))
    }

    /// A read-only `window`-byte view onto `data`, selecting bank
    /// `select.get() % banks`. Writes are dropped like ROM writes.
    pub fn map_banked(
        &mut self,
        name: &str,
        start: u32,
        window: usize,
        data: Vec<u8>,
        select: BankSelect,
    ) -> Result<(), ConfigError> {
        self.insert_banked(name, start, window, data, select, false)
    }

    /// Like [`map_banked`](Self::map_banked), but writes land in the selected bank.
    pub fn map_banked_ram(
        &mut self,
        name: &str,
        start: u32,
        window: usize,
        data: Vec<u8>,
        select: BankSelect,
    ) -> Result<(), ConfigError> {
        self.insert_banked(name, start, window, data, select, true)
    }

    fn insert_banked(
        &mut self,
        name: &str,
        start: u32,
        window: usize,
        data: Vec<u8>,
        select: BankSelect,
        writable: bool,
    ) -> Result<(), ConfigError> {
        if window == 0 || data.len() < window || data.len() % window != 0 {
            return Err(ConfigError::InvalidRegion {
                name: name.to_string(),
                reason: format!(
                    "banked data of {} bytes is not a whole number of {}-byte banks",
                    data.len(),
                    window
                ),
            });
        }
        self.insert(
            name,
            start,
            window,
            RegionKind::Banked {
                data,
                window,
                select,
                writable,
            },
        )
    }

    pub fn map_device(
        &mut self,
        name: &str,
        start: u32,
        len: usize,
        device: Box<dyn MemoryDevice>,
    ) -> Result<(), ConfigError> {
        self.insert(name, start, len, RegionKind::Device(device))
    }

    /// Port range `start..=end` in the separate I/O space.
    pub fn map_io(
        &mut self,
        name: &str,
        start: u16,
        end: u16,
        device: Box<dyn MemoryDevice>,
    ) -> Result<(), ConfigError> {
        if end < start || self.ports.iter().any(|p| p.start <= end && start <= p.end) {
            return Err(ConfigError::InvalidRegion {
                name: name.to_string(),
                reason: format!("port range {:04X}-{:04X} is empty or overlaps", start, end),
            });
        }
        self.ports.push(PortRange { start, end, device });
        Ok(())
    }

    /// Opcode fetches in `start..start + decrypted.len()` come from `decrypted`.
    /// With `decrypt_args`, operand fetches do too; data reads always see the raw region.
    pub fn set_opcode_overlay(
        &mut self,
        start: u32,
        decrypted: Vec<u8>,
        decrypt_args: bool,
    ) -> Result<(), ConfigError> {
        let end = start as u64 + decrypted.len() as u64;
        if decrypted.is_empty() || end - 1 > self.mask as u64 {
            return Err(ConfigError::InvalidRegion {
                name: "opcode overlay".to_string(),
                reason: "empty or outside the address space".to_string(),
            });
        }
        self.overlay = Some(OpcodeOverlay {
            start,
            data: decrypted,
            decrypt_args,
        });
        Ok(())
    }

    /// Extra cycles charged for every access to the named region.
    pub fn set_wait_states(&mut self, name: &str, cycles: u32) -> Result<(), ConfigError> {
        match self.regions.iter_mut().find(|r| r.name == name) {
            Some(region) => {
                region.wait_states = cycles;
                Ok(())
            }
            None => Err(ConfigError::InvalidRegion {
                name: name.to_string(),
                reason: "no such region".to_string(),
            }),
        }
    }

    /// Copy raw bytes into RAM-like regions, bypassing ROM write protection.
    /// Bytes that land on unmapped addresses or devices are skipped.
    pub fn poke(&mut self, addr: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            let a = addr.wrapping_add(i as u32) & self.mask;
            if let Some(idx) = self.find(a) {
                let region = &mut self.regions[idx];
                let offset = (a - region.start) as usize;
                match &mut region.kind {
                    RegionKind::Ram(data) | RegionKind::Rom(data) => data[offset] = *b,
                    RegionKind::Shared(ram) => ram.write(offset, *b),
                    RegionKind::Banked {
                        data,
                        window,
                        select,
                        ..
                    } => {
                        let at = bank_offset(data.len(), *window, select, offset);
                        data[at] = *b;
                    }
                    RegionKind::Device(_) => {}
                }
            }
        }
    }

    /// Side-effect free read for debuggers. Devices report open bus.
    pub fn peek(&self, addr: u32) -> u8 {
        let addr = addr & self.mask;
        match self.find(addr) {
            Some(idx) => {
                let region = &self.regions[idx];
                let offset = (addr - region.start) as usize;
                match &region.kind {
                    RegionKind::Ram(data) | RegionKind::Rom(data) => data[offset],
                    RegionKind::Shared(ram) => ram.read(offset),
                    RegionKind::Banked {
                        data,
                        window,
                        select,
                        ..
                    } => data[bank_offset(data.len(), *window, select, offset)],
                    RegionKind::Device(_) => self.open_bus,
                }
            }
            None => self.open_bus,
        }
    }

    /// `(name, kind, start, end)` for every mapped region, in address order.
    pub fn regions(&self) -> Vec<(String, &'static str, u32, u32)> {
        self.regions
            .iter()
            .map(|r| (r.name.clone(), r.kind.label(), r.start, r.end))
            .collect()
    }

    fn find(&self, addr: u32) -> Option<usize> {
        let idx = self.regions.partition_point(|r| r.start <= addr);
        if idx > 0 && self.regions[idx - 1].end >= addr {
            Some(idx - 1)
        } else {
            None
        }
    }

    fn overlay_byte(&mut self, addr: u32, is_arg: bool) -> Option<u8> {
        let overlay = self.overlay.as_ref()?;
        if is_arg && !overlay.decrypt_args {
            return None;
        }
        let byte = overlay.get(addr)?;
        if let Some(idx) = self.find(addr) {
            self.pending_wait += self.regions[idx].wait_states;
        }
        Some(byte)
    }
}

impl Bus for AddressSpace {
    fn read_byte(&mut self, addr: u32) -> u8 {
        let addr = addr & self.mask;
        match self.find(addr) {
            Some(idx) => {
                let region = &mut self.regions[idx];
                self.pending_wait += region.wait_states;
                region.read(addr)
            }
            None => {
                let open_bus = self.open_bus;
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("unmapped read at {:X} -> {:02X}", addr, open_bus)
                });
                open_bus
            }
        }
    }

    fn write_byte(&mut self, addr: u32, val: u8) {
        let addr = addr & self.mask;
        match self.find(addr) {
            Some(idx) => {
                let region = &mut self.regions[idx];
                self.pending_wait += region.wait_states;
                region.write(addr, val);
            }
            None => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("unmapped write {:02X} at {:X} dropped", val, addr)
                });
            }
        }
    }

    fn read_opcode(&mut self, addr: u32) -> u8 {
        let addr = addr & self.mask;
        match self.overlay_byte(addr, false) {
            Some(byte) => byte,
            None => self.read_byte(addr),
        }
    }

    fn read_opcode_arg(&mut self, addr: u32) -> u8 {
        let addr = addr & self.mask;
        match self.overlay_byte(addr, true) {
            Some(byte) => byte,
            None => self.read_byte(addr),
        }
    }

    fn io_read(&mut self, port: u16) -> u8 {
        match self
            .ports
            .iter_mut()
            .find(|p| p.start <= port && port <= p.end)
        {
            Some(range) => {
                let offset = (port - range.start) as u32;
                range.device.read(offset)
            }
            None => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("unmapped port read {:04X}", port)
                });
                0xFF
            }
        }
    }

    fn io_write(&mut self, port: u16, val: u8) {
        match self
            .ports
            .iter_mut()
            .find(|p| p.start <= port && port <= p.end)
        {
            Some(range) => {
                let offset = (port - range.start) as u32;
                range.device.write(offset, val);
            }
            None => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("unmapped port write {:02X} to {:04X}", val, port)
                });
            }
        }
    }

    fn take_wait_states(&mut self) -> u32 {
        std::mem::take(&mut self.pending_wait)
    }

    /// Writable contents only: RAM, shared RAM, bank selections and device state.
    fn save_state(&self) -> Value {
        let regions: Vec<Value> = self
            .regions
            .iter()
            .map(|r| match &r.kind {
                RegionKind::Ram(data) => json!({ "name": r.name, "ram": data }),
                RegionKind::Shared(ram) => json!({ "name": r.name, "ram": ram.contents() }),
                RegionKind::Banked {
                    data,
                    select,
                    writable: true,
                    ..
                } => json!({ "name": r.name, "bank": select.get(), "ram": data }),
                RegionKind::Banked { select, .. } => json!({ "name": r.name, "bank": select.get() }),
                RegionKind::Device(dev) => json!({ "name": r.name, "device": dev.save_state() }),
                RegionKind::Rom(_) => json!({ "name": r.name }),
            })
            .collect();
        let ports: Vec<Value> = self.ports.iter().map(|p| p.device.save_state()).collect();
        json!({ "regions": regions, "ports": ports, "pending_wait": self.pending_wait })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), StateError> {
        let saved = v["regions"]
            .as_array()
            .ok_or(StateError::MissingField("regions"))?;
        if saved.len() != self.regions.len() {
            return Err(StateError::Layout(format!(
                "{} regions saved, {} mapped",
                saved.len(),
                self.regions.len()
            )));
        }
        for (region, entry) in self.regions.iter().zip(saved) {
            if entry["name"].as_str() != Some(region.name.as_str()) {
                return Err(StateError::Layout(format!(
                    "region {:?} not found in save state",
                    region.name
                )));
            }
            match &region.kind {
                RegionKind::Ram(_) | RegionKind::Shared(_) => {
                    check_ram_len(entry, region_len(region), &region.name)?;
                }
                RegionKind::Banked {
                    data,
                    writable: true,
                    ..
                } => check_ram_len(entry, data.len(), &region.name)?,
                _ => {}
            }
        }
        for (region, entry) in self.regions.iter_mut().zip(saved) {
            match &mut region.kind {
                RegionKind::Ram(data) => {
                    *data = serde_json::from_value(entry["ram"].clone())?;
                }
                RegionKind::Shared(ram) => {
                    let data: Vec<u8> = serde_json::from_value(entry["ram"].clone())?;
                    ram.replace(&data);
                }
                RegionKind::Banked {
                    data,
                    select,
                    writable,
                    ..
                } => {
                    let bank = entry["bank"]
                        .as_u64()
                        .ok_or(StateError::MissingField("bank"))?;
                    if *writable {
                        *data = serde_json::from_value(entry["ram"].clone())?;
                    }
                    select.set(bank as usize);
                }
                RegionKind::Device(dev) => dev.load_state(&entry["device"])?,
                RegionKind::Rom(_) => {}
            }
        }
        if let Some(ports) = v["ports"].as_array() {
            for (range, state) in self.ports.iter_mut().zip(ports) {
                range.device.load_state(state)?;
            }
        }
        self.pending_wait = v["pending_wait"].as_u64().unwrap_or(0) as u32;
        Ok(())
    }
}

/// Index into banked `data` for `offset` within the selected window.
fn bank_offset(len: usize, window: usize, select: &BankSelect, offset: usize) -> usize {
    (select.get() % (len / window)) * window + offset
}

fn region_len(region: &Region) -> usize {
    (region.end - region.start) as usize + 1
}

fn check_ram_len(entry: &Value, expected: usize, name: &str) -> Result<(), StateError> {
    match entry["ram"].as_array() {
        Some(bytes) if bytes.len() == expected => Ok(()),
        Some(bytes) => Err(StateError::Layout(format!(
            "region {:?} saved with {} bytes, mapped with {}",
            name,
            bytes.len(),
            expected
        ))),
        None => Err(StateError::MissingField("ram")),
    }
}
