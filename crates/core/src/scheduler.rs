//! Cooperative, deterministic scheduler over execution units.
//!
//! Units run round-robin in registration order against one master clock.
//! A unit's cycle target at master tick `t` is `t * unit_hz / master_hz`,
//! recomputed from zero each slice so rounding never accumulates. Whatever a
//! unit overran in one slice comes off its next budget.
//!
//! Interrupt signals between units go through [`LineSender`]: they are queued
//! while the sending unit runs and applied, in order, as soon as its run
//! returns. Single-threaded: exactly one unit is inside `run()` at a time.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::SchedulerConfig;
use crate::engine::{
    check_envelope, forward_engine_state, AbortHandle, EngineState, ExecutionUnit, IdlePolicy,
    RegisterView, RunState, STATE_VERSION,
};
use crate::error::{ConfigError, SchedulerError, StateError};
use crate::interrupt::{InputLine, LineState};
use crate::logging::{log, LogCategory, LogLevel};

/// Handle to a registered unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(usize);

impl UnitId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSignal {
    pub target: UnitId,
    pub line: InputLine,
    pub state: LineState,
}

type SignalQueue = Rc<RefCell<Vec<LineSignal>>>;

/// Lets a device on one unit's bus drive interrupt lines of another unit.
#[derive(Debug, Clone)]
pub struct LineSender {
    queue: SignalQueue,
    sender: AbortHandle,
}

impl LineSender {
    pub fn send(&self, target: UnitId, line: InputLine, state: LineState) {
        self.queue
            .borrow_mut()
            .push(LineSignal { target, line, state });
    }

    /// Send, then end the sender's timeslice at its next instruction boundary
    /// so the target sees the signal sooner. The sender makes the cycles up
    /// in its next slice.
    pub fn send_and_yield(&self, target: UnitId, line: InputLine, state: LineState) {
        self.send(target, line, state);
        self.sender.abort();
    }
}

/// How often a periodic interrupt fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// At the end of every frame (vblank style).
    Frame,
    /// Every `n` master ticks.
    Ticks(u64),
}

struct Periodic {
    target: UnitId,
    line: InputLine,
    state: LineState,
    period: Period,
    /// Master tick of the next `Ticks` firing.
    next: u64,
}

struct Slot {
    unit: Box<dyn ExecutionUnit>,
    /// Unit cycles accounted for, overrun included.
    executed: u64,
    suspended: bool,
}

/// Unit cycles elapsed after `ticks` master ticks.
fn cycles_at(ticks: u64, unit_hz: u32, master_hz: u64) -> u64 {
    (ticks as u128 * unit_hz as u128 / master_hz as u128) as u64
}

pub struct Scheduler {
    config: SchedulerConfig,
    slots: Vec<Slot>,
    periodic: Vec<Periodic>,
    queue: SignalQueue,
    now: u64,
    frame: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            slots: Vec::new(),
            periodic: Vec::new(),
            queue: Rc::new(RefCell::new(Vec::new())),
            now: 0,
            frame: 0,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a unit. It joins at the current time and does not replay the past.
    pub fn add_unit(&mut self, unit: Box<dyn ExecutionUnit>) -> Result<UnitId, ConfigError> {
        if self.slots.iter().any(|s| s.unit.name() == unit.name()) {
            return Err(ConfigError::DuplicateUnit(unit.name().to_string()));
        }
        let executed = cycles_at(self.now, unit.clock_hz(), self.config.master_hz);
        log(LogCategory::Scheduler, LogLevel::Info, || {
            format!("unit {:?} added at {} Hz", unit.name(), unit.clock_hz())
        });
        self.slots.push(Slot {
            unit,
            executed,
            suspended: false,
        });
        Ok(UnitId(self.slots.len() - 1))
    }

    pub fn unit_count(&self) -> usize {
        self.slots.len()
    }

    pub fn find(&self, name: &str) -> Result<UnitId, SchedulerError> {
        self.slots
            .iter()
            .position(|s| s.unit.name() == name)
            .map(UnitId)
            .ok_or_else(|| SchedulerError::UnknownUnit(name.to_string()))
    }

    fn slot(&self, id: UnitId) -> Result<&Slot, SchedulerError> {
        self.slots.get(id.0).ok_or(SchedulerError::BadIndex(id.0))
    }

    fn slot_mut(&mut self, id: UnitId) -> Result<&mut Slot, SchedulerError> {
        self.slots.get_mut(id.0).ok_or(SchedulerError::BadIndex(id.0))
    }

    pub fn unit(&self, id: UnitId) -> Result<&dyn ExecutionUnit, SchedulerError> {
        Ok(self.slot(id)?.unit.as_ref())
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Result<&mut dyn ExecutionUnit, SchedulerError> {
        Ok(self.slot_mut(id)?.unit.as_mut())
    }

    /// Cycles accounted to `id` so far.
    pub fn executed(&self, id: UnitId) -> Result<u64, SchedulerError> {
        Ok(self.slot(id)?.executed)
    }

    /// Current master tick.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Frames completed by [`run_frame`](Self::run_frame).
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// A sender whose `send_and_yield` ends `from`'s timeslice.
    pub fn line_sender(&self, from: &dyn ExecutionUnit) -> LineSender {
        LineSender {
            queue: self.queue.clone(),
            sender: from.abort_handle(),
        }
    }

    fn check_line(&self, id: UnitId, line: InputLine) -> Result<(), SchedulerError> {
        let unit = self.unit(id)?;
        if let InputLine::Irq(n) = line {
            if n >= unit.irq_line_count() {
                return Err(SchedulerError::NoSuchLine {
                    unit: unit.name().to_string(),
                    line: n,
                    lines: unit.irq_line_count(),
                });
            }
        }
        Ok(())
    }

    /// Drive a unit's line directly, outside any run.
    pub fn set_line(
        &mut self,
        id: UnitId,
        line: InputLine,
        state: LineState,
    ) -> Result<(), SchedulerError> {
        self.check_line(id, line)?;
        self.slot_mut(id)?.unit.set_line(line, state);
        Ok(())
    }

    pub fn add_periodic(
        &mut self,
        target: UnitId,
        line: InputLine,
        state: LineState,
        period: Period,
    ) -> Result<(), SchedulerError> {
        self.check_line(target, line)?;
        let next = match period {
            Period::Ticks(0) => return Err(SchedulerError::ZeroPeriod),
            Period::Ticks(n) => self.now + n,
            Period::Frame => 0,
        };
        self.periodic.push(Periodic {
            target,
            line,
            state,
            period,
            next,
        });
        Ok(())
    }

    /// Time keeps advancing for a suspended unit; it just does not run.
    pub fn suspend(&mut self, id: UnitId) -> Result<(), SchedulerError> {
        self.slot_mut(id)?.suspended = true;
        Ok(())
    }

    pub fn resume(&mut self, id: UnitId) -> Result<(), SchedulerError> {
        self.slot_mut(id)?.suspended = false;
        Ok(())
    }

    pub fn is_suspended(&self, id: UnitId) -> Result<bool, SchedulerError> {
        Ok(self.slot(id)?.suspended)
    }

    pub fn reset_unit(&mut self, id: UnitId) -> Result<(), SchedulerError> {
        self.slot_mut(id)?.unit.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.unit.reset();
        }
    }

    /// Master tick at which frame `n` starts.
    fn frame_start(&self, n: u64) -> u64 {
        (n as u128 * self.config.master_hz as u128 / self.config.frame_rate as u128) as u64
    }

    /// Run one frame in `interleave` slices. The last slice absorbs the
    /// rounding remainder, so frame boundaries never drift.
    pub fn run_frame(&mut self) {
        let base = self.frame_start(self.frame);
        let end = self.frame_start(self.frame + 1);
        let slice = self.config.slice_ticks();
        for k in 1..self.config.interleave as u64 {
            self.run_until(base + k * slice);
        }
        self.run_until(end);
        self.frame += 1;

        let fired: Vec<LineSignal> = self
            .periodic
            .iter()
            .filter(|p| p.period == Period::Frame)
            .map(|p| LineSignal {
                target: p.target,
                line: p.line,
                state: p.state,
            })
            .collect();
        self.apply(fired);
    }

    pub fn run_for(&mut self, ticks: u64) {
        self.run_until(self.now + ticks);
    }

    /// Advance the master clock to `t`, stopping at periodic interrupts on the way.
    pub fn run_until(&mut self, t: u64) {
        while self.now < t {
            let stop = self
                .periodic
                .iter()
                .filter(|p| matches!(p.period, Period::Ticks(_)))
                .map(|p| p.next)
                .filter(|&next| next > self.now)
                .min()
                .map_or(t, |next| next.min(t));
            self.run_slice(stop);
            self.now = stop;
            self.fire_due();
        }
    }

    fn run_slice(&mut self, end: u64) {
        self.apply_queued();
        let master_hz = self.config.master_hz;
        for i in 0..self.slots.len() {
            let slot = &mut self.slots[i];
            let target = cycles_at(end, slot.unit.clock_hz(), master_hz);
            if slot.suspended {
                slot.executed = slot.executed.max(target);
                continue;
            }
            if slot.executed >= target {
                continue;
            }
            let budget = (target - slot.executed).min(i32::MAX as u64) as i32;
            let consumed = slot.unit.run(budget).max(0) as u64;
            slot.executed += consumed;
            if slot.unit.is_idle() && slot.executed < target {
                // Burst: nothing to do until an interrupt, skip ahead.
                slot.executed = target;
            }
            log(LogCategory::Scheduler, LogLevel::Trace, || {
                format!(
                    "{}: budget {} consumed {} at tick {}",
                    self.slots[i].unit.name(),
                    budget,
                    consumed,
                    end
                )
            });
            self.apply_queued();
        }
    }

    fn fire_due(&mut self) {
        let now = self.now;
        let mut fired = Vec::new();
        for p in &mut self.periodic {
            if let Period::Ticks(n) = p.period {
                while p.next <= now {
                    fired.push(LineSignal {
                        target: p.target,
                        line: p.line,
                        state: p.state,
                    });
                    p.next += n;
                }
            }
        }
        self.apply(fired);
    }

    fn apply_queued(&mut self) {
        let signals = std::mem::take(&mut *self.queue.borrow_mut());
        self.apply(signals);
    }

    fn apply(&mut self, signals: Vec<LineSignal>) {
        for s in signals {
            match self.slots.get_mut(s.target.0) {
                Some(slot) => slot.unit.set_line(s.line, s.state),
                None => log(LogCategory::Scheduler, LogLevel::Warn, || {
                    format!("signal for unknown unit #{} dropped", s.target.0)
                }),
            }
        }
    }

    /// Scheduler timing plus every unit's save state.
    pub fn save_state(&self) -> Value {
        let units: Vec<Value> = self
            .slots
            .iter()
            .map(|s| {
                json!({
                    "name": s.unit.name(),
                    "executed": s.executed,
                    "suspended": s.suspended,
                    "state": s.unit.save_state(),
                })
            })
            .collect();
        let periodic: Vec<u64> = self.periodic.iter().map(|p| p.next).collect();
        let pending = self.queue.borrow().clone();
        json!({
            "version": STATE_VERSION,
            "now": self.now,
            "frame": self.frame,
            "units": units,
            "periodic": periodic,
            "pending_signals": pending,
        })
    }

    pub fn load_state(&mut self, v: &Value) -> Result<(), StateError> {
        let version = v["version"]
            .as_u64()
            .ok_or(StateError::MissingField("version"))?;
        if version != STATE_VERSION {
            return Err(StateError::Version {
                found: version,
                expected: STATE_VERSION,
            });
        }
        let now = v["now"].as_u64().ok_or(StateError::MissingField("now"))?;
        let frame = v["frame"].as_u64().ok_or(StateError::MissingField("frame"))?;
        let units = v["units"]
            .as_array()
            .ok_or(StateError::MissingField("units"))?;
        let periodic: Vec<u64> = serde_json::from_value(v["periodic"].clone())?;
        let pending: Vec<LineSignal> = serde_json::from_value(v["pending_signals"].clone())?;

        if units.len() != self.slots.len() {
            return Err(StateError::Layout(format!(
                "{} units saved, {} registered",
                units.len(),
                self.slots.len()
            )));
        }
        if periodic.len() != self.periodic.len() {
            return Err(StateError::Layout(format!(
                "{} periodic interrupts saved, {} registered",
                periodic.len(),
                self.periodic.len()
            )));
        }
        for (slot, entry) in self.slots.iter().zip(units) {
            if entry["name"].as_str() != Some(slot.unit.name()) {
                return Err(StateError::Layout(format!(
                    "unit {:?} not found in save state",
                    slot.unit.name()
                )));
            }
        }

        let mut counters = Vec::with_capacity(units.len());
        for entry in units {
            let executed = entry["executed"]
                .as_u64()
                .ok_or(StateError::MissingField("executed"))?;
            counters.push((executed, entry["suspended"].as_bool().unwrap_or(false)));
        }

        // A unit can still reject its own state; put every unit back if one does.
        let backups: Vec<Value> = self.slots.iter().map(|s| s.unit.save_state()).collect();
        for (i, entry) in units.iter().enumerate() {
            if let Err(e) = self.slots[i].unit.load_state(&entry["state"]) {
                for (slot, backup) in self.slots.iter_mut().zip(&backups).take(i + 1) {
                    if let Err(undo) = slot.unit.load_state(backup) {
                        log(LogCategory::Scheduler, LogLevel::Error, || {
                            format!("unit {:?}: rollback failed: {}", slot.unit.name(), undo)
                        });
                    }
                }
                return Err(e);
            }
        }
        for (slot, (executed, suspended)) in self.slots.iter_mut().zip(counters) {
            slot.executed = executed;
            slot.suspended = suspended;
        }
        for (p, next) in self.periodic.iter_mut().zip(periodic) {
            p.next = next;
        }
        *self.queue.borrow_mut() = pending;
        self.now = now;
        self.frame = frame;
        Ok(())
    }
}

/// A non-CPU generator (sound or video timing) on the scheduler's time base.
pub trait ClockedDevice: RegisterView {
    /// Advance the device; returns the clocks that took (at least one).
    fn clock(&mut self) -> u32;

    fn reset(&mut self) {}

    fn save_state(&self) -> Value {
        Value::Null
    }

    fn load_state(&mut self, _v: &Value) -> Result<(), StateError> {
        Ok(())
    }
}

/// Runs a [`ClockedDevice`] as an [`ExecutionUnit`].
pub struct DeviceUnit<D: ClockedDevice> {
    pub device: D,
    pub engine: EngineState,
}

impl<D: ClockedDevice> DeviceUnit<D> {
    pub fn new(name: &str, clock_hz: u32, device: D) -> Self {
        Self {
            device,
            engine: EngineState::new(name, clock_hz, 1, IdlePolicy::Spin),
        }
    }
}

impl<D: ClockedDevice> ExecutionUnit for DeviceUnit<D> {
    forward_engine_state!();

    fn reset(&mut self) {
        self.device.reset();
    }

    fn run(&mut self, budget: i32) -> i32 {
        let counter = &mut self.engine.counter;
        counter.begin(budget);
        while !counter.should_stop() {
            let clocks = self.device.clock().max(1);
            counter.charge(clocks);
        }
        counter.consumed()
    }

    fn run_state(&self) -> RunState {
        RunState::Running
    }

    fn pc(&self) -> u32 {
        0
    }

    fn registers(&self) -> &dyn RegisterView {
        &self.device
    }

    fn save_state(&self) -> Value {
        json!({
            "version": STATE_VERSION,
            "cpu": "device",
            "engine": self.engine.save(),
            "device": self.device.save_state(),
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), StateError> {
        check_envelope(v, "device")?;
        self.engine.load(&v["engine"])?;
        self.device.load_state(&v["device"])
    }
}

/// Signals a line on another unit every `period` of its own clocks.
pub struct PeriodicTimer {
    period: u32,
    count: u32,
    fired: u64,
    target: UnitId,
    line: InputLine,
    state: LineState,
    sender: Option<LineSender>,
}

impl PeriodicTimer {
    pub fn new(period: u32, target: UnitId, line: InputLine, state: LineState) -> Self {
        Self {
            period: period.max(1),
            count: 0,
            fired: 0,
            target,
            line,
            state,
            sender: None,
        }
    }

    pub fn connect(&mut self, sender: LineSender) {
        self.sender = Some(sender);
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }
}

impl RegisterView for PeriodicTimer {
    fn register(&self, name: &str) -> Option<u32> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(self.count),
            "PERIOD" => Some(self.period),
            "FIRED" => Some(self.fired as u32),
            _ => None,
        }
    }

    fn register_names(&self) -> &'static [&'static str] {
        &["COUNT", "PERIOD", "FIRED"]
    }
}

impl ClockedDevice for PeriodicTimer {
    fn clock(&mut self) -> u32 {
        self.count += 1;
        if self.count >= self.period {
            self.count = 0;
            self.fired += 1;
            match &self.sender {
                Some(sender) => sender.send(self.target, self.line, self.state),
                None => log(LogCategory::Scheduler, LogLevel::Debug, || {
                    "periodic timer fired with no sender connected".to_string()
                }),
            }
        }
        1
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn save_state(&self) -> Value {
        json!({ "count": self.count, "fired": self.fired })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), StateError> {
        self.count = v["count"]
            .as_u64()
            .ok_or(StateError::MissingField("count"))? as u32;
        self.fired = v["fired"].as_u64().unwrap_or(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{AddressSpace, FlatMemory, SharedRam};
    use crate::config::{DeviceConfig, IsaConfig};
    use crate::cpu_6502::Cpu6502;
    use crate::cpu_8086::Cpu8086;

    /// Counts its clocks; each step takes `step` clocks.
    struct Ticker {
        clocks: u64,
        step: u32,
    }

    impl RegisterView for Ticker {
        fn register(&self, name: &str) -> Option<u32> {
            (name == "CLOCKS").then_some(self.clocks as u32)
        }

        fn register_names(&self) -> &'static [&'static str] {
            &["CLOCKS"]
        }
    }

    impl ClockedDevice for Ticker {
        fn clock(&mut self) -> u32 {
            self.clocks += self.step as u64;
            self.step
        }

        fn save_state(&self) -> Value {
            json!({ "clocks": self.clocks })
        }

        fn load_state(&mut self, v: &Value) -> Result<(), StateError> {
            self.clocks = v["clocks"].as_u64().unwrap_or(0);
            Ok(())
        }
    }

    fn ticker(name: &str, hz: u32, step: u32) -> Box<dyn ExecutionUnit> {
        Box::new(DeviceUnit::new(name, hz, Ticker { clocks: 0, step }))
    }

    fn config(master_hz: u64, frame_rate: u32, interleave: u32) -> SchedulerConfig {
        SchedulerConfig {
            master_hz,
            frame_rate,
            interleave,
        }
    }

    /// 6502 at 1 MHz: CLI, spin; the IRQ handler increments $20.
    fn irq_counter(name: &str) -> (Box<dyn ExecutionUnit>, SharedRam) {
        let ram = SharedRam::new(0x800);
        let mut rom = vec![0xEA; 0x8000];
        rom[..4].copy_from_slice(&[0x58, 0x4C, 0x01, 0x80]);
        rom[0x1000..0x1003].copy_from_slice(&[0xE6, 0x20, 0x40]);
        rom[0x7FFC..].copy_from_slice(&[0x00, 0x80, 0x00, 0x90]);
        let mut space = AddressSpace::new(16);
        space.map_shared("ram", 0, ram.clone()).unwrap();
        space.map_rom("rom", 0x8000, rom).unwrap();
        let cfg = DeviceConfig::new(name, IsaConfig::mos6502(), 1_000_000);
        let cpu = Cpu6502::from_config(&cfg, space).unwrap();
        (Box::new(cpu), ram)
    }

    /// 6502 at 1 MHz looping on INC $10. NMI restarts the loop.
    fn counter(name: &str) -> Box<dyn ExecutionUnit> {
        let mut mem = FlatMemory::new(16);
        mem.load(0x8000, &[0xE6, 0x10, 0x4C, 0x00, 0x80]);
        mem.load(0xFFFA, &[0x00, 0x80]);
        let mut cfg = DeviceConfig::new(name, IsaConfig::mos6502(), 1_000_000);
        cfg.reset_vector = Some(0x8000);
        Box::new(Cpu6502::from_config(&cfg, mem).unwrap())
    }

    #[test]
    fn units_track_their_clock_ratio() {
        let mut sched = Scheduler::new(config(1_000_000, 60, 4)).unwrap();
        let a = sched.add_unit(ticker("a", 1_000_000, 1)).unwrap();
        let b = sched.add_unit(ticker("b", 500_000, 1)).unwrap();
        for _ in 0..60 {
            sched.run_frame();
        }
        assert_eq!(sched.now(), 1_000_000);
        assert_eq!(sched.executed(a).unwrap(), 1_000_000);
        assert_eq!(sched.executed(b).unwrap(), 500_000);
        assert_eq!(
            sched.unit(b).unwrap().registers().register("CLOCKS"),
            Some(500_000)
        );
    }

    #[test]
    fn last_slice_absorbs_remainder() {
        let mut sched = Scheduler::new(config(1000, 60, 4)).unwrap();
        let a = sched.add_unit(ticker("a", 1000, 1)).unwrap();
        sched.run_frame();
        assert_eq!(sched.now(), 16);
        for _ in 1..60 {
            sched.run_frame();
        }
        assert_eq!(sched.now(), 1000);
        assert_eq!(sched.executed(a).unwrap(), 1000);
        assert_eq!(sched.frame(), 60);
    }

    #[test]
    fn overrun_is_carried_into_the_next_slice() {
        let mut sched = Scheduler::new(config(1_000_000, 60, 8)).unwrap();
        let a = sched.add_unit(ticker("a", 1_000_000, 7)).unwrap();
        for _ in 0..30 {
            sched.run_frame();
            let target = sched.now();
            let executed = sched.executed(a).unwrap();
            assert!(executed >= target && executed < target + 7);
        }
    }

    #[test]
    fn periodic_interrupt_every_n_ticks() {
        let mut sched = Scheduler::new(config(1_000_000, 50, 1)).unwrap();
        let (unit, ram) = irq_counter("main");
        let main = sched.add_unit(unit).unwrap();
        sched
            .add_periodic(main, InputLine::Irq(0), LineState::Hold, Period::Ticks(1000))
            .unwrap();
        sched.run_frame();
        // The firing at the frame boundary is serviced next frame.
        assert_eq!(ram.read(0x20), 19);
        sched.run_frame();
        assert_eq!(ram.read(0x20), 39);
    }

    #[test]
    fn periodic_interrupt_per_frame() {
        let mut sched = Scheduler::new(config(1_000_000, 60, 2)).unwrap();
        let (unit, ram) = irq_counter("main");
        let main = sched.add_unit(unit).unwrap();
        sched
            .add_periodic(main, InputLine::Irq(0), LineState::Hold, Period::Frame)
            .unwrap();
        for _ in 0..3 {
            sched.run_frame();
        }
        assert_eq!(ram.read(0x20), 2);
    }

    #[test]
    fn timer_device_drives_another_unit() {
        let mut sched = Scheduler::new(config(1_000_000, 50, 40)).unwrap();
        let (unit, ram) = irq_counter("main");
        let main = sched.add_unit(unit).unwrap();
        let mut timer = DeviceUnit::new(
            "timer",
            1_000_000,
            PeriodicTimer::new(500, main, InputLine::Irq(0), LineState::Hold),
        );
        let sender = sched.line_sender(&timer);
        timer.device.connect(sender);
        let timer = sched.add_unit(Box::new(timer)).unwrap();

        sched.run_frame();
        let fired = sched.unit(timer).unwrap().registers().register("fired");
        assert_eq!(fired, Some(40));
        assert_eq!(ram.read(0x20), 39);
    }

    /// Rings `target` with a yield on its tenth clock.
    struct Doorbell {
        clocks: u32,
        sender: Option<LineSender>,
    }

    impl RegisterView for Doorbell {
        fn register(&self, _name: &str) -> Option<u32> {
            None
        }

        fn register_names(&self) -> &'static [&'static str] {
            &[]
        }
    }

    impl ClockedDevice for Doorbell {
        fn clock(&mut self) -> u32 {
            self.clocks += 1;
            if self.clocks == 10 {
                if let Some(sender) = &self.sender {
                    sender.send_and_yield(UnitId(0), InputLine::Nmi, LineState::Pulse);
                }
            }
            1
        }
    }

    #[test]
    fn send_and_yield_ends_the_senders_slice() {
        let mut sched = Scheduler::new(config(1000, 1, 10)).unwrap();
        sched.add_unit(ticker("first", 1000, 1)).unwrap();
        let mut bell = DeviceUnit::new(
            "bell",
            1000,
            Doorbell {
                clocks: 0,
                sender: None,
            },
        );
        let sender = sched.line_sender(&bell);
        bell.device.sender = Some(sender);
        let bell = sched.add_unit(Box::new(bell)).unwrap();

        sched.run_until(100);
        assert_eq!(sched.executed(bell).unwrap(), 10);
        sched.run_until(200);
        assert_eq!(sched.executed(bell).unwrap(), 200);
    }

    #[test]
    fn burst_idle_unit_skips_ahead() {
        let mut mem = FlatMemory::new(20);
        mem.load(0x1000, &[0xF4]);
        let mut cfg = DeviceConfig::new("pc", IsaConfig::intel8086(), 5_000_000);
        cfg.reset_vector = Some(0x1000);
        cfg.idle_policy = IdlePolicy::Burst;
        let cpu = Cpu8086::from_config(&cfg, mem).unwrap();

        let mut sched = Scheduler::new(config(5_000_000, 50, 2)).unwrap();
        let pc = sched.add_unit(Box::new(cpu)).unwrap();
        sched.run_frame();
        assert_eq!(sched.executed(pc).unwrap(), 100_000);
        let unit = sched.unit(pc).unwrap();
        assert_eq!(unit.total_cycles(), 2);
        assert_eq!(unit.run_state(), RunState::Halted);
    }

    #[test]
    fn suspended_unit_does_not_run_but_time_passes() {
        let mut sched = Scheduler::new(config(1000, 10, 1)).unwrap();
        let a = sched.add_unit(ticker("a", 1000, 1)).unwrap();
        sched.suspend(a).unwrap();
        assert!(sched.is_suspended(a).unwrap());
        sched.run_frame();
        assert_eq!(sched.executed(a).unwrap(), 100);
        assert_eq!(sched.unit(a).unwrap().total_cycles(), 0);

        sched.resume(a).unwrap();
        sched.run_frame();
        assert_eq!(sched.unit(a).unwrap().total_cycles(), 100);
    }

    #[test]
    fn late_unit_joins_at_current_time() {
        let mut sched = Scheduler::new(config(1000, 10, 1)).unwrap();
        sched.add_unit(ticker("a", 1000, 1)).unwrap();
        sched.run_frame();
        let b = sched.add_unit(ticker("b", 2000, 1)).unwrap();
        assert_eq!(sched.executed(b).unwrap(), 200);
        sched.run_frame();
        assert_eq!(sched.unit(b).unwrap().total_cycles(), 200);
    }

    #[test]
    fn handle_errors() {
        let mut sched = Scheduler::new(config(1000, 10, 1)).unwrap();
        let a = sched.add_unit(ticker("a", 1000, 1)).unwrap();
        assert!(matches!(
            sched.add_unit(ticker("a", 1000, 1)),
            Err(ConfigError::DuplicateUnit(_))
        ));
        assert_eq!(
            sched.find("nope").err(),
            Some(SchedulerError::UnknownUnit("nope".to_string()))
        );
        assert_eq!(sched.find("a"), Ok(a));
        assert_eq!(
            sched.set_line(a, InputLine::Irq(3), LineState::Assert),
            Err(SchedulerError::NoSuchLine {
                unit: "a".to_string(),
                line: 3,
                lines: 1
            })
        );
        assert_eq!(
            sched.add_periodic(a, InputLine::Nmi, LineState::Pulse, Period::Ticks(0)),
            Err(SchedulerError::ZeroPeriod)
        );
        assert_eq!(sched.executed(UnitId(5)), Err(SchedulerError::BadIndex(5)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(Scheduler::new(config(0, 60, 1)).is_err());
        assert!(Scheduler::new(config(100, 60, 4)).is_err());
    }

    fn machine() -> Scheduler {
        let mut sched = Scheduler::new(config(1_000_000, 60, 4)).unwrap();
        let main = sched.add_unit(counter("main")).unwrap();
        let sub = sched.add_unit(counter("sub")).unwrap();
        let mut timer = DeviceUnit::new(
            "timer",
            250_000,
            PeriodicTimer::new(777, sub, InputLine::Nmi, LineState::Pulse),
        );
        let sender = sched.line_sender(&timer);
        timer.device.connect(sender);
        sched.add_unit(Box::new(timer)).unwrap();
        sched
            .add_periodic(main, InputLine::Irq(0), LineState::Hold, Period::Ticks(3333))
            .unwrap();
        sched
    }

    #[test]
    fn machine_runs_are_deterministic() {
        let mut a = machine();
        let mut b = machine();
        for _ in 0..5 {
            a.run_frame();
            b.run_frame();
        }
        assert_eq!(a.save_state(), b.save_state());
    }

    #[test]
    fn machine_save_restore_round_trip() {
        let mut original = machine();
        for _ in 0..3 {
            original.run_frame();
        }
        let saved = original.save_state();

        let mut restored = machine();
        restored.load_state(&saved).unwrap();
        assert_eq!(restored.save_state(), saved);

        for _ in 0..2 {
            original.run_frame();
            restored.run_frame();
        }
        assert_eq!(restored.save_state(), original.save_state());

        let mut straight = machine();
        for _ in 0..5 {
            straight.run_frame();
        }
        assert_eq!(straight.save_state(), original.save_state());
    }

    #[test]
    fn restore_into_different_machine_fails() {
        let mut sched = machine();
        sched.run_frame();
        let saved = sched.save_state();

        let mut other = Scheduler::new(config(1_000_000, 60, 4)).unwrap();
        other.add_unit(counter("main")).unwrap();
        assert!(matches!(
            other.load_state(&saved),
            Err(StateError::Layout(_))
        ));
    }

    #[test]
    fn failed_restore_leaves_every_unit_untouched() {
        let mut source = machine();
        for _ in 0..2 {
            source.run_frame();
        }
        let mut saved = source.save_state();
        // The first unit's state is fine; the second one names the wrong core.
        saved["units"][1]["state"]["cpu"] = json!("8086");

        let mut target = machine();
        target.run_frame();
        let before = target.save_state();
        assert!(matches!(
            target.load_state(&saved),
            Err(StateError::CpuMismatch { .. })
        ));
        assert_eq!(target.save_state(), before);
    }
}
