//! Execution-engine contract shared by every CPU core.
//!
//! A scheduler hands an [`ExecutionUnit`] a signed cycle budget; the unit
//! runs whole instructions until the budget is spent and reports how many
//! cycles it actually used. Instruction costs are charged once, after the
//! instruction completes, so a run may overrun its budget by up to one
//! instruction. The overrun is reported in the return value, never hidden.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bus::Bus;
use crate::error::StateError;
use crate::interrupt::{InputLine, InterruptController, LineState};
use crate::logging::{log, LogCategory, LogLevel};

/// Save-state envelope version written by every unit.
pub const STATE_VERSION: u64 = 1;

/// What a halted or jammed engine does with the rest of its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdlePolicy {
    /// Burn the remaining budget as no-ops.
    #[default]
    Spin,
    /// Return early and report idle so the scheduler can skip ahead.
    Burst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Running,
    /// Waiting for an interrupt (HLT/WAI).
    Halted,
    /// Locked up until reset (6502 JAM).
    Jammed,
}

/// Name/value view of a register file, for debuggers and trace output.
pub trait RegisterView {
    fn register(&self, name: &str) -> Option<u32>;
    fn register_names(&self) -> &'static [&'static str];
}

/// Snapshot handed to a [`DebugHook`] before each instruction.
pub struct HookContext<'a> {
    pub unit: &'a str,
    pub pc: u32,
    pub total_cycles: u64,
    pub registers: &'a dyn RegisterView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    /// Stop the run at this boundary. The instruction has not executed.
    Break,
}

pub trait DebugHook {
    fn before_instruction(&mut self, ctx: &HookContext<'_>) -> HookAction;
}

impl<F> DebugHook for F
where
    F: FnMut(&HookContext<'_>) -> HookAction,
{
    fn before_instruction(&mut self, ctx: &HookContext<'_>) -> HookAction {
        self(ctx)
    }
}

/// Shared flag that ends the current timeslice at the next boundary.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Rc<Cell<bool>>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.set(true);
    }

    fn take(&self) -> bool {
        self.0.replace(false)
    }
}

/// The signed "icount" of one engine.
#[derive(Debug, Clone, Default)]
pub struct CycleCounter {
    icount: i32,
    granted: i32,
    debt: u32,
    total: u64,
    abort: AbortHandle,
}

impl CycleCounter {
    /// Start a run. Negative budgets are clamped to zero. Stolen cycles are
    /// deducted here and count as consumed.
    pub fn begin(&mut self, budget: i32) {
        let budget = if budget < 0 {
            log(LogCategory::Scheduler, LogLevel::Warn, || {
                format!("negative cycle budget {} clamped to 0", budget)
            });
            0
        } else {
            budget
        };
        self.granted = budget;
        self.icount = budget;
        self.abort.take();
        if self.debt > 0 {
            let debt = std::mem::take(&mut self.debt);
            let stolen = i32::try_from(debt).unwrap_or(i32::MAX);
            self.icount = self.icount.saturating_sub(stolen);
            self.total += debt as u64;
        }
    }

    /// The one place cycles leave the budget.
    pub fn charge(&mut self, cycles: u32) {
        self.icount -= cycles as i32;
        self.total += cycles as u64;
    }

    /// Consume whatever budget is left as idle cycles.
    pub fn burn_remaining(&mut self) {
        if self.icount > 0 {
            self.total += self.icount as u64;
            self.icount = 0;
        }
    }

    pub fn remaining(&self) -> i32 {
        self.icount
    }

    /// Cycles used so far in this run, overrun included.
    pub fn consumed(&self) -> i32 {
        self.granted - self.icount
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Cycles taken away from the next run (DMA, bus contention).
    pub fn steal(&mut self, cycles: u32) {
        self.debt = self.debt.saturating_add(cycles);
    }

    /// Return previously stolen cycles that have not been applied yet.
    pub fn give_back(&mut self, cycles: u32) {
        self.debt = self.debt.saturating_sub(cycles);
    }

    pub fn debt(&self) -> u32 {
        self.debt
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.icount <= 0 || self.abort.take()
    }

    pub(crate) fn restore(&mut self, total: u64, debt: u32) {
        *self = Self {
            total,
            debt,
            abort: self.abort.clone(),
            ..Self::default()
        };
    }
}

/// Bookkeeping every engine carries next to its register file.
pub struct EngineState {
    pub name: String,
    pub clock_hz: u32,
    pub counter: CycleCounter,
    pub idle_policy: IdlePolicy,
    pub interrupts: InterruptController,
    hook: Option<Box<dyn DebugHook>>,
    resume_past_break: bool,
}

impl EngineState {
    pub fn new(name: &str, clock_hz: u32, irq_lines: u8, idle_policy: IdlePolicy) -> Self {
        Self {
            name: name.to_string(),
            clock_hz,
            counter: CycleCounter::default(),
            idle_policy,
            interrupts: InterruptController::new(irq_lines),
            hook: None,
            resume_past_break: false,
        }
    }

    pub(crate) fn save(&self) -> Value {
        json!({
            "total_cycles": self.counter.total(),
            "debt": self.counter.debt(),
            "interrupts": self.interrupts,
        })
    }

    pub(crate) fn load(&mut self, v: &Value) -> Result<(), StateError> {
        let total = v["total_cycles"]
            .as_u64()
            .ok_or(StateError::MissingField("total_cycles"))?;
        let debt = v["debt"].as_u64().unwrap_or(0) as u32;
        let interrupts: InterruptController = serde_json::from_value(v["interrupts"].clone())?;
        if interrupts.irq_line_count() != self.interrupts.irq_line_count() {
            return Err(StateError::Layout(format!(
                "{} irq lines saved, {} configured",
                interrupts.irq_line_count(),
                self.interrupts.irq_line_count()
            )));
        }
        self.interrupts = interrupts;
        self.counter.restore(total, debt);
        self.resume_past_break = false;
        Ok(())
    }

    /// Restore the bus and then the engine. Either both take the saved
    /// state or both keep what they had.
    pub(crate) fn load_with_bus<B: Bus>(
        &mut self,
        bus: &mut B,
        bus_state: &Value,
        engine_state: &Value,
    ) -> Result<(), StateError> {
        let backup = bus.save_state();
        let loaded = if bus_state.is_null() {
            Ok(())
        } else {
            bus.load_state(bus_state)
        };
        if let Err(e) = loaded.and_then(|()| self.load(engine_state)) {
            if let Err(undo) = bus.load_state(&backup) {
                log(LogCategory::CPU, LogLevel::Error, || {
                    format!("bus rollback failed: {}", undo)
                });
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Check the `version`/`cpu` header of a save state.
pub(crate) fn check_envelope(v: &Value, cpu: &str) -> Result<(), StateError> {
    let version = v["version"]
        .as_u64()
        .ok_or(StateError::MissingField("version"))?;
    if version != STATE_VERSION {
        return Err(StateError::Version {
            found: version,
            expected: STATE_VERSION,
        });
    }
    let found = v["cpu"].as_str().ok_or(StateError::MissingField("cpu"))?;
    if found != cpu {
        return Err(StateError::CpuMismatch {
            found: found.to_string(),
            expected: cpu.to_string(),
        });
    }
    Ok(())
}

/// The per-ISA half of the run loop.
pub(crate) trait InstructionCore {
    fn engine(&mut self) -> &mut EngineState;

    /// Engine bookkeeping plus the register view and current PC, borrowed together.
    fn hook_parts(&mut self) -> (&mut EngineState, &dyn RegisterView, u32);

    fn state(&self) -> RunState;

    /// Service an interrupt if one can be taken at this boundary; returns its cost.
    fn take_interrupt(&mut self) -> Option<u32>;

    /// Fetch, decode and execute one instruction; returns its cost before wait states.
    fn execute(&mut self) -> u32;

    fn wait_states(&mut self) -> u32;
}

/// Budgeted fetch/execute loop shared by all cores.
pub(crate) fn run_core<C: InstructionCore>(cpu: &mut C, budget: i32) -> i32 {
    cpu.engine().counter.begin(budget);

    while !cpu.engine().counter.should_stop() {
        if let Some(cycles) = cpu.take_interrupt() {
            let cycles = cycles + cpu.wait_states();
            cpu.engine().counter.charge(cycles);
            continue;
        }

        if cpu.state() != RunState::Running {
            let engine = cpu.engine();
            if engine.idle_policy == IdlePolicy::Spin {
                engine.counter.burn_remaining();
            }
            break;
        }

        let (engine, registers, pc) = cpu.hook_parts();
        if let Some(hook) = engine.hook.as_mut() {
            if std::mem::take(&mut engine.resume_past_break) {
                // Resuming from a break at this same boundary.
            } else {
                let ctx = HookContext {
                    unit: &engine.name,
                    pc,
                    total_cycles: engine.counter.total(),
                    registers,
                };
                if hook.before_instruction(&ctx) == HookAction::Break {
                    engine.resume_past_break = true;
                    break;
                }
            }
        }

        let cycles = cpu.execute();
        let cycles = cycles + cpu.wait_states();
        cpu.engine().counter.charge(cycles);
    }

    cpu.engine().counter.consumed()
}

/// A schedulable execution unit: a CPU core or a clocked device.
pub trait ExecutionUnit {
    fn name(&self) -> &str;
    fn clock_hz(&self) -> u32;

    /// Power-on/reset. Interrupt line state is kept.
    fn reset(&mut self);

    /// Run whole instructions until `budget` cycles are used; returns cycles consumed.
    fn run(&mut self, budget: i32) -> i32;

    /// Run exactly one instruction (or interrupt entry).
    fn step(&mut self) -> u32 {
        self.run(1).max(0) as u32
    }

    fn set_line(&mut self, line: InputLine, state: LineState);
    fn set_line_vector(&mut self, line: InputLine, vector: u32);
    fn irq_line_count(&self) -> u8;

    fn steal_cycles(&mut self, cycles: u32);
    fn give_back_cycles(&mut self, cycles: u32);

    /// End the current run at the next instruction boundary.
    fn abort_timeslice(&mut self) {
        self.abort_handle().abort();
    }

    /// Handle a bus device can use to end this unit's run early.
    fn abort_handle(&self) -> AbortHandle;

    fn run_state(&self) -> RunState;

    /// True when the last run stopped because the unit has nothing to do.
    fn is_idle(&self) -> bool {
        self.run_state() != RunState::Running
    }

    fn total_cycles(&self) -> u64;
    fn pc(&self) -> u32;
    fn registers(&self) -> &dyn RegisterView;

    fn set_debug_hook(&mut self, _hook: Option<Box<dyn DebugHook>>) {}

    fn save_state(&self) -> Value;
    fn load_state(&mut self, v: &Value) -> Result<(), StateError>;
}

/// The `ExecutionUnit` plumbing that only forwards to [`EngineState`].
macro_rules! forward_engine_state {
    () => {
        fn name(&self) -> &str {
            &self.engine.name
        }

        fn clock_hz(&self) -> u32 {
            self.engine.clock_hz
        }

        fn set_line(&mut self, line: $crate::interrupt::InputLine, state: $crate::interrupt::LineState) {
            self.engine.interrupts.set_line(line, state);
        }

        fn set_line_vector(&mut self, line: $crate::interrupt::InputLine, vector: u32) {
            self.engine.interrupts.set_line_vector(line, vector);
        }

        fn irq_line_count(&self) -> u8 {
            self.engine.interrupts.irq_line_count()
        }

        fn steal_cycles(&mut self, cycles: u32) {
            self.engine.counter.steal(cycles);
        }

        fn give_back_cycles(&mut self, cycles: u32) {
            self.engine.counter.give_back(cycles);
        }

        fn abort_handle(&self) -> $crate::engine::AbortHandle {
            self.engine.counter.abort_handle()
        }

        fn total_cycles(&self) -> u64 {
            self.engine.counter.total()
        }

        fn set_debug_hook(&mut self, hook: Option<Box<dyn $crate::engine::DebugHook>>) {
            self.engine.set_hook(hook);
        }
    };
}
pub(crate) use forward_engine_state;

impl EngineState {
    pub fn set_hook(&mut self, hook: Option<Box<dyn DebugHook>>) {
        self.hook = hook;
        self.resume_past_break = false;
    }
}
