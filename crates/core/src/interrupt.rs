//! Interrupt line latches and priority resolution.
//!
//! One controller per execution unit. Devices change lines with
//! [`InterruptController::set_line`]; the engine polls
//! [`InterruptController::highest_pending`] at every instruction boundary and
//! calls [`InterruptController::acknowledge`] for the line it services.
//!
//! NMI is edge-triggered and unmaskable. IRQ lines are level-triggered and
//! ordered by number, IRQ0 highest.

use serde::{Deserialize, Serialize};

use crate::logging::{log, LogCategory, LogLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputLine {
    Nmi,
    Irq(u8),
}

/// What a device does to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineState {
    /// Drop the line.
    Clear,
    /// Raise the line and leave it raised.
    Assert,
    /// Raise the line; it drops by itself when the CPU acknowledges it.
    Hold,
    /// Latch exactly one request without leaving the line raised.
    Pulse,
}

/// What the CPU side sees for a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStatus {
    Cleared,
    Asserted,
    PendingAck,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Line {
    level: bool,
    hold: bool,
    latched: bool,
    vector: u32,
}

impl Line {
    fn status(&self) -> LineStatus {
        if self.latched {
            LineStatus::PendingAck
        } else if self.level {
            LineStatus::Asserted
        } else {
            LineStatus::Cleared
        }
    }

    fn requesting(&self) -> bool {
        self.latched || self.level
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptController {
    nmi: Line,
    irqs: Vec<Line>,
}

impl InterruptController {
    /// Controller with `irq_lines` maskable inputs (at least one).
    pub fn new(irq_lines: u8) -> Self {
        Self {
            nmi: Line::default(),
            irqs: vec![Line::default(); irq_lines.max(1) as usize],
        }
    }

    pub fn irq_line_count(&self) -> u8 {
        self.irqs.len() as u8
    }

    fn line_mut(&mut self, line: InputLine) -> Option<&mut Line> {
        match line {
            InputLine::Nmi => Some(&mut self.nmi),
            InputLine::Irq(n) => self.irqs.get_mut(n as usize),
        }
    }

    fn line(&self, line: InputLine) -> Option<&Line> {
        match line {
            InputLine::Nmi => Some(&self.nmi),
            InputLine::Irq(n) => self.irqs.get(n as usize),
        }
    }

    pub fn set_line(&mut self, line: InputLine, state: LineState) {
        let Some(l) = self.line_mut(line) else {
            log(LogCategory::Interrupts, LogLevel::Warn, || {
                format!("set_line on nonexistent {:?} ignored", line)
            });
            return;
        };
        let edge = matches!(line, InputLine::Nmi);
        let rising = !l.level;
        match state {
            LineState::Clear => {
                l.level = false;
                l.hold = false;
            }
            LineState::Assert | LineState::Hold => {
                l.level = true;
                l.hold = state == LineState::Hold;
                if edge && rising {
                    l.latched = true;
                }
            }
            LineState::Pulse => {
                l.latched = true;
            }
        }
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("{:?} <- {:?}", line, state)
        });
    }

    /// Vector supplied on the bus when `line` is acknowledged.
    pub fn set_line_vector(&mut self, line: InputLine, vector: u32) {
        if let Some(l) = self.line_mut(line) {
            l.vector = vector;
        }
    }

    pub fn line_vector(&self, line: InputLine) -> u32 {
        self.line(line).map_or(0, |l| l.vector)
    }

    pub fn status(&self, line: InputLine) -> LineStatus {
        self.line(line).map_or(LineStatus::Cleared, Line::status)
    }

    /// Highest-priority line wanting service. IRQs count only when `irq_enabled`.
    pub fn highest_pending(&self, irq_enabled: bool) -> Option<InputLine> {
        if self.nmi.latched {
            return Some(InputLine::Nmi);
        }
        if !irq_enabled {
            return None;
        }
        self.irqs
            .iter()
            .position(Line::requesting)
            .map(|n| InputLine::Irq(n as u8))
    }

    /// True if anything at all is requesting, masked or not.
    pub fn any_requesting(&self) -> bool {
        self.nmi.latched || self.irqs.iter().any(Line::requesting)
    }

    /// Mark `line` serviced and return its acknowledge vector.
    ///
    /// Returns `None` when the line stopped requesting before service; the
    /// engine then carries on as if nothing had been raised.
    pub fn acknowledge(&mut self, line: InputLine) -> Option<u32> {
        let edge = matches!(line, InputLine::Nmi);
        let l = self.line_mut(line)?;
        let serviced = if edge { l.latched } else { l.requesting() };
        if !serviced {
            log(LogCategory::Interrupts, LogLevel::Debug, || {
                format!("spurious {:?} swallowed", line)
            });
            return None;
        }
        l.latched = false;
        if l.hold {
            l.hold = false;
            l.level = false;
        }
        let vector = l.vector;
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("{:?} acknowledged, vector {:X}", line, vector)
        });
        Some(vector)
    }

    /// Drop every line and latch.
    pub fn clear_all(&mut self) {
        let vectors: Vec<u32> = self.irqs.iter().map(|l| l.vector).collect();
        let nmi_vector = self.nmi.vector;
        self.nmi = Line {
            vector: nmi_vector,
            ..Line::default()
        };
        for (l, v) in self.irqs.iter_mut().zip(vectors) {
            *l = Line {
                vector: v,
                ..Line::default()
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmi_beats_irq0() {
        let mut ic = InterruptController::new(2);
        ic.set_line(InputLine::Irq(0), LineState::Assert);
        ic.set_line(InputLine::Nmi, LineState::Assert);
        assert_eq!(ic.highest_pending(true), Some(InputLine::Nmi));
        assert_eq!(ic.highest_pending(false), Some(InputLine::Nmi));
    }

    #[test]
    fn lower_irq_number_wins() {
        let mut ic = InterruptController::new(4);
        ic.set_line(InputLine::Irq(3), LineState::Assert);
        ic.set_line(InputLine::Irq(1), LineState::Assert);
        assert_eq!(ic.highest_pending(true), Some(InputLine::Irq(1)));
        assert_eq!(ic.highest_pending(false), None);
    }

    #[test]
    fn nmi_is_edge_triggered() {
        let mut ic = InterruptController::new(1);
        ic.set_line(InputLine::Nmi, LineState::Assert);
        assert_eq!(ic.status(InputLine::Nmi), LineStatus::PendingAck);
        assert!(ic.acknowledge(InputLine::Nmi).is_some());
        // Still held high: no new edge, no new request.
        assert_eq!(ic.status(InputLine::Nmi), LineStatus::Asserted);
        assert_eq!(ic.highest_pending(true), None);
        ic.set_line(InputLine::Nmi, LineState::Assert);
        assert_eq!(ic.highest_pending(true), None);

        ic.set_line(InputLine::Nmi, LineState::Clear);
        ic.set_line(InputLine::Nmi, LineState::Assert);
        assert_eq!(ic.highest_pending(true), Some(InputLine::Nmi));
    }

    #[test]
    fn nmi_edge_survives_clear_before_service() {
        let mut ic = InterruptController::new(1);
        ic.set_line(InputLine::Nmi, LineState::Assert);
        ic.set_line(InputLine::Nmi, LineState::Clear);
        assert_eq!(ic.highest_pending(false), Some(InputLine::Nmi));
    }

    #[test]
    fn level_irq_stays_asserted_after_ack() {
        let mut ic = InterruptController::new(1);
        ic.set_line(InputLine::Irq(0), LineState::Assert);
        assert!(ic.acknowledge(InputLine::Irq(0)).is_some());
        assert_eq!(ic.status(InputLine::Irq(0)), LineStatus::Asserted);
    }

    #[test]
    fn hold_clears_on_ack() {
        let mut ic = InterruptController::new(1);
        ic.set_line(InputLine::Irq(0), LineState::Hold);
        assert!(ic.acknowledge(InputLine::Irq(0)).is_some());
        assert_eq!(ic.status(InputLine::Irq(0)), LineStatus::Cleared);
    }

    #[test]
    fn pulse_latches_one_request() {
        let mut ic = InterruptController::new(1);
        ic.set_line(InputLine::Irq(0), LineState::Pulse);
        assert_eq!(ic.status(InputLine::Irq(0)), LineStatus::PendingAck);
        assert!(ic.acknowledge(InputLine::Irq(0)).is_some());
        assert_eq!(ic.highest_pending(true), None);
    }

    #[test]
    fn spurious_irq_is_swallowed() {
        let mut ic = InterruptController::new(1);
        ic.set_line(InputLine::Irq(0), LineState::Assert);
        ic.set_line(InputLine::Irq(0), LineState::Clear);
        assert_eq!(ic.highest_pending(true), None);
        assert_eq!(ic.acknowledge(InputLine::Irq(0)), None);
    }

    #[test]
    fn vectors_are_per_line_and_survive_clear_all() {
        let mut ic = InterruptController::new(2);
        ic.set_line_vector(InputLine::Irq(1), 0x08);
        ic.set_line(InputLine::Irq(1), LineState::Hold);
        ic.clear_all();
        assert_eq!(ic.highest_pending(true), None);
        ic.set_line(InputLine::Irq(1), LineState::Hold);
        assert_eq!(ic.acknowledge(InputLine::Irq(1)), Some(0x08));
    }

    #[test]
    fn unknown_line_is_ignored() {
        let mut ic = InterruptController::new(1);
        ic.set_line(InputLine::Irq(5), LineState::Assert);
        assert_eq!(ic.highest_pending(true), None);
    }

    #[test]
    fn serde_round_trip_keeps_latches() {
        let mut ic = InterruptController::new(2);
        ic.set_line(InputLine::Nmi, LineState::Pulse);
        ic.set_line(InputLine::Irq(1), LineState::Assert);
        let v = serde_json::to_value(&ic).unwrap();
        let back: InterruptController = serde_json::from_value(v).unwrap();
        assert_eq!(back, ic);
    }
}
