//! Interrupt controller: aggregates raw peripheral lines into the CPU-visible
//! IRQ and FIQ signals.
//!
//! Each of the 32 lines is either level-sensitive (pending mirrors the source)
//! or edge-sensitive (pending latches on assertion and is cleared only by
//! [`InterruptController::acknowledge`]). A line reaches the CPU only when its
//! enable bit is set in the mask register; the routing register then decides
//! between IRQ and FIQ.

use log::Level;

use crate::diag::{channel_log, LogChannel, LogChannels};

/// Number of raw interrupt lines.
pub const IRQ_LINE_COUNT: u8 = 32;

/// One raw interrupt line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct IrqLine(u8);

impl IrqLine {
    /// GPIO pin 0 edge.
    pub const GPIO_0: Self = Self(8);
    /// GPIO pin 1 edge.
    pub const GPIO_1: Self = Self(9);
    /// Combined GPIO pins 2..=84.
    pub const GPIO_X: Self = Self(10);
    /// OS timer match 0.
    pub const OST_0: Self = Self(26);
    /// OS timer match 1.
    pub const OST_1: Self = Self(27);
    /// OS timer match 2.
    pub const OST_2: Self = Self(28);
    /// OS timer match 3.
    pub const OST_3: Self = Self(29);

    /// Builds a line from its number.
    #[must_use]
    pub const fn new(number: u8) -> Option<Self> {
        if number < IRQ_LINE_COUNT {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Line number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0
    }

    /// Bit of this line in the controller registers.
    #[must_use]
    pub const fn bit(self) -> u32 {
        1 << self.0
    }
}

/// CPU-visible interrupt outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct InterruptOutputs {
    /// Normal interrupt request.
    pub irq: bool,
    /// Fast interrupt request.
    pub fiq: bool,
}

impl InterruptOutputs {
    /// Returns `true` when either output is asserted.
    #[must_use]
    pub const fn any(self) -> bool {
        self.irq || self.fiq
    }
}

/// Software-visible controller registers; also the snapshot form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct InterruptState {
    /// Raw pending lines (ICPR).
    pub pending: u32,
    /// Current source levels, used to detect edges.
    pub sources: u32,
    /// Per-line enable (ICMR); 1 lets the line reach the CPU.
    pub mask: u32,
    /// Per-line routing (ICLR); 1 routes to FIQ.
    pub fiq_route: u32,
    /// Lines that latch on assertion instead of following their source.
    pub edge_lines: u32,
    /// Control register (ICCR).
    pub control: u32,
}

/// Interrupt controller model.
#[derive(Debug, Clone)]
pub struct InterruptController {
    state: InterruptState,
    outputs: InterruptOutputs,
    changes: u64,
    channels: LogChannels,
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new(LogChannels::default())
    }
}

impl InterruptController {
    /// Creates a controller with every line level-sensitive and masked.
    #[must_use]
    pub fn new(channels: LogChannels) -> Self {
        Self {
            state: InterruptState::default(),
            outputs: InterruptOutputs::default(),
            changes: 0,
            channels,
        }
    }

    /// Marks the lines in `edge_lines` as edge-sensitive.
    #[must_use]
    pub fn with_edge_lines(mut self, edge_lines: u32) -> Self {
        self.state.edge_lines = edge_lines;
        self
    }

    /// Drives a raw line from its source. Re-asserting an asserted line is a
    /// no-op.
    pub fn signal(&mut self, line: IrqLine, asserted: bool) {
        let bit = line.bit();
        let was = self.state.sources & bit != 0;
        if was == asserted {
            return;
        }
        if asserted {
            self.state.sources |= bit;
            self.state.pending |= bit;
        } else {
            self.state.sources &= !bit;
            if self.state.edge_lines & bit == 0 {
                self.state.pending &= !bit;
            }
        }
        channel_log!(
            self.channels,
            LogChannel::Ints,
            Level::Trace,
            "line {} {}",
            line.number(),
            if asserted { "asserted" } else { "released" }
        );
        self.update_outputs();
    }

    /// Clears a latched edge line. Level lines stay pending while their source
    /// is asserted.
    pub fn acknowledge(&mut self, line: IrqLine) {
        let bit = line.bit();
        if self.state.edge_lines & bit != 0 {
            self.state.pending &= !bit;
        } else {
            self.state.pending = (self.state.pending & !bit) | (self.state.sources & bit);
        }
        self.update_outputs();
    }

    /// Returns `true` when `line` is pending, regardless of mask.
    #[must_use]
    pub const fn is_pending(&self, line: IrqLine) -> bool {
        self.state.pending & line.bit() != 0
    }

    /// Raw pending word (ICPR).
    #[must_use]
    pub const fn pending(&self) -> u32 {
        self.state.pending
    }

    /// Enabled lines routed to IRQ (ICIP).
    #[must_use]
    pub const fn irq_pending(&self) -> u32 {
        self.state.pending & self.state.mask & !self.state.fiq_route
    }

    /// Enabled lines routed to FIQ (ICFP).
    #[must_use]
    pub const fn fiq_pending(&self) -> u32 {
        self.state.pending & self.state.mask & self.state.fiq_route
    }

    /// Enable mask (ICMR).
    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.state.mask
    }

    /// Replaces the enable mask.
    pub fn set_mask(&mut self, mask: u32) {
        self.state.mask = mask;
        self.update_outputs();
    }

    /// FIQ routing (ICLR).
    #[must_use]
    pub const fn fiq_routing(&self) -> u32 {
        self.state.fiq_route
    }

    /// Replaces the FIQ routing word.
    pub fn set_fiq_routing(&mut self, route: u32) {
        self.state.fiq_route = route;
        self.update_outputs();
    }

    /// Control register (ICCR).
    #[must_use]
    pub const fn control(&self) -> u32 {
        self.state.control
    }

    /// Replaces the control register. Only bit 0 is implemented.
    pub const fn set_control(&mut self, control: u32) {
        self.state.control = control & 1;
    }

    /// Current CPU-visible outputs.
    #[must_use]
    pub const fn outputs(&self) -> InterruptOutputs {
        self.outputs
    }

    /// Number of output transitions since creation.
    #[must_use]
    pub const fn output_changes(&self) -> u64 {
        self.changes
    }

    /// Register snapshot.
    #[must_use]
    pub const fn state(&self) -> InterruptState {
        self.state
    }

    /// Restores a register snapshot and recomputes the outputs.
    pub fn restore(&mut self, state: InterruptState) {
        self.state = state;
        self.update_outputs();
    }

    /// Returns every line and register to power-on values, keeping the
    /// configured edge lines and routing.
    pub fn reset(&mut self) {
        self.state = InterruptState {
            fiq_route: self.state.fiq_route,
            edge_lines: self.state.edge_lines,
            ..InterruptState::default()
        };
        self.update_outputs();
    }

    fn update_outputs(&mut self) {
        let next = InterruptOutputs {
            irq: self.irq_pending() != 0,
            fiq: self.fiq_pending() != 0,
        };
        if next != self.outputs {
            self.changes = self.changes.saturating_add(1);
            channel_log!(
                self.channels,
                LogChannel::Ints,
                Level::Debug,
                "outputs irq={} fiq={} pending={:#010x}",
                next.irq,
                next.fiq,
                self.state.pending
            );
            self.outputs = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InterruptController, InterruptOutputs, IrqLine};

    fn enabled() -> InterruptController {
        let mut ic = InterruptController::default();
        ic.set_mask(u32::MAX);
        ic
    }

    #[test]
    fn level_lines_follow_their_source() {
        let mut ic = enabled();
        ic.signal(IrqLine::GPIO_X, true);
        assert!(ic.is_pending(IrqLine::GPIO_X));
        assert_eq!(ic.outputs(), InterruptOutputs { irq: true, fiq: false });

        ic.signal(IrqLine::GPIO_X, false);
        assert!(!ic.is_pending(IrqLine::GPIO_X));
        assert!(!ic.outputs().any());
    }

    #[test]
    fn reasserting_is_a_no_op() {
        let mut ic = enabled();
        ic.signal(IrqLine::GPIO_0, true);
        let changes = ic.output_changes();
        ic.signal(IrqLine::GPIO_0, true);
        assert_eq!(ic.output_changes(), changes);
        assert_eq!(ic.pending(), IrqLine::GPIO_0.bit());
    }

    #[test]
    fn edge_lines_latch_until_acknowledged() {
        let mut ic = enabled().with_edge_lines(IrqLine::OST_0.bit());
        ic.signal(IrqLine::OST_0, true);
        ic.signal(IrqLine::OST_0, false);
        assert!(ic.is_pending(IrqLine::OST_0));

        ic.acknowledge(IrqLine::OST_0);
        assert!(!ic.is_pending(IrqLine::OST_0));
        assert!(!ic.outputs().irq);
    }

    #[test]
    fn acknowledging_an_asserted_level_line_keeps_it_pending() {
        let mut ic = enabled();
        ic.signal(IrqLine::GPIO_1, true);
        ic.acknowledge(IrqLine::GPIO_1);
        assert!(ic.is_pending(IrqLine::GPIO_1));
    }

    #[test]
    fn masked_lines_stay_latched_but_silent() {
        let mut ic = InterruptController::default();
        ic.signal(IrqLine::GPIO_X, true);
        assert!(ic.is_pending(IrqLine::GPIO_X));
        assert!(!ic.outputs().any());

        ic.set_mask(IrqLine::GPIO_X.bit());
        assert!(ic.outputs().irq);
    }

    #[test]
    fn routing_selects_fiq() {
        let mut ic = enabled();
        ic.set_fiq_routing(IrqLine::OST_1.bit());
        ic.signal(IrqLine::OST_1, true);
        assert_eq!(ic.outputs(), InterruptOutputs { irq: false, fiq: true });
        assert_eq!(ic.fiq_pending(), IrqLine::OST_1.bit());
        assert_eq!(ic.irq_pending(), 0);
    }

    #[test]
    fn line_numbers_are_bounded() {
        assert_eq!(IrqLine::new(31).map(IrqLine::number), Some(31));
        assert!(IrqLine::new(32).is_none());
    }

    #[test]
    fn reset_keeps_configuration_but_drops_state() {
        let mut ic = enabled().with_edge_lines(IrqLine::OST_2.bit());
        ic.set_fiq_routing(IrqLine::OST_3.bit());
        ic.signal(IrqLine::OST_2, true);
        ic.reset();
        assert_eq!(ic.pending(), 0);
        assert_eq!(ic.mask(), 0);
        assert_eq!(ic.fiq_routing(), IrqLine::OST_3.bit());
        assert_eq!(ic.state().edge_lines, IrqLine::OST_2.bit());
    }
}
