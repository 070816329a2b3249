// feedback.rs — Feedback Channel.
//
// One i32 travels from the kernel to the host every frame:
//
//   host: reset(0) ─► kernel: dispatch (may write nonzero) ─► barrier
//        ─► host: read_blocking ─► observe ─► edge event or nothing
//
// The kernel's convention is "leave the sentinel alone when the condition
// holds, write anything nonzero when it fails". The host turns the raw value
// into a boolean (`raw == 0`) and reports only transitions.
//
// The read blocks the frame loop until the frame's GPU work has retired.
// Non-blocking readback would deliver the value one frame late and shift
// every edge by a frame, so it is not used here.

use std::fmt;

use crate::backend::{KernelBackend, ReadbackError};

/// Value written into the feedback buffer before every dispatch.
pub const SENTINEL: i32 = 0;

/// Edge event reported when the feedback signal flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// The signal became true (kernel left the sentinel in place).
    Los,
    /// The signal became false (kernel wrote a nonzero value).
    Blocked,
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalEvent::Los => write!(f, "LOS"),
            SignalEvent::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Decode a raw feedback value into the boolean signal.
#[inline]
pub fn signal_from_raw(raw: i32) -> bool {
    raw == SENTINEL
}

/// Edge detector: an event only when `current` differs from `previous`.
pub fn report_if_changed(current: bool, previous: bool) -> Option<SignalEvent> {
    match (current, previous) {
        (true, false) => Some(SignalEvent::Los),
        (false, true) => Some(SignalEvent::Blocked),
        _ => None,
    }
}

/// Host side of the feedback buffer, plus the last observed signal.
#[derive(Debug, Clone, Default)]
pub struct FeedbackChannel {
    // Starts false, so a kernel that reports LOS on its first frame
    // produces an event.
    signal: bool,
}

impl FeedbackChannel {
    pub fn new() -> Self {
        FeedbackChannel::default()
    }

    /// The signal as of the last `observe`.
    pub fn signal(&self) -> bool {
        self.signal
    }

    /// Write the sentinel. Must precede the frame's dispatch.
    pub fn reset<B: KernelBackend>(&self, backend: &mut B) {
        backend.write_feedback(SENTINEL);
    }

    /// Map, copy and unmap the feedback value. Blocks until the GPU work
    /// ordered before it has completed.
    pub fn read_blocking<B: KernelBackend>(&self, backend: &mut B) -> Result<i32, ReadbackError> {
        backend.read_feedback()
    }

    /// Record this frame's raw value and return the edge event, if any.
    pub fn observe(&mut self, raw: i32) -> Option<SignalEvent> {
        let current = signal_from_raw(raw);
        let event = report_if_changed(current, self.signal);
        self.signal = current;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_decoding() {
        assert!(signal_from_raw(0));
        assert!(!signal_from_raw(1));
        assert!(!signal_from_raw(-1));
        assert!(!signal_from_raw(i32::MIN));
    }

    #[test]
    fn test_report_if_changed_truth_table() {
        assert_eq!(report_if_changed(true, false), Some(SignalEvent::Los));
        assert_eq!(report_if_changed(false, true), Some(SignalEvent::Blocked));
        assert_eq!(report_if_changed(true, true), None);
        assert_eq!(report_if_changed(false, false), None);
    }

    #[test]
    fn test_edge_sequence() {
        // Signals [true, true, false, false, true] → events on frames 0, 2, 4.
        let mut ch = FeedbackChannel::new();
        let raws = [0, 0, 7, 1, 0];
        let events: Vec<(usize, SignalEvent)> = raws
            .iter()
            .enumerate()
            .filter_map(|(i, &raw)| ch.observe(raw).map(|e| (i, e)))
            .collect();
        assert_eq!(
            events,
            vec![
                (0, SignalEvent::Los),
                (2, SignalEvent::Blocked),
                (4, SignalEvent::Los),
            ]
        );
    }

    #[test]
    fn test_blocked_first_frame_is_silent() {
        let mut ch = FeedbackChannel::new();
        assert_eq!(ch.observe(1), None);
        assert!(!ch.signal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(SignalEvent::Los.to_string(), "LOS");
        assert_eq!(SignalEvent::Blocked.to_string(), "BLOCKED");
    }
}
