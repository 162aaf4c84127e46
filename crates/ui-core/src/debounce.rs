//! Stability debouncing
//!
//! Transient single-stream / single-participant moments would make the call
//! layout flicker if surfaced immediately. The policy half of this module
//! ([`decide`]) classifies a candidate transition as immediate or delayed;
//! the runtime half ([`Debouncer`]) holds the delayed value as a cancellable
//! pending emission driven by the aggregator's select loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::trace;

use crate::phase::CallPhase;

/// Debounce windows, keyed by situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceWindows {
    /// A single remaining stream while connected
    pub single_stream: Duration,
    /// Zero other in-call participants from the start
    pub waiting_for_others: Duration,
    /// Had other participants, now has none
    pub left_alone: Duration,
    /// Any other arrangement change that qualifies for smoothing
    pub default_arrangement: Duration,
}

impl Default for DebounceWindows {
    fn default() -> Self {
        Self {
            single_stream: Duration::from_secs(3),
            waiting_for_others: Duration::from_secs(3),
            left_alone: Duration::from_secs(5),
            default_arrangement: Duration::from_millis(500),
        }
    }
}

/// Situation a candidate transition falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Situation {
    /// The arrangement is about to collapse to a single stream
    SingleStream,
    /// "Waiting for others" banner about to appear
    WaitingForOthers,
    /// "You are alone" banner about to appear
    LeftAlone,
    /// Ordinary arrangement update
    Arrangement,
}

/// Aggregate context a decision is evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityContext {
    pub phase: CallPhase,
    pub stream_count: usize,
    pub others_in_call: usize,
    /// Whether there was at least one other in-call participant earlier in
    /// the call
    pub had_others: bool,
}

impl StabilityContext {
    /// Phases during which the stability windows apply at all.
    fn call_is_active(&self) -> bool {
        matches!(
            self.phase,
            CallPhase::Connected | CallPhase::Connecting | CallPhase::Reconnecting
        )
    }
}

/// Outcome of a debounce decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
    /// Apply the candidate value now
    Immediate,
    /// Hold the candidate value for the given window
    Delayed(Duration),
}

/// Decide whether a candidate transition is surfaced immediately or held.
///
/// Structural changes (more than one stream, call not connected, more than
/// one other participant) are always immediate; only the flicker-prone
/// single-stream / alone conditions are delayed.
pub fn decide(
    situation: Situation,
    ctx: &StabilityContext,
    windows: &DebounceWindows,
) -> DebounceDecision {
    let decision = match situation {
        Situation::SingleStream => {
            if ctx.stream_count == 1
                && ctx.phase.is_connected()
                && ctx.others_in_call >= 1
            {
                DebounceDecision::Delayed(windows.single_stream)
            } else {
                DebounceDecision::Immediate
            }
        }
        Situation::WaitingForOthers => {
            if ctx.others_in_call == 0 && !ctx.had_others && ctx.call_is_active() {
                DebounceDecision::Delayed(windows.waiting_for_others)
            } else {
                DebounceDecision::Immediate
            }
        }
        Situation::LeftAlone => {
            if ctx.others_in_call == 0 && ctx.had_others && ctx.call_is_active() {
                DebounceDecision::Delayed(windows.left_alone)
            } else {
                DebounceDecision::Immediate
            }
        }
        Situation::Arrangement => DebounceDecision::Immediate,
    };
    trace!(?situation, ?decision, "debounce decision");
    decision
}

/// A single pending delayed emission.
#[derive(Debug, Clone)]
struct Pending<T> {
    value: T,
    deadline: Instant,
}

/// Cancellable delayed-emission holder.
///
/// `submit` either resolves the value immediately or parks it behind a
/// deadline; a later submit replaces (cancels) the pending value. The owner
/// polls `deadline()` from its select loop and calls `take_expired` once the
/// sleep fires. Dropping the debouncer discards any pending emission.
#[derive(Debug)]
pub struct Debouncer<T> {
    pending: Option<Pending<T>>,
}

impl<T: Clone> Debouncer<T> {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Submit a candidate value. Returns `Some(value)` when it must be
    /// applied now (which also cancels any pending emission), `None` when it
    /// was parked behind its window.
    pub fn submit(&mut self, value: T, decision: DebounceDecision) -> Option<T> {
        match decision {
            DebounceDecision::Immediate => {
                if self.pending.take().is_some() {
                    trace!("pending debounced value cancelled by immediate update");
                }
                Some(value)
            }
            DebounceDecision::Delayed(window) => {
                self.pending = Some(Pending {
                    value,
                    deadline: Instant::now() + window,
                });
                None
            }
        }
    }

    /// Replace the pending value in place, keeping its deadline. Used when
    /// a later candidate refreshes the same held transition: the window
    /// must elapse relative to when the condition first arose, not restart.
    /// Returns false when nothing is pending.
    pub fn update_pending(&mut self, value: T) -> bool {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.value = value;
                true
            }
            None => false,
        }
    }

    /// Deadline of the pending emission, if any. Feeds the owner's
    /// `tokio::select!` sleep arm.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Take the pending value if its window has elapsed.
    pub fn take_expired(&mut self) -> Option<T> {
        if self
            .pending
            .as_ref()
            .map(|p| p.deadline <= Instant::now())
            .unwrap_or(false)
        {
            self.pending.take().map(|p| p.value)
        } else {
            None
        }
    }

    /// Discard the pending emission without applying it.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T: Clone> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::EndedReason;
    use pretty_assertions::assert_eq;

    fn ctx(phase: CallPhase, streams: usize, others: usize, had_others: bool) -> StabilityContext {
        StabilityContext {
            phase,
            stream_count: streams,
            others_in_call: others,
            had_others,
        }
    }

    #[test]
    fn single_stream_while_connected_is_delayed() {
        let windows = DebounceWindows::default();
        let decision = decide(
            Situation::SingleStream,
            &ctx(CallPhase::Connected, 1, 1, true),
            &windows,
        );
        assert_eq!(decision, DebounceDecision::Delayed(windows.single_stream));
    }

    #[test]
    fn single_stream_outside_connected_is_immediate() {
        let windows = DebounceWindows::default();
        for phase in [
            CallPhase::Connecting,
            CallPhase::Reconnecting,
            CallPhase::Ended(EndedReason::HungUp),
        ] {
            let decision = decide(Situation::SingleStream, &ctx(phase, 1, 1, true), &windows);
            assert_eq!(decision, DebounceDecision::Immediate);
        }
    }

    #[test]
    fn multiple_streams_are_immediate() {
        let windows = DebounceWindows::default();
        let decision = decide(
            Situation::SingleStream,
            &ctx(CallPhase::Connected, 2, 1, true),
            &windows,
        );
        assert_eq!(decision, DebounceDecision::Immediate);
    }

    #[test]
    fn single_stream_with_nobody_in_call_is_immediate() {
        let windows = DebounceWindows::default();
        let decision = decide(
            Situation::SingleStream,
            &ctx(CallPhase::Connected, 1, 0, true),
            &windows,
        );
        assert_eq!(decision, DebounceDecision::Immediate);
    }

    #[test]
    fn waiting_for_others_delayed_only_before_anyone_joined() {
        let windows = DebounceWindows::default();
        let delayed = decide(
            Situation::WaitingForOthers,
            &ctx(CallPhase::Connected, 1, 0, false),
            &windows,
        );
        assert_eq!(
            delayed,
            DebounceDecision::Delayed(windows.waiting_for_others)
        );

        let immediate = decide(
            Situation::WaitingForOthers,
            &ctx(CallPhase::Connected, 1, 1, false),
            &windows,
        );
        assert_eq!(immediate, DebounceDecision::Immediate);
    }

    #[test]
    fn left_alone_uses_its_own_window() {
        let windows = DebounceWindows::default();
        let decision = decide(
            Situation::LeftAlone,
            &ctx(CallPhase::Connected, 1, 0, true),
            &windows,
        );
        assert_eq!(decision, DebounceDecision::Delayed(windows.left_alone));
    }

    #[test]
    fn left_alone_after_call_end_is_immediate() {
        let windows = DebounceWindows::default();
        let decision = decide(
            Situation::LeftAlone,
            &ctx(CallPhase::Ended(EndedReason::Ended), 0, 0, true),
            &windows,
        );
        assert_eq!(decision, DebounceDecision::Immediate);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_value_surfaces_only_after_window() {
        let windows = DebounceWindows::default();
        let mut debouncer = Debouncer::new();

        let out = debouncer.submit(
            "reduced",
            DebounceDecision::Delayed(windows.single_stream),
        );
        assert_eq!(out, None);
        assert!(debouncer.is_pending());
        assert_eq!(debouncer.take_expired(), None);

        tokio::time::advance(windows.single_stream - Duration::from_millis(1)).await;
        assert_eq!(debouncer.take_expired(), None, "window must not fire early");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(debouncer.take_expired(), Some("reduced"));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_submit_cancels_pending() {
        let mut debouncer = Debouncer::new();
        debouncer.submit("reduced", DebounceDecision::Delayed(Duration::from_secs(3)));
        assert!(debouncer.is_pending());

        let out = debouncer.submit("restored", DebounceDecision::Immediate);
        assert_eq!(out, Some("restored"));
        assert!(!debouncer.is_pending());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(debouncer.take_expired(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn update_pending_keeps_the_deadline() {
        let mut debouncer = Debouncer::new();
        debouncer.submit("first", DebounceDecision::Delayed(Duration::from_secs(3)));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(debouncer.update_pending("second"));

        // The deadline is still relative to the original submit
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(debouncer.take_expired(), Some("second"));
        assert!(!debouncer.update_pending("third"));
    }

    #[tokio::test(start_paused = true)]
    async fn new_delayed_submit_replaces_pending() {
        let mut debouncer = Debouncer::new();
        debouncer.submit("first", DebounceDecision::Delayed(Duration::from_secs(3)));
        tokio::time::advance(Duration::from_secs(2)).await;
        debouncer.submit("second", DebounceDecision::Delayed(Duration::from_secs(3)));

        // The first deadline passes without an emission
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(debouncer.take_expired(), None);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(debouncer.take_expired(), Some("second"));
    }
}
