//! Per-singer tick loop.
//!
//! A [`SingerScheduler`] is stepped once per display frame. Each step samples
//! the playback position, runs the render policy at most once per throttle
//! interval and keeps the countdown and deferred fade-in timers of its channel.
//! Channels never look at each other.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::{
    policy::{Evaluation, FadeInGate, PolicyContext},
    CountdownState, FadeOutSet, LyricPhase, ProgressCountdown, RenderFrame, SingerId,
    SingerTimeline, SyncConfig, TimerHandle, TimerKind, TimerList, TimingModel,
};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The policy ran and the frame is current.
    Rendered,
    /// Too soon after the previous update; retried on a later tick.
    Throttled,
    /// Playback is paused; nothing advances.
    Paused,
    /// Waiting on the deferred fade-in timer.
    AwaitingFadeIn,
    /// The channel's timeline was rejected; it never renders.
    Disabled,
}

/// Deferred fade-in waiting on the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingFadeIn {
    handle: TimerHandle,
    line_index: usize,
    due: Instant,
}

impl PendingFadeIn {
    /// True while `gate`, sampled at `now`, still describes this deadline.
    fn agrees_with(&self, gate: &FadeInGate, now: Instant, tolerance: Duration) -> bool {
        if gate.line_index != self.line_index {
            return false;
        }
        let Some(expected) = deadline(now, gate.opens_in_ms) else {
            return false;
        };
        let drift = if expected > self.due {
            expected - self.due
        } else {
            self.due - expected
        };
        drift <= tolerance
    }
}

/// `now` plus `delay_ms`, or `None` when that is not representable.
fn deadline(now: Instant, delay_ms: f64) -> Option<Instant> {
    let delay = Duration::try_from_secs_f64(delay_ms / 1_000.0).ok()?;
    now.checked_add(delay)
}

#[derive(Debug)]
pub struct SingerScheduler {
    singer: SingerId,
    timeline: SingerTimeline,
    fade_outs: FadeOutSet,
    disabled: bool,
    throttle: Duration,
    last_update: Option<Instant>,
    last_position_ms: Option<f64>,
    suspended: bool,
    timers: TimerList,
    fade_in: Option<PendingFadeIn>,
    countdown_expiry: Option<TimerHandle>,
    countdown: ProgressCountdown,
    countdown_state: CountdownState,
    countdown_dirty: bool,
    frame: RenderFrame,
    frame_dirty: bool,
}

impl SingerScheduler {
    pub fn new(timeline: SingerTimeline, timing: &TimingModel, config: &SyncConfig) -> Self {
        let singer = timeline.singer;
        let disabled = match timeline.validate() {
            Ok(()) => false,
            Err(err) => {
                warn!(%singer, error = %err, "disabling lyric channel");
                true
            }
        };
        let fade_outs = if disabled {
            FadeOutSet::default()
        } else {
            FadeOutSet::analyze(&timeline, timing, config.fade_out_threshold_ms)
        };
        debug!(
            %singer,
            lines = timeline.len(),
            fade_outs = fade_outs.len(),
            "lyric channel ready"
        );

        Self {
            singer,
            timeline,
            fade_outs,
            disabled,
            throttle: config.update_throttle(),
            last_update: None,
            last_position_ms: None,
            suspended: false,
            timers: TimerList::new(),
            fade_in: None,
            countdown_expiry: None,
            countdown: ProgressCountdown::new(config.countdown_duration()),
            countdown_state: CountdownState::hidden(),
            countdown_dirty: false,
            frame: RenderFrame::dormant(),
            frame_dirty: true,
        }
    }

    pub fn singer(&self) -> SingerId {
        self.singer
    }

    pub fn timeline(&self) -> &SingerTimeline {
        &self.timeline
    }

    pub fn fade_outs(&self) -> &FadeOutSet {
        &self.fade_outs
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn frame(&self) -> &RenderFrame {
        &self.frame
    }

    pub fn countdown_state(&self) -> CountdownState {
        self.countdown_state
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn is_awaiting_fade_in(&self) -> bool {
        self.fade_in.is_some()
    }

    /// Advances the channel to the sampled clock state.
    pub fn tick(
        &mut self,
        now: Instant,
        position_ms: f64,
        paused: bool,
        timing: &TimingModel,
        config: &SyncConfig,
    ) -> TickOutcome {
        if self.disabled {
            return TickOutcome::Disabled;
        }

        self.fire_due_timers(now);

        if paused {
            self.suspend();
            self.refresh_countdown(now);
            return TickOutcome::Paused;
        }
        if self.suspended {
            self.resume();
        }

        if let Some(last) = self.last_position_ms {
            if position_ms < last - config.clock_regression_tolerance_ms {
                debug!(singer = %self.singer, from = last, to = position_ms, "clock moved backwards");
                self.restart();
            }
        }
        self.last_position_ms = Some(position_ms);

        self.refresh_countdown(now);

        if let Some(last) = self.last_update {
            if now.saturating_duration_since(last) < self.throttle {
                return TickOutcome::Throttled;
            }
        }
        self.last_update = Some(now);

        let evaluation = PolicyContext {
            timeline: &self.timeline,
            fade_outs: &self.fade_outs,
            timing,
            config,
        }
        .evaluate(position_ms);

        if let Some(pending) = self.fade_in {
            let still_waiting = evaluation
                .fade_in
                .is_some_and(|gate| pending.agrees_with(&gate, now, self.throttle));
            if still_waiting {
                return TickOutcome::AwaitingFadeIn;
            }
            debug!(
                singer = %self.singer,
                line_index = pending.line_index,
                "clock diverged from pending fade-in"
            );
            self.timers.cancel(&pending.handle);
            self.fade_in = None;
        }

        self.apply(evaluation, now, config);
        self.refresh_countdown(now);

        TickOutcome::Rendered
    }

    /// Pause: wall-clock timers would fire at the wrong moment, so they go.
    pub fn suspend(&mut self) {
        if self.suspended {
            return;
        }
        debug!(singer = %self.singer, "suspending lyric channel");
        self.suspended = true;
        self.cancel_timers();
        self.countdown.cancel();
    }

    /// Resume after a pause. The next tick recomputes immediately and the
    /// countdown may arm again for the line being approached.
    pub fn resume(&mut self) {
        if !self.suspended {
            return;
        }
        debug!(singer = %self.singer, "resuming lyric channel");
        self.suspended = false;
        self.last_update = None;
        self.countdown.reset();
    }

    /// Restart, seek or resize: drop every pending timer and all shown
    /// content, then recompute from the clock on the next tick.
    pub fn restart(&mut self) {
        debug!(singer = %self.singer, "restarting lyric channel");
        self.cancel_timers();
        self.countdown.reset();
        self.last_update = None;
        self.last_position_ms = None;
        self.set_countdown_state(CountdownState::hidden());
        self.frame = RenderFrame::dormant();
        self.frame_dirty = true;
    }

    /// Frame to push to the surface, if it changed since the last call.
    pub fn take_frame_update(&mut self) -> Option<&RenderFrame> {
        if std::mem::take(&mut self.frame_dirty) {
            Some(&self.frame)
        } else {
            None
        }
    }

    pub fn take_countdown_update(&mut self) -> Option<CountdownState> {
        std::mem::take(&mut self.countdown_dirty).then_some(self.countdown_state)
    }

    fn fire_due_timers(&mut self, now: Instant) {
        for (handle, kind) in self.timers.poll(now) {
            match kind {
                TimerKind::FadeIn { line_index }
                    if self.fade_in.is_some_and(|pending| pending.handle == handle) =>
                {
                    debug!(singer = %self.singer, line_index, "fade-in due");
                    self.fade_in = None;
                    self.last_update = None;
                }
                TimerKind::CountdownExpiry if self.countdown_expiry == Some(handle) => {
                    self.countdown_expiry = None;
                }
                _ => {}
            }
        }
    }

    fn apply(&mut self, evaluation: Evaluation, now: Instant, config: &SyncConfig) {
        match evaluation.frame.phase {
            LyricPhase::Active => {
                if self.countdown.is_running() {
                    debug!(singer = %self.singer, "line started, cancelling countdown");
                    self.countdown.cancel();
                    if let Some(handle) = self.countdown_expiry.take() {
                        self.timers.cancel(&handle);
                    }
                }
            }
            LyricPhase::Preview => {
                if let Some(approach) = evaluation.approach {
                    if config.in_countdown_window(approach.lead_ms)
                        && self.countdown.arm(now, approach.line_index)
                    {
                        debug!(
                            singer = %self.singer,
                            line_index = approach.line_index,
                            lead_ms = approach.lead_ms,
                            "countdown armed"
                        );
                        self.countdown_expiry = now
                            .checked_add(self.countdown.duration())
                            .map(|due| self.timers.schedule(due, TimerKind::CountdownExpiry));
                    }
                }
            }
            _ => {}
        }

        if let Some(gate) = evaluation.fade_in {
            if gate.opens_in_ms > self.throttle.as_secs_f64() * 1_000.0 {
                if let Some(due) = deadline(now, gate.opens_in_ms) {
                    let handle = self.timers.schedule(
                        due,
                        TimerKind::FadeIn {
                            line_index: gate.line_index,
                        },
                    );
                    self.fade_in = Some(PendingFadeIn {
                        handle,
                        line_index: gate.line_index,
                        due,
                    });
                }
            }
        }

        if evaluation.frame != self.frame {
            if evaluation.frame.phase != self.frame.phase {
                debug!(
                    singer = %self.singer,
                    from = ?self.frame.phase,
                    to = ?evaluation.frame.phase,
                    "lyric phase changed"
                );
            }
            self.frame = evaluation.frame;
            self.frame_dirty = true;
        }
    }

    fn refresh_countdown(&mut self, now: Instant) {
        let state = self.countdown.sample(now);
        self.set_countdown_state(state);
    }

    fn set_countdown_state(&mut self, state: CountdownState) {
        if state != self.countdown_state {
            self.countdown_state = state;
            self.countdown_dirty = true;
        }
    }

    fn cancel_timers(&mut self) {
        self.timers.cancel_all();
        self.fade_in = None;
        self.countdown_expiry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::tests::timeline;

    struct Harness {
        scheduler: SingerScheduler,
        timing: TimingModel,
        config: SyncConfig,
        start: Instant,
    }

    impl Harness {
        /// 150 bpm: one beat is 100 ms.
        fn new(spans: &[(f64, f64)]) -> Self {
            let timing = TimingModel::new(150.0, 0.0).unwrap();
            let config = SyncConfig::default();
            Self {
                scheduler: SingerScheduler::new(timeline(spans), &timing, &config),
                timing,
                config,
                start: Instant::now(),
            }
        }

        /// Ticks with wall time and clock position moving together.
        fn tick_at(&mut self, ms: u64) -> TickOutcome {
            self.tick_with(ms, ms as f64, false)
        }

        fn tick_with(&mut self, wall_ms: u64, position_ms: f64, paused: bool) -> TickOutcome {
            self.scheduler.tick(
                self.start + Duration::from_millis(wall_ms),
                position_ms,
                paused,
                &self.timing,
                &self.config,
            )
        }
    }

    #[test]
    fn throttles_updates_within_window() {
        let mut harness = Harness::new(&[(0.0, 10.0)]);
        assert_eq!(harness.tick_at(0), TickOutcome::Rendered);
        assert_eq!(harness.tick_at(20), TickOutcome::Throttled);
        assert_eq!(harness.tick_at(49), TickOutcome::Throttled);
        assert_eq!(harness.tick_at(50), TickOutcome::Rendered);
    }

    #[test]
    fn schedules_deferred_fade_in_for_distant_first_line() {
        // First line at 20 s, preview may open at 10 s.
        let mut harness = Harness::new(&[(200.0, 210.0)]);

        assert_eq!(harness.tick_at(0), TickOutcome::Rendered);
        assert!(harness.scheduler.is_awaiting_fade_in());
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Dormant);
        assert_eq!(harness.tick_at(5_000), TickOutcome::AwaitingFadeIn);

        assert_eq!(harness.tick_at(10_000), TickOutcome::Rendered);
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Preview);
        assert!(!harness.scheduler.is_awaiting_fade_in());
    }

    #[test]
    fn forward_jump_into_line_overrides_pending_fade_in() {
        // Line on 20.0 - 21.0 s; the fade-in timer is due at wall 10 s.
        let mut harness = Harness::new(&[(200.0, 210.0)]);
        harness.tick_at(0);
        assert!(harness.scheduler.is_awaiting_fade_in());

        // Playback runs 19.5 s ahead of the wall clock.
        let mut active_seen = false;
        let mut wall = 1_000;
        while wall <= 2_000 {
            let outcome = harness.tick_with(wall, 19_500.0 + wall as f64, false);
            assert_ne!(outcome, TickOutcome::AwaitingFadeIn, "stuck at wall {wall}");
            active_seen |= harness.scheduler.frame().phase == LyricPhase::Active;
            wall += 16;
        }

        assert!(active_seen);
        assert!(!harness.scheduler.is_awaiting_fade_in());
    }

    #[test]
    fn forward_jump_reschedules_pending_fade_in() {
        let mut harness = Harness::new(&[(200.0, 210.0)]);
        harness.tick_at(0);
        assert_eq!(harness.scheduler.pending_timers(), 1);

        // At 8 s the preview is 2 s away instead of 9 s.
        assert_eq!(harness.tick_with(1_000, 8_000.0, false), TickOutcome::Rendered);
        assert!(harness.scheduler.is_awaiting_fade_in());
        assert_eq!(harness.scheduler.pending_timers(), 1);
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Dormant);

        assert_eq!(harness.tick_with(3_000, 10_000.0, false), TickOutcome::Rendered);
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Preview);
    }

    #[test]
    fn countdown_arms_inside_window_only() {
        let mut harness = Harness::new(&[(100.0, 110.0)]);
        let mut first_visible = None;
        let mut arm_count = 0;
        let mut was_visible = false;

        let mut ms = 0;
        while ms < 10_000 {
            harness.tick_at(ms);
            let visible = harness.scheduler.countdown_state().visible;
            if visible && !was_visible {
                arm_count += 1;
                first_visible.get_or_insert(ms);
            }
            was_visible = visible;
            ms += 16;
        }

        let armed = first_visible.expect("countdown should arm");
        let lead_ms = 10_000 - armed;
        assert!((3_000..=3_500).contains(&lead_ms), "armed with lead {lead_ms}");
        assert_eq!(arm_count, 1);
        assert!(!harness.scheduler.countdown_state().visible);

        assert_eq!(harness.tick_at(10_100), TickOutcome::Rendered);
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Active);
        assert!(!harness.scheduler.countdown_state().visible);
    }

    #[test]
    fn active_line_cancels_running_countdown() {
        let mut harness = Harness::new(&[(0.0, 10.0), (42.0, 50.0)]);
        harness.tick_at(500);
        harness.tick_at(1_000);
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Preview);
        assert!(harness.scheduler.countdown_state().visible);
        assert_eq!(harness.scheduler.pending_timers(), 1);

        // Playback jumps ahead of the wall clock into the line while the
        // countdown is still running.
        assert_eq!(harness.tick_with(1_100, 4_300.0, false), TickOutcome::Rendered);
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Active);
        assert!(!harness.scheduler.countdown_state().visible);
        assert_eq!(harness.scheduler.pending_timers(), 0);
    }

    #[test]
    fn restart_invalidates_pending_timers() {
        let mut harness = Harness::new(&[(200.0, 210.0)]);
        harness.tick_at(0);
        assert_eq!(harness.scheduler.pending_timers(), 1);

        harness.scheduler.restart();
        assert_eq!(harness.scheduler.pending_timers(), 0);
        assert!(!harness.scheduler.is_awaiting_fade_in());

        // Time passes beyond the old fade-in deadline with the clock back at 0;
        // nothing stale fires and the channel stays dormant.
        assert_eq!(harness.tick_with(10_000, 0.0, false), TickOutcome::Rendered);
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Dormant);
    }

    #[test]
    fn backwards_clock_takes_restart_path() {
        let mut harness = Harness::new(&[(100.0, 110.0)]);
        // Arm the countdown at 3.2 s lead.
        harness.tick_at(6_800);
        assert!(harness.scheduler.countdown_state().visible);

        assert_eq!(harness.tick_with(6_900, 1_000.0, false), TickOutcome::Rendered);
        assert!(!harness.scheduler.countdown_state().visible);
        assert_eq!(harness.scheduler.frame().phase, LyricPhase::Preview);
    }

    #[test]
    fn pause_cancels_countdown_and_resume_recomputes() {
        let mut harness = Harness::new(&[(100.0, 110.0)]);
        harness.tick_at(6_800);
        assert!(harness.scheduler.countdown_state().visible);

        assert_eq!(harness.tick_with(6_900, 6_800.0, true), TickOutcome::Paused);
        assert!(!harness.scheduler.countdown_state().visible);
        assert_eq!(harness.scheduler.pending_timers(), 0);

        assert_eq!(harness.tick_with(20_000, 6_800.0, false), TickOutcome::Rendered);
        assert!(harness.scheduler.countdown_state().visible);
    }

    #[test]
    fn invalid_timeline_disables_channel() {
        let timing = TimingModel::new(150.0, 0.0).unwrap();
        let config = SyncConfig::default();
        let mut scheduler =
            SingerScheduler::new(timeline(&[(0.0, 10.0), (5.0, 20.0)]), &timing, &config);

        assert!(scheduler.is_disabled());
        assert_eq!(
            scheduler.tick(Instant::now(), 500.0, false, &timing, &config),
            TickOutcome::Disabled
        );
        assert_eq!(scheduler.frame().phase, LyricPhase::Dormant);
    }

    #[test]
    fn frame_updates_are_reported_once() {
        let mut harness = Harness::new(&[(0.0, 10.0)]);
        assert!(harness.scheduler.take_frame_update().is_some());
        assert!(harness.scheduler.take_frame_update().is_none());

        harness.tick_at(100);
        let frame = harness.scheduler.take_frame_update().cloned().unwrap();
        assert_eq!(frame.phase, LyricPhase::Active);

        harness.tick_at(100);
        assert!(harness.scheduler.take_frame_update().is_none());
    }
}
