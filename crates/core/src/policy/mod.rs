//! Render policy: turns a clock position into what a singer's lyric display
//! should show.
//!
//! Everything here is a pure function of the song data and the sampled
//! position, so the scheduler can call it as often as it likes and tests can
//! drive it without a display.

use serde::Serialize;

use crate::{FadeOutSet, Line, NoteKind, SingerTimeline, SyncConfig, TimingModel};

/// Number of preview slots below the current line.
pub const PREVIEW_SLOTS: usize = 2;

/// Display phase of one singer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LyricPhase {
    /// Before the first line and outside its lead window.
    Dormant,
    /// An upcoming line is shown dimmed ahead of time.
    Preview,
    /// A line is being sung.
    Active,
    /// The last line has ended and is kept up for a moment.
    Tail,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SyllableState {
    Sung,
    /// Left-to-right fill of the syllable under the playhead, 0..=100.
    Current { fill_percent: f64 },
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyllableSpan {
    pub text: String,
    pub kind: NoteKind,
    pub state: SyllableState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineEmphasis {
    /// Dimmed, nothing highlighted yet.
    Preview,
    /// Full opacity with per-syllable highlighting.
    Highlighted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineView {
    pub line_index: usize,
    pub emphasis: LineEmphasis,
    pub syllables: Vec<SyllableSpan>,
}

impl LineView {
    pub fn text(&self) -> String {
        self.syllables.iter().map(|span| span.text.as_str()).collect()
    }

    /// Index and fill of the syllable currently being sung, if any.
    pub fn current_syllable(&self) -> Option<(usize, f64)> {
        self.syllables
            .iter()
            .enumerate()
            .find_map(|(index, span)| match span.state {
                SyllableState::Current { fill_percent } => Some((index, fill_percent)),
                _ => None,
            })
    }
}

/// What one singer's display should show right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub phase: LyricPhase,
    pub current: Option<LineView>,
    pub next: Option<LineView>,
    pub next_next: Option<LineView>,
    pub visible: bool,
}

impl RenderFrame {
    pub fn dormant() -> Self {
        Self::empty(LyricPhase::Dormant)
    }

    pub fn hidden() -> Self {
        Self::empty(LyricPhase::Hidden)
    }

    fn empty(phase: LyricPhase) -> Self {
        Self {
            phase,
            current: None,
            next: None,
            next_next: None,
            visible: false,
        }
    }

    fn with_lines(phase: LyricPhase, current: LineView, previews: Vec<LineView>) -> Self {
        let mut previews = previews.into_iter();
        Self {
            phase,
            current: Some(current),
            next: previews.next(),
            next_next: previews.next(),
            visible: true,
        }
    }
}

/// The line a Preview frame is counting down to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Approach {
    pub line_index: usize,
    /// Milliseconds of song time until the line starts.
    pub lead_ms: f64,
    /// The line is the first one or follows a fade-out boundary.
    pub fades_in: bool,
}

/// A fade-in that has not opened yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeInGate {
    pub line_index: usize,
    /// Milliseconds until the line's preview may open.
    pub opens_in_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub frame: RenderFrame,
    /// Present while in Preview.
    pub approach: Option<Approach>,
    /// Present while Dormant or Hidden ahead of a fade-in.
    pub fade_in: Option<FadeInGate>,
}

impl Evaluation {
    fn still(frame: RenderFrame) -> Self {
        Self {
            frame,
            approach: None,
            fade_in: None,
        }
    }

    fn gated(frame: RenderFrame, line_index: usize, opens_in_ms: f64) -> Self {
        Self {
            frame,
            approach: None,
            fade_in: Some(FadeInGate {
                line_index,
                opens_in_ms,
            }),
        }
    }
}

/// Read-only inputs shared by every evaluation of one singer channel.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub timeline: &'a SingerTimeline,
    pub fade_outs: &'a FadeOutSet,
    pub timing: &'a TimingModel,
    pub config: &'a SyncConfig,
}

impl<'a> PolicyContext<'a> {
    /// Decides the phase and contents of the display for a clock position.
    pub fn evaluate(&self, clock_position_ms: f64) -> Evaluation {
        let lines = &self.timeline.lines;
        let Some(first) = lines.first() else {
            return Evaluation::still(RenderFrame::dormant());
        };

        let song_ms = self.timing.song_time_ms(clock_position_ms);
        let attack_ms = self.config.fade_in_attack_ms();

        if song_ms < 0.0 {
            let lead_ms = self.timing.beats_to_ms(first.start_beat) - song_ms;
            return Evaluation::gated(
                RenderFrame::dormant(),
                0,
                (-song_ms).max(lead_ms - attack_ms),
            );
        }

        let beat = self.timing.ms_to_beats(song_ms);

        if let Some(index) = self.timeline.find_current_line(beat) {
            let current = highlight_line(&lines[index], index, beat);
            return Evaluation::still(RenderFrame::with_lines(
                LyricPhase::Active,
                current,
                self.previews_after(index),
            ));
        }

        let Some(next) = self.timeline.find_next_line(beat) else {
            return Evaluation::still(self.tail_frame(beat));
        };

        let lead_ms = self.timing.beats_to_ms(lines[next].start_beat - beat);
        let fades_in = next == 0 || self.fade_outs.is_boundary(next - 1);

        if fades_in {
            let rest_remaining_ms = match next.checked_sub(1) {
                Some(previous) => {
                    let since_end = self.timing.beats_to_ms(beat - lines[previous].end_beat);
                    self.config.tail_ms - since_end
                }
                None => 0.0,
            };
            let opens_in_ms = rest_remaining_ms.max(lead_ms - attack_ms);
            if opens_in_ms > 0.0 {
                let frame = if next == 0 {
                    RenderFrame::dormant()
                } else {
                    RenderFrame::hidden()
                };
                return Evaluation::gated(frame, next, opens_in_ms);
            }
        }

        Evaluation {
            frame: RenderFrame::with_lines(
                LyricPhase::Preview,
                preview_line(&lines[next], next),
                self.previews_after(next),
            ),
            approach: Some(Approach {
                line_index: next,
                lead_ms,
                fades_in,
            }),
            fade_in: None,
        }
    }

    fn previews_after(&self, index: usize) -> Vec<LineView> {
        let lines = &self.timeline.lines;
        self.fade_outs
            .preview_run(index, lines.len(), PREVIEW_SLOTS)
            .into_iter()
            .map(|i| preview_line(&lines[i], i))
            .collect()
    }

    fn tail_frame(&self, beat: f64) -> RenderFrame {
        let Some(last) = self.timeline.last_line() else {
            return RenderFrame::hidden();
        };
        let since_end = self.timing.beats_to_ms(beat - last.end_beat);
        if since_end > self.config.tail_ms {
            return RenderFrame::hidden();
        }

        let index = self.timeline.len() - 1;
        RenderFrame::with_lines(
            LyricPhase::Tail,
            highlight_line(last, index, last.end_beat),
            Vec::new(),
        )
    }
}

/// Convenience wrapper returning only the frame.
pub fn compute_render_frame(context: &PolicyContext<'_>, clock_position_ms: f64) -> RenderFrame {
    context.evaluate(clock_position_ms).frame
}

/// Highlights a line being sung at `beat`.
pub fn highlight_line(line: &Line, line_index: usize, beat: f64) -> LineView {
    let active = line.notes.iter().position(|note| note.contains(beat));
    let reference = active.map_or(beat, |index| line.notes[index].start_beat);

    let syllables = line
        .notes
        .iter()
        .enumerate()
        .map(|(index, note)| {
            let state = if Some(index) == active {
                SyllableState::Current {
                    fill_percent: syllable_fill(note.start_beat, note.duration, beat),
                }
            } else if note.start_beat < reference {
                SyllableState::Sung
            } else {
                SyllableState::Pending
            };
            SyllableSpan {
                text: note.text.clone(),
                kind: note.kind,
                state,
            }
        })
        .collect();

    LineView {
        line_index,
        emphasis: LineEmphasis::Highlighted,
        syllables,
    }
}

fn preview_line(line: &Line, line_index: usize) -> LineView {
    LineView {
        line_index,
        emphasis: LineEmphasis::Preview,
        syllables: line
            .notes
            .iter()
            .map(|note| SyllableSpan {
                text: note.text.clone(),
                kind: note.kind,
                state: SyllableState::Pending,
            })
            .collect(),
    }
}

/// Percentage of a syllable swept by the playhead, clamped to 0..=100.
pub fn syllable_fill(start_beat: f64, duration: f64, beat: f64) -> f64 {
    if duration <= 0.0 {
        return if beat >= start_beat { 100.0 } else { 0.0 };
    }
    ((beat - start_beat) / duration).clamp(0.0, 1.0) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::tests::{note, timeline};
    use crate::SingerId;

    struct Fixture {
        timeline: SingerTimeline,
        fade_outs: FadeOutSet,
        timing: TimingModel,
        config: SyncConfig,
    }

    impl Fixture {
        /// 150 bpm gives a 100 ms beat, so beat `b` is at `b * 100` ms.
        fn new(timeline: SingerTimeline) -> Self {
            let timing = TimingModel::new(150.0, 0.0).unwrap();
            let config = SyncConfig::default();
            let fade_outs = FadeOutSet::analyze(&timeline, &timing, config.fade_out_threshold_ms);
            Self {
                timeline,
                fade_outs,
                timing,
                config,
            }
        }

        fn context(&self) -> PolicyContext<'_> {
            PolicyContext {
                timeline: &self.timeline,
                fade_outs: &self.fade_outs,
                timing: &self.timing,
                config: &self.config,
            }
        }

        fn at_beat(&self, beat: f64) -> Evaluation {
            self.context().evaluate(beat * 100.0)
        }
    }

    #[test]
    fn line_lookup_drives_phase() {
        let fixture = Fixture::new(timeline(&[(0.0, 10.0), (20.0, 30.0)]));

        let active = fixture.at_beat(5.0);
        assert_eq!(active.frame.phase, LyricPhase::Active);
        assert_eq!(active.frame.current.as_ref().unwrap().line_index, 0);
        assert_eq!(active.frame.next.as_ref().unwrap().line_index, 1);

        let preview = fixture.at_beat(15.0);
        assert_eq!(preview.frame.phase, LyricPhase::Preview);
        let current = preview.frame.current.as_ref().unwrap();
        assert_eq!(current.line_index, 1);
        assert_eq!(current.emphasis, LineEmphasis::Preview);
        let approach = preview.approach.unwrap();
        assert_eq!(approach.line_index, 1);
        assert!((approach.lead_ms - 500.0).abs() < 1e-9);
        assert!(!approach.fades_in);

        let second = fixture.at_beat(25.0);
        assert_eq!(second.frame.phase, LyricPhase::Active);
        assert_eq!(second.frame.current.as_ref().unwrap().line_index, 1);
        assert!(second.frame.next.is_none());
    }

    #[test]
    fn long_pause_suppresses_previews() {
        let fixture = Fixture::new(timeline(&[(0.0, 10.0), (100.0, 110.0)]));

        let active = fixture.at_beat(5.0);
        assert_eq!(active.frame.phase, LyricPhase::Active);
        assert!(active.frame.next.is_none());
        assert!(active.frame.next_next.is_none());

        let after = fixture.at_beat(12.0);
        assert_eq!(after.frame.phase, LyricPhase::Hidden);
        assert!(!after.frame.visible);
        assert!((after.fade_in.unwrap().opens_in_ms - 2_800.0).abs() < 1e-6);

        let approaching = fixture.at_beat(50.0);
        assert_eq!(approaching.frame.phase, LyricPhase::Preview);
        assert!(approaching.approach.unwrap().fades_in);
    }

    #[test]
    fn preview_slots_never_cross_a_boundary() {
        let fixture = Fixture::new(timeline(&[
            (0.0, 10.0),
            (12.0, 20.0),
            (22.0, 30.0),
            (32.0, 40.0),
        ]));
        let frame = fixture.at_beat(5.0).frame;
        assert_eq!(frame.next.unwrap().line_index, 1);
        assert_eq!(frame.next_next.unwrap().line_index, 2);

        let split = Fixture::new(timeline(&[(0.0, 10.0), (12.0, 20.0), (200.0, 210.0)]));
        let frame = split.at_beat(5.0).frame;
        assert_eq!(frame.next.unwrap().line_index, 1);
        assert!(frame.next_next.is_none());
    }

    #[test]
    fn dormant_until_lead_window() {
        let fixture = Fixture::new(timeline(&[(200.0, 210.0)]));

        let early = fixture.at_beat(50.0);
        assert_eq!(early.frame.phase, LyricPhase::Dormant);
        assert!((early.fade_in.unwrap().opens_in_ms - 5_000.0).abs() < 1e-6);

        let lead = fixture.at_beat(110.0);
        assert_eq!(lead.frame.phase, LyricPhase::Preview);
        assert!(lead.approach.unwrap().fades_in);
    }

    #[test]
    fn nothing_renders_before_song_start() {
        let mut fixture = Fixture::new(timeline(&[(0.0, 8.0)]));
        fixture.timing = TimingModel::new(150.0, 1_000.0).unwrap();

        let before = fixture.context().evaluate(400.0);
        assert_eq!(before.frame.phase, LyricPhase::Dormant);
        assert!(!before.frame.visible);
        assert!((before.fade_in.unwrap().opens_in_ms - 600.0).abs() < 1e-6);
    }

    #[test]
    fn tail_then_hidden_after_last_line() {
        let fixture = Fixture::new(timeline(&[(0.0, 10.0)]));

        let tail = fixture.at_beat(20.0).frame;
        assert_eq!(tail.phase, LyricPhase::Tail);
        let current = tail.current.unwrap();
        assert!(current
            .syllables
            .iter()
            .all(|span| span.state == SyllableState::Sung));

        let gone = fixture.at_beat(41.0).frame;
        assert_eq!(gone.phase, LyricPhase::Hidden);
        assert!(gone.current.is_none());
    }

    #[test]
    fn empty_timeline_stays_dormant() {
        let fixture = Fixture::new(SingerTimeline::new(SingerId::P2, Vec::new()));
        for beat in [0.0, 10.0, 10_000.0] {
            let evaluation = fixture.at_beat(beat);
            assert_eq!(evaluation.frame, RenderFrame::dormant());
            assert!(evaluation.fade_in.is_none());
        }
    }

    #[test]
    fn syllables_classified_around_playhead() {
        let line = Line {
            start_beat: 0.0,
            end_beat: 12.0,
            notes: vec![note(0.0, 4.0, "one "), note(4.0, 4.0, "two "), note(10.0, 2.0, "three")],
        };

        let view = highlight_line(&line, 0, 5.0);
        let states: Vec<_> = view.syllables.iter().map(|span| span.state).collect();
        assert_eq!(states[0], SyllableState::Sung);
        assert_eq!(states[1], SyllableState::Current { fill_percent: 25.0 });
        assert_eq!(states[2], SyllableState::Pending);
        assert_eq!(view.current_syllable(), Some((1, 25.0)));

        let rest = highlight_line(&line, 0, 9.0);
        assert_eq!(rest.current_syllable(), None);
        assert_eq!(rest.syllables[1].state, SyllableState::Sung);
        assert_eq!(rest.syllables[2].state, SyllableState::Pending);
        assert_eq!(rest.text(), "one two three");
    }

    #[test]
    fn syllable_fill_is_monotonic_and_clamped() {
        let mut previous = -1.0;
        for step in 0..=80 {
            let beat = -1.0 + step as f64 * 0.075;
            let fill = syllable_fill(0.0, 4.0, beat);
            assert!((0.0..=100.0).contains(&fill));
            assert!(fill >= previous);
            previous = fill;
        }
        assert_eq!(syllable_fill(0.0, 4.0, 4.0), 100.0);
        assert_eq!(syllable_fill(0.0, 4.0, 2.0), 50.0);
    }
}
