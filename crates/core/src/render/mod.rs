use std::collections::BTreeMap;

use crate::{CountdownState, LyricPhase, RenderFrame, SingerId};

/// Sink that paints lyric frames and countdowns for each singer.
pub trait DisplaySurface {
    fn apply_frame(&mut self, singer: SingerId, frame: &RenderFrame);

    fn apply_countdown(&mut self, singer: SingerId, state: &CountdownState);

    /// Removes everything shown for `singer`.
    fn clear(&mut self, singer: SingerId);
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceUpdate {
    Frame(SingerId, RenderFrame),
    Countdown(SingerId, CountdownState),
    Clear(SingerId),
}

/// In-memory surface that keeps the latest values per singer and the full
/// sequence of updates it received.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    history: Vec<SurfaceUpdate>,
    frames: BTreeMap<SingerId, RenderFrame>,
    countdowns: BTreeMap<SingerId, CountdownState>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[SurfaceUpdate] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn frame(&self, singer: SingerId) -> Option<&RenderFrame> {
        self.frames.get(&singer)
    }

    pub fn countdown(&self, singer: SingerId) -> CountdownState {
        self.countdowns.get(&singer).copied().unwrap_or_default()
    }

    /// Every frame pushed for `singer`, oldest first.
    pub fn frames_for(&self, singer: SingerId) -> Vec<&RenderFrame> {
        self.history
            .iter()
            .filter_map(|update| match update {
                SurfaceUpdate::Frame(target, frame) if *target == singer => Some(frame),
                _ => None,
            })
            .collect()
    }

    /// Phases pushed for `singer` with consecutive repeats collapsed.
    pub fn phases_for(&self, singer: SingerId) -> Vec<LyricPhase> {
        let mut phases: Vec<LyricPhase> = Vec::new();
        for frame in self.frames_for(singer) {
            if phases.last() != Some(&frame.phase) {
                phases.push(frame.phase);
            }
        }
        phases
    }
}

impl DisplaySurface for RecordingSurface {
    fn apply_frame(&mut self, singer: SingerId, frame: &RenderFrame) {
        self.frames.insert(singer, frame.clone());
        self.history.push(SurfaceUpdate::Frame(singer, frame.clone()));
    }

    fn apply_countdown(&mut self, singer: SingerId, state: &CountdownState) {
        self.countdowns.insert(singer, *state);
        self.history.push(SurfaceUpdate::Countdown(singer, *state));
    }

    fn clear(&mut self, singer: SingerId) {
        self.frames.remove(&singer);
        self.countdowns.remove(&singer);
        self.history.push(SurfaceUpdate::Clear(singer));
    }
}
