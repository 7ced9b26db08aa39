use std::collections::BTreeSet;

use crate::{SingerTimeline, TimingModel};

/// Indices of lines that are followed by a pause long enough to fade the
/// lyrics out instead of previewing what comes next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FadeOutSet {
    boundaries: BTreeSet<usize>,
}

impl FadeOutSet {
    /// Marks every line whose gap to the following line exceeds
    /// `threshold_ms`. The last line is never marked.
    pub fn analyze(timeline: &SingerTimeline, timing: &TimingModel, threshold_ms: f64) -> Self {
        let boundaries = timeline
            .lines
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| {
                let gap_beats = pair[1].start_beat - pair[0].end_beat;
                timing.beats_to_ms(gap_beats) > threshold_ms
            })
            .map(|(index, _)| index)
            .collect();

        Self { boundaries }
    }

    pub fn is_boundary(&self, line_index: usize) -> bool {
        self.boundaries.contains(&line_index)
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.boundaries.iter().copied()
    }

    /// Lines that may be shown as previews after `line_index`, at most
    /// `max_slots` of them. The run stops at the first fade-out boundary so a
    /// slot past a long pause is never filled.
    pub fn preview_run(&self, line_index: usize, line_count: usize, max_slots: usize) -> Vec<usize> {
        let mut run = Vec::with_capacity(max_slots);
        let mut from = line_index;
        while run.len() < max_slots {
            let next = from + 1;
            if next >= line_count || self.is_boundary(from) {
                break;
            }
            run.push(next);
            from = next;
        }
        run
    }
}
