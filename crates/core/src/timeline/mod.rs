use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, SyncError, TimingModel};

/// Identifies one performer's part of a song.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SingerId {
    #[default]
    P1,
    P2,
}

impl SingerId {
    pub fn index(self) -> usize {
        match self {
            SingerId::P1 => 0,
            SingerId::P2 => 1,
        }
    }
}

impl fmt::Display for SingerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingerId::P1 => f.write_str("P1"),
            SingerId::P2 => f.write_str("P2"),
        }
    }
}

/// Flavour of a timed syllable. Only renderers care about the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoteKind {
    #[default]
    Normal,
    Golden,
    Freestyle,
    Rap,
    RapGolden,
}

/// The smallest timed lyric unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub start_beat: f64,
    /// Zero for rest and marker notes.
    pub duration: f64,
    pub text: String,
    #[serde(default)]
    pub singer: SingerId,
    #[serde(default)]
    pub kind: NoteKind,
}

impl Note {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration
    }

    /// True when `beat` falls inside the sung part of the note.
    pub fn contains(&self, beat: f64) -> bool {
        self.duration > 0.0 && self.start_beat <= beat && beat < self.end_beat()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub start_beat: f64,
    pub end_beat: f64,
    pub notes: Vec<Note>,
}

impl Line {
    /// Full text of the line, syllables concatenated as written.
    pub fn text(&self) -> String {
        self.notes.iter().map(|note| note.text.as_str()).collect()
    }

    pub fn contains(&self, beat: f64) -> bool {
        self.start_beat <= beat && beat < self.end_beat
    }
}

/// Ordered lines of one singer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingerTimeline {
    #[serde(default)]
    pub singer: SingerId,
    #[serde(default)]
    pub lines: Vec<Line>,
}

impl SingerTimeline {
    pub fn new(singer: SingerId, lines: Vec<Line>) -> Self {
        Self { singer, lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    /// Index of the line with `start_beat <= beat < end_beat`.
    pub fn find_current_line(&self, beat: f64) -> Option<usize> {
        let started = self.lines.partition_point(|line| line.start_beat <= beat);
        let index = started.checked_sub(1)?;
        self.lines[index].contains(beat).then_some(index)
    }

    /// Index of the first line starting strictly after `beat`.
    pub fn find_next_line(&self, beat: f64) -> Option<usize> {
        let index = self.lines.partition_point(|line| line.start_beat <= beat);
        (index < self.lines.len()).then_some(index)
    }

    pub fn last_line(&self) -> Option<&Line> {
        self.lines.last()
    }

    /// Checks the ordering and containment invariants lookups rely on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| SyncError::InvalidTimeline {
            singer: self.singer,
            reason,
        };

        for (index, line) in self.lines.iter().enumerate() {
            if !(line.start_beat < line.end_beat) {
                return Err(invalid(format!(
                    "line {index} starts at {} but ends at {}",
                    line.start_beat, line.end_beat
                )));
            }
            let mut previous_start = f64::NEG_INFINITY;
            for note in &line.notes {
                if note.duration < 0.0 {
                    return Err(invalid(format!("line {index} has a negative note duration")));
                }
                if note.start_beat < previous_start {
                    return Err(invalid(format!("line {index} has unordered notes")));
                }
                if note.start_beat < line.start_beat || note.end_beat() > line.end_beat {
                    return Err(invalid(format!(
                        "line {index} has a note outside its beat range"
                    )));
                }
                previous_start = note.start_beat;
            }
        }

        for (index, pair) in self.lines.windows(2).enumerate() {
            if pair[1].start_beat < pair[0].end_beat {
                return Err(invalid(format!(
                    "line {} overlaps line {index}",
                    index + 1
                )));
            }
        }

        Ok(())
    }
}

/// Everything the engine needs to know about one song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongTimingData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    pub bpm: f64,
    #[serde(default)]
    pub gap: f64,
    #[serde(default)]
    pub videogap: f64,
    #[serde(default)]
    pub is_duet: bool,
    pub singers: Vec<SingerTimeline>,
}

impl SongTimingData {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn timing(&self) -> Result<TimingModel> {
        TimingModel::with_video_gap(self.bpm, self.gap, self.videogap)
    }

    pub fn singer(&self, singer: SingerId) -> Option<&SingerTimeline> {
        self.singers.iter().find(|timeline| timeline.singer == singer)
    }

    /// Song-level checks. Per-singer problems are reported by
    /// [`SingerTimeline::validate`] so they only disable that channel.
    pub fn validate(&self) -> Result<()> {
        self.timing()?;
        match self.singers.len() {
            1 | 2 => {}
            count => {
                return Err(SyncError::InvalidSong(format!(
                    "expected one or two singers, found {count}"
                )))
            }
        }
        if self.singers.len() == 2 && self.singers[0].singer == self.singers[1].singer {
            return Err(SyncError::InvalidSong(format!(
                "both singer timelines are tagged {}",
                self.singers[0].singer
            )));
        }
        Ok(())
    }
}
