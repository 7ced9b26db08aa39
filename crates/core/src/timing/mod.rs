use crate::{Result, SyncError};

/// Beat/millisecond conversions for one song.
///
/// One internal beat is a sixteenth note: `(60000 / bpm) / 4` milliseconds.
/// Beat 0 sits `gap_ms` after the start of the audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingModel {
    bpm: f64,
    gap_ms: f64,
    video_gap_ms: f64,
    beat_duration_ms: f64,
}

impl TimingModel {
    pub fn new(bpm: f64, gap_ms: f64) -> Result<Self> {
        Self::with_video_gap(bpm, gap_ms, 0.0)
    }

    pub fn with_video_gap(bpm: f64, gap_ms: f64, video_gap_ms: f64) -> Result<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SyncError::InvalidBpm(bpm));
        }
        if !gap_ms.is_finite() || !video_gap_ms.is_finite() {
            return Err(SyncError::InvalidSong(
                "gap and videogap must be finite".to_string(),
            ));
        }

        Ok(Self {
            bpm,
            gap_ms,
            video_gap_ms,
            beat_duration_ms: (60_000.0 / bpm) / 4.0,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn gap_ms(&self) -> f64 {
        self.gap_ms
    }

    pub fn beat_duration_ms(&self) -> f64 {
        self.beat_duration_ms
    }

    /// Milliseconds since beat 0. Negative before the song has started.
    pub fn song_time_ms(&self, clock_position_ms: f64) -> f64 {
        clock_position_ms - self.gap_ms
    }

    /// Current beat for a clock position, or `None` while the song has not
    /// started yet.
    pub fn beat_at(&self, clock_position_ms: f64) -> Option<f64> {
        let song_time = self.song_time_ms(clock_position_ms);
        if song_time < 0.0 {
            None
        } else {
            Some(self.ms_to_beats(song_time))
        }
    }

    pub fn ms_to_beats(&self, ms: f64) -> f64 {
        ms / self.beat_duration_ms
    }

    pub fn beats_to_ms(&self, beats: f64) -> f64 {
        beats * self.beat_duration_ms
    }

    /// Clock position at which `beat` is reached.
    pub fn clock_position_of(&self, beat: f64) -> f64 {
        self.gap_ms + self.beats_to_ms(beat)
    }

    /// Position of the background video for an audio position. The video is
    /// shifted by the videogap and held on its first frame while negative.
    pub fn video_position_ms(&self, clock_position_ms: f64) -> f64 {
        (clock_position_ms + self.video_gap_ms).max(0.0)
    }
}
