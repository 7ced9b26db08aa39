use std::time::Instant;

use tracing::{info, warn};

use crate::{
    DisplaySurface, PlaybackClock, Result, SingerId, SingerScheduler, SongTimingData, SyncConfig,
    SyncError, TickOutcome, TimingModel,
};

/// Commands arriving from the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Play,
    Pause,
    Restart,
    Seek,
    /// The display was resized and must be laid out again.
    Resize,
}

/// Per-song state: timing plus one scheduler per singer.
///
/// Created when a song becomes current and dropped when it stops being
/// current; nothing outlives it.
#[derive(Debug)]
pub struct ShowSession {
    timing: TimingModel,
    config: SyncConfig,
    is_duet: bool,
    channels: Vec<SingerScheduler>,
}

impl ShowSession {
    pub fn new(song: &SongTimingData, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        song.validate()?;
        let timing = song.timing()?;

        let channels = song
            .singers
            .iter()
            .map(|timeline| SingerScheduler::new(timeline.clone(), &timing, &config))
            .collect::<Vec<_>>();

        info!(
            title = song.title.as_deref().unwrap_or("<untitled>"),
            bpm = timing.bpm(),
            gap_ms = timing.gap_ms(),
            singers = channels.len(),
            "lyric session created"
        );

        Ok(Self {
            timing,
            config,
            is_duet: song.is_duet || channels.len() == 2,
            channels,
        })
    }

    pub fn timing(&self) -> &TimingModel {
        &self.timing
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_duet(&self) -> bool {
        self.is_duet
    }

    pub fn channels(&self) -> &[SingerScheduler] {
        &self.channels
    }

    pub fn channel(&self, singer: SingerId) -> Option<&SingerScheduler> {
        self.channels
            .iter()
            .find(|channel| channel.singer() == singer)
    }

    pub fn singers(&self) -> impl Iterator<Item = SingerId> + '_ {
        self.channels.iter().map(SingerScheduler::singer)
    }

    pub fn handle(&mut self, event: ControlEvent, surface: &mut dyn DisplaySurface) {
        info!(?event, "control event");
        for channel in &mut self.channels {
            match event {
                ControlEvent::Play => channel.resume(),
                ControlEvent::Pause => channel.suspend(),
                ControlEvent::Restart | ControlEvent::Seek | ControlEvent::Resize => {
                    channel.restart();
                    surface.clear(channel.singer());
                }
            }
        }
        Self::flush(&mut self.channels, surface);
    }

    /// Samples the clock once and steps every channel with it.
    pub fn tick(
        &mut self,
        now: Instant,
        clock: &dyn PlaybackClock,
        surface: &mut dyn DisplaySurface,
    ) -> Result<Vec<(SingerId, TickOutcome)>> {
        let position_ms = clock.position_ms().ok_or(SyncError::NoPlaybackSource)?;
        let paused = clock.is_paused();

        let outcomes = self
            .channels
            .iter_mut()
            .map(|channel| {
                let outcome = channel.tick(now, position_ms, paused, &self.timing, &self.config);
                (channel.singer(), outcome)
            })
            .collect();
        Self::flush(&mut self.channels, surface);

        Ok(outcomes)
    }

    /// Removes everything this session put on the surface.
    pub fn teardown(&mut self, surface: &mut dyn DisplaySurface) {
        for channel in &mut self.channels {
            channel.restart();
            surface.clear(channel.singer());
        }
    }

    fn flush(channels: &mut [SingerScheduler], surface: &mut dyn DisplaySurface) {
        for channel in channels {
            let singer = channel.singer();
            if let Some(frame) = channel.take_frame_update() {
                surface.apply_frame(singer, frame);
            }
            if let Some(state) = channel.take_countdown_update() {
                surface.apply_countdown(singer, &state);
            }
        }
    }
}

/// Whether lyrics can be shown for the current song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Running,
    CannotSync(String),
}

/// Owns the session for whatever song is current and degrades every failure
/// to "no lyrics shown".
#[derive(Debug)]
pub struct ShowController {
    config: SyncConfig,
    session: Option<ShowSession>,
    status: SyncStatus,
}

impl ShowController {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            session: None,
            status: SyncStatus::Idle,
        }
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn session(&self) -> Option<&ShowSession> {
        self.session.as_ref()
    }

    /// A different song became current: discard all per-song state and build
    /// it again from `song`.
    pub fn load_song(
        &mut self,
        song: &SongTimingData,
        surface: &mut dyn DisplaySurface,
    ) -> &SyncStatus {
        self.unload(surface);

        match ShowSession::new(song, self.config.clone()) {
            Ok(session) => {
                self.session = Some(session);
                self.status = SyncStatus::Running;
            }
            Err(err) => {
                warn!(error = %err, "lyrics disabled for this song");
                self.status = SyncStatus::CannotSync(err.to_string());
            }
        }
        &self.status
    }

    pub fn unload(&mut self, surface: &mut dyn DisplaySurface) {
        if let Some(mut session) = self.session.take() {
            session.teardown(surface);
        }
        self.status = SyncStatus::Idle;
    }

    pub fn handle(&mut self, event: ControlEvent, surface: &mut dyn DisplaySurface) {
        if let Some(session) = self.session.as_mut() {
            session.handle(event, surface);
        }
    }

    pub fn tick(
        &mut self,
        now: Instant,
        clock: &dyn PlaybackClock,
        surface: &mut dyn DisplaySurface,
    ) -> Option<Vec<(SingerId, TickOutcome)>> {
        let session = self.session.as_mut()?;
        match session.tick(now, clock, surface) {
            Ok(outcomes) => Some(outcomes),
            Err(err) => {
                warn!(error = %err, "stopping lyric sync for this song");
                if let Some(mut session) = self.session.take() {
                    session.teardown(surface);
                }
                self.status = SyncStatus::CannotSync(err.to_string());
                None
            }
        }
    }
}
