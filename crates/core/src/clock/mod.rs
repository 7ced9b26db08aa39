/// Read-only view of the playback element's position.
///
/// The engine samples this on every tick and never drives it.
pub trait PlaybackClock {
    /// Current audio position in milliseconds, or `None` when there is no
    /// playback source.
    fn position_ms(&self) -> Option<f64>;

    fn is_paused(&self) -> bool;
}

impl<C: PlaybackClock> PlaybackClock for Option<C> {
    fn position_ms(&self) -> Option<f64> {
        self.as_ref().and_then(|clock| clock.position_ms())
    }

    fn is_paused(&self) -> bool {
        self.as_ref().map_or(true, |clock| clock.is_paused())
    }
}

impl<C: PlaybackClock + ?Sized> PlaybackClock for &C {
    fn position_ms(&self) -> Option<f64> {
        (**self).position_ms()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }
}

/// Manually advanced clock standing in for an audio element.
#[derive(Debug, Default, Clone)]
pub struct SimulatedClock {
    position_ms: f64,
    paused: bool,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.position_ms = 0.0;
    }

    /// Moves the playhead forward unless paused.
    pub fn advance(&mut self, delta_ms: f64) {
        if !self.paused {
            self.position_ms = (self.position_ms + delta_ms).max(0.0);
        }
    }

    pub fn seek(&mut self, position_ms: f64) {
        self.position_ms = position_ms.max(0.0);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn play(&mut self) {
        self.paused = false;
    }
}

impl PlaybackClock for SimulatedClock {
    fn position_ms(&self) -> Option<f64> {
        Some(self.position_ms)
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}
