//! Lyrics synchronisation engine for the Karaoke Show controller.
//!
//! Given a song's beat-timed lyrics and a live playback position the engine
//! works out, for one or two singers, which line to show, how far each
//! syllable has been sung, which lines to preview, when to fade out across a
//! long pause and when to run the countdown before a line. Each module owns
//! one piece of that pipeline:
//!
//! - [`timing`] converts between clock milliseconds and beats.
//! - [`timeline`] holds the song data and the line lookups.
//! - [`fade`] finds the long pauses that suppress previews.
//! - [`policy`] computes a [`RenderFrame`] from a clock position.
//! - [`countdown`] and [`timer`] provide the wall-clock parts.
//! - [`scheduler`] and [`session`] drive it all from a frame loop.
//! - [`render`] is the seam to whatever paints the result.

pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod fade;
pub mod policy;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod timeline;
pub mod timer;
pub mod timing;
pub mod ultrastar;

pub use clock::{PlaybackClock, SimulatedClock};
pub use config::{AppConfig, DriverConfig, SyncConfig};
pub use countdown::{CountdownState, ProgressCountdown};
pub use error::{Result, SyncError};
pub use fade::FadeOutSet;
pub use policy::{
    compute_render_frame, LineEmphasis, LineView, LyricPhase, PolicyContext, RenderFrame,
    SyllableSpan, SyllableState,
};
pub use render::{DisplaySurface, RecordingSurface, SurfaceUpdate};
pub use scheduler::{SingerScheduler, TickOutcome};
pub use session::{ControlEvent, ShowController, ShowSession, SyncStatus};
pub use timeline::{Line, Note, NoteKind, SingerId, SingerTimeline, SongTimingData};
pub use timer::{TimerHandle, TimerKind, TimerList};
pub use timing::TimingModel;
pub use ultrastar::{parse_song, read_song_file};
