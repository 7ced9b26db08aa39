use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use karaoke_show_core::{
    read_song_file, AppConfig, CountdownState, DisplaySurface, FadeOutSet, LineView,
    RenderFrame, ShowController, SimulatedClock, SingerId, SyllableState, SyncStatus,
};
use tracing_subscriber::EnvFilter;

fn main() -> karaoke_show_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            song,
            config,
            step_ms,
            until_ms,
            realtime,
        } => run_simulate(&song, config.as_deref(), step_ms, until_ms, realtime),
        Commands::Inspect { song } => run_inspect(&song),
    }
}

fn run_simulate(
    song_path: &Path,
    config_path: Option<&Path>,
    step_ms: Option<u64>,
    until_ms: Option<u64>,
    realtime: bool,
) -> karaoke_show_core::Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::live_defaults(),
    };
    let song = read_song_file(song_path)?;
    let timing = song.timing()?;

    let step_ms = step_ms.unwrap_or(config.driver.frame_interval_ms).max(1);
    let until_ms = until_ms.unwrap_or_else(|| {
        let last_beat = song
            .singers
            .iter()
            .filter_map(|singer| singer.last_line())
            .map(|line| line.end_beat)
            .fold(0.0, f64::max);
        let end = timing.clock_position_of(last_beat) + config.sync.tail_ms + 1_000.0;
        end.max(0.0) as u64
    });
    tracing::info!(?song_path, step_ms, until_ms, realtime, "starting simulation");

    let mut surface = TerminalSurface::default();
    let mut controller = ShowController::new(config.sync.clone());
    if let SyncStatus::CannotSync(reason) = controller.load_song(&song, &mut surface) {
        println!("cannot sync lyrics: {reason}");
        return Ok(());
    }

    let mut clock = SimulatedClock::new();
    let started = Instant::now();
    let mut position = 0;

    while position <= until_ms {
        clock.seek(position as f64);
        surface.position_ms = position;

        let now = if realtime {
            std::thread::sleep(
                (started + Duration::from_millis(position)).saturating_duration_since(Instant::now()),
            );
            Instant::now()
        } else {
            started + Duration::from_millis(position)
        };

        if controller.tick(now, &clock, &mut surface).is_none() {
            break;
        }
        position += step_ms;
    }

    controller.unload(&mut surface);
    if let SyncStatus::CannotSync(reason) = controller.status() {
        println!("cannot sync lyrics: {reason}");
    }
    Ok(())
}

fn run_inspect(song_path: &Path) -> karaoke_show_core::Result<()> {
    let song = read_song_file(song_path)?;
    song.validate()?;
    let timing = song.timing()?;
    let config = AppConfig::live_defaults();

    println!(
        "{} - {}",
        song.artist.as_deref().unwrap_or("unknown artist"),
        song.title.as_deref().unwrap_or("untitled")
    );
    println!(
        "bpm {:.2}, beat {:.2} ms, gap {:.0} ms, videogap {:.0} ms{}",
        timing.bpm(),
        timing.beat_duration_ms(),
        timing.gap_ms(),
        song.videogap,
        if song.is_duet { ", duet" } else { "" }
    );

    for singer in &song.singers {
        let fade_outs =
            FadeOutSet::analyze(singer, &timing, config.sync.fade_out_threshold_ms);
        let boundaries: Vec<String> = fade_outs.iter().map(|index| index.to_string()).collect();
        println!(
            "{}: {} lines, fade-out after [{}]",
            singer.singer,
            singer.len(),
            boundaries.join(", ")
        );
    }
    Ok(())
}

/// Prints every frame and countdown change as one line on stdout.
#[derive(Debug, Default)]
struct TerminalSurface {
    position_ms: u64,
}

impl DisplaySurface for TerminalSurface {
    fn apply_frame(&mut self, singer: SingerId, frame: &RenderFrame) {
        let mut out = format!("[{:>7} ms] {singer} {:?}", self.position_ms, frame.phase);
        if frame.visible {
            if let Some(line) = &frame.current {
                out.push_str(&format!(" | {}", describe_line(line)));
            }
            for line in frame.next.iter().chain(frame.next_next.iter()) {
                out.push_str(&format!(" | ~ {}", line.text()));
            }
        }
        println!("{out}");
    }

    fn apply_countdown(&mut self, singer: SingerId, state: &CountdownState) {
        if state.visible {
            println!(
                "[{:>7} ms] {singer} countdown {:.0}%",
                self.position_ms, state.percent
            );
        }
    }

    fn clear(&mut self, singer: SingerId) {
        println!("[{:>7} ms] {singer} cleared", self.position_ms);
    }
}

/// Brackets the syllable under the playhead and upper-cases what has been sung.
fn describe_line(line: &LineView) -> String {
    line.syllables
        .iter()
        .map(|span| match span.state {
            SyllableState::Sung => span.text.to_uppercase(),
            SyllableState::Current { fill_percent } => {
                format!("[{}:{fill_percent:.0}%]", span.text)
            }
            SyllableState::Pending => span.text.clone(),
        })
        .collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Karaoke lyrics synchronisation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a song against a simulated clock and print what each singer sees.
    Simulate {
        /// UltraStar `.txt` or JSON song file.
        song: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Clock step between ticks. Defaults to the configured frame interval.
        #[arg(long)]
        step_ms: Option<u64>,
        /// Stop at this clock position. Defaults to shortly after the last line.
        #[arg(long)]
        until_ms: Option<u64>,
        /// Sleep between ticks so the output follows real time.
        #[arg(long)]
        realtime: bool,
    },
    /// Print timing facts and fade-out boundaries for a song.
    Inspect {
        /// UltraStar `.txt` or JSON song file.
        song: PathBuf,
    },
}
