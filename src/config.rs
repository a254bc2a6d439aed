use crate::sim::MAX_INTENSITY;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "pyre", version)]
#[command(about = "ASCII bonfire for your terminal", long_about = None)]
#[command(disable_help_flag = true)]
pub(crate) struct Args {
    /// Intensity multiplier (taller or shorter flames)
    #[arg(short = 's', value_name = "SCALE", default_value_t = 1.0, value_parser = parse_scale)]
    pub(crate) scale: f64,

    /// Frames per second
    #[arg(short = 'r', value_name = "FPS", default_value_t = 20,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub(crate) speed: u32,

    /// Heat injected by the source row (0..=100)
    #[arg(short = 'i', value_name = "INTENSITY", default_value_t = MAX_INTENSITY,
          value_parser = clap::value_parser!(u32).range(0..=MAX_INTENSITY as i64))]
    pub(crate) start_intensity: u32,

    /// Columns left cold at each side of the source row
    #[arg(short = 'w', value_name = "COLS", default_value_t = 0)]
    pub(crate) start_offset: u32,

    /// Row the heat source sits on, counted from the bottom
    #[arg(short = 'h', value_name = "ROW", default_value_t = 0)]
    pub(crate) start_height: u32,

    /// Looping background track
    #[arg(long, value_name = "PATH", default_value = "fire.wav")]
    pub(crate) sound: PathBuf,

    /// Audio backend
    #[arg(long, value_enum, default_value_t = AudioChoice::Auto)]
    pub(crate) audio: AudioChoice,

    /// Seed the flicker RNG for a repeatable fire
    #[arg(long)]
    pub(crate) seed: Option<u64>,

    /// Use 24-bit color instead of the 256-color cube
    #[arg(long, default_value_t = false)]
    pub(crate) true_color: bool,

    /// Write logs to this file (stdout belongs to the fire)
    #[arg(long, value_name = "PATH")]
    pub(crate) log_file: Option<PathBuf>,

    /// Print help (-h is the source row)
    #[arg(long = "help", action = ArgAction::Help)]
    _help: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum AudioChoice {
    /// Managed sink if an output device is present, silence otherwise
    Auto,
    /// Looping rodio sink
    Sink,
    /// Chunked decode-and-stream thread
    Stream,
    /// No audio
    Off,
}

fn parse_scale(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if !v.is_finite() || v < 0.0 {
        return Err(format!("scale must be a finite, non-negative number (got {s})"));
    }
    Ok(v)
}

/// Settings fixed for the life of the process.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) speed: u32,
    pub(crate) scale: f64,
    pub(crate) start_intensity: u32,
    pub(crate) start_offset: u32,
    pub(crate) start_height: u32,
    pub(crate) sound: PathBuf,
    pub(crate) audio: AudioChoice,
    pub(crate) seed: Option<u64>,
    pub(crate) true_color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            speed: 20,
            scale: 1.0,
            start_intensity: MAX_INTENSITY,
            start_offset: 0,
            start_height: 0,
            sound: PathBuf::from("fire.wav"),
            audio: AudioChoice::Auto,
            seed: None,
            true_color: false,
        }
    }
}

impl From<Args> for Config {
    fn from(a: Args) -> Self {
        Self {
            speed: a.speed,
            scale: a.scale,
            start_intensity: a.start_intensity,
            start_offset: a.start_offset,
            start_height: a.start_height,
            sound: a.sound,
            audio: a.audio,
            seed: a.seed,
            true_color: a.true_color,
        }
    }
}

impl Config {
    pub(crate) fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.speed.max(1) as f64)
    }
}
