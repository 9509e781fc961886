use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::{info, instrument};

mod audio;
mod avi;
mod convert;
mod error;
mod log;
mod media;
mod report;
mod utils;
mod video;

use crate::error::UsageError;
use crate::log::init_logger;
use crate::media::{produce, Options, Plan};
use crate::utils::{make_rng, normalize_args};
use crate::video::{VideoCodec, VideoSpec};

/// Generate random placeholder media files for test fixtures
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// include a video stream
    #[arg(short, long)]
    video: bool,

    /// include an audio stream
    #[arg(short, long)]
    audio: bool,

    /// duration in seconds
    #[arg(short, long)]
    duration: u64,

    /// video width, also accepted as -vw
    #[arg(long)]
    width: Option<u32>,

    /// video height, also accepted as -vh
    #[arg(long)]
    height: Option<u32>,

    /// output file path, the extension picks the container
    #[arg(short, long)]
    output: PathBuf,

    /// codec of the temporary video container
    #[arg(long, value_enum, default_value_t = VideoCodec::Xvid)]
    codec: VideoCodec,

    /// seed for reproducible content
    #[arg(long)]
    seed: Option<u64>,

    /// ffmpeg executable
    #[arg(long, default_value_t = String::from("ffmpeg"))]
    ffmpeg: String,

    /// write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// log level
    #[arg(long, default_value_t = String::from("info"))]
    log_level: String,

    /// log file
    #[arg(long)]
    log_file: Option<String>,
}

impl Args {
    fn plan(&self) -> Result<Plan, UsageError> {
        if !self.video && !self.audio {
            return Err(UsageError::NoStreams);
        }
        let video = match (self.video, self.width, self.height) {
            (false, _, _) => None,
            (true, Some(width), Some(height)) => Some(VideoSpec { width, height }),
            (true, _, _) => return Err(UsageError::MissingDimensions),
        };
        if self.duration == 0 {
            return Err(UsageError::Zero("duration"));
        }
        if let Some(spec) = video {
            if spec.width == 0 {
                return Err(UsageError::Zero("width"));
            }
            if spec.height == 0 {
                return Err(UsageError::Zero("height"));
            }
        }
        Ok(Plan {
            duration: self.duration,
            video,
            audio: self.audio,
            output: self.output.clone(),
        })
    }
}

#[instrument]
fn main() -> Result<()> {
    let args = Args::parse_from(normalize_args(std::env::args_os()));

    let plan = match args.plan() {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let guard = init_logger(args.log_level, args.log_file)?;
    let start = Instant::now();

    let options = Options {
        codec: args.codec,
        ffmpeg: args.ffmpeg,
        seed: args.seed,
    };
    let mut rng = make_rng(args.seed);
    let report = produce(&plan, &options, &mut rng)?;

    if let Some(path) = &args.report {
        report::export(&report, path)?;
    }

    info!("Time elapsed: {:?}", start.elapsed());
    drop(guard);
    Ok(())
}
