use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use tempfile::{Builder, TempPath};
use tracing::{debug, info, warn};

use crate::audio::{self, create_random_audio};
use crate::convert::{convert, Layout};
use crate::report::{AudioReport, RunReport, VideoReport};
use crate::video::{create_random_video, VideoCodec, VideoSpec};

pub const FPS: u32 = 30;
pub const SAMPLE_RATE: u32 = 44_100;

/// A validated request: at least one stream, dimensions present for video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub duration: u64,
    pub video: Option<VideoSpec>,
    pub audio: bool,
    pub output: PathBuf,
}

impl Plan {
    pub fn layout(&self) -> Layout {
        match (self.video.is_some(), self.audio) {
            (true, true) => Layout::Both,
            (true, false) => Layout::VideoOnly,
            _ => Layout::AudioOnly,
        }
    }
}

pub struct Options {
    pub codec: VideoCodec,
    pub ffmpeg: String,
    pub seed: Option<u64>,
}

/// Temporary containers for one run. Each path is removed when dropped, so
/// an early return anywhere in the pipeline still cleans up.
pub struct TempMedia {
    pub video: Option<TempPath>,
    pub audio: Option<TempPath>,
}

impl TempMedia {
    pub fn for_plan(plan: &Plan) -> Result<Self> {
        let video = match plan.video {
            Some(_) => Some(temp_path(".avi")?),
            None => None,
        };
        let audio = match plan.audio {
            true => Some(temp_path(".wav")?),
            false => None,
        };
        Ok(Self { video, audio })
    }

    pub fn video_path(&self) -> Option<&Path> {
        self.video.as_deref()
    }

    pub fn audio_path(&self) -> Option<&Path> {
        self.audio.as_deref()
    }

    /// Remove both files now, logging rather than failing on errors.
    pub fn close(self) {
        for temp in [self.video, self.audio].into_iter().flatten() {
            let path = temp.to_path_buf();
            match temp.close() {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

fn temp_path(suffix: &str) -> Result<TempPath> {
    let file = Builder::new()
        .prefix("randmedia-")
        .suffix(suffix)
        .tempfile()
        .context("Failed to create temporary file")?;
    Ok(file.into_temp_path())
}

/// Generate the requested streams, convert them into `plan.output` and
/// remove the temporaries.
pub fn produce(plan: &Plan, options: &Options, rng: &mut StdRng) -> Result<RunReport> {
    let start = Instant::now();
    let layout = plan.layout();
    info!(?layout, duration = plan.duration, "Producing {}", plan.output.display());

    let temps = TempMedia::for_plan(plan)?;

    let video = match (plan.video, temps.video_path()) {
        (Some(spec), Some(path)) => {
            let frames = create_random_video(
                &options.ffmpeg,
                options.codec,
                spec,
                plan.duration,
                path,
                rng,
            )?;
            Some(VideoReport {
                width: spec.width,
                height: spec.height,
                fps: FPS,
                frames,
                codec: options.codec,
                fourcc: options.codec.fourcc().to_string(),
            })
        }
        _ => None,
    };

    let audio = match temps.audio_path() {
        Some(path) => {
            let samples = create_random_audio(plan.duration, path, rng)?;
            Some(AudioReport {
                sample_rate: SAMPLE_RATE,
                channels: audio::CHANNELS,
                bits_per_sample: audio::BITS_PER_SAMPLE,
                samples,
            })
        }
        None => None,
    };

    let status = convert(
        &options.ffmpeg,
        layout,
        temps.video_path(),
        temps.audio_path(),
        &plan.output,
    )?;
    temps.close();

    Ok(RunReport {
        output: plan.output.clone(),
        layout,
        seed: options.seed,
        video,
        audio,
        converter_exit_code: status.code(),
        converter_success: status.success(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}
