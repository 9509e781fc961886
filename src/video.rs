use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::avi::{self, AviWriter};
use crate::media::FPS;

/// Codec tag of the temporary video container.
#[derive(ValueEnum, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum VideoCodec {
    /// MPEG-4 part 2 tagged XVID, encoded by ffmpeg
    Xvid,

    /// Uncompressed 24-bit frames, written in-process
    Raw,
}

impl VideoCodec {
    pub fn fourcc(&self) -> &'static str {
        match self {
            VideoCodec::Xvid => "XVID",
            VideoCodec::Raw => "DIB ",
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSpec {
    pub width: u32,
    pub height: u32,
}

/// Anything that accepts whole RGB frames in (height, width, 3) layout.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Array3<u8>) -> Result<()>;
}

impl<W: Write + std::io::Seek> FrameSink for AviWriter<W> {
    fn write_frame(&mut self, frame: &Array3<u8>) -> Result<()> {
        AviWriter::write_frame(self, frame.view())
    }
}

/// Packed rgb24 rows, top-down, as ffmpeg's rawvideo demuxer reads them.
struct RawPipe<W: Write>(W);

impl<W: Write> FrameSink for RawPipe<W> {
    fn write_frame(&mut self, frame: &Array3<u8>) -> Result<()> {
        let data = frame
            .as_slice()
            .ok_or_else(|| anyhow!("Frame is not contiguous"))?;
        self.0.write_all(data)?;
        Ok(())
    }
}

pub fn random_frame(rng: &mut StdRng, spec: VideoSpec) -> Result<Array3<u8>> {
    let (height, width) = (spec.height as usize, spec.width as usize);
    let mut data = vec![0u8; height * width * 3];
    rng.fill(&mut data[..]);
    Ok(Array3::from_shape_vec((height, width, 3), data)?)
}

pub fn frame_count(duration: u64) -> Result<u64> {
    (FPS as u64)
        .checked_mul(duration)
        .ok_or_else(|| anyhow!("Duration of {} seconds is too long", duration))
}

/// Fill `sink` with `FPS * duration` fresh random frames.
pub fn generate_frames<S: FrameSink>(
    sink: &mut S,
    rng: &mut StdRng,
    spec: VideoSpec,
    duration: u64,
) -> Result<u64> {
    let total = frame_count(duration)?;
    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})",
    )?);

    for _ in 0..total {
        let frame = random_frame(rng, spec)?;
        sink.write_frame(&frame)?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(total)
}

/// Write a random video of `duration` seconds to `path` as AVI.
#[instrument(skip(rng, ffmpeg))]
pub fn create_random_video(
    ffmpeg: &str,
    codec: VideoCodec,
    spec: VideoSpec,
    duration: u64,
    path: &Path,
    rng: &mut StdRng,
) -> Result<u64> {
    let frames = match codec {
        VideoCodec::Raw => write_raw_avi(spec, duration, path, rng)?,
        VideoCodec::Xvid => encode_xvid(ffmpeg, spec, duration, path, rng)?,
    };
    info!(
        frames,
        fourcc = codec.fourcc(),
        "Wrote random video to {}",
        path.display()
    );
    Ok(frames)
}

fn write_raw_avi(spec: VideoSpec, duration: u64, path: &Path, rng: &mut StdRng) -> Result<u64> {
    avi::check_fits(spec.width, spec.height, frame_count(duration)?)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = AviWriter::new(BufWriter::new(file), spec.width, spec.height, FPS)?;
    let frames = generate_frames(&mut writer, rng, spec, duration)?;
    debug!("Finishing AVI with {} frames", writer.frames_written());
    writer.finish()?;
    Ok(frames)
}

fn create_xvid_command(
    ffmpeg: &str,
    spec: VideoSpec,
    path: &Path,
) -> Result<FfmpegChild> {
    let command = FfmpegCommand::new_with_path(ffmpeg)
        .arg("-hide_banner")
        .args([
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", spec.width, spec.height),
            "-r",
            &FPS.to_string(),
        ])
        .input("-")
        .args(["-c:v", "mpeg4", "-vtag", "XVID", "-q:v", "2", "-f", "avi"])
        .overwrite()
        .output(path)
        .spawn()
        .with_context(|| format!("Failed to launch {}", ffmpeg))?;
    Ok(command)
}

/// Frames go to ffmpeg's stdin from a scoped thread while this thread drains
/// the child's event stream, so neither pipe can fill up and stall.
fn encode_xvid(
    ffmpeg: &str,
    spec: VideoSpec,
    duration: u64,
    path: &Path,
    rng: &mut StdRng,
) -> Result<u64> {
    let mut child = create_xvid_command(ffmpeg, spec, path)?;
    let stdin = child
        .take_stdin()
        .ok_or_else(|| anyhow!("ffmpeg stdin is not piped"))?;

    let frames = thread::scope(|s| -> Result<u64> {
        let writer = s.spawn(move || -> Result<u64> {
            let mut pipe = RawPipe(BufWriter::new(stdin));
            let frames = generate_frames(&mut pipe, rng, spec, duration)?;
            pipe.0.flush()?;
            Ok(frames)
        });

        child.iter()?.for_each(|e| match e {
            FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, e) => warn!("ffmpeg: {}", e),
            FfmpegEvent::Error(e) => warn!("ffmpeg: {}", e),
            FfmpegEvent::Progress(p) => debug!(frame = p.frame, time = %p.time, "Encoding"),
            _ => {}
        });

        writer
            .join()
            .map_err(|_| anyhow!("Frame writer thread panicked"))?
    });

    let status = child.wait()?;
    let frames = frames.context("Failed to stream frames to ffmpeg")?;
    if !status.success() {
        return Err(anyhow!("ffmpeg failed to encode video: {}", status));
    }
    Ok(frames)
}
