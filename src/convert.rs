use std::path::Path;
use std::process::ExitStatus;

use anyhow::{Context, Result};
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

/// Which streams end up in the output file.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    Both,
    VideoOnly,
    AudioOnly,
}

/// Converter arguments after the common flags. Video is always stream-copied
/// and audio is always encoded to AAC.
pub fn conversion_args(
    layout: Layout,
    video: Option<&Path>,
    audio: Option<&Path>,
    output: &Path,
) -> Vec<String> {
    let path = |p: Option<&Path>| p.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
    let mut args = vec![];
    match layout {
        Layout::Both => args.extend([
            "-i".to_string(),
            path(video),
            "-i".to_string(),
            path(audio),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
        ]),
        Layout::VideoOnly => args.extend([
            "-i".to_string(),
            path(video),
            "-c:v".to_string(),
            "copy".to_string(),
            "-an".to_string(),
        ]),
        Layout::AudioOnly => args.extend([
            "-i".to_string(),
            path(audio),
            "-c:a".to_string(),
            "aac".to_string(),
            "-vn".to_string(),
        ]),
    }
    args.push(output.to_string_lossy().into_owned());
    args
}

fn create_ffmpeg_command(ffmpeg: &str, args: &[String]) -> Result<FfmpegChild> {
    let command = FfmpegCommand::new_with_path(ffmpeg)
        .arg("-hide_banner")
        .overwrite()
        .args(args)
        .spawn()
        .with_context(|| format!("Failed to launch {}", ffmpeg))?;
    Ok(command)
}

/// Run the converter once and wait for it. A non-zero exit is logged and
/// handed back, never turned into an error.
#[instrument(skip(ffmpeg))]
pub fn convert(
    ffmpeg: &str,
    layout: Layout,
    video: Option<&Path>,
    audio: Option<&Path>,
    output: &Path,
) -> Result<ExitStatus> {
    let args = conversion_args(layout, video, audio, output);
    debug!("ffmpeg args: {:?}", args);

    let mut child = create_ffmpeg_command(ffmpeg, &args)?;
    child.iter()?.for_each(|e| match e {
        FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, e) => error!("ffmpeg: {}", e),
        FfmpegEvent::Log(LogLevel::Warning, e) => warn!("ffmpeg: {}", e),
        FfmpegEvent::Error(e) => error!("ffmpeg: {}", e),
        FfmpegEvent::Progress(p) => debug!(frame = p.frame, time = %p.time, "Converting"),
        _ => {}
    });
    let status = child.wait()?;

    if status.success() {
        info!("Wrote {}", output.display());
    } else {
        warn!("ffmpeg exited with {}; {} may be missing", status, output.display());
    }
    Ok(status)
}
