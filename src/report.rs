use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::convert::Layout;
use crate::video::VideoCodec;

#[derive(Debug, Serialize)]
pub struct VideoReport {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: u64,
    pub codec: VideoCodec,
    pub fourcc: String,
}

#[derive(Debug, Serialize)]
pub struct AudioReport {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub samples: u64,
}

/// Summary of one run, written with `--report`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub output: PathBuf,
    pub layout: Layout,
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioReport>,
    pub converter_exit_code: Option<i32>,
    pub converter_success: bool,
    pub elapsed_ms: u64,
}

pub fn export(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    info!("Report saved to {}", path.display());
    Ok(())
}
