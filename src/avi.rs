//! Minimal uncompressed AVI writer.
//!
//! One video stream, `DIB ` handler, 24-bit `BI_RGB` frames stored bottom-up
//! in BGR order with each row padded to four bytes. Sizes and frame counts in
//! the headers are patched when the writer is finished.
//!
//! Plain RIFF AVI stores every size in 32 bits, so a file is capped just
//! under 4 GiB. The writer refuses any frame that would cross that limit.

use std::io::{Seek, SeekFrom, Write};

use anyhow::{anyhow, ensure, Context, Result};
use ndarray::ArrayView3;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const FRAME_CHUNK: &[u8; 4] = b"00db";
/// Bytes in front of the first frame chunk: RIFF header, `hdrl`, `movi` tag.
const HEADER_LEN: u64 = 224;
const INDEX_ENTRY_LEN: u64 = 16;
const MAX_RIFF_SIZE: u64 = u32::MAX as u64;

pub struct AviWriter<W: Write + Seek> {
    inner: W,
    width: u32,
    height: u32,
    frame_size: u32,
    max_riff_size: u64,
    /// (offset from the `movi` tag, chunk size) per frame, for `idx1`.
    index: Vec<(u32, u32)>,
    riff_size_pos: u64,
    total_frames_pos: u64,
    length_pos: u64,
    movi_size_pos: u64,
    movi_tag_pos: u64,
    row: Vec<u8>,
}

/// Bytes per stored row: three per pixel, rounded up to a multiple of four.
pub fn row_stride(width: u32) -> usize {
    (width as usize * 3 + 3) & !3
}

fn frame_size(width: u32, height: u32) -> Result<u32> {
    u32::try_from(row_stride(width) as u64 * height as u64)
        .map_err(|_| anyhow!("{}x{} frames are too large for an AVI chunk", width, height))
}

/// Value of the RIFF size field once `frames` frames and their index are
/// written, or `None` when that doesn't fit in a u64.
pub fn riff_size(width: u32, height: u32, frames: u64) -> Option<u64> {
    let chunk = 8 + row_stride(width) as u64 * height as u64;
    let per_frame = chunk.checked_add(INDEX_ENTRY_LEN)?;
    frames
        .checked_mul(per_frame)?
        .checked_add(HEADER_LEN)
}

/// Check up front that `frames` frames of `width`x`height` make a valid file.
pub fn check_fits(width: u32, height: u32, frames: u64) -> Result<()> {
    u16::try_from(width).context("AVI frame width must fit in 16 bits")?;
    u16::try_from(height).context("AVI frame height must fit in 16 bits")?;
    frame_size(width, height)?;
    let size = riff_size(width, height, frames).unwrap_or(u64::MAX);
    ensure!(
        size <= MAX_RIFF_SIZE,
        "{} frames of {}x{} need {} bytes, over the 4 GiB AVI limit",
        frames,
        width,
        height,
        size
    );
    Ok(())
}

impl<W: Write + Seek> AviWriter<W> {
    pub fn new(mut inner: W, width: u32, height: u32, fps: u32) -> Result<Self> {
        let stride = row_stride(width);
        let rc_width = u16::try_from(width).context("AVI frame width must fit in 16 bits")?;
        let rc_height = u16::try_from(height).context("AVI frame height must fit in 16 bits")?;
        let frame_size = frame_size(width, height)?;
        let riff_size_pos = inner.stream_position()? + 4;

        inner.write_all(b"RIFF")?;
        put_u32(&mut inner, 0)?;
        inner.write_all(b"AVI ")?;

        // hdrl: avih (8 + 56) + strl list (12 + strh 8 + 56 + strf 8 + 40)
        inner.write_all(b"LIST")?;
        put_u32(&mut inner, 4 + 64 + 12 + 64 + 48)?;
        inner.write_all(b"hdrl")?;

        inner.write_all(b"avih")?;
        put_u32(&mut inner, 56)?;
        put_u32(&mut inner, 1_000_000 / fps.max(1))?;
        put_u32(&mut inner, frame_size.saturating_mul(fps))?;
        put_u32(&mut inner, 0)?;
        put_u32(&mut inner, AVIF_HASINDEX)?;
        let total_frames_pos = inner.stream_position()?;
        put_u32(&mut inner, 0)?;
        put_u32(&mut inner, 0)?; // initial frames
        put_u32(&mut inner, 1)?; // streams
        put_u32(&mut inner, frame_size)?;
        put_u32(&mut inner, width)?;
        put_u32(&mut inner, height)?;
        inner.write_all(&[0; 16])?;

        inner.write_all(b"LIST")?;
        put_u32(&mut inner, 4 + 64 + 48)?;
        inner.write_all(b"strl")?;

        inner.write_all(b"strh")?;
        put_u32(&mut inner, 56)?;
        inner.write_all(b"vids")?;
        inner.write_all(b"DIB ")?;
        put_u32(&mut inner, 0)?; // flags
        put_u32(&mut inner, 0)?; // priority + language
        put_u32(&mut inner, 0)?; // initial frames
        put_u32(&mut inner, 1)?; // scale
        put_u32(&mut inner, fps)?; // rate
        put_u32(&mut inner, 0)?; // start
        let length_pos = inner.stream_position()?;
        put_u32(&mut inner, 0)?;
        put_u32(&mut inner, frame_size)?;
        put_u32(&mut inner, u32::MAX)?; // quality
        put_u32(&mut inner, 0)?; // sample size
        put_u16(&mut inner, 0)?;
        put_u16(&mut inner, 0)?;
        put_u16(&mut inner, rc_width)?;
        put_u16(&mut inner, rc_height)?;

        inner.write_all(b"strf")?;
        put_u32(&mut inner, 40)?;
        put_u32(&mut inner, 40)?;
        put_u32(&mut inner, width)?;
        put_u32(&mut inner, height)?; // positive: bottom-up
        put_u16(&mut inner, 1)?;
        put_u16(&mut inner, 24)?;
        put_u32(&mut inner, 0)?; // BI_RGB
        put_u32(&mut inner, frame_size)?;
        inner.write_all(&[0; 16])?;

        inner.write_all(b"LIST")?;
        let movi_size_pos = inner.stream_position()?;
        put_u32(&mut inner, 0)?;
        let movi_tag_pos = inner.stream_position()?;
        inner.write_all(b"movi")?;

        Ok(Self {
            inner,
            width,
            height,
            frame_size,
            max_riff_size: MAX_RIFF_SIZE,
            index: Vec::new(),
            riff_size_pos,
            total_frames_pos,
            length_pos,
            movi_size_pos,
            movi_tag_pos,
            row: vec![0; stride],
        })
    }

    /// Append one RGB frame laid out as (height, width, 3).
    pub fn write_frame(&mut self, frame: ArrayView3<u8>) -> Result<()> {
        let (rows, cols, channels) = frame.dim();
        ensure!(
            rows == self.height as usize && cols == self.width as usize && channels == 3,
            "Frame shape {:?} does not match {}x{}x3",
            frame.dim(),
            self.height,
            self.width
        );

        let chunk_size = self.frame_size;
        let pos = self.inner.stream_position()?;
        // this chunk plus an index that also covers it
        let riff_size = pos + 8 + chunk_size as u64 + 8
            + INDEX_ENTRY_LEN * (self.index.len() as u64 + 1)
            - (self.riff_size_pos + 4);
        ensure!(
            riff_size <= self.max_riff_size,
            "AVI would exceed the 4 GiB limit at frame {}",
            self.index.len() + 1
        );
        let offset = u32::try_from(pos - self.movi_tag_pos)?;
        self.inner.write_all(FRAME_CHUNK)?;
        put_u32(&mut self.inner, chunk_size)?;
        for row in frame.outer_iter().rev() {
            for (x, pixel) in row.outer_iter().enumerate() {
                self.row[x * 3] = pixel[2];
                self.row[x * 3 + 1] = pixel[1];
                self.row[x * 3 + 2] = pixel[0];
            }
            self.inner.write_all(&self.row)?;
        }
        self.index.push((offset, chunk_size));
        Ok(())
    }

    pub fn frames_written(&self) -> usize {
        self.index.len()
    }

    /// Write the index, patch the header counters and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        let movi_end = self.inner.stream_position()?;

        self.inner.write_all(b"idx1")?;
        put_u32(&mut self.inner, u32::try_from(self.index.len() as u64 * INDEX_ENTRY_LEN)?)?;
        for &(offset, size) in &self.index {
            self.inner.write_all(FRAME_CHUNK)?;
            put_u32(&mut self.inner, AVIIF_KEYFRAME)?;
            put_u32(&mut self.inner, offset)?;
            put_u32(&mut self.inner, size)?;
        }
        let end = self.inner.stream_position()?;
        let frames = u32::try_from(self.index.len())?;

        self.patch(self.riff_size_pos, u32::try_from(end - self.riff_size_pos - 4)?)?;
        self.patch(self.movi_size_pos, u32::try_from(movi_end - self.movi_tag_pos)?)?;
        self.patch(self.total_frames_pos, frames)?;
        self.patch(self.length_pos, frames)?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    #[cfg(test)]
    fn with_max_riff_size(mut self, max_riff_size: u64) -> Self {
        self.max_riff_size = max_riff_size;
        self
    }

    fn patch(&mut self, pos: u64, value: u32) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        put_u32(&mut self.inner, value)
    }
}

fn put_u32<W: Write>(w: &mut W, value: u32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn put_u16<W: Write>(w: &mut W, value: u16) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::io::Cursor;

    fn u32_at(data: &[u8], pos: usize) -> u32 {
        u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap())
    }

    fn write_frames(width: u32, height: u32, frames: &[Array3<u8>]) -> Vec<u8> {
        let mut writer = AviWriter::new(Cursor::new(Vec::new()), width, height, 30).unwrap();
        for frame in frames {
            writer.write_frame(frame.view()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Collect (tag, size, data offset) for every chunk inside `movi`.
    fn movi_chunks(data: &[u8]) -> Vec<([u8; 4], usize, usize)> {
        let movi = data.windows(4).position(|w| w == b"movi").unwrap();
        let movi_size = u32_at(data, movi - 4) as usize;
        let end = movi + movi_size;
        let mut pos = movi + 4;
        let mut chunks = vec![];
        while pos < end {
            let tag: [u8; 4] = data[pos..pos + 4].try_into().unwrap();
            let size = u32_at(data, pos + 4) as usize;
            chunks.push((tag, size, pos + 8));
            pos += 8 + size + (size & 1);
        }
        chunks
    }

    #[test]
    fn header_layout_and_counts() {
        let frames: Vec<_> = (0..5).map(|_| Array3::<u8>::zeros((48, 64, 3))).collect();
        let data = write_frames(64, 48, &frames);

        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"AVI ");
        assert_eq!(u32_at(&data, 4) as usize, data.len() - 8);
        assert_eq!(&data[24..28], b"avih");
        // dwTotalFrames, dwWidth, dwHeight
        assert_eq!(u32_at(&data, 48), 5);
        assert_eq!(u32_at(&data, 64), 64);
        assert_eq!(u32_at(&data, 68), 48);
        assert_eq!(&data[112..116], b"DIB ");
        // strh dwRate and dwLength
        assert_eq!(u32_at(&data, 132), 30);
        assert_eq!(u32_at(&data, 140), 5);
        assert_eq!(&data[212..216], b"LIST");
        assert_eq!(&data[220..224], b"movi");

        let chunks = movi_chunks(&data);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|(tag, size, _)| tag == b"00db" && *size == 64 * 48 * 3));

        let idx = data.windows(4).rposition(|w| w == b"idx1").unwrap();
        assert_eq!(u32_at(&data, idx + 4), 5 * 16);
        assert_eq!(idx + 8 + 5 * 16, data.len());
    }

    #[test]
    fn frames_are_stored_bottom_up_bgr() {
        let mut frame = Array3::<u8>::zeros((2, 2, 3));
        // top-left red, bottom-right blue
        frame[[0, 0, 0]] = 255;
        frame[[1, 1, 2]] = 200;
        let data = write_frames(2, 2, &[frame]);

        let (_, size, start) = movi_chunks(&data)[0];
        // 2 pixels * 3 bytes padded to 8 per row
        assert_eq!(size, 16);
        let pixels = &data[start..start + size];
        // first stored row is the bottom row; its second pixel is blue in BGR
        assert_eq!(&pixels[0..8], &[0, 0, 0, 200, 0, 0, 0, 0]);
        assert_eq!(&pixels[8..16], &[0, 0, 255, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn rejects_mismatched_frame() {
        let mut writer = AviWriter::new(Cursor::new(Vec::new()), 4, 4, 30).unwrap();
        let frame = Array3::<u8>::zeros((4, 5, 3));
        assert!(writer.write_frame(frame.view()).is_err());
        assert_eq!(writer.frames_written(), 0);
    }

    #[test]
    fn row_stride_pads_to_four_bytes() {
        assert_eq!(row_stride(64), 192);
        assert_eq!(row_stride(2), 8);
        assert_eq!(row_stride(5), 16);
    }

    /// Discards bytes but tracks position and length like a file would.
    #[derive(Default)]
    struct TrackingSink {
        pos: u64,
        len: u64,
    }

    impl Write for TrackingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.pos += buf.len() as u64;
            self.len = self.len.max(self.pos);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for TrackingSink {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.pos = match pos {
                SeekFrom::Start(p) => p,
                SeekFrom::Current(d) => self.pos.checked_add_signed(d).unwrap(),
                SeekFrom::End(d) => self.len.checked_add_signed(d).unwrap(),
            };
            Ok(self.pos)
        }
    }

    #[test]
    fn refuses_frames_past_the_size_limit() {
        let frame = Array3::<u8>::zeros((48, 64, 3));
        let limit = riff_size(64, 48, 3).unwrap();
        let mut writer = AviWriter::new(TrackingSink::default(), 64, 48, 30)
            .unwrap()
            .with_max_riff_size(limit);
        for _ in 0..3 {
            writer.write_frame(frame.view()).unwrap();
        }
        assert!(writer.write_frame(frame.view()).is_err());
        assert_eq!(writer.frames_written(), 3);

        // the refused frame left nothing behind, so the header is exact
        let sink = writer.finish().unwrap();
        assert_eq!(sink.len - 8, limit);
    }

    #[test]
    fn projected_size_matches_written_file() {
        let frames: Vec<_> = (0..4).map(|_| Array3::<u8>::zeros((3, 5, 3))).collect();
        let data = write_frames(5, 3, &frames);
        assert_eq!(riff_size(5, 3, 4), Some(data.len() as u64 - 8));
    }

    #[test]
    fn large_requests_are_rejected_up_front() {
        assert!(check_fits(64, 48, 60).is_ok());
        assert!(check_fits(1920, 1080, 30 * 24).is_err());
        assert!(check_fits(4096, 4096, 30 * 3).is_err());
        assert!(check_fits(70_000, 16, 1).is_err());
        assert!(check_fits(16, 70_000, 1).is_err());
        assert!(check_fits(16, 16, u64::MAX).is_err());
    }

    #[test]
    fn oversized_dimensions_fail_to_open() {
        assert!(AviWriter::new(TrackingSink::default(), 65_536, 2, 30).is_err());
        // fits rcFrame but one frame alone is over 4 GiB
        assert!(AviWriter::new(TrackingSink::default(), 65_535, 65_535, 30).is_err());
    }
}
