//! Video writers and per-frame channel conversion
//!
//! A [`VideoWriter`] declares the [`PixelLayout`] it consumes; frames are
//! converted from the renderer's RGB order before they reach it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{
    codecs::gif::{GifEncoder, Repeat},
    Delay, Frame, RgbImage, RgbaImage,
};

use crate::error::{Error, MissingCause, Result, Stage};

/// Byte order of one pixel as a writer expects it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Red, green, blue (renderer order)
    Rgb,
    /// Blue, green, red
    Bgr,
    /// Red, green, blue, opaque alpha
    Rgba,
}

impl PixelLayout {
    /// Bytes per pixel
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb | PixelLayout::Bgr => 3,
            PixelLayout::Rgba => 4,
        }
    }
}

/// Re-pack an RGB frame into `layout`
pub fn convert_frame(frame: &RgbImage, layout: PixelLayout) -> Vec<u8> {
    match layout {
        PixelLayout::Rgb => frame.as_raw().clone(),
        PixelLayout::Bgr => frame.pixels().flat_map(|p| [p[2], p[1], p[0]]).collect(),
        PixelLayout::Rgba => frame.pixels().flat_map(|p| [p[0], p[1], p[2], u8::MAX]).collect(),
    }
}

/// Sink for an ordered sequence of equally sized frames
pub trait VideoWriter {
    /// Pixel layout expected by [`VideoWriter::write_frame`]
    fn layout(&self) -> PixelLayout;

    /// Fix frame size and rate; called once before the first frame
    fn start(&mut self, width: u32, height: u32, fps: u32) -> Result<()>;

    /// Append one frame of `width * height * layout.channels()` bytes
    fn write_frame(&mut self, pixels: &[u8]) -> Result<()>;

    /// Finalize the container
    fn finish(&mut self) -> Result<()>;
}

/// Writer for a path, chosen by its extension
///
/// Only `.gif` is available; other containers report the missing encoder.
pub fn writer_for_path(path: &Path) -> Result<Box<dyn VideoWriter>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "gif" => Ok(Box::new(GifWriter::new(path))),
        other => Err(Error::missing(
            Stage::Capture,
            format!("video encoder for '.{other}'"),
            MissingCause::NotInstalled,
            "only animated GIF output is built in; write to a .gif path or pass a custom \
             VideoWriter to FrameBuffer::flush_with",
        )),
    }
}

/// Per-frame delay a GIF can represent for `fps`, in milliseconds
///
/// GIF delays count hundredths of a second, so `1000 / fps` is rounded to
/// the nearest 10 ms, never below 10 ms.
pub fn gif_frame_delay_ms(fps: u32) -> u32 {
    let centiseconds = (100 + fps / 2) / fps.max(1);
    centiseconds.max(1) * 10
}

/// Looping animated GIF
///
/// Frames are held in memory; nothing touches the output path until
/// [`VideoWriter::finish`] has encoded the whole animation.
pub struct GifWriter {
    path: PathBuf,
    size: Option<(u32, u32)>,
    delay: Delay,
    frames: Vec<Frame>,
    finished: bool,
}

impl GifWriter {
    /// Writer targeting `path`
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            size: None,
            delay: Delay::from_numer_denom_ms(gif_frame_delay_ms(30), 1),
            frames: Vec::new(),
            finished: false,
        }
    }
}

impl VideoWriter for GifWriter {
    fn layout(&self) -> PixelLayout {
        PixelLayout::Rgba
    }

    fn start(&mut self, width: u32, height: u32, fps: u32) -> Result<()> {
        if fps == 0 {
            return Err(Error::config(Stage::Capture, "fps must be positive"));
        }
        let delay_ms = gif_frame_delay_ms(fps);
        if u64::from(delay_ms) * u64::from(fps) != 1000 {
            tracing::warn!(
                fps,
                delay_ms,
                effective_fps = 1000.0 / delay_ms as f32,
                "GIF delays are multiples of 10 ms; playback rate is approximate"
            );
        }
        self.size = Some((width, height));
        self.delay = Delay::from_numer_denom_ms(delay_ms, 1);
        Ok(())
    }

    fn write_frame(&mut self, pixels: &[u8]) -> Result<()> {
        let Some((width, height)) = self.size else {
            return Err(Error::state(Stage::Capture, "write_frame called before start"));
        };
        let buffer = RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
            Error::config(
                Stage::Capture,
                format!("frame has {} bytes, expected {}", pixels.len(), width * height * 4),
            )
        })?;
        self.frames.push(Frame::from_parts(buffer, 0, 0, self.delay));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::state(Stage::Capture, "GIF writer already finished"));
        }

        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            encoder.set_repeat(Repeat::Infinite)?;
            encoder.encode_frames(self.frames.drain(..))?;
        }

        // Write beside the target and rename, so a failed write never leaves
        // a truncated animation at `path`
        let partial = self.path.with_extension("gif.partial");
        fs::write(&partial, &bytes).map_err(|e| {
            Error::io(Stage::Capture, format!("writing {}", partial.display()), e)
        })?;
        fs::rename(&partial, &self.path).map_err(|e| {
            Error::io(Stage::Capture, format!("moving {} into place", self.path.display()), e)
        })?;
        self.finished = true;
        Ok(())
    }
}
