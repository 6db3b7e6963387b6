//! Frame capture
//!
//! [`FrameBuffer`] collects rendered frames in order and flushes them to a
//! video file at a fixed frame rate. The first appended frame fixes the
//! (height, width) of the recording. A successful flush drains the buffer, so
//! the next append starts a new recording; a failed one keeps every frame.
//!
//! ```no_run
//! use gymrig::capture::FrameBuffer;
//! use image::RgbImage;
//!
//! # fn main() -> gymrig::Result<()> {
//! let mut frames = FrameBuffer::new();
//! frames.append(RgbImage::new(64, 48))?;
//! frames.append(RgbImage::new(64, 48))?;
//! assert_eq!(frames.flush("clip.gif", 30)?, 2);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use image::RgbImage;

use crate::error::{Error, Result, Stage};

pub mod encode;

pub use encode::{
    convert_frame, gif_frame_delay_ms, writer_for_path, GifWriter, PixelLayout, VideoWriter,
};

/// Ordered, shape-checked frame sequence
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    frames: Vec<RgbImage>,
    shape: Option<(u32, u32)>,
    capacity: Option<usize>,
}

impl FrameBuffer {
    /// Unbounded buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer refusing more than `capacity` frames
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self { capacity: Some(capacity), ..Self::default() }
    }

    /// Append a frame
    ///
    /// Fails with [`Error::FrameShape`] if the frame's (height, width)
    /// differs from the first frame's, and with a state error once the
    /// capacity limit is reached.
    pub fn append(&mut self, frame: RgbImage) -> Result<()> {
        let actual = (frame.height(), frame.width());
        if let Some(expected) = self.shape {
            if expected != actual {
                return Err(Error::FrameShape { expected, actual });
            }
        }
        if let Some(capacity) = self.capacity {
            if self.frames.len() >= capacity {
                return Err(Error::state(
                    Stage::Capture,
                    format!("frame buffer is full ({capacity} frames)"),
                ));
            }
        }

        self.shape = Some(actual);
        self.frames.push(frame);
        Ok(())
    }

    /// Buffered frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frame is buffered
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// (height, width) fixed by the first frame, if any
    pub fn shape(&self) -> Option<(u32, u32)> {
        self.shape
    }

    /// Configured capacity limit
    pub fn capacity_limit(&self) -> Option<usize> {
        self.capacity
    }

    /// Buffered frames in append order
    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    /// Encode every buffered frame to `path` at `fps`
    ///
    /// The container follows the path's extension (see
    /// [`writer_for_path`]). An empty buffer writes nothing and returns 0.
    /// Returns the number of frames written.
    ///
    /// GIF stores frame delays in 10 ms units, so the delay is rounded to
    /// the nearest unit (see [`gif_frame_delay_ms`]): 30 fps plays back at
    /// about 33 fps, while rates dividing 100 (10, 20, 25, 50) are exact.
    pub fn flush(&mut self, path: impl AsRef<Path>, fps: u32) -> Result<usize> {
        let path = path.as_ref();
        check_fps(fps)?;
        if self.frames.is_empty() {
            tracing::debug!(path = %path.display(), "No frames buffered, nothing written");
            return Ok(0);
        }

        let mut writer = writer_for_path(path)?;
        let written = self.flush_with(writer.as_mut(), fps)?;
        tracing::info!(path = %path.display(), frames = written, fps, "Video written");
        Ok(written)
    }

    /// Encode every buffered frame with a caller-supplied writer
    ///
    /// The buffer is drained only once the writer has finished; if any
    /// writer call fails, every frame stays buffered for another attempt.
    pub fn flush_with(&mut self, writer: &mut dyn VideoWriter, fps: u32) -> Result<usize> {
        check_fps(fps)?;
        let Some((height, width)) = self.shape.filter(|_| !self.frames.is_empty()) else {
            return Ok(0);
        };

        let layout = writer.layout();
        writer.start(width, height, fps)?;
        for frame in &self.frames {
            writer.write_frame(&convert_frame(frame, layout))?;
        }
        writer.finish()?;

        let written = self.frames.len();
        self.frames.clear();
        self.shape = None;
        Ok(written)
    }
}

fn check_fps(fps: u32) -> Result<()> {
    if fps == 0 {
        return Err(Error::config(Stage::Capture, "fps must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use tempfile::tempdir;

    use super::*;

    /// Records what it receives
    #[derive(Default)]
    struct Recorder {
        started: Option<(u32, u32, u32)>,
        frames: Vec<Vec<u8>>,
        finished: bool,
    }

    impl VideoWriter for Recorder {
        fn layout(&self) -> PixelLayout {
            PixelLayout::Bgr
        }

        fn start(&mut self, width: u32, height: u32, fps: u32) -> Result<()> {
            self.started = Some((width, height, fps));
            Ok(())
        }

        fn write_frame(&mut self, pixels: &[u8]) -> Result<()> {
            self.frames.push(pixels.to_vec());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    /// Fails on the nth frame
    struct FailingWriter {
        fail_at: usize,
        seen: usize,
    }

    impl VideoWriter for FailingWriter {
        fn layout(&self) -> PixelLayout {
            PixelLayout::Rgb
        }

        fn start(&mut self, _width: u32, _height: u32, _fps: u32) -> Result<()> {
            Ok(())
        }

        fn write_frame(&mut self, _pixels: &[u8]) -> Result<()> {
            self.seen += 1;
            if self.seen == self.fail_at {
                return Err(Error::state(Stage::Capture, "disk full"));
            }
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, 0, 255 - value]))
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut buffer = FrameBuffer::new();
        buffer.append(solid(4, 3, 0)).unwrap();
        buffer.append(solid(4, 3, 1)).unwrap();

        let err = buffer.append(solid(3, 4, 2)).unwrap_err();
        assert!(matches!(err, Error::FrameShape { expected: (3, 4), actual: (4, 3) }));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_capacity_limit() {
        let mut buffer = FrameBuffer::with_capacity_limit(2);
        buffer.append(solid(1, 1, 0)).unwrap();
        buffer.append(solid(1, 1, 0)).unwrap();
        assert!(buffer.append(solid(1, 1, 0)).unwrap_err().is_state());
    }

    #[test]
    fn test_flush_with_reorders_channels_in_order() {
        let mut buffer = FrameBuffer::new();
        for value in [10, 20, 30] {
            buffer.append(solid(2, 1, value)).unwrap();
        }

        let mut recorder = Recorder::default();
        assert_eq!(buffer.flush_with(&mut recorder, 12).unwrap(), 3);

        assert_eq!(recorder.started, Some((2, 1, 12)));
        assert!(recorder.finished);
        let first_pixels: Vec<u8> = recorder.frames.iter().map(|f| f[2]).collect();
        assert_eq!(first_pixels, vec![10, 20, 30], "BGR puts red last, frames stay ordered");
        assert_eq!(recorder.frames[0][0], 245);
    }

    #[test]
    fn test_flush_drains_and_resets_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.gif");
        let mut buffer = FrameBuffer::new();
        buffer.append(solid(4, 4, 0)).unwrap();

        assert_eq!(buffer.flush(&path, 30).unwrap(), 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.shape(), None);

        let second = dir.path().join("again.gif");
        assert_eq!(buffer.flush(&second, 30).unwrap(), 0);
        assert!(!second.exists());

        // A new recording may use a different size
        buffer.append(solid(8, 2, 0)).unwrap();
        assert_eq!(buffer.shape(), Some((2, 8)));
    }

    #[test]
    fn test_empty_flush_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.gif");
        assert_eq!(FrameBuffer::new().flush(&path, 30).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_zero_fps_rejected() {
        let mut buffer = FrameBuffer::new();
        buffer.append(solid(1, 1, 0)).unwrap();
        let mut recorder = Recorder::default();
        assert!(buffer.flush_with(&mut recorder, 0).unwrap_err().is_configuration());
        assert_eq!(buffer.len(), 1, "frames kept on rejected flush");
    }

    #[test]
    fn test_failed_write_keeps_frames() {
        let mut buffer = FrameBuffer::new();
        for value in 0..5 {
            buffer.append(solid(3, 2, value)).unwrap();
        }

        let mut failing = FailingWriter { fail_at: 3, seen: 0 };
        let err = buffer.flush_with(&mut failing, 30).unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.shape(), Some((2, 3)));

        let mut recorder = Recorder::default();
        assert_eq!(buffer.flush_with(&mut recorder, 30).unwrap(), 5);
        assert_eq!(recorder.frames.len(), 5);
        assert!(buffer.is_empty());
    }
}
