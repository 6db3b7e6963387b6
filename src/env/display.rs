//! Console display for [`RenderMode::Human`](super::RenderMode::Human)
//!
//! Frames are downscaled onto a console [`Screen`] and printed after every
//! step. Each character cell holds two pixel rows: the upper half block takes
//! the top pixel as foreground and the bottom pixel as background.

use console_engine::{pixel, screen::Screen, Color};
use image::{imageops::FilterType, RgbImage};

const HALF_BLOCK: char = '▀';

/// Console-backed frame display
#[derive(Debug)]
pub struct ConsoleDisplay {
    max_columns: u32,
    frames_shown: usize,
}

impl ConsoleDisplay {
    /// Display at most `max_columns` characters wide
    pub fn new(max_columns: u32) -> Self {
        Self { max_columns: max_columns.max(1), frames_shown: 0 }
    }

    /// Number of frames printed so far
    pub fn frames_shown(&self) -> usize {
        self.frames_shown
    }

    /// Lay out one frame as a console screen, preserving its aspect ratio
    pub fn to_screen(&self, frame: &RgbImage) -> Screen {
        let (width, height) = frame.dimensions();
        let columns = width.clamp(1, self.max_columns);
        let rows = ((height as u64 * columns as u64 / width.max(1) as u64) as u32).max(2);
        let scaled = image::imageops::resize(frame, columns, rows, FilterType::Nearest);

        let mut screen = Screen::new_empty(columns, rows.div_ceil(2));
        screen.clear();
        for y in (0..rows).step_by(2) {
            for x in 0..columns {
                let top = scaled.get_pixel(x, y).0;
                let bottom = if y + 1 < rows { scaled.get_pixel(x, y + 1).0 } else { top };
                screen.set_pxl(
                    x as i32,
                    (y / 2) as i32,
                    pixel::pxl_fbg(HALF_BLOCK, rgb(top), rgb(bottom)),
                );
            }
        }
        screen
    }

    /// Print one frame to standard output
    pub fn show(&mut self, frame: &RgbImage) {
        self.to_screen(frame).draw();
        self.frames_shown += 1;
    }
}

impl Default for ConsoleDisplay {
    fn default() -> Self {
        Self::new(80)
    }
}

fn rgb([r, g, b]: [u8; 3]) -> Color {
    Color::Rgb { r, g, b }
}
