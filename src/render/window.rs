use anyhow::Result;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use opencv::core::{Mat, Vec3b};
use opencv::prelude::*;

/// Preview window backed by minifb
pub struct MinifbRenderer {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl MinifbRenderer {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![0u32; width * height],
            width,
            height,
        })
    }

    /// Closed, or Esc held
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// Edge-triggered key press since the last `update`
    pub fn is_key_pressed(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }

    /// Copy a BGR Mat into the buffer. Larger frames are cropped.
    pub fn draw_frame(&mut self, frame: &Mat) -> Result<()> {
        self.draw_frame_at(frame, 0, 0)
    }

    /// Same, with the frame's top-left corner at (x_off, y_off)
    pub fn draw_frame_at(&mut self, frame: &Mat, x_off: usize, y_off: usize) -> Result<()> {
        let frame_width = frame.cols() as usize;
        let frame_height = frame.rows() as usize;
        let rows = self.height.saturating_sub(y_off).min(frame_height);
        let cols = self.width.saturating_sub(x_off).min(frame_width);

        for y in 0..rows {
            for x in 0..cols {
                let pixel = frame.at_2d::<Vec3b>(y as i32, x as i32)?;
                let r = pixel[2] as u32;
                let g = pixel[1] as u32;
                let b = pixel[0] as u32;
                self.buffer[(y + y_off) * self.width + x + x_off] = (r << 16) | (g << 8) | b;
            }
        }

        Ok(())
    }

    pub fn update(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }
}
