// src/render.rs

//! Slowly drifting solid-color fill of every configured output.

use crate::config::AnimationConfig;
use crate::modeset::OutputRegistry;
use log::{debug, trace};
use std::thread;
use std::time::Duration;

/// One color channel walking up or down by random steps, turning around
/// instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Channel {
    value: u8,
    up: bool,
    max_step: u8,
}

impl Channel {
    fn step(&mut self, rng: &mut fastrand::Rng) {
        let delta = rng.u8(..self.max_step);
        let next = if self.up {
            self.value.wrapping_add(delta)
        } else {
            self.value.wrapping_sub(delta)
        };
        if (self.up && next < self.value) || (!self.up && next > self.value) {
            self.up = !self.up;
        } else {
            self.value = next;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gradient {
    rng: fastrand::Rng,
    red: Channel,
    green: Channel,
    blue: Channel,
}

impl Gradient {
    pub fn new() -> Self {
        Self::with_rng(fastrand::Rng::new())
    }

    pub fn with_rng(mut rng: fastrand::Rng) -> Self {
        let mut channel = |max_step| Channel {
            value: rng.u8(..u8::MAX),
            up: true,
            max_step,
        };
        let (red, green, blue) = (channel(20), channel(10), channel(5));
        Self {
            rng,
            red,
            green,
            blue,
        }
    }

    /// Advances to the next color and returns it as XRGB8888.
    pub fn next_pixel(&mut self) -> u32 {
        self.red.step(&mut self.rng);
        self.green.step(&mut self.rng);
        self.blue.step(&mut self.rng);
        self.pixel()
    }

    pub fn pixel(&self) -> u32 {
        (u32::from(self.red.value) << 16)
            | (u32::from(self.green.value) << 8)
            | u32::from(self.blue.value)
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self::new()
    }
}

/// Fills the visible `width`x`height` area of a buffer with rows `stride`
/// bytes apart and `bpp` bits per pixel. Each pixel gets the low bytes of
/// `color` in little-endian order. Padding past each row's last pixel is left
/// untouched.
pub fn fill(pixels: &mut [u8], width: u32, height: u32, stride: u32, bpp: u32, color: u32) {
    let bytes_per_pixel = (bpp as usize).div_ceil(8).min(4);
    let row_bytes = width as usize * bytes_per_pixel;
    let stride = stride as usize;
    if bytes_per_pixel == 0 || stride == 0 || stride < row_bytes {
        return;
    }
    let bytes = color.to_le_bytes();
    for row in pixels.chunks_mut(stride).take(height as usize) {
        let visible = row_bytes.min(row.len());
        for px in row[..visible].chunks_exact_mut(bytes_per_pixel) {
            px.copy_from_slice(&bytes[..bytes_per_pixel]);
        }
    }
}

/// Runs the color animation over every output for the configured number of
/// frames.
pub fn animate(registry: &mut OutputRegistry, settings: &AnimationConfig) {
    let mut gradient = Gradient::new();
    let delay = Duration::from_millis(settings.frame_delay_ms);
    debug!(
        "Animating {} outputs for {} frames ({:?} per frame)",
        registry.len(),
        settings.frames,
        delay
    );

    for frame in 0..settings.frames {
        let color = gradient.next_pixel();
        trace!("Frame {}: color {:#08x}", frame, color);
        for output in registry.iter_mut() {
            let fb = &mut output.framebuffer;
            let (width, height, stride, bpp) = (fb.width(), fb.height(), fb.stride(), fb.bpp());
            fill(fb.pixels_mut(), width, height, stride, bpp, color);
        }
        thread::sleep(delay);
    }
}
