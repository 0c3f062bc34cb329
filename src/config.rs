// src/config.rs

//! Run parameters.
//!
//! Nothing is read from disk or the environment; the structs only carry the
//! defaults the program runs with, grouped the way they are consumed. Serde
//! derives let the effective configuration be dumped for debugging.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::modeset::PixelFormat;

/// Global configuration instance.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::default);

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Which device to drive.
    pub device: DeviceConfig,
    /// Layout of the buffers allocated for each output.
    pub framebuffer: PixelFormat,
    /// Timing of the color animation.
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    /// DRM card node, overridable by the first command-line argument.
    pub path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            path: PathBuf::from("/dev/dri/card0"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnimationConfig {
    /// Number of frames drawn before restoring the display.
    pub frames: u32,
    /// Pause after each frame, in milliseconds.
    pub frame_delay_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        AnimationConfig {
            frames: 50,
            frame_delay_ms: 100,
        }
    }
}
