//! Capture configuration management.
//!
//! Settings are loaded from a TOML file and then passed through
//! [`Settings::normalize`], which coerces unsupported values onto the modes
//! the sensor head actually offers instead of failing the whole session.

use std::path::Path;

use config::Config;
use serde::Deserialize;
use tracing::warn;

use crate::error::AppResult;

/// Capture settings for one recording session.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Per-eye image width in pixels. The head supports 640 and 1280.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Image height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Camera frame rate in Hz. Supported: 25, 50, 100, 200 (200 only at
    /// 640 width).
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// IMU sample rate in Hz, at most 1000.
    #[serde(default = "default_imu_rate", alias = "imu_freq")]
    pub imu_rate: u32,

    /// Capacity of the stereo frame queue. Bounded so that a lagging writer
    /// pool applies backpressure to the camera callback instead of letting
    /// frames accumulate without limit.
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,

    /// Capacity of the IMU sample queue.
    #[serde(default = "default_imu_queue_capacity")]
    pub imu_queue_capacity: usize,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    400
}

fn default_fps() -> u32 {
    50
}

fn default_imu_rate() -> u32 {
    200
}

fn default_frame_queue_capacity() -> usize {
    64
}

fn default_imu_queue_capacity() -> usize {
    1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            imu_rate: default_imu_rate(),
            frame_queue_capacity: default_frame_queue_capacity(),
            imu_queue_capacity: default_imu_queue_capacity(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let s = Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        Ok(s.try_deserialize()?)
    }

    /// Coerce the settings onto modes the sensor head supports.
    ///
    /// Each coercion is logged; the rules mirror the device firmware:
    /// only 640/1280 widths exist, 200 fps requires the 640 mode, and the
    /// IMU tops out at 1000 Hz.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.width != 640 && self.width != 1280 {
            warn!(width = self.width, "unsupported width, falling back to 640");
            self.width = 640;
        }
        if !matches!(self.fps, 25 | 50 | 100 | 200) {
            warn!(fps = self.fps, "unsupported frame rate, falling back to 50");
            self.fps = 50;
        }
        if self.fps == 200 && self.width != 640 {
            warn!("200 fps is only available at 640 width, using 100");
            self.fps = 100;
        }
        if self.imu_rate > 1000 {
            warn!(imu_rate = self.imu_rate, "IMU rate capped at 1000 Hz");
            self.imu_rate = 1000;
        }
        self
    }
}
