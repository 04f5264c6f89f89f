//! Sensor payload types moved through the job queues.
//!
//! These are plain owned values: a payload is pushed by a driver callback and
//! popped by a writer thread, transferring ownership at the queue boundary.

use crate::error::{AppResult, CollectError};

/// Gravitational acceleration used to scale raw accelerometer readings
/// (reported in units of g) to m/s^2 on write.
pub const STANDARD_GRAVITY: f64 = 9.8;

/// A single inertial measurement delivered by the IMU callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Capture timestamp in milliseconds.
    pub timestamp_ms: f64,
    /// Accelerometer reading, in units of g.
    pub acc: [f64; 3],
    /// Gyroscope reading, in rad/s.
    pub gyr: [f64; 3],
}

/// Index record for one captured frame: the timestamp plus the image file
/// name shared by both eyes.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInfo {
    /// Capture timestamp in milliseconds.
    pub timestamp_ms: f64,
    /// File name of the per-eye images under `cam0/` and `cam1/`.
    pub image_name: String,
}

/// A side-by-side stereo frame as delivered by the camera callback.
///
/// Both eyes are packed into one 8-bit grayscale image: the left eye occupies
/// the left half of the columns, the right eye the right half.
#[derive(Debug, Clone)]
pub struct StereoFrame {
    /// Capture timestamp in milliseconds.
    pub timestamp_ms: f64,
    /// Width of the combined image in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major 8-bit grayscale pixels, `width * height` bytes.
    pub data: Vec<u8>,
}

/// One eye cropped out of a [`StereoFrame`].
#[derive(Debug, Clone)]
pub struct EyeImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major 8-bit grayscale pixels.
    pub data: Vec<u8>,
}

impl StereoFrame {
    /// Create a frame from raw grayscale bytes.
    pub fn new(timestamp_ms: f64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            timestamp_ms,
            width,
            height,
            data,
        }
    }

    /// File name both eye images are stored under, derived from the
    /// millisecond timestamp.
    #[must_use]
    pub fn image_name(&self) -> String {
        format!("{}.png", self.timestamp_ms as i64)
    }

    /// Crop the frame into its left and right eyes.
    ///
    /// The left eye spans the columns up to one short of the split boundary;
    /// the boundary column belongs to neither eye in the capture format. The
    /// right eye spans the full right half.
    pub fn split(&self) -> AppResult<(EyeImage, EyeImage)> {
        let w = self.width as usize;
        let h = self.height as usize;
        if self.data.len() != w * h {
            return Err(CollectError::Frame(format!(
                "frame data is {} bytes, expected {} for {}x{}",
                self.data.len(),
                w * h,
                self.width,
                self.height
            )));
        }

        let half = w / 2;
        let left_width = half.saturating_sub(1);
        let mut left = Vec::with_capacity(left_width * h);
        let mut right = Vec::with_capacity((w - half) * h);
        for row in self.data.chunks_exact(w) {
            left.extend_from_slice(&row[..left_width]);
            right.extend_from_slice(&row[half..]);
        }

        Ok((
            EyeImage {
                width: left_width as u32,
                height: self.height,
                data: left,
            },
            EyeImage {
                width: (w - half) as u32,
                height: self.height,
                data: right,
            },
        ))
    }
}
