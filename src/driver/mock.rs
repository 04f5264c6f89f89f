//! Simulated sensor head for development and tests without hardware.
//!
//! [`MockSensorDriver`] spawns one thread per sensor on `open`: the IMU
//! thread emits gravity-plus-noise samples at the configured rate, the camera
//! thread emits a moving synthetic stereo pattern at the configured frame
//! rate. Both run until `close` (or drop) and deliver through the same
//! callback seam a real driver would use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::info;

use crate::calibration::DeviceCalibration;
use crate::config::Settings;
use crate::data::{ImuSample, StereoFrame};
use crate::driver::{FrameCallback, HotplugCallback, ImuCallback, SensorDriver};
use crate::error::{AppResult, CollectError};

/// Simulated stereo-camera + IMU head.
#[derive(Default)]
pub struct MockSensorDriver {
    imu_callback: Option<ImuCallback>,
    frame_callback: Option<FrameCallback>,
    hotplug_callback: Option<HotplugCallback>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl MockSensorDriver {
    /// Create a closed mock head. Register callbacks, then call
    /// [`open`](SensorDriver::open).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorDriver for MockSensorDriver {
    fn set_imu_callback(&mut self, callback: ImuCallback) {
        self.imu_callback = Some(callback);
    }

    fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.frame_callback = Some(callback);
    }

    fn set_hotplug_callback(&mut self, callback: HotplugCallback) {
        self.hotplug_callback = Some(callback);
    }

    fn calibration(&self) -> AppResult<DeviceCalibration> {
        // The simulated head reports factory defaults.
        Ok(DeviceCalibration::default())
    }

    fn open(&mut self, settings: &Settings) -> AppResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectError::Driver("driver already open".to_string()));
        }
        let mut imu_callback = self
            .imu_callback
            .take()
            .ok_or_else(|| CollectError::Driver("IMU callback not registered".to_string()))?;
        let mut frame_callback = self
            .frame_callback
            .take()
            .ok_or_else(|| CollectError::Driver("frame callback not registered".to_string()))?;

        self.running.store(true, Ordering::SeqCst);
        let start = Instant::now();

        let imu_period = Duration::from_secs_f64(1.0 / f64::from(settings.imu_rate.max(1)));
        let running = Arc::clone(&self.running);
        self.threads.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            while running.load(Ordering::SeqCst) {
                let timestamp_ms = start.elapsed().as_secs_f64() * 1e3;
                let sample = ImuSample {
                    timestamp_ms,
                    // At rest: gravity on z, in units of g, plus sensor noise.
                    acc: [
                        rng.gen_range(-0.01..0.01),
                        rng.gen_range(-0.01..0.01),
                        1.0 + rng.gen_range(-0.01..0.01),
                    ],
                    gyr: [
                        rng.gen_range(-0.002..0.002),
                        rng.gen_range(-0.002..0.002),
                        rng.gen_range(-0.002..0.002),
                    ],
                };
                imu_callback(sample);
                thread::sleep(imu_period);
            }
        }));

        let frame_period = Duration::from_secs_f64(1.0 / f64::from(settings.fps.max(1)));
        // Both eyes side by side in one image.
        let width = settings.width * 2;
        let height = settings.height;
        let running = Arc::clone(&self.running);
        self.threads.push(thread::spawn(move || {
            let mut frame_index = 0u64;
            while running.load(Ordering::SeqCst) {
                let timestamp_ms = start.elapsed().as_secs_f64() * 1e3;
                let frame = StereoFrame::new(
                    timestamp_ms,
                    width,
                    height,
                    stereo_test_pattern(width, height, frame_index),
                );
                frame_callback(frame);
                frame_index += 1;
                thread::sleep(frame_period);
            }
        }));

        if let Some(hotplug) = &self.hotplug_callback {
            hotplug(true);
        }
        info!(
            imu_rate = settings.imu_rate,
            fps = settings.fps,
            width,
            height,
            "mock sensor head open"
        );
        Ok(())
    }

    fn close(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("mock driver thread panicked");
            }
        }
        if let Some(hotplug) = &self.hotplug_callback {
            hotplug(false);
        }
        info!("mock sensor head closed");
    }
}

impl Drop for MockSensorDriver {
    fn drop(&mut self) {
        self.close();
    }
}

/// Moving diagonal ramp, repeated per eye with a small horizontal disparity
/// so the halves differ the way a real stereo pair would.
fn stereo_test_pattern(width: u32, height: u32, frame_index: u64) -> Vec<u8> {
    const DISPARITY: u64 = 4;
    let w = width as u64;
    let half = w / 2;
    let shift = frame_index * 3;
    let mut data = Vec::with_capacity((width * height) as usize);
    for y in 0..u64::from(height) {
        for x in 0..w {
            let eye_x = if x < half { x } else { x - half + DISPARITY };
            data.push(((eye_x + y + shift) % 256) as u8);
        }
    }
    data
}
