//! Hardware driver seam.
//!
//! The capture pipeline treats the sensor head as an external collaborator
//! behind the [`SensorDriver`] trait. A driver owns its delivery threads and
//! invokes the registered callbacks once per event; callbacks are expected to
//! hand the payload straight to a job queue. When a push reports shutdown the
//! callback must drop the event rather than keep the driver thread blocked:
//! stalling hardware delivery desynchronizes the device.

use crate::calibration::DeviceCalibration;
use crate::config::Settings;
use crate::data::{ImuSample, StereoFrame};
use crate::error::AppResult;

pub mod mock;

pub use mock::MockSensorDriver;

/// Callback invoked once per IMU sample, on a driver-owned thread.
pub type ImuCallback = Box<dyn FnMut(ImuSample) + Send>;

/// Callback invoked once per stereo frame, on a driver-owned thread.
pub type FrameCallback = Box<dyn FnMut(StereoFrame) + Send>;

/// Callback invoked when the head is plugged in (`true`) or removed
/// (`false`).
pub type HotplugCallback = Box<dyn Fn(bool) + Send + Sync>;

/// A stereo-camera + IMU sensor head.
pub trait SensorDriver {
    /// Register the IMU sample callback. Must be called before
    /// [`open`](Self::open).
    fn set_imu_callback(&mut self, callback: ImuCallback);

    /// Register the stereo frame callback. Must be called before
    /// [`open`](Self::open).
    fn set_frame_callback(&mut self, callback: FrameCallback);

    /// Register the hotplug notification callback.
    fn set_hotplug_callback(&mut self, callback: HotplugCallback);

    /// Read the device calibration stored on the head.
    fn calibration(&self) -> AppResult<DeviceCalibration>;

    /// Start delivery. Callbacks fire on driver-owned threads until
    /// [`close`](Self::close).
    fn open(&mut self, settings: &Settings) -> AppResult<()>;

    /// Stop delivery and join the driver threads. Idempotent.
    fn close(&mut self);
}
