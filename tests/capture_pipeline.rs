//! End-to-end capture through the mock driver into a temp directory.
//!
//! Exercises the full pipeline: driver callback threads push into the queues,
//! the writer pool drains them to disk, and the flush-then-stop shutdown
//! loses nothing that was accepted.

use std::fs;
use std::thread;
use std::time::Duration;

use tempfile::tempdir;

use vio_collect::calibration::DeviceCalibration;
use vio_collect::config::Settings;
use vio_collect::driver::{MockSensorDriver, SensorDriver};
use vio_collect::recorder::Recorder;

fn capture_settings() -> Settings {
    Settings {
        width: 32,
        height: 16,
        fps: 100,
        imu_rate: 500,
        ..Settings::default()
    }
}

#[test]
fn test_capture_session_writes_all_outputs() {
    let dir = tempdir().expect("tempdir");
    let settings = capture_settings();

    let mut driver = MockSensorDriver::new();
    let calibration = driver.calibration().expect("mock calibration");
    let calibration_path = dir.path().join("calibration.txt");
    calibration
        .save(&calibration_path)
        .expect("calibration save");

    let recorder = Recorder::start(dir.path(), &settings, 2).expect("recorder start");
    let imu_handle = recorder.handle();
    driver.set_imu_callback(Box::new(move |sample| {
        imu_handle.submit_imu(sample);
    }));
    let frame_handle = recorder.handle();
    driver.set_frame_callback(Box::new(move |frame| {
        frame_handle.submit_frame(frame);
    }));

    driver.open(&settings).expect("driver open");
    thread::sleep(Duration::from_millis(300));
    driver.close();
    let stats = recorder.finish();

    assert!(stats.imu_samples > 0, "no IMU samples captured");
    assert!(stats.frames > 0, "no frames captured");
    assert_eq!(stats.frames, stats.index_records);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.write_errors, 0);

    // IMU log: header plus one line per sample.
    let imu_log = fs::read_to_string(dir.path().join("imu.txt")).expect("imu.txt");
    assert!(imu_log.starts_with("#IMU Data:"));
    assert_eq!(imu_log.lines().count() as u64, stats.imu_samples + 1);

    // Image index: header plus one record per frame, and every named image
    // exists for both eyes.
    let index = fs::read_to_string(dir.path().join("image.txt")).expect("image.txt");
    assert!(index.starts_with("#ImageInfo:"));
    assert_eq!(index.lines().count() as u64, stats.frames + 1);
    for record in index.lines().skip(1) {
        let name = record
            .split_whitespace()
            .nth(1)
            .expect("record has a file name");
        assert!(dir.path().join("cam0").join(name).exists());
        assert!(dir.path().join("cam1").join(name).exists());
    }

    let cam0_count = fs::read_dir(dir.path().join("cam0")).expect("cam0").count();
    assert_eq!(cam0_count as u64, stats.frames);

    // The saved calibration reads back identically.
    let loaded = DeviceCalibration::load(&calibration_path).expect("calibration load");
    assert_eq!(loaded, calibration);
}

#[test]
fn test_callbacks_drop_cleanly_after_shutdown() {
    let dir = tempdir().expect("tempdir");
    let settings = capture_settings();

    let mut driver = MockSensorDriver::new();
    let recorder = Recorder::start(dir.path(), &settings, 1).expect("recorder start");
    let handle = recorder.handle();
    let imu_handle = recorder.handle();
    driver.set_imu_callback(Box::new(move |sample| {
        imu_handle.submit_imu(sample);
    }));
    let frame_handle = recorder.handle();
    driver.set_frame_callback(Box::new(move |frame| {
        frame_handle.submit_frame(frame);
    }));

    driver.open(&settings).expect("driver open");
    thread::sleep(Duration::from_millis(100));

    // Tear the recorder down while the driver is still delivering: the
    // callbacks' pushes must fail fast and be counted as drops, never leave
    // a driver thread blocked.
    drop(recorder);
    thread::sleep(Duration::from_millis(100));
    driver.close();

    assert!(handle.stats().dropped > 0, "late events were not counted");
}
