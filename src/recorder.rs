//! Disk-writer pool draining the job queues.
//!
//! A [`Recorder`] owns three queues and the worker threads that drain them:
//! one thread appending IMU samples to `imu.txt`, one appending frame index
//! records to `image.txt`, and a pool of threads encoding stereo frames as
//! per-eye PNGs under `cam0/` and `cam1/`. Every worker loops on `pop()`
//! until the queue reports stopped-and-drained, then exits.
//!
//! Producers feed the queues through a cloneable [`RecorderHandle`];
//! [`Recorder::finish`] performs the flush-then-stop shutdown (drain barrier,
//! stop broadcast, join).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::data::{EyeImage, FrameInfo, ImuSample, StereoFrame, STANDARD_GRAVITY};
use crate::error::{AppResult, CollectError};
use crate::job_queue::JobQueue;

/// Snapshot of writer-pool activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderStats {
    /// IMU samples written to `imu.txt`.
    pub imu_samples: u64,
    /// Stereo frames written as PNG pairs.
    pub frames: u64,
    /// Records written to `image.txt`.
    pub index_records: u64,
    /// Events dropped because the pool was shutting down.
    pub dropped: u64,
    /// Failed disk writes (logged and skipped).
    pub write_errors: u64,
}

#[derive(Default)]
struct Counters {
    imu_samples: AtomicU64,
    frames: AtomicU64,
    index_records: AtomicU64,
    dropped: AtomicU64,
    write_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RecorderStats {
        RecorderStats {
            imu_samples: self.imu_samples.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            index_records: self.index_records.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Producer-side handle; hardware callbacks feed the queues through this.
#[derive(Clone)]
pub struct RecorderHandle {
    imu_queue: Arc<JobQueue<ImuSample>>,
    frame_queue: Arc<JobQueue<StereoFrame>>,
    index_queue: Arc<JobQueue<FrameInfo>>,
    counters: Arc<Counters>,
}

impl RecorderHandle {
    /// Hand an IMU sample to the writer pool.
    ///
    /// Blocks only while the IMU queue is full. Returns `false` if the pool
    /// is shutting down; the sample is counted as dropped, never blocked on.
    pub fn submit_imu(&self, sample: ImuSample) -> bool {
        if self.imu_queue.push(sample) {
            true
        } else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("IMU sample dropped during shutdown");
            false
        }
    }

    /// Hand a stereo frame to the writer pool, recording it in the image
    /// index as well.
    ///
    /// Blocks while the frame queue is full (backpressure on the camera
    /// callback). Returns `false` if the pool is shutting down.
    pub fn submit_frame(&self, frame: StereoFrame) -> bool {
        let info = FrameInfo {
            timestamp_ms: frame.timestamp_ms,
            image_name: frame.image_name(),
        };
        let indexed = self.index_queue.push(info);
        let queued = self.frame_queue.push(frame);
        if indexed && queued {
            true
        } else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("frame dropped during shutdown");
            false
        }
    }

    /// Current activity counters, as seen from the producer side.
    #[must_use]
    pub fn stats(&self) -> RecorderStats {
        self.counters.snapshot()
    }
}

/// Owner of the writer threads and their queues.
pub struct Recorder {
    handle: RecorderHandle,
    workers: Vec<JoinHandle<()>>,
    started_at: DateTime<Utc>,
}

impl Recorder {
    /// Create the output layout under `output_dir` (`imu.txt`, `image.txt`,
    /// `cam0/`, `cam1/`) and start the writer threads.
    ///
    /// `frame_writers` is the number of threads encoding PNG pairs; the IMU
    /// and index logs get one thread each.
    pub fn start(output_dir: &Path, settings: &Settings, frame_writers: usize) -> AppResult<Self> {
        let cam0_dir = output_dir.join("cam0");
        let cam1_dir = output_dir.join("cam1");
        fs::create_dir_all(&cam0_dir)?;
        fs::create_dir_all(&cam1_dir)?;

        let imu_file = File::create(output_dir.join("imu.txt"))?;
        let index_file = File::create(output_dir.join("image.txt"))?;

        let handle = RecorderHandle {
            imu_queue: Arc::new(JobQueue::bounded(settings.imu_queue_capacity)),
            frame_queue: Arc::new(JobQueue::bounded(settings.frame_queue_capacity)),
            index_queue: Arc::new(JobQueue::new()),
            counters: Arc::new(Counters::default()),
        };

        let mut workers = Vec::with_capacity(frame_writers + 2);
        {
            let queue = Arc::clone(&handle.imu_queue);
            let counters = Arc::clone(&handle.counters);
            workers.push(thread::spawn(move || imu_writer(imu_file, &queue, &counters)));
        }
        {
            let queue = Arc::clone(&handle.index_queue);
            let counters = Arc::clone(&handle.counters);
            workers.push(thread::spawn(move || {
                index_writer(index_file, &queue, &counters);
            }));
        }
        for _ in 0..frame_writers.max(1) {
            let queue = Arc::clone(&handle.frame_queue);
            let counters = Arc::clone(&handle.counters);
            let cam0_dir = cam0_dir.clone();
            let cam1_dir = cam1_dir.clone();
            workers.push(thread::spawn(move || {
                frame_writer(&cam0_dir, &cam1_dir, &queue, &counters);
            }));
        }

        info!(
            output_dir = %output_dir.display(),
            frame_writers = frame_writers.max(1),
            "recorder started"
        );
        Ok(Self {
            handle,
            workers,
            started_at: Utc::now(),
        })
    }

    /// Producer-side handle for the hardware callbacks.
    #[must_use]
    pub fn handle(&self) -> RecorderHandle {
        self.handle.clone()
    }

    /// Current activity counters.
    #[must_use]
    pub fn stats(&self) -> RecorderStats {
        self.handle.counters.snapshot()
    }

    /// Flush-then-stop shutdown.
    ///
    /// Drains every queue (`wait`), stops them, joins the writers and returns
    /// the final statistics. The caller must have closed the driver first;
    /// `wait` cannot return while producers keep pushing.
    pub fn finish(mut self) -> RecorderStats {
        self.handle.imu_queue.wait();
        self.handle.frame_queue.wait();
        self.handle.index_queue.wait();

        self.handle.imu_queue.stop();
        self.handle.frame_queue.stop();
        self.handle.index_queue.stop();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("writer thread panicked");
            }
        }

        let stats = self.stats();
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        info!(
            imu_samples = stats.imu_samples,
            frames = stats.frames,
            index_records = stats.index_records,
            dropped = stats.dropped,
            write_errors = stats.write_errors,
            duration_s = elapsed.num_milliseconds() as f64 / 1e3,
            "recording finished"
        );
        stats
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.handle.imu_queue.stop();
        self.handle.frame_queue.stop();
        self.handle.index_queue.stop();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("writer thread panicked");
            }
        }
    }
}

fn imu_writer(file: File, queue: &JobQueue<ImuSample>, counters: &Counters) {
    let mut out = BufWriter::new(file);
    if writeln!(
        out,
        "#IMU Data: timestamp(/ms) acc_x(m/s^2) acc_y(m/s^2) acc_z(m/s^2) gyr_x gyr_y gyr_z"
    )
    .is_err()
    {
        counters.write_errors.fetch_add(1, Ordering::Relaxed);
    }
    while let Some(sample) = queue.pop() {
        let result = writeln!(
            out,
            "{:.9} {:.9} {:.9} {:.9} {:.9} {:.9} {:.9}",
            sample.timestamp_ms,
            sample.acc[0] * STANDARD_GRAVITY,
            sample.acc[1] * STANDARD_GRAVITY,
            sample.acc[2] * STANDARD_GRAVITY,
            sample.gyr[0],
            sample.gyr[1],
            sample.gyr[2],
        );
        match result {
            Ok(()) => {
                counters.imu_samples.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(error = %e, "failed to write IMU sample");
                counters.write_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    if let Err(e) = out.flush() {
        error!(error = %e, "failed to flush IMU log");
        counters.write_errors.fetch_add(1, Ordering::Relaxed);
    }
}

fn index_writer(file: File, queue: &JobQueue<FrameInfo>, counters: &Counters) {
    let mut out = BufWriter::new(file);
    if writeln!(out, "#ImageInfo: timestamp(/ms) image_name").is_err() {
        counters.write_errors.fetch_add(1, Ordering::Relaxed);
    }
    while let Some(record) = queue.pop() {
        match writeln!(out, "{} {}", record.timestamp_ms, record.image_name) {
            Ok(()) => {
                counters.index_records.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(error = %e, "failed to write index record");
                counters.write_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    if let Err(e) = out.flush() {
        error!(error = %e, "failed to flush image index");
        counters.write_errors.fetch_add(1, Ordering::Relaxed);
    }
}

fn frame_writer(
    cam0_dir: &Path,
    cam1_dir: &Path,
    queue: &JobQueue<StereoFrame>,
    counters: &Counters,
) {
    while let Some(frame) = queue.pop() {
        match write_frame(&frame, cam0_dir, cam1_dir) {
            Ok(()) => {
                counters.frames.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(error = %e, "failed to write frame");
                counters.write_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn write_frame(frame: &StereoFrame, cam0_dir: &Path, cam1_dir: &Path) -> AppResult<()> {
    let name = frame.image_name();
    let (left, right) = frame.split()?;
    save_eye(left, cam0_dir.join(&name))?;
    save_eye(right, cam1_dir.join(&name))?;
    Ok(())
}

fn save_eye(eye: EyeImage, path: PathBuf) -> AppResult<()> {
    let img = image::GrayImage::from_raw(eye.width, eye.height, eye.data).ok_or_else(|| {
        CollectError::Frame(format!(
            "eye buffer does not match {}x{}",
            eye.width, eye.height
        ))
    })?;
    img.save_with_format(&path, image::ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writers_drain_backlog_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();
        let recorder = Recorder::start(dir.path(), &settings, 2).unwrap();
        let handle = recorder.handle();

        for i in 0..5 {
            assert!(handle.submit_imu(ImuSample {
                timestamp_ms: f64::from(i),
                acc: [0.0, 0.0, 1.0],
                gyr: [0.0; 3],
            }));
        }
        let frame = StereoFrame::new(100.0, 8, 4, vec![128; 32]);
        assert!(handle.submit_frame(frame));

        let stats = recorder.finish();
        assert_eq!(stats.imu_samples, 5);
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.index_records, 1);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.write_errors, 0);

        let imu_log = std::fs::read_to_string(dir.path().join("imu.txt")).unwrap();
        assert!(imu_log.starts_with("#IMU Data:"));
        assert_eq!(imu_log.lines().count(), 6);

        assert!(dir.path().join("cam0/100.png").exists());
        assert!(dir.path().join("cam1/100.png").exists());
    }

    #[test]
    fn test_submit_after_finish_reports_drop() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();
        let recorder = Recorder::start(dir.path(), &settings, 1).unwrap();
        let handle = recorder.handle();

        let _ = recorder.finish();

        assert!(!handle.submit_imu(ImuSample {
            timestamp_ms: 0.0,
            acc: [0.0; 3],
            gyr: [0.0; 3],
        }));
        assert_eq!(handle.counters.snapshot().dropped, 1);
    }
}
