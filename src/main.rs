//! CLI entry point for the capture tool.
//!
//! Wires the sensor driver callbacks to the recorder queues, runs until the
//! requested duration elapses (or Enter is pressed), then performs the
//! orderly shutdown: close the driver first so no new events arrive, then
//! drain and stop the writer pool.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vio_collect::config::Settings;
use vio_collect::driver::{MockSensorDriver, SensorDriver};
use vio_collect::recorder::Recorder;

#[derive(Parser)]
#[command(name = "vio-collect")]
#[command(about = "Record stereo camera + IMU data to disk", long_about = None)]
struct Cli {
    /// Directory to save the captured data
    #[arg(short, long, default_value = "./")]
    directory: PathBuf,

    /// Capture configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Number of threads writing image data
    #[arg(short = 'n', long, default_value_t = 4)]
    num_threads: usize,

    /// Stop after this many seconds instead of waiting for Enter
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?
        .normalize();
    tracing::info!(
        width = settings.width,
        height = settings.height,
        fps = settings.fps,
        imu_rate = settings.imu_rate,
        "capture configuration"
    );

    let mut driver = MockSensorDriver::new();

    // Save the on-device calibration next to the recording.
    let calibration = driver
        .calibration()
        .context("failed to read device calibration")?;
    std::fs::create_dir_all(&cli.directory)
        .with_context(|| format!("failed to create {}", cli.directory.display()))?;
    let calibration_path = cli.directory.join("calibration.txt");
    calibration
        .save(&calibration_path)
        .with_context(|| format!("failed to save {}", calibration_path.display()))?;

    let recorder = Recorder::start(&cli.directory, &settings, cli.num_threads)
        .context("failed to start recorder")?;

    let imu_handle = recorder.handle();
    driver.set_imu_callback(Box::new(move |sample| {
        imu_handle.submit_imu(sample);
    }));
    let frame_handle = recorder.handle();
    driver.set_frame_callback(Box::new(move |frame| {
        frame_handle.submit_frame(frame);
    }));
    driver.set_hotplug_callback(Box::new(|arrived| {
        if arrived {
            tracing::info!("sensor head connected");
        } else {
            tracing::info!("sensor head removed");
        }
    }));

    driver.open(&settings).context("failed to open sensor head")?;

    match cli.duration {
        Some(seconds) => {
            tracing::info!(seconds, "recording");
            thread::sleep(Duration::from_secs(seconds));
        }
        None => {
            println!("Recording. Press Enter to stop.");
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("failed to read stdin")?;
        }
    }

    // No new events after this point; the queues then drain completely.
    driver.close();
    let stats = recorder.finish();

    println!(
        "Captured {} frames and {} IMU samples ({} dropped, {} write errors)",
        stats.frames, stats.imu_samples, stats.dropped, stats.write_errors
    );
    Ok(())
}
