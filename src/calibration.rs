//! Device calibration load/save.
//!
//! The sensor head stores stereo camera intrinsics/extrinsics and IMU noise
//! parameters in its flash; at the start of a session they are written next
//! to the captured data as `calibration.txt` so downstream consumers can
//! interpret the recording. The on-disk format is a labeled, whitespace
//! separated text file:
//!
//! ```text
//! #Indemind Calibration File
//! cam0:
//! width: 640
//! height: 400
//! T_BS:
//! <4 rows of 4>
//! R:
//! <3 rows of 3>
//! ...
//! IMU:
//! a_max: 176
//! ...
//! ```

use std::fmt::Write as _;
use std::path::Path;
use std::str::SplitWhitespace;

use thiserror::Error;
use tracing::debug;

/// Errors raised while reading or writing a calibration file.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// The file could not be read or written.
    #[error("calibration file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The leading `#...` header line is missing.
    #[error("missing calibration file header line")]
    MissingHeader,

    /// A section or field label was not where the format requires it.
    #[error("expected '{expected}' in calibration file, found '{found}'")]
    UnexpectedLabel {
        /// The label the format requires at this position.
        expected: &'static str,
        /// The token actually read.
        found: String,
    },

    /// The file ended before a section was complete.
    #[error("calibration file ended early while reading '{section}'")]
    UnexpectedEnd {
        /// The field or matrix being read.
        section: &'static str,
    },

    /// A token could not be parsed as a number.
    #[error("invalid number '{token}' while reading '{section}'")]
    InvalidNumber {
        /// The offending token.
        token: String,
        /// The field or matrix being read.
        section: &'static str,
    },
}

const HEADER: &str = "#Indemind Calibration File";

const IDENTITY_4X4: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Calibration of one camera of the stereo pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCalibration {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Body-to-sensor transform, 4x4.
    pub t_bs: [[f64; 4]; 4],
    /// Rectification rotation, 3x3.
    pub r: [[f64; 3]; 3],
    /// Projection matrix after rectification, 3x4.
    pub p: [[f64; 4]; 3],
    /// Intrinsic matrix, 3x3.
    pub k: [[f64; 3]; 3],
    /// Distortion coefficients.
    pub d: [f64; 4],
}

impl Default for CameraCalibration {
    fn default() -> Self {
        Self {
            width: 640,
            height: 400,
            t_bs: IDENTITY_4X4,
            r: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            p: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            k: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            d: [0.0; 4],
        }
    }
}

/// IMU noise model and mounting calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuCalibration {
    /// Acceleration saturation \[m/s^2\].
    pub a_max: f64,
    /// Gyro saturation \[rad/s\].
    pub g_max: f64,
    /// Gyro noise density \[rad/s/sqrt(Hz)\].
    pub sigma_g_c: f64,
    /// Accelerometer noise density \[m/s^2/sqrt(Hz)\].
    pub sigma_a_c: f64,
    /// Gyro bias prior \[rad/s\].
    pub sigma_bg: f64,
    /// Accelerometer bias prior \[m/s^2\].
    pub sigma_ba: f64,
    /// Gyro drift noise density \[rad/s^2/sqrt(Hz)\].
    pub sigma_gw_c: f64,
    /// Accelerometer drift noise density \[m/s^2/sqrt(Hz)\].
    pub sigma_aw_c: f64,
    /// Bias reversion time constant \[s\].
    pub tau: f64,
    /// Earth's acceleration due to gravity \[m/s^2\].
    pub g: f64,
    /// Accelerometer bias \[m/s^2\].
    pub a0: [f64; 4],
    /// Body-to-sensor transform, 4x4.
    pub t_bs: [[f64; 4]; 4],
    /// Accelerometer scale/misalignment, 3x4.
    pub acc: [[f64; 4]; 3],
    /// Gyroscope scale/misalignment, 3x4.
    pub gyr: [[f64; 4]; 3],
}

impl Default for ImuCalibration {
    fn default() -> Self {
        Self {
            a_max: 176.0,
            g_max: 7.8,
            sigma_g_c: 12.0e-4,
            sigma_a_c: 8.0e-3,
            sigma_bg: 0.03,
            sigma_ba: 0.1,
            sigma_gw_c: 4.0e-6,
            sigma_aw_c: 4.0e-5,
            tau: 3600.0,
            g: 9.81007,
            a0: [0.0; 4],
            t_bs: IDENTITY_4X4,
            acc: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            gyr: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }
}

/// Complete calibration of the sensor head: both cameras plus the IMU.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceCalibration {
    /// Left camera.
    pub cam0: CameraCalibration,
    /// Right camera.
    pub cam1: CameraCalibration,
    /// Inertial unit.
    pub imu: ImuCalibration,
}

impl DeviceCalibration {
    /// Write the calibration to `path` in the on-disk text format.
    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        let mut out = String::new();
        let _ = writeln!(out, "{HEADER}");
        write_camera(&mut out, "cam0:", &self.cam0);
        write_camera(&mut out, "cam1:", &self.cam1);
        write_imu(&mut out, &self.imu);
        std::fs::write(path, out)?;
        debug!(path = %path.display(), "calibration saved");
        Ok(())
    }

    /// Load a calibration previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let content = std::fs::read_to_string(path)?;
        let mut lines = content.splitn(2, '\n');
        let header = lines.next().unwrap_or("");
        if !header.starts_with('#') {
            return Err(CalibrationError::MissingHeader);
        }
        let body = lines.next().unwrap_or("");
        let mut tokens = body.split_whitespace();

        let cam0 = read_camera(&mut tokens, "cam0:")?;
        let cam1 = read_camera(&mut tokens, "cam1:")?;
        let imu = read_imu(&mut tokens)?;
        debug!(path = %path.display(), "calibration loaded");
        Ok(Self { cam0, cam1, imu })
    }
}

fn write_rows<const C: usize>(out: &mut String, label: &str, rows: &[[f64; C]]) {
    out.push_str(label);
    out.push('\n');
    for row in rows {
        let mut first = true;
        for value in row {
            if !first {
                out.push(' ');
            }
            let _ = write!(out, "{value}");
            first = false;
        }
        out.push('\n');
    }
}

fn write_camera(out: &mut String, label: &str, cam: &CameraCalibration) {
    let _ = writeln!(out, "{label}");
    let _ = writeln!(out, "width: {}", cam.width);
    let _ = writeln!(out, "height: {}", cam.height);
    write_rows(out, "T_BS:", &cam.t_bs);
    write_rows(out, "R:", &cam.r);
    write_rows(out, "P:", &cam.p);
    write_rows(out, "K:", &cam.k);
    write_rows(out, "D:", &[cam.d]);
}

fn write_imu(out: &mut String, imu: &ImuCalibration) {
    let _ = writeln!(out, "IMU:");
    let _ = writeln!(out, "a_max: {}", imu.a_max);
    let _ = writeln!(out, "g_max: {}", imu.g_max);
    let _ = writeln!(out, "sigma_g_c: {}", imu.sigma_g_c);
    let _ = writeln!(out, "sigma_a_c: {}", imu.sigma_a_c);
    let _ = writeln!(out, "sigma_bg: {}", imu.sigma_bg);
    let _ = writeln!(out, "sigma_ba: {}", imu.sigma_ba);
    let _ = writeln!(out, "sigma_gw_c: {}", imu.sigma_gw_c);
    let _ = writeln!(out, "sigma_aw_c: {}", imu.sigma_aw_c);
    let _ = writeln!(out, "tau: {}", imu.tau);
    let _ = writeln!(out, "g: {}", imu.g);
    write_rows(out, "a0:", &[imu.a0]);
    write_rows(out, "T_BS:", &imu.t_bs);
    write_rows(out, "Acc:", &imu.acc);
    write_rows(out, "Gyr:", &imu.gyr);
}

fn take_label(
    tokens: &mut SplitWhitespace<'_>,
    expected: &'static str,
) -> Result<(), CalibrationError> {
    match tokens.next() {
        Some(token) if token == expected => Ok(()),
        Some(token) => Err(CalibrationError::UnexpectedLabel {
            expected,
            found: token.to_string(),
        }),
        None => Err(CalibrationError::UnexpectedEnd { section: expected }),
    }
}

fn take_value(
    tokens: &mut SplitWhitespace<'_>,
    section: &'static str,
) -> Result<f64, CalibrationError> {
    let token = tokens
        .next()
        .ok_or(CalibrationError::UnexpectedEnd { section })?;
    token
        .parse()
        .map_err(|_| CalibrationError::InvalidNumber {
            token: token.to_string(),
            section,
        })
}

fn take_row<const C: usize>(
    tokens: &mut SplitWhitespace<'_>,
    section: &'static str,
) -> Result<[f64; C], CalibrationError> {
    let mut row = [0.0; C];
    for value in &mut row {
        *value = take_value(tokens, section)?;
    }
    Ok(row)
}

fn take_rows<const R: usize, const C: usize>(
    tokens: &mut SplitWhitespace<'_>,
    label: &'static str,
) -> Result<[[f64; C]; R], CalibrationError> {
    take_label(tokens, label)?;
    let mut rows = [[0.0; C]; R];
    for row in &mut rows {
        *row = take_row(tokens, label)?;
    }
    Ok(rows)
}

fn take_scalar(
    tokens: &mut SplitWhitespace<'_>,
    label: &'static str,
) -> Result<f64, CalibrationError> {
    take_label(tokens, label)?;
    take_value(tokens, label)
}

fn read_camera(
    tokens: &mut SplitWhitespace<'_>,
    label: &'static str,
) -> Result<CameraCalibration, CalibrationError> {
    take_label(tokens, label)?;
    let width = take_scalar(tokens, "width:")? as u32;
    let height = take_scalar(tokens, "height:")? as u32;
    let t_bs = take_rows::<4, 4>(tokens, "T_BS:")?;
    let r = take_rows::<3, 3>(tokens, "R:")?;
    let p = take_rows::<3, 4>(tokens, "P:")?;
    let k = take_rows::<3, 3>(tokens, "K:")?;
    let [d] = take_rows::<1, 4>(tokens, "D:")?;
    Ok(CameraCalibration {
        width,
        height,
        t_bs,
        r,
        p,
        k,
        d,
    })
}

fn read_imu(tokens: &mut SplitWhitespace<'_>) -> Result<ImuCalibration, CalibrationError> {
    take_label(tokens, "IMU:")?;
    let a_max = take_scalar(tokens, "a_max:")?;
    let g_max = take_scalar(tokens, "g_max:")?;
    let sigma_g_c = take_scalar(tokens, "sigma_g_c:")?;
    let sigma_a_c = take_scalar(tokens, "sigma_a_c:")?;
    let sigma_bg = take_scalar(tokens, "sigma_bg:")?;
    let sigma_ba = take_scalar(tokens, "sigma_ba:")?;
    let sigma_gw_c = take_scalar(tokens, "sigma_gw_c:")?;
    let sigma_aw_c = take_scalar(tokens, "sigma_aw_c:")?;
    let tau = take_scalar(tokens, "tau:")?;
    let g = take_scalar(tokens, "g:")?;
    let [a0] = take_rows::<1, 4>(tokens, "a0:")?;
    let t_bs = take_rows::<4, 4>(tokens, "T_BS:")?;
    let acc = take_rows::<3, 4>(tokens, "Acc:")?;
    let gyr = take_rows::<3, 4>(tokens, "Gyr:")?;
    Ok(ImuCalibration {
        a_max,
        g_max,
        sigma_g_c,
        sigma_a_c,
        sigma_bg,
        sigma_ba,
        sigma_gw_c,
        sigma_aw_c,
        tau,
        g,
        a0,
        t_bs,
        acc,
        gyr,
    })
}
