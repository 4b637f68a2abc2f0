// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common error type and clock helpers shared by every stage of the pipeline.

use edgefirst_schemas::{builtin_interfaces::Time, serde_cdr};
use std::fmt;

/// Common error type for point cloud operations
///
/// Frame transform failures are not represented here: they are a normal
/// per-rotation result, see [`crate::transform::TransformUnavailable`].
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// System time error
    SystemTime(std::time::SystemTimeError),
    /// Calibration metadata could not be parsed
    Json(serde_json::Error),
    /// CDR encoding or decoding failed
    Cdr(serde_cdr::Error),
    /// Configuration error
    Config(String),
    /// Point geometry disagrees between the direction table, the scan and
    /// the cloud buffer (expected, actual) as columns × rows.
    GeometryMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Column measurement id outside of the rotation width
    TooManyColumns(usize),
    /// Column carries a different number of rows than the scan height
    UnsupportedRows(usize),
    /// Publishing a message failed
    Transport(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::SystemTime(err) => write!(f, "system time error: {}", err),
            Error::Json(err) => write!(f, "metadata error: {}", err),
            Error::Cdr(err) => write!(f, "cdr error: {}", err),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::GeometryMismatch { expected, actual } => write!(
                f,
                "geometry mismatch: expected {}x{} got {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
            Error::TooManyColumns(cols) => write!(f, "too many columns: {}", cols),
            Error::UnsupportedRows(rows) => write!(f, "unsupported number of rows: {}", rows),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(err: std::time::SystemTimeError) -> Self {
        Error::SystemTime(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<serde_cdr::Error> for Error {
    fn from(err: serde_cdr::Error) -> Self {
        Error::Cdr(err)
    }
}

/// Get current timestamp in nanoseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH)?;
    Ok(duration.as_nanos() as u64)
}

/// Convert nanoseconds into a message timestamp.
///
/// Times past the `i32` seconds range saturate to the latest representable
/// time instead of wrapping negative.
pub fn to_time(nanos: u64) -> Time {
    match i32::try_from(nanos / 1_000_000_000) {
        Ok(sec) => Time {
            sec,
            nanosec: (nanos % 1_000_000_000) as u32,
        },
        Err(_) => Time {
            sec: i32::MAX,
            nanosec: 999_999_999,
        },
    }
}

/// Convert a message timestamp into nanoseconds, clamping negative times to 0.
pub fn from_time(time: &Time) -> u64 {
    if time.sec < 0 {
        return 0;
    }
    time.sec as u64 * 1_000_000_000 + time.nanosec as u64
}
