// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-pixel direction lookup table.
//!
//! The table is computed once from the sensor's beam intrinsics and then
//! shared read-only by every pipeline projecting scans of that sensor. Each
//! pixel stores a direction scaled to metres per millimetre of range and an
//! offset in metres, so projection is a single fused multiply-add per axis:
//!
//! ```text
//! point = range_mm * direction + offset
//! ```

use crate::lidar::Error;
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::{f64::consts::TAU, path::Path};

/// Millimetres to metres.
const RANGE_UNIT: f64 = 0.001;

/// Row-major 4×4 identity matrix.
const IDENTITY_4X4: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

fn identity_4x4() -> Vec<f64> {
    IDENTITY_4X4.to_vec()
}

/// Beam calibration as reported by the sensor metadata.
///
/// Angles are in degrees and transforms are row-major 4×4 matrices in
/// millimetres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeamIntrinsics {
    pub beam_altitude_angles: Vec<f64>,
    pub beam_azimuth_angles: Vec<f64>,
    #[serde(default = "identity_4x4")]
    pub beam_to_lidar_transform: Vec<f64>,
    /// Older firmware reports only this distance instead of a full
    /// `beam_to_lidar_transform`.
    #[serde(default)]
    pub lidar_origin_to_beam_origin_mm: Option<f64>,
    #[serde(default = "identity_4x4")]
    pub lidar_to_sensor_transform: Vec<f64>,
}

impl BeamIntrinsics {
    /// Load intrinsics from a JSON metadata file.
    ///
    /// Accepts either a bare intrinsics object or a full metadata document
    /// with a `beam_intrinsics` section (and optional `lidar_intrinsics`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let Some(section) = value.get("beam_intrinsics") else {
            return Ok(serde_json::from_value(value)?);
        };

        let mut intrinsics: BeamIntrinsics = serde_json::from_value(section.clone())?;
        if let Some(transform) = value
            .get("lidar_intrinsics")
            .and_then(|v| v.get("lidar_to_sensor_transform"))
        {
            intrinsics.lidar_to_sensor_transform = serde_json::from_value(transform.clone())?;
        }
        Ok(intrinsics)
    }

    /// Number of beams (rows).
    pub fn rows(&self) -> usize {
        self.beam_altitude_angles.len()
    }

    fn validate(&self) -> Result<(), Error> {
        if self.beam_altitude_angles.is_empty() {
            return Err(Error::Config("no beam altitude angles".to_string()));
        }
        if self.beam_azimuth_angles.len() != self.rows() {
            return Err(Error::Config(format!(
                "{} azimuth angles for {} beams",
                self.beam_azimuth_angles.len(),
                self.rows()
            )));
        }
        for (name, m) in [
            ("beam_to_lidar_transform", &self.beam_to_lidar_transform),
            ("lidar_to_sensor_transform", &self.lidar_to_sensor_transform),
        ] {
            if m.len() != 16 {
                return Err(Error::Config(format!(
                    "{} has {} elements, expected 16",
                    name,
                    m.len()
                )));
            }
        }
        Ok(())
    }

    /// Lidar to sensor frame as a homogeneous matrix.
    fn lidar_to_sensor(&self) -> Result<Matrix4<f64>, Error> {
        let m = &self.lidar_to_sensor_transform;
        if m.len() != 16 {
            return Err(Error::Config(format!(
                "lidar_to_sensor_transform has {} elements, expected 16",
                m.len()
            )));
        }
        Ok(Matrix4::from_row_slice(m))
    }

    /// Beam origin offset along the lidar x and z axes in millimetres.
    fn beam_origin(&self) -> (f64, f64) {
        match self.lidar_origin_to_beam_origin_mm {
            Some(n) if self.beam_to_lidar_transform == IDENTITY_4X4 => (n, 0.0),
            _ => (
                self.beam_to_lidar_transform[3],
                self.beam_to_lidar_transform[11],
            ),
        }
    }
}

/// Precomputed direction table (structure-of-arrays, `row * width + col`).
#[derive(Clone, Debug)]
pub struct XyzLut {
    width: usize,
    height: usize,
    dir_x: Vec<f32>,
    dir_y: Vec<f32>,
    dir_z: Vec<f32>,
    off_x: Vec<f32>,
    off_y: Vec<f32>,
    off_z: Vec<f32>,
}

impl XyzLut {
    /// Build the table for `width` columns per rotation.
    pub fn new(intrinsics: &BeamIntrinsics, width: usize) -> Result<Self, Error> {
        intrinsics.validate()?;
        if width == 0 {
            return Err(Error::Config("zero columns per rotation".to_string()));
        }

        let height = intrinsics.rows();
        let n = width * height;
        let mut lut = Self {
            width,
            height,
            dir_x: Vec::with_capacity(n),
            dir_y: Vec::with_capacity(n),
            dir_z: Vec::with_capacity(n),
            off_x: Vec::with_capacity(n),
            off_y: Vec::with_capacity(n),
            off_z: Vec::with_capacity(n),
        };

        let (bx, bz) = intrinsics.beam_origin();
        let beam_offset = bx.hypot(bz);
        let to_sensor = intrinsics.lidar_to_sensor()?;
        let rotation: Matrix3<f64> = to_sensor.fixed_view::<3, 3>(0, 0).into_owned();
        let translation: Vector3<f64> = to_sensor.fixed_view::<3, 1>(0, 3).into_owned();

        for row in 0..height {
            let azimuth = -intrinsics.beam_azimuth_angles[row].to_radians();
            let altitude = intrinsics.beam_altitude_angles[row].to_radians();

            for col in 0..width {
                let encoder = TAU * (1.0 - col as f64 / width as f64);
                let dir = Vector3::new(
                    (encoder + azimuth).cos() * altitude.cos(),
                    (encoder + azimuth).sin() * altitude.cos(),
                    altitude.sin(),
                );
                let offset = Vector3::new(bx * encoder.cos(), bx * encoder.sin(), bz)
                    - beam_offset * dir;

                let dir = rotation * dir * RANGE_UNIT;
                let offset = (rotation * offset + translation) * RANGE_UNIT;

                lut.dir_x.push(dir.x as f32);
                lut.dir_y.push(dir.y as f32);
                lut.dir_z.push(dir.z as f32);
                lut.off_x.push(offset.x as f32);
                lut.off_y.push(offset.y as f32);
                lut.off_z.push(offset.z as f32);
            }
        }

        Ok(lut)
    }

    /// Build a table from explicit per-pixel arrays.
    ///
    /// Directions are in metres per millimetre of range and offsets in metres.
    pub fn from_parts(
        width: usize,
        height: usize,
        direction: [Vec<f32>; 3],
        offset: [Vec<f32>; 3],
    ) -> Result<Self, Error> {
        let n = width * height;
        for axis in direction.iter().chain(offset.iter()) {
            if axis.len() != n {
                return Err(Error::GeometryMismatch {
                    expected: (width, height),
                    actual: (axis.len(), 1),
                });
            }
        }

        let [dir_x, dir_y, dir_z] = direction;
        let [off_x, off_y, off_z] = offset;
        Ok(Self {
            width,
            height,
            dir_x,
            dir_y,
            dir_z,
            off_x,
            off_y,
            off_z,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dir_x.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dir_x.is_empty()
    }

    /// Check the table against a `width × height` geometry.
    pub fn check_geometry(&self, width: usize, height: usize) -> Result<(), Error> {
        if self.width != width || self.height != height {
            return Err(Error::GeometryMismatch {
                expected: (self.width, self.height),
                actual: (width, height),
            });
        }
        Ok(())
    }

    pub fn direction(&self) -> (&[f32], &[f32], &[f32]) {
        (&self.dir_x, &self.dir_y, &self.dir_z)
    }

    pub fn offset(&self) -> (&[f32], &[f32], &[f32]) {
        (&self.off_x, &self.off_y, &self.off_z)
    }
}
