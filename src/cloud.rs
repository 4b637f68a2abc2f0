// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Fixed-geometry point cloud buffer.
//!
//! Points are stored in a structure-of-arrays (SoA) layout with one entry per
//! scan pixel, ordered `row * width + column`. The geometry is decided at
//! construction and never changes, so the buffer can be reused for every
//! rotation without reallocating.
//!
//! # Memory Layout
//!
//! - `x`, `y`, `z`: 3D coordinates in metres as f32
//! - `intensity`: signal photons as f32
//! - `t`: nanoseconds between the scan timestamp and the column timestamp
//! - `reflectivity`, `ambient`: calibrated reflectivity and near-IR as u16
//! - `ring`: beam (row) index
//! - `range`: measured range in millimetres

use crate::transform::Transform;
use nalgebra::{Matrix3, Vector3};

#[derive(Debug, Clone)]
pub struct PointCloud {
    width: usize,
    height: usize,
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    intensity: Vec<f32>,
    t: Vec<u32>,
    reflectivity: Vec<u16>,
    ring: Vec<u16>,
    ambient: Vec<u16>,
    range: Vec<u32>,
}

impl PointCloud {
    /// Create a zeroed cloud of `width × height` points.
    ///
    /// Memory is allocated once at construction.
    pub fn new(width: usize, height: usize) -> Self {
        let n = width * height;
        Self {
            width,
            height,
            x: vec![0.0; n],
            y: vec![0.0; n],
            z: vec![0.0; n],
            intensity: vec![0.0; n],
            t: vec![0; n],
            reflectivity: vec![0; n],
            ring: vec![0; n],
            ambient: vec![0; n],
            range: vec![0; n],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of points, always `width * height`.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    #[inline]
    pub fn x(&self) -> &[f32] {
        &self.x
    }

    #[inline]
    pub fn y(&self) -> &[f32] {
        &self.y
    }

    #[inline]
    pub fn z(&self) -> &[f32] {
        &self.z
    }

    #[inline]
    pub fn intensity(&self) -> &[f32] {
        &self.intensity
    }

    #[inline]
    pub fn t(&self) -> &[u32] {
        &self.t
    }

    #[inline]
    pub fn reflectivity(&self) -> &[u16] {
        &self.reflectivity
    }

    #[inline]
    pub fn ring(&self) -> &[u16] {
        &self.ring
    }

    #[inline]
    pub fn ambient(&self) -> &[u16] {
        &self.ambient
    }

    #[inline]
    pub fn range(&self) -> &[u32] {
        &self.range
    }

    /// Point `index` as `(x, y, z)`.
    #[inline]
    pub fn point(&self, index: usize) -> (f32, f32, f32) {
        (self.x[index], self.y[index], self.z[index])
    }

    /// Mutable access to every column at once, for bulk population.
    pub(crate) fn fields_mut(&mut self) -> FieldsMut<'_> {
        FieldsMut {
            x: &mut self.x,
            y: &mut self.y,
            z: &mut self.z,
            intensity: &mut self.intensity,
            t: &mut self.t,
            reflectivity: &mut self.reflectivity,
            ring: &mut self.ring,
            ambient: &mut self.ambient,
            range: &mut self.range,
        }
    }

    /// Apply a rigid transform to every point in place.
    ///
    /// Attributes and ordering are untouched. Points at the origin (no
    /// return) are moved like any other point so the cloud stays dense.
    pub fn transform(&mut self, transform: &Transform) {
        let isometry = transform.isometry();
        let rotation: Matrix3<f32> = isometry.rotation.to_rotation_matrix().into_inner().cast();
        let translation: Vector3<f32> = isometry.translation.vector.cast();

        for ((x, y), z) in self
            .x
            .iter_mut()
            .zip(self.y.iter_mut())
            .zip(self.z.iter_mut())
        {
            let p = rotation * Vector3::new(*x, *y, *z) + translation;
            (*x, *y, *z) = (p.x, p.y, p.z);
        }
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Simultaneous mutable borrows of every [`PointCloud`] column.
pub(crate) struct FieldsMut<'a> {
    pub x: &'a mut [f32],
    pub y: &'a mut [f32],
    pub z: &'a mut [f32],
    pub intensity: &'a mut [f32],
    pub t: &'a mut [u32],
    pub reflectivity: &'a mut [u16],
    pub ring: &'a mut [u16],
    pub ambient: &'a mut [u16],
    pub range: &'a mut [u32],
}
