// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PointCloud2 message formatting.
//!
//! Clouds are published organised (`height` rows by `width` columns) with a
//! packed little-endian 30-byte point:
//!
//! ```text
//! ┌───────┬───────┬───────┬───────────┬───────┬────────┬──────┬─────────┬───────┐
//! │ x:f32 │ y:f32 │ z:f32 │ intensity │ t:u32 │ reflect│ ring │ ambient │ range │
//! │ 4B    │ 4B    │ 4B    │ f32 4B    │ 4B    │ u16 2B │ 2B   │ u16 2B  │ u32 4B│
//! └───────┴───────┴───────┴───────────┴───────┴────────┴──────┴─────────┴───────┘
//! ```

use crate::{cloud::PointCloud, lidar::to_time};
use edgefirst_schemas::{
    sensor_msgs::{PointCloud2, PointField},
    std_msgs::Header,
};
use tracing::instrument;

/// Bytes per packed point.
pub const POINT_STEP: usize = 30;

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
/// All variants are defined for completeness, even if not all are currently
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

fn field(name: &str, offset: u32, datatype: PointFieldType) -> PointField {
    PointField {
        name: String::from(name),
        offset,
        datatype: datatype as u8,
        count: 1,
    }
}

/// Field layout of the packed point.
pub fn cloud_fields() -> Vec<PointField> {
    vec![
        field("x", 0, PointFieldType::FLOAT32),
        field("y", 4, PointFieldType::FLOAT32),
        field("z", 8, PointFieldType::FLOAT32),
        field("intensity", 12, PointFieldType::FLOAT32),
        field("t", 16, PointFieldType::UINT32),
        field("reflectivity", 20, PointFieldType::UINT16),
        field("ring", 22, PointFieldType::UINT16),
        field("ambient", 24, PointFieldType::UINT16),
        field("range", 26, PointFieldType::UINT32),
    ]
}

/// Pack every point of `cloud` into `out`.
///
/// # Panics
///
/// Panics if `out` is smaller than `POINT_STEP * cloud.len()`.
#[inline(never)]
pub fn format_points_into(cloud: &PointCloud, out: &mut [u8]) {
    let n_points = cloud.len();
    assert!(out.len() >= POINT_STEP * n_points);

    let (x, y, z) = (cloud.x(), cloud.y(), cloud.z());
    let intensity = cloud.intensity();
    let t = cloud.t();
    let reflectivity = cloud.reflectivity();
    let ring = cloud.ring();
    let ambient = cloud.ambient();
    let range = cloud.range();

    for (index, point) in out[..POINT_STEP * n_points]
        .chunks_exact_mut(POINT_STEP)
        .enumerate()
    {
        point[0..4].copy_from_slice(&x[index].to_le_bytes());
        point[4..8].copy_from_slice(&y[index].to_le_bytes());
        point[8..12].copy_from_slice(&z[index].to_le_bytes());
        point[12..16].copy_from_slice(&intensity[index].to_le_bytes());
        point[16..20].copy_from_slice(&t[index].to_le_bytes());
        point[20..22].copy_from_slice(&reflectivity[index].to_le_bytes());
        point[22..24].copy_from_slice(&ring[index].to_le_bytes());
        point[24..26].copy_from_slice(&ambient[index].to_le_bytes());
        point[26..30].copy_from_slice(&range[index].to_le_bytes());
    }
}

/// Pack `cloud` into a newly allocated byte vector.
pub fn format_points(cloud: &PointCloud) -> Vec<u8> {
    let mut data = vec![0u8; POINT_STEP * cloud.len()];
    format_points_into(cloud, &mut data);
    data
}

/// Build the organised PointCloud2 message for `cloud`.
#[instrument(skip_all)]
pub fn cloud_message(cloud: &PointCloud, timestamp: u64, frame_id: &str) -> PointCloud2 {
    PointCloud2 {
        header: Header {
            stamp: to_time(timestamp),
            frame_id: frame_id.to_string(),
        },
        height: cloud.height() as u32,
        width: cloud.width() as u32,
        fields: cloud_fields(),
        is_bigendian: false,
        point_step: POINT_STEP as u32,
        row_step: (POINT_STEP * cloud.width()) as u32,
        data: format_points(cloud),
        is_dense: true,
    }
}

/// Read point `index` of a message built by [`cloud_message`] as `(x, y, z)`.
pub fn read_xyz(msg: &PointCloud2, index: usize) -> Option<(f32, f32, f32)> {
    let base = index.checked_mul(msg.point_step as usize)?;
    let bytes = msg.data.get(base..base + 12)?;
    let f = |o: usize| f32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);
    Some((f(0), f(4), f(8)))
}
