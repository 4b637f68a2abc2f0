// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Scan to Cartesian projection.
//!
//! Projection is deterministic: the same table, scan and timestamp always
//! produce the same cloud. Pixels without a return (range 0) are placed at
//! the origin so the output keeps the full `width × height` organisation.

use crate::{cloud::PointCloud, lidar::Error, scan::Scan, table::XyzLut};
use tracing::instrument;

/// Project `scan` into a newly allocated cloud.
pub fn project(table: &XyzLut, scan: &Scan, timestamp: u64) -> Result<PointCloud, Error> {
    let mut cloud = PointCloud::new(table.width(), table.height());
    project_into(table, scan, timestamp, &mut cloud)?;
    Ok(cloud)
}

/// Project `scan` into an existing cloud, overwriting every point.
///
/// `timestamp` is the scan timestamp; each point's `t` is the offset of its
/// column timestamp from it, saturating at zero and `u32::MAX`.
#[instrument(skip_all)]
pub fn project_into(
    table: &XyzLut,
    scan: &Scan,
    timestamp: u64,
    cloud: &mut PointCloud,
) -> Result<(), Error> {
    table.check_geometry(scan.width(), scan.height())?;
    table.check_geometry(cloud.width(), cloud.height())?;

    let width = table.width();
    let (dx, dy, dz) = table.direction();
    let (ox, oy, oz) = table.offset();
    let column_t: Vec<u32> = scan
        .timestamps()
        .iter()
        .map(|ts| ts.saturating_sub(timestamp).min(u32::MAX as u64) as u32)
        .collect();

    let out = cloud.fields_mut();
    for (row, ((range, signal), (reflectivity, near_ir))) in scan
        .range()
        .rows()
        .into_iter()
        .zip(scan.signal().rows())
        .zip(scan.reflectivity().rows().into_iter().zip(scan.near_ir().rows()))
        .enumerate()
    {
        let base = row * width;
        for col in 0..width {
            let idx = base + col;
            let r = range[col];

            if r == 0 {
                out.x[idx] = 0.0;
                out.y[idx] = 0.0;
                out.z[idx] = 0.0;
            } else {
                let rf = r as f32;
                out.x[idx] = rf * dx[idx] + ox[idx];
                out.y[idx] = rf * dy[idx] + oy[idx];
                out.z[idx] = rf * dz[idx] + oz[idx];
            }

            out.range[idx] = r;
            out.intensity[idx] = signal[col] as f32;
            out.reflectivity[idx] = reflectivity[col];
            out.ambient[idx] = near_ir[col];
            out.ring[idx] = row as u16;
            out.t[idx] = column_t[col];
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scan::{Column, Scan},
        table::BeamIntrinsics,
    };

    fn table(width: usize, height: usize) -> XyzLut {
        let intrinsics = BeamIntrinsics {
            beam_altitude_angles: vec![0.0; height],
            beam_azimuth_angles: vec![0.0; height],
            beam_to_lidar_transform: vec![
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ],
            lidar_origin_to_beam_origin_mm: None,
            lidar_to_sensor_transform: vec![
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ],
        };
        XyzLut::new(&intrinsics, width).unwrap()
    }

    fn scan(width: usize, height: usize) -> Scan {
        let mut scan = Scan::new(width, height);
        for m in 0..width as u16 {
            scan.write_column(&Column {
                measurement_id: m,
                timestamp: 5_000 + m as u64 * 100,
                range: vec![2000; height],
                signal: vec![m; height],
                reflectivity: vec![m + 1; height],
                near_ir: vec![m + 2; height],
            })
            .unwrap();
        }
        scan
    }

    #[test]
    fn test_project_geometry_and_attributes() {
        let table = table(4, 2);
        let cloud = project(&table, &scan(4, 2), 5_000).unwrap();

        assert_eq!(cloud.len(), 8);
        let (x, y, z) = cloud.point(0);
        assert!((x - 2.0).abs() < 1e-5);
        assert!(y.abs() < 1e-5);
        assert!(z.abs() < 1e-5);

        // Column 2 faces backwards.
        let (x, _, _) = cloud.point(2);
        assert!((x + 2.0).abs() < 1e-5);

        assert_eq!(cloud.ring(), &[0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(cloud.t(), &[0, 100, 200, 300, 0, 100, 200, 300]);
        assert_eq!(cloud.intensity()[5], 1.0);
        assert_eq!(cloud.reflectivity()[5], 2);
        assert_eq!(cloud.ambient()[5], 3);
        assert_eq!(cloud.range()[5], 2000);
    }

    #[test]
    fn test_zero_range_at_origin() {
        let table = table(4, 2);
        let mut scan = scan(4, 2);
        scan.write_column(&Column {
            measurement_id: 1,
            timestamp: 5_100,
            range: vec![0, 0],
            signal: vec![0, 0],
            reflectivity: vec![0, 0],
            near_ir: vec![0, 0],
        })
        .unwrap();

        let cloud = project(&table, &scan, 5_000).unwrap();
        assert_eq!(cloud.point(1), (0.0, 0.0, 0.0));
        assert_eq!(cloud.point(5), (0.0, 0.0, 0.0));
        assert_ne!(cloud.point(0), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_project_into_overwrites() {
        let table = table(4, 2);
        let mut cloud = project(&table, &scan(4, 2), 5_000).unwrap();

        project_into(&table, &Scan::new(4, 2), 0, &mut cloud).unwrap();
        assert!(cloud.x().iter().all(|v| *v == 0.0));
        assert!(cloud.range().iter().all(|v| *v == 0));
        assert!(cloud.t().iter().all(|v| *v == 0));
    }

    #[test]
    fn test_project_is_deterministic() {
        let table = table(8, 3);
        let scan = scan(8, 3);
        let a = project(&table, &scan, 5_000).unwrap();
        let b = project(&table, &scan, 5_000).unwrap();
        assert_eq!(a.x(), b.x());
        assert_eq!(a.y(), b.y());
        assert_eq!(a.z(), b.z());
    }

    #[test]
    fn test_geometry_mismatch() {
        let table = table(4, 2);
        assert!(matches!(
            project(&table, &Scan::new(8, 2), 0),
            Err(Error::GeometryMismatch { .. })
        ));

        let mut cloud = PointCloud::new(4, 3);
        assert!(matches!(
            project_into(&table, &scan(4, 2), 0, &mut cloud),
            Err(Error::GeometryMismatch { .. })
        ));
    }
}
