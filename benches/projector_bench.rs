// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Benchmarks for the per-rotation hot path.
//!
//! Measures:
//! - Projection of a full scan through the direction table
//! - Rigid transform of the projected cloud
//! - PointCloud2 packing
//!
//! Run with: cargo bench --bench projector_bench
//!
//! For on-target profiling, cross-compile and run:
//!   cargo bench --bench projector_bench --target aarch64-unknown-linux-gnu

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use edgefirst_pointcloud::{
    PointCloud, Scan, Transform, XyzLut,
    formats::{POINT_STEP, cloud_message, format_points_into},
    projector::project_into,
    scan::Column,
    table::BeamIntrinsics,
    transform::UnitQuaternion,
};

fn table(width: usize, height: usize) -> XyzLut {
    let intrinsics = BeamIntrinsics {
        beam_altitude_angles: (0..height)
            .map(|i| 22.5 - 45.0 * i as f64 / (height - 1) as f64)
            .collect(),
        beam_azimuth_angles: (0..height).map(|i| (i % 4) as f64 - 1.5).collect(),
        beam_to_lidar_transform: vec![
            1.0, 0.0, 0.0, 15.806, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ],
        lidar_origin_to_beam_origin_mm: Some(15.806),
        lidar_to_sensor_transform: vec![
            -1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 38.195, 0.0, 0.0, 0.0, 1.0,
        ],
    };
    XyzLut::new(&intrinsics, width).expect("valid intrinsics")
}

/// Fully populated scan with roughly one in eight pixels missing a return.
fn scan(width: usize, height: usize) -> Scan {
    let mut scan = Scan::new(width, height);
    for m in 0..width {
        let range = (0..height)
            .map(|r| match (r * 31 + m) % 8 {
                0 => 0,
                k => 1_000 + k as u32 * 2_500,
            })
            .collect();
        scan.write_column(&Column {
            measurement_id: m as u16,
            timestamp: m as u64 * 48_828,
            range,
            signal: vec![(m % 512) as u16; height],
            reflectivity: vec![(m % 255) as u16; height],
            near_ir: vec![600; height],
        })
        .expect("column fits");
    }
    scan
}

const MODES: [(usize, usize); 3] = [(512, 64), (1024, 64), (2048, 128)];

fn bench_project(c: &mut Criterion) {
    let mut group = c.benchmark_group("project");

    for (width, height) in MODES {
        let table = table(width, height);
        let scan = scan(width, height);
        let mut cloud = PointCloud::new(width, height);

        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_function(BenchmarkId::new("project_into", format!("{width}x{height}")), |b| {
            b.iter(|| project_into(&table, &scan, 0, &mut cloud))
        });
    }

    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    let (width, height) = (1024, 64);
    let mut cloud = PointCloud::new(width, height);
    project_into(&table(width, height), &scan(width, height), 0, &mut cloud)
        .expect("matching geometry");
    let yaw = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.785);
    let mount = Transform::new([0.35, -0.1, 1.2], yaw);

    group.throughput(Throughput::Elements((width * height) as u64));
    group.bench_function("body_frame", |b| b.iter(|| cloud.transform(&mount)));

    group.finish();
}

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format");

    for (width, height) in MODES {
        let mut cloud = PointCloud::new(width, height);
        project_into(&table(width, height), &scan(width, height), 0, &mut cloud)
            .expect("matching geometry");
        let mut out = vec![0u8; POINT_STEP * cloud.len()];
        let label = format!("{width}x{height}");

        group.throughput(Throughput::Bytes(out.len() as u64));
        group.bench_function(BenchmarkId::new("format_points_into", &label), |b| {
            b.iter(|| format_points_into(&cloud, &mut out))
        });
        group.bench_function(BenchmarkId::new("cloud_message", &label), |b| {
            b.iter(|| cloud_message(&cloud, 1_700_000_000_000_000_000, "lidar"))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_project, bench_transform, bench_format);
criterion_main!(benches);
