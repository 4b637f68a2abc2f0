// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Point Cloud Library
//!
//! Turns decoded rotating-lidar column packets into organised point clouds
//! published in the sensor frame and, when the transform is known, in a body
//! frame.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────────┐     ┌──────────────┐
//! │  ColumnPacket   │ ──► │ RotationAccumulator │ ──► │   Pipeline   │
//! │  (decoded)      │     │ (ScanBuffer)        │     │              │
//! └─────────────────┘     └─────────────────────┘     └──────┬───────┘
//!                                                            │
//!              ┌──────────────────┬──────────────────────────┤
//!              ▼                  ▼                          ▼
//!     ┌────────────────┐  ┌────────────────┐       ┌──────────────────┐
//!     │ projector      │  │ FrameResolver  │       │ Publisher        │
//!     │ (XyzLut, Scan) │  │ (tf tree)      │       │ (sensor / body)  │
//!     └────────────────┘  └────────────────┘       └──────────────────┘
//! ```
//!
//! The caller feeds every packet into the accumulator, then calls
//! [`Pipeline::handle_packet`]. Nothing happens until a rotation completes.
//! Each completed rotation is projected through the direction table into a
//! reusable [`PointCloud`], published in the sensor frame, then transformed
//! and published in the body frame if the [`FrameResolver`] has a transform.
//!
//! # Modules
//!
//! - [`lidar`]: Error type and clock helpers
//! - [`scan`]: Scan grid, the [`ScanBuffer`] contract and the rotation
//!   accumulator
//! - [`table`]: Calibration metadata and the per-pixel direction table
//! - [`cloud`]: Fixed-geometry point cloud buffer
//! - [`projector`]: Scan to Cartesian projection
//! - [`transform`]: Rigid transforms and the frame tree
//! - [`formats`]: PointCloud2 encoding
//! - [`publisher`]: Outgoing queues
//! - [`pipeline`]: Per-packet orchestration and lifecycle gating
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_pointcloud::{
//!     Pipeline, PipelineConfig, QueuePolicy, QueuedPublisher, RotationAccumulator,
//!     SharedTransformBuffer, XyzLut, table::BeamIntrinsics,
//! };
//!
//! let intrinsics = BeamIntrinsics::from_file("metadata.json")?;
//! let table = Arc::new(XyzLut::new(&intrinsics, 1024)?);
//! let (sensor, _sensor_rx) = QueuedPublisher::new("rt/lidar/points", 4, QueuePolicy::Drop)?;
//! let (body, _body_rx) = QueuedPublisher::new("rt/lidar/points_base_link", 4, QueuePolicy::Drop)?;
//!
//! let config = PipelineConfig { width: 1024, height: intrinsics.rows(), ..Default::default() };
//! let mut accumulator = RotationAccumulator::new(config.width, config.height);
//! let mut pipeline = Pipeline::new(config, table, SharedTransformBuffer::default(), sensor, body)?;
//! pipeline.activate();
//!
//! for packet in packets {
//!     accumulator.accumulate(&packet)?;
//!     pipeline.handle_packet(&accumulator, None)?;
//! }
//! ```

pub mod cloud;
pub mod formats;
pub mod lidar;
pub mod pipeline;
pub mod projector;
pub mod publisher;
pub mod scan;
pub mod table;
pub mod transform;

// Re-exports for convenience
pub use cloud::PointCloud;
pub use formats::PointFieldType;
pub use lidar::Error;
pub use pipeline::{LifecycleState, LookupPolicy, Outcome, Pipeline, PipelineConfig, PipelineStats};
pub use publisher::{Publisher, QueuePolicy, QueuedPublisher};
pub use scan::{ColumnPacket, RotationAccumulator, Scan, ScanBuffer};
pub use table::XyzLut;
pub use transform::{
    FrameResolver, LookupTime, SharedTransformBuffer, Transform, TransformBuffer,
    TransformUnavailable,
};
