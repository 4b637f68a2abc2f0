// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-packet orchestration from completed rotations to published clouds.
//!
//! Every call to [`Pipeline::handle_packet`] runs one cycle:
//!
//! ```text
//! ready? ──no──▶ NotReady
//!   │
//! active? ─no──▶ Suppressed
//!   │
//! project ─▶ publish sensor frame ─▶ lookup(body ← sensor)
//!                                      ├─ ok ──▶ transform ─▶ publish body frame
//!                                      └─ err ─▶ warn, SensorOnly
//! ```
//!
//! A missing transform is a normal result and never fails the cycle.
//! Transport errors are counted and returned once the cycle has finished,
//! so the body frame is still attempted when the sensor frame was rejected.

use crate::{
    cloud::PointCloud,
    formats::cloud_message,
    lidar::Error,
    projector::project_into,
    publisher::Publisher,
    scan::ScanBuffer,
    table::XyzLut,
    transform::{FrameResolver, LookupTime},
};
use clap::ValueEnum;
use std::{fmt, sync::Arc};
use tracing::{debug, error, info, info_span, trace, warn};

/// Output gate of the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Inactive,
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LifecycleState::Inactive => write!(f, "inactive"),
            LifecycleState::Active => write!(f, "active"),
        }
    }
}

/// Result of a successful cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The buffer has no completed rotation.
    NotReady,
    /// A rotation was ready but the pipeline is inactive.
    Suppressed,
    /// Sensor frame published, the body frame transform was unavailable.
    SensorOnly,
    /// Both frames published.
    SensorAndBody,
}

/// Time used for the body frame lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LookupPolicy {
    /// Most recent transform available.
    #[default]
    Latest,
    /// Transform valid at the cloud timestamp.
    CloudTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Columns per rotation.
    pub width: usize,
    /// Beams per column.
    pub height: usize,
    pub sensor_frame: String,
    pub body_frame: String,
    pub lookup: LookupPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 64,
            sensor_frame: "lidar".to_string(),
            body_frame: "base_link".to_string(),
            lookup: LookupPolicy::Latest,
        }
    }
}

/// Counters accumulated over the lifetime of a [`Pipeline`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Ready rotations seen, including suppressed ones.
    pub rotations: u64,
    pub suppressed: u64,
    pub sensor_published: u64,
    pub body_published: u64,
    pub transform_failures: u64,
    pub transport_failures: u64,
}

pub struct Pipeline<R, P> {
    config: PipelineConfig,
    table: Arc<XyzLut>,
    resolver: R,
    sensor_pub: P,
    body_pub: P,
    cloud: PointCloud,
    state: LifecycleState,
    stats: PipelineStats,
}

impl<R: FrameResolver, P: Publisher> Pipeline<R, P> {
    /// Build a pipeline in the [`LifecycleState::Inactive`] state.
    ///
    /// Fails with [`Error::GeometryMismatch`] when `table` was not built for
    /// `config.width × config.height`.
    pub fn new(
        config: PipelineConfig,
        table: Arc<XyzLut>,
        resolver: R,
        sensor_pub: P,
        body_pub: P,
    ) -> Result<Self, Error> {
        if config.sensor_frame.is_empty() || config.body_frame.is_empty() {
            return Err(Error::Config("frame ids must not be empty".to_string()));
        }
        table.check_geometry(config.width, config.height)?;

        let cloud = PointCloud::new(config.width, config.height);
        Ok(Self {
            config,
            table,
            resolver,
            sensor_pub,
            body_pub,
            cloud,
            state: LifecycleState::Inactive,
            stats: PipelineStats::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Enable output. Returns `false` if already active.
    pub fn activate(&mut self) -> bool {
        self.transition(LifecycleState::Active)
    }

    /// Disable output. Returns `false` if already inactive.
    pub fn deactivate(&mut self) -> bool {
        self.transition(LifecycleState::Inactive)
    }

    fn transition(&mut self, state: LifecycleState) -> bool {
        if self.state == state {
            return false;
        }
        info!("pipeline {} -> {}", self.state, state);
        self.state = state;
        true
    }

    /// Run one cycle against `buffer`.
    ///
    /// The caller feeds the packet into the buffer first; this only reads it.
    /// `override_ts` replaces the scan timestamp in the published headers.
    pub fn handle_packet(
        &mut self,
        buffer: &impl ScanBuffer,
        override_ts: Option<u64>,
    ) -> Result<Outcome, Error> {
        if !buffer.is_ready() {
            return Ok(Outcome::NotReady);
        }

        self.stats.rotations += 1;
        if self.state == LifecycleState::Inactive {
            self.stats.suppressed += 1;
            trace!("rotation suppressed while inactive");
            return Ok(Outcome::Suppressed);
        }

        let _span = info_span!("rotation", packets = buffer.packet_count()).entered();
        let scan_ts = buffer.timestamp();
        let timestamp = override_ts.unwrap_or(scan_ts);

        project_into(&self.table, buffer.scan(), scan_ts, &mut self.cloud)?;

        let mut transport_error = None;

        let msg = cloud_message(&self.cloud, timestamp, &self.config.sensor_frame);
        match self.sensor_pub.send(msg) {
            Ok(()) => self.stats.sensor_published += 1,
            Err(err) => {
                self.stats.transport_failures += 1;
                error!("{} publish failed: {}", self.sensor_pub.topic(), err);
                transport_error.get_or_insert(err);
            }
        }

        let at = match self.config.lookup {
            LookupPolicy::Latest => LookupTime::Latest,
            LookupPolicy::CloudTime => LookupTime::At(timestamp),
        };

        let outcome = match self
            .resolver
            .lookup(&self.config.body_frame, &self.config.sensor_frame, at)
        {
            Ok(transform) => {
                self.cloud.transform(&transform);
                let msg = cloud_message(&self.cloud, timestamp, &self.config.body_frame);
                match self.body_pub.send(msg) {
                    Ok(()) => self.stats.body_published += 1,
                    Err(err) => {
                        self.stats.transport_failures += 1;
                        error!("{} publish failed: {}", self.body_pub.topic(), err);
                        transport_error.get_or_insert(err);
                    }
                }
                Outcome::SensorAndBody
            }
            Err(reason) => {
                self.stats.transform_failures += 1;
                warn!(
                    "no transform {} -> {}: {}",
                    self.config.sensor_frame, self.config.body_frame, reason
                );
                Outcome::SensorOnly
            }
        };

        debug!("cloud published with {} packets", buffer.packet_count());

        match transport_error {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }
}
