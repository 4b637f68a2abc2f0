// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_pointcloud::{Error, LookupPolicy, QueuePolicy};
use serde_json::json;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use zenoh::config::{Config, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Sensor calibration metadata (JSON) providing the beam intrinsics.
    #[arg(long, env)]
    pub metadata: PathBuf,

    /// Columns per rotation.
    #[arg(long, env, default_value = "1024")]
    pub columns: usize,

    /// Frame transformation vector from the base_link
    #[arg(
        long,
        env,
        default_value = "0 0 0",
        value_delimiter = ' ',
        num_args = 3
    )]
    pub tf_vec: Vec<f64>,

    /// Frame transformation quaternion from the base_link
    #[arg(
        long,
        env,
        default_value = "0 0 0 1",
        value_delimiter = ' ',
        num_args = 4
    )]
    pub tf_quat: Vec<f64>,

    /// The name of the base frame
    #[arg(long, env, default_value = "base_link")]
    pub base_frame_id: String,

    /// The name of the lidar frame
    #[arg(long, env, default_value = "lidar")]
    pub frame_id: String,

    /// lidar base topic
    #[arg(long, env, default_value = "rt/lidar")]
    pub lidar_topic: String,

    /// Topic carrying decoded column packets.
    #[arg(long, env, default_value = "rt/lidar/columns")]
    pub columns_topic: String,

    /// Depth of each outgoing cloud queue.
    #[arg(long, env, default_value = "2")]
    pub queue_depth: usize,

    /// Behaviour when an outgoing queue is full.
    #[arg(long, env, value_enum, default_value_t = QueuePolicy::Drop)]
    pub queue_policy: QueuePolicy,

    /// Longest a `--queue-policy block` publish waits for room, in
    /// milliseconds, before the cloud is dropped.
    #[arg(long, env, default_value = "1000")]
    pub queue_timeout_ms: u64,

    /// Time used when looking up the base frame transform.
    #[arg(long, env, value_enum, default_value_t = LookupPolicy::Latest)]
    pub lookup: LookupPolicy,

    /// How far a dynamic transform may be from the cloud time, in
    /// milliseconds, when `--lookup cloud-time` is used.
    #[arg(long, env, default_value = "100")]
    pub tf_tolerance_ms: u64,

    /// Start without publishing until "activate" is received on
    /// `<lidar_topic>/lifecycle`.
    #[arg(long, env)]
    pub start_inactive: bool,

    /// Stamp clouds with the host clock when the rotation completes instead
    /// of the first column time.
    #[arg(long, env)]
    pub host_timestamp: bool,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl Args {
    pub fn points_topic(&self) -> String {
        format!("{}/points", self.lidar_topic)
    }

    pub fn points_base_topic(&self) -> String {
        format!("{}/points_{}", self.lidar_topic, self.base_frame_id)
    }

    pub fn lifecycle_topic(&self) -> String {
        format!("{}/lifecycle", self.lidar_topic)
    }
}

fn insert(config: &mut Config, key: &str, value: serde_json::Value) -> Result<(), Error> {
    config
        .insert_json5(key, &value.to_string())
        .map_err(|e| Error::Config(format!("zenoh {}: {}", key, e)))
}

impl TryFrom<&Args> for Config {
    type Error = Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut config = Config::default();

        insert(&mut config, "mode", json!(args.mode))?;

        if !args.connect.is_empty() {
            insert(&mut config, "connect/endpoints", json!(args.connect))?;
        }

        if !args.listen.is_empty() {
            insert(&mut config, "listen/endpoints", json!(args.listen))?;
        }

        if args.no_multicast_scouting {
            insert(&mut config, "scouting/multicast/enabled", json!(false))?;
        }

        insert(&mut config, "scouting/multicast/interface", json!("lo"))?;

        Ok(config)
    }
}
