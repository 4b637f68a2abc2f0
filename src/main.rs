// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;
mod tf;

use args::Args;
use clap::Parser as _;
use edgefirst_pointcloud::{
    ColumnPacket, Error, Pipeline, PipelineConfig, QueuePolicy, QueuedPublisher,
    RotationAccumulator, ScanBuffer as _, SharedTransformBuffer, TransformBuffer, XyzLut,
    lidar::timestamp, table::BeamIntrinsics,
};
use edgefirst_schemas::{sensor_msgs::PointCloud2, serde_cdr};
use kanal::{AsyncSender, Receiver};
use std::{sync::Arc, thread, time::Duration};
use tracing::{debug, error, info, info_span, trace, warn};
use tracing_subscriber::{Layer as _, layer::SubscriberExt as _, util::SubscriberInitExt as _};
use zenoh::{
    Session,
    bytes::{Encoding, ZBytes},
    qos::{CongestionControl, Priority},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Work items for the pipeline thread, processed in arrival order.
enum Command {
    Packet(ColumnPacket),
    Activate,
    Deactivate,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(args.rust_log);
    let tracy = args
        .tracy
        .then(|| tracing_tracy::TracyLayer::default().with_filter(args.rust_log));
    tracing_subscriber::registry()
        .with(stdout_log)
        .with(tracy)
        .init();

    let intrinsics = BeamIntrinsics::from_file(&args.metadata)?;
    let table = Arc::new(XyzLut::new(&intrinsics, args.columns)?);
    info!(
        "loaded {} with {} beams, {} columns",
        args.metadata.display(),
        table.height(),
        table.width()
    );

    let session = zenoh::open(zenoh::Config::try_from(&args)?).await?;
    debug!("opened zenoh session");

    let pose = tf::sensor_pose(&args)?;
    let transforms =
        SharedTransformBuffer::new(TransformBuffer::new(args.tf_tolerance_ms * 1_000_000));
    transforms.set_static(&args.base_frame_id, &args.frame_id, pose)?;
    tf::spawn_tf_static(session.clone(), &args, pose).await?;
    tf::spawn_tf_listener(session.clone(), transforms.clone()).await?;

    let block_timeout = Duration::from_millis(args.queue_timeout_ms);
    let (sensor_pub, sensor_rx) =
        QueuedPublisher::new(args.points_topic(), args.queue_depth, args.queue_policy)?;
    let sensor_pub = sensor_pub.with_block_timeout(block_timeout);
    let (body_pub, body_rx) =
        QueuedPublisher::new(args.points_base_topic(), args.queue_depth, args.queue_policy)?;
    let body_pub = body_pub.with_block_timeout(block_timeout);
    spawn_cloud_publisher(&session, args.points_topic(), args.queue_policy, sensor_rx).await?;
    spawn_cloud_publisher(&session, args.points_base_topic(), args.queue_policy, body_rx).await?;

    let config = PipelineConfig {
        width: args.columns,
        height: intrinsics.rows(),
        sensor_frame: args.frame_id.clone(),
        body_frame: args.base_frame_id.clone(),
        lookup: args.lookup,
    };
    let mut pipeline = Pipeline::new(config, table, transforms, sensor_pub, body_pub)?;
    if !args.start_inactive {
        pipeline.activate();
    }

    let (tx, rx) = kanal::bounded(128);
    let host_timestamp = args.host_timestamp;
    let processor = thread::Builder::new()
        .name("pipeline".to_string())
        .spawn(move || pipeline_thread(pipeline, rx, host_timestamp))?;
    let tx = tx.to_async();

    spawn_lifecycle(&session, args.lifecycle_topic(), tx.clone()).await?;

    let sub = session.declare_subscriber(args.columns_topic.clone()).await?;
    info!("waiting for column packets on {}", args.columns_topic);

    while let Ok(sample) = sub.recv_async().await {
        let packet = match ColumnPacket::from_cdr(&sample.payload().to_bytes()) {
            Ok(v) => v,
            Err(e) => {
                warn!("{} decode error: {}", args.columns_topic, e);
                continue;
            }
        };

        if let Err(e) = tx.send(Command::Packet(packet)).await {
            error!("pipeline stopped: {:?}", e);
            break;
        }
    }

    drop(tx);
    processor
        .join()
        .map_err(|_| Error::Config("pipeline thread panicked".to_string()))?;

    Ok(())
}

fn pipeline_thread(
    mut pipeline: Pipeline<SharedTransformBuffer, QueuedPublisher>,
    rx: Receiver<Command>,
    host_timestamp: bool,
) {
    let config = pipeline.config();
    let mut accumulator = RotationAccumulator::new(config.width, config.height);

    while let Ok(command) = rx.recv() {
        let packet = match command {
            Command::Packet(packet) => packet,
            Command::Activate => {
                pipeline.activate();
                continue;
            }
            Command::Deactivate => {
                pipeline.deactivate();
                continue;
            }
        };

        // A rejected packet can still release a deferred rotation.
        if let Err(e) = accumulator.accumulate(&packet) {
            warn!("dropped packet {}: {}", packet.frame_id, e);
            if !accumulator.is_ready() {
                continue;
            }
        }

        let override_ts = match host_timestamp && accumulator.is_ready() {
            true => timestamp().ok(),
            false => None,
        };

        match pipeline.handle_packet(&accumulator, override_ts) {
            Ok(outcome) => trace!("{:?}", outcome),
            // Already reported by the pipeline.
            Err(Error::Transport(_)) => {}
            Err(e) => error!("pipeline error: {}", e),
        }
    }

    info!("pipeline stopped: {:?}", pipeline.stats());
}

async fn spawn_cloud_publisher(
    session: &Session,
    topic: String,
    policy: QueuePolicy,
    rx: Receiver<PointCloud2>,
) -> Result<(), BoxError> {
    let congestion_control = match policy {
        QueuePolicy::Drop => CongestionControl::Drop,
        QueuePolicy::Block => CongestionControl::Block,
    };

    let publ = match session
        .declare_publisher(topic.clone())
        .priority(Priority::DataHigh)
        .congestion_control(congestion_control)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to create publisher {}: {:?}", topic, e);
            return Err(e);
        }
    };

    let rx = rx.to_async();
    let enc = Encoding::APPLICATION_CDR.with_schema("sensor_msgs/msg/PointCloud2");

    tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            let buf = match info_span!("serialize").in_scope(|| serde_cdr::serialize(&msg)) {
                Ok(v) => ZBytes::from(v),
                Err(e) => {
                    error!("Could not encode {}: {:?}", topic, e);
                    continue;
                }
            };

            match publ.put(buf).encoding(enc.clone()).await {
                Ok(_) => trace!("{} message sent", topic),
                Err(e) => error!("{} message error: {:?}", topic, e),
            }
        }
    });

    Ok(())
}

/// Accept "activate" and "deactivate" on `topic`.
async fn spawn_lifecycle(
    session: &Session,
    topic: String,
    tx: AsyncSender<Command>,
) -> Result<(), BoxError> {
    let sub = session.declare_subscriber(topic.clone()).await?;

    tokio::spawn(async move {
        while let Ok(sample) = sub.recv_async().await {
            let command = match sample.payload().try_to_string() {
                Ok(text) => match text.trim() {
                    "activate" => Command::Activate,
                    "deactivate" => Command::Deactivate,
                    other => {
                        warn!("{}: unknown transition {:?}", topic, other);
                        continue;
                    }
                },
                Err(e) => {
                    warn!("{} decode error: {:?}", topic, e);
                    continue;
                }
            };

            if tx.send(command).await.is_err() {
                break;
            }
        }
    });

    Ok(())
}
