// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::args::Args;
use edgefirst_pointcloud::{
    Error, SharedTransformBuffer, Transform,
    lidar::{from_time, timestamp, to_time},
    transform::rotation_from_xyzw,
};
use edgefirst_schemas::{geometry_msgs::TransformStamped, serde_cdr, std_msgs::Header};
use std::time::Duration;
use tracing::{debug, error, trace, warn};
use zenoh::{
    Session,
    bytes::{Encoding, ZBytes},
    qos::{CongestionControl, Priority},
};

pub const TF_STATIC_TOPIC: &str = "rt/tf_static";
pub const TF_TOPIC: &str = "rt/tf";

/// Sensor pose in the base frame from `--tf-vec` and `--tf-quat`.
pub fn sensor_pose(args: &Args) -> Result<Transform, Error> {
    let &[x, y, z] = args.tf_vec.as_slice() else {
        return Err(Error::Config("tf_vec needs 3 values".to_string()));
    };
    let &[qx, qy, qz, qw] = args.tf_quat.as_slice() else {
        return Err(Error::Config("tf_quat needs 4 values".to_string()));
    };

    let rotation = rotation_from_xyzw(qx, qy, qz, qw).ok_or_else(|| Error::Config(format!("invalid tf_quat {:?}", args.tf_quat)))?;
    Ok(Transform::new([x, y, z], rotation))
}

fn static_message(args: &Args, pose: &Transform, stamp: u64) -> TransformStamped {
    TransformStamped {
        header: Header {
            stamp: to_time(stamp),
            frame_id: args.base_frame_id.clone(),
        },
        child_frame_id: args.frame_id.clone(),
        transform: pose.into(),
    }
}

pub fn decode(payload: &[u8]) -> Result<TransformStamped, Error> {
    Ok(serde_cdr::deserialize(payload)?)
}

/// Insert a received transform into the buffer. Returns whether the buffer
/// changed; a repeated static edge, such as our own broadcast, does not.
pub fn apply(
    tf: &SharedTransformBuffer,
    msg: &TransformStamped,
    dynamic: bool,
) -> Result<bool, Error> {
    let transform = Transform::try_from(&msg.transform)?;
    let parent = msg.header.frame_id.as_str();
    let child = msg.child_frame_id.as_str();

    if !dynamic {
        return tf.set_static(parent, child, transform);
    }

    let stamp = from_time(&msg.header.stamp);
    tf.update(|buffer| buffer.set_dynamic(parent, child, transform, stamp))?;
    Ok(true)
}

/// Broadcast the sensor pose on `rt/tf_static` once per second.
pub async fn spawn_tf_static(
    session: Session,
    args: &Args,
    pose: Transform,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let publisher = match session
        .declare_publisher(TF_STATIC_TOPIC.to_string())
        .priority(Priority::Background)
        .congestion_control(CongestionControl::Drop)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to create publisher {}: {:?}", TF_STATIC_TOPIC, e);
            return Err(e);
        }
    };

    let args = args.clone();
    let enc = Encoding::APPLICATION_CDR.with_schema("geometry_msgs/msg/TransformStamped");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));

        loop {
            interval.tick().await;

            let stamp = timestamp().unwrap_or(0);
            let msg = match serde_cdr::serialize(&static_message(&args, &pose, stamp)) {
                Ok(v) => ZBytes::from(v),
                Err(e) => {
                    error!("Could not encode {}: {:?}", TF_STATIC_TOPIC, e);
                    return;
                }
            };

            match publisher.put(msg).encoding(enc.clone()).await {
                Ok(_) => trace!("publishing {}", TF_STATIC_TOPIC),
                Err(e) => error!("{} publish error: {:?}", TF_STATIC_TOPIC, e),
            }
        }
    });

    Ok(())
}

/// Feed `rt/tf_static` and `rt/tf` into `tf`.
pub async fn spawn_tf_listener(
    session: Session,
    tf: SharedTransformBuffer,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    for (topic, dynamic) in [(TF_STATIC_TOPIC, false), (TF_TOPIC, true)] {
        let sub = session.declare_subscriber(topic).await?;
        let tf = tf.clone();

        tokio::spawn(async move {
            while let Ok(sample) = sub.recv_async().await {
                let msg = match decode(&sample.payload().to_bytes()) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("{} decode error: {}", topic, e);
                        continue;
                    }
                };

                match apply(&tf, &msg, dynamic) {
                    Ok(true) => debug!(
                        "{}: {} -> {}",
                        topic, msg.header.frame_id, msg.child_frame_id
                    ),
                    Ok(false) => trace!("{}: {} unchanged", topic, msg.child_frame_id),
                    Err(e) => warn!("{} rejected: {}", topic, e),
                }
            }
        });
    }

    Ok(())
}
