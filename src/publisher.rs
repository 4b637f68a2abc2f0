// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Outgoing message hand-off.
//!
//! The pipeline never talks to the transport directly. It gives finished
//! messages to a [`Publisher`]; the production implementation queues them on
//! a bounded channel that an async task drains into zenoh, so a slow network
//! never stalls packet processing.

use crate::lidar::Error;
use clap::ValueEnum;
use edgefirst_schemas::sensor_msgs::PointCloud2;
use kanal::{Receiver, Sender};
use std::{fmt, time::Duration};

/// Longest a [`QueuePolicy::Block`] send waits for room by default.
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Destination for completed clouds.
pub trait Publisher {
    /// Hand over a message. Delivery is the transport's concern; an error
    /// only reports that this message was not accepted.
    fn send(&mut self, msg: PointCloud2) -> Result<(), Error>;

    /// Topic or name used in diagnostics.
    fn topic(&self) -> &str;
}

/// Behaviour when the outgoing queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum QueuePolicy {
    /// Reject the new message, like zenoh `CongestionControl::Drop`.
    #[default]
    Drop,
    /// Wait for the consumer to make room, up to the publisher's block
    /// timeout, then reject the message.
    Block,
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueuePolicy::Drop => write!(f, "drop"),
            QueuePolicy::Block => write!(f, "block"),
        }
    }
}

/// [`Publisher`] backed by a bounded kanal channel.
pub struct QueuedPublisher {
    topic: String,
    tx: Sender<PointCloud2>,
    policy: QueuePolicy,
    block_timeout: Duration,
}

impl QueuedPublisher {
    /// Create a publisher and the receiving end of its queue.
    pub fn new(
        topic: impl Into<String>,
        depth: usize,
        policy: QueuePolicy,
    ) -> Result<(Self, Receiver<PointCloud2>), Error> {
        if depth == 0 {
            return Err(Error::Config("queue depth must be at least 1".to_string()));
        }

        let (tx, rx) = kanal::bounded(depth);
        let publisher = Self {
            topic: topic.into(),
            tx,
            policy,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
        };
        Ok((publisher, rx))
    }

    /// Bound how long a [`QueuePolicy::Block`] send waits on a full queue.
    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Messages currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }
}

impl Publisher for QueuedPublisher {
    fn send(&mut self, msg: PointCloud2) -> Result<(), Error> {
        match self.policy {
            QueuePolicy::Drop => match self.tx.try_send(msg) {
                Ok(true) => Ok(()),
                Ok(false) => Err(Error::Transport(format!("{} queue full", self.topic))),
                Err(e) => Err(Error::Transport(format!("{}: {}", self.topic, e))),
            },
            QueuePolicy::Block => self
                .tx
                .send_timeout(msg, self.block_timeout)
                .map_err(|e| Error::Transport(format!("{}: {}", self.topic, e))),
        }
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgefirst_schemas::{builtin_interfaces::Time, std_msgs::Header};

    fn message(frame_id: &str) -> PointCloud2 {
        PointCloud2 {
            header: Header {
                stamp: Time { sec: 0, nanosec: 0 },
                frame_id: frame_id.to_string(),
            },
            height: 0,
            width: 0,
            fields: Vec::new(),
            is_bigendian: false,
            point_step: 0,
            row_step: 0,
            data: Vec::new(),
            is_dense: true,
        }
    }

    #[test]
    fn test_queue_depth_validated() {
        assert!(QueuedPublisher::new("rt/lidar/points", 0, QueuePolicy::Drop).is_err());
    }

    #[test]
    fn test_drop_when_full() {
        let (mut publ, rx) = QueuedPublisher::new("rt/lidar/points", 1, QueuePolicy::Drop).unwrap();
        publ.send(message("a")).unwrap();
        assert_eq!(publ.queued(), 1);

        let err = publ.send(message("b")).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        assert_eq!(rx.recv().unwrap().header.frame_id, "a");
        publ.send(message("c")).unwrap();
        assert_eq!(rx.recv().unwrap().header.frame_id, "c");
    }

    #[test]
    fn test_closed_receiver() {
        for policy in [QueuePolicy::Drop, QueuePolicy::Block] {
            let (mut publ, rx) = QueuedPublisher::new("rt/lidar/points", 4, policy).unwrap();
            drop(rx);
            assert!(matches!(
                publ.send(message("a")),
                Err(Error::Transport(_))
            ));
        }
    }

    #[test]
    fn test_block_gives_up_after_timeout() {
        let (publ, rx) = QueuedPublisher::new("rt/lidar/points", 1, QueuePolicy::Block).unwrap();
        let mut publ = publ.with_block_timeout(Duration::from_millis(20));
        publ.send(message("a")).unwrap();

        let start = std::time::Instant::now();
        let err = publ.send(message("b")).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(start.elapsed() < Duration::from_secs(1));

        assert_eq!(rx.recv().unwrap().header.frame_id, "a");
        assert!(rx.is_empty());
    }

    #[test]
    fn test_block_waits_for_consumer() {
        let (publ, rx) = QueuedPublisher::new("rt/lidar/points", 1, QueuePolicy::Block).unwrap();
        let mut publ = publ.with_block_timeout(Duration::from_secs(5));
        publ.send(message("a")).unwrap();

        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let first = rx.recv().unwrap().header.frame_id;
            let second = rx.recv().unwrap().header.frame_id;
            (first, second)
        });

        publ.send(message("b")).unwrap();
        assert_eq!(
            consumer.join().unwrap(),
            ("a".to_string(), "b".to_string())
        );
    }

    #[tokio::test]
    async fn test_async_consumer() {
        let (mut publ, rx) =
            QueuedPublisher::new("rt/lidar/points", 4, QueuePolicy::Block).unwrap();
        let rx = rx.to_async();

        let consumer = tokio::spawn(async move {
            let mut frames = Vec::new();
            while let Ok(msg) = rx.recv().await {
                frames.push(msg.header.frame_id);
            }
            frames
        });

        for name in ["a", "b", "c"] {
            publ.send(message(name)).unwrap();
        }
        drop(publ);

        assert_eq!(consumer.await.unwrap(), vec!["a", "b", "c"]);
    }
}
