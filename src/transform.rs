// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Rigid transforms and named frame resolution.
//!
//! Frames form a tree: every child frame has exactly one parent edge holding
//! the transform that maps points expressed in the child into the parent.
//! Edges published on `tf_static` never expire; dynamic edges carry a stamp
//! and are only usable close to it.
//!
//! A lookup that cannot be answered is not an error condition of the caller:
//! [`FrameResolver::lookup`] returns [`TransformUnavailable`] and the caller
//! decides whether to skip or retry later.

use crate::lidar::Error;
use edgefirst_schemas::geometry_msgs;
use nalgebra::{Isometry3, Point3, Quaternion, Translation3};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock, TryLockError},
};

pub use nalgebra::UnitQuaternion;

/// Upper bound on frame tree depth, guards against reparenting cycles.
pub const MAX_TREE_DEPTH: usize = 1000;

/// Unit rotation from ROS (x, y, z, w) order, normalising the input.
///
/// Returns `None` for zero or non-finite quaternions.
pub fn rotation_from_xyzw(x: f64, y: f64, z: f64, w: f64) -> Option<UnitQuaternion<f64>> {
    let q = Quaternion::new(w, x, y, z);
    let norm = q.norm();
    if !norm.is_finite() || norm < 1e-9 {
        return None;
    }
    Some(UnitQuaternion::from_quaternion(q))
}

/// Rigid transform: rotate, then translate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    isometry: Isometry3<f64>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            isometry: Isometry3::identity(),
        }
    }

    pub fn new(translation: [f64; 3], rotation: UnitQuaternion<f64>) -> Self {
        let [x, y, z] = translation;
        Self {
            isometry: Isometry3::from_parts(Translation3::new(x, y, z), rotation),
        }
    }

    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.isometry
    }

    pub fn translation(&self) -> [f64; 3] {
        let v = &self.isometry.translation.vector;
        [v.x, v.y, v.z]
    }

    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.isometry.rotation
    }

    pub fn is_finite(&self) -> bool {
        self.isometry.translation.vector.iter().all(|v| v.is_finite())
            && self.isometry.rotation.coords.iter().all(|v| v.is_finite())
    }

    /// Whether both translation and quaternion components agree within
    /// `epsilon`.
    pub fn approx_eq(&self, other: &Transform, epsilon: f64) -> bool {
        let a = &self.isometry;
        let b = &other.isometry;
        (a.translation.vector - b.translation.vector).amax() <= epsilon
            && (a.rotation.coords - b.rotation.coords).amax() <= epsilon
    }

    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let p = self.isometry.transform_point(&Point3::from(p));
        [p.x, p.y, p.z]
    }

    /// `self ∘ other`: maps points through `other` first, then `self`.
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform {
            isometry: self.isometry * other.isometry,
        }
    }

    pub fn inverse(&self) -> Transform {
        Transform {
            isometry: self.isometry.inverse(),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Isometry3<f64>> for Transform {
    fn from(isometry: Isometry3<f64>) -> Self {
        Self { isometry }
    }
}

impl TryFrom<&geometry_msgs::Transform> for Transform {
    type Error = Error;

    fn try_from(msg: &geometry_msgs::Transform) -> Result<Self, Self::Error> {
        let q = &msg.rotation;
        let rotation = rotation_from_xyzw(q.x, q.y, q.z, q.w)
            .ok_or_else(|| Error::Config(format!("invalid rotation {:?}", q)))?;
        let t = &msg.translation;
        Ok(Transform::new([t.x, t.y, t.z], rotation))
    }
}

impl From<&Transform> for geometry_msgs::Transform {
    fn from(t: &Transform) -> Self {
        let [x, y, z] = t.translation();
        let q = t.rotation();
        geometry_msgs::Transform {
            translation: geometry_msgs::Vector3 { x, y, z },
            rotation: geometry_msgs::Quaternion {
                x: q.i,
                y: q.j,
                z: q.k,
                w: q.w,
            },
        }
    }
}

/// Time at which a transform is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupTime {
    /// Most recent transform available on every edge.
    #[default]
    Latest,
    /// Transform valid at this time in nanoseconds.
    At(u64),
}

/// Reasons a transform could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformUnavailable {
    /// The frame has never been seen.
    UnknownFrame(String),
    /// Both frames are known but do not share a tree.
    NotConnected { target: String, source: String },
    /// A dynamic edge on the path is too far from the requested time.
    Extrapolation {
        frame: String,
        stamp: u64,
        requested: u64,
    },
    /// The transform store is being updated; try again next cycle.
    Busy,
}

impl std::error::Error for TransformUnavailable {}

impl fmt::Display for TransformUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransformUnavailable::UnknownFrame(frame) => {
                write!(f, "frame \"{}\" does not exist", frame)
            }
            TransformUnavailable::NotConnected { target, source } => write!(
                f,
                "\"{}\" and \"{}\" are not part of the same tree",
                target, source
            ),
            TransformUnavailable::Extrapolation {
                frame,
                stamp,
                requested,
            } => write!(
                f,
                "transform for \"{}\" stamped {} cannot be used at {}",
                frame, stamp, requested
            ),
            TransformUnavailable::Busy => write!(f, "transform buffer busy"),
        }
    }
}

/// Resolves the transform taking points from `source` into `target`.
///
/// Implementations must answer immediately; a transform that is not known
/// right now is reported as [`TransformUnavailable`].
pub trait FrameResolver {
    fn lookup(
        &self,
        target: &str,
        source: &str,
        at: LookupTime,
    ) -> Result<Transform, TransformUnavailable>;
}

#[derive(Debug, Clone)]
struct Edge {
    parent: String,
    transform: Transform,
    /// `None` for static edges.
    stamp: Option<u64>,
}

/// Tree of named frames.
#[derive(Debug, Clone)]
pub struct TransformBuffer {
    edges: HashMap<String, Edge>,
    tolerance: u64,
}

impl Default for TransformBuffer {
    fn default() -> Self {
        Self::new(100_000_000)
    }
}

impl TransformBuffer {
    /// Create an empty buffer. Dynamic edges are usable within `tolerance`
    /// nanoseconds of their stamp when a specific time is requested.
    pub fn new(tolerance: u64) -> Self {
        Self {
            edges: HashMap::new(),
            tolerance,
        }
    }

    /// Insert or replace a parent → child edge that never expires.
    pub fn set_static(
        &mut self,
        parent: &str,
        child: &str,
        transform: Transform,
    ) -> Result<(), Error> {
        self.insert(parent, child, transform, None)
    }

    /// Insert or replace a parent → child edge valid around `stamp`.
    pub fn set_dynamic(
        &mut self,
        parent: &str,
        child: &str,
        transform: Transform,
        stamp: u64,
    ) -> Result<(), Error> {
        self.insert(parent, child, transform, Some(stamp))
    }

    /// Whether `child` already hangs off `parent` as a static edge holding
    /// `transform`, up to float noise from a message round trip.
    pub fn has_static(&self, parent: &str, child: &str, transform: &Transform) -> bool {
        self.edges.get(child).is_some_and(|edge| {
            edge.stamp.is_none()
                && edge.parent == parent
                && edge.transform.approx_eq(transform, 1e-12)
        })
    }

    fn insert(
        &mut self,
        parent: &str,
        child: &str,
        transform: Transform,
        stamp: Option<u64>,
    ) -> Result<(), Error> {
        if parent.is_empty() || child.is_empty() {
            return Err(Error::Config("empty frame id".to_string()));
        }
        if parent == child {
            return Err(Error::Config(format!("frame \"{}\" is its own parent", child)));
        }
        if !transform.is_finite() {
            return Err(Error::Config(format!(
                "non-finite transform for \"{}\"",
                child
            )));
        }

        self.edges.insert(
            child.to_string(),
            Edge {
                parent: parent.to_string(),
                transform,
                stamp,
            },
        );
        Ok(())
    }

    /// Whether the frame appears anywhere in the tree.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame) || self.edges.values().any(|e| e.parent == frame)
    }

    /// `frame` followed by its ancestors up to the root, ignoring stamps.
    fn ancestors<'a>(&'a self, frame: &'a str) -> Vec<&'a str> {
        let mut ancestors = vec![frame];
        let mut current = frame;

        while let Some(edge) = self.edges.get(current) {
            current = edge.parent.as_str();
            ancestors.push(current);

            if ancestors.len() > MAX_TREE_DEPTH {
                break;
            }
        }

        ancestors
    }

    /// Transform mapping points from `frame` into `ancestor`. Only the edges
    /// walked are checked against the requested time.
    fn to_ancestor(
        &self,
        frame: &str,
        ancestor: &str,
        at: LookupTime,
    ) -> Result<Transform, TransformUnavailable> {
        let mut current = frame;
        let mut accumulated = Transform::identity();

        for _ in 0..MAX_TREE_DEPTH {
            if current == ancestor {
                return Ok(accumulated);
            }
            let Some(edge) = self.edges.get(current) else {
                break;
            };

            if let (Some(stamp), LookupTime::At(requested)) = (edge.stamp, at)
                && stamp.abs_diff(requested) > self.tolerance
            {
                return Err(TransformUnavailable::Extrapolation {
                    frame: current.to_string(),
                    stamp,
                    requested,
                });
            }

            accumulated = edge.transform.compose(&accumulated);
            current = edge.parent.as_str();
        }

        Err(TransformUnavailable::NotConnected {
            target: ancestor.to_string(),
            source: frame.to_string(),
        })
    }
}

impl FrameResolver for TransformBuffer {
    fn lookup(
        &self,
        target: &str,
        source: &str,
        at: LookupTime,
    ) -> Result<Transform, TransformUnavailable> {
        for frame in [target, source] {
            if !self.has_frame(frame) {
                return Err(TransformUnavailable::UnknownFrame(frame.to_string()));
            }
        }
        if target == source {
            return Ok(Transform::identity());
        }

        let source_ancestors = self.ancestors(source);
        let target_ancestors = self.ancestors(target);
        let Some(common) = source_ancestors
            .into_iter()
            .find(|frame| target_ancestors.contains(frame))
        else {
            return Err(TransformUnavailable::NotConnected {
                target: target.to_string(),
                source: source.to_string(),
            });
        };

        let common_from_source = self.to_ancestor(source, common, at)?;
        let common_from_target = self.to_ancestor(target, common, at)?;
        Ok(common_from_target.inverse().compose(&common_from_source))
    }
}

/// [`TransformBuffer`] shared between a writer (tf listener) and pipelines.
///
/// Reads never block: if the writer holds the lock the lookup reports
/// [`TransformUnavailable::Busy`].
#[derive(Debug, Clone, Default)]
pub struct SharedTransformBuffer {
    inner: Arc<RwLock<TransformBuffer>>,
}

impl SharedTransformBuffer {
    pub fn new(buffer: TransformBuffer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(buffer)),
        }
    }

    /// Run `f` with exclusive access to the buffer.
    pub fn update<R>(&self, f: impl FnOnce(&mut TransformBuffer) -> R) -> R {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Store a static edge, taking the write lock only when it differs from
    /// the one already held. Returns whether the buffer changed.
    ///
    /// `tf_static` is republished periodically, including our own pose, so
    /// most messages repeat a known edge.
    pub fn set_static(
        &self,
        parent: &str,
        child: &str,
        transform: Transform,
    ) -> Result<bool, Error> {
        let unchanged = match self.inner.read() {
            Ok(guard) => guard.has_static(parent, child, &transform),
            Err(poisoned) => poisoned.into_inner().has_static(parent, child, &transform),
        };
        if unchanged {
            return Ok(false);
        }

        self.update(|buffer| buffer.set_static(parent, child, transform))?;
        Ok(true)
    }
}

impl FrameResolver for SharedTransformBuffer {
    fn lookup(
        &self,
        target: &str,
        source: &str,
        at: LookupTime,
    ) -> Result<Transform, TransformUnavailable> {
        match self.inner.try_read() {
            Ok(guard) => guard.lookup(target, source, at),
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().lookup(target, source, at)
            }
            Err(TryLockError::WouldBlock) => Err(TransformUnavailable::Busy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    fn yaw(angle: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(0.0, 0.0, angle)
    }

    #[test]
    fn test_rotation_then_translation() {
        let t = Transform::new([1.0, 2.0, 3.0], yaw(FRAC_PI_2));
        assert_close(t.apply([1.0, 0.0, 0.0]), [1.0, 3.0, 3.0]);
    }

    #[test]
    fn test_inverse_and_compose() {
        let t = Transform::new([0.5, -1.0, 2.0], yaw(0.3));
        let p = [3.0, 4.0, 5.0];
        assert_close(t.inverse().apply(t.apply(p)), p);
        assert_close(t.compose(&t.inverse()).apply(p), p);

        let u = Transform::new([0.0, 0.0, 1.0], yaw(-1.2));
        assert_close(t.compose(&u).apply(p), t.apply(u.apply(p)));
    }

    #[test]
    fn test_rotation_from_xyzw() {
        let q = rotation_from_xyzw(0.0, 0.0, 0.0, 2.0).unwrap();
        assert_eq!(q, UnitQuaternion::identity());

        let q = rotation_from_xyzw(0.0, 0.0, 0.6, 0.8).unwrap();
        assert!((q.angle() - 2.0 * 0.6f64.atan2(0.8)).abs() < 1e-12);

        assert!(rotation_from_xyzw(0.0, 0.0, 0.0, 0.0).is_none());
        assert!(rotation_from_xyzw(f64::NAN, 0.0, 0.0, 1.0).is_none());
    }

    #[test]
    fn test_geometry_msg_conversion() {
        let rotation = rotation_from_xyzw(0.0, 0.0, 0.6, 0.8).unwrap();
        let t = Transform::new([1.0, 2.0, 3.0], rotation);
        let msg = geometry_msgs::Transform::from(&t);
        assert_eq!(msg.translation.y, 2.0);
        assert!((msg.rotation.z - 0.6).abs() < 1e-12);
        assert!((msg.rotation.w - 0.8).abs() < 1e-12);

        let back = Transform::try_from(&msg).unwrap();
        assert_close(back.apply([1.0, 0.0, 0.0]), t.apply([1.0, 0.0, 0.0]));

        let mut zero = msg;
        zero.rotation.w = 0.0;
        zero.rotation.z = 0.0;
        assert!(matches!(Transform::try_from(&zero), Err(Error::Config(_))));
    }

    #[test]
    fn test_lookup_parent_child() {
        let mut buf = TransformBuffer::default();
        let sensor = Transform::new([0.2, 0.0, 1.5], yaw(FRAC_PI_2));
        buf.set_static("base_link", "lidar", sensor).unwrap();

        let t = buf.lookup("base_link", "lidar", LookupTime::Latest).unwrap();
        assert_close(t.apply([1.0, 0.0, 0.0]), [0.2, 1.0, 1.5]);

        let back = buf.lookup("lidar", "base_link", LookupTime::Latest).unwrap();
        assert_close(back.apply([0.2, 1.0, 1.5]), [1.0, 0.0, 0.0]);

        let same = buf.lookup("lidar", "lidar", LookupTime::Latest).unwrap();
        assert_eq!(same, Transform::identity());
    }

    #[test]
    fn test_lookup_through_common_ancestor() {
        let mut buf = TransformBuffer::default();
        buf.set_static(
            "base_link",
            "lidar",
            Transform::new([1.0, 0.0, 0.0], UnitQuaternion::identity()),
        )
        .unwrap();
        buf.set_static(
            "base_link",
            "camera",
            Transform::new([0.0, 1.0, 0.0], UnitQuaternion::identity()),
        )
        .unwrap();

        let t = buf.lookup("camera", "lidar", LookupTime::Latest).unwrap();
        assert_close(t.apply([0.0, 0.0, 0.0]), [1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_lookup_failures() {
        let mut buf = TransformBuffer::default();
        assert_eq!(
            buf.lookup("base_link", "lidar", LookupTime::Latest),
            Err(TransformUnavailable::UnknownFrame("base_link".to_string()))
        );

        buf.set_static("base_link", "lidar", Transform::identity())
            .unwrap();
        buf.set_static("map", "odom", Transform::identity()).unwrap();
        assert!(matches!(
            buf.lookup("odom", "lidar", LookupTime::Latest),
            Err(TransformUnavailable::NotConnected { .. })
        ));
    }

    #[test]
    fn test_dynamic_edge_tolerance() {
        let mut buf = TransformBuffer::new(1_000);
        buf.set_dynamic("odom", "base_link", Transform::identity(), 10_000)
            .unwrap();

        assert!(buf.lookup("odom", "base_link", LookupTime::Latest).is_ok());
        assert!(buf.lookup("odom", "base_link", LookupTime::At(10_500)).is_ok());
        assert_eq!(
            buf.lookup("odom", "base_link", LookupTime::At(20_000)),
            Err(TransformUnavailable::Extrapolation {
                frame: "base_link".to_string(),
                stamp: 10_000,
                requested: 20_000,
            })
        );

        // Static edges ignore the requested time.
        buf.set_static("odom", "base_link", Transform::identity())
            .unwrap();
        assert!(buf.lookup("odom", "base_link", LookupTime::At(0)).is_ok());
    }

    #[test]
    fn test_stale_edge_above_common_ancestor_is_ignored() {
        let mut buf = TransformBuffer::new(100_000_000);
        buf.set_dynamic("odom", "base_link", Transform::identity(), 1_000_000_000)
            .unwrap();
        let mount = Transform::new([0.2, 0.0, 1.5], yaw(0.3));
        buf.set_static("base_link", "lidar", mount).unwrap();

        // base_link is the common ancestor: odom -> base_link is never walked.
        let t = buf
            .lookup("base_link", "lidar", LookupTime::At(5_000_000_000))
            .unwrap();
        assert_close(t.apply([1.0, 0.0, 0.0]), mount.apply([1.0, 0.0, 0.0]));

        // Siblings below base_link share the same ancestor.
        buf.set_static("base_link", "camera", Transform::identity())
            .unwrap();
        assert!(
            buf.lookup("camera", "lidar", LookupTime::At(5_000_000_000))
                .is_ok()
        );

        // Walking up to odom does cross the stale edge.
        assert!(matches!(
            buf.lookup("odom", "lidar", LookupTime::At(5_000_000_000)),
            Err(TransformUnavailable::Extrapolation { .. })
        ));
    }

    #[test]
    fn test_insert_validation() {
        let mut buf = TransformBuffer::default();
        assert!(buf.set_static("", "lidar", Transform::identity()).is_err());
        assert!(buf.set_static("lidar", "lidar", Transform::identity()).is_err());

        let nan = Transform::new([f64::NAN, 0.0, 0.0], UnitQuaternion::identity());
        assert!(buf.set_static("base_link", "lidar", nan).is_err());
        assert!(!buf.has_frame("lidar"));
    }

    #[test]
    fn test_reparenting_cycle_is_bounded() {
        let mut buf = TransformBuffer::default();
        buf.set_static("a", "b", Transform::identity()).unwrap();
        buf.set_static("b", "a", Transform::identity()).unwrap();
        buf.set_static("c", "d", Transform::identity()).unwrap();

        assert!(matches!(
            buf.lookup("d", "a", LookupTime::Latest),
            Err(TransformUnavailable::NotConnected { .. })
        ));
    }

    #[test]
    fn test_shared_buffer_busy_while_writing() {
        let shared = SharedTransformBuffer::default();
        shared
            .update(|buf| buf.set_static("base_link", "lidar", Transform::identity()))
            .unwrap();
        assert!(shared.lookup("base_link", "lidar", LookupTime::Latest).is_ok());

        let reader = shared.clone();
        let result = shared.update(|_| reader.lookup("base_link", "lidar", LookupTime::Latest));
        assert_eq!(result, Err(TransformUnavailable::Busy));
    }

    #[test]
    fn test_shared_set_static_skips_unchanged_edge() {
        let shared = SharedTransformBuffer::default();
        let mount = Transform::new([0.2, 0.0, 1.5], yaw(0.3));

        assert!(shared.set_static("base_link", "lidar", mount).unwrap());
        assert!(!shared.set_static("base_link", "lidar", mount).unwrap());

        let echoed = Transform::try_from(&geometry_msgs::Transform::from(&mount)).unwrap();
        assert!(!shared.set_static("base_link", "lidar", echoed).unwrap());

        let moved = Transform::new([0.3, 0.0, 1.5], yaw(0.3));
        assert!(shared.set_static("base_link", "lidar", moved).unwrap());
        assert!(shared.set_static("odom", "lidar", moved).unwrap());

        // A dynamic edge is replaced by an equal static one.
        shared
            .update(|buf| buf.set_dynamic("odom", "lidar", moved, 10))
            .unwrap();
        assert!(shared.set_static("odom", "lidar", moved).unwrap());

        assert!(shared.set_static("", "lidar", moved).is_err());
    }
}
