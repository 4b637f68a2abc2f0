// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Full-rotation scan accumulation.
//!
//! Decoded column packets are written into a fixed-geometry [`Scan`] until a
//! full sensor rotation has been collected. The [`RotationAccumulator`] keeps
//! two scans and swaps them when a rotation completes, so the completed scan
//! stays untouched while the consumer projects it.
//!
//! ```text
//! ┌──────────────┐ accumulate ┌──────────────────────────────────────┐
//! │ ColumnPacket │ ─────────► │        RotationAccumulator           │
//! └──────────────┘            │  ┌────────────┐    ┌────────────┐    │
//!                             │  │  Scan A    │ ←→ │  Scan B    │    │
//!                             │  │ (filling)  │swap│ (complete) │    │
//!                             │  └────────────┘    └────────────┘    │
//!                             └──────────────────────────────────────┘
//!                                                 │ ScanBuffer
//!                                                 ▼
//!                                             Pipeline
//! ```

use crate::lidar::Error;
use edgefirst_schemas::serde_cdr;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A single decoded azimuth column: one sample per beam (row).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Azimuth index of this column within the rotation, `0..width`.
    pub measurement_id: u16,
    /// Capture time of the column in nanoseconds.
    pub timestamp: u64,
    /// Range in millimetres, 0 when there was no return.
    pub range: Vec<u32>,
    pub signal: Vec<u16>,
    pub reflectivity: Vec<u16>,
    pub near_ir: Vec<u16>,
}

impl Column {
    /// Number of rows carried by this column, or the first inconsistent
    /// length when the sample arrays disagree.
    fn rows(&self) -> Result<usize, Error> {
        let rows = self.range.len();
        for len in [self.signal.len(), self.reflectivity.len(), self.near_ir.len()] {
            if len != rows {
                return Err(Error::UnsupportedRows(len));
            }
        }
        Ok(rows)
    }
}

/// A batch of columns as delivered by the sensor driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnPacket {
    /// Rotation index; changes every time the sensor crosses zero azimuth.
    pub frame_id: u16,
    pub columns: Vec<Column>,
}

impl ColumnPacket {
    /// Decode a CDR encoded packet as carried on the columns topic.
    pub fn from_cdr(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_cdr::deserialize(bytes)?)
    }
}

/// One rotation worth of samples laid out as `height × width`.
#[derive(Clone, Debug)]
pub struct Scan {
    range: Array2<u32>,
    signal: Array2<u16>,
    reflectivity: Array2<u16>,
    near_ir: Array2<u16>,
    timestamps: Vec<u64>,
    valid: Vec<bool>,
}

impl Scan {
    /// Create an empty scan of `width` columns by `height` rows.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            range: Array2::zeros((height, width)),
            signal: Array2::zeros((height, width)),
            reflectivity: Array2::zeros((height, width)),
            near_ir: Array2::zeros((height, width)),
            timestamps: vec![0; width],
            valid: vec![false; width],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.range.ncols()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.range.nrows()
    }

    /// Range in millimetres, indexed `[row, column]`.
    pub fn range(&self) -> &Array2<u32> {
        &self.range
    }

    pub fn signal(&self) -> &Array2<u16> {
        &self.signal
    }

    pub fn reflectivity(&self) -> &Array2<u16> {
        &self.reflectivity
    }

    pub fn near_ir(&self) -> &Array2<u16> {
        &self.near_ir
    }

    /// Per-column capture timestamps in nanoseconds, 0 for missing columns.
    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    /// Whether each column was received during this rotation.
    pub fn valid(&self) -> &[bool] {
        &self.valid
    }

    /// Number of columns received during this rotation.
    pub fn valid_columns(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Zero all samples and mark every column as missing.
    pub fn clear(&mut self) {
        self.range.fill(0);
        self.signal.fill(0);
        self.reflectivity.fill(0);
        self.near_ir.fill(0);
        self.timestamps.fill(0);
        self.valid.fill(false);
    }

    /// Check that a column fits this scan without modifying anything.
    pub fn check_column(&self, column: &Column) -> Result<(), Error> {
        let rows = column.rows()?;
        if rows != self.height() {
            return Err(Error::UnsupportedRows(rows));
        }
        if column.measurement_id as usize >= self.width() {
            return Err(Error::TooManyColumns(column.measurement_id as usize));
        }
        Ok(())
    }

    /// Write a column into the scan at its measurement id.
    pub fn write_column(&mut self, column: &Column) -> Result<(), Error> {
        self.check_column(column)?;
        let col = column.measurement_id as usize;

        self.range
            .column_mut(col)
            .assign(&ArrayView1::from(&column.range[..]));
        self.signal
            .column_mut(col)
            .assign(&ArrayView1::from(&column.signal[..]));
        self.reflectivity
            .column_mut(col)
            .assign(&ArrayView1::from(&column.reflectivity[..]));
        self.near_ir
            .column_mut(col)
            .assign(&ArrayView1::from(&column.near_ir[..]));
        self.timestamps[col] = column.timestamp;
        self.valid[col] = true;
        Ok(())
    }
}

/// Read-only view of an accumulated rotation.
///
/// `is_ready()` returning true is the sole trigger for projection; while it
/// holds, [`ScanBuffer::scan`] returns a complete scan that will not change
/// until the buffer is fed again.
pub trait ScanBuffer {
    fn is_ready(&self) -> bool;

    fn scan(&self) -> &Scan;

    /// Capture time of the completed rotation in nanoseconds.
    fn timestamp(&self) -> u64;

    /// Number of packets that contributed to the completed rotation.
    fn packet_count(&self) -> usize;
}

/// Double-buffered [`ScanBuffer`] fed with decoded [`ColumnPacket`]s.
///
/// A rotation completes when the final column (`width - 1`) arrives, or when
/// a packet from a new rotation (`frame_id` change) interrupts a partial one.
/// Readiness lasts until the next call to [`RotationAccumulator::accumulate`].
#[derive(Debug)]
pub struct RotationAccumulator {
    scans: [Scan; 2],
    filling_idx: usize,
    frame_id: Option<u16>,
    filling_packets: usize,
    filling_timestamp: Option<u64>,
    pending: bool,
    ready: bool,
    ready_timestamp: u64,
    ready_packets: usize,
}

impl RotationAccumulator {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            scans: [Scan::new(width, height), Scan::new(width, height)],
            filling_idx: 0,
            frame_id: None,
            filling_packets: 0,
            filling_timestamp: None,
            pending: false,
            ready: false,
            ready_timestamp: 0,
            ready_packets: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.scans[0].width()
    }

    pub fn height(&self) -> usize {
        self.scans[0].height()
    }

    /// The partially filled rotation.
    pub fn filling(&self) -> &Scan {
        &self.scans[self.filling_idx]
    }

    /// Add a packet to the current rotation.
    ///
    /// Returns `Ok(true)` when this call completed a rotation. Invalid
    /// packets are rejected before any column is written, but still end the
    /// previous readiness and release a deferred rotation, so check
    /// [`ScanBuffer::is_ready`] after an error too.
    pub fn accumulate(&mut self, packet: &ColumnPacket) -> Result<bool, Error> {
        self.ready = false;
        if self.pending {
            self.pending = false;
            self.complete();
        }

        let filling = &self.scans[self.filling_idx];
        for column in &packet.columns {
            filling.check_column(column)?;
        }

        if packet.columns.is_empty() {
            return Ok(self.ready);
        }

        if let Some(current) = self.frame_id
            && current != packet.frame_id
            && self.filling_packets > 0
        {
            trace!(
                "rotation {} interrupted by {} after {} columns",
                current,
                packet.frame_id,
                self.filling().valid_columns()
            );
            self.complete();
        }

        let last = self.width() - 1;
        let mut saw_last = false;
        let filling = &mut self.scans[self.filling_idx];
        for column in &packet.columns {
            filling.write_column(column)?;
            saw_last |= column.measurement_id as usize == last;
        }

        if self.filling_timestamp.is_none() {
            self.filling_timestamp = Some(packet.columns[0].timestamp);
        }
        self.filling_packets += 1;
        self.frame_id = Some(packet.frame_id);

        if saw_last {
            if self.ready {
                // A rotation was already handed out during this call.
                self.pending = true;
            } else {
                self.complete();
            }
        }

        Ok(self.ready)
    }

    /// Drop the partial rotation and any completed one.
    pub fn reset(&mut self) {
        for scan in &mut self.scans {
            scan.clear();
        }
        self.frame_id = None;
        self.filling_packets = 0;
        self.filling_timestamp = None;
        self.pending = false;
        self.ready = false;
        self.ready_timestamp = 0;
        self.ready_packets = 0;
    }

    fn complete(&mut self) {
        self.ready_timestamp = self.filling_timestamp.take().unwrap_or_default();
        self.ready_packets = std::mem::take(&mut self.filling_packets);
        self.filling_idx = 1 - self.filling_idx;
        self.scans[self.filling_idx].clear();
        self.frame_id = None;
        self.ready = true;
    }
}

impl ScanBuffer for RotationAccumulator {
    #[inline]
    fn is_ready(&self) -> bool {
        self.ready
    }

    #[inline]
    fn scan(&self) -> &Scan {
        &self.scans[1 - self.filling_idx]
    }

    #[inline]
    fn timestamp(&self) -> u64 {
        self.ready_timestamp
    }

    #[inline]
    fn packet_count(&self) -> usize {
        self.ready_packets
    }
}
