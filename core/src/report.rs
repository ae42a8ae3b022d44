//! Results delivered to the user callback.
//!
//! One [`Results`] value is produced per flow per due tracker, covering that
//! tracker's interval. Metric sub-results are present only when the interval
//! contained something to say about them.

use crate::flowtrack::key::KEY_SIZE;
use crate::seq::Seqno;
use crate::{TimeInterval, Timestamp};

use serde::Serialize;

/// Loss metrics over the measurement interval.
///
/// Duplicated packets count toward neither `packets_received` nor
/// `packets_dropped`.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct LossResults {
    pub packets_received: f64,
    pub packets_dropped: f64,
    /// Dropped fraction: `dropped / (received + dropped)`.
    pub value: f64,
    /// A run of N contiguous drops, N >= 1, adds N - 1 here.
    pub consecutive_drops: f64,
    /// Autocorrelation of consecutive losses, normalized by the variance
    /// (not by the probability that the first packet was lost).
    pub autocorr: f64,
}

/// Reorder-extent histogram over the measurement interval.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReorderExtentResults {
    /// Arrivals per extent, bin 0 holding in-order packets. Bins beyond the
    /// tracked maximum are not exported.
    pub bins: Vec<u32>,
    /// Missing packets declared dropped because their extent would exceed
    /// the tracked maximum.
    pub assumed_drops: u32,
}

/// One reorder-density bin.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct DensityBin {
    /// Displacement, `-REORDER_DT..=REORDER_DT`.
    pub distance: i32,
    pub frequency: u32,
}

/// Reorder-density histogram over the measurement interval.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReorderDensityResults {
    pub bins: Vec<DensityBin>,
}

/// One flow's report for one tracker interval.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Results {
    /// Flow the results apply to.
    pub flow_key: [u8; KEY_SIZE],
    /// Bounding wall-clock timestamps of the packets covered, microseconds.
    pub earliest: Timestamp,
    pub latest: Timestamp,
    /// Interval of the tracker that produced the report, microseconds.
    pub duration: TimeInterval,
    /// Bounding sequence numbers of the packets covered.
    pub min_seq: Seqno,
    pub max_seq: Seqno,
    pub packet_count: u32,
    pub loss: Option<LossResults>,
    pub reorder_extent: Option<ReorderExtentResults>,
    pub reorder_density: Option<ReorderDensityResults>,
}

/// Invoked on the reporter thread for each flow with observations. Context
/// travels in the closure's captured state; keep the body short, since a slow
/// callback delays every later report.
pub type ReportCallback = Box<dyn Fn(&Results) + Send>;
