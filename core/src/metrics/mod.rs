//! Measurement records and the algorithms that fill them.
//!
//! Every stream carries three parallel record families: aggregator-side
//! accumulation ([`AggData`]), reporter-side tallies ([`ReporterData`]) and
//! cross-period state ([`StateData`]). The aggregator only ever appends to
//! its records; the reporter converts them into tallies against the
//! persistent state.

pub mod flowstate;
pub mod loss;
pub mod packet;
pub mod reorder;

pub use flowstate::FlowState;
pub use packet::PacketSummary;

use crate::memory::Recycle;

use self::loss::{LossAccum, LossReport, LossState};
use self::reorder::{ReorderAccum, ReorderReport, ReorderState};

/// Aggregator-side value of a period-table entry.
#[derive(Debug, Default)]
pub struct AggData {
    pub packets: PacketSummary,
    pub loss: LossAccum,
    pub reorder: ReorderAccum,
}

impl Recycle for AggData {
    fn recycle(&mut self) {
        self.packets = PacketSummary::default();
        self.loss.clear();
        self.reorder.clear();
    }
}

/// Reporter-side value of a tracker-table entry.
#[derive(Debug, Default, Clone)]
pub struct ReporterData {
    pub packets: PacketSummary,
    pub loss: LossReport,
    pub reorder: ReorderReport,
}

impl Recycle for ReporterData {
    fn recycle(&mut self) {
        *self = ReporterData::default();
    }
}

/// Per-stream state that survives across reports.
#[derive(Debug, Default)]
pub struct StateData {
    pub loss: LossState,
    pub reorder: ReorderState,
}

impl Recycle for StateData {
    fn recycle(&mut self) {
        *self = StateData::default();
    }
}
