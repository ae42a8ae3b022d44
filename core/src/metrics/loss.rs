//! Loss estimation from per-stream sequence runs.
//!
//! The aggregator side compresses arrivals into [`SeqRange`] runs in O(1) per
//! packet, most recent run last; physical order is recovered later. The
//! reporter side reconciles one period's runs against a persistent per-stream
//! cursor, pulling in runs from up to `min_batches - 1` future periods so a
//! packet that slipped past a period boundary is not misread as a drop, and a
//! synthetic one-point run for the previous period's high watermark so the
//! seam between periods is not misread as a gap.

use crate::flowtrack::key::FlowKey;
use crate::flowtrack::FlowTable;
use crate::memory::Pool;
use crate::metrics::flowstate::FlowState;
use crate::metrics::AggData;
use crate::seq::{modular_distance, SeqRange, Seqno};

/// Gap above which two sorted runs are taken to straddle the wrap point.
const HALF_SEQ_SPACE: u32 = 1 << 31;

/// Aggregator-side loss record: the period's arrival runs, most recent last.
#[derive(Debug, Default)]
pub struct LossAccum {
    pub ranges: Vec<SeqRange>,
    pub flowstate: FlowState,
}

impl LossAccum {
    /// Folds one arrival into the run list.
    ///
    /// Extends the most recent run when `seq` is its immediate successor
    /// (never across zero); otherwise opens a fresh single-point run. The
    /// backing buffer is drawn from `spare` the first time it is needed.
    pub fn arrival(&mut self, seq: Seqno, spare: &mut Pool<Vec<SeqRange>>) {
        match self.ranges.last_mut() {
            Some(run) if seq != 0 && run.high == seq - 1 => run.high = seq,
            _ => {
                if self.ranges.capacity() == 0 {
                    if let Some(buf) = spare.take() {
                        self.ranges = buf;
                    }
                }
                self.ranges.push(SeqRange::single(seq));
            }
        }
        self.flowstate = self.flowstate.with_packet();
    }

    /// Records a flow birth or death event.
    ///
    /// Nothing in the pipeline generates these yet; the transition is kept so
    /// a flow lifecycle source can be plumbed in without touching the state
    /// algebra.
    pub fn birth_death(&mut self) {
        self.flowstate = self.flowstate.delimited();
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
        self.flowstate = FlowState::Empty;
    }
}

/// Reporter-side loss counters for one stream record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LossReport {
    pub flowstate: FlowState,
    /// Streams skipped during flow accumulation because their flowstate was
    /// in error.
    pub badflows: u32,
    pub received: u64,
    pub dropped: u64,
    /// A run of N contiguous drops adds N - 1 here.
    pub consecutive_drops: u64,
    pub gap_total: u64,
    pub gap_count: u64,
    pub gap_min: u32,
    pub gap_max: u32,
}

/// Cross-period reconciliation cursor for one stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LossState {
    /// Highest sequence number accounted for by the previous period.
    pub high_seqno: Option<Seqno>,
    /// Last run folded into the tallies; distances are measured from its
    /// high end.
    pub last_range: Option<SeqRange>,
}

/// Which period a candidate run was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Past,
    Present,
    Future,
}

/// A run staged for reconciliation. Scratch storage only; the runs owned by
/// period tables are never modified.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    low: Seqno,
    high: Seqno,
    wrapped: bool,
    origin: Origin,
}

impl Candidate {
    fn new(range: &SeqRange, origin: Origin) -> Self {
        Candidate {
            low: range.low,
            high: range.high,
            wrapped: false,
            origin,
        }
    }
}

/// Reconciles one period's runs into `report`, advancing the stream cursor.
///
/// `futures` supplies the periods after the one being processed, earliest
/// first; only runs up to the last present-period run are tallied now, the
/// rest merely extend the sort horizon. `scratch` is reused across calls.
pub fn reconcile<'a, I>(
    report: &mut LossReport,
    accum: &LossAccum,
    state: &mut LossState,
    futures: I,
    key: &FlowKey,
    scratch: &mut Vec<Candidate>,
) where
    I: IntoIterator<Item = &'a FlowTable<AggData>>,
{
    scratch.clear();
    report.flowstate = accum.flowstate;

    for range in &accum.ranges {
        scratch.push(Candidate::new(range, Origin::Present));
    }

    // If the period does not open with a delimiter, the previous period's
    // high watermark anchors the seam.
    if accum.flowstate.begins_with_packet() {
        if let Some(high) = state.high_seqno {
            scratch.push(Candidate::new(&SeqRange::single(high), Origin::Past));
        }
    }

    for table in futures {
        if let Some(entry) = table.retrieve(key) {
            for range in &entry.value.loss.ranges {
                scratch.push(Candidate::new(range, Origin::Future));
            }
        }
    }

    state.high_seqno = None;
    if scratch.is_empty() {
        return;
    }

    sort_candidates(scratch);

    // Wrap detection: walk the sorted runs flagging them as pre-wrap until a
    // gap wider than half the space splits the array, then resort so the
    // pre-wrap runs come first. Flagging every run is harmless when no split
    // is found.
    for i in 0..scratch.len() {
        scratch[i].wrapped = true;
        if i + 1 < scratch.len()
            && scratch[i + 1].low.wrapping_sub(scratch[i].high) > HALF_SEQ_SPACE
        {
            sort_candidates(scratch);
            break;
        }
    }

    // Trim: skip past-period runs at the front, stop at the last run that is
    // not from a future period.
    let mut begin = 0;
    let mut end = scratch.len();
    for (i, candidate) in scratch.iter().enumerate() {
        if candidate.origin == Origin::Past {
            begin = i + 1;
        }
        if candidate.origin != Origin::Future {
            end = i;
        }
    }
    if end >= scratch.len() {
        return; // nothing from the present period survived the trim
    }

    // First run ever seen for this stream: pretend the packet just before it
    // arrived, so the run itself is fully counted.
    if state.last_range.is_none() {
        if let Some(first) = scratch.get(begin) {
            let anchor = first.low.wrapping_sub(1);
            state.last_range = Some(SeqRange {
                low: anchor,
                high: anchor,
            });
        }
    }

    // Distances are measured from the cursor position at entry, not from the
    // runs folded in below.
    let base = match state.last_range {
        Some(range) => range.high,
        None => return,
    };

    for i in begin..=end {
        let prev = match state.last_range {
            Some(range) => range,
            None => break,
        };
        let mut run = scratch[i];

        let d_prev_high = modular_distance(base, prev.high);
        let d_this_low = modular_distance(base, run.low);
        let d_this_high = modular_distance(base, run.high);

        if d_this_low <= d_prev_high {
            if d_this_high <= d_prev_high {
                // fully inside the previous run
                continue;
            }
            // Rewrite the low side to one past the overlap point, e.g.
            // (1,5) then (4,6) counts only 6.
            run.low = run.high.min(prev.high).wrapping_add(1);
        }
        // Keep the run from wrapping back around to the base.
        if run.high < run.low {
            run.high = base.wrapping_sub(1);
        }
        scratch[i] = run;

        let received = u64::from(run.high.wrapping_sub(run.low).wrapping_add(1));
        let distance = modular_distance(prev.high, run.low);
        // (x,4) then (7,y): distance 3, gap 2, for sequence numbers 5 and 6
        let gap = distance.saturating_sub(1);

        state.last_range = Some(SeqRange {
            low: run.low,
            high: run.high,
        });

        report.received += received;
        report.dropped += u64::from(gap);
        if gap > 1 {
            report.consecutive_drops += u64::from(gap - 1);
        }
        if gap > 0 {
            if report.gap_count == 0 || gap < report.gap_min {
                report.gap_min = gap;
            }
            if report.gap_count == 0 || gap > report.gap_max {
                report.gap_max = gap;
            }
            report.gap_total += u64::from(gap);
            report.gap_count += 1;
        }
    }

    state.high_seqno = Some(scratch[end].high);
}

fn sort_candidates(scratch: &mut [Candidate]) {
    // pre-wrap runs first, then circularly ascending low ends: the
    // difference cast to a signed word orders values that straddle the wrap
    scratch.sort_by(|a, b| {
        b.wrapped
            .cmp(&a.wrapped)
            .then_with(|| (a.low.wrapping_sub(b.low) as i32).cmp(&0))
    });
}

fn merge(accum: &mut LossReport, unit: &LossReport) {
    if accum.received + accum.dropped != 0 && unit.received + unit.dropped != 0 {
        accum.received += unit.received;
        accum.dropped += unit.dropped;
        accum.consecutive_drops += unit.consecutive_drops;
        accum.gap_total += unit.gap_total;
        accum.gap_count += unit.gap_count;
        accum.gap_min = accum.gap_min.min(unit.gap_min);
        accum.gap_max = accum.gap_max.max(unit.gap_max);
    } else if unit.received + unit.dropped != 0 {
        accum.received = unit.received;
        accum.dropped = unit.dropped;
        accum.consecutive_drops = unit.consecutive_drops;
        accum.gap_total = unit.gap_total;
        accum.gap_count = unit.gap_count;
        accum.gap_min = unit.gap_min;
        accum.gap_max = unit.gap_max;
        accum.badflows = unit.badflows;
    }
}

/// Accumulates consecutive reporting units of the same stream.
pub fn accumulate_time(accum: &mut LossReport, unit: &LossReport) {
    merge(accum, unit);
    accum.flowstate = accum.flowstate.concat(unit.flowstate);
}

/// Accumulates stream records into their flow record.
pub fn accumulate_flows(accum: &mut LossReport, unit: &LossReport) {
    if unit.flowstate.is_error() {
        accum.badflows += 1;
    } else {
        merge(accum, unit);
    }
}
