//! The reporter thread.
//!
//! Sleeps until completed periods are pending, then processes them in
//! chronological order once at least `reporter_min_batches` are available.
//! Each period's stream records are reconciled against persistent per-stream
//! state and folded into one tracker per schedule item. When a tracker's
//! deadline passes, stream records consolidate into flow records, the
//! callback fires per flow, and the tracker is emptied. Processed storage
//! recycles back toward the aggregator.

use super::{MeasureFlags, PipelineShared};
use crate::flowtrack::key::FlowKey;
use crate::flowtrack::{FlowTable, PeriodList, TableEntry};
use crate::memory::{Pool, Recycle};
use crate::metrics::loss::{self, Candidate};
use crate::metrics::reorder::{self, REORDER_DT, REORDER_MAX_EXTENT};
use crate::metrics::{AggData, ReporterData, StateData};
use crate::report::{
    DensityBin, LossResults, ReorderDensityResults, ReorderExtentResults, ReportCallback, Results,
};
use crate::schedule::ReportSchedule;
use crate::seq::SeqRange;
use crate::utils::unix_micros;
use crate::TimeInterval;

use std::mem;
use std::sync::Arc;

pub(crate) struct Reporter {
    shared: Arc<PipelineShared>,
    schedule: ReportSchedule,
    callback: Option<ReportCallback>,
    min_batches: usize,
    flags: MeasureFlags,
    /// Completed periods spliced out of the shared area, earliest first.
    pending: PeriodList<AggData>,
    /// Per-stream reconciliation state; never emptied across reports.
    states: FlowTable<StateData>,
    state_spares: Pool<Box<TableEntry<StateData>>>,
    /// One accumulation table per schedule item.
    trackers: Vec<FlowTable<ReporterData>>,
    tracker_spares: Pool<Box<TableEntry<ReporterData>>>,
    /// Storage headed back to the aggregator through the shared area.
    spare_tables: Pool<Box<FlowTable<AggData>>>,
    spare_entries: Pool<Box<TableEntry<AggData>>>,
    spare_loss_ranges: Pool<Vec<SeqRange>>,
    spare_reorder_ranges: Pool<Vec<SeqRange>>,
    scratch: Vec<Candidate>,
}

impl Reporter {
    pub(crate) fn new(
        shared: Arc<PipelineShared>,
        schedule: ReportSchedule,
        callback: Option<ReportCallback>,
        min_batches: usize,
        flags: MeasureFlags,
    ) -> Self {
        let trackers = (0..schedule.parallelism())
            .map(|_| FlowTable::new())
            .collect();
        Reporter {
            shared,
            schedule,
            callback,
            min_batches,
            flags,
            pending: PeriodList::new(),
            states: FlowTable::new(),
            state_spares: Pool::new(),
            trackers,
            tracker_spares: Pool::new(),
            spare_tables: Pool::new(),
            spare_entries: Pool::new(),
            spare_loss_ranges: Pool::new(),
            spare_reorder_ranges: Pool::new(),
            scratch: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) {
        loop {
            let stop = {
                let mut area = self.shared.area.lock().unwrap();
                area.reporter_sleeping = true;
                while area.completed.count() == 0 && !self.shared.is_done() {
                    area = self.shared.batch_ready.wait(area).unwrap();
                }
                area.reporter_sleeping = false;
                if self.shared.is_done() {
                    true
                } else {
                    self.pending.move_all(&mut area.completed);
                    area.spare_tables.absorb(&mut self.spare_tables);
                    area.spare_entries.absorb(&mut self.spare_entries);
                    area.spare_loss_ranges.absorb(&mut self.spare_loss_ranges);
                    area.spare_reorder_ranges
                        .absorb(&mut self.spare_reorder_ranges);
                    false
                }
            };
            if stop {
                break;
            }

            while self.pending.count() >= self.min_batches {
                self.process_earliest();
            }
        }
        log::debug!("reporter exiting");
    }

    /// Converts the earliest pending period into tracker tallies, delivers
    /// any due trackers, then recycles the period's storage.
    fn process_earliest(&mut self) {
        let mut period = match self.pending.pop_earliest() {
            Some(period) => period,
            None => return,
        };

        for (key, entry) in period.iter() {
            let state = self.states.force(*key, &mut self.state_spares);
            let mut unit = ReporterData {
                packets: entry.value.packets,
                ..Default::default()
            };
            if self.flags.loss {
                loss::reconcile(
                    &mut unit.loss,
                    &entry.value.loss,
                    &mut state.value.loss,
                    self.pending.iter().take(self.min_batches - 1),
                    key,
                    &mut self.scratch,
                );
            }
            if self.flags.reorder() {
                reorder::scan(
                    &mut unit.reorder,
                    &entry.value.reorder,
                    &mut state.value.reorder,
                    self.flags.extent,
                    self.flags.density,
                );
            }
            for tracker in self.trackers.iter_mut() {
                let slot = tracker.force(*key, &mut self.tracker_spares);
                fold_time(self.flags, &mut slot.value, &unit);
            }
        }

        let now = unix_micros();
        for idx in 0..self.trackers.len() {
            let callback_due = match self.schedule.outlets(idx, now) {
                None => continue,
                Some(outlets) => {
                    let has_callback = outlets.contains('c');
                    if !has_callback {
                        log::error!("unsupported outlet: {}", outlets);
                    }
                    has_callback
                }
            };

            // Consolidate stream records into flow records. Forcing flow
            // entries while walking a key snapshot is safe: the snapshot only
            // contains stream keys.
            let stream_keys: Vec<FlowKey> = self.trackers[idx]
                .keys()
                .filter(|key| key.is_stream())
                .copied()
                .collect();
            for stream_key in stream_keys {
                let unit = match self.trackers[idx].retrieve(&stream_key) {
                    Some(entry) => entry.value.clone(),
                    None => continue,
                };
                let flow = self.trackers[idx].force(stream_key.to_flow(), &mut self.tracker_spares);
                fold_flow(self.flags, &mut flow.value, &unit);
            }

            if callback_due {
                if let Some(callback) = &self.callback {
                    for (key, entry) in self.trackers[idx].iter() {
                        if !key.is_flow() || entry.value.packets.packet_count == 0 {
                            continue;
                        }
                        let results = build_results(
                            key,
                            &entry.value,
                            self.schedule.duration(idx),
                            self.flags,
                        );
                        callback(&results);
                    }
                }
            }

            self.schedule.reset(idx, now);
            self.trackers[idx].zeroout(&mut self.tracker_spares);
        }

        // recycle storage, eventually back to the aggregator
        for (_, entry) in period.iter_mut() {
            let mut ranges = mem::take(&mut entry.value.loss.ranges);
            if ranges.capacity() > 0 {
                ranges.clear();
                self.spare_loss_ranges.put(ranges);
            }
            let mut ranges = mem::take(&mut entry.value.reorder.ranges);
            if ranges.capacity() > 0 {
                ranges.clear();
                self.spare_reorder_ranges.put(ranges);
            }
        }
        period.zeroout(&mut self.spare_entries);
        period.recycle();
        self.spare_tables.put(period);
    }
}

/// Accumulates one reporting unit into a tracker slot over time.
fn fold_time(flags: MeasureFlags, accum: &mut ReporterData, unit: &ReporterData) {
    accum.packets.accumulate(&unit.packets);
    if flags.loss {
        loss::accumulate_time(&mut accum.loss, &unit.loss);
    }
    if flags.reorder() {
        reorder::accumulate_time(&mut accum.reorder, &unit.reorder);
    }
}

/// Accumulates a stream record into its flow record.
fn fold_flow(flags: MeasureFlags, accum: &mut ReporterData, unit: &ReporterData) {
    accum.packets.accumulate(&unit.packets);
    if flags.loss {
        loss::accumulate_flows(&mut accum.loss, &unit.loss);
    }
    if flags.reorder() {
        reorder::accumulate_flows(&mut accum.reorder, &unit.reorder);
    }
}

fn build_results(
    key: &FlowKey,
    data: &ReporterData,
    duration: TimeInterval,
    flags: MeasureFlags,
) -> Results {
    let mut results = Results {
        flow_key: key.flow_key_bytes(),
        earliest: data.packets.earliest,
        latest: data.packets.latest,
        duration,
        min_seq: data.packets.min_seq,
        max_seq: data.packets.max_seq,
        packet_count: data.packets.packet_count,
        ..Default::default()
    };

    if flags.loss && data.loss.received > 0 {
        let received = data.loss.received as f64;
        let dropped = data.loss.dropped as f64;
        let consecutive = data.loss.consecutive_drops as f64;
        let autocorr = if dropped != 0.0 {
            (consecutive * received + consecutive * dropped - dropped * dropped)
                / (dropped * received)
        } else {
            0.0
        };
        results.loss = Some(LossResults {
            packets_received: received,
            packets_dropped: dropped,
            value: dropped / (received + dropped),
            consecutive_drops: consecutive,
            autocorr,
        });
    }

    if flags.extent {
        let bins = data.reorder.extent_to_count[..REORDER_MAX_EXTENT].to_vec();
        let populated = bins.iter().any(|&count| count > 0);
        if populated || data.reorder.extent_assumed_drops > 0 {
            results.reorder_extent = Some(ReorderExtentResults {
                bins,
                assumed_drops: data.reorder.extent_assumed_drops,
            });
        }
    }

    if flags.density {
        let populated = data.reorder.fd.iter().any(|&frequency| frequency > 0);
        if populated || data.reorder.rd_assumed_drops > 0 {
            results.reorder_density = Some(ReorderDensityResults {
                bins: data
                    .reorder
                    .fd
                    .iter()
                    .enumerate()
                    .map(|(bin, &frequency)| DensityBin {
                        distance: bin as i32 - REORDER_DT,
                        frequency,
                    })
                    .collect(),
            });
        }
    }

    results
}
