//! The aggregator thread.
//!
//! Drains the client queue between period boundaries, folding each packet
//! into the current period's table. At every boundary the finished period
//! moves into the shared area, recycled storage drains back, and a fresh
//! period begins.

use super::{MeasureFlags, PipelineShared};
use crate::flowtrack::key::{FlowKey, PacketInfo};
use crate::flowtrack::{FlowTable, PeriodList, TableEntry};
use crate::memory::{Pool, Recycle};
use crate::metrics::AggData;
use crate::queue::{Dequeue, QueueHandle};
use crate::seq::SeqRange;
use crate::utils::unix_micros;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) struct Aggregator {
    rx: QueueHandle<PacketInfo>,
    shared: Arc<PipelineShared>,
    interval: Duration,
    flags: MeasureFlags,
    /// Working periods; the latest is the one currently accumulating.
    periods: PeriodList<AggData>,
    spare_tables: Pool<Box<FlowTable<AggData>>>,
    spare_entries: Pool<Box<TableEntry<AggData>>>,
    spare_loss_ranges: Pool<Vec<SeqRange>>,
    spare_reorder_ranges: Pool<Vec<SeqRange>>,
}

impl Aggregator {
    pub(crate) fn new(
        rx: QueueHandle<PacketInfo>,
        shared: Arc<PipelineShared>,
        interval: Duration,
        flags: MeasureFlags,
    ) -> Self {
        Aggregator {
            rx,
            shared,
            interval,
            flags,
            periods: PeriodList::new(),
            spare_tables: Pool::new(),
            spare_entries: Pool::new(),
            spare_loss_ranges: Pool::new(),
            spare_reorder_ranges: Pool::new(),
        }
    }

    pub(crate) fn run(mut self) {
        self.start_period();
        let mut boundary = Instant::now() + self.interval;

        while !self.shared.is_done() {
            if Instant::now() > boundary {
                self.period_transition();
                boundary += self.interval;
                continue;
            }
            match self.rx.timed_dequeue(boundary) {
                Dequeue::Item(info) => self.packet_arrival(info),
                Dequeue::Timeout | Dequeue::Closed => {
                    self.period_transition();
                    boundary += self.interval;
                }
            }
        }
        log::debug!("aggregator exiting");
    }

    /// Freezes the accumulating period into the shared area, drains the
    /// shared spare pools, and opens the next period.
    fn period_transition(&mut self) {
        {
            let mut area = self.shared.area.lock().unwrap();
            area.completed.move_earliest(&mut self.periods);
            self.spare_tables.absorb(&mut area.spare_tables);
            self.spare_entries.absorb(&mut area.spare_entries);
            self.spare_loss_ranges.absorb(&mut area.spare_loss_ranges);
            self.spare_reorder_ranges.absorb(&mut area.spare_reorder_ranges);
            if area.reporter_sleeping {
                self.shared.batch_ready.notify_one();
            }
        }
        self.start_period();
    }

    fn start_period(&mut self) {
        let mut table = self.spare_tables.take().unwrap_or_default();
        table.recycle();
        self.periods.push_latest(table);
    }

    fn packet_arrival(&mut self, info: PacketInfo) {
        let ts = unix_micros();
        let key = FlowKey::stream(&info.stream);
        let latest = match self.periods.latest_mut() {
            Some(table) => table,
            None => return, // a working period always exists while running
        };
        let entry = latest.force(key, &mut self.spare_entries);
        entry.value.packets.arrival(ts, info.seq);
        if self.flags.loss {
            entry
                .value
                .loss
                .arrival(info.seq, &mut self.spare_loss_ranges);
        }
        if self.flags.reorder() {
            entry
                .value
                .reorder
                .arrival(info.seq, &mut self.spare_reorder_ranges);
        }
    }
}
