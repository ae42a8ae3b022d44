//! Bounding statistics over received packets.

use crate::seq::{seq_cmp, Seqno};
use crate::Timestamp;

use std::cmp::Ordering;

/// Packet count, timestamp bounds and sequence bounds for one stream record.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketSummary {
    pub packet_count: u32,
    pub earliest: Timestamp,
    pub latest: Timestamp,
    pub min_seq: Seqno,
    pub max_seq: Seqno,
}

impl PacketSummary {
    /// Folds one arrival into the summary.
    pub fn arrival(&mut self, ts: Timestamp, seq: Seqno) {
        if self.packet_count == 0 || ts < self.earliest {
            self.earliest = ts;
        }
        if self.packet_count == 0 || ts > self.latest {
            self.latest = ts;
        }
        if self.packet_count == 0 || seq_cmp(seq, self.min_seq) == Ordering::Less {
            self.min_seq = seq;
        }
        if self.packet_count == 0 || seq_cmp(seq, self.max_seq) == Ordering::Greater {
            self.max_seq = seq;
        }
        self.packet_count += 1;
    }

    /// Merges another summary into this one.
    pub fn accumulate(&mut self, unit: &PacketSummary) {
        if self.packet_count == 0 {
            self.min_seq = unit.min_seq;
            self.max_seq = unit.max_seq;
        } else {
            if seq_cmp(unit.min_seq, self.min_seq) == Ordering::Less {
                self.min_seq = unit.min_seq;
            }
            if seq_cmp(unit.max_seq, self.max_seq) == Ordering::Greater {
                self.max_seq = unit.max_seq;
            }
        }
        self.packet_count += unit.packet_count;
        self.earliest = if self.earliest == 0 {
            unit.earliest
        } else {
            self.earliest.min(unit.earliest)
        };
        self.latest = self.latest.max(unit.latest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_arrival_tracks_bounds() {
        let mut summary = PacketSummary::default();
        summary.arrival(100, 5);
        summary.arrival(90, 9);
        summary.arrival(110, 2);

        assert_eq!(summary.packet_count, 3);
        assert_eq!(summary.earliest, 90);
        assert_eq!(summary.latest, 110);
        assert_eq!(summary.min_seq, 2);
        assert_eq!(summary.max_seq, 9);
    }

    #[test]
    fn core_seq_bounds_respect_wraparound() {
        let mut summary = PacketSummary::default();
        summary.arrival(1, u32::MAX - 1);
        summary.arrival(2, u32::MAX);
        summary.arrival(3, 0);
        summary.arrival(4, 1);

        // on the half circle the pre-wrap values are the smaller ones
        assert_eq!(summary.min_seq, u32::MAX - 1);
        assert_eq!(summary.max_seq, 1);
    }

    #[test]
    fn core_accumulate_merges_summaries() {
        let mut a = PacketSummary::default();
        a.arrival(100, 10);
        a.arrival(120, 11);

        let mut b = PacketSummary::default();
        b.arrival(90, 4);
        b.arrival(130, 20);

        a.accumulate(&b);
        assert_eq!(a.packet_count, 4);
        assert_eq!(a.earliest, 90);
        assert_eq!(a.latest, 130);
        assert_eq!(a.min_seq, 4);
        assert_eq!(a.max_seq, 20);

        let empty = PacketSummary::default();
        let mut c = PacketSummary::default();
        c.accumulate(&a);
        c.accumulate(&empty);
        assert_eq!(c.packet_count, 4);
        assert_eq!(c.min_seq, 4);
    }
}
