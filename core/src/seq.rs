//! Wrap-safe sequence number arithmetic.
//!
//! Stream sequence numbers are 32-bit counters that wrap. Comparisons use the
//! half-circle rule: `s` is considered less than `t` when `t - s`, computed
//! modulo 2^32, lands in the lower half of the space.

use std::cmp::Ordering;

use serde::Serialize;

/// A per-stream packet sequence number.
pub type Seqno = u32;

/// Compares two sequence numbers on the half circle.
///
/// `s < t` iff `t - s` (mod 2^32) is nonzero and below 2^31, so ordering
/// remains correct across the wrap point.
#[inline]
pub fn seq_cmp(s: Seqno, t: Seqno) -> Ordering {
    let diff = t.wrapping_sub(s);
    if diff > 0 && diff < (1 << 31) {
        return Ordering::Less;
    }
    if s == t {
        return Ordering::Equal;
    }
    Ordering::Greater
}

/// Distance from `s` forward to `t`.
///
/// When `t` has wrapped past zero the result is `t - s + (2^32 - 1)`, one
/// short of the true circular distance. Loss reconciliation depends on this
/// exact convention; do not "fix" it to `+ 2^32`.
#[inline]
pub fn modular_distance(s: Seqno, t: Seqno) -> Seqno {
    if t >= s {
        return t - s;
    }
    t.wrapping_sub(s).wrapping_add(Seqno::MAX)
}

/// A run of contiguously received sequence numbers, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeqRange {
    pub low: Seqno,
    pub high: Seqno,
}

impl SeqRange {
    /// A run holding a single sequence number.
    #[inline]
    pub fn single(seq: Seqno) -> Self {
        SeqRange { low: seq, high: seq }
    }

    /// Number of sequence numbers covered by the run.
    #[inline]
    pub fn span(&self) -> u32 {
        self.high.wrapping_sub(self.low).wrapping_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_seq_cmp_ordering() {
        assert_eq!(seq_cmp(1, 2), Ordering::Less);
        assert_eq!(seq_cmp(2, 1), Ordering::Greater);
        assert_eq!(seq_cmp(7, 7), Ordering::Equal);
        assert_eq!(seq_cmp(0, u32::MAX), Ordering::Greater);
        assert_eq!(seq_cmp(u32::MAX, 0), Ordering::Less);
        assert_eq!(seq_cmp(u32::MAX - 2, 2), Ordering::Less);
        // exactly half the space apart: the half-circle rule calls it Greater
        assert_eq!(seq_cmp(0, 1 << 31), Ordering::Greater);
    }

    #[test]
    fn core_seq_cmp_orders_wrap_ascending() {
        let seqs = [0xFFFF_FFFDu32, 0xFFFF_FFFE, 0xFFFF_FFFF, 0, 1, 2];
        for w in seqs.windows(2) {
            assert_eq!(seq_cmp(w[0], w[1]), Ordering::Less);
        }
    }

    #[test]
    fn core_modular_distance_plain() {
        assert_eq!(modular_distance(3, 10), 7);
        assert_eq!(modular_distance(10, 10), 0);
    }

    #[test]
    fn core_modular_distance_wrap_is_one_short() {
        // deliberate convention: the wrapped branch adds 2^32 - 1, not 2^32
        assert_eq!(modular_distance(u32::MAX, 0), 0);
        assert_eq!(modular_distance(u32::MAX, 1), 1);
        assert_eq!(modular_distance(u32::MAX - 1, 0), 1);
        assert_eq!(modular_distance(5, 3), u32::MAX - 2);
    }

    #[test]
    fn core_range_span() {
        assert_eq!(SeqRange::single(9).span(), 1);
        assert_eq!(SeqRange { low: 1, high: 100 }.span(), 100);
        assert_eq!(
            SeqRange {
                low: u32::MAX,
                high: 1
            }
            .span(),
            3
        );
    }
}
