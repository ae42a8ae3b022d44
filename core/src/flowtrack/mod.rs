//! Keyed per-period measurement tables.
//!
//! Each aggregation period owns one [`FlowTable`] mapping stream keys to
//! measurement entries. Tables travel through the pipeline in chronological
//! [`PeriodList`]s: populated by the aggregator, frozen at period rotation,
//! consumed by the reporter, then recycled. Entries and tables are drawn from
//! and returned to [`Pool`]s so steady-state processing does not allocate.

pub mod key;

use self::key::{FlowKey, KeyHashBuilder};
use crate::memory::{Pool, Recycle};

use std::collections::VecDeque;

use hashlink::linked_hash_map::{LinkedHashMap, RawEntryMut};

/// Number of hash slots reserved per table.
pub const TABLE_SLOTS: usize = 1024;

/// One keyed slot in a period table.
#[derive(Debug, Default)]
pub struct TableEntry<V> {
    pub marked_for_deletion: bool,
    pub value: V,
}

impl<V: Recycle> Recycle for TableEntry<V> {
    fn recycle(&mut self) {
        self.marked_for_deletion = false;
        self.value.recycle();
    }
}

/// Result of splitting a table against a reference table.
#[derive(Debug, Default)]
pub struct TablePartition {
    /// Keys present in both tables.
    pub intersection: Vec<FlowKey>,
    /// Keys present only in the split table.
    pub difference: Vec<FlowKey>,
}

/// A keyed container of measurement entries for one period.
#[derive(Debug)]
pub struct FlowTable<V> {
    map: LinkedHashMap<FlowKey, Box<TableEntry<V>>, KeyHashBuilder>,
}

impl<V> FlowTable<V> {
    pub fn new() -> Self {
        FlowTable {
            map: LinkedHashMap::with_capacity_and_hasher(TABLE_SLOTS, KeyHashBuilder::default()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up `key` without inserting.
    #[inline]
    pub fn retrieve(&self, key: &FlowKey) -> Option<&TableEntry<V>> {
        self.map.get(key).map(|boxed| &**boxed)
    }

    #[inline]
    pub fn retrieve_mut(&mut self, key: &FlowKey) -> Option<&mut TableEntry<V>> {
        self.map.get_mut(key).map(|boxed| &mut **boxed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, &TableEntry<V>)> {
        self.map.iter().map(|(k, v)| (k, &**v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&FlowKey, &mut TableEntry<V>)> {
        self.map.iter_mut().map(|(k, v)| (k, &mut **v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &FlowKey> {
        self.map.keys()
    }

    /// Splits this table's keys into those also present in `reference` and
    /// those not. Both output vectors are freshly built; neither table is
    /// modified.
    pub fn partition<W>(&self, reference: &FlowTable<W>) -> TablePartition {
        let mut split = TablePartition::default();
        for key in self.map.keys() {
            if reference.map.contains_key(key) {
                split.intersection.push(*key);
            } else {
                split.difference.push(*key);
            }
        }
        split
    }
}

impl<V: Default + Recycle> FlowTable<V> {
    /// Looks up `key`, inserting a recycled entry on miss.
    pub fn force(
        &mut self,
        key: FlowKey,
        pool: &mut Pool<Box<TableEntry<V>>>,
    ) -> &mut TableEntry<V> {
        match self.map.raw_entry_mut().from_key(&key) {
            RawEntryMut::Occupied(occupied) => &mut **occupied.into_mut(),
            RawEntryMut::Vacant(vacant) => {
                let mut entry = pool.take().unwrap_or_default();
                entry.recycle();
                let (_, slot) = vacant.insert(key, entry);
                &mut **slot
            }
        }
    }

    /// Empties the table, returning every entry to `pool` unmodified.
    pub fn zeroout(&mut self, pool: &mut Pool<Box<TableEntry<V>>>) {
        for (_, entry) in self.map.drain() {
            pool.put(entry);
        }
    }

    /// Drops entries whose `marked_for_deletion` flag is set, returning them
    /// to `pool`.
    pub fn purge(&mut self, pool: &mut Pool<Box<TableEntry<V>>>) {
        let doomed: Vec<FlowKey> = self
            .map
            .iter()
            .filter(|(_, entry)| entry.marked_for_deletion)
            .map(|(key, _)| *key)
            .collect();
        for key in doomed {
            if let Some(entry) = self.map.remove(&key) {
                pool.put(entry);
            }
        }
    }
}

impl<V> Default for FlowTable<V> {
    fn default() -> Self {
        FlowTable::new()
    }
}

impl<V> Recycle for FlowTable<V> {
    fn recycle(&mut self) {
        // tables are recycled only after zeroout(); keep the map allocation
        debug_assert!(self.map.is_empty());
    }
}

/// Chronologically ordered period tables, earliest first.
#[derive(Debug)]
pub struct PeriodList<V> {
    periods: VecDeque<Box<FlowTable<V>>>,
}

impl<V> PeriodList<V> {
    pub fn new() -> Self {
        PeriodList {
            periods: VecDeque::new(),
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.periods.len()
    }

    pub fn push_latest(&mut self, table: Box<FlowTable<V>>) {
        self.periods.push_back(table);
    }

    pub fn pop_earliest(&mut self) -> Option<Box<FlowTable<V>>> {
        self.periods.pop_front()
    }

    /// Moves `from`'s earliest period to this list's latest position.
    pub fn move_earliest(&mut self, from: &mut PeriodList<V>) {
        if let Some(table) = from.pop_earliest() {
            self.push_latest(table);
        }
    }

    /// Appends all of `from`'s periods, which must be more recent than ours.
    pub fn move_all(&mut self, from: &mut PeriodList<V>) {
        self.periods.append(&mut from.periods);
    }

    pub fn latest_mut(&mut self) -> Option<&mut FlowTable<V>> {
        self.periods.back_mut().map(|boxed| &mut **boxed)
    }

    /// Iterates earliest to latest.
    pub fn iter(&self) -> impl Iterator<Item = &FlowTable<V>> {
        self.periods.iter().map(|boxed| &**boxed)
    }
}

impl<V> Default for PeriodList<V> {
    fn default() -> Self {
        PeriodList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::key::StreamTuple;
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        hits: u32,
    }

    impl Recycle for Counter {
        fn recycle(&mut self) {
            self.hits = 0;
        }
    }

    fn skey(flow: u8, stream: u8) -> FlowKey {
        FlowKey::stream(&StreamTuple {
            flow_key: [flow, 0],
            stream_id: stream,
        })
    }

    #[test]
    fn core_force_then_retrieve() {
        let mut table: FlowTable<Counter> = FlowTable::new();
        let mut pool = Pool::new();

        let key = skey(1, 1);
        table.force(key, &mut pool).value.hits += 1;
        table.force(key, &mut pool).value.hits += 1;

        assert_eq!(table.len(), 1);
        assert_eq!(table.retrieve(&key).unwrap().value.hits, 2);
        assert!(table.retrieve(&skey(1, 2)).is_none());
    }

    #[test]
    fn core_zeroout_recycles_entries() {
        let mut table: FlowTable<Counter> = FlowTable::new();
        let mut pool = Pool::new();

        for stream in 0..4 {
            table.force(skey(7, stream), &mut pool).value.hits = 9;
        }
        table.zeroout(&mut pool);

        assert!(table.is_empty());
        assert_eq!(pool.len(), 4);

        // recycled entries come back reset
        let entry = table.force(skey(7, 0), &mut pool);
        assert_eq!(entry.value.hits, 0);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn core_purge_removes_marked_entries() {
        let mut table: FlowTable<Counter> = FlowTable::new();
        let mut pool = Pool::new();

        table.force(skey(1, 1), &mut pool);
        table.force(skey(1, 2), &mut pool).marked_for_deletion = true;
        table.force(skey(1, 3), &mut pool);

        table.purge(&mut pool);
        assert_eq!(table.len(), 2);
        assert_eq!(pool.len(), 1);
        assert!(table.retrieve(&skey(1, 2)).is_none());
        assert!(table.retrieve(&skey(1, 1)).is_some());
    }

    #[test]
    fn core_partition_splits_by_reference() {
        let mut pool = Pool::new();
        let mut split_me: FlowTable<Counter> = FlowTable::new();
        let mut reference: FlowTable<Counter> = FlowTable::new();

        split_me.force(skey(1, 1), &mut pool);
        split_me.force(skey(1, 2), &mut pool);
        split_me.force(skey(2, 1), &mut pool);
        reference.force(skey(1, 2), &mut pool);
        reference.force(skey(3, 3), &mut pool);

        let split = split_me.partition(&reference);
        assert_eq!(split.intersection, vec![skey(1, 2)]);
        assert_eq!(split.difference, vec![skey(1, 1), skey(2, 1)]);
    }

    #[test]
    fn core_period_list_moves() {
        let mut a: PeriodList<Counter> = PeriodList::new();
        let mut b: PeriodList<Counter> = PeriodList::new();
        let mut pool = Pool::new();

        let mut t1: Box<FlowTable<Counter>> = Box::default();
        t1.force(skey(1, 1), &mut pool);
        a.push_latest(t1);
        a.push_latest(Box::default());
        assert_eq!(a.count(), 2);

        b.move_earliest(&mut a);
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert_eq!(b.iter().next().unwrap().len(), 1);

        b.move_all(&mut a);
        assert_eq!(a.count(), 0);
        assert_eq!(b.count(), 2);
    }
}
