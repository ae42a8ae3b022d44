//! Report schedules.
//!
//! A schedule is a semicolon-separated list of repeating report items, each
//! `outlets,interval_s[,offset_s]`. One reporter-side tracker accumulates per
//! item; an item is due once the wall clock passes its `next_run`, which then
//! advances by whole interval multiples. The only outlet understood today is
//! `c`, the user callback.

use crate::{TimeInterval, Timestamp};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule is empty")]
    Empty,
    #[error("schedule item {0:?} has no interval")]
    MissingInterval(String),
    #[error("schedule item {0:?} has no outlets")]
    MissingOutlets(String),
    #[error("bad number {0:?} in schedule item")]
    BadNumber(String),
    #[error("interval must be positive in item {0:?}")]
    NonPositiveInterval(String),
}

#[derive(Debug, Clone)]
struct ScheduleItem {
    outlets: String,
    interval: TimeInterval,
    next_run: Timestamp,
}

/// A parsed schedule with per-item due times.
#[derive(Debug, Clone)]
pub struct ReportSchedule {
    items: Vec<ScheduleItem>,
}

impl ReportSchedule {
    /// Parses `spec`, anchoring every item's first due time at `start`
    /// microseconds: `start + offset` when a nonzero offset is given,
    /// `start + interval` otherwise.
    pub fn parse(spec: &str, start: Timestamp) -> Result<Self, ScheduleError> {
        let mut items = Vec::new();
        for item in spec.split(';') {
            if item.is_empty() {
                return Err(ScheduleError::Empty);
            }
            let mut fields = item.split(',');
            let outlets = fields.next().unwrap_or_default();
            if outlets.is_empty() {
                return Err(ScheduleError::MissingOutlets(item.to_owned()));
            }
            let interval_s: f64 = fields
                .next()
                .ok_or_else(|| ScheduleError::MissingInterval(item.to_owned()))?
                .parse()
                .map_err(|_| ScheduleError::BadNumber(item.to_owned()))?;
            if !interval_s.is_finite() || interval_s <= 0.0 {
                return Err(ScheduleError::NonPositiveInterval(item.to_owned()));
            }
            let interval = (interval_s * 1e6) as TimeInterval;

            let mut next_run = start + interval;
            if let Some(offset_field) = fields.next() {
                let offset_s: f64 = offset_field
                    .parse()
                    .map_err(|_| ScheduleError::BadNumber(item.to_owned()))?;
                if !offset_s.is_finite() || offset_s < 0.0 {
                    return Err(ScheduleError::BadNumber(item.to_owned()));
                }
                // a zero offset means "none": first report after one interval
                if offset_s != 0.0 {
                    next_run = start + (offset_s * 1e6) as TimeInterval;
                }
            }

            items.push(ScheduleItem {
                outlets: outlets.to_owned(),
                interval,
                next_run,
            });
        }
        if items.is_empty() {
            return Err(ScheduleError::Empty);
        }
        Ok(ReportSchedule { items })
    }

    /// Number of schedule items, i.e. how many trackers the reporter runs.
    pub fn parallelism(&self) -> usize {
        self.items.len()
    }

    /// Returns item `idx`'s outlets if it is due at `now`, else `None`.
    pub fn outlets(&self, idx: usize, now: Timestamp) -> Option<&str> {
        let item = &self.items[idx];
        if now < item.next_run {
            return None;
        }
        Some(&item.outlets)
    }

    /// Advances item `idx` past `now` by whole interval multiples.
    pub fn reset(&mut self, idx: usize, now: Timestamp) {
        let item = &mut self.items[idx];
        let behind = now.saturating_sub(item.next_run) as f64;
        let multiples = (behind / item.interval as f64).ceil() as TimeInterval;
        item.next_run += item.interval * multiples;
    }

    /// The measurement interval item `idx` covers.
    pub fn duration(&self, idx: usize) -> TimeInterval {
        match self.items.get(idx) {
            Some(item) => item.interval,
            None => 0,
        }
    }
}
