//! Small shared helpers.

use crate::Timestamp;

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in microseconds since the Unix epoch.
pub(crate) fn unix_micros() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as Timestamp)
        .unwrap_or(0)
}
