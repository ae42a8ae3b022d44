//! A passive, in-process packet quality estimator.
//!
//! Flowmeter measures loss, reorder extent and reorder density for packet
//! streams observed by the host application. Client threads push per-packet
//! metadata (a flow key, a stream id and a per-stream sequence number) to a
//! background pipeline; an aggregator thread folds the metadata into
//! fixed-length measurement periods and a reporter thread turns completed
//! periods into per-flow reports on a configurable schedule, delivered
//! through a user callback.
//!
//! The estimator never looks at packet payloads and performs no network I/O
//! of its own: it consumes only the metadata the application feeds it, which
//! makes it safe to run inline with a datapath. Pushing is cheap by design:
//! records buffer in a handle-local list and reach the pipeline in one locked
//! splice per flush.
//!
//! ```no_run
//! use flowmeter_core::config::default_config;
//! use flowmeter_core::{Estimator, PacketInfo, StreamTuple};
//!
//! let estimator = Estimator::start(
//!     default_config(),
//!     Some(Box::new(|results| {
//!         println!("flow {:?}: {} packets", results.flow_key, results.packet_count);
//!     })),
//! )
//! .unwrap();
//!
//! let mut handle = estimator.handle();
//! for seq in 0..1000u32 {
//!     handle
//!         .push(PacketInfo {
//!             stream: StreamTuple {
//!                 flow_key: [42, 43],
//!                 stream_id: 1,
//!             },
//!             seq,
//!         })
//!         .unwrap();
//! }
//! handle.flush().unwrap();
//! // ... reports arrive on the callback until shutdown
//! estimator.shutdown().unwrap();
//! ```

pub mod config;
pub mod flowtrack;
pub mod memory;
pub mod metrics;
pub mod queue;
pub mod report;
mod runtime;
pub mod schedule;
pub mod seq;
mod utils;

/// Wall-clock time in microseconds since the Unix epoch.
pub type Timestamp = u64;
/// A span of time in microseconds.
pub type TimeInterval = u64;

pub use self::config::{default_config, load_config, EstimatorConfig};
pub use self::flowtrack::key::{PacketInfo, StreamTuple, KEY_SIZE};
pub use self::metrics::reorder::{REORDER_DT, REORDER_MAX_EXTENT, REORDER_WINDOW_SIZE};
pub use self::report::{
    DensityBin, LossResults, ReorderDensityResults, ReorderExtentResults, ReportCallback, Results,
};
pub use self::runtime::{Estimator, EstimatorHandle};
pub use self::seq::Seqno;
