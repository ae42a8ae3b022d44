//! The two-thread estimation pipeline.
//!
//! An [`Estimator`] owns an aggregator thread and a reporter thread. Client
//! handles push packet metadata into a shared queue; the aggregator drains it
//! into the current period's table and rotates periods on a timer; the
//! reporter converts completed periods into per-flow reports on the
//! configured schedule. Completed periods and recycled storage cross between
//! the threads through one mutex-protected shared area.

mod aggregator;
mod reporter;

use self::aggregator::Aggregator;
use self::reporter::Reporter;
use crate::config::EstimatorConfig;
use crate::flowtrack::key::PacketInfo;
use crate::flowtrack::{FlowTable, PeriodList, TableEntry};
use crate::memory::Pool;
use crate::metrics::AggData;
use crate::queue::{FlushPolicy, QueueError, QueueHandle, QueueRegistry};
use crate::report::ReportCallback;
use crate::schedule::ReportSchedule;
use crate::seq::SeqRange;
use crate::utils::unix_micros;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// Endpoint names for the client-to-aggregator queue.
pub(crate) const CLIENT_SRC: &str = "estimator_client";
pub(crate) const CLIENT_DST: &str = "estimator_aggregator";

/// Which metrics the pipeline maintains.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MeasureFlags {
    pub loss: bool,
    pub extent: bool,
    pub density: bool,
}

impl MeasureFlags {
    pub fn reorder(&self) -> bool {
        self.extent || self.density
    }
}

/// Storage exchanged between the aggregator and the reporter.
///
/// The aggregator pushes completed periods and drains the spare pools; the
/// reporter splices completed periods out and refills the pools with
/// recycled storage.
pub(crate) struct SharedArea {
    pub completed: PeriodList<AggData>,
    pub spare_tables: Pool<Box<FlowTable<AggData>>>,
    pub spare_entries: Pool<Box<TableEntry<AggData>>>,
    pub spare_loss_ranges: Pool<Vec<SeqRange>>,
    pub spare_reorder_ranges: Pool<Vec<SeqRange>>,
    pub reporter_sleeping: bool,
}

pub(crate) struct PipelineShared {
    pub area: Mutex<SharedArea>,
    /// Signalled on period transitions and at shutdown.
    pub batch_ready: Condvar,
    pub done: AtomicBool,
}

impl PipelineShared {
    fn new() -> Self {
        PipelineShared {
            area: Mutex::new(SharedArea {
                completed: PeriodList::new(),
                spare_tables: Pool::new(),
                spare_entries: Pool::new(),
                spare_loss_ranges: Pool::new(),
                spare_reorder_ranges: Pool::new(),
                reporter_sleeping: false,
            }),
            batch_ready: Condvar::new(),
            done: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// A running estimator service.
///
/// Create one with [`Estimator::start`], feed it through handles from
/// [`Estimator::handle`], and stop it with [`Estimator::shutdown`] (or let
/// it drop, which does the same best-effort).
pub struct Estimator {
    registry: Arc<QueueRegistry<PacketInfo>>,
    shared: Arc<PipelineShared>,
    aggregator: Option<JoinHandle<()>>,
    reporter: Option<JoinHandle<()>>,
}

impl Estimator {
    /// Validates `config`, spawns the aggregator and reporter threads and
    /// returns the owning service value.
    pub fn start(config: EstimatorConfig, callback: Option<ReportCallback>) -> Result<Self> {
        config.validate()?;
        let schedule = ReportSchedule::parse(&config.reporter_schedule, unix_micros())
            .context("could not set reporter schedule")?;

        let flags = MeasureFlags {
            loss: config.measure_loss,
            extent: config.measure_reorder_extent,
            density: config.measure_reorder_density,
        };
        if flags.loss {
            log::info!("initializing loss estimator");
        }
        if flags.reorder() {
            log::info!("initializing reorder estimator");
        }

        let interval = Duration::from_secs_f64(config.aggregation_interval);
        let registry: Arc<QueueRegistry<PacketInfo>> = QueueRegistry::new();
        let shared = Arc::new(PipelineShared::new());

        let aggregator = Aggregator::new(
            registry.handle(CLIENT_SRC, CLIENT_DST),
            Arc::clone(&shared),
            interval,
            flags,
        );
        let aggregator = thread::Builder::new()
            .name("flowmeter-aggregator".to_owned())
            .spawn(move || aggregator.run())
            .context("could not spawn aggregator thread")?;

        let reporter = Reporter::new(
            Arc::clone(&shared),
            schedule,
            callback,
            config.reporter_min_batches,
            flags,
        );
        let reporter = thread::Builder::new()
            .name("flowmeter-reporter".to_owned())
            .spawn(move || reporter.run())
            .context("could not spawn reporter thread")?;

        Ok(Estimator {
            registry,
            shared,
            aggregator: Some(aggregator),
            reporter: Some(reporter),
        })
    }

    /// Opens a fresh producer handle onto the estimator's input queue.
    pub fn handle(&self) -> EstimatorHandle {
        EstimatorHandle {
            queue: self.registry.handle(CLIENT_SRC, CLIENT_DST),
        }
    }

    /// Stops both threads and blocks until they exit.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        if self.aggregator.is_none() && self.reporter.is_none() {
            return Ok(());
        }
        self.shared.done.store(true, Ordering::Release);
        self.registry.close(CLIENT_SRC, CLIENT_DST);

        if let Some(handle) = self.aggregator.take() {
            handle
                .join()
                .map_err(|_| anyhow!("aggregator thread panicked"))?;
        }

        // take the lock once so a reporter entering its wait cannot miss the
        // wakeup between its done-check and the wait itself
        drop(self.shared.area.lock().unwrap());
        self.shared.batch_ready.notify_all();

        if let Some(handle) = self.reporter.take() {
            handle
                .join()
                .map_err(|_| anyhow!("reporter thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for Estimator {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("estimator shutdown failed: {}", err);
        }
    }
}

/// Client-side producer handle with local batching.
///
/// Pushed records stay in the handle's local list until
/// [`flush`](Self::flush) splices them to the aggregator in one locked
/// append.
pub struct EstimatorHandle {
    queue: QueueHandle<PacketInfo>,
}

impl EstimatorHandle {
    /// Buffers one packet's metadata locally.
    pub fn push(&mut self, info: PacketInfo) -> Result<(), QueueError> {
        self.queue.enqueue(info, FlushPolicy::Hold)
    }

    /// Hands all buffered metadata to the aggregator.
    pub fn flush(&mut self) -> Result<(), QueueError> {
        self.queue.flush()
    }
}
