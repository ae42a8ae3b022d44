//! End-to-end pipeline tests: client handle -> aggregator -> reporter ->
//! callback, with real threads and a fast schedule.

use flowmeter_core::{
    default_config, Estimator, EstimatorConfig, PacketInfo, Results, StreamTuple,
};

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

type Collected = Arc<Mutex<Vec<Results>>>;

fn fast_config() -> EstimatorConfig {
    EstimatorConfig {
        aggregation_interval: 0.05,
        reporter_schedule: "c,0.25,0".to_owned(),
        reporter_min_batches: 2,
        ..default_config()
    }
}

fn start_collecting(config: EstimatorConfig) -> (Estimator, Collected) {
    let _ = env_logger::builder().is_test(true).try_init();
    let collected: Collected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    let estimator = Estimator::start(
        config,
        Some(Box::new(move |results| {
            sink.lock().unwrap().push(results.clone());
        })),
    )
    .unwrap();
    (estimator, collected)
}

fn push_seqs(estimator: &Estimator, tuple: StreamTuple, seqs: impl IntoIterator<Item = u32>) {
    let mut handle = estimator.handle();
    for seq in seqs {
        handle.push(PacketInfo { stream: tuple, seq }).unwrap();
    }
    handle.flush().unwrap();
}

fn wait_until(collected: &Collected, timeout: Duration, pred: impl Fn(&[Results]) -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred(&collected.lock().unwrap()) {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    false
}

fn total_packets(results: &[Results]) -> u32 {
    results.iter().map(|r| r.packet_count).sum()
}

fn total_received(results: &[Results]) -> f64 {
    results
        .iter()
        .filter_map(|r| r.loss.as_ref())
        .map(|l| l.packets_received)
        .sum()
}

fn total_dropped(results: &[Results]) -> f64 {
    results
        .iter()
        .filter_map(|r| r.loss.as_ref())
        .map(|l| l.packets_dropped)
        .sum()
}

const TUPLE: StreamTuple = StreamTuple {
    flow_key: [42, 43],
    stream_id: 44,
};

#[test]
fn contiguous_stream_reports_no_loss() {
    let (estimator, collected) = start_collecting(fast_config());
    push_seqs(&estimator, TUPLE, 1..=100);

    assert!(
        wait_until(&collected, Duration::from_secs(8), |results| {
            total_packets(results) >= 100
        }),
        "no report covering all 100 packets arrived"
    );
    estimator.shutdown().unwrap();

    let results = collected.lock().unwrap();
    assert_eq!(total_packets(&results), 100);
    assert_eq!(total_received(&results), 100.0);
    assert_eq!(total_dropped(&results), 0.0);
    for report in results.iter() {
        assert_eq!(report.flow_key, [42, 43]);
        if let Some(loss) = &report.loss {
            assert_eq!(loss.consecutive_drops, 0.0);
            assert_eq!(loss.value, 0.0);
        }
    }
}

#[test]
fn every_other_drop_then_contiguous_follow_on() {
    let (estimator, collected) = start_collecting(fast_config());

    // only the even sequence numbers of 1..=100 arrive
    push_seqs(&estimator, TUPLE, (1..=100).filter(|s| s % 2 == 0));
    assert!(
        wait_until(&collected, Duration::from_secs(8), |results| {
            total_received(results) >= 50.0
        }),
        "no loss report arrived"
    );

    {
        let results = collected.lock().unwrap();
        let received = total_received(&results);
        let dropped = total_dropped(&results);
        assert_eq!(received, 50.0);
        assert_eq!(dropped, 49.0);
        // loss fraction over the whole burst
        assert!((dropped / (received + dropped) - 49.0 / 99.0).abs() < 1e-9);
        let consecutive: f64 = results
            .iter()
            .filter_map(|r| r.loss.as_ref())
            .map(|l| l.consecutive_drops)
            .sum();
        assert_eq!(consecutive, 0.0);
    }

    // the follow-on burst is contiguous with the last received packet
    collected.lock().unwrap().clear();
    push_seqs(&estimator, TUPLE, 101..=2000);
    assert!(
        wait_until(&collected, Duration::from_secs(8), |results| {
            total_received(results) >= 1900.0
        }),
        "no follow-on report arrived"
    );
    estimator.shutdown().unwrap();

    let results = collected.lock().unwrap();
    assert_eq!(total_received(&results), 1900.0);
    assert_eq!(total_dropped(&results), 0.0);
}

#[test]
fn reordered_stream_reports_extent_histogram() {
    let (estimator, collected) = start_collecting(fast_config());
    push_seqs(&estimator, TUPLE, [0, 1, 2, 4, 5, 7, 6, 5, 3, 9, 8, 10]);

    assert!(
        wait_until(&collected, Duration::from_secs(8), |results| {
            results.iter().any(|r| r.reorder_extent.is_some())
        }),
        "no reorder extent report arrived"
    );
    estimator.shutdown().unwrap();

    let results = collected.lock().unwrap();
    let mut bins = vec![0u64; flowmeter_core::REORDER_MAX_EXTENT];
    for report in results.iter() {
        if let Some(extent) = &report.reorder_extent {
            for (slot, value) in bins.iter_mut().zip(extent.bins.iter()) {
                *slot += u64::from(*value);
            }
        }
    }
    assert_eq!(bins[0], 8);
    assert_eq!(bins[1], 2);
    assert_eq!(bins[5], 1);
    assert_eq!(bins[2], 0);
}

#[test]
fn streams_consolidate_into_one_flow_report() {
    let (estimator, collected) = start_collecting(fast_config());

    let first = StreamTuple {
        flow_key: [7, 7],
        stream_id: 1,
    };
    let second = StreamTuple {
        flow_key: [7, 7],
        stream_id: 2,
    };
    push_seqs(&estimator, first, 1..=30);
    push_seqs(&estimator, second, 1..=20);

    assert!(
        wait_until(&collected, Duration::from_secs(8), |results| {
            total_packets(results) >= 50
        }),
        "no consolidated report arrived"
    );
    estimator.shutdown().unwrap();

    let results = collected.lock().unwrap();
    // reports are per flow: both streams fold into flow [7, 7]
    assert!(results.iter().all(|r| r.flow_key == [7, 7]));
    assert_eq!(total_packets(&results), 50);
    assert_eq!(total_received(&results), 50.0);
    assert_eq!(total_dropped(&results), 0.0);
}

#[test]
fn shutdown_is_prompt_and_closes_handles() {
    let (estimator, _collected) = start_collecting(fast_config());
    let mut handle = estimator.handle();
    handle
        .push(PacketInfo {
            stream: TUPLE,
            seq: 1,
        })
        .unwrap();

    let started = Instant::now();
    estimator.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    // the input queue is closed once the estimator is gone
    assert!(handle.flush().is_err());
}
