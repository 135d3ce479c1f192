//! Concurrency coverage: many producer threads tracking while windows
//! rotate. Values may land on either side of a boundary, but none may be
//! lost or double-counted.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, TimeZone, Utc};

use minutely::{CycleKind, Manager, ManagerConfig, MetricConfiguration};

fn t0() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0)
        .unwrap()
        .fixed_offset()
}

#[test]
fn measurement_counts_are_conserved_across_boundaries() {
    const THREADS: usize = 4;
    const TRACKS_PER_THREAD: usize = 5_000;
    const ROTATIONS: usize = 20;

    let manager = Arc::new(Manager::new_at(ManagerConfig::default(), t0()));
    manager
        .get_or_create_series("m", &[], None)
        .expect("create");

    let mut producers = Vec::new();
    for _ in 0..THREADS {
        let manager = Arc::clone(&manager);
        producers.push(thread::spawn(move || {
            for _ in 0..TRACKS_PER_THREAD {
                manager.track("m", &[], 1.0).expect("track");
            }
        }));
    }

    // Rotate the default window while producers run.
    let mut total_count = 0u64;
    let mut total_sum = 0.0f64;
    let mut now = t0();
    for _ in 0..ROTATIONS {
        now += ChronoDuration::seconds(60);
        let summary = manager.start_or_cycle(CycleKind::Default, now, None);
        for aggregate in &summary.non_persistent_aggregates {
            total_count += aggregate.data.count();
            total_sum += aggregate.data.sum();
        }
        thread::yield_now();
    }

    for producer in producers {
        producer.join().expect("producer panicked");
    }

    // Final window picks up the remainder.
    now += ChronoDuration::seconds(60);
    let summary = manager.start_or_cycle(CycleKind::Default, now, None);
    for aggregate in &summary.non_persistent_aggregates {
        total_count += aggregate.data.count();
        total_sum += aggregate.data.sum();
    }

    let expected = (THREADS * TRACKS_PER_THREAD) as u64;
    assert_eq!(total_count, expected);
    assert_eq!(total_sum, expected as f64);
}

#[test]
fn accumulator_totals_are_exact_under_contention() {
    const THREADS: usize = 4;
    const TRACKS_PER_THREAD: usize = 5_000;

    let manager = Arc::new(Manager::new_at(ManagerConfig::default(), t0()));
    let series = manager
        .get_or_create_series("items", &[], Some(&MetricConfiguration::accumulator()))
        .expect("create");

    let mut producers = Vec::new();
    for _ in 0..THREADS {
        let series = Arc::clone(&series);
        producers.push(thread::spawn(move || {
            for _ in 0..TRACKS_PER_THREAD {
                series.track(2.0);
            }
        }));
    }

    // Boundary snapshots in flight must not disturb the running totals.
    let mut now = t0();
    for _ in 0..10 {
        now += ChronoDuration::seconds(60);
        manager.start_or_cycle(CycleKind::Default, now, None);
        thread::yield_now();
    }

    for producer in producers {
        producer.join().expect("producer panicked");
    }

    now += ChronoDuration::seconds(60);
    let summary = manager.start_or_cycle(CycleKind::Default, now, None);
    assert_eq!(summary.persistent_aggregates.len(), 1);

    let expected = (THREADS * TRACKS_PER_THREAD) as u64;
    assert_eq!(summary.persistent_aggregates[0].data.count(), expected);
    assert_eq!(
        summary.persistent_aggregates[0].data.sum(),
        (expected * 2) as f64
    );
}

#[test]
fn concurrent_series_creation_respects_caps() {
    const THREADS: usize = 8;

    let manager = Arc::new(Manager::new_at(ManagerConfig::default(), t0()));
    let config = MetricConfiguration {
        series_count_limit: 4,
        ..MetricConfiguration::measurement()
    };
    manager
        .get_or_create_series("m", &[("d", "seed")], Some(&config))
        .expect("register schema");

    let mut workers = Vec::new();
    for worker in 0..THREADS {
        let manager = Arc::clone(&manager);
        workers.push(thread::spawn(move || {
            let mut admitted = 0usize;
            for i in 0..16 {
                let value = format!("v{}-{}", worker, i);
                if manager.try_track("m", &[("d", value.as_str())], 1.0) {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    for worker in workers {
        worker.join().expect("worker panicked");
    }

    // Never more than the cap, no matter the interleaving.
    assert_eq!(manager.directory().series_count("m"), 4);
    assert!(manager.directory().dimension_value_count("m", 0) <= 4);
}
