use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use minutely::{CycleKind, Manager, ManagerConfig};

fn t0() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0)
        .unwrap()
        .fixed_offset()
}

fn bench_track_cached_series(c: &mut Criterion) {
    let manager = Manager::new_at(ManagerConfig::default(), t0());
    let series = manager
        .get_or_create_series("latency", &[("endpoint", "/api")], None)
        .expect("create series");

    c.bench_function("track_cached_series", |b| {
        b.iter(|| series.track(black_box(42.0)));
    });
}

fn bench_track_with_lookup(c: &mut Criterion) {
    let manager = Manager::new_at(ManagerConfig::default(), t0());
    manager
        .get_or_create_series("latency", &[("endpoint", "/api")], None)
        .expect("create series");

    c.bench_function("track_with_lookup", |b| {
        b.iter(|| {
            manager
                .track("latency", black_box(&[("endpoint", "/api")]), 42.0)
                .expect("track")
        });
    });
}

fn bench_cycle_128_series(c: &mut Criterion) {
    let manager = Manager::new_at(ManagerConfig::default(), t0());
    for i in 0..128u32 {
        let endpoint = format!("/api/{i}");
        manager
            .track("latency", &[("endpoint", endpoint.as_str())], 1.0)
            .expect("track");
    }

    let mut now = t0();
    c.bench_function("cycle_128_series", |b| {
        b.iter(|| {
            now += ChronoDuration::seconds(60);
            black_box(manager.start_or_cycle(CycleKind::Default, now, None))
        });
    });
}

fn bench_concurrent_track(c: &mut Criterion) {
    let manager = Arc::new(Manager::new_at(ManagerConfig::default(), t0()));
    let series = manager
        .get_or_create_series("contended", &[], None)
        .expect("create series");

    c.bench_function("track_contended_4_threads", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();
            std::thread::scope(|scope| {
                for _ in 0..4 {
                    let series = Arc::clone(&series);
                    scope.spawn(move || {
                        for _ in 0..iters {
                            series.track(black_box(1.0));
                        }
                    });
                }
            });
            start.elapsed() / 4
        });
    });
}

criterion_group!(
    benches,
    bench_track_cached_series,
    bench_track_with_lookup,
    bench_cycle_128_series,
    bench_concurrent_track,
);
criterion_main!(benches);
