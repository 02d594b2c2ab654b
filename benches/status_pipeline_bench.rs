//! Performance benchmarks for the status pipeline.
//!
//! These benchmarks measure one poll cycle through the tracker (cleanup,
//! error recovery, status buffer and publication) and the ESC/POS bitmap
//! decode that feeds it.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench status_pipeline_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use kiosk_hardware::status::codes::{error, ok, warning};
use kiosk_hardware::status::{
    BitmapCodeSpecification, CleanContext, StatusCodes, StatusPolicy, StatusSpecifications,
    StatusTracker,
};
use kiosk_hardware::types::DeviceFlags;
use std::hint::black_box;

fn tracker(max_bad_answers: u32) -> StatusTracker {
    let policy = StatusPolicy {
        max_bad_answers,
        force_status_buffer: true,
        ..StatusPolicy::default()
    };
    StatusTracker::new(StatusSpecifications::default(), policy, 10)
}

/// Run one poll result through the whole pipeline.
fn poll_cycle(tracker: &mut StatusTracker, raw: &StatusCodes) {
    let mut codes = raw.clone();
    let mut flags = DeviceFlags::default();
    tracker.clean_status_codes(&mut codes, &mut flags, &CleanContext::default());
    tracker.recover_errors(&mut codes, false);
    tracker.apply_status_buffer(&mut codes, false, true);
    black_box(tracker.publish(&codes, false));
}

/// Benchmark a device reporting the same statuses on every poll.
fn bench_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_state");
    group.throughput(Throughput::Elements(1));

    let inputs = [
        ("ok", StatusCodes::from([ok::OK])),
        ("warning", StatusCodes::from([warning::FIRMWARE, ok::OK])),
        (
            "errors",
            StatusCodes::from([error::COVER_IS_OPENED, error::MECHANISM, error::UNKNOWN]),
        ),
    ];

    for (name, raw) in &inputs {
        group.bench_with_input(BenchmarkId::new("poll_cycle", name), raw, |b, raw| {
            let mut tracker = tracker(0);
            b.iter(|| poll_cycle(&mut tracker, black_box(raw)));
        });
    }

    group.finish();
}

/// Benchmark a blinking device alternating between OK and not available.
fn bench_blinking(c: &mut Criterion) {
    let mut group = c.benchmark_group("blinking");
    group.throughput(Throughput::Elements(2));

    let healthy = StatusCodes::from([ok::OK]);
    let lost = StatusCodes::from([error::NOT_AVAILABLE]);

    for max_bad_answers in [0, 2] {
        group.bench_with_input(
            BenchmarkId::new("max_bad_answers", max_bad_answers),
            &max_bad_answers,
            |b, &max| {
                let mut tracker = tracker(max);
                b.iter(|| {
                    poll_cycle(&mut tracker, black_box(&healthy));
                    poll_cycle(&mut tracker, black_box(&lost));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark decoding a status bitmap into codes.
fn bench_bitmap_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap_decode");
    group.throughput(Throughput::Bytes(4));

    let mut bitmap = BitmapCodeSpecification::new();
    for byte in 0..4 {
        for bit in 0..8 {
            bitmap.add_status(byte, bit, error::MECHANISM, "mechanism");
        }
    }
    let answer = [0x12, 0x16, 0x5A, 0x7E];

    group.bench_function("four_bytes", |b| {
        b.iter(|| {
            let mut codes = StatusCodes::new();
            bitmap.decode(black_box(&answer), &mut codes);
            black_box(codes);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_steady_state, bench_blinking, bench_bitmap_decode);
criterion_main!(benches);
