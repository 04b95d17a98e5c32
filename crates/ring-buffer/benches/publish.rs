//! Criterion benchmarks for the frame publish and read paths.
//!
//! Run with: cargo bench --bench publish

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ring_buffer::{FrameGeometry, FrameRing, FrameSnapshot};
use std::convert::Infallible;

fn geometries() -> Vec<(&'static str, FrameGeometry)> {
    vec![
        ("QVGA", FrameGeometry::new(320, 240)),
        ("VGA", FrameGeometry::VGA),
    ]
}

/// Depth producer path: fill both planes and publish
fn frame_ring_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_ring_publish");

    for (name, geometry) in geometries() {
        let ring = FrameRing::new(geometry);
        let depth = vec![0x5Au8; geometry.depth_len()];
        let color = vec![0xA5u8; geometry.color_len()];

        group.throughput(Throughput::Bytes((depth.len() + color.len()) as u64));
        group.bench_with_input(BenchmarkId::new("publish", name), &geometry, |b, _| {
            b.iter(|| {
                ring.publish(0, |d, c| {
                    d.copy_from_slice(black_box(&depth));
                    c.copy_from_slice(black_box(&color));
                    Ok::<_, Infallible>(())
                })
                .unwrap()
            });
        });
    }

    group.finish();
}

/// Writer/preview path: copy the newest slot out
fn frame_ring_read_latest(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_ring_read");

    for (name, geometry) in geometries() {
        let ring = FrameRing::new(geometry);
        ring.publish(0, |_, _| Ok::<_, Infallible>(())).unwrap();
        let mut snapshot = FrameSnapshot::new(geometry);

        group.throughput(Throughput::Bytes(
            (geometry.depth_len() + geometry.color_len()) as u64,
        ));
        group.bench_with_input(BenchmarkId::new("read_latest", name), &geometry, |b, _| {
            b.iter(|| black_box(ring.read_latest(&mut snapshot).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, frame_ring_publish, frame_ring_read_latest);
criterion_main!(benches);
