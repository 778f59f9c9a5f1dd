//! Throughput benchmarks

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use sywa_probe::core::protocol::{self, checksum, DeviceAddress, MeasurementSet, RequestKind};

fn read_reply(address: u8) -> Vec<u8> {
    let set = MeasurementSet::new([1520.5, 12.25, 18.5, 18.0, 18.25, 18.5, 18.75, 19.0]);
    let mut frame = vec![address, 0x04, 0x20];
    frame.extend_from_slice(&set.to_block());
    checksum::append(&mut frame);
    frame
}

fn checksum_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("crc16_1k", |b| {
        b.iter(|| black_box(protocol::checksum(black_box(&data))))
    });

    let frame = read_reply(7);
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("verify_read_reply", |b| {
        b.iter(|| black_box(checksum::verify(black_box(&frame))))
    });

    group.finish();
}

fn parse_benchmark(c: &mut Criterion) {
    let frame = read_reply(7);
    let kind = RequestKind::ReadMeasurements {
        target: DeviceAddress::unicast(7).unwrap(),
    };

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("read_reply", |b| {
        b.iter(|| black_box(protocol::parse(black_box(&kind), black_box(&frame))))
    });

    let mut corrupt = frame.clone();
    corrupt[10] ^= 0xFF;
    group.bench_function("read_reply_bad_crc", |b| {
        b.iter(|| black_box(protocol::parse(black_box(&kind), black_box(&corrupt))))
    });

    group.bench_function("build_read_request", |b| {
        let target = DeviceAddress::unicast(7).unwrap();
        b.iter(|| black_box(protocol::build_read_measurements(black_box(target))))
    });

    group.finish();
}

criterion_group!(benches, checksum_benchmark, parse_benchmark);
criterion_main!(benches);
