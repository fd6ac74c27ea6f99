//! Benchmarks for Tephra packet decoding and storage

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tephra::{
    aggregate, ChannelStore, Decoder, Encoder, Environment, MetricSet, Packet, ProtocolRevision,
};

fn generate_packets(revision: ProtocolRevision, count: usize) -> Vec<Vec<u8>> {
    let encoder = Encoder::new(revision);
    (0..count)
        .filter_map(|i| {
            let t = i as f32 * 0.01;
            let packet = Packet::standard(
                revision,
                (i % 16 + 1) as u16,
                (i % 101) as u8,
                [0.0, 0.0, t.sin(), t.cos()],
                [t.sin() * 0.1, t.cos() * 0.1, 1.0],
                t.sin().abs(),
                20.0 + t.sin() * 5.0,
                1013.0 + t.cos(),
                Some(Environment::default()),
            );
            encoder.encode(&packet).ok()
        })
        .collect()
}

fn bench_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoding");
    group.throughput(Throughput::Elements(1000));

    for revision in [ProtocolRevision::V1, ProtocolRevision::V2] {
        let packets = generate_packets(revision, 1000);
        let decoder = Decoder::new(revision);

        group.bench_with_input(
            BenchmarkId::new("decode_1000_packets", revision),
            &packets,
            |b, packets| {
                b.iter(|| {
                    for bytes in packets {
                        let _ = black_box(decoder.decode(bytes));
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    let decoder = Decoder::new(ProtocolRevision::V2);
    let sets: Vec<_> = generate_packets(ProtocolRevision::V2, 1000)
        .iter()
        .filter_map(|b| decoder.decode(b).ok())
        .collect();

    group.throughput(Throughput::Elements(sets.len() as u64));

    // Capacity well below the input so eviction is exercised
    group.bench_function("ingest_1000_sets", |b| {
        b.iter(|| {
            let store = ChannelStore::new(100);
            for set in &sets {
                black_box(store.ingest(set));
            }
        })
    });

    let store = ChannelStore::new(1000);
    for set in &sets {
        store.ingest(set);
    }
    group.bench_function("aggregate_all_channels", |b| {
        let channels = ["temperature", "pressure", "vibration", "co2", "position"];
        b.iter(|| black_box(aggregate(&store, &channels, 100, &MetricSet::all())))
    });

    group.finish();
}

criterion_group!(benches, bench_decoding, bench_ingest);
criterion_main!(benches);
