use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tse_core::prelude::*;

fn road_map() -> Arc<dyn RoadNetworkMap> {
    let mut map = StaticRoadNetworkMap::new();
    for i in 0..8 {
        map = map.with_connection(
            format!("conn-{i}"),
            vec![Position::new(0.0, 0.0), Position::new(0.0, 500.0 / 111_000.0)],
            30.0,
        );
    }
    Arc::new(map)
}

fn record(time_ns: i64, connection_id: &str, offset_m: f64, speed_m_s: f64) -> Record {
    Record {
        time_ns,
        position: Position::new(0.0, offset_m / 111_000.0),
        connection_id: connection_id.into(),
        speed_m_s,
        offset_m,
        heading_deg: 0.0,
        perceived_vehicle_ids: Vec::new(),
    }
}

fn vehicle_batch(connection_index: usize, offset_ns: i64) -> RecordBatch {
    let connection_id = format!("conn-{connection_index}");
    let mut batch = RecordBatch::new();
    for step in 0..10 {
        batch.push(record(
            offset_ns + step * 1_000_000_000,
            &connection_id,
            step as f64 * 50.0,
            25.0,
        ));
    }
    batch
}

fn bench_single_vehicle_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_vehicle_ingest");

    for num_updates in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*num_updates as u64));
        group.bench_with_input(
            BenchmarkId::new("handle_update", num_updates),
            num_updates,
            |b, &n| {
                b.iter(|| {
                    let mut kernel = KernelBuilder::new(Config::default(), road_map()).build().unwrap();
                    for i in 0..n {
                        let batch = vehicle_batch(i % 8, (i as i64) * 10_000_000_000);
                        kernel.handle_update("v1", &batch).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_many_vehicles_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_vehicles_ingest");

    for num_vehicles in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*num_vehicles as u64));
        group.bench_with_input(
            BenchmarkId::new("handle_update", num_vehicles),
            num_vehicles,
            |b, &n| {
                b.iter(|| {
                    let mut kernel = KernelBuilder::new(Config::default(), road_map()).build().unwrap();
                    for i in 0..n {
                        let batch = vehicle_batch(i % 8, 0);
                        kernel.handle_update(&format!("v{i}"), &batch).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_single_vehicle_ingest, bench_many_vehicles_ingest);
criterion_main!(benches);
