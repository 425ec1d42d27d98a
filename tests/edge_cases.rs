use std::sync::Arc;
use tse_core::prelude::*;
use tse_core::{MemoryStore, SpatioTemporalProcessor};

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

fn single_connection_map(connection_id: &str, length_m: f64, max_speed_m_s: f64) -> Arc<dyn RoadNetworkMap> {
    Arc::new(StaticRoadNetworkMap::new().with_connection(
        connection_id,
        vec![Position::new(0.0, 0.0), Position::new(0.0, length_m / 111_000.0)],
        max_speed_m_s,
    ))
}

/// Connection shorter than `spatial_mean_speed_chunk_m`: spatial mean falls
/// back to the arithmetic mean of all samples, including padded ones.
#[test]
fn connection_shorter_than_chunk_uses_arithmetic_mean() {
    let map = single_connection_map("B", 5.0, 30.0);
    let processor = SpatioTemporalProcessor::new(map, 15.0);
    let traversal = Traversal {
        connection_id: "B".into(),
        records: vec![record(0, "B", 0.0, 20.0), record(1_000_000_000, "B", 5.0, 30.0)],
        previous_record: Some(record(-1_000_000_000, "A", 1.0, 25.0)),
        following_record: Some(record(2_000_000_000, "C", 1.0, 25.0)),
    };
    let row = processor.compute(&traversal, None).unwrap();
    let expected = (25.0 + 20.0 + 30.0 + 25.0) / 4.0;
    assert!((row.spatial_mean_speed - expected).abs() < 1.0);
}

/// Connection length exactly equal to `x_max`: traversal time is computed
/// directly from `t(x_max) - t(0)` with no clamping.
#[test]
fn connection_length_exactly_x_max() {
    let map = single_connection_map("B", 100.0, 30.0);
    let processor = SpatioTemporalProcessor::new(map, 15.0);
    let traversal = Traversal {
        connection_id: "B".into(),
        records: vec![
            record(0, "B", 0.0, 25.0),
            record(1_000_000_000, "B", 25.0, 25.0),
            record(2_000_000_000, "B", 50.0, 25.0),
            record(3_000_000_000, "B", 75.0, 25.0),
            record(4_000_000_000, "B", 100.0, 25.0),
        ],
        previous_record: Some(record(-1_000_000_000, "A", 5.0, 25.0)),
        following_record: Some(record(5_000_000_000, "C", 5.0, 25.0)),
    };
    let row = processor.compute(&traversal, None).unwrap();
    assert!((row.traversal_time_ns - 4_000_000_000.0).abs() < 1.0);
}

/// Connection length well beyond `x_max + 5`: the traversal produces no
/// metric and the caller (the processor's `handle_traversal`) just logs and
/// moves on rather than propagating an error.
#[test]
fn connection_length_far_out_of_range_is_an_error() {
    let map = single_connection_map("B", 10_000.0, 30.0);
    let processor = SpatioTemporalProcessor::new(map, 15.0);
    let traversal = Traversal {
        connection_id: "B".into(),
        records: vec![
            record(0, "B", 0.0, 25.0),
            record(1_000_000_000, "B", 25.0, 25.0),
        ],
        previous_record: Some(record(-1_000_000_000, "A", 5.0, 25.0)),
        following_record: Some(record(2_000_000_000, "C", 5.0, 25.0)),
    };
    assert!(matches!(
        processor.compute(&traversal, None),
        Err(TseError::InterpolationOutOfRange { .. })
    ));
}

/// Running the threshold tick twice at the same simulated time with no new
/// data between the two ticks produces the same thresholds (idempotence).
#[test]
fn threshold_tick_is_idempotent_with_no_new_data() {
    use std::time::Duration;

    let map: Arc<dyn RoadNetworkMap> = Arc::new(
        StaticRoadNetworkMap::new()
            .with_connection("A", vec![Position::new(0.0, 0.0), Position::new(0.0, 100.0 / 111_000.0)], 30.0)
            .with_connection("B", vec![Position::new(0.0, 0.0), Position::new(0.0, 100.0 / 111_000.0)], 30.0)
            .with_connection("C", vec![Position::new(0.0, 0.0), Position::new(0.0, 100.0 / 111_000.0)], 30.0),
    );
    let config = Config::default().with_trigger_interval(Duration::from_secs(1800));
    let mut kernel = KernelBuilder::new(config, map).build().unwrap();

    for i in 0..12 {
        let speed = 20.0 + i as f64;
        let mut b1 = RecordBatch::new();
        for r in [
            record(0, "A", 0.0, 25.0),
            record(1_000_000_000, "A", 25.0, 25.0),
            record(2_000_000_000, "A", 50.0, 25.0),
            record(3_000_000_000, "A", 75.0, 25.0),
            record(4_000_000_000, "A", 100.0, 25.0),
            record(5_000_000_000, "B", 5.0, speed),
        ] {
            b1.push(r);
        }
        kernel.handle_update(&format!("v{i}"), &b1).unwrap();

        let mut b2 = RecordBatch::new();
        for r in [
            record(6_000_000_000, "B", 25.0, speed),
            record(7_000_000_000, "B", 50.0, speed),
            record(8_000_000_000, "B", 75.0, speed),
            record(9_000_000_000, "B", 100.0, speed),
            record(10_000_000_000, "C", 0.0, 25.0),
        ] {
            b2.push(r);
        }
        kernel.handle_update(&format!("v{i}"), &b2).unwrap();
    }

    let tick_ns = Duration::from_secs(1800).as_nanos() as i64;
    kernel.advance_time(tick_ns).unwrap();
    let first = kernel.store().get_thresholds("B").unwrap();

    kernel.advance_time(tick_ns).unwrap();
    let second = kernel.store().get_thresholds("B").unwrap();

    assert_eq!(first.temporal_threshold_m_s, second.temporal_threshold_m_s);
    assert_eq!(first.spatial_threshold_m_s, second.spatial_threshold_m_s);
}

/// Traversal times all at or below the 5 ns noise floor: no percentile is
/// computed for that connection this tick, so no threshold is inserted.
#[test]
fn traversal_times_below_noise_floor_are_excluded() {
    use tse_core::ThresholdProcessor;
    use std::time::Duration;

    let mut processor = ThresholdProcessor::new(
        Duration::from_secs(1800),
        1,
        1,
        400,
        Duration::from_secs(45),
        false,
    );
    let mut store = MemoryStore::new();
    let map = single_connection_map("B", 100.0, 30.0);
    store.initialize(map.as_ref(), true).unwrap();

    let row = TraversalMetricRow {
        id: None,
        vehicle_id: "v1".into(),
        time_ns: 1,
        connection_id: "B".into(),
        next_connection_id: "C".into(),
        spatial_mean_speed: 25.0,
        temporal_mean_speed: 25.0,
        naive_mean_speed: 25.0,
        relative_metric: None,
        traversal_time_ns: 4.0,
        inserted_seq: 0,
    };
    store.insert_traversal_metric(row).unwrap();

    processor.trigger_event(1, &mut store).unwrap();
    assert!(store.get_thresholds("B").is_none());
}
