//! Core data model: records, traversals, metric rows, thresholds, and
//! connection metadata flowing between the record buffer, the processors,
//! and the metric store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel value for "not yet computable" used for [`TraversalMetricRow::relative_metric`].
pub const RTSM_UNKNOWN: f32 = -1.0;

/// A geographic position: latitude/longitude in degrees, optional elevation in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub elevation_m: Option<f64>,
}

impl Position {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            elevation_m: None,
        }
    }

    pub const fn with_elevation(lat: f64, lon: f64, elevation_m: f64) -> Self {
        Self {
            lat,
            lon,
            elevation_m: Some(elevation_m),
        }
    }

    pub(crate) fn as_geo_point(&self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }
}

/// Immutable snapshot of one vehicle at one simulated time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub time_ns: i64,
    pub position: Position,
    pub connection_id: String,
    pub speed_m_s: f64,
    pub offset_m: f64,
    pub heading_deg: f64,
    /// Opaque to the core; carried through for downstream consumers only.
    #[serde(default)]
    pub perceived_vehicle_ids: Vec<String>,
}

impl Record {
    /// Byte size estimate used by simulated communication layers (§6).
    pub fn estimated_size_bytes(&self) -> usize {
        const BASE_RECORD_SIZE_BYTES: usize = 4 + 24 + 10 + 8 + 8 + 8;
        const PER_PERCEIVED_VEHICLE_BYTES: usize = 50;
        BASE_RECORD_SIZE_BYTES + self.perceived_vehicle_ids.len() * PER_PERCEIVED_VEHICLE_BYTES
    }
}

/// Ordered batch of records from one vehicle, keyed by `time_ns`, plus the
/// `final` flag indicating the vehicle will send no further updates.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: BTreeMap<i64, Record>,
    pub is_final: bool,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.insert(record.time_ns, record);
    }

    pub fn estimated_size_bytes(&self) -> usize {
        const HEADER_BYTES: usize = 10 + 8 + 1;
        HEADER_BYTES
            + self
                .records
                .values()
                .map(Record::estimated_size_bytes)
                .sum::<usize>()
    }
}

/// A completed traversal of one connection by one vehicle.
#[derive(Debug, Clone)]
pub struct Traversal {
    pub connection_id: String,
    /// Records on `connection_id`, in time order. Non-empty by construction.
    pub records: Vec<Record>,
    /// Last record on the previous connection, if any.
    pub previous_record: Option<Record>,
    /// First record on the next connection, if any.
    pub following_record: Option<Record>,
}

impl Traversal {
    pub fn vehicle_time_ns(&self) -> i64 {
        self.records.last().map(|r| r.time_ns).unwrap_or_default()
    }

    /// `next_connection_id` per §4.2: the following record's connection id,
    /// falling back to the current connection id when absent (§9 open question).
    pub fn next_connection_id(&self) -> &str {
        self.following_record
            .as_ref()
            .map(|r| r.connection_id.as_str())
            .unwrap_or(self.connection_id.as_str())
    }
}

/// One persisted traversal-metric row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalMetricRow {
    /// Assigned by the store on insert; used later as the traversal id for updates.
    pub id: Option<u64>,
    pub vehicle_id: String,
    pub time_ns: i64,
    pub connection_id: String,
    pub next_connection_id: String,
    pub spatial_mean_speed: f64,
    pub temporal_mean_speed: f64,
    pub naive_mean_speed: f64,
    /// `None` encodes "unknown", serialized/compared as [`RTSM_UNKNOWN`].
    pub relative_metric: Option<f32>,
    pub traversal_time_ns: f64,
    /// Insertion order, used by `get_traversal_metrics` to filter to rows
    /// inserted since `initialize` (§4.5).
    #[serde(default)]
    pub inserted_seq: u64,
}

impl TraversalMetricRow {
    pub fn relative_metric_or_sentinel(&self) -> f32 {
        self.relative_metric.unwrap_or(RTSM_UNKNOWN)
    }
}

/// Per-connection temporal/spatial thresholds with an insertion timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub temporal_threshold_m_s: f64,
    pub spatial_threshold_m_s: f64,
    pub simulation_time_ns: i64,
}

/// `connection_id -> max_speed_m_s, length_m` as populated from the road network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMeta {
    pub connection_id: String,
    pub max_speed_m_s: f64,
    pub length_m: f64,
}

/// Per-connection averaged traversal stats for a simulated time interval,
/// including the Speed Performance Index (§10.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalAverage {
    pub connection_id: String,
    pub temporal_avg_speed: f64,
    pub spatial_avg_speed: f64,
    pub traversal_count: usize,
    /// `temporal_avg_speed / max_speed_m_s`, `0.0` when `max_speed_m_s == 0.0`.
    pub spi: f64,
}

/// Shutdown statistics summary (§7, §10.6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub record_count: u64,
    pub traversal_count: u64,
    pub threshold_count: u64,
    pub connection_count: u64,
}

/// Payload size estimator from §6, exposed as a free function since the
/// wider simulation framework that would consume it is out of scope.
pub fn estimate_batch_size_bytes(batch: &RecordBatch) -> usize {
    batch.estimated_size_bytes()
}
