//! The metric store: the durable contract through which the traversal
//! extractor, the spatio-temporal processor, and the threshold processor
//! collaborate (§4.5).
//!
//! Storage engine choice doesn't matter to the contract; two backends are
//! provided: [`memory::MemoryStore`] (pure in-process `BTreeMap`s) and
//! [`file::FileStore`] (an append-only log replayed into a `MemoryStore` on
//! open, gated behind the `persistence` feature).

mod memory;

#[cfg(feature = "persistence")]
mod file;

pub use memory::MemoryStore;

#[cfg(feature = "persistence")]
pub use file::FileStore;

use crate::error::Result;
use crate::road_network::RoadNetworkMap;
use crate::types::{ConnectionMeta, IntervalAverage, Record, StoreStats, Thresholds, TraversalMetricRow};
use std::collections::HashMap;

/// Durable contract implemented by every metric store backend (§4.5).
pub trait MetricStore: Send + Sync {
    /// Creates tables if absent; if `persistent` is false, truncates
    /// records/traversals/thresholds/connections first; populates
    /// `connections` from the road map via upsert.
    fn initialize(&mut self, road_map: &dyn RoadNetworkMap, persistent: bool) -> Result<()>;

    fn insert_records(&mut self, vehicle_id: &str, records: &[Record]) -> Result<()>;

    fn insert_records_bulk(&mut self, records: &HashMap<String, Vec<Record>>) -> Result<()> {
        for (vehicle_id, records) in records {
            self.insert_records(vehicle_id, records)?;
        }
        Ok(())
    }

    /// Appends a metric row, auto-assigning its id. Returns the assigned id.
    fn insert_traversal_metric(&mut self, row: TraversalMetricRow) -> Result<u64>;

    /// Updates rows with a non-null RTSM by id, in a single batch.
    fn update_traversal_metrics(&mut self, rows: &[TraversalMetricRow]) -> Result<()>;

    /// Inserts new thresholds for possibly many connections and refreshes
    /// the in-memory cache to these latest values.
    fn insert_thresholds(
        &mut self,
        thresholds: &HashMap<String, Thresholds>,
    ) -> Result<()>;

    /// Cache first; otherwise most-recent row by insertion time; `None` if absent.
    fn get_thresholds(&self, connection_id: &str) -> Option<Thresholds>;

    /// Cache lookup only, never touches the underlying table.
    fn got_threshold_for(&self, connection_id: &str) -> bool;

    /// `connection_id -> traversal_time_ns` over the full store.
    fn get_traversal_times(&self) -> HashMap<String, Vec<f64>>;

    /// `connection_id -> (temporal_mean_speed, spatial_mean_speed)` pairs.
    fn get_mean_speeds(&self) -> HashMap<String, Vec<(f64, f64)>>;

    /// All traversal rows inserted since `initialize`.
    fn get_traversal_metrics(&self) -> Vec<TraversalMetricRow>;

    /// Per-connection averaged traversal stats (incl. Speed Performance
    /// Index) for rows with `time_ns` in `(t0, t0 + delta_ns)`.
    fn get_averages_for_interval(&self, t0_ns: i64, delta_ns: i64) -> Vec<IntervalAverage>;

    /// The row on `connection_id` whose `time_ns` is nearest to `t_ns`.
    fn get_closest_traversal_data(
        &self,
        connection_id: &str,
        t_ns: i64,
    ) -> Option<TraversalMetricRow>;

    /// Connection metadata as populated by `initialize` from the road map.
    fn get_connection_meta(&self, connection_id: &str) -> Option<ConnectionMeta>;

    fn stats(&self) -> StoreStats;

    /// Flush/commit and close. An in-memory variant writes its contents back
    /// to the persistent path on shutdown (handled by `FileStore`).
    fn shutdown(&mut self) -> Result<()>;
}
