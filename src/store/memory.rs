//! Pure in-process metric store backed by `BTreeMap`s (§9 "Embedded SQL via
//! a singleton connection" REDESIGN FLAG: an explicit `MetricStore` value
//! owned by the kernel, backing onto an in-process structure).

use super::MetricStore;
use crate::error::Result;
use crate::road_network::RoadNetworkMap;
use crate::types::{ConnectionMeta, IntervalAverage, Record, StoreStats, Thresholds, TraversalMetricRow};
use std::collections::{BTreeMap, HashMap};

/// Primary key for the records table: `(connection_id, time_ns, vehicle_id)` (§4.5).
type RecordKey = (String, i64, String);

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<RecordKey, Record>,
    traversal_metrics: BTreeMap<u64, TraversalMetricRow>,
    next_traversal_id: u64,
    insert_seq: u64,
    since_seq: u64,
    /// Full threshold history, insertion order, for "most recent by
    /// insertion time" lookups when the cache is cold.
    threshold_history: Vec<(String, Thresholds)>,
    threshold_cache: HashMap<String, Thresholds>,
    connections: HashMap<String, ConnectionMeta>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricStore for MemoryStore {
    fn initialize(&mut self, road_map: &dyn RoadNetworkMap, persistent: bool) -> Result<()> {
        if !persistent {
            self.records.clear();
            self.traversal_metrics.clear();
            self.next_traversal_id = 0;
            self.threshold_history.clear();
            self.threshold_cache.clear();
            self.connections.clear();
        }

        for meta in road_map.connection_metadata() {
            self.connections.insert(meta.connection_id.clone(), meta);
        }

        self.since_seq = self.insert_seq;
        Ok(())
    }

    fn insert_records(&mut self, vehicle_id: &str, records: &[Record]) -> Result<()> {
        for record in records {
            let key = (record.connection_id.clone(), record.time_ns, vehicle_id.to_string());
            self.records.insert(key, record.clone());
        }
        Ok(())
    }

    fn insert_traversal_metric(&mut self, mut row: TraversalMetricRow) -> Result<u64> {
        let id = self.next_traversal_id;
        self.next_traversal_id += 1;
        self.insert_seq += 1;
        row.id = Some(id);
        row.inserted_seq = self.insert_seq;
        self.traversal_metrics.insert(id, row);
        Ok(id)
    }

    fn update_traversal_metrics(&mut self, rows: &[TraversalMetricRow]) -> Result<()> {
        for row in rows {
            let Some(relative_metric) = row.relative_metric else {
                continue;
            };
            let Some(id) = row.id else { continue };
            if let Some(existing) = self.traversal_metrics.get_mut(&id) {
                existing.relative_metric = Some(relative_metric);
            }
        }
        Ok(())
    }

    fn insert_thresholds(&mut self, thresholds: &HashMap<String, Thresholds>) -> Result<()> {
        for (connection_id, value) in thresholds {
            self.threshold_history.push((connection_id.clone(), *value));
            self.threshold_cache.insert(connection_id.clone(), *value);
        }
        Ok(())
    }

    fn get_thresholds(&self, connection_id: &str) -> Option<Thresholds> {
        if let Some(cached) = self.threshold_cache.get(connection_id) {
            return Some(*cached);
        }
        self.threshold_history
            .iter()
            .rev()
            .find(|(id, _)| id == connection_id)
            .map(|(_, thresholds)| *thresholds)
    }

    fn got_threshold_for(&self, connection_id: &str) -> bool {
        self.threshold_cache.contains_key(connection_id)
    }

    fn get_traversal_times(&self) -> HashMap<String, Vec<f64>> {
        let mut by_connection: HashMap<String, Vec<f64>> = HashMap::new();
        for row in self.traversal_metrics.values() {
            by_connection
                .entry(row.connection_id.clone())
                .or_default()
                .push(row.traversal_time_ns);
        }
        by_connection
    }

    fn get_mean_speeds(&self) -> HashMap<String, Vec<(f64, f64)>> {
        let mut by_connection: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
        for row in self.traversal_metrics.values() {
            by_connection
                .entry(row.connection_id.clone())
                .or_default()
                .push((row.temporal_mean_speed, row.spatial_mean_speed));
        }
        by_connection
    }

    fn get_traversal_metrics(&self) -> Vec<TraversalMetricRow> {
        self.traversal_metrics
            .values()
            .filter(|row| row.inserted_seq >= self.since_seq)
            .cloned()
            .collect()
    }

    fn get_averages_for_interval(&self, t0_ns: i64, delta_ns: i64) -> Vec<IntervalAverage> {
        let mut accum: HashMap<String, (f64, f64, usize)> = HashMap::new();
        for row in self.traversal_metrics.values() {
            if row.time_ns > t0_ns && row.time_ns < t0_ns + delta_ns {
                let entry = accum.entry(row.connection_id.clone()).or_insert((0.0, 0.0, 0));
                entry.0 += row.temporal_mean_speed;
                entry.1 += row.spatial_mean_speed;
                entry.2 += 1;
            }
        }
        accum
            .into_iter()
            .map(|(connection_id, (temporal_sum, spatial_sum, count))| {
                let count_f = count as f64;
                let temporal_avg_speed = temporal_sum / count_f;
                let max_speed_m_s = self
                    .connections
                    .get(&connection_id)
                    .map(|meta| meta.max_speed_m_s)
                    .unwrap_or(0.0);
                let spi = if max_speed_m_s > 0.0 {
                    temporal_avg_speed / max_speed_m_s
                } else {
                    0.0
                };
                IntervalAverage {
                    connection_id,
                    temporal_avg_speed,
                    spatial_avg_speed: spatial_sum / count_f,
                    traversal_count: count,
                    spi,
                }
            })
            .collect()
    }

    fn get_closest_traversal_data(
        &self,
        connection_id: &str,
        t_ns: i64,
    ) -> Option<TraversalMetricRow> {
        // Ties on `time_ns` prefer the most-recently-inserted row: ids are
        // assigned in insertion order, so break ties on descending id.
        self.traversal_metrics
            .values()
            .filter(|row| row.connection_id == connection_id)
            .min_by_key(|row| ((row.time_ns - t_ns).abs(), std::cmp::Reverse(row.id.unwrap_or(0))))
            .cloned()
    }

    fn get_connection_meta(&self, connection_id: &str) -> Option<ConnectionMeta> {
        self.connections.get(connection_id).cloned()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            record_count: self.records.len() as u64,
            traversal_count: self.traversal_metrics.len() as u64,
            threshold_count: self.threshold_cache.len() as u64,
            connection_count: self.connections.len() as u64,
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road_network::StaticRoadNetworkMap;
    use crate::types::Position;

    fn sample_row(connection_id: &str, time_ns: i64, traversal_time_ns: f64) -> TraversalMetricRow {
        TraversalMetricRow {
            id: None,
            vehicle_id: "v1".into(),
            time_ns,
            connection_id: connection_id.into(),
            next_connection_id: "B".into(),
            spatial_mean_speed: 25.0,
            temporal_mean_speed: 25.0,
            naive_mean_speed: 25.0,
            relative_metric: None,
            traversal_time_ns,
            inserted_seq: 0,
        }
    }

    #[test]
    fn insert_assigns_incrementing_ids() {
        let mut store = MemoryStore::new();
        let id0 = store.insert_traversal_metric(sample_row("A", 1, 4e9)).unwrap();
        let id1 = store.insert_traversal_metric(sample_row("A", 2, 4e9)).unwrap();
        assert_eq!(id0, 0);
        assert_eq!(id1, 1);
    }

    #[test]
    fn update_only_applies_rows_with_non_null_rtsm() {
        let mut store = MemoryStore::new();
        let id = store.insert_traversal_metric(sample_row("A", 1, 4e9)).unwrap();
        let mut row = sample_row("A", 1, 4e9);
        row.id = Some(id);
        row.relative_metric = None;
        store.update_traversal_metrics(&[row]).unwrap();
        assert!(store.get_traversal_metrics()[0].relative_metric.is_none());

        let mut row = sample_row("A", 1, 4e9);
        row.id = Some(id);
        row.relative_metric = Some(0.3);
        store.update_traversal_metrics(&[row]).unwrap();
        assert_eq!(store.get_traversal_metrics()[0].relative_metric, Some(0.3));
    }

    #[test]
    fn threshold_cache_reflects_latest_insert() {
        let mut store = MemoryStore::new();
        let mut first = HashMap::new();
        first.insert(
            "A".to_string(),
            Thresholds {
                temporal_threshold_m_s: 10.0,
                spatial_threshold_m_s: 9.0,
                simulation_time_ns: 1,
            },
        );
        store.insert_thresholds(&first).unwrap();
        assert!(store.got_threshold_for("A"));

        let mut second = HashMap::new();
        second.insert(
            "A".to_string(),
            Thresholds {
                temporal_threshold_m_s: 20.0,
                spatial_threshold_m_s: 19.0,
                simulation_time_ns: 2,
            },
        );
        store.insert_thresholds(&second).unwrap();
        assert_eq!(store.get_thresholds("A").unwrap().temporal_threshold_m_s, 20.0);
    }

    #[test]
    fn get_traversal_metrics_only_returns_rows_since_initialize() {
        let mut store = MemoryStore::new();
        store.insert_traversal_metric(sample_row("A", 1, 4e9)).unwrap();
        let map = StaticRoadNetworkMap::new();
        store.initialize(&map, true).unwrap();
        store.insert_traversal_metric(sample_row("A", 2, 4e9)).unwrap();
        let rows = store.get_traversal_metrics();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time_ns, 2);
    }

    #[test]
    fn non_persistent_initialize_truncates_tables() {
        let mut store = MemoryStore::new();
        store.insert_traversal_metric(sample_row("A", 1, 4e9)).unwrap();
        let map = StaticRoadNetworkMap::new();
        store.initialize(&map, false).unwrap();
        assert_eq!(store.stats().traversal_count, 0);
    }

    #[test]
    fn closest_traversal_picks_nearest_time() {
        let mut store = MemoryStore::new();
        store.insert_traversal_metric(sample_row("A", 100, 4e9)).unwrap();
        store.insert_traversal_metric(sample_row("A", 500, 4e9)).unwrap();
        let closest = store.get_closest_traversal_data("A", 420).unwrap();
        assert_eq!(closest.time_ns, 500);
    }

    #[test]
    fn interval_average_computes_speed_performance_index() {
        let mut store = MemoryStore::new();
        let map = StaticRoadNetworkMap::new().with_connection(
            "A",
            vec![Position::new(0.0, 0.0), Position::new(0.0, 0.001)],
            20.0,
        );
        store.initialize(&map, true).unwrap();
        store.insert_traversal_metric(sample_row("A", 10, 4e9)).unwrap();
        let averages = store.get_averages_for_interval(0, 20);
        assert_eq!(averages.len(), 1);
        assert!((averages[0].spi - 25.0 / 20.0).abs() < 1e-9);
    }
}
