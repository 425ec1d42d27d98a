//! Threshold / RTSM processor (§4.3): a time-triggered job that recomputes
//! per-connection percentile-based thresholds from traversal history and,
//! optionally, rewrites RTSM on every stored traversal.

use crate::error::Result;
use crate::processor::TimeBasedProcessor;
use crate::store::MetricStore;
use crate::types::{RecordBatch, Thresholds};
use statrs::statistics::{Data, OrderStatistics};
use std::collections::HashMap;
use std::time::Duration;

/// Traversal times at or below this are treated as noise and excluded before
/// percentile computation (§4.3.1 step 2).
const NOISE_FLOOR_NS: f64 = 5.0;

/// RTSM computation (§4.3.2), shared with the spatio-temporal processor so a
/// traversal can get an immediate RTSM when thresholds already exist.
///
/// `t_mean`/`s_mean` equal to `-1.0` mean "unknown" per the sentinel
/// convention (§3); thresholds absent is modeled by the caller never
/// invoking this function (it returns the sentinel directly instead).
pub fn compute_rtsm(t_mean: f64, s_mean: f64, temporal_threshold: f64, spatial_threshold: f64) -> f32 {
    const UNKNOWN_SENTINEL: f64 = -1.0;
    if t_mean == UNKNOWN_SENTINEL || s_mean == UNKNOWN_SENTINEL {
        return 1.0;
    }

    let distance = match (t_mean >= temporal_threshold, s_mean >= spatial_threshold) {
        (true, true) => 0.0,
        (false, true) => temporal_threshold - t_mean,
        (false, false) => (temporal_threshold - t_mean) + (spatial_threshold - s_mean),
        (true, false) => spatial_threshold - s_mean,
    };

    (distance / (temporal_threshold + spatial_threshold)) as f32
}

fn percentile(values: &[f64], p: usize) -> f64 {
    let mut data = Data::new(values.to_vec());
    data.percentile(p)
}

/// Periodic per-connection threshold recomputation plus red-light heuristic
/// tracking (§4.3.1, §4.3.3).
pub struct ThresholdProcessor {
    interval: Duration,
    min_traversals_for_threshold: usize,
    min_heuristic: usize,
    max_heuristic: usize,
    default_red_light_ns: f64,
    recompute_all_rtsm: bool,
    /// Sticky once set for a connection, per §4.3.3 "the estimate is sticky
    /// for the lifetime of the processor".
    red_light_ns: HashMap<String, f64>,
    last_tick_ns: Option<i64>,
}

impl ThresholdProcessor {
    pub fn new(
        interval: Duration,
        min_traversals_for_threshold: usize,
        min_heuristic: usize,
        max_heuristic: usize,
        default_red_light: Duration,
        recompute_all_rtsm: bool,
    ) -> Self {
        Self {
            interval,
            min_traversals_for_threshold,
            min_heuristic,
            max_heuristic,
            default_red_light_ns: default_red_light.as_secs_f64() * 1e9,
            recompute_all_rtsm,
            red_light_ns: HashMap::new(),
            last_tick_ns: None,
        }
    }

    fn red_light_for(&mut self, connection_id: &str, traversal_times: &[f64]) -> f64 {
        if let Some(&existing) = self.red_light_ns.get(connection_id) {
            return existing;
        }

        let count = traversal_times.len();
        if count < self.min_heuristic || count > self.max_heuristic {
            return 0.0;
        }

        let p60 = percentile(traversal_times, 60);
        let p5 = percentile(traversal_times, 5);
        let diff = (p60 - p5).abs();

        if diff >= self.default_red_light_ns && diff <= 3.0 * self.default_red_light_ns {
            self.red_light_ns.insert(connection_id.to_string(), self.default_red_light_ns);
            self.default_red_light_ns
        } else {
            0.0
        }
    }

    /// Recomputes and persists thresholds for every connection with enough
    /// history (§4.3.1). A connection is only persisted once it has received
    /// both a temporal and a spatial threshold (§4.3.1 step 7).
    fn recompute_thresholds(&mut self, store: &mut dyn MetricStore, now_ns: i64) -> Result<()> {
        let traversal_times = store.get_traversal_times();
        let mean_speeds = store.get_mean_speeds();

        let mut temporal_thresholds: HashMap<String, f64> = HashMap::new();

        for (connection_id, times) in &traversal_times {
            let filtered: Vec<f64> = times.iter().copied().filter(|&t| t > NOISE_FLOOR_NS).collect();
            if filtered.len() < self.min_traversals_for_threshold {
                continue;
            }

            let Some(length_m) = store.get_connection_meta(connection_id).map(|meta| meta.length_m) else {
                continue;
            };

            let p5 = percentile(&filtered, 5);
            let red_light = self.red_light_for(connection_id, &filtered);
            let denom_s = (p5 + red_light) / 1e9;
            if denom_s <= 0.0 || length_m <= 0.0 {
                continue;
            }
            temporal_thresholds.insert(connection_id.clone(), length_m / denom_s);
        }

        let mut rows = HashMap::new();
        for (connection_id, temporal_threshold) in &temporal_thresholds {
            let Some(pairs) = mean_speeds.get(connection_id) else {
                continue;
            };
            let spatial_values: Vec<f64> = pairs
                .iter()
                .filter(|(t, _)| *t >= *temporal_threshold)
                .map(|(_, s)| *s)
                .collect();
            if spatial_values.is_empty() {
                continue;
            }
            rows.insert(
                connection_id.clone(),
                Thresholds {
                    temporal_threshold_m_s: *temporal_threshold,
                    spatial_threshold_m_s: percentile(&spatial_values, 5),
                    simulation_time_ns: now_ns,
                },
            );
        }

        store.insert_thresholds(&rows)
    }

    fn recompute_all_rtsm(&self, store: &mut dyn MetricStore) -> Result<()> {
        let mut updated = Vec::new();
        for mut row in store.get_traversal_metrics() {
            let Some(thresholds) = store.get_thresholds(&row.connection_id) else {
                continue;
            };
            row.relative_metric = Some(compute_rtsm(
                row.temporal_mean_speed,
                row.spatial_mean_speed,
                thresholds.temporal_threshold_m_s,
                thresholds.spatial_threshold_m_s,
            ));
            updated.push(row);
        }
        store.update_traversal_metrics(&updated)
    }
}

impl TimeBasedProcessor for ThresholdProcessor {
    fn id(&self) -> &str {
        "threshold"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn handle_update(&mut self, _vehicle_id: &str, _batch: &RecordBatch) {}

    fn trigger_event(&mut self, now_ns: i64, store: &mut dyn MetricStore) -> Result<()> {
        self.recompute_thresholds(store, now_ns)?;
        if self.recompute_all_rtsm {
            self.recompute_all_rtsm(store)?;
        }
        self.last_tick_ns = Some(now_ns);
        Ok(())
    }

    fn shutdown(&mut self, now_ns: i64, store: &mut dyn MetricStore) -> Result<()> {
        if self.last_tick_ns != Some(now_ns) {
            self.trigger_event(now_ns, store)?;
        }
        self.recompute_all_rtsm(store)
    }
}
