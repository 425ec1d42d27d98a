//! Spatio-temporal metric processor (§4.2): turns a completed [`Traversal`]
//! into temporal/spatial/naive mean speeds and, when thresholds already
//! exist for the connection, an RTSM value.

use crate::error::{Result, TseError};
use crate::geometry::{distance_m, enforce_strict_monotonicity, PiecewiseLinear};
use crate::processor::TraversalProcessor;
use crate::road_network::RoadNetworkMap;
use crate::store::MetricStore;
use crate::threshold::compute_rtsm;
use crate::types::{Traversal, TraversalMetricRow};
use std::sync::Arc;

const OUT_OF_RANGE_TOLERANCE_M: f64 = 5.0;
const MIN_MONOTONE_STEP_M: f64 = 0.001;

/// One sample in the interpolation input list `R` (§4.2): a record with its
/// offset recomputed relative to the connection start, independent of
/// whatever offset it originally carried.
struct Sample {
    offset_m: f64,
    time_ns: f64,
    speed_m_s: f64,
    connection_id: String,
}

pub struct SpatioTemporalProcessor {
    road_map: Arc<dyn RoadNetworkMap>,
    spatial_chunk_m: f64,
}

impl SpatioTemporalProcessor {
    pub fn new(road_map: Arc<dyn RoadNetworkMap>, spatial_chunk_m: f64) -> Self {
        Self {
            road_map,
            spatial_chunk_m,
        }
    }

    fn build_samples(&self, traversal: &Traversal) -> Result<Vec<Sample>> {
        let connection_id = &traversal.connection_id;

        let previous = traversal
            .previous_record
            .as_ref()
            .ok_or(TseError::IncompleteTraversal)?;
        let following = traversal
            .following_record
            .as_ref()
            .ok_or(TseError::IncompleteTraversal)?;

        if previous.connection_id == *connection_id || following.connection_id == *connection_id {
            return Err(TseError::IncompleteTraversal);
        }
        if traversal.records.is_empty() {
            return Err(TseError::IncompleteTraversal);
        }

        let geometry = self
            .road_map
            .get_connection(connection_id)
            .ok_or(TseError::IncompleteTraversal)?;
        let start_node = geometry.nodes.first().ok_or(TseError::IncompleteTraversal)?;

        let mut samples = Vec::with_capacity(traversal.records.len() + 2);

        let previous_offset = -distance_m(&previous.position, start_node);
        samples.push(Sample {
            offset_m: previous_offset,
            time_ns: previous.time_ns as f64,
            speed_m_s: previous.speed_m_s,
            connection_id: previous.connection_id.clone(),
        });

        for record in &traversal.records {
            samples.push(Sample {
                offset_m: record.offset_m,
                time_ns: record.time_ns as f64,
                speed_m_s: record.speed_m_s,
                connection_id: record.connection_id.clone(),
            });
        }

        let last_offset = samples.last().expect("pushed previous + records").offset_m;
        let following_offset =
            last_offset + distance_m(&traversal.records.last().unwrap().position, &following.position);
        samples.push(Sample {
            offset_m: following_offset,
            time_ns: following.time_ns as f64,
            speed_m_s: following.speed_m_s,
            connection_id: following.connection_id.clone(),
        });

        if samples.len() < 3 {
            return Err(TseError::IncompleteTraversal);
        }

        Ok(samples)
    }

    /// Computes the traversal's metrics without touching the store; exposed
    /// so tests and the threshold processor's RTSM recompute can reuse it.
    pub fn compute(
        &self,
        traversal: &Traversal,
        thresholds: Option<(f64, f64)>,
    ) -> Result<TraversalMetricRow> {
        let samples = self.build_samples(traversal)?;

        let mut x: Vec<f64> = samples.iter().map(|s| s.offset_m).collect();
        enforce_strict_monotonicity(&mut x, MIN_MONOTONE_STEP_M);
        let t: Vec<f64> = samples.iter().map(|s| s.time_ns).collect();
        let s: Vec<f64> = samples.iter().map(|s| s.speed_m_s).collect();

        let time_interp = PiecewiseLinear::new(x.clone(), t)?;
        let speed_interp = PiecewiseLinear::new(x.clone(), s)?;

        let geometry = self
            .road_map
            .get_connection(&traversal.connection_id)
            .ok_or(TseError::IncompleteTraversal)?;
        let mut length_m = geometry.length_m();
        let x_max = time_interp.x_max();

        if length_m > x_max && length_m <= x_max + OUT_OF_RANGE_TOLERANCE_M {
            length_m = x_max;
        }

        let traversal_time_ns = time_interp.eval(length_m)? - time_interp.eval(0.0)?;
        if traversal_time_ns <= 0.0 {
            return Err(TseError::IncompleteTraversal);
        }
        let temporal_mean_speed = (length_m / traversal_time_ns) * 1e9;

        let spatial_mean_speed = self.spatial_mean_speed(&samples, &speed_interp)?;

        let naive_mean_speed = {
            let on_connection: Vec<f64> = samples
                .iter()
                .filter(|sample| sample.connection_id == traversal.connection_id)
                .map(|sample| sample.speed_m_s)
                .collect();
            arithmetic_mean(&on_connection)
        };

        let relative_metric = thresholds.map(|(temporal_threshold, spatial_threshold)| {
            compute_rtsm(
                temporal_mean_speed,
                spatial_mean_speed,
                temporal_threshold,
                spatial_threshold,
            )
        });

        Ok(TraversalMetricRow {
            id: None,
            vehicle_id: String::new(),
            time_ns: traversal.vehicle_time_ns(),
            connection_id: traversal.connection_id.clone(),
            next_connection_id: traversal.next_connection_id().to_string(),
            spatial_mean_speed,
            temporal_mean_speed,
            naive_mean_speed,
            relative_metric,
            traversal_time_ns,
            inserted_seq: 0,
        })
    }

    fn spatial_mean_speed(&self, samples: &[Sample], speed_interp: &PiecewiseLinear) -> Result<f64> {
        let first = samples.first().expect("non-empty");
        let last = samples.last().expect("non-empty");
        let cur = first.offset_m.ceil();
        let end = last.offset_m.floor();
        let chunk = self.spatial_chunk_m;

        if end - cur < chunk {
            let all_speeds: Vec<f64> = samples.iter().map(|s| s.speed_m_s).collect();
            return Ok(arithmetic_mean(&all_speeds));
        }

        let mut offset = cur;
        let mut values = Vec::new();
        while end - offset >= chunk {
            let clamped = offset.clamp(speed_interp.x_min(), speed_interp.x_max());
            values.push(speed_interp.eval(clamped)?);
            offset += chunk;
        }
        Ok(arithmetic_mean(&values))
    }
}

fn arithmetic_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

impl TraversalProcessor for SpatioTemporalProcessor {
    fn id(&self) -> &str {
        "spatio_temporal"
    }

    fn handle_traversal(
        &mut self,
        vehicle_id: &str,
        traversal: &Traversal,
        store: &mut dyn MetricStore,
    ) -> Result<()> {
        let thresholds = store
            .get_thresholds(&traversal.connection_id)
            .map(|t| (t.temporal_threshold_m_s, t.spatial_threshold_m_s));

        let mut row = match self.compute(traversal, thresholds) {
            Ok(row) => row,
            Err(TseError::IncompleteTraversal) => {
                log::debug!(
                    "traversal of {} by {vehicle_id} is incomplete, skipping metric computation",
                    traversal.connection_id
                );
                return Ok(());
            }
            Err(err @ TseError::InterpolationOutOfRange { .. }) => {
                log::error!(
                    "connection {} traversal by {vehicle_id} out of interpolation range: {err}",
                    traversal.connection_id
                );
                return Ok(());
            }
            Err(other) => return Err(other),
        };

        row.vehicle_id = vehicle_id.to_string();
        store.insert_traversal_metric(row)?;
        Ok(())
    }
}
