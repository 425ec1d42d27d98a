//! Per-vehicle record buffer and traversal extractor (§4.1).
//!
//! Each vehicle owns a time-keyed ordered buffer of pending records, the
//! ordered sequence of distinct connection ids it has reported so far, and a
//! one-record look-back used as `previous_record` context for the next
//! traversal it completes.

use crate::types::{Record, RecordBatch, Traversal};
use std::collections::{BTreeMap, VecDeque};

/// Per-vehicle state owned exclusively by the kernel (§9 "Ownership of
/// buffered records").
#[derive(Debug, Default)]
struct VehicleState {
    pending: BTreeMap<i64, Record>,
    connections: VecDeque<String>,
    look_back: Option<Record>,
}

/// Buffers records for all active vehicles and extracts completed
/// traversals as batches arrive.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    vehicles: std::collections::HashMap<String, VehicleState>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn contains_vehicle(&self, vehicle_id: &str) -> bool {
        self.vehicles.contains_key(vehicle_id)
    }

    /// Newest buffered or completed record time for `vehicle_id`, used by the
    /// kernel's eviction tick (§4.4).
    pub fn newest_record_time_ns(&self, vehicle_id: &str) -> Option<i64> {
        let state = self.vehicles.get(vehicle_id)?;
        let pending_newest = state.pending.keys().next_back().copied();
        let look_back_time = state.look_back.as_ref().map(|r| r.time_ns);
        pending_newest.into_iter().chain(look_back_time).max()
    }

    pub fn evict(&mut self, vehicle_id: &str) {
        self.vehicles.remove(vehicle_id);
    }

    pub fn vehicle_ids(&self) -> impl Iterator<Item = &str> {
        self.vehicles.keys().map(String::as_str)
    }

    /// Ingests a batch from `vehicle_id` and returns every completed
    /// traversal in the order the vehicle produced them (§4.1 steps 1-4).
    pub fn ingest(&mut self, vehicle_id: &str, batch: &RecordBatch) -> Vec<Traversal> {
        let state = self.vehicles.entry(vehicle_id.to_string()).or_default();

        for record in batch.records.values() {
            state.pending.insert(record.time_ns, record.clone());
        }

        for record in batch.records.values() {
            if state.connections.back() != Some(&record.connection_id) {
                state.connections.push_back(record.connection_id.clone());
            }
        }

        let mut completed = Vec::new();
        while state.connections.len() > 1 {
            let connection_id = state
                .connections
                .pop_front()
                .expect("len > 1 checked above");
            if let Some(traversal) = extract_traversal(state, connection_id) {
                completed.push(traversal);
            }
        }

        if batch.is_final {
            self.vehicles.remove(vehicle_id);
        }

        completed
    }
}

/// Extracts the single traversal of `connection_id` at the head of the
/// vehicle's connection queue (§4.1.1).
fn extract_traversal(state: &mut VehicleState, connection_id: String) -> Option<Traversal> {
    let on_connection: Vec<i64> = state
        .pending
        .range(..)
        .filter(|(_, record)| record.connection_id == connection_id)
        .map(|(time, _)| *time)
        .collect();

    let records: Vec<Record> = on_connection
        .into_iter()
        .filter_map(|time| state.pending.remove(&time))
        .collect();

    if records.is_empty() {
        return None;
    }

    let previous_record = state.look_back.clone();
    let following_record = state
        .pending
        .values()
        .next()
        .cloned()
        .filter(|record| record.connection_id != connection_id);

    state.look_back = records.last().cloned();

    Some(Traversal {
        connection_id,
        records,
        previous_record,
        following_record,
    })
}
