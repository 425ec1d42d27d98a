//! Kernel / scheduler (§4.4): owns the record buffer, the three processor
//! registries, and the event queue; routes updates, fires time-based ticks,
//! and runs periodic garbage collection of inactive vehicles.

use crate::buffer::RecordBuffer;
use crate::config::Config;
use crate::error::Result;
use crate::processor::{MessageProcessor, TimeBasedProcessor, TraversalProcessor};
use crate::store::MetricStore;
use crate::types::{RecordBatch, StoreStats};
use std::collections::HashMap;

/// A single time-based processor's scheduling state.
struct ScheduledProcessor {
    processor: Box<dyn TimeBasedProcessor>,
    next_fire_ns: i64,
}

/// Owns every component named in §4.4 and drives the simulation's event loop.
///
/// The kernel is single-threaded and cooperative (§5): it processes exactly
/// one update or timer event at a time, to completion, with no suspension
/// points inside the core.
pub struct Kernel {
    store: Box<dyn MetricStore>,
    buffer: RecordBuffer,
    traversal_processors: Vec<Box<dyn TraversalProcessor>>,
    time_based_processors: Vec<ScheduledProcessor>,
    message_processors: HashMap<String, Box<dyn MessageProcessor>>,
    store_raw_fcd: bool,
    unit_removal_interval_ns: i64,
    unit_expiration_ns: i64,
    next_eviction_ns: Option<i64>,
    oldest_allowed_record_time_ns: i64,
}

impl Kernel {
    pub(crate) fn new(
        config: &Config,
        store: Box<dyn MetricStore>,
        traversal_processors: Vec<Box<dyn TraversalProcessor>>,
        time_based_processors: Vec<Box<dyn TimeBasedProcessor>>,
        message_processors: Vec<Box<dyn MessageProcessor>>,
    ) -> Self {
        let time_based_processors = time_based_processors
            .into_iter()
            .filter(|p| !p.interval().is_zero())
            .map(|processor| ScheduledProcessor {
                next_fire_ns: processor.interval().as_nanos() as i64,
                processor,
            })
            .collect();

        let message_processors = message_processors
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();

        Self {
            store,
            buffer: RecordBuffer::new(),
            traversal_processors,
            time_based_processors,
            message_processors,
            store_raw_fcd: config.store_raw_fcd,
            unit_removal_interval_ns: config.unit_removal_interval().as_nanos() as i64,
            unit_expiration_ns: config.unit_expiration().as_nanos() as i64,
            next_eviction_ns: Some(config.unit_removal_interval().as_nanos() as i64),
            oldest_allowed_record_time_ns: 0,
        }
    }

    pub fn store(&self) -> &dyn MetricStore {
        self.store.as_ref()
    }

    pub fn active_vehicle_count(&self) -> usize {
        self.buffer.active_vehicle_count()
    }

    pub(crate) fn contains_vehicle(&self, vehicle_id: &str) -> bool {
        self.buffer.contains_vehicle(vehicle_id)
    }

    /// Routes one update from `vehicle_id` (§4.4): bookkeeping for every
    /// time-based processor, traversal extraction and dispatch, raw-FCD
    /// persistence if enabled, then vehicle cleanup if `is_final`.
    pub fn handle_update(&mut self, vehicle_id: &str, batch: &RecordBatch) -> Result<()> {
        for scheduled in &mut self.time_based_processors {
            scheduled.processor.handle_update(vehicle_id, batch);
        }

        if self.store_raw_fcd {
            let records: Vec<_> = batch.records.values().cloned().collect();
            self.store.insert_records(vehicle_id, &records)?;
        }

        let traversals = self.buffer.ingest(vehicle_id, batch);
        for traversal in &traversals {
            for processor in &mut self.traversal_processors {
                processor.handle_traversal(vehicle_id, traversal, self.store.as_mut())?;
            }
        }

        Ok(())
    }

    /// Dispatches a message to the processor registered under `processor_id`
    /// (§4.4, §7 Unknown-processor-identifier).
    pub fn handle_message(&mut self, processor_id: &str, message: &[u8]) -> Result<()> {
        let Some(processor) = self.message_processors.get_mut(processor_id) else {
            log::debug!("no message processor registered for {processor_id}, dropping message");
            return Ok(());
        };
        processor.handle_message(message, self.store.as_mut())
    }

    /// Advances every time-based processor whose `next_fire_ns <= now_ns`,
    /// rescheduling each for `prev + interval` (§4.4).
    pub fn advance_time(&mut self, now_ns: i64) -> Result<()> {
        for scheduled in &mut self.time_based_processors {
            while scheduled.next_fire_ns <= now_ns {
                scheduled.processor.trigger_event(scheduled.next_fire_ns, self.store.as_mut())?;
                scheduled.next_fire_ns += scheduled.processor.interval().as_nanos() as i64;
            }
        }

        while let Some(next_eviction_ns) = self.next_eviction_ns {
            if next_eviction_ns > now_ns {
                break;
            }
            self.oldest_allowed_record_time_ns += self.unit_expiration_ns;
            self.evict_expired_vehicles();
            self.next_eviction_ns = Some(next_eviction_ns + self.unit_removal_interval_ns);
        }

        Ok(())
    }

    /// Evicts every vehicle whose newest buffered record is older than the
    /// current watermark (§4.4, §3 invariant 6).
    fn evict_expired_vehicles(&mut self) {
        let expired: Vec<String> = self
            .buffer
            .vehicle_ids()
            .filter(|id| {
                self.buffer
                    .newest_record_time_ns(id)
                    .is_none_or(|t| t < self.oldest_allowed_record_time_ns)
            })
            .map(str::to_string)
            .collect();

        for vehicle_id in expired {
            self.buffer.evict(&vehicle_id);
        }
    }

    /// Calls every processor's `shutdown`, then logs the statistics summary
    /// line required by §7, then flushes and closes the store.
    pub fn shutdown(&mut self, now_ns: i64) -> Result<()> {
        for scheduled in &mut self.time_based_processors {
            scheduled.processor.shutdown(now_ns, self.store.as_mut())?;
        }

        let stats = self.store.stats();
        log::info!(
            "shutdown summary: {} records, {} traversals, {} thresholds, {} connections",
            stats.record_count,
            stats.traversal_count,
            stats.threshold_count,
            stats.connection_count,
        );

        self.store.shutdown()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::KernelBuilder;
    use crate::road_network::StaticRoadNetworkMap;
    use crate::types::{Position, Record};
    use std::sync::Arc;

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

    fn batch(records: Vec<Record>, is_final: bool) -> RecordBatch {
        let mut batch = RecordBatch::new();
        for r in records {
            batch.push(r);
        }
        batch.is_final = is_final;
        batch
    }

    fn test_kernel() -> Kernel {
        let road_map = Arc::new(
            StaticRoadNetworkMap::new()
                .with_connection("A", vec![Position::new(0.0, 0.0), Position::new(0.0, 100.0 / 111_000.0)], 30.0)
                .with_connection("B", vec![Position::new(0.0, 0.0), Position::new(0.0, 100.0 / 111_000.0)], 30.0)
                .with_connection("C", vec![Position::new(0.0, 0.0), Position::new(0.0, 100.0 / 111_000.0)], 30.0),
        );
        KernelBuilder::new(Config::default(), road_map).build().unwrap()
    }

    #[test]
    fn final_flag_leaves_no_pending_state() {
        let mut kernel = test_kernel();
        kernel
            .handle_update("v3", &batch(vec![record(0, "A", 0.0, 25.0)], true))
            .unwrap();
        assert!(!kernel.contains_vehicle("v3"));
    }

    #[test]
    fn eviction_reclaims_silent_vehicle() {
        let mut kernel = test_kernel();
        kernel
            .handle_update("v2", &batch(vec![record(0, "A", 0.0, 25.0)], false))
            .unwrap();
        assert!(kernel.contains_vehicle("v2"));

        let expiration_ns = Config::default().unit_expiration().as_nanos() as i64;
        let removal_ns = Config::default().unit_removal_interval().as_nanos() as i64;
        kernel.advance_time(expiration_ns + removal_ns + 1).unwrap();

        assert!(!kernel.contains_vehicle("v2"));
    }

    #[test]
    fn two_traversals_first_skipped_second_persisted() {
        let mut kernel = test_kernel();
        kernel
            .handle_update(
                "v1",
                &batch(
                    vec![
                        record(0, "A", 0.0, 25.0),
                        record(1_000_000_000, "A", 25.0, 25.0),
                        record(2_000_000_000, "A", 50.0, 25.0),
                        record(3_000_000_000, "A", 75.0, 25.0),
                        record(4_000_000_000, "A", 100.0, 25.0),
                        record(5_000_000_000, "B", 5.0, 25.0),
                    ],
                    false,
                ),
            )
            .unwrap();
        assert_eq!(kernel.stats().traversal_count, 0);

        kernel
            .handle_update(
                "v1",
                &batch(
                    vec![
                        record(6_000_000_000, "B", 25.0, 25.0),
                        record(7_000_000_000, "B", 50.0, 25.0),
                        record(8_000_000_000, "B", 75.0, 25.0),
                        record(9_000_000_000, "B", 100.0, 25.0),
                        record(10_000_000_000, "C", 0.0, 25.0),
                    ],
                    false,
                ),
            )
            .unwrap();
        assert_eq!(kernel.stats().traversal_count, 1);
    }
}
