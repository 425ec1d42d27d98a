//! Processor capability traits (§9 "Polymorphic processors").
//!
//! Three distinct tagged capability sets — completed-traversal handling,
//! timed-tick-plus-bookkeeping handling, and message handling — are modeled
//! as three separate traits rather than one heterogeneous trait object list,
//! so the kernel dispatches to three typed `Vec<Box<dyn _>>` registries with
//! no runtime type interrogation.

use crate::error::Result;
use crate::store::MetricStore;
use crate::types::{RecordBatch, Traversal};

/// A processor invoked once per completed [`Traversal`] (§4.2, §6
/// `traversal_based_processors`).
pub trait TraversalProcessor: Send {
    /// Short, stable identifier used for "at most one instance per
    /// identifier" registration (§4.4).
    fn id(&self) -> &str;

    fn handle_traversal(
        &mut self,
        vehicle_id: &str,
        traversal: &Traversal,
        store: &mut dyn MetricStore,
    ) -> Result<()>;
}

/// A processor invoked on every incoming update for bookkeeping, and on its
/// own scheduled interval (§4.4, §6 `time_based_processors`).
pub trait TimeBasedProcessor: Send {
    fn id(&self) -> &str;

    /// Interval between successive `trigger_event` calls. `I <= 0` means the
    /// processor is never scheduled (§4.4).
    fn interval(&self) -> std::time::Duration;

    /// Called for every update, independent of the tick schedule, so the
    /// processor can maintain bookkeeping state.
    fn handle_update(&mut self, _vehicle_id: &str, _batch: &RecordBatch) {}

    /// Called when `interval()` elapses.
    fn trigger_event(&mut self, now_ns: i64, store: &mut dyn MetricStore) -> Result<()>;

    /// Called once at kernel shutdown (§4.4).
    fn shutdown(&mut self, _now_ns: i64, _store: &mut dyn MetricStore) -> Result<()> {
        Ok(())
    }
}

/// An optional custom message handler (§6 `message_based_processors`).
pub trait MessageProcessor: Send {
    fn id(&self) -> &str;

    fn handle_message(&mut self, message: &[u8], store: &mut dyn MetricStore) -> Result<()>;
}
