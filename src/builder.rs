//! Explicit processor registry and kernel assembly (§9 REDESIGN FLAG:
//! replaces "global package-scan discovery of processor types" with an
//! explicit registry built up at startup).

use crate::config::{Config, StoreBackend};
use crate::error::{Result, TseError};
use crate::kernel::Kernel;
use crate::processor::{MessageProcessor, TimeBasedProcessor, TraversalProcessor};
use crate::road_network::RoadNetworkMap;
use crate::spatio_temporal::SpatioTemporalProcessor;
use crate::store::{MemoryStore, MetricStore};
#[cfg(feature = "persistence")]
use crate::store::FileStore;
use crate::threshold::ThresholdProcessor;
use std::collections::HashSet;
use std::sync::Arc;

/// Builds a [`Kernel`] from a [`Config`], a road-network map, and explicit
/// processor registries, auto-inserting the required built-in processors
/// when the caller didn't register one under their identifier (§6).
pub struct KernelBuilder {
    config: Config,
    road_map: Arc<dyn RoadNetworkMap>,
    traversal_processors: Vec<Box<dyn TraversalProcessor>>,
    time_based_processors: Vec<Box<dyn TimeBasedProcessor>>,
    message_processors: Vec<Box<dyn MessageProcessor>>,
}

impl KernelBuilder {
    pub fn new(config: Config, road_map: Arc<dyn RoadNetworkMap>) -> Self {
        Self {
            config,
            road_map,
            traversal_processors: Vec::new(),
            time_based_processors: Vec::new(),
            message_processors: Vec::new(),
        }
    }

    pub fn with_traversal_processor(mut self, processor: Box<dyn TraversalProcessor>) -> Self {
        self.traversal_processors.push(processor);
        self
    }

    pub fn with_time_based_processor(mut self, processor: Box<dyn TimeBasedProcessor>) -> Self {
        self.time_based_processors.push(processor);
        self
    }

    pub fn with_message_processor(mut self, processor: Box<dyn MessageProcessor>) -> Self {
        self.message_processors.push(processor);
        self
    }

    fn reject_duplicate_ids<T>(items: &[T], id_of: impl Fn(&T) -> &str) -> Result<()> {
        let mut seen = HashSet::new();
        for item in items {
            if !seen.insert(id_of(item)) {
                return Err(TseError::Configuration(format!(
                    "duplicate processor identifier: {}",
                    id_of(item)
                )));
            }
        }
        Ok(())
    }

    /// Assembles the kernel, auto-inserting a [`SpatioTemporalProcessor`] and
    /// a [`ThresholdProcessor`] if the caller registered neither (§6).
    pub fn build(mut self) -> Result<Kernel> {
        self.config
            .validate()
            .map_err(TseError::Configuration)?;

        if !self
            .traversal_processors
            .iter()
            .any(|p| p.id() == "spatio_temporal")
        {
            self.traversal_processors.push(Box::new(SpatioTemporalProcessor::new(
                self.road_map.clone(),
                self.config.spatial_mean_speed_chunk_m,
            )));
        }

        if !self.time_based_processors.iter().any(|p| p.id() == "threshold") {
            self.time_based_processors.push(Box::new(ThresholdProcessor::new(
                self.config.trigger_interval(),
                self.config.min_traversals_for_threshold,
                self.config.min_heuristic,
                self.config.max_heuristic,
                self.config.default_red_light(),
                self.config.recompute_all_rtsm_with_new_thresholds,
            )));
        }

        Self::reject_duplicate_ids(&self.traversal_processors, |p| p.id())?;
        Self::reject_duplicate_ids(&self.time_based_processors, |p| p.id())?;
        Self::reject_duplicate_ids(&self.message_processors, |p| p.id())?;

        let mut store = self.build_store()?;
        store.initialize(self.road_map.as_ref(), self.config.is_persistent)?;

        Ok(Kernel::new(
            &self.config,
            store,
            self.traversal_processors,
            self.time_based_processors,
            self.message_processors,
        ))
    }

    #[cfg(feature = "persistence")]
    fn build_store(&self) -> Result<Box<dyn MetricStore>> {
        match self.config.fcd_data_storage {
            StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
            StoreBackend::File => {
                let path = self.config.database_path.as_ref().ok_or_else(|| {
                    TseError::Configuration("database_path is required for the file backend".into())
                })?;
                Ok(Box::new(FileStore::open(path)?))
            }
        }
    }

    #[cfg(not(feature = "persistence"))]
    fn build_store(&self) -> Result<Box<dyn MetricStore>> {
        match self.config.fcd_data_storage {
            StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
            StoreBackend::File => Err(TseError::Configuration(
                "file backend requires the `persistence` feature".into(),
            )),
        }
    }
}
