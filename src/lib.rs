//! Floating Car Data traversal extraction and Relative Traffic Status Metric
//! computation.
//!
//! ```rust
//! use std::sync::Arc;
//! use tse_core::prelude::*;
//!
//! let road_map = Arc::new(StaticRoadNetworkMap::new().with_connection(
//!     "A",
//!     vec![Position::new(0.0, 0.0), Position::new(0.0, 0.001)],
//!     30.0,
//! ));
//! let kernel = KernelBuilder::new(Config::default(), road_map).build()?;
//! assert_eq!(kernel.active_vehicle_count(), 0);
//! # Ok::<(), tse_core::TseError>(())
//! ```

pub mod buffer;
pub mod builder;
pub mod config;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod processor;
pub mod road_network;
pub mod spatio_temporal;
pub mod store;
pub mod threshold;
pub mod types;

pub use builder::KernelBuilder;
pub use config::{Config, StoreBackend};
pub use error::{Result, TseError};
pub use kernel::Kernel;
pub use processor::{MessageProcessor, TimeBasedProcessor, TraversalProcessor};
pub use road_network::{ConnectionGeometry, RoadNetworkMap, StaticRoadNetworkMap};
pub use spatio_temporal::SpatioTemporalProcessor;
pub use store::{MemoryStore, MetricStore};

#[cfg(feature = "persistence")]
pub use store::FileStore;

pub use threshold::ThresholdProcessor;
pub use types::{
    ConnectionMeta, IntervalAverage, Position, Record, RecordBatch, StoreStats, Thresholds,
    Traversal, TraversalMetricRow, RTSM_UNKNOWN,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports.
pub mod prelude {
    pub use crate::{Config, KernelBuilder, Result, StoreBackend, TseError};

    pub use crate::{Kernel, MetricStore};

    pub use crate::{RoadNetworkMap, StaticRoadNetworkMap};

    pub use crate::{MessageProcessor, TimeBasedProcessor, TraversalProcessor};

    pub use crate::{Position, Record, RecordBatch, Traversal, TraversalMetricRow};

    #[cfg(feature = "persistence")]
    pub use crate::FileStore;

    pub use std::time::Duration;
}
