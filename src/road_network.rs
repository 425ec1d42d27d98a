//! Read-only road-network map interface (§6): lookup from connection id to
//! its ordered node positions, length, and max speed. The implementation is
//! an external collaborator (§1 OUT OF SCOPE); this module defines the
//! contract plus a simple in-memory implementation for tests and examples.

use crate::geometry::sum_of_node_distances;
use crate::types::{ConnectionMeta, Position};
use std::collections::HashMap;

/// One connection's geometry and posted speed limit, as returned by
/// [`RoadNetworkMap::get_connection`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionGeometry {
    /// Node positions in traversal order; inter-node distances sum to the
    /// connection's usable length (§6).
    pub nodes: Vec<Position>,
    pub max_speed_m_s: f64,
}

impl ConnectionGeometry {
    /// Length computed by summing inter-node distances, per §3: "not the
    /// stored length, which is often inaccurate".
    pub fn length_m(&self) -> f64 {
        sum_of_node_distances(&self.nodes)
    }
}

/// Read-only map from connection id to geometry, provided externally by the
/// scenario's road-network data (§1, §6).
pub trait RoadNetworkMap: Send + Sync {
    fn get_connection(&self, connection_id: &str) -> Option<ConnectionGeometry>;

    /// All connection ids known to the map, needed only by
    /// `MetricStore::initialize` to populate connection metadata (§10.6).
    fn connection_ids(&self) -> Box<dyn Iterator<Item = String> + '_>;

    /// Convenience: `connection_ids().map(get_connection)` merged into
    /// [`ConnectionMeta`] rows, used by `initialize`'s upsert.
    fn connection_metadata(&self) -> Vec<ConnectionMeta> {
        self.connection_ids()
            .filter_map(|id| {
                let geometry = self.get_connection(&id)?;
                Some(ConnectionMeta {
                    length_m: geometry.length_m(),
                    max_speed_m_s: geometry.max_speed_m_s,
                    connection_id: id,
                })
            })
            .collect()
    }
}

/// A road network held entirely in memory, as it would be loaded once from
/// scenario data at startup and never mutated afterward.
#[derive(Debug, Clone, Default)]
pub struct StaticRoadNetworkMap {
    connections: HashMap<String, ConnectionGeometry>,
}

impl StaticRoadNetworkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(
        mut self,
        connection_id: impl Into<String>,
        nodes: Vec<Position>,
        max_speed_m_s: f64,
    ) -> Self {
        self.connections.insert(
            connection_id.into(),
            ConnectionGeometry {
                nodes,
                max_speed_m_s,
            },
        );
        self
    }
}

impl RoadNetworkMap for StaticRoadNetworkMap {
    fn get_connection(&self, connection_id: &str) -> Option<ConnectionGeometry> {
        self.connections.get(connection_id).cloned()
    }

    fn connection_ids(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.connections.keys().cloned())
    }
}
