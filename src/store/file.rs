//! Append-only-log-backed metric store (§10.7 Open Question: `StoreBackend::File`).
//!
//! Every mutating operation is framed as a length-prefixed `bincode` record
//! appended to the log file, mirroring the teacher's AOF discipline
//! (`persistence::AOFFile`) without its background-rewrite machinery, which
//! this crate's simulated, single-threaded event model has no use for. On
//! open, the log is replayed in full into an in-memory [`MemoryStore`].

use super::{MemoryStore, MetricStore};
use crate::error::{Result, TseError};
use crate::road_network::RoadNetworkMap;
use crate::types::{ConnectionMeta, IntervalAverage, Record, StoreStats, Thresholds, TraversalMetricRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum LogEntry {
    InsertRecords {
        vehicle_id: String,
        records: Vec<Record>,
    },
    InsertTraversalMetric {
        row: TraversalMetricRow,
    },
    UpdateTraversalMetrics {
        rows: Vec<TraversalMetricRow>,
    },
    InsertThresholds {
        thresholds: HashMap<String, Thresholds>,
    },
}

/// Metric store that durably logs every mutation to disk, replaying it into
/// an in-memory store on open and appending new entries as they arrive.
pub struct FileStore {
    memory: MemoryStore,
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileStore {
    /// Opens (creating if absent) the log at `path` and replays it into a
    /// fresh in-memory store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut memory = MemoryStore::new();

        if path.exists() {
            let mut reader = BufReader::new(File::open(&path)?);
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            let mut offset = 0usize;
            while offset < buf.len() {
                if offset + 4 > buf.len() {
                    break;
                }
                let len = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
                offset += 4;
                if offset + len > buf.len() {
                    break;
                }
                let entry: LogEntry = bincode::deserialize(&buf[offset..offset + len])
                    .map_err(|e| TseError::Serialization(e.to_string()))?;
                offset += len;
                apply_entry(&mut memory, entry)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            memory,
            writer: BufWriter::new(file),
            path,
        })
    }

    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let encoded =
            bincode::serialize(entry).map_err(|e| TseError::Serialization(e.to_string()))?;
        self.writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
        self.writer.write_all(&encoded)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn apply_entry(memory: &mut MemoryStore, entry: LogEntry) -> Result<()> {
    match entry {
        LogEntry::InsertRecords { vehicle_id, records } => {
            memory.insert_records(&vehicle_id, &records)
        }
        LogEntry::InsertTraversalMetric { row } => memory.insert_traversal_metric(row).map(|_| ()),
        LogEntry::UpdateTraversalMetrics { rows } => memory.update_traversal_metrics(&rows),
        LogEntry::InsertThresholds { thresholds } => memory.insert_thresholds(&thresholds),
    }
}

impl MetricStore for FileStore {
    fn initialize(&mut self, road_map: &dyn RoadNetworkMap, persistent: bool) -> Result<()> {
        self.memory.initialize(road_map, persistent)
    }

    fn insert_records(&mut self, vehicle_id: &str, records: &[Record]) -> Result<()> {
        self.append(&LogEntry::InsertRecords {
            vehicle_id: vehicle_id.to_string(),
            records: records.to_vec(),
        })?;
        self.memory.insert_records(vehicle_id, records)
    }

    fn insert_traversal_metric(&mut self, row: TraversalMetricRow) -> Result<u64> {
        self.append(&LogEntry::InsertTraversalMetric { row: row.clone() })?;
        self.memory.insert_traversal_metric(row)
    }

    fn update_traversal_metrics(&mut self, rows: &[TraversalMetricRow]) -> Result<()> {
        self.append(&LogEntry::UpdateTraversalMetrics {
            rows: rows.to_vec(),
        })?;
        self.memory.update_traversal_metrics(rows)
    }

    fn insert_thresholds(&mut self, thresholds: &HashMap<String, Thresholds>) -> Result<()> {
        self.append(&LogEntry::InsertThresholds {
            thresholds: thresholds.clone(),
        })?;
        self.memory.insert_thresholds(thresholds)
    }

    fn get_thresholds(&self, connection_id: &str) -> Option<Thresholds> {
        self.memory.get_thresholds(connection_id)
    }

    fn got_threshold_for(&self, connection_id: &str) -> bool {
        self.memory.got_threshold_for(connection_id)
    }

    fn get_traversal_times(&self) -> HashMap<String, Vec<f64>> {
        self.memory.get_traversal_times()
    }

    fn get_mean_speeds(&self) -> HashMap<String, Vec<(f64, f64)>> {
        self.memory.get_mean_speeds()
    }

    fn get_traversal_metrics(&self) -> Vec<TraversalMetricRow> {
        self.memory.get_traversal_metrics()
    }

    fn get_averages_for_interval(&self, t0_ns: i64, delta_ns: i64) -> Vec<IntervalAverage> {
        self.memory.get_averages_for_interval(t0_ns, delta_ns)
    }

    fn get_closest_traversal_data(
        &self,
        connection_id: &str,
        t_ns: i64,
    ) -> Option<TraversalMetricRow> {
        self.memory.get_closest_traversal_data(connection_id, t_ns)
    }

    fn get_connection_meta(&self, connection_id: &str) -> Option<ConnectionMeta> {
        self.memory.get_connection_meta(connection_id)
    }

    fn stats(&self) -> StoreStats {
        self.memory.stats()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.memory.shutdown()
    }
}
