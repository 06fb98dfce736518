//! In-memory history store with JSON snapshot persistence.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::models::*;

/// History persistence errors.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize history for {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Thread-safe store of per-key measurement windows.
///
/// Clones share the same underlying state. A single lock guards every key;
/// each operation holds it only for the duration of one read or update.
#[derive(Clone)]
pub struct HistoryStore {
    services: Arc<Mutex<HashMap<String, VecDeque<Measurement>>>>,
    window: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// Create an empty store keeping the last [`WINDOW_SIZE`] measurements per key.
    pub fn new() -> Self {
        Self::with_window(WINDOW_SIZE)
    }

    /// Create an empty store with a custom window size (at least 1).
    pub fn with_window(window: usize) -> Self {
        Self {
            services: Arc::new(Mutex::new(HashMap::new())),
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    // --- Persistence ---

    /// Hydrate the store from a snapshot file.
    ///
    /// A missing file leaves the store untouched and is not an error. Each key
    /// in the file replaces the in-memory sequence for that key, truncated to
    /// the window. Returns the number of keys loaded.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<usize, HistoryError> {
        let path = path.as_ref();
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let snapshot: Snapshot =
            serde_json::from_slice(&data).map_err(|source| HistoryError::Malformed {
                path: path.display().to_string(),
                source,
            })?;

        let loaded = snapshot.len();
        let mut services = self.services.lock();
        for (key, points) in snapshot {
            let skip = points.len().saturating_sub(self.window);
            services.insert(key, points.into_iter().skip(skip).collect());
        }

        Ok(loaded)
    }

    /// Write the full store to a snapshot file, keys in sorted order.
    ///
    /// The snapshot is written to a temporary file next to `path` and renamed
    /// over it, so an interrupted save leaves the previous snapshot intact.
    /// Callers flush at cycle boundaries, when no probe is updating the store.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), HistoryError> {
        let path = path.as_ref();
        let io_err = |source: std::io::Error| HistoryError::Io {
            path: path.display().to_string(),
            source,
        };

        let data = serde_json::to_vec_pretty(&self.snapshot()).map_err(|source| {
            HistoryError::Serialize {
                path: path.display().to_string(),
                source,
            }
        })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&data).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        Ok(())
    }

    // --- Measurements ---

    /// Append a measurement for `key`, evicting the oldest beyond the window.
    pub fn add(&self, key: &str, timestamp: DateTime<Utc>, response_time: Duration) {
        let mut services = self.services.lock();
        let points = services
            .entry(key.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.window + 1));

        points.push_back(Measurement::new(timestamp, response_time));
        while points.len() > self.window {
            points.pop_front();
        }
    }

    /// Mean response time over the current window and the window's sample count.
    ///
    /// Returns `(Duration::ZERO, 0)` for an unknown key.
    pub fn baseline(&self, key: &str) -> (Duration, usize) {
        let services = self.services.lock();
        let points = match services.get(key) {
            Some(p) if !p.is_empty() => p,
            _ => return (Duration::ZERO, 0),
        };

        let total: u128 = points.iter().map(|p| p.response_time.as_nanos()).sum();
        let count = points.len();
        let mean = total / count as u128;
        (Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)), count)
    }

    /// Copy of the measurements stored for `key`, oldest first.
    pub fn history(&self, key: &str) -> Option<Vec<Measurement>> {
        self.services
            .lock()
            .get(key)
            .map(|points| points.iter().copied().collect())
    }

    /// Copy of every key's measurements.
    pub fn snapshot(&self) -> Snapshot {
        self.services
            .lock()
            .iter()
            .map(|(key, points)| (key.clone(), points.iter().copied().collect()))
            .collect()
    }

    /// Number of keys with history.
    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
