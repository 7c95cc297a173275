//! Detector persistence: save and load calibrated detectors across restarts.
//!
//! Provides the [`StatePersistence`] trait, a [`JsonFileStore`] that writes
//! all detectors into one checksummed JSON document, and an in-memory store
//! for tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SpotError, SpotResult};
use crate::monitor::MetricId;
use crate::state::DetectorState;

/// Version of the on-disk document.
pub const FORMAT_VERSION: u32 = 1;

/// Storage for calibrated detectors.
pub trait StatePersistence {
    /// Replace the stored detectors with `states`.
    fn save(&self, states: &HashMap<MetricId, DetectorState>) -> SpotResult<()>;

    /// Load the stored detectors; empty when nothing was saved yet.
    fn load(&self) -> SpotResult<HashMap<MetricId, DetectorState>>;

    /// Store one detector, keeping the others.
    ///
    /// Default implementation: load all, merge, save all.
    fn save_incremental(&self, metric: &MetricId, state: &DetectorState) -> SpotResult<()> {
        let mut all = self.load()?;
        all.insert(metric.clone(), state.clone());
        self.save(&all)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredDetectors {
    version: u32,
    saved_at: DateTime<Utc>,
    /// blake3 over the compact JSON of `detectors`.
    checksum: String,
    detectors: BTreeMap<MetricId, DetectorState>,
}

fn checksum(detectors: &BTreeMap<MetricId, DetectorState>) -> SpotResult<String> {
    let bytes = serde_json::to_vec(detectors)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// JSON-file detector persistence.
///
/// Writes are atomic (write to `.tmp`, then rename). Loading verifies the
/// format version, the checksum, and every detector's structure.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatePersistence for JsonFileStore {
    fn save(&self, states: &HashMap<MetricId, DetectorState>) -> SpotResult<()> {
        let detectors: BTreeMap<MetricId, DetectorState> = states
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let doc = StoredDetectors {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            checksum: checksum(&detectors)?,
            detectors,
        };
        let json = serde_json::to_string_pretty(&doc)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), count = doc.detectors.len(), "detectors saved");
        Ok(())
    }

    fn load(&self) -> SpotResult<HashMap<MetricId, DetectorState>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let doc: StoredDetectors = serde_json::from_str(&contents)
            .map_err(|e| SpotError::CorruptState(format!("unreadable state file: {}", e)))?;

        if doc.version != FORMAT_VERSION {
            return Err(SpotError::CorruptState(format!(
                "unsupported state file version {} (expected {})",
                doc.version, FORMAT_VERSION
            )));
        }
        let actual = checksum(&doc.detectors)?;
        if actual != doc.checksum {
            return Err(SpotError::CorruptState(format!(
                "checksum mismatch: stored {}, computed {}",
                doc.checksum, actual
            )));
        }
        for (id, state) in &doc.detectors {
            state
                .validate()
                .map_err(|e| SpotError::CorruptState(format!("{}: {}", id, e)))?;
        }

        debug!(
            path = %self.path.display(),
            count = doc.detectors.len(),
            saved_at = %doc.saved_at,
            "detectors loaded"
        );
        Ok(doc.detectors.into_iter().collect())
    }
}

/// In-memory detector persistence (for testing).
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<MetricId, DetectorState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatePersistence for InMemoryStore {
    fn save(&self, states: &HashMap<MetricId, DetectorState>) -> SpotResult<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| SpotError::Persistence("state store lock poisoned".into()))?;
        *data = states.clone();
        Ok(())
    }

    fn load(&self) -> SpotResult<HashMap<MetricId, DetectorState>> {
        let data = self
            .data
            .lock()
            .map_err(|_| SpotError::Persistence("state store lock poisoned".into()))?;
        Ok(data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::Calibrator;
    use crate::config::SpotConfig;

    fn make_state(scale: f64) -> DetectorState {
        let batch: Vec<f64> = (1..=100).map(|i| scale * i as f64).collect();
        Calibrator::new(SpotConfig::bispot(1e-4)).fit(&batch).unwrap()
    }

    fn temp_path(name: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("spot_store_{}", uuid::Uuid::new_v4()));
        let path = dir.join(name);
        (dir, path)
    }

    #[test]
    fn json_save_and_load_roundtrip() {
        let (dir, path) = temp_path("detectors.json");
        let store = JsonFileStore::new(&path);

        let mut states = HashMap::new();
        states.insert(MetricId::new("api", "latency"), make_state(1.0));
        states.insert(MetricId::new("api", "errors"), make_state(2.0));
        store.save(&states).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, states);
        assert!(!path.with_extension("tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_load_nonexistent_returns_empty() {
        let (_dir, path) = temp_path("missing.json");
        let loaded = JsonFileStore::new(path).load().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn json_save_incremental_merges() {
        let (dir, path) = temp_path("detectors.json");
        let store = JsonFileStore::new(&path);

        let mut states = HashMap::new();
        states.insert(MetricId::from("a"), make_state(1.0));
        store.save(&states).unwrap();
        store.save_incremental(&MetricId::from("b"), &make_state(2.0)).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&MetricId::from("b")], make_state(2.0));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn tampered_file_fails_checksum() {
        let (dir, path) = temp_path("detectors.json");
        let store = JsonFileStore::new(&path);
        let mut states = HashMap::new();
        states.insert(MetricId::from("a"), make_state(1.0));
        store.save(&states).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let tampered = text.replacen("\"observation_count\": 100", "\"observation_count\": 101", 1);
        assert_ne!(text, tampered);
        std::fs::write(&path, tampered).unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, SpotError::CorruptState(ref m) if m.contains("checksum")));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let (dir, path) = temp_path("detectors.json");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "not json").unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SpotError::CorruptState(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn in_memory_persistence() {
        let store = InMemoryStore::new();
        let mut states = HashMap::new();
        states.insert(MetricId::from("x"), make_state(3.0));
        store.save(&states).unwrap();
        assert_eq!(store.load().unwrap(), states);
    }

    #[test]
    fn persistence_trait_object() {
        let store: Box<dyn StatePersistence> = Box::new(InMemoryStore::new());
        store.save(&HashMap::new()).unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
