//! Persistence boundary for subject data.
//!
//! The trait is the sole boundary; wire format is an implementation
//! concern. Two implementations ship: an in-memory store for tests and
//! embedding, and a one-JSON-file-per-subject store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::data::{Segment, SubjectData};
use crate::error::{PermError, Result};
use crate::types::{ContextSet, SubjectRef};

/// Loads and saves subject snapshots by reference.
///
/// `load` returning `Ok(None)` means the subject has no stored data yet (a
/// fresh subject); `Err` at load time is a loading fault and surfaces as a
/// hard failure from the registry. `save` is invoked from the registry's
/// background save worker; failures there are logged, never propagated.
pub trait SubjectDataStore: Send + Sync {
    fn load(&self, reference: &SubjectRef) -> Result<Option<SubjectData>>;
    fn save(&self, reference: &SubjectRef, data: &SubjectData) -> Result<()>;
}

/// In-memory store backed by a concurrent map.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<SubjectRef, SubjectData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl SubjectDataStore for MemoryStore {
    fn load(&self, reference: &SubjectRef) -> Result<Option<SubjectData>> {
        Ok(self.records.get(reference).map(|r| r.value().clone()))
    }

    fn save(&self, reference: &SubjectRef, data: &SubjectData) -> Result<()> {
        self.records.insert(reference.clone(), data.clone());
        Ok(())
    }
}

/// Serialized form of one subject: segments as a list because context sets
/// cannot be JSON object keys.
#[derive(Serialize, Deserialize)]
struct SubjectRecord {
    segments: Vec<SegmentRecord>,
}

#[derive(Serialize, Deserialize)]
struct SegmentRecord {
    contexts: ContextSet,
    #[serde(flatten)]
    segment: Segment,
}

impl SubjectRecord {
    fn from_data(data: &SubjectData) -> Self {
        let mut segments: Vec<SegmentRecord> = data
            .segments()
            .iter()
            .map(|(contexts, segment)| SegmentRecord {
                contexts: contexts.clone(),
                segment: (**segment).clone(),
            })
            .collect();
        // Deterministic file contents across saves.
        segments.sort_by(|a, b| a.contexts.cmp(&b.contexts));
        SubjectRecord { segments }
    }

    fn into_data(self) -> SubjectData {
        let segments: AHashMap<ContextSet, Arc<Segment>> = self
            .segments
            .into_iter()
            .map(|record| (record.contexts, Arc::new(record.segment)))
            .collect();
        SubjectData::from_segments(segments)
    }
}

/// One JSON file per subject under `{root}/{type}/{identifier}.json`.
///
/// A missing file is NotFound; a file that fails to parse is a loading
/// fault (permission checks are security-sensitive, so corrupt data is
/// never silently treated as empty).
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(JsonFileStore {
            root: root.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, reference: &SubjectRef) -> PathBuf {
        self.root
            .join(sanitize(&reference.subject_type))
            .join(format!("{}.json", sanitize(&reference.identifier)))
    }
}

/// Keep filenames portable: anything outside [A-Za-z0-9._-] becomes '_'.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl SubjectDataStore for JsonFileStore {
    fn load(&self, reference: &SubjectRef) -> Result<Option<SubjectData>> {
        let path = self.path_for(reference);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: SubjectRecord = serde_json::from_slice(&bytes)?;
        Ok(Some(record.into_data()))
    }

    fn save(&self, reference: &SubjectRef, data: &SubjectData) -> Result<()> {
        let path = self.path_for(reference);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = SubjectRecord::from_data(data);
        let json = serde_json::to_vec_pretty(&record)?;
        // Write-then-rename so a crashed save never leaves a torn file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)
            .map_err(|e| PermError::Storage(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn sample_data() -> SubjectData {
        let world = ContextSet::single("world", "nether");
        SubjectData::default()
            .set_permission(&ContextSet::global(), "example.perm", 1)
            .set_permission(&world, "fly", -1)
            .add_parent(&world, "group", "admin")
            .set_option(&ContextSet::global(), "prefix", "[a]")
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        let reference = SubjectRef::new("group", "admin");
        assert!(store.load(&reference).unwrap().is_none());

        let data = sample_data();
        store.save(&reference, &data).unwrap();
        let loaded = store.load(&reference).unwrap().unwrap();
        assert_eq!(loaded.permission(&ContextSet::global(), "example.perm"), 1);
    }

    #[test]
    fn json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let reference = SubjectRef::new("user", "alice");
        let world = ContextSet::single("world", "nether");

        store.save(&reference, &sample_data()).unwrap();
        let loaded = store.load(&reference).unwrap().unwrap();
        assert_eq!(loaded.permission(&world, "fly"), -1);
        assert_eq!(
            loaded.parents(&world),
            vec![SubjectRef::new("group", "admin")]
        );
        assert_eq!(
            loaded.option(&ContextSet::global(), "prefix").as_deref(),
            Some("[a]")
        );
    }

    #[test]
    fn json_store_missing_subject_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let loaded = store.load(&SubjectRef::new("user", "ghost")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn json_store_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let reference = SubjectRef::new("user", "broken");

        fs::create_dir_all(dir.path().join("user")).unwrap();
        fs::write(dir.path().join("user/broken.json"), b"{not json").unwrap();
        assert!(store.load(&reference).is_err());
    }

    #[test]
    fn identifiers_are_sanitized_for_paths() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let reference = SubjectRef::new("user", "../escape/attempt");

        store.save(&reference, &sample_data()).unwrap();
        assert!(store.load(&reference).unwrap().is_some());
        // Nothing was written outside the store root.
        assert!(dir.path().join("user").join(".._escape_attempt.json").exists());
    }
}
