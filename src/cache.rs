use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One discovered column of a Log Analytics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    /// Unique per table; reflects discovery order.
    pub ordinal: usize,
}

/// Discovered schema of a Log Analytics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
    /// RFC 3339 timestamp of the discovery call that produced this entry.
    pub discovered_at: String,
    /// True when the entry was served from cache rather than freshly discovered.
    pub cached: bool,
}

/// One inferred property of a Graph-style API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub property_type: String,
    /// Present and non-null in every fetched sample.
    pub required: bool,
}

/// Inferred schema of a Graph-style API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSchema {
    pub endpoint: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub discovered_at: String,
}

/// A cached discovery result: either a table schema or an API schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaEntry {
    Table(TableSchema),
    Api(ApiSchema),
}

/// Cache key for a table schema: `table:<name>`.
pub fn table_key(table_name: &str) -> String {
    format!("table:{table_name}")
}

/// Cache key for an API schema: `api:<endpoint>`.
pub fn api_key(endpoint: &str) -> String {
    format!("api:{endpoint}")
}

/// Two-tier schema cache: an in-memory map backed by one JSON file per key.
///
/// The in-memory map is authoritative for this process; the disk copy exists
/// so a fresh process starts warm.  Entries have no TTL and are never evicted
/// — the key space is small and operator-driven, and staleness is handled
/// only by explicit invalidation (the `refresh_schema` tool).  There is no
/// cross-process invalidation signal; concurrent processes may briefly hold
/// stale views of each other's writes, which this workload tolerates.
pub struct SchemaCache {
    dir: PathBuf,
    entries: Mutex<HashMap<String, SchemaEntry>>,
}

impl SchemaCache {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an entry, falling back to disk.  A missing or corrupt disk
    /// file is a miss, never an error.
    pub fn get(&self, key: &str) -> Option<SchemaEntry> {
        if let Some(entry) = self.entries.lock().unwrap().get(key) {
            return Some(entry.clone());
        }

        let entry = self.load_from_disk(key)?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), entry.clone());
        Some(entry)
    }

    /// Store an entry in memory, then best-effort on disk.  Disk write
    /// failures are logged and swallowed; the in-memory copy stays
    /// authoritative for the rest of the process lifetime.
    pub fn put(&self, key: &str, entry: SchemaEntry) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), entry.clone());
        self.save_to_disk(key, &entry);
    }

    /// Remove an entry from memory and disk.  Absence of either is not an error.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
        let path = self.file_path(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete cached schema file");
            }
        }
    }

    /// Filename for a key: `:` and `/` are substituted to stay
    /// filesystem-safe while remaining recognisable for debugging.
    fn file_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c == ':' || c == '/' { '_' } else { c })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn load_from_disk(&self, key: &str) -> Option<SchemaEntry> {
        let path = self.file_path(key);
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Treating corrupt schema cache file as a miss");
                None
            }
        }
    }

    fn save_to_disk(&self, key: &str, entry: &SchemaEntry) {
        let path = self.file_path(key);
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(&self.dir)?;
            let json = serde_json::to_string_pretty(entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(&path, json)
        };
        if let Err(e) = write() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist schema cache entry");
        }
    }
}
