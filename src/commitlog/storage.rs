use crate::commitlog::{Log, LogEntry, LogStore, LogStoreError};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const COMMITTED_FILE: &str = "committed.json";
const UNCOMMITTED_FILE: &str = "uncommitted.json";

/// JsonFileStore keeps a node's log in two JSON arrays under a node-specific directory:
///
/// * `committed.json` - committed entries, in offset order
/// * `uncommitted.json` - uncommitted entries, in offset order
///
/// Each file is replaced atomically (temp file + rename). The pair is not: a crash between the two
/// renames can leave an entry in both files or in neither.
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            directory: directory.into(),
        }
    }

    /// Create the store and its directory if needed.
    pub fn create(directory: impl Into<PathBuf>) -> Result<Self, LogStoreError> {
        let store = Self::new(directory);
        fs::create_dir_all(&store.directory)?;
        Ok(store)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn read_entries(&self, file_name: &str) -> Result<Vec<LogEntry>, LogStoreError> {
        let contents = match fs::read(self.directory.join(file_name)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        // `null` is how an empty collection was written by older tooling.
        let entries: Option<Vec<LogEntry>> = serde_json::from_slice(&contents)?;
        Ok(entries.unwrap_or_default())
    }

    fn write_entries(&self, file_name: &str, entries: &[LogEntry]) -> Result<(), LogStoreError> {
        let json = serde_json::to_vec_pretty(entries)?;

        let temp_path = self.directory.join(format!("{}.tmp", file_name));
        let mut file = File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&temp_path, self.directory.join(file_name))?;

        Ok(())
    }
}

impl LogStore for JsonFileStore {
    fn load(&self) -> Result<Log, LogStoreError> {
        let mut entries = self.read_entries(COMMITTED_FILE)?;
        entries.extend(self.read_entries(UNCOMMITTED_FILE)?);

        Ok(Log::from_entries(entries))
    }

    fn save(&self, log: &Log) -> Result<(), LogStoreError> {
        let (committed, uncommitted) = log.partition();

        fs::create_dir_all(&self.directory)?;
        self.write_entries(COMMITTED_FILE, &committed)?;
        self.write_entries(UNCOMMITTED_FILE, &uncommitted)?;

        Ok(())
    }
}
