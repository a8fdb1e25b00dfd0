//! JSON snapshots of an `InMemoryStorage`.

use super::{InMemoryStorage, RecordStore};
use crate::core::{CuraError, Result, StoredRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, event};

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Entity kind to records, ascending id
    pub tables: BTreeMap<String, Vec<StoredRecord>>,
    #[serde(default)]
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: Option<String>,
    pub row_count: usize,
    pub table_count: usize,
}

fn default_version() -> u32 {
    1
}

impl StoreSnapshot {
    pub fn new(tables: BTreeMap<String, Vec<StoredRecord>>) -> Self {
        let row_count = tables.values().map(Vec::len).sum();
        let table_count = tables.len();

        Self {
            version: 1,
            tables,
            metadata: SnapshotMetadata {
                created_at: Some(Utc::now().to_rfc3339()),
                row_count,
                table_count,
            },
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let snapshot = serde_json::from_reader(BufReader::new(file))?;
        Ok(snapshot)
    }

    /// Writes to a sibling temp file, then renames over the target.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let temp_path = temp_path_for(path);

        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&temp_path, path)?;
        event!(
            Level::DEBUG,
            path = %path.display(),
            rows = self.metadata.row_count,
            "store snapshot written"
        );
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl InMemoryStorage {
    pub async fn snapshot(&self) -> Result<StoreSnapshot> {
        let mut tables = BTreeMap::new();
        for name in self.catalog().list_tables() {
            tables.insert(name.to_string(), self.scan(name).await?);
        }
        Ok(StoreSnapshot::new(tables))
    }

    /// Loads every record, keeping ids. Reference fields are not checked.
    pub async fn load_snapshot(&self, snapshot: StoreSnapshot) -> Result<()> {
        if let Some(unknown) = snapshot
            .tables
            .keys()
            .find(|kind| !self.catalog().table_exists(kind))
        {
            return Err(CuraError::MalformedInput(format!(
                "Snapshot holds unknown entity kind '{}'",
                unknown
            )));
        }
        for (kind, records) in snapshot.tables {
            for record in records {
                self.restore_record(&kind, record).await?;
            }
        }
        Ok(())
    }
}
