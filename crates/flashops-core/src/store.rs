//! Durable ledger store.
//!
//! A single JSON document (`operations.json` in the data directory) holds the
//! append-only operation log and the derived protocol, limit, and target
//! state. The store exclusively owns the on-disk file; components mutate an
//! in-memory copy and write it back through [`LedgerStore::save`]. There is
//! one writer at a time in this console, so the save path is a full-file
//! atomic overwrite (temp file + rename) with no locking.
//!
//! Reads are fail-soft: a corrupt document is reported and replaced in memory
//! by a default document, but the corrupt file is left untouched on disk so
//! an operator can inspect or repair it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::Address;
use crate::records::{LimitRecord, OperationRecord, ProtocolRecord, TargetRecord};

/// File name of the persisted document inside the data directory.
const DOCUMENT_FILE: &str = "operations.json";

/// Current document schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Timestamp format used for backup and export file names.
const FILE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Errors from the ledger store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The document could not be serialized.
    #[error("failed to serialize ledger document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Document bookkeeping, written once at first initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Schema version; changes only through migration.
    pub version: String,
    /// When the document was first created.
    pub created: DateTime<Utc>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            created: Utc::now(),
        }
    }
}

/// The persisted root document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerDocument {
    /// Append-only operation log; insertion order is chronological.
    #[serde(default)]
    pub operations: Vec<OperationRecord>,

    /// Current known protocol deployments.
    #[serde(default)]
    pub protocols: Vec<ProtocolRecord>,

    /// Limit history; latest record per protocol wins.
    #[serde(default)]
    pub limits: Vec<LimitRecord>,

    /// Registered operation targets.
    #[serde(default)]
    pub targets: Vec<TargetRecord>,

    /// Bookkeeping, set at first initialization.
    #[serde(default)]
    pub metadata: DocumentMetadata,

    /// Stamped on every save.
    pub last_update: DateTime<Utc>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            operations: Vec::new(),
            protocols: Vec::new(),
            limits: Vec::new(),
            targets: Vec::new(),
            metadata: DocumentMetadata::default(),
            last_update: Utc::now(),
        }
    }
}

impl LedgerDocument {
    /// Finds a protocol by its current deployment address.
    #[must_use]
    pub fn protocol_by_address(&self, address: &Address) -> Option<&ProtocolRecord> {
        self.protocols
            .iter()
            .find(|p| p.current_address == *address)
    }

    /// Mutable lookup by current deployment address.
    pub fn protocol_by_address_mut(&mut self, address: &Address) -> Option<&mut ProtocolRecord> {
        self.protocols
            .iter_mut()
            .find(|p| p.current_address == *address)
    }

    /// Finds a protocol by its stable id.
    #[must_use]
    pub fn protocol_by_id(&self, id: &str) -> Option<&ProtocolRecord> {
        self.protocols.iter().find(|p| p.id == id)
    }

    /// Mutable lookup by stable id.
    pub fn protocol_by_id_mut(&mut self, id: &str) -> Option<&mut ProtocolRecord> {
        self.protocols.iter_mut().find(|p| p.id == id)
    }

    /// Finds an operation by id.
    #[must_use]
    pub fn operation(&self, id: &str) -> Option<&OperationRecord> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// Mutable lookup of an operation by id.
    pub fn operation_mut(&mut self, id: &str) -> Option<&mut OperationRecord> {
        self.operations.iter_mut().find(|op| op.id == id)
    }
}

/// Handle to the on-disk ledger document.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    data_dir: PathBuf,
    path: PathBuf,
}

impl LedgerStore {
    /// Opens a store rooted at `data_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            path: data_dir.clone(),
            source,
        })?;
        let path = data_dir.join(DOCUMENT_FILE);
        Ok(Self { data_dir, path })
    }

    /// The data directory backing this store.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the persisted document.
    #[must_use]
    pub fn document_path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted document.
    ///
    /// An absent file synthesizes, persists, and returns a default document.
    /// A document that fails to parse is reported and replaced in memory by
    /// the default document; the corrupt file is **not** overwritten. A
    /// version mismatch runs the migration step before the document is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error only for hard I/O failures (an unreadable file other
    /// than "not found", or a failed write of the initial document).
    pub fn load(&self) -> Result<LedgerDocument, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no ledger document, initializing");
                let mut doc = LedgerDocument::default();
                self.save(&mut doc)?;
                return Ok(doc);
            },
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            },
        };

        match serde_json::from_str::<LedgerDocument>(&raw) {
            Ok(mut doc) => {
                if doc.metadata.version != SCHEMA_VERSION {
                    self.migrate(&mut doc)?;
                }
                Ok(doc)
            },
            Err(err) => {
                // Fail-soft: keep the corrupt file for inspection, continue
                // with an empty document in memory.
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ledger document is corrupt, continuing with defaults"
                );
                Ok(LedgerDocument::default())
            },
        }
    }

    /// Persists the document with a fresh `lastUpdate` stamp.
    ///
    /// The write is a full-file overwrite through a temp file + rename, so a
    /// crash mid-save never leaves a truncated document behind.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails. Callers decide
    /// whether to retry, alert the operator, or accept best-effort
    /// persistence; the failure is never swallowed here.
    pub fn save(&self, doc: &mut LedgerDocument) -> Result<(), StoreError> {
        doc.last_update = Utc::now();
        let json = serde_json::to_string_pretty(doc)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            operations = doc.operations.len(),
            protocols = doc.protocols.len(),
            "ledger document saved"
        );
        Ok(())
    }

    /// Writes a timestamped backup copy of the current document.
    ///
    /// Backups are sibling files of the document, never overwritten and never
    /// pruned; retention is the operator's concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be loaded or the backup cannot
    /// be written.
    pub fn backup(&self) -> Result<PathBuf, StoreError> {
        let doc = self.load()?;
        let stamp = Utc::now().format(FILE_STAMP_FORMAT);
        let path = self.data_dir.join(format!("backup_{stamp}.json"));
        let json = serde_json::to_string_pretty(&doc)?;
        fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "ledger backup written");
        Ok(path)
    }

    /// Writes a timestamped full-document export.
    ///
    /// # Errors
    ///
    /// Returns an error if the export cannot be written.
    pub fn export(&self, doc: &LedgerDocument) -> Result<PathBuf, StoreError> {
        let json = serde_json::to_value(doc)?;
        self.write_report("export", &json)
    }

    /// Writes an arbitrary timestamped JSON report next to the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be serialized or written.
    pub fn write_report(
        &self,
        prefix: &str,
        value: &serde_json::Value,
    ) -> Result<PathBuf, StoreError> {
        let stamp = Utc::now().format(FILE_STAMP_FORMAT);
        let path = self.data_dir.join(format!("{prefix}_{stamp}.json"));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Upgrades a document written by an older console.
    ///
    /// Collections absent from the old shape have already been defaulted by
    /// deserialization; the migration records the new version and persists
    /// the upgraded document.
    fn migrate(&self, doc: &mut LedgerDocument) -> Result<(), StoreError> {
        info!(
            from = %doc.metadata.version,
            to = SCHEMA_VERSION,
            "migrating ledger document"
        );
        doc.metadata.version = SCHEMA_VERSION.to_string();
        self.save(doc)
    }
}

#[cfg(test)]
mod unit_tests {
    use tempfile::TempDir;

    use super::*;
    use crate::records::{OperationRecord, OperationStatus, OperationType};

    fn store() -> (TempDir, LedgerStore) {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path().join("data")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_load_initializes_missing_document() {
        let (_dir, store) = store();
        let doc = store.load().unwrap();

        assert!(doc.operations.is_empty());
        assert!(doc.protocols.is_empty());
        assert_eq!(doc.metadata.version, SCHEMA_VERSION);
        assert!(store.document_path().exists());
    }

    #[test]
    fn test_save_load_round_trip_is_fixed_point() {
        let (_dir, store) = store();
        let mut doc = store.load().unwrap();
        doc.operations.push(OperationRecord::new(
            OperationType::BalanceCheck,
            OperationStatus::Completed,
        ));
        store.save(&mut doc).unwrap();

        let reloaded = store.load().unwrap();
        // Fixed point modulo the lastUpdate stamp.
        assert_eq!(
            serde_json::to_value(&doc.operations).unwrap(),
            serde_json::to_value(&reloaded.operations).unwrap()
        );
        assert_eq!(doc.metadata.created, reloaded.metadata.created);
    }

    #[test]
    fn test_append_only_no_loss() {
        let (_dir, store) = store();
        let mut doc = store.load().unwrap();
        for _ in 0..5 {
            doc.operations.push(OperationRecord::new(
                OperationType::BalanceCheck,
                OperationStatus::Completed,
            ));
            store.save(&mut doc).unwrap();
        }

        assert_eq!(store.load().unwrap().operations.len(), 5);
    }

    #[test]
    fn test_corrupt_document_is_not_overwritten() {
        let (_dir, store) = store();
        fs::write(store.document_path(), "{not json").unwrap();

        let doc = store.load().unwrap();
        assert!(doc.operations.is_empty());

        // The corrupt bytes must survive the fail-soft read.
        let on_disk = fs::read_to_string(store.document_path()).unwrap();
        assert_eq!(on_disk, "{not json");
    }

    #[test]
    fn test_version_mismatch_triggers_migration() {
        let (_dir, store) = store();
        let mut doc = store.load().unwrap();
        store.save(&mut doc).unwrap();

        // Rewrite the file with an older version and a missing collection.
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.document_path()).unwrap()).unwrap();
        value["metadata"]["version"] = serde_json::Value::String("0.9.0".to_string());
        value.as_object_mut().unwrap().remove("targets");
        fs::write(
            store.document_path(),
            serde_json::to_string_pretty(&value).unwrap(),
        )
        .unwrap();

        let migrated = store.load().unwrap();
        assert_eq!(migrated.metadata.version, SCHEMA_VERSION);
        assert!(migrated.targets.is_empty());

        // Migration persisted the new version.
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.metadata.version, SCHEMA_VERSION);
    }

    #[test]
    fn test_backup_writes_timestamped_copy() {
        let (_dir, store) = store();
        let mut doc = store.load().unwrap();
        doc.operations.push(OperationRecord::new(
            OperationType::BalanceCheck,
            OperationStatus::Completed,
        ));
        store.save(&mut doc).unwrap();

        let path = store.backup().unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("backup_"));

        let copied: LedgerDocument =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(copied.operations.len(), 1);
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let (_dir, store) = store();
        let mut doc = store.load().unwrap();
        store.save(&mut doc).unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.data_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
