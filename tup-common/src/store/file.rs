//! File-backed store: one JSON document guarded by an advisory lock file.
//!
//! Every open of the store takes an exclusive `flock`-style lock on
//! `<state>.lock`, so only one holder (thread or process) works on the
//! document at a time. The lock file itself stays on disk between runs.

use crate::errors::StoreError;
use crate::inventory::TenantInventory;
use crate::repository::{RunStateStore, StateTransaction, TenantCatalog};
use crate::types::{EnvType, Namespace, RunState, Tenant, TenantRecord, TypeVersions};
use serde::{Deserialize, Serialize};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// How long to wait between lock acquisition attempts.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// On-disk layout of the state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub run_state: RunState,
    #[serde(default)]
    pub tenants: TenantInventory,
}

/// JSON state file with an exclusive lock file next to it.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document under the lock.
    pub fn read_document(&self) -> Result<StateDocument, StoreError> {
        let _lock = self.acquire()?;
        self.load_document()
    }

    /// Insert or replace a tenant record.
    pub fn upsert_tenant(&self, record: TenantRecord) -> Result<(), StoreError> {
        self.update_document(|doc| {
            doc.tenants.upsert(record);
            Ok(())
        })
    }

    fn acquire(&self) -> Result<LockFile, StoreError> {
        LockFile::acquire(&self.lock_path, self.lock_timeout)
    }

    fn with_inventory<T>(
        &self,
        read: impl FnOnce(&TenantInventory) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let doc = self.read_document()?;
        read(&doc.tenants)
    }

    fn update_document(
        &self,
        change: impl FnOnce(&mut StateDocument) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let _lock = self.acquire()?;
        let mut doc = self.load_document()?;
        change(&mut doc)?;
        self.write_document(&doc)
    }

    fn load_document(&self) -> Result<StateDocument, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "state file missing, starting from defaults");
                Ok(StateDocument::default())
            }
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    fn write_document(&self, doc: &StateDocument) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, doc)?;
        tmp.flush().map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;
        Ok(())
    }
}

struct FileTransaction<'a> {
    store: &'a FileStore,
    _lock: LockFile,
    doc: StateDocument,
    dirty: bool,
}

impl StateTransaction for FileTransaction<'_> {
    fn load(&mut self) -> Result<RunState, StoreError> {
        Ok(self.doc.run_state.clone())
    }

    fn save(&mut self, state: &RunState) -> Result<(), StoreError> {
        self.doc.run_state = state.clone();
        self.dirty = true;
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.dirty {
            self.store.write_document(&self.doc)?;
        }
        Ok(())
    }
}

impl RunStateStore for FileStore {
    fn begin(&self) -> Result<Box<dyn StateTransaction + '_>, StoreError> {
        let lock = self.acquire()?;
        let doc = self.load_document()?;
        Ok(Box::new(FileTransaction {
            store: self,
            _lock: lock,
            doc,
            dirty: false,
        }))
    }
}

impl TenantCatalog for FileStore {
    fn clusters_to_update(
        &self,
        versions: &TypeVersions,
        commit: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.with_inventory(|inv| Ok(inv.clusters_to_update(versions, commit)))
    }

    fn tenants_to_update(
        &self,
        versions: &TypeVersions,
        limit: usize,
        commit: &str,
        cluster: &str,
    ) -> Result<Vec<Tenant>, StoreError> {
        self.with_inventory(|inv| Ok(inv.tenants_to_update(versions, limit, commit, cluster)))
    }

    fn namespaces(&self, tenant_id: &str) -> Result<Vec<Namespace>, StoreError> {
        self.with_inventory(|inv| inv.namespaces(tenant_id))
    }

    fn record_attempt(
        &self,
        tenant_id: &str,
        env_types: &[EnvType],
        versions: &TypeVersions,
        commit: &str,
        succeeded: bool,
    ) -> Result<(), StoreError> {
        self.update_document(|doc| {
            doc.tenants
                .record_attempt(tenant_id, env_types, versions, commit, succeeded)
        })
    }
}

/// Exclusive advisory lock on a persistent lock file.
///
/// The kernel drops the lock when the holder's handle closes, including when
/// the holder process dies, so a leftover lock file never blocks anyone.
struct LockFile {
    file: File,
}

impl LockFile {
    fn acquire(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(e) if is_contended(&e) => {
                    if started.elapsed() >= timeout {
                        return Err(StoreError::LockTimeout {
                            path: path.to_path_buf(),
                            waited: started.elapsed(),
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }

        // Holder pid, for operators only.
        let _ = file.set_len(0);
        let _ = write!(file, "{}", std::process::id());
        Ok(Self { file })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock || err.kind() == fs2::lock_contended_error().kind()
}
