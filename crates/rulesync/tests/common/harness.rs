//! Test harness giving each test its own rules tree.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use assert_fs::TempDir;

use rulesync::reconcile::{FileStore, ReconciliationHandler, RuleStore};
use rulesync::{RuleObject, StorageError};

/// Builds a selected ConfigMap in the `loki` namespace.
pub fn rules(name: &str, tenant: &str, payload: &str) -> RuleObject {
    RuleObject::new(name)
        .with_namespace("loki")
        .with_tenant(tenant)
        .with_rules(payload)
}

/// Which filesystem operation a [`FaultyStore`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    EnsureDir,
    WriteFile,
    RemoveTree,
}

/// Delegates to [`FileStore`] except for the operation it is told to fail.
pub struct FaultyStore {
    fault: Cell<Fault>,
}

impl FaultyStore {
    pub fn new(fault: Fault) -> Self {
        Self {
            fault: Cell::new(fault),
        }
    }

    pub fn set_fault(&self, fault: Fault) {
        self.fault.set(fault);
    }

    fn injected(&self, path: &Path) -> std::io::Error {
        std::io::Error::other(format!("injected fault at {}", path.display()))
    }
}

impl RuleStore for FaultyStore {
    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError> {
        if self.fault.get() == Fault::EnsureDir {
            return Err(StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: self.injected(path),
            });
        }
        FileStore.ensure_dir(path)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), StorageError> {
        if self.fault.get() == Fault::WriteFile {
            return Err(StorageError::WriteFile {
                path: path.to_path_buf(),
                source: self.injected(path),
            });
        }
        FileStore.write_file(path, content)
    }

    fn remove_tree(&self, path: &Path) -> Result<(), StorageError> {
        if self.fault.get() == Fault::RemoveTree {
            return Err(StorageError::RemoveDirectory {
                path: path.to_path_buf(),
                source: self.injected(path),
            });
        }
        FileStore.remove_tree(path)
    }
}

/// An isolated base directory plus helpers to inspect it.
pub struct TestHarness {
    temp_dir: TempDir,
    pub base_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_dir = temp_dir.path().join("rules");
        std::fs::create_dir_all(&base_dir).expect("Failed to create base directory");
        Self { temp_dir, base_dir }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn handler(&self) -> ReconciliationHandler {
        ReconciliationHandler::new(&self.base_dir)
    }

    pub fn handler_with<S: RuleStore>(&self, store: S) -> ReconciliationHandler<S> {
        ReconciliationHandler::with_store(&self.base_dir, store)
    }

    pub fn rules_file(&self, tenant: &str) -> PathBuf {
        self.base_dir.join(tenant).join("rules.yaml")
    }

    pub fn read_rules(&self, tenant: &str) -> Option<String> {
        std::fs::read_to_string(self.rules_file(tenant)).ok()
    }

    pub fn tenant_exists(&self, tenant: &str) -> bool {
        self.base_dir.join(tenant).exists()
    }

    /// Sorted names of the tenant directories below the base directory.
    pub fn tenants(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.base_dir)
            .expect("Failed to read base directory")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
