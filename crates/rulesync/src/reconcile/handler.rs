//! Maps object lifecycle events to filesystem mutations.
//!
//! Each selected object owns one tenant directory, `<base>/<tenant>`, holding
//! a single rules file with the object's payload. Deletion works on the whole
//! tenant directory rather than on the file an object wrote, which is only
//! correct while no two objects carry the same tenant label. Two objects
//! sharing a tenant overwrite each other's file, and deleting either one
//! removes the rules of both.
//!
//! The handler is not synchronized. It must be driven by a single consumer
//! and be the only writer below its base directory.

use std::path::{Path, PathBuf};

use super::store::{FileStore, RuleStore};
use super::tenant::{is_suspicious, TenantResolver};
use crate::error::StorageError;
use crate::resource::{RuleSource, DATA_KEY};
use crate::watch::event::WatchEvent;

/// What processing a single event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The output tree was mutated as requested.
    Applied,
    /// Nothing relevant changed; no mutation was attempted.
    Unchanged,
    /// At least one mutation failed and was logged.
    Failed,
}

/// Applies watch events for rule objects to a tenant directory tree.
pub struct ReconciliationHandler<S = FileStore> {
    base_dir: PathBuf,
    /// Data key read for the payload; also the file name written per tenant.
    data_key: String,
    resolver: TenantResolver,
    store: S,
}

impl ReconciliationHandler<FileStore> {
    /// Creates a handler writing below `base_dir` on the local filesystem.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_store(base_dir, FileStore)
    }
}

impl<S: RuleStore> ReconciliationHandler<S> {
    /// Creates a handler writing below `base_dir` through `store`.
    pub fn with_store(base_dir: impl Into<PathBuf>, store: S) -> Self {
        Self {
            base_dir: base_dir.into(),
            data_key: DATA_KEY.to_string(),
            resolver: TenantResolver::default(),
            store,
        }
    }

    /// Replaces the default tenant resolver.
    pub fn with_resolver(mut self, resolver: TenantResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Returns the root of the output tree.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Directory owned by `tenant`.
    ///
    /// Leading separators are dropped, so an absolute tenant value still
    /// lands below the base directory and `/` maps to the base directory.
    pub fn tenant_dir(&self, tenant: &str) -> PathBuf {
        self.base_dir.join(tenant.trim_start_matches('/'))
    }

    /// Rules file written for `tenant`.
    pub fn rules_path(&self, tenant: &str) -> PathBuf {
        self.tenant_dir(tenant).join(&self.data_key)
    }

    /// Dispatches an event to the matching entry point.
    pub fn handle<O: RuleSource>(&self, event: &WatchEvent<O>) -> ReconcileOutcome {
        let span = tracing::info_span!(
            "reconcile",
            kind = %event.kind(),
            object = %event.object().identity()
        );
        let _enter = span.enter();

        match event {
            WatchEvent::Add(obj) => self.on_add(obj),
            WatchEvent::Update { old, new } => self.on_update(old, new),
            WatchEvent::Delete(obj) => self.on_delete(obj),
        }
    }

    /// Writes the object's payload into its tenant directory.
    ///
    /// Safe to repeat: a redelivered `Add` rewrites identical content.
    pub fn on_add<O: RuleSource>(&self, obj: &O) -> ReconcileOutcome {
        match self.add_rule(obj) {
            Ok(path) => {
                log::info!("add rules in {}", obj.identity());
                log::debug!("wrote {}", path.display());
                ReconcileOutcome::Applied
            }
            Err(e) => {
                log::error!("{}", e);
                ReconcileOutcome::Failed
            }
        }
    }

    /// Applies a change between two snapshots of the same object.
    ///
    /// The new rules are written before the old tenant directory is removed,
    /// so the evaluator never sees a tenant without rules during a move.
    pub fn on_update<O: RuleSource>(&self, old: &O, new: &O) -> ReconcileOutcome {
        let data_changed = self.payload(old) != self.payload(new);
        let tenant_changed = self.resolver.resolve(old) != self.resolver.resolve(new);

        if !data_changed && !tenant_changed {
            return ReconcileOutcome::Unchanged;
        }

        let mut outcome = ReconcileOutcome::Applied;

        if let Err(e) = self.add_rule(new) {
            log::error!("{}", e);
            outcome = ReconcileOutcome::Failed;
        }

        if tenant_changed {
            if let Err(e) = self.delete_rule(old) {
                log::error!("{}", e);
                outcome = ReconcileOutcome::Failed;
            }
        }

        log::info!("update rules in {}", new.identity());
        outcome
    }

    /// Removes the object's whole tenant directory.
    pub fn on_delete<O: RuleSource>(&self, obj: &O) -> ReconcileOutcome {
        match self.delete_rule(obj) {
            Ok(path) => {
                log::info!("delete rules in {}", obj.identity());
                log::debug!("removed {}", path.display());
                ReconcileOutcome::Applied
            }
            Err(e) => {
                log::error!("{}", e);
                ReconcileOutcome::Failed
            }
        }
    }

    fn payload<'a, O: RuleSource>(&self, obj: &'a O) -> &'a str {
        obj.data(&self.data_key).unwrap_or_default()
    }

    fn add_rule<O: RuleSource>(&self, obj: &O) -> Result<PathBuf, StorageError> {
        let tenant = self.resolver.resolve(obj);
        if is_suspicious(&tenant) {
            log::warn!(
                "{} has tenant {:?}, which does not map to a single directory below {}",
                obj.identity(),
                tenant,
                self.base_dir.display()
            );
        }

        let tenant_dir = self.tenant_dir(&tenant);
        self.store.ensure_dir(&tenant_dir)?;

        let rules_path = tenant_dir.join(&self.data_key);
        self.store
            .write_file(&rules_path, self.payload(obj).as_bytes())?;

        Ok(rules_path)
    }

    fn delete_rule<O: RuleSource>(&self, obj: &O) -> Result<PathBuf, StorageError> {
        let tenant_dir = self.tenant_dir(&self.resolver.resolve(obj));
        self.store.remove_tree(&tenant_dir)?;
        Ok(tenant_dir)
    }
}
