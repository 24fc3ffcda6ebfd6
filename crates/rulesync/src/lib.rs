pub mod config;
pub mod error;
pub mod reconcile;
pub mod resource;
pub mod telemetry;
pub mod watch;

pub use config::Settings;
pub use error::{ConfigError, Result, RulesyncError, StorageError, WatchError};
pub use reconcile::{Controller, FileStore, ReconcileOutcome, ReconciliationHandler, RuleStore};
pub use resource::{ObjectMeta, RuleObject, RuleSource, DATA_KEY, LABEL_KEY};
pub use watch::{Informer, ManifestWatcher, ResyncScheduler, Selector, WatchEvent};
