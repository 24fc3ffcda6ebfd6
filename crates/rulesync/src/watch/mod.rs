//! Watch source for rule ConfigMaps.
//!
//! - `informer`: selector, object cache, `Add`/`Update`/`Delete` emission and resync
//! - `manifest`: lists and watches a directory of YAML manifests, feeding the informer
//! - `resync`: periodic redelivery of every cached object

pub mod event;
pub mod informer;
pub mod manifest;
pub mod resync;

pub use event::{EventKind, WatchEvent};
pub use informer::{EventReceiver, EventSender, Informer, Selector};
pub use manifest::{parse_manifests, AsyncManifestWatcher, ManifestLister, ManifestWatcher};
pub use resync::ResyncScheduler;
