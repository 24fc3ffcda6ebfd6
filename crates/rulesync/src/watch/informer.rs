//! In-memory informer: selector, object cache and event emission.
//!
//! The informer is the watch source the controller subscribes to. Upstream
//! listers push observations into it (`apply`, `remove`, `replace`) and it
//! turns them into `Add`/`Update`/`Delete` notifications on an unbounded
//! channel. `resync` redelivers `Add` for every cached object so that missed
//! or externally damaged state is healed on the next pass.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::event::WatchEvent;
use crate::resource::{RuleObject, LABEL_KEY};

pub type EventSender = mpsc::UnboundedSender<WatchEvent<RuleObject>>;
pub type EventReceiver = mpsc::UnboundedReceiver<WatchEvent<RuleObject>>;

/// Namespace scope plus label-presence filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    namespace: String,
    label_key: String,
}

impl Selector {
    /// Creates a selector for `namespace` requiring the `label_key` label.
    pub fn new(namespace: impl Into<String>, label_key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            label_key: label_key.into(),
        }
    }

    /// Selects objects in `namespace` carrying the tenant label.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self::new(namespace, LABEL_KEY)
    }

    /// Returns the watched namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns true if the object is in scope and carries the label.
    pub fn matches(&self, obj: &RuleObject) -> bool {
        obj.namespace() == self.namespace && obj.metadata.labels.contains_key(&self.label_key)
    }
}

/// Watch source over a selected set of [`RuleObject`]s.
pub struct Informer {
    selector: Selector,
    /// Last known state of every selected object, keyed by name.
    cache: Mutex<BTreeMap<String, RuleObject>>,
    sender: EventSender,
}

impl Informer {
    /// Creates an informer and the receiving end of its event stream.
    pub fn new(selector: Selector) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let informer = Self {
            selector,
            cache: Mutex::new(BTreeMap::new()),
            sender,
        };
        (informer, receiver)
    }

    /// Returns the selector objects are filtered with.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no object is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the cached snapshot of an object.
    pub fn get(&self, name: &str) -> Option<RuleObject> {
        self.lock().get(name).cloned()
    }

    /// Records an observation of a single object.
    pub fn apply(&self, obj: RuleObject) {
        let mut cache = self.lock();
        self.apply_locked(&mut cache, obj);
    }

    /// Records that an object no longer exists.
    pub fn remove(&self, name: &str) {
        let mut cache = self.lock();
        if let Some(old) = cache.remove(name) {
            self.emit(WatchEvent::Delete(old));
        }
    }

    /// Reconciles the cache against a complete listing.
    ///
    /// Only selected objects count as listed; anything else is treated as
    /// absent. Cached objects missing from the listing are deleted before
    /// new and changed objects are applied, so a tenant handed from one
    /// object to another ends up with the new object's rules. When a name
    /// is listed more than once, the first occurrence wins.
    pub fn replace(&self, objects: Vec<RuleObject>) {
        let mut cache = self.lock();

        let mut listed: HashSet<String> = HashSet::new();
        let mut selected = Vec::new();
        for obj in objects {
            if !self.selector.matches(&obj) {
                continue;
            }
            if listed.insert(obj.name().to_string()) {
                selected.push(obj);
            } else {
                log::warn!(
                    "ConfigMap {}/{} is listed more than once, keeping the first definition",
                    obj.namespace(),
                    obj.name()
                );
            }
        }

        let gone: Vec<String> = cache
            .keys()
            .filter(|name| !listed.contains(name.as_str()))
            .cloned()
            .collect();

        for name in gone {
            if let Some(old) = cache.remove(&name) {
                self.emit(WatchEvent::Delete(old));
            }
        }

        for obj in selected {
            self.apply_locked(&mut cache, obj);
        }
    }

    /// Redelivers `Add` for every cached object, in name order.
    ///
    /// Returns the number of events emitted.
    pub fn resync(&self) -> usize {
        let cache = self.lock();
        for obj in cache.values() {
            self.emit(WatchEvent::Add(obj.clone()));
        }
        log::debug!("Resync redelivered {} objects", cache.len());
        cache.len()
    }

    fn apply_locked(&self, cache: &mut BTreeMap<String, RuleObject>, obj: RuleObject) {
        if !self.selector.matches(&obj) {
            // Leaving the selector looks like a deletion to subscribers.
            if obj.namespace() == self.selector.namespace() {
                if let Some(old) = cache.remove(obj.name()) {
                    self.emit(WatchEvent::Delete(old));
                }
            }
            return;
        }

        match cache.insert(obj.name().to_string(), obj.clone()) {
            None => self.emit(WatchEvent::Add(obj)),
            Some(old) if old != obj => self.emit(WatchEvent::Update { old, new: obj }),
            Some(_) => {}
        }
    }

    fn emit(&self, event: WatchEvent<RuleObject>) {
        if let Err(e) = self.sender.send(event) {
            log::debug!(
                "No event subscriber active (receiver dropped), discarding {} event",
                e.0.kind()
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, RuleObject>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
