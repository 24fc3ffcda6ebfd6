//! Lifecycle notifications delivered by the informer.

/// A lifecycle notification for an observed object.
///
/// Resync redelivers `Add` for objects that have not changed; first
/// observation and resync share the same tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    Add(T),
    Update { old: T, new: T },
    Delete(T),
}

/// The tag of a [`WatchEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

impl<T> WatchEvent<T> {
    pub fn kind(&self) -> EventKind {
        match self {
            WatchEvent::Add(_) => EventKind::Add,
            WatchEvent::Update { .. } => EventKind::Update,
            WatchEvent::Delete(_) => EventKind::Delete,
        }
    }

    /// Returns the most recent snapshot carried by the event.
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Add(obj) | WatchEvent::Delete(obj) => obj,
            WatchEvent::Update { new, .. } => new,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Add => write!(f, "add"),
            EventKind::Update => write!(f, "update"),
            EventKind::Delete => write!(f, "delete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_returns_newest_snapshot() {
        let event = WatchEvent::Update { old: 1, new: 2 };
        assert_eq!(*event.object(), 2);
        assert_eq!(event.kind(), EventKind::Update);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EventKind::Add.to_string(), "add");
        assert_eq!(EventKind::Update.to_string(), "update");
        assert_eq!(EventKind::Delete.to_string(), "delete");
    }
}
