//! Maps an object's labels to a tenant key.

use std::path::{Component, Path};

use crate::resource::{RuleSource, LABEL_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResolver {
    label_key: String,
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::new(LABEL_KEY)
    }
}

impl TenantResolver {
    /// Creates a resolver reading the tenant from `label_key`.
    pub fn new(label_key: impl Into<String>) -> Self {
        Self {
            label_key: label_key.into(),
        }
    }

    /// Returns the tenant label's value, or `""` when the label is absent.
    ///
    /// The value is not validated.
    pub fn resolve<O: RuleSource + ?Sized>(&self, obj: &O) -> String {
        obj.label(&self.label_key).unwrap_or_default().to_string()
    }
}

/// Whether a tenant key would land somewhere other than its own directory
/// directly below the base directory.
///
/// Used for warnings only. Such tenants are still written, below the base
/// directory, wherever the handler's join puts them.
pub fn is_suspicious(tenant: &str) -> bool {
    let mut components = Path::new(tenant).components();
    !matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
