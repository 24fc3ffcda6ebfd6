//! ConfigMap-shaped rule objects and the narrow view the reconciler needs of them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Data key holding the opaque rules payload.
pub const DATA_KEY: &str = "rules.yaml";

/// Label key holding the tenant identifier. Its presence selects an object.
pub const LABEL_KEY: &str = "rules4tenant";

/// The only manifest kind the watcher picks up.
pub const CONFIG_MAP_KIND: &str = "ConfigMap";

/// Namespace assumed for manifests that do not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Read-only access to an observed object.
///
/// The reconciler depends only on this, never on the full object shape.
pub trait RuleSource {
    /// Returns the value of a label, if present.
    fn label(&self, key: &str) -> Option<&str>;

    /// Returns the value stored under a data key, if present.
    fn data(&self, key: &str) -> Option<&str>;

    /// Returns a stable identifier for log lines.
    fn identity(&self) -> String;
}

/// Metadata for an object, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// The unique name of the object within its namespace.
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Key-value labels for organizing and selecting objects.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ObjectMeta {
    /// Creates a new ObjectMeta with a name in the default namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Adds a label to the metadata.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Just enough of a manifest to decide whether to parse the rest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestHeader {
    #[serde(default)]
    pub kind: String,
}

/// A ConfigMap carrying a tenant label and a rules payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleObject {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, String>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    CONFIG_MAP_KIND.to_string()
}

impl RuleObject {
    /// Creates an empty ConfigMap with the given name in the default namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::new(name),
            data: HashMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_namespace(namespace);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_label(key, value);
        self
    }

    /// Sets the tenant label.
    pub fn with_tenant(self, tenant: impl Into<String>) -> Self {
        self.with_label(LABEL_KEY, tenant)
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Sets the rules payload.
    pub fn with_rules(self, rules: impl Into<String>) -> Self {
        self.with_data(DATA_KEY, rules)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl RuleSource for RuleObject {
    fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    fn data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    fn identity(&self) -> String {
        if self.metadata.namespace.is_empty() {
            self.metadata.name.clone()
        } else {
            format!("{}/{}", self.metadata.namespace, self.metadata.name)
        }
    }
}
