//! Reconciliation of rule objects into the per-tenant rules tree.

pub mod controller;
pub mod handler;
pub mod store;
pub mod tenant;

pub use controller::{Controller, ControllerStats};
pub use handler::{ReconcileOutcome, ReconciliationHandler};
pub use store::{FileStore, RuleStore, DIR_MODE, FILE_MODE};
pub use tenant::TenantResolver;
