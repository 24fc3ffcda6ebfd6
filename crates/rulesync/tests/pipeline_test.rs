//! Manifest directory to rules tree, through informer and controller.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;

use common::TestHarness;
use rulesync::reconcile::{Controller, ControllerStats};
use rulesync::watch::{EventKind, Informer, ManifestWatcher, Selector};

fn manifest(name: &str, namespace: &str, tenant: Option<&str>, rules: &str) -> String {
    let labels = tenant
        .map(|t| format!("  labels:\n    rules4tenant: \"{}\"\n", t))
        .unwrap_or_default();
    format!(
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n  namespace: {}\n{}data:\n  rules.yaml: \"{}\"\n",
        name, namespace, labels, rules
    )
}

struct Pipeline {
    harness: TestHarness,
    manifest_dir: std::path::PathBuf,
    informer: Arc<Informer>,
    watcher: ManifestWatcher,
    controller: Controller,
    events: rulesync::watch::EventReceiver,
}

impl Pipeline {
    fn new() -> Self {
        let harness = TestHarness::new();
        let manifest_dir = harness.root().join("manifests");
        std::fs::create_dir_all(&manifest_dir).unwrap();

        let (informer, events) = Informer::new(Selector::for_namespace("loki"));
        let informer = Arc::new(informer);
        let watcher = ManifestWatcher::new(&manifest_dir, Arc::clone(&informer));
        let controller = Controller::new(harness.handler());

        Self {
            harness,
            manifest_dir,
            informer,
            watcher,
            controller,
            events,
        }
    }

    fn write(&self, file: &str, content: &str) {
        std::fs::write(self.manifest_dir.join(file), content).unwrap();
    }

    fn remove(&self, file: &str) {
        std::fs::remove_file(self.manifest_dir.join(file)).unwrap();
    }

    /// Relists and processes every resulting event; returns their kinds.
    fn sync(&mut self) -> Vec<EventKind> {
        self.watcher.relist().unwrap();
        self.drain()
    }

    fn resync(&mut self) -> Vec<EventKind> {
        self.informer.resync();
        self.drain()
    }

    fn drain(&mut self) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            kinds.push(event.kind());
            self.controller.process(&event);
        }
        kinds
    }
}

#[test]
fn test_lifecycle_through_manifests() {
    let mut p = Pipeline::new();

    p.write("a.yaml", &manifest("team-a", "loki", Some("t1"), "v1"));
    assert_eq!(p.sync(), vec![EventKind::Add]);
    ChildPath::new(p.harness.rules_file("t1")).assert("v1");

    p.write("a.yaml", &manifest("team-a", "loki", Some("t1"), "v2"));
    assert_eq!(p.sync(), vec![EventKind::Update]);
    ChildPath::new(p.harness.rules_file("t1")).assert("v2");

    p.write("a.yaml", &manifest("team-a", "loki", Some("t2"), "v2"));
    assert_eq!(p.sync(), vec![EventKind::Update]);
    ChildPath::new(p.harness.rules_file("t2")).assert("v2");
    assert!(!p.harness.tenant_exists("t1"));

    p.remove("a.yaml");
    assert_eq!(p.sync(), vec![EventKind::Delete]);
    assert!(p.harness.tenants().is_empty());
}

#[test]
fn test_unselected_manifests_are_ignored() {
    let mut p = Pipeline::new();

    p.write("other-ns.yaml", &manifest("x", "default", Some("t1"), "v"));
    p.write("no-label.yaml", &manifest("y", "loki", None, "v"));

    assert!(p.sync().is_empty());
    assert!(p.harness.tenants().is_empty());
}

#[test]
fn test_unchanged_relist_emits_nothing() {
    let mut p = Pipeline::new();
    p.write("a.yaml", &manifest("team-a", "loki", Some("t1"), "v1"));
    p.sync();

    assert!(p.sync().is_empty());
}

#[test]
fn test_resync_restores_deleted_tree() {
    let mut p = Pipeline::new();
    p.write("a.yaml", &manifest("team-a", "loki", Some("t1"), "v1"));
    p.write("b.yaml", &manifest("team-b", "loki", Some("t2"), "v2"));
    p.sync();

    std::fs::remove_dir_all(&p.harness.base_dir).unwrap();
    std::fs::create_dir_all(&p.harness.base_dir).unwrap();

    assert_eq!(p.resync(), vec![EventKind::Add, EventKind::Add]);
    ChildPath::new(p.harness.rules_file("t1")).assert("v1");
    ChildPath::new(p.harness.rules_file("t2")).assert("v2");
    assert_eq!(
        p.controller.stats(),
        ControllerStats {
            processed: 4,
            applied: 4,
            unchanged: 0,
            failed: 0,
        }
    );
}

#[test]
fn test_tenant_handover_between_objects() {
    let mut p = Pipeline::new();
    p.write("old.yaml", &manifest("old", "loki", Some("t1"), "old rules"));
    p.sync();

    p.remove("old.yaml");
    p.write("new.yaml", &manifest("new", "loki", Some("t1"), "new rules"));

    assert_eq!(p.sync(), vec![EventKind::Delete, EventKind::Add]);
    ChildPath::new(p.harness.rules_file("t1")).assert("new rules");
}

#[test]
fn test_removed_object_deleted_despite_namesake_elsewhere() {
    let mut p = Pipeline::new();
    p.write("loki.yaml", &manifest("team-a", "loki", Some("t1"), "v1"));
    p.write("other.yaml", &manifest("team-a", "other", Some("t9"), "x"));
    p.sync();

    p.remove("loki.yaml");

    assert_eq!(p.sync(), vec![EventKind::Delete]);
    assert!(p.resync().is_empty());
    assert!(p.harness.tenants().is_empty());
}

#[test]
fn test_duplicate_definitions_do_not_flap() {
    let mut p = Pipeline::new();
    p.write("a.yaml", &manifest("team-a", "loki", Some("t1"), "first"));
    p.write("b.yaml", &manifest("team-a", "loki", Some("t1"), "second"));

    assert_eq!(p.sync(), vec![EventKind::Add]);
    assert!(p.sync().is_empty());
    ChildPath::new(p.harness.rules_file("t1")).assert("first");
}

#[test]
fn test_broken_manifest_keeps_rules() {
    let mut p = Pipeline::new();
    p.write("a.yaml", &manifest("team-a", "loki", Some("t1"), "v1"));
    p.sync();

    p.write("a.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata: [");
    assert!(p.watcher.relist().is_err());

    assert!(p.drain().is_empty());
    ChildPath::new(p.harness.rules_file("t1")).assert("v1");
}

#[tokio::test]
async fn test_controller_run_stops_when_informer_dropped() {
    let harness = TestHarness::new();
    let (informer, events) = Informer::new(Selector::for_namespace("loki"));
    informer.apply(common::rules("team-a", "t1", "v1"));

    let mut controller = Controller::new(harness.handler());
    let task = tokio::spawn(async move { controller.run(events).await });
    drop(informer);

    let stats = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("controller did not stop")
        .unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(harness.read_rules("t1").as_deref(), Some("v1"));
}
