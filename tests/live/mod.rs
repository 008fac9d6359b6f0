// needs a live OpenShift cluster and controller, described by the details file in
// WORKSHOP_TEST_DETAILS, plus `oc` in the PATH
#![cfg(feature = "test-live-cluster")]

use std::path::PathBuf;

use workshop_engine::constants::{AAP_INVENTORY_ID, AAP_PROJECT_ID};
use workshop_engine::io_models::env_file::EnvFile;

use crate::helpers::{stdout_of, workshop};

fn details_path() -> PathBuf {
    PathBuf::from(std::env::var("WORKSHOP_TEST_DETAILS").expect("WORKSHOP_TEST_DETAILS must be set"))
}

#[test]
fn test_provision_twice_reuses_everything() {
    let dir = tempfile::tempdir().expect("temp dir");
    let kubeconfig = dir.path().join("kubeconfig");
    let provision = |force: bool| {
        let mut cmd = workshop(dir.path());
        cmd.arg("--kubeconfig").arg(&kubeconfig).arg("provision").arg("--details").arg(details_path());
        if force {
            cmd.arg("--force");
        }
        cmd.assert().success();
        EnvFile::load(&dir.path().join(".env")).expect("env file written")
    };

    let first = provision(false);
    let second = provision(true);

    assert_eq!(first.get(AAP_PROJECT_ID), second.get(AAP_PROJECT_ID));
    assert_eq!(first.get(AAP_INVENTORY_ID), second.get(AAP_INVENTORY_ID));

    let namespace = format!("{}-dev", first.get("WORKSHOP_NAMESPACE").expect("namespace recorded"));
    let output = workshop(dir.path())
        .arg("--kubeconfig")
        .arg(&kubeconfig)
        .arg("validate")
        .arg(&namespace)
        .arg("--output")
        .arg("json")
        .output()
        .expect("workshop runs");
    let report: serde_json::Value = serde_json::from_str(&stdout_of(&output)).expect("json report");
    assert!(
        report["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .filter(|c| c["category"] == "aap")
            .all(|c| c["status"] == "passed"),
        "{report:#}"
    );
}
