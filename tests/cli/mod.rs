use std::fs;

use workshop_engine::constants::{
    AAP_PASSWORD, AAP_URL, AAP_USERNAME, MAINFRAME_HOST, OCP_API_URL, OCP_CONSOLE_URL, OCP_PASSWORD, OCP_TOKEN,
    OCP_USERNAME, WORKSHOP_GUID, WORKSHOP_NAMESPACE,
};
use workshop_engine::io_models::env_file::EnvFile;

use crate::helpers::{GUID, fixture, stderr_of, stdout_of, workshop};

#[test]
fn test_help_lists_every_command() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = workshop(dir.path()).arg("--help").output().expect("workshop runs");

    assert!(output.status.success());
    let help = stdout_of(&output);
    for command in [
        "init",
        "login",
        "setup-cluster",
        "configure-aap",
        "build-ee",
        "run-playbook",
        "provision",
        "validate",
    ] {
        assert!(help.contains(command), "`{command}` missing from help:\n{help}");
    }
}

#[test]
fn test_init_writes_env_file() {
    let dir = tempfile::tempdir().expect("temp dir");

    workshop(dir.path())
        .arg("init")
        .arg("--details")
        .arg(fixture("details.txt"))
        .assert()
        .success();

    let env_file = EnvFile::load(&dir.path().join(".env")).expect("env file written");
    let expected = [
        (OCP_API_URL, "https://api.cluster-abc12.abc12.sandbox1234.opentlc.com:6443"),
        (
            OCP_CONSOLE_URL,
            "https://console-openshift-console.apps.cluster-abc12.abc12.sandbox1234.opentlc.com",
        ),
        (OCP_USERNAME, "kubeadmin"),
        (OCP_PASSWORD, "xYz12-AbCdE-fGhIj-KlMnO"),
        (
            AAP_URL,
            "https://controller-aap.apps.cluster-abc12.abc12.sandbox1234.opentlc.com",
        ),
        (AAP_USERNAME, "admin"),
        (AAP_PASSWORD, "c0ntr0ller:pass"),
        (WORKSHOP_GUID, GUID),
        (WORKSHOP_NAMESPACE, "workshop-abc12"),
        (MAINFRAME_HOST, "zos.example.com:10443"),
    ];
    for (key, value) in expected {
        assert_eq!(env_file.get(key), Some(value), "unexpected value for {key}");
    }
    assert_eq!(env_file.get(OCP_TOKEN), None);

    let content = fs::read_to_string(dir.path().join(".env")).expect("env file readable");
    assert!(content.contains("export AAP_PASSWORD='c0ntr0ller:pass'\n"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(dir.path().join(".env")).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn test_init_keeps_existing_env_file_unless_forced() {
    let dir = tempfile::tempdir().expect("temp dir");
    let init = |force: bool| {
        let mut cmd = workshop(dir.path());
        cmd.arg("init").arg("--details").arg(fixture("details.txt"));
        if force {
            cmd.arg("--force");
        }
        cmd.output().expect("workshop runs")
    };

    assert!(init(false).status.success());

    let second = init(false);
    assert_eq!(second.status.code(), Some(1));
    assert!(stderr_of(&second).contains("already exists"), "{}", stderr_of(&second));

    assert!(init(true).status.success());
}

#[test]
fn test_init_with_workshop_definition() {
    let dir = tempfile::tempdir().expect("temp dir");

    workshop(dir.path())
        .arg("--config")
        .arg(fixture("workshop.yml"))
        .arg("--env-file")
        .arg("lab.env")
        .arg("init")
        .arg("--details")
        .arg(fixture("details.txt"))
        .assert()
        .success();

    let env_file = EnvFile::load(&dir.path().join("lab.env")).expect("env file written");
    assert_eq!(env_file.get(WORKSHOP_NAMESPACE), Some("lab-abc12"));
    assert!(!dir.path().join(".env").exists());
}

#[test]
fn test_invalid_workshop_definition_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = dir.path().join("broken.yml");
    fs::write(&config, "organisation: Default\n").expect("config written");

    let output = workshop(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("init")
        .arg("--details")
        .arg(fixture("details.txt"))
        .output()
        .expect("workshop runs");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("cannot load the workshop definition"));
    assert!(!dir.path().join(".env").exists());
}

#[test]
fn test_init_with_incomplete_details_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let details = dir.path().join("details.txt");
    fs::write(&details, "OpenShift API URL: https://api.cluster-abc12.example.com:6443\n").expect("details written");

    let output = workshop(dir.path())
        .arg("init")
        .arg("--details")
        .arg(&details)
        .output()
        .expect("workshop runs");

    assert_eq!(output.status.code(), Some(1));
    assert!(!dir.path().join(".env").exists());
}

#[test]
fn test_validate_without_env_file_fails() {
    let dir = tempfile::tempdir().expect("temp dir");

    let output = workshop(dir.path())
        .arg("validate")
        .arg("workshop-abc12-dev")
        .output()
        .expect("workshop runs");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("Error:"));
}

#[test]
fn test_run_missing_playbook_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    workshop(dir.path())
        .arg("init")
        .arg("--details")
        .arg(fixture("details.txt"))
        .assert()
        .success();

    let output = workshop(dir.path())
        .arg("run-playbook")
        .arg("missing.yml")
        .arg("-e")
        .arg("replicas=2")
        .output()
        .expect("workshop runs");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("missing.yml"), "{}", stderr_of(&output));
}
