use std::path::{Path, PathBuf};

use assert_cmd::Command;

pub const GUID: &str = "abc12";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

/// `workshop` with its workspace set to `workspace` and no ambient configuration leaking in.
pub fn workshop(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("workshop").expect("workshop binary is built");
    cmd.current_dir(workspace)
        .env_remove("WORKSHOP_ENV_FILE")
        .env_remove("WORKSHOP_CONFIG")
        .env_remove("RUST_LOG")
        .env("CI", "true")
        .arg("--workspace")
        .arg(workspace);
    cmd
}

pub fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

pub fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}
