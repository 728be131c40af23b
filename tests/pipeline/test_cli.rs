// Runs the built binary against a scratch workspace.

use std::path::Path;
use std::process::{Command, Output};

use adasweep::codec::write_dataset;
use tempfile::TempDir;

const SETTINGS: &str = r#"
log_level = "warn"

[sweep]
ledger_path = "out/ledger.csv"

[[sweep.tasks]]
dataset = "toy"
r_values = [16, 24]
l_values = [10, 20]
alpha_configs = [{ min = 1.0, max = 1.2 }, { min = 1.2, max = 1.2 }]
"#;

fn adasweep(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_adasweep"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.join("settings.toml"))
        .args(args)
        .output()
        .expect("failed to run adasweep")
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("settings.toml"), SETTINGS).unwrap();
    dir
}

#[test]
fn test_dry_run_lists_grid_as_json() {
    let dir = workspace();
    let out = adasweep(dir.path(), &["--json", "sweep", "--dry-run"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["status"], "success");
    let grid = json["data"].as_array().unwrap();
    // Two R values, each with a baseline and one valid alpha range
    assert_eq!(grid.len(), 4);
    assert_eq!(grid[0]["config"]["algorithm"], "Baseline");
    assert_eq!(grid[1]["config"]["alpha"]["max"], 1.2);
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_inspect_flags_truncated_file() {
    let dir = workspace();
    let path = dir.path().join("toy_base.bin");
    write_dataset::<f32>(&path, 2, &[0.0, 1.0, 2.0, 3.0]).unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - 4);
    std::fs::write(&path, bytes).unwrap();

    let out = adasweep(dir.path(), &["inspect", "toy_base.bin"]);
    assert_eq!(out.status.code(), Some(7));
    assert!(String::from_utf8_lossy(&out.stdout).contains("SIZE MISMATCH"));
}

#[test]
fn test_missing_input_maps_to_not_found() {
    let dir = workspace();
    let out = adasweep(dir.path(), &["--json", "lid", "missing_base.bin"]);
    assert_eq!(out.status.code(), Some(3));

    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["code"], "DATASET_NOT_FOUND");
}

#[test]
fn test_env_override_reaches_settings() {
    let dir = workspace();
    let out = Command::new(env!("CARGO_BIN_EXE_adasweep"))
        .current_dir(dir.path())
        .env("AS_LID__K", "42")
        .arg("--config")
        .arg(dir.path().join("settings.toml"))
        .args(["--json", "config"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["data"]["lid"]["k"], 42);
    assert_eq!(json["data"]["sweep"]["ledger_path"], "out/ledger.csv");
}
