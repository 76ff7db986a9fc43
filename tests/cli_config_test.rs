use std::process::Command;
use tempfile::TempDir;

fn sidecar(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sidecar-sync"));
    cmd.current_dir(dir).env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();

    let output = sidecar(temp_dir.path())
        .arg("init")
        .output()
        .expect("Failed to run init command");

    assert!(output.status.success());

    let config_path = temp_dir.path().join(".sidecar/sync.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[watch]"));
    assert!(content.contains("debounce_ms = 100"));
    assert!(content.contains("[sessions]"));

    // A second init without --force refuses to overwrite
    let output = sidecar(temp_dir.path()).arg("init").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".sidecar");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("sync.toml"),
        "[watch]\ndebounce_ms = 999\n",
    )
    .unwrap();

    let output = sidecar(temp_dir.path())
        .arg("config")
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("debounce_ms = 999"));
    assert!(stdout.contains("capacity = 32"));
}

#[test]
fn test_custom_config_path() {
    let temp_dir = TempDir::new().unwrap();
    let custom = temp_dir.path().join("custom.toml");
    std::fs::write(&custom, "[sessions]\ncapacity = 7\n").unwrap();

    let output = sidecar(temp_dir.path())
        .args(["config", "--config"])
        .arg(&custom)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("capacity = 7"));
}

#[test]
fn test_tree_command_prints_rows() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("project");
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/lib.rs"), "").unwrap();
    std::fs::write(root.join("Cargo.toml"), "").unwrap();

    let output = sidecar(temp_dir.path())
        .args(["tree", "project", "--depth", "2"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout, "v src/\n    lib.rs\n  Cargo.toml\n");
}

#[test]
fn test_sessions_without_dir_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = sidecar(temp_dir.path()).arg("sessions").output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("No session directory"));
}
