//! CLI integration tests
//!
//! Tests the tether CLI using assert_cmd.

use std::io::Write;
use std::net::TcpListener;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A tether command isolated from the user's real config directory
fn tether(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tether")
        .expect("Failed to locate tether binary - ensure it's built before running tests");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tether"))
        .stdout(predicate::str::contains("remote debug endpoints"));
}

#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tether"));
}

#[test]
fn test_cli_shell_help() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .args(["shell", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("host[:port]"))
        .stdout(predicate::str::contains("--background"));
}

#[test]
fn test_cli_requires_subcommand() {
    let home = TempDir::new().unwrap();
    tether(home.path()).assert().failure();
}

#[test]
fn test_config_path_honors_flag() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("custom.toml");
    tether(home.path())
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_then_get_and_set() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("tether.toml");

    tether(home.path())
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    tether(home.path())
        .args(["config", "get", "default_port", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("5555"));

    tether(home.path())
        .args(["config", "set", "refresh_interval", "100", "--config"])
        .arg(&path)
        .assert()
        .success();

    tether(home.path())
        .args(["config", "get", "refresh_interval", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("100"));
}

#[test]
fn test_config_set_rejects_unknown_transport() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("tether.toml");

    tether(home.path())
        .args(["config", "set", "transport", "serial", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value for transport"));
}

#[test]
fn test_status_reports_idle() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Keep-alive: idle"));
}

#[test]
fn test_shell_rejects_malformed_endpoint() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .args(["shell", "10.0.0.5:notaport"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid endpoint"));
}

#[test]
fn test_shell_reports_refused_connection() {
    let home = TempDir::new().unwrap();

    // Bind then drop to get a port with nothing listening
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = write_config(home.path(), "transport = \"tcp\"\nconnect_timeout = 2\n");

    tether(home.path())
        .arg("--config")
        .arg(&config)
        .args(["shell", &format!("127.0.0.1:{}", port)])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not connect to 127.0.0.1"));
}

#[test]
fn test_shell_shows_remote_output_until_closed() {
    let home = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let device = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(b"hello from device\n").unwrap();
        stream.flush().unwrap();
    });

    let config = write_config(
        home.path(),
        "transport = \"tcp\"\nconnect_timeout = 2\nrefresh_interval = 50\n",
    );

    tether(home.path())
        .arg("--config")
        .arg(&config)
        .args(["shell", &format!("127.0.0.1:{}", port)])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from device"))
        .stdout(predicate::str::contains("closed"));

    device.join().unwrap();
}
