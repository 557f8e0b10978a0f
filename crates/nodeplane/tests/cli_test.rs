#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const MANIFEST: &str = r#"
endpoints:
  public_ip: 54.0.0.1
  private_ip: 10.0.0.1
  http_port: 8080
  backend_port: 20000
  messaging_host: 10.0.0.2
handlers:
  - url: /admin
    kind: application
    secure: always
"#;

/// Agent config rooting the proxy tree inside a temp dir
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nginx");
    fs::write(
        dir.path().join("nodeplane.yaml"),
        format!(
            "proxy:\n  root: {}\n  state_dir: {}\n  log_dir: {}\n",
            root.display(),
            dir.path().join("routes").display(),
            dir.path().join("log").display()
        ),
    )
    .unwrap();
    fs::write(dir.path().join("guestbook.yaml"), MANIFEST).unwrap();
    dir
}

fn nodeplane(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nodeplane").unwrap();
    cmd.current_dir(dir.path())
        .env("NODEPLANE_CONFIG_PATH", dir.path().join("nodeplane.yaml"));
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("nodeplane").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("spawn"))
        .stdout(predicate::str::contains("terminate"))
        .stdout(predicate::str::contains("proxy"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("nodeplane").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nodeplane"));
}

#[test]
fn test_spawn_requires_role() {
    let dir = workspace();
    nodeplane(&dir)
        .args(["spawn", "--count", "2", "--credentials", "creds.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--role"));
}

/// Rendering prints the config and leaves the sites directory alone
#[test]
fn test_proxy_render() {
    let dir = workspace();
    nodeplane(&dir)
        .args(["proxy", "render", "--app", "guestbook", "--manifest", "guestbook.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("upstream nodeplane_guestbook {"))
        .stdout(predicate::str::contains("location /admin {"))
        .stdout(predicate::str::contains("listen      4380 ssl;"));

    assert!(!dir.path().join("nginx").join("sites-enabled").exists());
}

#[test]
fn test_proxy_render_missing_manifest() {
    let dir = workspace();
    nodeplane(&dir)
        .args(["proxy", "render", "--app", "guestbook", "--manifest", "absent.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.yaml"));
}
