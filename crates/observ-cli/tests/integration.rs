use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn observ(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("observ-demo").unwrap();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(dir.path().join("observ-demo.yaml"));
    cmd
}

fn write_tool(bin: &Path, name: &str, script: &str) {
    let path = bin.join(name);
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
}

/// Stub gcloud/terraform/kubectl binaries that satisfy the preflight and
/// environment checks without touching any cloud.
fn stub_cloud_tools(dir: &TempDir) -> PathBuf {
    let bin = dir.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    write_tool(
        &bin,
        "gcloud",
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then echo "Google Cloud SDK 456.0.0"; exit 0; fi
if [ "$1" = "auth" ] && [ "$2" = "list" ]; then echo "demo@example.com"; exit 0; fi
if [ "$1" = "auth" ]; then echo "stub-token"; exit 0; fi
if [ "$1" = "projects" ]; then echo "$3"; exit 0; fi
if [ "$1" = "billing" ]; then echo "True"; exit 0; fi
exit 0
"#,
    );
    write_tool(
        &bin,
        "terraform",
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then echo "Terraform v1.7.5"; fi
exit 0
"#,
    );
    write_tool(
        &bin,
        "kubectl",
        r#"#!/bin/sh
if [ "$1" = "version" ]; then echo '{"clientVersion":{"gitVersion":"v1.29.1"}}'; fi
exit 0
"#,
    );
    bin
}

fn init_config(dir: &TempDir) {
    let bin = stub_cloud_tools(dir);
    observ(dir)
        .env("PATH", &bin)
        .args([
            "init",
            "--project-id",
            "observ-demo-proj",
            "--billing-account",
            "012345-6789AB-CDEF01",
            "--skip-terraform",
        ])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// observ-demo --help
// ---------------------------------------------------------------------------

#[test]
fn help_lists_all_subcommands() {
    let dir = TempDir::new().unwrap();
    observ(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("teardown"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("generate-traffic"));
}

// ---------------------------------------------------------------------------
// observ-demo init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_a_loadable_config() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);

    let content = std::fs::read_to_string(dir.path().join("observ-demo.yaml")).unwrap();
    assert!(content.contains("observ-demo-proj"));
    assert!(content.contains("012345-6789AB-CDEF01"));
    // Derived defaults are materialized into the file.
    assert!(content.contains("us-central1-a"));
    assert!(content.contains("observ-demo-proj-terraform-state"));
}

#[test]
fn init_runs_terraform_when_a_workspace_exists() {
    let dir = TempDir::new().unwrap();
    let bin = stub_cloud_tools(&dir);
    std::fs::create_dir(dir.path().join("terraform")).unwrap();

    observ(&dir)
        .env("PATH", &bin)
        .args([
            "init",
            "--project-id",
            "observ-demo-proj",
            "--billing-account",
            "012345-6789AB-CDEF01",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("terraform: initialized and validated"));
}

#[test]
fn init_fails_when_a_required_tool_is_missing() {
    let dir = TempDir::new().unwrap();
    let empty = dir.path().join("empty-bin");
    std::fs::create_dir_all(&empty).unwrap();

    observ(&dir)
        .env("PATH", &empty)
        .args([
            "init",
            "--project-id",
            "observ-demo-proj",
            "--billing-account",
            "012345-6789AB-CDEF01",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required tool not found"));

    assert!(!dir.path().join("observ-demo.yaml").exists());
}

#[test]
fn init_fails_when_not_authenticated() {
    let dir = TempDir::new().unwrap();
    let bin = stub_cloud_tools(&dir);
    // Replace the gcloud stub with one that has no active account.
    write_tool(
        &bin,
        "gcloud",
        r#"#!/bin/sh
if [ "$1" = "--version" ]; then echo "Google Cloud SDK 456.0.0"; exit 0; fi
if [ "$1" = "auth" ] && [ "$2" = "list" ]; then exit 0; fi
exit 1
"#,
    );

    observ(&dir)
        .env("PATH", &bin)
        .args([
            "init",
            "--project-id",
            "observ-demo-proj",
            "--billing-account",
            "012345-6789AB-CDEF01",
            "--skip-terraform",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not authenticated"));
}

#[test]
fn init_fails_when_the_terraform_workspace_is_absent() {
    let dir = TempDir::new().unwrap();
    let bin = stub_cloud_tools(&dir);

    observ(&dir)
        .env("PATH", &bin)
        .args([
            "init",
            "--project-id",
            "observ-demo-proj",
            "--billing-account",
            "012345-6789AB-CDEF01",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("terraform init failed"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);

    let bin = stub_cloud_tools(&dir);
    observ(&dir)
        .env("PATH", &bin)
        .args([
            "init",
            "--project-id",
            "other-proj-name",
            "--billing-account",
            "012345-6789AB-CDEF01",
            "--skip-terraform",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    // The original file is untouched.
    let content = std::fs::read_to_string(dir.path().join("observ-demo.yaml")).unwrap();
    assert!(content.contains("observ-demo-proj"));
}

#[test]
fn init_force_overwrites() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);

    let bin = stub_cloud_tools(&dir);
    observ(&dir)
        .env("PATH", &bin)
        .args([
            "init",
            "--project-id",
            "other-proj-name",
            "--billing-account",
            "012345-6789AB-CDEF01",
            "--skip-terraform",
            "--force",
        ])
        .assert()
        .success();

    let content = std::fs::read_to_string(dir.path().join("observ-demo.yaml")).unwrap();
    assert!(content.contains("other-proj-name"));
}

#[test]
fn init_rejects_invalid_project_id() {
    let dir = TempDir::new().unwrap();
    observ(&dir)
        .args([
            "init",
            "--project-id",
            "Bad_Project_Name",
            "--billing-account",
            "012345-6789AB-CDEF01",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn init_rejects_invalid_billing_account() {
    let dir = TempDir::new().unwrap();
    observ(&dir)
        .args([
            "init",
            "--project-id",
            "observ-demo-proj",
            "--billing-account",
            "not-a-billing-id",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("billing_account"));
}

// ---------------------------------------------------------------------------
// missing / invalid configuration
// ---------------------------------------------------------------------------

#[test]
fn deploy_without_config_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    observ(&dir)
        .args(["deploy", "--auto-approve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn teardown_without_config_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    observ(&dir)
        .args(["teardown", "--auto-approve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn status_without_config_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    observ(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn deploy_rejects_malformed_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("observ-demo.yaml"),
        "gcp:\n  project_id: Bad_Project\n  billing_account: 012345-6789AB-CDEF01\n",
    )
    .unwrap();

    observ(&dir)
        .args(["deploy", "--auto-approve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn deploy_rejects_invalid_notification_override() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);

    observ(&dir)
        .args([
            "deploy",
            "--auto-approve",
            "--notify-email",
            "not-an-email",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid email address"));
}

// ---------------------------------------------------------------------------
// observ-demo generate-traffic
// ---------------------------------------------------------------------------

#[test]
fn generate_traffic_rejects_unknown_pattern() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);

    observ(&dir)
        .args(["generate-traffic", "--pattern", "extreme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown traffic pattern"));
}

#[test]
fn generate_traffic_runs_against_an_explicit_target() {
    let dir = TempDir::new().unwrap();
    init_config(&dir);

    // Zero duration makes the load loop exit immediately; the unreachable
    // target is never contacted.
    observ(&dir)
        .args([
            "generate-traffic",
            "--pattern",
            "low",
            "--duration",
            "0",
            "--target-url",
            "http://127.0.0.1:1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 requests sent"));
}
