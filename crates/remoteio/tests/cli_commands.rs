#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn remoteio(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_remoteio"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("remoteio should run")
}

#[test]
fn exercise_round_trip_verifies_in_json() {
    let output = remoteio(&["--format", "json", "exercise", "--size", "20000"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"verified\":true"));
    assert!(stdout.contains("\"mode\":\"pipelined\""));
    assert!(stdout.contains("\"written\":20000"));
}

#[test]
fn exercise_describe_mode_reports_mode() {
    let output = remoteio(&["--format", "json", "exercise", "--size", "512", "--describe"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"mode\":\"describe\""));
    assert!(stdout.contains("\"verified\":true"));
}

#[test]
fn exercise_rejects_oversized_payload() {
    let output = remoteio(&["exercise", "--size", "999999999"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn exercise_rejects_overlong_path() {
    let path = "p".repeat(5000);
    let output = remoteio(&["exercise", "--size", "16", "--path", &path]);
    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("open failed"));
}

#[test]
fn ops_lists_event_ops() {
    let output = remoteio(&["--format", "json", "ops"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"name\":\"on_open\""));
    assert!(stdout.contains("\"code\":\"0x80000007\""));
}

#[test]
fn version_prints_package_version() {
    let output = remoteio(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("remoteio {}", env!("CARGO_PKG_VERSION")));
}
