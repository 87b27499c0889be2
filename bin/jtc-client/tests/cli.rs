//! ---
//! jtc_section: "15-testing-qa-runbook"
//! jtc_subsection: "integration-tests"
//! jtc_type: "source"
//! jtc_scope: "tests"
//! jtc_description: "Command-line surface checks for the client binary."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
use assert_cmd::Command;

#[test]
fn version_flag_prints_and_exits() {
    let output = Command::cargo_bin("jtc-client")
        .unwrap()
        .arg("-V")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("jtc-client "));
}

#[test]
fn help_lists_session_flags() {
    let output = Command::cargo_bin("jtc-client")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    let flags = [
        "--loops",
        "--unbounded",
        "--host",
        "--port",
        "--resource",
        "--smpfreq",
        "--user",
        "--cid",
        "--certdir",
    ];
    for flag in flags {
        assert!(help.contains(flag), "missing {flag} in help");
    }
    assert!(!help.contains("--password"));
}

#[test]
fn unknown_log_format_is_rejected() {
    Command::cargo_bin("jtc-client")
        .unwrap()
        .args(["--log-format", "xml"])
        .assert()
        .failure();
}

#[test]
fn unreadable_config_file_fails_before_prompting() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let output = Command::cargo_bin("jtc-client")
        .unwrap()
        .arg("--config")
        .arg(&missing)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unable to read config file"));
}
