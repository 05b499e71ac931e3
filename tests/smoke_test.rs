/// Smoke tests to verify the binary runs without panicking
use std::process::Command;

fn tracemap() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tracemap"))
}

#[test]
fn binary_shows_help() {
    let output = tracemap()
        .arg("--help")
        .output()
        .expect("Failed to execute tracemap");

    assert!(
        output.status.success(),
        "Binary failed to run --help: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tracemap"), "Help output should mention tracemap");
    assert!(stdout.contains("trace"), "Help output should list the trace command");
}

#[test]
fn binary_shows_version() {
    let output = tracemap()
        .arg("--version")
        .output()
        .expect("Failed to execute tracemap");

    assert!(
        output.status.success(),
        "Binary failed to run --version: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn invalid_subcommand_fails_gracefully() {
    let output = tracemap()
        .arg("nonexistent-command")
        .output()
        .expect("Failed to execute tracemap");

    // Should fail with error, not panic
    assert!(
        !output.status.success(),
        "Invalid subcommand should return error status"
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("panicked at"),
        "Invalid subcommand should not cause panic"
    );
}

#[test]
fn empty_target_is_rejected() {
    let output = tracemap()
        .args(["trace", "", "--no-locate"])
        .output()
        .expect("Failed to execute tracemap");

    assert!(!output.status.success(), "Empty target should return error status");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("panicked at"), "Empty target should not cause panic");
    assert!(stderr.contains("EmptyTarget"), "got: {stderr}");
}

#[test]
fn bad_numeric_flags_are_rejected() {
    for args in [
        ["trace", "example.com", "--no-locate", "--spread", "nan"],
        ["trace", "example.com", "--no-locate", "--spread", "inf"],
        ["trace", "example.com", "--no-locate", "--time", "inf"],
    ] {
        let output = tracemap()
            .args(args)
            .output()
            .expect("Failed to execute tracemap");

        assert!(!output.status.success(), "{args:?} should return error status");

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(!stderr.contains("panicked at"), "{args:?} should not cause panic");
        assert!(stderr.contains("Config"), "{args:?} got: {stderr}");
    }
}
