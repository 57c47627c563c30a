//! End-to-end test of the `patchlog-index publish` subcommand, invoking the
//! real binary rather than calling `publish()` in-process.
//!
//! Grounded in `rattler_index/tests/test_cli.rs`'s `Command::cargo_bin`
//! pattern; `assert_cmd` isn't part of this workspace's dependency stack, so
//! the binary is located the same way
//! `frankenlibc-harness/tests/evidence_compliance_test.rs` does, via the
//! `CARGO_BIN_EXE_<name>` environment variable cargo sets for integration
//! tests in the same workspace.

use std::process::Command;

use patchlog_core::codec::JlapReader;

#[test]
fn publish_via_the_cli_writes_a_verifiable_jlap() {
    let dir = tempfile::TempDir::new().unwrap();
    let history_dir = dir.path().join("repodata-history");
    fs_err::create_dir(&history_dir).unwrap();
    fs_err::write(history_dir.join("0.json"), r#"{}"#).unwrap();
    fs_err::write(history_dir.join("1.json"), r#"{"a":1}"#).unwrap();

    let repodata_path = dir.path().join("repodata.json");
    fs_err::write(&repodata_path, r#"{"a":1}"#).unwrap();
    let store_path = dir.path().join("patches.db");

    let output = Command::new(env!("CARGO_BIN_EXE_patchlog-index"))
        .args([
            "publish",
            "--store",
            store_path.to_str().unwrap(),
            "--url",
            "https://example.org/repodata.json",
            "--repodata",
            repodata_path.to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let jlap_path = repodata_path.with_extension("jlap");
    let bytes = fs_err::read(&jlap_path).unwrap();
    let mut reader = JlapReader::new(std::io::BufReader::new(std::io::Cursor::new(bytes))).unwrap();
    let lines = reader.read_all_raw().unwrap();
    // One patch (0 -> 1) plus the trailing metadata line.
    assert_eq!(lines.len(), 2);
}
