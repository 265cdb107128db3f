//! Tests for the fanlog-monitor command line.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::{
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

fn monitor() -> Command {
    Command::cargo_bin("fanlog-monitor").unwrap()
}

#[test]
fn no_arguments_is_an_error() {
    monitor()
        .assert()
        .failure()
        .stderr(predicate::str::contains("USAGE"));
}

#[test]
fn version_flag() {
    monitor()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_mentions_the_options() {
    monitor()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--logfilters")
                .and(predicate::str::contains("--logfile"))
                .and(predicate::str::contains("--bind")),
        );
}

#[test]
fn bad_filter_string_is_rejected() {
    monitor()
        .args(&["-l", "nonsense", "tcp://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("filter"));
}

#[test]
fn unsupported_scheme_exits_with_the_error_code() {
    let dir = tempfile::tempdir().unwrap();
    let logfile = dir.path().join("m.log");
    monitor()
        .args(&[
            "--bind",
            "--logfile",
            logfile.to_str().unwrap(),
            "ipc:///tmp/nope",
        ])
        .assert()
        .failure()
        .code(4);
}

#[cfg(unix)]
#[test]
fn sigterm_shuts_down_with_the_expected_status() {
    use std::os::unix::process::ExitStatusExt;

    let dir = tempfile::tempdir().unwrap();
    let logfile = dir.path().join("sig.log");

    // Bind an ephemeral port so nothing needs to be running remotely.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut child = monitor()
        .args(&[
            "--bind",
            "--logfile",
            logfile.to_str().unwrap(),
            &format!("tcp://127.0.0.1:{}", port),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // Give it time to install the signal bridge and enter the receive
    // loop, then terminate it.
    thread::sleep(Duration::from_millis(800));
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        match child.try_wait().unwrap() {
            Some(status) => break status,
            None => {
                assert!(
                    Instant::now() < deadline,
                    "monitor did not exit after SIGTERM"
                );
                thread::sleep(Duration::from_millis(50));
            }
        }
    };
    assert_eq!(status.signal(), Some(libc::SIGTERM));

    // The log file exists and holds only complete lines.
    let content = std::fs::read_to_string(&logfile).unwrap();
    assert!(content.is_empty() || content.ends_with('\n'));
}
