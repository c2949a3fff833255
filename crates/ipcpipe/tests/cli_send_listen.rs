#![cfg(all(unix, feature = "cli"))]

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

const CAPACITY: &str = "65536";

fn unique_channel(tag: &str) -> String {
    format!(
        "cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    )
}

fn ipcpipe(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ipcpipe"));
    cmd.env("IPCPIPE_PATH", dir)
        .env("IPCPIPE_CAPACITY", CAPACITY)
        .arg("--log-level")
        .arg("error");
    cmd
}

fn send(dir: &Path, channel: &str, extra: &[&str]) -> Output {
    ipcpipe(dir)
        .args(["--format", "json", "send", channel])
        .args(extra)
        .output()
        .expect("send should run")
}

#[test]
fn sent_message_is_listened_later() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let channel = unique_channel("later");

    let sent = send(dir.path(), &channel, &["--name", "greet", "--text", "hi"]);
    assert!(sent.status.success(), "send failed: {sent:?}");
    let stdout = String::from_utf8_lossy(&sent.stdout);
    assert!(stdout.contains("\"delivered\":true"));

    let heard = ipcpipe(dir.path())
        .args(["--format", "json", "listen", &channel, "--count", "1", "--timeout", "5s"])
        .output()
        .expect("listen should run");
    assert!(heard.status.success(), "listen failed: {heard:?}");

    let line = String::from_utf8_lossy(&heard.stdout);
    let message: serde_json::Value =
        serde_json::from_str(line.trim()).expect("listen output should be json");
    assert_eq!(message["seq"], 0);
    assert_eq!(message["name"], "greet");
    assert_eq!(message["value"], "hi");
}

fn listen_json(dir: &Path, channel: &str, count: &str) -> Vec<serde_json::Value> {
    let heard = ipcpipe(dir)
        .args(["--format", "json", "listen", channel, "--count", count, "--timeout", "5s"])
        .output()
        .expect("listen should run");
    assert!(heard.status.success(), "listen failed: {heard:?}");
    String::from_utf8_lossy(&heard.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("listen output should be json"))
        .collect()
}

#[test]
fn counted_listen_leaves_later_messages_queued() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let channel = unique_channel("backlog");
    for i in 0..5 {
        let value = i.to_string();
        let sent = send(dir.path(), &channel, &["--name", "n", "--int", &value]);
        assert!(sent.status.success(), "send failed: {sent:?}");
    }

    let first = listen_json(dir.path(), &channel, "1");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0]["seq"], 0);
    assert_eq!(first[0]["value"], 0);

    let rest = listen_json(dir.path(), &channel, "4");
    let values: Vec<i64> = rest.iter().map(|m| m["value"].as_i64().unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
    assert_eq!(rest[0]["seq"], 0);
}

#[test]
fn running_listener_prints_messages_in_order() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let channel = unique_channel("order");

    let listener = ipcpipe(dir.path())
        .args(["--format", "pretty", "listen", &channel, "--count", "2", "--timeout", "10s"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen should start");

    thread::sleep(Duration::from_millis(300));
    assert!(send(dir.path(), &channel, &["--name", "first", "--int", "1"]).status.success());
    assert!(send(dir.path(), &channel, &["--name", "second", "--bool", "true"]).status.success());

    let output = listener.wait_with_output().expect("listener should exit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("#0 ") && lines[0].contains("name=first"));
    assert!(lines[0].ends_with("value=1"));
    assert!(lines[1].starts_with("#1 ") && lines[1].contains("name=second"));
    assert!(lines[1].ends_with("value=true"));
}

#[test]
fn discard_past_times_out_on_old_messages() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let channel = unique_channel("past");

    assert!(send(dir.path(), &channel, &["--name", "old", "--long", "7"]).status.success());

    let heard = ipcpipe(dir.path())
        .args([
            "listen",
            &channel,
            "--discard-past",
            "--count",
            "1",
            "--timeout",
            "500ms",
        ])
        .output()
        .expect("listen should run");
    assert_eq!(heard.status.code(), Some(124));
    assert!(heard.stdout.is_empty());
}

#[test]
fn invalid_hex_is_usage_error() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let out = send(dir.path(), &unique_channel("hex"), &["--bytes-hex", "zz"]);
    assert_eq!(out.status.code(), Some(64));
}

#[test]
fn capacity_mismatch_is_transport_error() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let channel = unique_channel("capacity");
    assert!(send(dir.path(), &channel, &["--text", "x"]).status.success());

    let out = ipcpipe(dir.path())
        .args(["send", &channel, "--capacity", "131072", "--text", "y"])
        .output()
        .expect("send should run");
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn version_prints_package_version() {
    let out = Command::new(env!("CARGO_BIN_EXE_ipcpipe"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("ipcpipe "));
}
