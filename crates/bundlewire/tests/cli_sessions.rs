#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use bundlewire::channel::{FifoPair, StreamChannel};
use bundlewire::frame::{FramedTransport, Message};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "bwcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn bundlewire() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bundlewire"));
    cmd.env_remove("BUNDLEWIRE_INBOUND")
        .env_remove("BUNDLEWIRE_OUTBOUND")
        .arg("--log-level")
        .arg("off");
    cmd
}

/// Parent side of a named-pipe session, running in its own process.
fn spawn_serve(dir: &Path, responder: &[&str]) -> Child {
    bundlewire()
        .arg("--format")
        .arg("json")
        .arg("serve")
        .arg("--inbound")
        .arg(dir.join(".from.fifo"))
        .arg("--outbound")
        .arg(dir.join(".to.fifo"))
        .arg("--connect-timeout")
        .arg("10s")
        .args(responder)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve should start")
}

fn ask_over_pipes(dir: &Path, format: &str, payload: &str) -> std::process::Output {
    bundlewire()
        .arg("--format")
        .arg(format)
        .arg("ask")
        .arg("--inbound")
        .arg(dir.join(".to.fifo"))
        .arg("--outbound")
        .arg(dir.join(".from.fifo"))
        .arg("--connect-timeout")
        .arg("10s")
        .arg(payload)
        .output()
        .expect("ask should run")
}

#[test]
fn ask_over_stdio_prints_reply_to_stderr() {
    let mut child = bundlewire()
        .arg("--format")
        .arg("raw")
        .arg("ask")
        .arg("--stdio")
        .arg("get_protocol")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("ask should start");

    let reader = child.stdout.take().expect("stdout should be piped");
    let writer = child.stdin.take().expect("stdin should be piped");
    let mut parent = FramedTransport::new(StreamChannel::new(reader, writer));
    let summary = parent
        .serve(|request| {
            assert_eq!(request.as_str().unwrap(), "get_protocol");
            Message::from("protocol-v1")
        })
        .expect("parent should serve until the helper exits");
    assert_eq!(summary.requests, 1);

    let output = child.wait_with_output().expect("ask should exit");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stderr), "protocol-v1");
}

#[test]
fn mkfifo_creates_both_pipes() {
    let dir = unique_temp_dir("mkfifo");

    let output = bundlewire()
        .arg("--format")
        .arg("json")
        .arg("mkfifo")
        .arg(&dir)
        .output()
        .expect("mkfifo should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("mkfifo should print JSON");
    assert_eq!(report["mode"], "600");

    use std::os::unix::fs::FileTypeExt;
    for name in [".to.fifo", ".from.fifo"] {
        let metadata = std::fs::metadata(dir.join(name)).expect("pipe should exist");
        assert!(metadata.file_type().is_fifo());
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn ask_and_serve_over_named_pipes() {
    let dir = unique_temp_dir("roundtrip");
    let pair = FifoPair::create(&dir).expect("pipes should be creatable");

    let serve = spawn_serve(&dir, &["--prefix", "response to "]);
    let output = ask_over_pipes(&dir, "raw", "py:ge mig commando1");

    assert!(
        output.status.success(),
        "ask failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "response to py:ge mig commando1"
    );

    let served = serve.wait_with_output().expect("serve should exit");
    assert!(served.status.success());
    let summary: serde_json::Value =
        serde_json::from_slice(&served.stdout).expect("serve should print JSON");
    assert_eq!(summary["requests"], 1);

    drop(pair);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_answers_commands_from_fixture() {
    let dir = unique_temp_dir("commands");
    let pair = FifoPair::create(&dir).expect("pipes should be creatable");
    let fixture = dir.join("fixture.json");
    std::fs::write(
        &fixture,
        r#"{"settings": {"app_bundle_name": "App", "create_app_bundle": true, "search_paths": []}}"#,
    )
    .unwrap();

    let commands = fixture.to_string_lossy().into_owned();
    let serve = spawn_serve(&dir, &["--commands", &commands]);
    let output = ask_over_pipes(&dir, "json", "all_settings");

    assert!(
        output.status.success(),
        "ask failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("ask should print JSON");
    assert_eq!(report["transport"], "named-pipe");
    assert_eq!(report["reply"]["app_bundle_name"], "App");
    assert_eq!(report["reply"]["create_app_bundle"], true);

    assert!(serve.wait_with_output().expect("serve should exit").status.success());

    drop(pair);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn regular_file_endpoint_is_usage_error() {
    let dir = unique_temp_dir("notapipe");
    let inbound = dir.join("plain.txt");
    std::fs::write(&inbound, b"not a pipe").unwrap();

    let output = bundlewire()
        .arg("ask")
        .arg("--inbound")
        .arg(&inbound)
        .arg("--outbound")
        .arg(dir.join("missing.fifo"))
        .arg("all_settings")
        .output()
        .expect("ask should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a named pipe"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn absent_parent_times_out_with_124() {
    let dir = unique_temp_dir("nopeer");
    let pair = FifoPair::create(&dir).expect("pipes should be creatable");

    let output = bundlewire()
        .arg("ask")
        .arg("--inbound")
        .arg(dir.join(".to.fifo"))
        .arg("--outbound")
        .arg(dir.join(".from.fifo"))
        .arg("--connect-timeout")
        .arg("400ms")
        .arg("all_settings")
        .output()
        .expect("ask should run");

    assert_eq!(output.status.code(), Some(124));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no peer attached"));

    drop(pair);
    let _ = std::fs::remove_dir_all(&dir);
}

fn interrupt(child: &Child) {
    let status = Command::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());
}

#[test]
fn interrupt_while_waiting_for_helper_stops_serve_cleanly() {
    let dir = unique_temp_dir("sigint");
    let pair = FifoPair::create(&dir).expect("pipes should be creatable");

    let started = std::time::Instant::now();
    let serve = spawn_serve(&dir, &["--echo"]);
    // Give the process time to install its handler and start waiting.
    std::thread::sleep(std::time::Duration::from_millis(1000));
    interrupt(&serve);

    let served = serve.wait_with_output().expect("serve should exit");
    assert!(
        served.status.success(),
        "serve failed: {}",
        String::from_utf8_lossy(&served.stderr)
    );
    assert!(started.elapsed() < std::time::Duration::from_secs(8));
    let summary: serde_json::Value =
        serde_json::from_slice(&served.stdout).expect("serve should print JSON");
    assert_eq!(summary["requests"], 0);

    drop(pair);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_name() {
    let output = bundlewire()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("bundlewire "));
}
