use attrib_daemon_protocol::{EventEnvelope, EventType, Method, Request, PROTOCOL_VERSION};
use chrono::Utc;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

mod common;

use common::{
    can_bind_socket, send_request, socket_path, spawn_daemon, wait_for_socket, wait_until,
};

fn temp_home(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in("/tmp")
        .expect("Failed to create temp HOME")
}

/// Writes a fake `git-ai` that appends its first two arguments to `log`.
fn fake_git_ai(dir: &Path, log: &Path) -> PathBuf {
    let path = dir.join("git-ai");
    fs_err::write(
        &path,
        format!("#!/bin/sh\necho \"$1 $2\" >> '{}'\n", log.display()),
    )
    .expect("write fake git-ai");
    let mut permissions = fs_err::metadata(&path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    fs_err::set_permissions(&path, permissions).expect("chmod fake git-ai");
    path
}

fn write_config(home: &Path, binary: &Path, repo: &Path) {
    let dir = home.join(".attrib");
    fs_err::create_dir_all(&dir).expect("create config dir");
    fs_err::write(
        dir.join("config.toml"),
        format!(
            r#"
[timing]
ai_signal_window_ms = 1000
ai_grace_period_ms = 700
human_debounce_ms = 200

[sink]
binary = "{}"
timeout_ms = 2000
workspaces = ["{}"]
"#,
            binary.display(),
            repo.display()
        ),
    )
    .expect("write config");
}

fn send_event(socket: &Path, event: EventEnvelope) -> bool {
    let response = send_request(
        socket,
        Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::Event,
            id: Some(event.event_id.clone()),
            params: Some(serde_json::to_value(event).expect("serialize event")),
        },
    );
    response.ok
}

fn event(id: &str, event_type: EventType) -> EventEnvelope {
    EventEnvelope::new(id, Utc::now().to_rfc3339(), event_type)
}

fn read_calls(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn daemon_ipc_health_smoke() {
    let home = temp_home("attrib-daemon-health");
    if !can_bind_socket(home.path()) {
        eprintln!("Skipping health smoke test: unix socket binding not permitted.");
        return;
    }
    let socket = socket_path(home.path());
    let _guard = spawn_daemon(home.path());
    wait_for_socket(&socket, Duration::from_secs(5));

    let health = send_request(
        &socket,
        Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::GetHealth,
            id: Some("health-check".to_string()),
            params: None,
        },
    );

    assert!(health.ok, "health response was not ok");
    let data = health.data.expect("health payload");
    assert_eq!(data["status"], "ok");
    assert_eq!(data["protocol_version"], PROTOCOL_VERSION);
    assert_eq!(data["timing"]["ai_signal_window_ms"], 2000);
    assert_eq!(data["checkpoints"]["ai_checkpoints"], 0);
}

#[test]
fn daemon_attributes_agent_edit_then_human_edit() {
    let home = temp_home("attrib-daemon-flow");
    if !can_bind_socket(home.path()) {
        eprintln!("Skipping attribution smoke test: unix socket binding not permitted.");
        return;
    }
    let repo = home.path().join("repo");
    fs_err::create_dir_all(repo.join("src")).expect("create repo");
    let log = home.path().join("calls.log");
    let binary = fake_git_ai(home.path(), &log);
    write_config(home.path(), &binary, &repo);

    let socket = socket_path(home.path());
    let _guard = spawn_daemon(home.path());
    wait_for_socket(&socket, Duration::from_secs(5));

    let edited = repo.join("src/lib.rs").to_string_lossy().to_string();

    let mut signal = event("evt-log-1", EventType::LogLine);
    signal.line = Some(format!(
        "INFO ToolUseEvent fsReplace {{\"path\": \"{}\"}}",
        edited
    ));
    assert!(send_event(&socket, signal));

    let mut change = event("evt-file-1", EventType::FileChange);
    change.path = Some(edited.clone());
    change.change_kind = Some("content".to_string());
    assert!(send_event(&socket, change));

    assert!(
        wait_until(Duration::from_secs(3), || !read_calls(&log).is_empty()),
        "agent checkpoint never reached git-ai"
    );
    assert_eq!(read_calls(&log), vec!["checkpoint agent-v1".to_string()]);

    // Let the signal window and grace period lapse before typing.
    sleep(Duration::from_millis(1200));
    let mut typed = event("evt-cmd-1", EventType::CommandFinished);
    typed.command_name = Some("Typing".to_string());
    typed.stack_frames = Some(vec!["com.intellij.openapi.editor.impl.EditorImpl".to_string()]);
    assert!(send_event(&socket, typed));

    assert!(
        wait_until(Duration::from_secs(3), || read_calls(&log).len() == 2),
        "human checkpoint never reached git-ai"
    );
    assert_eq!(read_calls(&log)[1], "checkpoint ");

    let checkpoints = || {
        send_request(
            &socket,
            Request {
                protocol_version: PROTOCOL_VERSION,
                method: Method::GetHealth,
                id: None,
                params: None,
            },
        )
        .data
        .map(|data| data["checkpoints"].clone())
        .unwrap_or_default()
    };
    assert!(
        wait_until(Duration::from_secs(2), || checkpoints()["human_checkpoints"] == 1),
        "ledger never saw the human checkpoint"
    );
    let ledger = checkpoints();
    assert_eq!(ledger["ai_checkpoints"], 1);
    assert_eq!(ledger["log_lines"], 1);
    assert_eq!(ledger["commands_forwarded"], 1);
}
