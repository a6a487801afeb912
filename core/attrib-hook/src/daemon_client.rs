//! Client helper for sending editor activity to the attribution daemon.
//!
//! The daemon owns all correlation state. The hook only builds envelopes,
//! validates them with the shared protocol types and delivers them with a
//! single retry.

use attrib_daemon_protocol::{
    EventEnvelope, EventType, Method, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use chrono::Utc;
use rand::RngCore;
use serde_json::Value;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

const ENABLE_ENV: &str = "ATTRIB_DAEMON_ENABLED";
const SOCKET_ENV: &str = "ATTRIB_DAEMON_SOCKET";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_MS: u64 = 600;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

pub fn send_log_line(line: &str) -> Result<(), String> {
    let line = line.to_string();
    send_activity(EventType::LogLine, "log line", move |envelope| {
        envelope.line = Some(line.clone());
    })
}

pub fn send_file_change(path: &str, change_kind: &str) -> Result<(), String> {
    let path = path.to_string();
    let change_kind = change_kind.to_string();
    send_activity(EventType::FileChange, "file change", move |envelope| {
        envelope.path = Some(path.clone());
        envelope.change_kind = Some(change_kind.clone());
    })
}

pub fn send_command_finished(name: &str, frames: &[String]) -> Result<(), String> {
    let name = name.to_string();
    let frames = frames.to_vec();
    send_activity(EventType::CommandFinished, "command", move |envelope| {
        envelope.command_name = Some(name.clone());
        if !frames.is_empty() {
            envelope.stack_frames = Some(frames.clone());
        }
    })
}

/// Returns the daemon's health payload.
pub fn daemon_health() -> Result<Value, String> {
    if !daemon_enabled() {
        return Err("Daemon disabled".to_string());
    }

    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method: Method::GetHealth,
        id: Some("health-check".to_string()),
        params: None,
    };

    let response = send_request(request)?;
    if !response.ok {
        return Err(response_error(response));
    }
    response
        .data
        .ok_or_else(|| "Daemon health response had no data".to_string())
}

pub fn daemon_enabled() -> bool {
    match env::var(ENABLE_ENV) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
        Err(_) => true,
    }
}

fn send_activity<F>(event_type: EventType, label: &str, fill: F) -> Result<(), String>
where
    F: Fn(&mut EventEnvelope),
{
    if !daemon_enabled() {
        return Err("Daemon disabled".to_string());
    }

    // Id and timestamp are fixed up front; the daemon drops an id it has
    // already applied, so a retry after a lost response is harmless.
    let event_id = make_event_id(std::process::id());
    let recorded_at = Utc::now().to_rfc3339();
    let build_envelope = || {
        let mut envelope = EventEnvelope::new(event_id.clone(), recorded_at.clone(), event_type);
        fill(&mut envelope);
        envelope
    };

    build_envelope()
        .validate()
        .map_err(|err| format!("{}: {}", err.code, err.message))?;

    send_event_with_retry(build_envelope, label)
}

fn socket_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".attrib").join(SOCKET_NAME))
}

fn send_event(event: EventEnvelope) -> Result<(), String> {
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method: Method::Event,
        id: Some(event.event_id.clone()),
        params: Some(
            serde_json::to_value(event)
                .map_err(|err| format!("Failed to serialize event: {}", err))?,
        ),
    };

    let response = send_request(request)?;
    if response.ok {
        Ok(())
    } else {
        Err(response_error(response))
    }
}

fn response_error(response: Response) -> String {
    response
        .error
        .map(|err| format!("{}: {}", err.code, err.message))
        .unwrap_or_else(|| "Unknown daemon error".to_string())
}

fn send_event_with_retry<F>(mut build: F, label: &str) -> Result<(), String>
where
    F: FnMut() -> EventEnvelope,
{
    match send_event(build()) {
        Ok(_) => Ok(()),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to send {} to daemon", label);
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            send_event(build()).map_err(|retry_err| {
                tracing::warn!(
                    error = %retry_err,
                    "Retry failed sending {} to daemon",
                    label
                );
                retry_err
            })
        }
    }
}

fn send_request(request: Request) -> Result<Response, String> {
    let socket = socket_path()?;
    let mut stream = UnixStream::connect(&socket)
        .map_err(|err| format!("Failed to connect to daemon socket: {}", err))?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    serde_json::to_writer(&mut stream, &request)
        .map_err(|err| format!("Failed to write request: {}", err))?;
    stream
        .write_all(b"\n")
        .map_err(|err| format!("Failed to flush request: {}", err))?;
    stream.flush().ok();

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err("Response exceeded maximum size".to_string());
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err("Timed out waiting for daemon response".to_string());
            }
            Err(err) => return Err(format!("Failed to read response: {}", err)),
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err("Daemon response was empty".to_string());
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| format!("Failed to parse response JSON: {}", err))
}

fn make_event_id(pid: u32) -> String {
    let mut random = rand::thread_rng();
    let rand = random.next_u64();
    format!("evt-{}-{}-{:x}", Utc::now().timestamp_millis(), pid, rand)
}
