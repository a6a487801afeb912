//! Attribution daemon entrypoint.
//!
//! Hosts the single correlation coordinator for this machine. Editor
//! integrations stream log lines, file changes and finished commands over a
//! local socket; the coordinator turns them into `git-ai` checkpoints.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use attrib_core::{load_config, AttribConfig, CheckpointRecord, Coordinator, GitAiSink};
use attrib_daemon_protocol::{
    parse_event, ErrorInfo, Method, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

mod state;

use state::{CheckpointLedger, LedgerObserver, SharedState};

const SOCKET_NAME: &str = "daemon.sock";
const SOCKET_ENV: &str = "ATTRIB_DAEMON_SOCKET";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

/// Logs every dispatched checkpoint so widget refreshes can be traced.
struct RefreshLogger;

impl attrib_core::CheckpointObserver for RefreshLogger {
    fn checkpoint_recorded(&self, record: &CheckpointRecord) {
        info!(
            kind = ?record.kind,
            file = ?record.file_path,
            succeeded = record.succeeded,
            "Checkpoint recorded"
        );
    }
}

fn main() {
    init_logging();

    let config = match load_config(None) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config; using defaults");
            AttribConfig::default()
        }
    };

    let socket_path = match daemon_socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    let sink = GitAiSink::from_config(&config);
    info!(
        binary = %sink.binary().display(),
        workspaces = sink.workspaces().len(),
        "Checkpoint sink configured"
    );

    let ledger = Arc::new(CheckpointLedger::default());
    let coordinator = match Coordinator::spawn(
        config.timing,
        Box::new(sink),
        vec![
            Box::new(LedgerObserver(Arc::clone(&ledger))),
            Box::new(RefreshLogger),
        ],
    ) {
        Ok(coordinator) => coordinator,
        Err(err) => {
            error!(error = %err, "Failed to start coordinator");
            std::process::exit(1);
        }
    };

    let shared_state = Arc::new(SharedState::new(&config, coordinator.handle(), ledger));
    let timing = config.timing;

    info!(
        path = %socket_path.display(),
        ai_signal_window_ms = timing.ai_signal_window_ms,
        ai_grace_period_ms = timing.ai_grace_period_ms,
        human_debounce_ms = timing.human_debounce_ms,
        "Attribution daemon started"
    );

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&shared_state);
                thread::spawn(move || handle_connection(stream, state, timing));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }

    coordinator.shutdown();
}

fn init_logging() {
    let debug_enabled = env::var("ATTRIB_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn daemon_socket_path() -> Result<PathBuf, String> {
    if let Ok(value) = env::var(SOCKET_ENV) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".attrib").join(SOCKET_NAME))
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(
    mut stream: UnixStream,
    state: Arc<SharedState>,
    timing: attrib_core::TimingConfig,
) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state, timing);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
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
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(
    request: Request,
    state: &SharedState,
    timing: attrib_core::TimingConfig,
) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => {
            let mut data = serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "timing": {
                    "ai_signal_window_ms": timing.ai_signal_window_ms,
                    "ai_grace_period_ms": timing.ai_grace_period_ms,
                    "human_debounce_ms": timing.human_debounce_ms,
                },
            });
            if let Ok(value) = serde_json::to_value(state.ledger_snapshot()) {
                data["checkpoints"] = value;
            }
            Response::ok(request.id, data)
        }
        Method::Event => handle_event(request, state),
    }
}

fn handle_event(request: Request, state: &SharedState) -> Response {
    let params = match request.params {
        Some(params) => params,
        None => return Response::error(request.id, "invalid_params", "event payload is required"),
    };

    let event = match parse_event(params) {
        Ok(event) => event,
        Err(err) => return Response::error_with_info(request.id, err),
    };

    tracing::debug!(
        event_id = %event.event_id,
        event_type = ?event.event_type,
        path = ?event.path,
        command = ?event.command_name,
        "Received event"
    );

    let applied = state.update_from_event(&event);

    Response::ok(
        request.id,
        serde_json::json!({"accepted": true, "duplicate": !applied}),
    )
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
