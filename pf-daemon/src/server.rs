//! Admin Unix-socket server
//!
//! Line-delimited JSON over a Unix domain socket, owner-only permissions.
//! Read-only inspection (dump) is answered by the engine loop over a
//! command channel so the loop stays the single writer of engine state;
//! override changes go straight into the configuration store and wake the
//! loop for an immediate reconciliation pass.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use pf_core::FanSpeed;
use pf_protocol::{Request, Response, ResponseData, MAX_MESSAGE_SIZE};

use crate::store::JsonStore;

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 16;

/// Read timeout per request line
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Time the engine loop gets to answer a dump request
const DUMP_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket permissions: owner only
const SOCKET_MODE: u32 = 0o600;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Requests the server forwards to the engine loop
#[derive(Debug)]
pub enum AdminCommand {
    Dump { reply: oneshot::Sender<String> },
}

#[derive(Clone)]
pub struct ServerContext {
    pub store: JsonStore,
    pub change_notify: Arc<Notify>,
    pub commands: mpsc::Sender<AdminCommand>,
}

pub async fn run_server(socket_path: &str, ctx: ServerContext) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    info!(socket = socket_path, "admin socket listening");

    loop {
        let (stream, _addr) = listener.accept().await?;

        if ACTIVE_CONNECTIONS.load(Ordering::SeqCst) >= MAX_CONNECTIONS {
            warn!("connection limit reached, rejecting admin client");
            continue;
        }

        let ctx = ctx.clone();
        tokio::spawn(async move {
            ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = handle_connection(stream, ctx).await {
                debug!(error = %e, "admin connection closed");
            }
            ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

/// Read one newline-terminated request without buffering more than
/// `max_len` bytes. Returns 0 at end of stream.
async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    use tokio::io::AsyncBufReadExt as _;

    out.clear();
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(total); // EOF
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                out.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                total += pos + 1;
                if out.len() > max_len {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "message too large",
                    ));
                }
                return Ok(total);
            }
            None => {
                out.extend_from_slice(available);
                let consumed = available.len();
                reader.consume(consumed);
                total += consumed;
                if out.len() > max_len {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "message too large",
                    ));
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: ServerContext) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::new();

    loop {
        let n = match timeout(
            READ_TIMEOUT,
            read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE),
        )
        .await
        {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                let response = Response::failure(e.to_string());
                let _ = send_response(&mut write_half, &response).await;
                return Ok(());
            }
            Err(_) => {
                debug!("admin client read timeout");
                return Ok(());
            }
        };
        if n == 0 {
            return Ok(()); // client hung up
        }

        let response = match serde_json::from_slice::<Request>(&line) {
            Ok(request) => handle_request(request, &ctx).await,
            Err(e) => Response::failure(format!("malformed request: {}", e)),
        };
        send_response(&mut write_half, &response).await?;
    }
}

async fn handle_request(request: Request, ctx: &ServerContext) -> Response {
    if let Err(e) = request.validate() {
        return Response::failure(e);
    }

    match request {
        Request::Ping => Response::success(Some(ResponseData::Pong)),
        Request::Version => Response::success(Some(ResponseData::Version(
            env!("CARGO_PKG_VERSION").to_string(),
        ))),
        Request::Dump => {
            let (reply, rx) = oneshot::channel();
            if ctx
                .commands
                .send(AdminCommand::Dump { reply })
                .await
                .is_err()
            {
                return Response::failure("engine unavailable");
            }
            match timeout(DUMP_TIMEOUT, rx).await {
                Ok(Ok(text)) => Response::success(Some(ResponseData::Dump(text))),
                _ => Response::failure("engine did not answer"),
            }
        }
        Request::SetOverride { subsystem, speed } => {
            // validate() already restricted the level names; "none" clears
            let level = FanSpeed::from_name(&speed);
            match ctx.store.set_override(&subsystem, level) {
                Ok(()) => {
                    info!(subsystem = %subsystem, speed = %speed, "override updated");
                    ctx.change_notify.notify_one();
                    Response::success(None)
                }
                Err(e) => Response::failure(e.to_string()),
            }
        }
    }
}

async fn send_response(
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    response: &Response,
) -> anyhow::Result<()> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    write_half.write_all(&payload).await?;
    write_half.flush().await?;
    Ok(())
}
