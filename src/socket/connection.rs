//! Per-connection handler.
//!
//! Every request goes through the same gate, in order: frame size, payload
//! size, per-client rate limit, authentication. Only then is it dispatched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{verify_peer, AuthManager, PeerInfo, RateLimiter};
use crate::commands::{CommandParams, CommandRegistry, CommandResult, ExecutionContext};
use crate::config::Settings;
use crate::error::{CommandErrorKind, DaemonError, ProtocolErrorKind};
use crate::protocol::limits::MAX_REQUEST_FRAME_SIZE;
use crate::protocol::{
    read_message_with_timeout, validate_request_size, validate_response_size,
    write_message_with_timeout, Request, Response,
};

use super::ConnectionMetrics;

/// Handler timeout for operations the registry does not know.
const UNKNOWN_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state every connection handler works with.
pub struct ConnectionContext {
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub registry: Arc<CommandRegistry>,
    pub metrics: Arc<ConnectionMetrics>,
    /// Resolved peer UID allow-list.
    pub allowed_uids: Vec<u32>,
}

impl ConnectionContext {
    pub fn new(
        settings: Arc<Settings>,
        auth: Arc<AuthManager>,
        rate_limiter: Arc<RateLimiter>,
        registry: Arc<CommandRegistry>,
        metrics: Arc<ConnectionMetrics>,
    ) -> Self {
        let allowed_uids = settings.security.effective_peer_uids();
        Self {
            settings,
            auth,
            rate_limiter,
            registry,
            metrics,
            allowed_uids,
        }
    }

    fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.limits.socket_timeout_seconds)
    }
}

/// Handle a single client connection.
pub async fn handle_connection(
    stream: UnixStream,
    ctx: Arc<ConnectionContext>,
) -> Result<(), DaemonError> {
    let peer = verify_peer(&stream, &ctx.allowed_uids)?;
    debug!(uid = peer.uid, gid = peer.gid, pid = peer.pid, "Peer authenticated");

    let (mut reader, mut writer) = stream.into_split();

    loop {
        let result = process_request(&mut reader, &mut writer, &ctx, &peer).await;

        match result {
            Ok(()) => continue,
            Err(DaemonError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            }) => {
                debug!(uid = peer.uid, "Client disconnected");
                return Ok(());
            }
            Err(DaemonError::Protocol {
                kind: ProtocolErrorKind::ConnectionTimeout,
            }) => {
                warn!(uid = peer.uid, "Connection timed out");
                return Ok(());
            }
            Err(
                e @ DaemonError::Protocol {
                    kind: ProtocolErrorKind::InvalidMessageFormat { .. },
                },
            ) => {
                debug!(uid = peer.uid, error = %e, "Client hung up mid-frame");
                return Ok(());
            }
            Err(
                e @ DaemonError::Protocol {
                    kind: ProtocolErrorKind::MessageTooLarge { .. },
                },
            ) => {
                // The unread body leaves the stream out of sync
                warn!(uid = peer.uid, error = %e, "Oversized frame, closing connection");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Process a single request from the client.
async fn process_request<R, W>(
    reader: &mut R,
    writer: &mut W,
    ctx: &ConnectionContext,
    peer: &PeerInfo,
) -> Result<(), DaemonError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let socket_timeout = ctx.socket_timeout();
    let frame = match read_message_with_timeout(reader, MAX_REQUEST_FRAME_SIZE, socket_timeout).await
    {
        Ok(frame) => frame,
        Err(
            e @ DaemonError::Protocol {
                kind: ProtocolErrorKind::MessageTooLarge { .. },
            },
        ) => {
            let response = Response::error_with_id(&Uuid::new_v4().to_string(), &e);
            send_response(writer, ctx, &response, socket_timeout).await?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let request: Request = match serde_json::from_slice(&frame) {
        Ok(request) => request,
        Err(e) => {
            let err = DaemonError::Protocol {
                kind: ProtocolErrorKind::InvalidMessageFormat {
                    message: format!("Invalid JSON: {}", e),
                },
            };
            warn!(uid = peer.uid, error = %err, "Malformed request");
            let response = Response::error_with_id(&Uuid::new_v4().to_string(), &err);
            return send_response(writer, ctx, &response, socket_timeout).await;
        }
    };

    let request_id = if request.request_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        request.request_id.clone()
    };
    let start_time = Instant::now();

    info!(
        request_id = %request_id,
        operation = %request.operation,
        uid = peer.uid,
        "Received request"
    );

    let mut response = match admit(ctx, peer, &request) {
        Ok(()) => dispatch(ctx, peer, &request, &request_id).await,
        Err(e) => {
            warn!(
                request_id = %request_id,
                operation = %request.operation,
                uid = peer.uid,
                error = %e,
                "Request rejected"
            );
            Response::error_with_id(&request_id, &e)
        }
    };

    if let Err(e) = validate_response_size(&response) {
        error!(request_id = %request_id, error = %e, "Response exceeds size limit");
        response = Response::error_with_id(&request_id, &e);
    }

    if request.is_signed() {
        ctx.auth.sign_response(&mut response, Utc::now().timestamp());
    }

    debug!(
        request_id = %request_id,
        success = response.success,
        duration_ms = start_time.elapsed().as_millis() as u64,
        "Request finished"
    );

    send_response(writer, ctx, &response, socket_timeout).await
}

/// Size, rate and authentication checks, in that order.
fn admit(ctx: &ConnectionContext, peer: &PeerInfo, request: &Request) -> Result<(), DaemonError> {
    validate_request_size(request)?;

    let client_id = peer.client_id();
    if !ctx.rate_limiter.allow(&client_id) {
        return Err(DaemonError::RateLimited { client_id });
    }

    ctx.auth.validate_request_auth(request)
}

/// Run the operation on the blocking pool and turn its outcome into a response.
async fn dispatch(
    ctx: &ConnectionContext,
    peer: &PeerInfo,
    request: &Request,
    request_id: &str,
) -> Response {
    let params = match CommandParams::from_request(request) {
        Ok(params) => params,
        Err(e) => return Response::error_with_id(request_id, &e),
    };

    let operation = request.operation.as_str().to_string();
    let timeout = ctx
        .registry
        .get(&operation)
        .map(|command| command.timeout())
        .unwrap_or(UNKNOWN_COMMAND_TIMEOUT);

    let exec_ctx = ExecutionContext::for_request(request_id, peer.clone(), request);
    let registry = Arc::clone(&ctx.registry);
    let task_operation = operation.clone();
    let task = tokio::task::spawn_blocking(move || {
        registry.dispatch(&exec_ctx, &task_operation, params)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(result))) => {
            info!(
                request_id = %request_id,
                operation = %operation,
                success = result.success,
                "Command executed"
            );
            command_response(result, request_id)
        }
        Ok(Ok(Err(e))) => {
            warn!(
                request_id = %request_id,
                operation = %operation,
                error = %e,
                "Command failed"
            );
            Response::error_with_id(request_id, &e)
        }
        Ok(Err(e)) => {
            error!(
                request_id = %request_id,
                operation = %operation,
                error = %e,
                "Command task panicked"
            );
            Response::error("INTERNAL_ERROR", "Internal server error").with_request_id(request_id)
        }
        Err(_) => {
            let err = DaemonError::Command {
                kind: CommandErrorKind::Timeout {
                    timeout_secs: timeout.as_secs(),
                },
            };
            error!(
                request_id = %request_id,
                operation = %operation,
                timeout_secs = timeout.as_secs(),
                "Command timed out"
            );
            Response::error_with_id(request_id, &err)
        }
    }
}

fn command_response(result: CommandResult, request_id: &str) -> Response {
    let response = if result.success {
        match result.data {
            Some(data) => match Response::success(&data) {
                Ok(response) => response,
                Err(e) => return Response::error_with_id(request_id, &e),
            },
            None => Response::success_empty(),
        }
    } else {
        Response::error(
            result
                .error_code
                .unwrap_or_else(|| "COMMAND_ERROR".to_string()),
            result
                .error_message
                .unwrap_or_else(|| "Command execution failed".to_string()),
        )
    };
    response.with_request_id(request_id)
}

async fn send_response<W>(
    writer: &mut W,
    ctx: &ConnectionContext,
    response: &Response,
    socket_timeout: Duration,
) -> Result<(), DaemonError>
where
    W: AsyncWrite + Unpin,
{
    ctx.metrics.record_request(response.success);
    let bytes = serde_json::to_vec(response)?;
    write_message_with_timeout(writer, &bytes, socket_timeout).await
}
