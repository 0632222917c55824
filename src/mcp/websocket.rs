use actix::fut::{ActorFutureExt, WrapFuture};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::http::header;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::dispatch::Dispatcher;
use super::error::AuthError;
use super::protocol::ServerMessage;
use super::session::{Session, SessionManager};

/// WebSocket heartbeat interval
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Client timeout - close connection if no heartbeat received
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One authenticated connection
pub struct McpWebSocket {
    session: Arc<Session>,
    sessions: Arc<SessionManager>,
    dispatcher: Arc<Dispatcher>,
    hb: Instant,
}

impl McpWebSocket {
    pub fn new(
        session: Arc<Session>,
        sessions: Arc<SessionManager>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            session,
            sessions,
            dispatcher,
            hb: Instant::now(),
        }
    }

    /// Start heartbeat process to check connection health
    fn hb(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(session_id = %act.session.id, "MCP WebSocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    fn send(&self, ctx: &mut <Self as Actor>::Context, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(text) => {
                tracing::debug!(
                    session_id = %self.session.id,
                    kind = message.kind(),
                    request_id = ?message.request_id(),
                    "Sending MCP message"
                );
                ctx.text(text);
            }
            Err(e) => {
                tracing::error!(session_id = %self.session.id, error = %e, "Failed to encode MCP message");
            }
        }
    }
}

impl Actor for McpWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(session_id = %self.session.id, "MCP WebSocket connection started");
        let init = self.sessions.init_message(&self.session);
        self.send(ctx, &init);
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(session_id = %self.session.id, "MCP WebSocket connection closed");
        self.sessions.close_session(&self.session.id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for McpWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                let dispatcher = self.dispatcher.clone();
                let session = self.session.clone();
                let fut = async move { dispatcher.dispatch(&text, &session).await };

                // `wait` holds back the next frame until this one is answered
                ctx.wait(fut.into_actor(self).map(|response, act, ctx| {
                    act.hb = Instant::now();
                    act.send(ctx, &response);
                }));
            }
            Ok(ws::Message::Binary(bytes)) => {
                tracing::warn!(session_id = %self.session.id, "Binary messages not supported in MCP protocol");
                let response = self.dispatcher.reject_binary(&self.session, bytes.len());
                self.send(ctx, &response);
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(session_id = %self.session.id, "MCP WebSocket close received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session.id, error = %e, "MCP WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Upgraded socket whose bearer check failed. It closes with a policy
/// violation right away and never owns a session.
struct RejectedConnection {
    reason: AuthError,
}

impl Actor for RejectedConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: Some(self.reason.to_string()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RejectedConnection {
    fn handle(&mut self, _msg: Result<ws::Message, ws::ProtocolError>, _ctx: &mut Self::Context) {}
}

/// Bearer token from the `Authorization` header, else the `token` query parameter
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim().to_string());

    from_header.or_else(|| {
        web::Query::<HashMap<String, String>>::from_query(req.query_string())
            .ok()
            .and_then(|query| query.get("token").cloned())
    })
}

/// WebSocket route handler - entry point for MCP connections
#[tracing::instrument(
    name = "MCP WebSocket connection",
    skip(req, stream, sessions, dispatcher),
    fields(peer = ?req.peer_addr())
)]
pub async fn mcp_websocket(
    req: HttpRequest,
    stream: web::Payload,
    sessions: web::Data<SessionManager>,
    dispatcher: web::Data<Dispatcher>,
) -> Result<HttpResponse, Error> {
    if let Err(reason) = sessions.authenticate(bearer_token(&req).as_deref()) {
        tracing::warn!(error = %reason, "Rejecting MCP WebSocket connection");
        return ws::start(RejectedConnection { reason }, &req, stream);
    }

    let session = sessions.create_session().map_err(|e| {
        tracing::error!(error = %e, "Failed to create session");
        actix_web::error::ErrorInternalServerError(e)
    })?;
    let session_id = session.id.clone();
    let sessions = sessions.into_inner();

    let ws = McpWebSocket::new(session, sessions.clone(), dispatcher.into_inner());
    ws::start(ws, &req, stream).map_err(|e| {
        sessions.close_session(&session_id);
        e
    })
}
