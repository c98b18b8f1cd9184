//! # HTTP Transport
//!
//! Exposes a [`Dispatcher`] over plain HTTP/JSON using `tiny_http`.
//!
//! ```text
//!     POST /comando  {"comando": "primary"}  ──► Dispatcher::handle
//!     GET  /ping                             ──► liveness + stats + queue depth
//!     GET  /stats                            ──► uptime, rates, health
//!     POST /reset                            ──► zero the counters
//! ```
//!
//! A fixed set of handler threads share one listener. Each thread polls with
//! `recv_timeout` so a shutdown flag is noticed within one poll interval.
//! Routing is the pure [`route`] function so it can be exercised without sockets.

use crate::relay::{Dispatcher, HealthStatus, Outcome, ServerError, StatsSnapshot};
use crate::relay::unix_timestamp;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

/// How long a handler thread waits for a request before re-checking shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Request bodies larger than this are truncated before parsing.
const MAX_BODY_BYTES: u64 = 4 * 1024;

/// Headers attached to every response.
const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// A routed response: status code plus serialized JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// JSON body, empty for 204.
    pub body: String,
}

impl Reply {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        let body = serde_json::to_string(body)
            .unwrap_or_else(|_| r#"{"status":"error","message":"serialization failed"}"#.to_string());
        Self { status, body }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(
            status,
            &CommandReply {
                status: "error",
                message: Some(message.to_string()),
                ..CommandReply::default()
            },
        )
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: String::new(),
        }
    }

    fn into_response(self) -> Response<std::io::Cursor<Vec<u8>>> {
        let mut response = Response::from_string(self.body).with_status_code(self.status);
        for (name, value) in RESPONSE_HEADERS {
            if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                response.add_header(header);
            }
        }
        response
    }
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    comando: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct CommandReply {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    accion: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct PingReply {
    status: &'static str,
    tiempo: f64,
    stats: StatsSnapshot,
    queue_size: usize,
    active_workers: usize,
}

#[derive(Debug, Serialize)]
struct StatsReply {
    uptime_seconds: f64,
    stats: StatsSnapshot,
    current_queue_size: usize,
    active_workers: usize,
    worker_threads: usize,
    requests_per_second: f64,
    success_rate: f64,
    health: HealthStatus,
}

/// Maps an [`Outcome`] to its HTTP reply.
pub fn outcome_reply(outcome: &Outcome) -> Reply {
    let (status, reply) = match outcome {
        Outcome::Accepted {
            command,
            method,
            timestamp,
        } => (
            200,
            CommandReply {
                status: "ok",
                accion: Some(command.as_str()),
                timestamp: Some(*timestamp),
                method: Some(method.as_str()),
                message: None,
            },
        ),
        Outcome::Throttled => (200, CommandReply { status: "throttled", ..Default::default() }),
        Outcome::RateLimited => (200, CommandReply { status: "rate_limited", ..Default::default() }),
        Outcome::Busy => (200, CommandReply { status: "busy", ..Default::default() }),
        Outcome::InvalidCommand(err) => (
            400,
            CommandReply {
                status: "comando_no_reconocido",
                message: Some(err.to_string()),
                ..Default::default()
            },
        ),
        Outcome::Malformed(reason) => (
            400,
            CommandReply {
                status: "error",
                message: Some(reason.clone()),
                ..Default::default()
            },
        ),
    };
    Reply::json(status, &reply)
}

fn handle_command(dispatcher: &Dispatcher, body: &[u8]) -> Reply {
    let outcome = match serde_json::from_slice::<CommandRequest>(body) {
        Ok(CommandRequest { comando: Some(raw) }) => dispatcher.handle(&raw),
        Ok(CommandRequest { comando: None }) => dispatcher.reject_malformed("No comando"),
        Err(err) if body.is_empty() => {
            debug!("Empty body: {}", err);
            dispatcher.reject_malformed("No JSON data")
        }
        Err(err) => dispatcher.reject_malformed(format!("Invalid JSON: {}", err)),
    };
    outcome_reply(&outcome)
}

/// Routes one request. `path` must already have its query string removed.
pub fn route(dispatcher: &Dispatcher, method: &Method, path: &str, body: &[u8]) -> Reply {
    match (method, path) {
        (Method::Options, _) => Reply::no_content(),
        (Method::Post, "/comando") => handle_command(dispatcher, body),
        (Method::Get, "/ping") => Reply::json(
            200,
            &PingReply {
                status: "servidor_activo",
                tiempo: unix_timestamp(),
                stats: dispatcher.stats(),
                queue_size: dispatcher.queue_depth(),
                active_workers: dispatcher.active_workers(),
            },
        ),
        (Method::Get, "/stats") => {
            let stats = dispatcher.stats();
            let uptime = dispatcher.uptime();
            Reply::json(
                200,
                &StatsReply {
                    uptime_seconds: uptime.as_secs_f64(),
                    stats,
                    current_queue_size: dispatcher.queue_depth(),
                    active_workers: dispatcher.active_workers(),
                    worker_threads: dispatcher.worker_threads(),
                    requests_per_second: stats.requests_per_second(uptime),
                    success_rate: stats.success_rate(),
                    health: stats.health_status(),
                },
            )
        }
        (Method::Post, "/reset") => {
            dispatcher.reset_stats();
            Reply::json(
                200,
                &CommandReply {
                    status: "stats_reset",
                    ..Default::default()
                },
            )
        }
        (_, "/comando" | "/ping" | "/stats" | "/reset") => Reply::error(405, "method not allowed"),
        _ => Reply::error(404, "not found"),
    }
}

/// HTTP front end for a [`Dispatcher`].
///
/// # Example
///
/// ```rust,no_run
/// use keyrelay::{Dispatcher, DryRunExecutor, RelayConfig, RelayServer};
/// use std::sync::atomic::AtomicBool;
/// use std::sync::Arc;
///
/// let dispatcher = Arc::new(Dispatcher::new(RelayConfig::default(), Arc::new(DryRunExecutor))?);
/// dispatcher.start()?;
///
/// let shutdown = Arc::new(AtomicBool::new(false));
/// let server = RelayServer::bind("127.0.0.1:5000", dispatcher, shutdown)?;
/// server.run(8)?; // returns once `shutdown` is set
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RelayServer {
    server: Arc<Server>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<AtomicBool>,
}

impl RelayServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub fn bind(
        addr: &str,
        dispatcher: Arc<Dispatcher>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, ServerError> {
        let server = Server::http(addr).map_err(|err| ServerError::Bind {
            addr: addr.to_string(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            server: Arc::new(server),
            dispatcher,
            shutdown,
        })
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serves requests on `handler_threads` threads until the shutdown flag is set.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if a handler thread cannot be spawned.
    pub fn run(&self, handler_threads: usize) -> Result<(), ServerError> {
        let threads = handler_threads.max(1);
        if let Some(addr) = self.local_addr() {
            info!("Listening on http://{} ({} handler threads)", addr, threads);
        }

        let mut handles = Vec::with_capacity(threads);
        for id in 0..threads {
            let server = self.server.clone();
            let dispatcher = self.dispatcher.clone();
            let shutdown = self.shutdown.clone();

            let spawned = thread::Builder::new()
                .name(format!("keyrelay-http-{}", id))
                .spawn(move || serve(&server, &dispatcher, &shutdown));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    self.shutdown.store(true, Ordering::Release);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(ServerError::Io(err));
                }
            }
        }

        for handle in handles {
            if handle.join().is_err() {
                warn!("HTTP handler thread panicked");
            }
        }
        info!("HTTP server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("local_addr", &self.local_addr())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

fn serve(server: &Server, dispatcher: &Dispatcher, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Acquire) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => respond(dispatcher, request),
            Ok(None) => {}
            Err(err) => warn!("Failed to receive request: {}", err),
        }
    }
}

fn respond(dispatcher: &Dispatcher, mut request: Request) {
    let mut body = Vec::new();
    if let Err(err) = request.as_reader().take(MAX_BODY_BYTES).read_to_end(&mut body) {
        debug!("Failed to read request body: {}", err);
        body.clear();
    }

    let method = request.method().clone();
    let path = request.url().split('?').next().unwrap_or("/").to_string();
    let reply = route(dispatcher, &method, &path, &body);
    debug!("{} {} -> {}", method, path, reply.status);

    if let Err(err) = request.respond(reply.into_response()) {
        debug!("Client went away before the response was written: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{DryRunExecutor, RelayConfig};
    use serde_json::Value;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(RelayConfig::default(), Arc::new(DryRunExecutor)).unwrap()
    }

    fn json(reply: &Reply) -> Value {
        serde_json::from_str(&reply.body).unwrap()
    }

    #[test]
    fn test_command_ok() {
        let dispatcher = dispatcher();
        let reply = route(&dispatcher, &Method::Post, "/comando", br#"{"comando":"saltar"}"#);

        assert_eq!(reply.status, 200);
        let body = json(&reply);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["accion"], "primary");
        assert_eq!(body["method"], "direct");
        assert!(body["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_command_throttled() {
        let dispatcher = dispatcher();
        route(&dispatcher, &Method::Post, "/comando", br#"{"comando":"primary"}"#);
        let reply = route(&dispatcher, &Method::Post, "/comando", br#"{"comando":"primary"}"#);

        assert_eq!(reply.status, 200);
        let body = json(&reply);
        assert_eq!(body["status"], "throttled");
        assert!(body.get("accion").is_none());
    }

    #[test]
    fn test_unknown_command() {
        let dispatcher = dispatcher();
        let reply = route(&dispatcher, &Method::Post, "/comando", br#"{"comando":"jump"}"#);

        assert_eq!(reply.status, 400);
        assert_eq!(json(&reply)["status"], "comando_no_reconocido");
        assert_eq!(dispatcher.stats().errors, 1);
    }

    #[test]
    fn test_malformed_bodies() {
        let dispatcher = dispatcher();

        let bodies: [&[u8]; 4] = [b"", b"not json", br#"{"other":1}"#, br#"{"comando":7}"#];
        for body in bodies {
            let reply = route(&dispatcher, &Method::Post, "/comando", body);
            assert_eq!(reply.status, 400);
            assert_eq!(json(&reply)["status"], "error");
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.errors, 4);
    }

    #[test]
    fn test_outcome_statuses() {
        assert_eq!(json(&outcome_reply(&Outcome::RateLimited))["status"], "rate_limited");
        assert_eq!(json(&outcome_reply(&Outcome::Busy))["status"], "busy");
        assert_eq!(outcome_reply(&Outcome::Busy).status, 200);
    }

    #[test]
    fn test_ping_and_stats() {
        let dispatcher = dispatcher();
        route(&dispatcher, &Method::Post, "/comando", br#"{"comando":"secondary"}"#);

        let ping = json(&route(&dispatcher, &Method::Get, "/ping", b""));
        assert_eq!(ping["status"], "servidor_activo");
        assert_eq!(ping["stats"]["total_requests"], 1);
        assert_eq!(ping["queue_size"], 0);

        let stats = json(&route(&dispatcher, &Method::Get, "/stats", b""));
        assert_eq!(stats["stats"]["successful_actions"], 1);
        assert_eq!(stats["success_rate"], 1.0);
        assert_eq!(stats["health"], "healthy");
        assert_eq!(stats["worker_threads"], 0);
        assert!(stats["uptime_seconds"].as_f64().unwrap() >= 0.0);
    }

    #[test]
    fn test_reset() {
        let dispatcher = dispatcher();
        route(&dispatcher, &Method::Post, "/comando", br#"{"comando":"primary"}"#);

        let reply = route(&dispatcher, &Method::Post, "/reset", b"");
        assert_eq!(json(&reply)["status"], "stats_reset");
        assert_eq!(dispatcher.stats(), StatsSnapshot::default());
    }

    #[test]
    fn test_unknown_routes() {
        let dispatcher = dispatcher();

        assert_eq!(route(&dispatcher, &Method::Get, "/nope", b"").status, 404);
        assert_eq!(route(&dispatcher, &Method::Get, "/comando", b"").status, 405);
        assert_eq!(route(&dispatcher, &Method::Options, "/comando", b"").status, 204);
        assert_eq!(dispatcher.stats().total_requests, 0);
    }
}
