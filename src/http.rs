//! HTTP API for public ARK resolution
//!
//! Read-only endpoints; all mutation stays behind the library API.
//!
//! - `GET /health` - Health check with registry counts
//! - `GET /ark:/{naan}/{name}` - Resolution document for a minted ARK
//! - `GET /ark/{naan}/{name}` - Same, slash spelling
//! - `GET /run/{run_id}` - Run status document
//!
//! ## Example Usage
//!
//! ```bash
//! curl http://localhost:8097/ark:/99999/t1p4rp44g5m
//! curl http://localhost:8097/run/4c8f2c9e-...
//! ```

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::ark::registry;
use crate::db::{runs, Db};
use crate::error::CoreError;

/// HTTP server state
pub struct HttpServer {
    db: Arc<Db>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(db: Arc<Db>, bind_addr: SocketAddr) -> Self {
        Self { db, bind_addr }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), CoreError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "ARK resolver listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let result = match (method, path.as_str()) {
            (Method::GET, "/health") => self.handle_health(),

            (Method::GET, p) if p.starts_with("/ark:/") || p.starts_with("/ark/") => {
                let ark = p.trim_start_matches("/ark:/").trim_start_matches("/ark/");
                self.handle_resolve(ark)
            }

            (Method::GET, p) if p.starts_with("/run/") => {
                let run_id = p.strip_prefix("/run/").unwrap_or("");
                self.handle_run_status(run_id)
            }

            _ => Ok(error_response(StatusCode::NOT_FOUND, "Unknown route")),
        };

        match result {
            Ok(response) => Ok(response),
            Err(CoreError::NotFound(what)) => {
                Ok(error_response(StatusCode::NOT_FOUND, &what))
            }
            Err(e) => {
                warn!(error = %e, "Request handling failed");
                Ok(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &e.to_string(),
                ))
            }
        }
    }

    fn handle_health(&self) -> Result<Response<Full<Bytes>>, CoreError> {
        let stats = self.db.stats()?;
        json_response(StatusCode::OK, &json!({ "status": "ok", "stats": stats }))
    }

    fn handle_resolve(&self, ark: &str) -> Result<Response<Full<Bytes>>, CoreError> {
        let document = self.db.with_conn(|conn| registry::resolve(conn, ark))?;
        json_response(StatusCode::OK, &document)
    }

    fn handle_run_status(&self, run_id: &str) -> Result<Response<Full<Bytes>>, CoreError> {
        let (run, ark) = self.db.with_conn(|conn| {
            let run = runs::get_run(conn, run_id)?
                .ok_or_else(|| CoreError::NotFound(format!("run {}", run_id)))?;
            let ark = registry::by_run(conn, run_id).ok();
            Ok((run, ark))
        })?;
        json_response(StatusCode::OK, &json!({ "run": run, "ark": ark }))
    }
}

fn json_response<T: serde::Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response<Full<Bytes>>, CoreError> {
    let bytes = serde_json::to_vec(body)?;
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .map_err(|e| CoreError::Internal(format!("Response build failed: {}", e)))
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
