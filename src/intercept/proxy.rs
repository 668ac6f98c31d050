//! HTTP forward proxy interception backend
//!
//! A minimal interception layer for plaintext HTTP targets: the monitored
//! program is pointed at this proxy via `HTTP_PROXY`/`HTTPS_PROXY`, and
//! every exchange whose URL matches the target prefix is delivered to the
//! engine as a pair of intercept events. Response bodies are fully
//! buffered before delivery, so streamed SSE responses arrive as one
//! blob, as the engine's contract requires.
//!
//! TLS termination is out of scope: CONNECT tunnels are refused, so
//! `https://` targets need an external TLS-terminating collaborator that
//! speaks the same event contract.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::intercept::{InterceptEvent, InterceptLayer};
use crate::utils::error::{helpers, MonitorResult};

/// Forward proxy implementing the interception contract
pub struct HttpIntercept {
    listen: SocketAddr,
    target_prefix: String,
    ca_cert_path: PathBuf,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Shared handler state
struct ProxyState {
    client: reqwest::Client,
    target_prefix: String,
    events: mpsc::Sender<InterceptEvent>,
    next_flow: AtomicU64,
}

impl HttpIntercept {
    /// Create a proxy bound to the given address once started
    pub fn new(listen: SocketAddr, target_prefix: impl Into<String>, ca_cert_path: PathBuf) -> Self {
        Self {
            listen,
            target_prefix: target_prefix.into(),
            ca_cert_path,
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

#[async_trait]
impl InterceptLayer for HttpIntercept {
    async fn start(&mut self, events: mpsc::Sender<InterceptEvent>) -> MonitorResult<()> {
        let listener = tokio::net::TcpListener::bind(self.listen)
            .await
            .map_err(|e| helpers::intercept_error(format!("bind {} failed: {}", self.listen, e)))?;
        self.listen = listener
            .local_addr()
            .map_err(|e| helpers::intercept_error(e.to_string()))?;

        let state = Arc::new(ProxyState {
            client: reqwest::Client::new(),
            target_prefix: self.target_prefix.clone(),
            events,
            next_flow: AtomicU64::new(0),
        });

        let app = Router::new()
            .fallback(forward)
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

        let cancel = self.cancel.clone();
        debug!("Interception proxy listening on {}", self.listen);
        self.task = Some(tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Interception proxy terminated with error: {}", e);
            }
        }));

        Ok(())
    }

    async fn shutdown(&mut self) {
        // Safe to call repeatedly or before start
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Interception proxy task join failed: {}", e);
            }
        }
    }

    fn proxy_addr(&self) -> SocketAddr {
        self.listen
    }

    fn ca_cert_path(&self) -> &Path {
        &self.ca_cert_path
    }
}

/// Headers that must not be forwarded between hops
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "transfer-encoding",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Forward one proxied exchange, emitting intercept events for target flows
async fn forward(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::CONNECT {
        return (
            StatusCode::NOT_IMPLEMENTED,
            "CONNECT tunneling is not supported; this backend intercepts plaintext HTTP only",
        )
            .into_response();
    }

    let url = match absolute_url(&uri, &headers) {
        Some(url) => url,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                "proxy requests need an absolute-form URI or a Host header",
            )
                .into_response();
        }
    };

    let is_target = url.starts_with(&state.target_prefix);
    let flow = state.next_flow.fetch_add(1, Ordering::Relaxed);

    if is_target {
        debug!("Intercepted target request on flow {}: {} {}", flow, method, url);
        if state
            .events
            .send(InterceptEvent::Request {
                flow,
                body: body.to_vec(),
            })
            .await
            .is_err()
        {
            warn!("Engine dropped its event channel, forwarding without accounting");
        }
    }

    let mut upstream = state.client.request(method, &url);
    for (name, value) in headers.iter() {
        if !is_hop_by_hop(name) && name != &header::HOST {
            upstream = upstream.header(name, value);
        }
    }

    let upstream_response = match upstream.body(body.to_vec()).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Upstream request to {} failed: {}", url, e);
            return (StatusCode::BAD_GATEWAY, format!("upstream request failed: {}", e))
                .into_response();
        }
    };

    let status = upstream_response.status();
    let response_headers = upstream_response.headers().clone();
    let content_type = response_headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // Buffers the whole body, including event-stream responses
    let response_body = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read upstream response body from {}: {}", url, e);
            return (StatusCode::BAD_GATEWAY, format!("upstream body read failed: {}", e))
                .into_response();
        }
    };

    if is_target {
        if state
            .events
            .send(InterceptEvent::Response {
                flow,
                body: response_body.to_vec(),
                content_type: content_type.clone(),
            })
            .await
            .is_err()
        {
            warn!("Engine dropped its event channel, response on flow {} not accounted", flow);
        }
    }

    let mut response = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        if !is_hop_by_hop(name) && name != &header::CONTENT_LENGTH {
            response = response.header(name, value);
        }
    }
    response
        .body(axum::body::Body::from(response_body))
        .unwrap_or_else(|e| {
            error!("Failed to assemble proxied response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

/// Resolve the upstream URL from an absolute-form URI or the Host header
fn absolute_url(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    if uri.scheme().is_some() {
        return Some(uri.to_string());
    }
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Some(format!("http://{}{}", host, path))
}
