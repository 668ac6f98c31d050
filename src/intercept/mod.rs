//! Interception layer boundary
//!
//! The usage accounting engine never talks to the network itself; it
//! consumes already-decoded request/response bodies delivered by an
//! interception layer through the contract defined here.

pub mod proxy;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use tokio::sync::mpsc;

use crate::utils::error::MonitorResult;

pub use proxy::HttpIntercept;

/// Identity of one intercepted exchange on the wire
pub type FlowId = u64;

/// Events delivered by the interception layer
///
/// Bodies are always complete: streamed (SSE) responses must be fully
/// buffered by the layer before delivery, so the engine sees one blob.
#[derive(Debug, Clone)]
pub enum InterceptEvent {
    /// A request matching the target prefix was sent upstream
    Request {
        /// Flow identity, shared with the matching response
        flow: FlowId,
        /// Raw request body bytes
        body: Vec<u8>,
    },
    /// The response for a previously seen request arrived
    Response {
        /// Flow identity of the originating request
        flow: FlowId,
        /// Raw response body bytes, fully buffered
        body: Vec<u8>,
        /// Response Content-Type header value
        content_type: String,
    },
}

/// Contract the engine requires from an interception layer
///
/// `shutdown` must be idempotent and safe to call even if `start` never
/// ran or already failed. Dropping the event sender signals layer
/// termination to the session supervisor.
#[async_trait]
pub trait InterceptLayer: Send {
    /// Start intercepting; deliver events on the given channel
    async fn start(&mut self, events: mpsc::Sender<InterceptEvent>) -> MonitorResult<()>;

    /// Stop intercepting and release the listener
    async fn shutdown(&mut self);

    /// Address the monitored program should use as its proxy
    fn proxy_addr(&self) -> SocketAddr;

    /// Trust certificate the monitored program needs for TLS interception
    fn ca_cert_path(&self) -> &Path;
}

/// Find a free TCP port, probing upward from `start_port`.
///
/// Called once at session start so concurrent monitor instances do not
/// collide; the result is threaded through configuration rather than
/// read from global state.
pub fn allocate_port(host: &str, start_port: u16) -> MonitorResult<u16> {
    let mut port = start_port;
    loop {
        match std::net::TcpListener::bind((host, port)) {
            Ok(_) => return Ok(port),
            Err(e) if port == u16::MAX => return Err(e.into()),
            Err(_) => port += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_port_returns_free_port() {
        let port = allocate_port("127.0.0.1", 7878).unwrap();
        assert!(port >= 7878);
        // The returned port must be bindable right after
        std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    }

    #[test]
    fn test_allocate_port_skips_taken_port() {
        let holder = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let taken = holder.local_addr().unwrap().port();
        let port = allocate_port("127.0.0.1", taken).unwrap();
        assert_ne!(port, taken);
    }
}
