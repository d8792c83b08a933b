//! Request forwarding.
//!
//! # Responsibilities
//! - Rewrite an inbound request so the chosen backend is its only destination
//! - Bound the wait for the backend's response head
//! - Relay status, headers and body to the response writer
//! - Report how many body bytes reached the client
//!
//! # Design Decisions
//! - The deadline covers the exchange up to the response head; body streaming
//!   afterwards is not time-bounded
//! - A transport failure or timeout answers 503 and is returned to the caller;
//!   nothing is retried
//! - The exchange is abandoned as soon as the writer reports the client gone
//! - The backend body is dropped (and its connection released) on every path

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::uri::{PathAndQuery, Scheme};
use axum::http::{HeaderName, HeaderValue, Request, Response, StatusCode, Uri, Version};
use axum::BoxError;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::time;

use crate::load_balancer::backend::Backend;
use crate::proxy::transport::Transport;
use crate::proxy::writer::{ResponseWriter, WriteError};

/// Response header naming the backend that served the request.
pub const LB_FROM: HeaderName = HeaderName::from_static("lb-from");

/// Why a forward attempt did not complete.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend {0} is not in the server pool")]
    UnknownBackend(Backend),

    #[error("cannot address backend {backend}: {source}")]
    InvalidDestination {
        backend: Backend,
        #[source]
        source: axum::http::Error,
    },

    #[error("request to backend failed: {0}")]
    Transport(#[source] BoxError),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("client went away before the response head")]
    Cancelled,

    #[error("reading backend response failed after {copied} bytes: {source}")]
    Upstream {
        copied: u64,
        #[source]
        source: axum::Error,
    },

    #[error("writing response failed after {copied} bytes: {source}")]
    Write {
        copied: u64,
        #[source]
        source: WriteError,
    },
}

impl ForwardError {
    /// Whether the failure happened while relaying an already started response.
    pub fn is_copy_failure(&self) -> bool {
        matches!(self, ForwardError::Upstream { .. } | ForwardError::Write { .. })
    }
}

/// Proxies single requests to a given backend.
#[derive(Clone)]
pub struct Forwarder {
    transport: Arc<dyn Transport>,
    scheme: Scheme,
    timeout: Duration,
    trace: bool,
}

impl Forwarder {
    pub fn new(transport: Arc<dyn Transport>, https: bool, timeout: Duration, trace: bool) -> Self {
        Self {
            transport,
            scheme: if https { Scheme::HTTPS } else { Scheme::HTTP },
            timeout,
            trace,
        }
    }

    /// Scheme used to reach backends.
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Forward `request` to `dst` and relay the answer into `rw`.
    ///
    /// Returns the number of body bytes relayed. On failure before the
    /// response head is written, `rw` receives a 503.
    pub async fn forward<W>(
        &self,
        dst: &Backend,
        request: Request<Body>,
        rw: &mut W,
    ) -> Result<u64, ForwardError>
    where
        W: ResponseWriter + ?Sized,
    {
        let outbound = match self.outbound_request(dst, request) {
            Ok(req) => req,
            Err(source) => {
                write_unavailable(rw, "Invalid backend address").await;
                return Err(ForwardError::InvalidDestination {
                    backend: dst.clone(),
                    source,
                });
            }
        };

        let sent = tokio::select! {
            biased;
            sent = time::timeout(self.timeout, self.transport.send(outbound)) => sent,
            _ = rw.closed() => {
                tracing::debug!(backend = %dst, "Client went away before the response head");
                return Err(ForwardError::Cancelled);
            }
        };

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(backend = %dst, error = %e, "Failed to get response from backend");
                write_unavailable(rw, "Backend unavailable").await;
                return Err(ForwardError::Transport(e));
            }
            Err(_) => {
                tracing::warn!(backend = %dst, timeout = ?self.timeout, "Backend timed out");
                write_unavailable(rw, "Backend unavailable").await;
                return Err(ForwardError::Timeout(self.timeout));
            }
        };

        self.relay(dst, response, rw).await
    }

    /// Point a copy of the inbound request at `dst`.
    fn outbound_request(
        &self,
        dst: &Backend,
        request: Request<Body>,
    ) -> Result<Request<Body>, axum::http::Error> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        parts.uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(dst.as_str())
            .path_and_query(path_and_query)
            .build()?;
        parts.headers.insert(HOST, HeaderValue::from_str(dst.as_str())?);
        // The outbound client speaks HTTP/1.1 regardless of the inbound protocol.
        parts.version = Version::HTTP_11;

        Ok(Request::from_parts(parts, body))
    }

    async fn relay<W>(
        &self,
        dst: &Backend,
        response: Response<Body>,
        rw: &mut W,
    ) -> Result<u64, ForwardError>
    where
        W: ResponseWriter + ?Sized,
    {
        let (parts, body) = response.into_parts();

        let headers = rw.headers_mut();
        for (name, value) in parts.headers.iter() {
            headers.append(name.clone(), value.clone());
        }
        if self.trace {
            match HeaderValue::from_str(dst.as_str()) {
                Ok(value) => {
                    headers.insert(LB_FROM, value);
                }
                Err(e) => tracing::warn!(backend = %dst, error = %e, "Cannot encode trace header"),
            }
        }

        tracing::debug!(backend = %dst, status = %parts.status, "fwd");
        rw.write_head(parts.status)
            .map_err(|source| ForwardError::Write { copied: 0, source })?;

        let mut copied: u64 = 0;
        let mut chunks = body.into_data_stream();
        loop {
            let next = tokio::select! {
                biased;
                next = chunks.next() => next,
                _ = rw.closed() => {
                    return Err(ForwardError::Write { copied, source: WriteError::Closed });
                }
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|source| ForwardError::Upstream { copied, source })?;
            let len = chunk.len() as u64;
            rw.write_body(chunk)
                .await
                .map_err(|source| ForwardError::Write { copied, source })?;
            copied += len;
        }

        Ok(copied)
    }
}

/// Answer 503 with a plain-text reason, unless a head already went out.
pub async fn write_unavailable<W>(rw: &mut W, reason: &'static str)
where
    W: ResponseWriter + ?Sized,
{
    if rw.head_written() {
        return;
    }

    let headers = rw.headers_mut();
    headers.clear();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    if rw.write_head(StatusCode::SERVICE_UNAVAILABLE).is_ok() {
        let _ = rw.write_body(reason.into()).await;
    }
}
