//! Response writers.
//!
//! The forwarding path relays a backend response by writing into a
//! [`ResponseWriter`]: headers first, then the status line, then the body
//! chunk by chunk. Two writers are provided:
//!
//! - [`ChannelWriter`] streams into an axum response through a bounded
//!   channel, so large bodies are never buffered whole
//! - [`ResponseRecorder`] keeps everything in memory

use std::convert::Infallible;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Response, StatusCode};
use futures_util::stream;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Failure to deliver part of a response to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("response head already written")]
    HeadAlreadyWritten,

    #[error("client disconnected")]
    Closed,
}

/// Destination of a relayed response.
#[async_trait]
pub trait ResponseWriter: Send + Sync {
    /// Headers sent with the response head. Changes after the head is written
    /// have no effect.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the status and headers. Only the first call succeeds.
    fn write_head(&mut self, status: StatusCode) -> Result<(), WriteError>;

    /// Send a body chunk, committing a `200 OK` head first if none was written.
    async fn write_body(&mut self, chunk: Bytes) -> Result<(), WriteError>;

    /// Whether the head has been committed.
    fn head_written(&self) -> bool;

    /// Resolve once the client can no longer receive the response.
    ///
    /// Writers without a remote reader never close.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

/// Status and headers of a response, as committed by a writer.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Writer half of a streaming response.
#[derive(Debug)]
pub struct ChannelWriter {
    headers: HeaderMap,
    head: Option<oneshot::Sender<ResponseHead>>,
    body: mpsc::Sender<Bytes>,
}

/// Reader half of a streaming response, turned into an axum response once
/// the head arrives.
#[derive(Debug)]
pub struct PendingResponse {
    head: oneshot::Receiver<ResponseHead>,
    body: mpsc::Receiver<Bytes>,
}

/// Create a streaming writer whose body channel holds up to `buffer` chunks.
pub fn channel(buffer: usize) -> (ChannelWriter, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(buffer.max(1));

    (
        ChannelWriter {
            headers: HeaderMap::new(),
            head: Some(head_tx),
            body: body_tx,
        },
        PendingResponse {
            head: head_rx,
            body: body_rx,
        },
    )
}

#[async_trait]
impl ResponseWriter for ChannelWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) -> Result<(), WriteError> {
        let sender = self.head.take().ok_or(WriteError::HeadAlreadyWritten)?;
        let head = ResponseHead {
            status,
            headers: std::mem::take(&mut self.headers),
        };
        sender.send(head).map_err(|_| WriteError::Closed)
    }

    async fn write_body(&mut self, chunk: Bytes) -> Result<(), WriteError> {
        if self.head.is_some() {
            self.write_head(StatusCode::OK)?;
        }
        self.body.send(chunk).await.map_err(|_| WriteError::Closed)
    }

    fn head_written(&self) -> bool {
        self.head.is_none()
    }

    async fn closed(&self) {
        self.body.closed().await
    }
}

impl PendingResponse {
    /// Wait for the head. The body keeps streaming until the writer is dropped.
    ///
    /// Returns `None` if the writer went away without writing a head.
    pub async fn into_response(self) -> Option<Response<Body>> {
        let ResponseHead { status, headers } = self.head.await.ok()?;

        let chunks = stream::unfold(self.body, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
        });

        let mut response = Response::new(Body::from_stream(chunks));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Some(response)
    }
}

/// Writer that records the whole response in memory.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: Vec<u8>,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, or `None` if nothing was written.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) -> Result<(), WriteError> {
        if self.status.is_some() {
            return Err(WriteError::HeadAlreadyWritten);
        }
        self.status = Some(status);
        Ok(())
    }

    async fn write_body(&mut self, chunk: Bytes) -> Result<(), WriteError> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(&chunk);
        Ok(())
    }

    fn head_written(&self) -> bool {
        self.status.is_some()
    }
}
