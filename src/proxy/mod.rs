//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request + chosen backend
//!     → forward.rs (rewrite URI/Host, apply deadline)
//!     → transport.rs (one outbound exchange, no interpretation)
//!     → forward.rs (copy status, headers, body)
//!     → writer.rs (stream to the client or record in memory)
//! ```
//!
//! # Design Decisions
//! - Transport is a trait so the network can be swapped for fakes
//! - Response bodies are streamed, never buffered whole
//! - Byte counts are reported back; accounting happens in the balancer

pub mod forward;
pub mod transport;
pub mod writer;

pub use forward::{ForwardError, Forwarder, LB_FROM};
pub use transport::{http_client, HttpClient, HyperTransport, Transport};
pub use writer::{channel, ChannelWriter, PendingResponse, ResponseRecorder, ResponseWriter, WriteError};
