//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, request ID, trace span)
//!     → Balancer::select_backend
//!     → Balancer::forward (own task, streaming writer)
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
