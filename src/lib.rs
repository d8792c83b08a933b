//! Least-traffic HTTP load balancer.
//!
//! A fixed pool of backends is probed in the background; each request goes to
//! the healthy backend that has relayed the fewest response bytes so far.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod proxy;

pub use config::BalancerConfig;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use load_balancer::{Backend, Balancer, ServerPool};
