//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     every pool member → flag = true, appended to healthy set
//!
//! Active health checks (monitor.rs), one task per backend:
//!     Periodic timer
//!     → probe.rs (one GET to the health path)
//!     → state.rs (flag), healthy_set.rs (membership, under the shared lock)
//! ```
//!
//! # Design Decisions
//! - Each tick is one attempt; a failed probe flips the flag, nothing more
//! - Backends are polled independently; one slow backend delays no other
//! - Health checking never depends on request traffic

pub mod healthy_set;
pub mod monitor;
pub mod probe;
pub mod state;

pub use healthy_set::HealthySet;
pub use monitor::HealthMonitor;
pub use probe::{HttpProbe, Probe};
pub use state::HealthStatus;
