//! Server pool.
//!
//! # Responsibilities
//! - Hold the ordered, fixed set of backends configured at startup
//! - Answer membership queries
//!
//! The pool is immutable after construction and shared without locking.

use std::sync::Arc;

use crate::load_balancer::backend::Backend;

/// The fixed, ordered sequence of backends known to the balancer.
#[derive(Debug, Clone)]
pub struct ServerPool {
    backends: Arc<[Backend]>,
}

impl ServerPool {
    /// Build a pool from addresses, keeping the first occurrence of duplicates.
    pub fn new<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut backends: Vec<Backend> = Vec::new();
        for addr in addrs {
            let backend = Backend::new(addr);
            if backends.contains(&backend) {
                tracing::warn!(backend = %backend, "Duplicate backend in pool ignored");
                continue;
            }
            backends.push(backend);
        }

        Self {
            backends: backends.into(),
        }
    }

    /// Whether the backend is a member of this pool.
    pub fn contains(&self, backend: &Backend) -> bool {
        self.backends.contains(backend)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }

    pub fn as_slice(&self) -> &[Backend] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_keeps_order_and_drops_duplicates() {
        let pool = ServerPool::new(["b:1", "a:1", "b:1", "c:1"]);
        let addrs: Vec<&str> = pool.iter().map(Backend::as_str).collect();
        assert_eq!(addrs, vec!["b:1", "a:1", "c:1"]);
        assert!(pool.contains(&Backend::new("a:1")));
        assert!(!pool.contains(&Backend::new("d:1")));
    }
}
