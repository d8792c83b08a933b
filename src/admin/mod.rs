//! Read-only admin API.
//!
//! Served on its own listener behind a bearer token. Every handler works from
//! one snapshot of the balancer state.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::load_balancer::Balancer;

use self::auth::admin_auth_middleware;
use self::handlers::{get_backends, get_status};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub balancer: Balancer,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(balancer: Balancer, api_key: &str) -> Router {
    let state = AdminState {
        balancer,
        api_key: Arc::from(api_key),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
