use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::load_balancer::BackendStatus;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub backends: usize,
    pub healthy: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.balancer.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        backends: snapshot.len(),
        healthy: snapshot.iter().filter(|b| b.in_rotation).count(),
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    Json(state.balancer.snapshot())
}
