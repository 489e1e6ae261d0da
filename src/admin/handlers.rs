use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;

use crate::admin::AdminState;
use crate::http::response::ErrorBody;
use crate::security::rate_limit::RateLimitPolicy;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub chain: Vec<&'static str>,
    pub dynamic_routes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupStatus {
    pub name: String,
    pub max_rps: u32,
    pub burst: u32,
    pub expiration_secs: u64,
    pub tracked_identities: usize,
}

#[derive(Debug, Deserialize)]
pub struct GroupUpdate {
    pub max_rps: u32,
    pub burst: u32,
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u64,
}

fn default_expiration_secs() -> u64 {
    60
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        chain: state.core.chain().names(),
        dynamic_routes: state.core.dynamic_paths(),
    })
}

pub async fn list_groups(State(state): State<AdminState>) -> Json<Vec<GroupStatus>> {
    let groups = state
        .limiter
        .groups()
        .into_iter()
        .map(|(name, policy)| {
            let tracked_identities = state
                .limiter
                .group(&name)
                .map(|limiter| limiter.tracked_identities())
                .unwrap_or_default();
            GroupStatus {
                name,
                max_rps: policy.max_rps,
                burst: policy.burst,
                expiration_secs: policy.expiration.as_secs(),
                tracked_identities,
            }
        })
        .collect();
    Json(groups)
}

pub async fn set_group(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(update): Json<GroupUpdate>,
) -> Response {
    let result = RateLimitPolicy::new(
        Duration::from_secs(update.expiration_secs),
        update.max_rps,
        update.burst,
    )
    .and_then(|policy| state.limiter.set_group(id.clone(), policy).map(|()| policy));

    match result {
        Ok(policy) => Json(GroupStatus {
            name: id,
            max_rps: policy.max_rps,
            burst: policy.burst,
            expiration_secs: policy.expiration.as_secs(),
            tracked_identities: 0,
        })
        .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorBody::from(&e))).into_response(),
    }
}

pub async fn delete_group(State(state): State<AdminState>, Path(id): Path<String>) -> StatusCode {
    if state.limiter.del_group(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Hands unmatched admin requests to the dynamically registered handlers.
pub async fn dynamic_dispatch(State(state): State<AdminState>, request: Request<Body>) -> Response {
    match state.core.dynamic_router().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}
