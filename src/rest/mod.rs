//! REST control plane.
//!
//! Thin boundary layer: decode the request, check the token, call into the
//! core components. Every endpoint takes an `auth` query parameter; a
//! missing or unknown token answers 404 with an `AUTHENTICATION_FAIL` body,
//! as does every other failure with its own code.

pub mod data;
pub mod jobs;

use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::auth::Authenticator;
use crate::catalog::Catalog;
use crate::datastore::DataStore;
use crate::error::KiwibesError;
use crate::manager::Manager;
use crate::scheduler::Scheduler;

/// References to the core components, handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub catalog: Arc<Catalog>,
    pub manager: Arc<Manager>,
    pub scheduler: Arc<Scheduler>,
    pub datastore: Arc<DataStore>,
    pub auth: Arc<Authenticator>,
}

pub fn router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/rest/job/start/{name}", post(jobs::start_job))
        .route("/rest/job/stop/{name}", post(jobs::stop_job))
        .route("/rest/job/create/{name}", post(jobs::create_job))
        .route("/rest/job/edit/{name}", post(jobs::edit_job))
        .route("/rest/job/delete/{name}", post(jobs::delete_job))
        .route("/rest/job/clear_pending/{name}", post(jobs::clear_pending))
        .route("/rest/job/details/{name}", get(jobs::job_details))
        .route("/rest/jobs/list", get(jobs::list_jobs))
        .route("/rest/jobs/scheduled", get(jobs::scheduled_jobs))
        .route("/rest/data/write/{key}", post(data::write_data))
        .route("/rest/data/clear/{key}", post(data::clear_data))
        .route("/rest/data/clear_all", post(data::clear_all_data))
        .route("/rest/data/read/{key}", get(data::read_data))
        .route("/rest/data/keys", get(data::data_keys))
        .route("/rest/ping", post(ping))
        .layer(cors)
        .with_state(ctx)
}

/// Error wrapper mapping a component failure to the wire format: HTTP 404
/// with `{"error": <code>, "message": <text>}`.
#[derive(Debug)]
pub struct ApiError(pub KiwibesError);

impl From<KiwibesError> for ApiError {
    fn from(error: KiwibesError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"error": self.0.code(), "message": self.0.to_string()});
        (StatusCode::NOT_FOUND, Json(body)).into_response()
    }
}

/// URL-encoded parameters, merged from the query string and the request
/// body. Repeated keys are kept in order (`program` uses this to build the
/// argv vector).
pub(crate) struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    pub(crate) fn parse(query: Option<&str>, body: &str) -> Self {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(query) = query {
            pairs.extend(
                serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default(),
            );
        }
        if !body.is_empty() {
            pairs.extend(
                serde_urlencoded::from_str::<Vec<(String, String)>>(body).unwrap_or_default(),
            );
        }
        Self { pairs }
    }

    pub(crate) fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn all(&self, key: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Reject the request unless its `auth` token is currently valid.
pub(crate) async fn authorize(
    ctx: &AppContext,
    params: &RequestParams,
) -> Result<(), ApiError> {
    match params.first("auth") {
        Some(token) if ctx.auth.is_valid(token).await => Ok(()),
        _ => Err(ApiError(KiwibesError::AuthenticationFail)),
    }
}

/// Route names are restricted to `[A-Za-z0-9_]+`.
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn ok_body() -> Json<Value> {
    Json(json!({"error": 0, "message": ""}))
}

async fn ping(
    State(ctx): State<AppContext>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<&'static str, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    Ok("pong")
}
