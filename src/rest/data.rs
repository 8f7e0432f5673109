//! Handlers for the data store endpoints.

use axum::{
    extract::{Path, RawQuery, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::KiwibesError;

use super::{authorize, is_valid_name, ok_body, ApiError, AppContext, RequestParams};

pub async fn write_data(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    ensure_data_key(&key)?;

    let value = params
        .first("value")
        .ok_or(KiwibesError::EmptyRestRequest)?;
    ctx.datastore.write(&key, value).await?;
    Ok(ok_body())
}

pub async fn clear_data(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    ensure_data_key(&key)?;

    ctx.datastore.clear(&key).await?;
    Ok(ok_body())
}

pub async fn clear_all_data(
    State(ctx): State<AppContext>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;

    let count = ctx.datastore.clear_all().await;
    Ok(Json(json!({"count": count})))
}

pub async fn read_data(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), "");
    authorize(&ctx, &params).await?;
    ensure_data_key(&key)?;

    let value = ctx.datastore.read(&key).await?;
    Ok(Json(json!({"value": value})))
}

pub async fn data_keys(
    State(ctx): State<AppContext>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<String>>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), "");
    authorize(&ctx, &params).await?;

    Ok(Json(ctx.datastore.keys().await))
}

fn ensure_data_key(key: &str) -> Result<(), ApiError> {
    if is_valid_name(key) {
        Ok(())
    } else {
        Err(KiwibesError::DataKeyUnknown.into())
    }
}
