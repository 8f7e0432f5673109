//! Handlers for the job endpoints.

use axum::{
    extract::{Path, RawQuery, State},
    Json,
};
use serde_json::Value;

use crate::catalog::{Job, JobDescriptor, JobPatch};
use crate::cron::CronSpec;
use crate::error::KiwibesError;

use super::{authorize, is_valid_name, ok_body, ApiError, AppContext, RequestParams};

pub async fn start_job(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    ensure_job_name(&name)?;

    ctx.manager.start(&name).await?;
    Ok(ok_body())
}

pub async fn stop_job(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    ensure_job_name(&name)?;

    ctx.manager.stop(&name).await?;
    Ok(ok_body())
}

pub async fn create_job(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    ensure_job_name(&name)?;

    let descriptor = job_descriptor(&params).ok_or(KiwibesError::JobDescriptionInvalid)?;

    // Validate the schedule up front so a bad cron never enters the catalog.
    let schedulable = !descriptor.schedule.is_empty();
    if schedulable {
        let spec = CronSpec::parse(&descriptor.schedule)?;
        if spec.next_from_now().is_none() {
            return Err(KiwibesError::JobScheduleInvalid.into());
        }
    }

    ctx.catalog.create(&name, descriptor).await?;

    if schedulable {
        if let Err(e) = ctx.scheduler.schedule(&name).await {
            tracing::warn!(job = %name, error = %e, "created job could not be scheduled");
        }
    }
    Ok(ok_body())
}

pub async fn edit_job(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    ensure_job_name(&name)?;

    let patch = job_patch(&params).ok_or(KiwibesError::JobDescriptionInvalid)?;
    if patch.is_empty() {
        return Err(KiwibesError::JobDescriptionInvalid.into());
    }

    ctx.catalog.edit(&name, patch).await?;

    // Re-arm from the resulting description: an emptied schedule stays
    // unscheduled, anything else replaces the previous arming.
    ctx.scheduler.unschedule(&name).await;
    let job = ctx.catalog.get(&name).await?;
    if !job.schedule.is_empty() {
        if let Err(e) = ctx.scheduler.schedule(&name).await {
            tracing::debug!(job = %name, error = %e, "edited job not re-armed");
        }
    }
    Ok(ok_body())
}

pub async fn delete_job(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    ensure_job_name(&name)?;

    ctx.catalog.delete(&name).await?;
    ctx.scheduler.unschedule(&name).await;
    Ok(ok_body())
}

pub async fn clear_pending(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), &body);
    authorize(&ctx, &params).await?;
    ensure_job_name(&name)?;

    ctx.catalog.clear_pending(&name).await?;
    Ok(ok_body())
}

pub async fn job_details(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<Job>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), "");
    authorize(&ctx, &params).await?;
    ensure_job_name(&name)?;

    let job = ctx.catalog.get(&name).await?;
    Ok(Json(job))
}

pub async fn list_jobs(
    State(ctx): State<AppContext>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<String>>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), "");
    authorize(&ctx, &params).await?;

    Ok(Json(ctx.catalog.list_names().await))
}

pub async fn scheduled_jobs(
    State(ctx): State<AppContext>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<String>>, ApiError> {
    let params = RequestParams::parse(query.as_deref(), "");
    authorize(&ctx, &params).await?;

    Ok(Json(ctx.scheduler.list_scheduled().await))
}

fn ensure_job_name(name: &str) -> Result<(), ApiError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(KiwibesError::JobNameUnknown.into())
    }
}

/// A complete description: all of `program`, `schedule` and `max-runtime`.
fn job_descriptor(params: &RequestParams) -> Option<JobDescriptor> {
    let program = params.all("program");
    if program.is_empty() {
        return None;
    }
    let schedule = params.first("schedule")?.to_string();
    let max_runtime = params.first("max-runtime")?.parse().ok()?;
    Some(JobDescriptor {
        program,
        schedule,
        max_runtime,
    })
}

/// A partial description; `None` when a present field fails to parse.
fn job_patch(params: &RequestParams) -> Option<JobPatch> {
    let max_runtime = match params.first("max-runtime") {
        Some(value) => Some(value.parse().ok()?),
        None => None,
    };
    let program = params.all("program");
    Some(JobPatch {
        program: (!program.is_empty()).then_some(program),
        schedule: params.first("schedule").map(str::to_string),
        max_runtime,
    })
}
