//! Stock allocation HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use shared::models::{CommitTarget, DemandKind};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::services::allocation::{
    AllocateBatchInput, AllocateInput, AllocateSerialsInput, AllocationService, AutoAllocateInput,
    CommitBuildInput,
};
use crate::AppState;

fn service(state: &AppState) -> AllocationService {
    AllocationService::new(state.db.clone(), state.events.clone())
}

/// Allocate stock from one unit to one line
pub async fn allocate(
    State(state): State<AppState>,
    Json(input): Json<AllocateInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    match service(&state).allocate(input).await {
        Ok(allocation) => (StatusCode::CREATED, Json(allocation)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Allocate a batch of items atomically
pub async fn allocate_batch(
    State(state): State<AppState>,
    Json(input): Json<AllocateBatchInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate_all() {
        return AppError::from(e).into_response();
    }

    match service(&state).allocate_many(input.context, &input.requests()).await {
        Ok(allocations) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "allocations": allocations })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Allocate serialized stock by serial number specification
pub async fn allocate_serials(
    State(state): State<AppState>,
    Json(input): Json<AllocateSerialsInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    match service(&state).allocate_serials(input).await {
        Ok(allocations) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "allocations": allocations })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Remove a pending allocation
pub async fn deallocate(
    State(state): State<AppState>,
    Path(allocation_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).deallocate(allocation_id).await {
        Ok(allocation) => (StatusCode::OK, Json(allocation)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Allocation progress of one line
pub async fn line_status(
    State(state): State<AppState>,
    Path(line_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).line_status(line_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cancel_line(
    State(state): State<AppState>,
    Path(line_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).cancel_line(line_id).await {
        Ok(line) => (StatusCode::OK, Json(line)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cancel_sales_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).cancel_parent(order_id, DemandKind::SalesOrder).await {
        Ok(cancelled) => (StatusCode::OK, Json(serde_json::json!({ "cancelled": cancelled }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cancel_build(
    State(state): State<AppState>,
    Path(build_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).cancel_parent(build_id, DemandKind::Build).await {
        Ok(cancelled) => (StatusCode::OK, Json(serde_json::json!({ "cancelled": cancelled }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn sales_order_allocation(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).parent_status(order_id, DemandKind::SalesOrder).await {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn build_allocation(
    State(state): State<AppState>,
    Path(build_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).parent_status(build_id, DemandKind::Build).await {
        Ok(progress) => (StatusCode::OK, Json(progress)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Fill a build's lines from available stock
pub async fn auto_allocate(
    State(state): State<AppState>,
    Path(build_id): Path<Uuid>,
    Json(input): Json<AutoAllocateInput>,
) -> impl IntoResponse {
    match service(&state).auto_allocate(build_id, input).await {
        Ok(allocations) => (
            StatusCode::OK,
            Json(serde_json::json!({ "allocations": allocations })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Ship everything allocated to a shipment
pub async fn commit_shipment(
    State(state): State<AppState>,
    Path(shipment_id): Path<Uuid>,
) -> impl IntoResponse {
    match service(&state).commit(CommitTarget::Shipment { shipment_id }).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Consume or install everything allocated to a build output
pub async fn commit_build(
    State(state): State<AppState>,
    Path(build_id): Path<Uuid>,
    body: Option<Json<CommitBuildInput>>,
) -> impl IntoResponse {
    let output = body.and_then(|Json(input)| input.output);

    match service(&state).commit(CommitTarget::Build { build_id, output }).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}
