//! Serial number HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::services::serial::{ResolveSerialsInput, SerialService};
use crate::AppState;

/// Query parameters for the next serial lookup
#[derive(Debug, Deserialize)]
pub struct NextSerialQuery {
    pub quantity: Option<usize>,
}

/// Expand a serial number specification
pub async fn resolve_serials(
    State(state): State<AppState>,
    Json(input): Json<ResolveSerialsInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    let service = SerialService::new(state.db.clone());

    match service.resolve(input).await {
        Ok(resolved) => (StatusCode::OK, Json(resolved)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Next serial number for a part
pub async fn next_serial(
    State(state): State<AppState>,
    Path(part_id): Path<Uuid>,
    Query(query): Query<NextSerialQuery>,
) -> impl IntoResponse {
    let service = SerialService::new(state.db.clone());

    match service.next_serial(part_id, query.quantity.unwrap_or(1)).await {
        Ok(next) => (StatusCode::OK, Json(next)).into_response(),
        Err(e) => e.into_response(),
    }
}
