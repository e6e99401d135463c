//! Order reference HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use shared::models::OrderKind;
use validator::Validate;

use crate::error::AppError;
use crate::services::reference::{
    CreateOrderInput, NextReferenceInput, ReferenceResponse, ReferenceService, ValidateReferenceInput,
};
use crate::AppState;

fn service(state: &AppState) -> ReferenceService {
    ReferenceService::new(state.db.clone(), state.references.clone())
}

/// Next free reference for an order kind
pub async fn next_reference(
    State(state): State<AppState>,
    Path(kind): Path<OrderKind>,
    Json(input): Json<NextReferenceInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    match service(&state).next_reference(kind, input.last.as_deref()).await {
        Ok(reference) => (
            StatusCode::OK,
            Json(ReferenceResponse {
                kind,
                reference_int: reference.reference_int(),
                reference,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Validate a user-supplied reference
pub async fn validate_reference(
    State(state): State<AppState>,
    Json(input): Json<ValidateReferenceInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    match service(&state).check(input.kind, &input.reference).await {
        Ok(check) => (StatusCode::OK, Json(check)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Create an order, assigning the next reference when none is given
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<CreateOrderInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    match service(&state).create_order(input).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => e.into_response(),
    }
}
