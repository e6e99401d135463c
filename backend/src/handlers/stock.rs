//! Stock unit, line and shipment HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::services::stock::{CreateLineInput, CreateShipmentInput, CreateStockUnitInput, StockService};
use crate::AppState;

pub async fn create_stock_unit(
    State(state): State<AppState>,
    Json(input): Json<CreateStockUnitInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    let service = StockService::new(state.db.clone());

    match service.create_unit(input).await {
        Ok(unit) => (StatusCode::CREATED, Json(unit)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_stock_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = StockService::new(state.db.clone());

    match service.get_unit(unit_id).await {
        Ok(unit) => (StatusCode::OK, Json(unit)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_line(
    State(state): State<AppState>,
    Json(input): Json<CreateLineInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    let service = StockService::new(state.db.clone());

    match service.create_line(input).await {
        Ok(line) => (StatusCode::CREATED, Json(line)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// A line with every allocation recorded against it
pub async fn get_line(
    State(state): State<AppState>,
    Path(line_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = StockService::new(state.db.clone());

    let line = match service.get_line(line_id).await {
        Ok(line) => line,
        Err(e) => return e.into_response(),
    };

    match service.line_allocations(line_id).await {
        Ok(allocations) => (
            StatusCode::OK,
            Json(serde_json::json!({ "line": line, "allocations": allocations })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_shipment(
    State(state): State<AppState>,
    Json(input): Json<CreateShipmentInput>,
) -> impl IntoResponse {
    if let Err(e) = input.validate() {
        return AppError::from(e).into_response();
    }

    let service = StockService::new(state.db.clone());

    match service.create_shipment(input).await {
        Ok(shipment) => (StatusCode::CREATED, Json(shipment)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_shipment(
    State(state): State<AppState>,
    Path(shipment_id): Path<Uuid>,
) -> impl IntoResponse {
    let service = StockService::new(state.db.clone());

    match service.get_shipment(shipment_id).await {
        Ok(shipment) => (StatusCode::OK, Json(shipment)).into_response(),
        Err(e) => e.into_response(),
    }
}
