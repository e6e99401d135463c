//! Route definitions for the allocation server

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/references", reference_routes())
        .route("/orders", post(handlers::create_order))
        .nest("/serials", serial_routes())
        .route("/parts/:part_id/serials/next", get(handlers::next_serial))
        .nest("/stock", stock_routes())
        .nest("/lines", line_routes())
        .nest("/shipments", shipment_routes())
        .nest("/allocations", allocation_routes())
        .nest("/sales-orders", sales_order_routes())
        .nest("/builds", build_routes())
}

/// Order reference routes
fn reference_routes() -> Router<AppState> {
    Router::new()
        .route("/validate", post(handlers::validate_reference))
        .route("/:kind/next", post(handlers::next_reference))
}

fn serial_routes() -> Router<AppState> {
    Router::new().route("/resolve", post(handlers::resolve_serials))
}

fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_stock_unit))
        .route("/:unit_id", get(handlers::get_stock_unit))
}

/// Demand line routes
fn line_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_line))
        .route("/:line_id", get(handlers::get_line))
        .route("/:line_id/status", get(handlers::line_status))
        .route("/:line_id/cancel", post(handlers::cancel_line))
}

fn shipment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_shipment))
        .route("/:shipment_id", get(handlers::get_shipment))
        .route("/:shipment_id/commit", post(handlers::commit_shipment))
}

/// Allocation routes
fn allocation_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::allocate))
        .route("/batch", post(handlers::allocate_batch))
        .route("/serials", post(handlers::allocate_serials))
        .route("/:allocation_id", delete(handlers::deallocate))
}

fn sales_order_routes() -> Router<AppState> {
    Router::new()
        .route("/:order_id/allocation", get(handlers::sales_order_allocation))
        .route("/:order_id/cancel", post(handlers::cancel_sales_order))
}

/// Build order routes
fn build_routes() -> Router<AppState> {
    Router::new()
        .route("/:build_id/allocation", get(handlers::build_allocation))
        .route("/:build_id/auto-allocate", post(handlers::auto_allocate))
        .route("/:build_id/commit", post(handlers::commit_build))
        .route("/:build_id/cancel", post(handlers::cancel_build))
}
