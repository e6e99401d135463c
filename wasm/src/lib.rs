//! WebAssembly module for the stock allocation engine
//!
//! Provides client-side previews for:
//! - Serial number expansion
//! - Next order reference
//! - Line allocation progress
//! - Reference pattern checks

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{AllocationLine, Serial};
use shared::reference::{first_reference, next_reference, validate_reference, Reference};
use shared::serial::resolve;
use shared::types::LineProgress;
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct ProgressView {
    #[serde(flatten)]
    progress: LineProgress,
    percent: Decimal,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Serialization failed: {}", e))
}

fn serial_preview(spec: &str, quantity: usize, next_available: u64) -> Result<String, String> {
    let serials = resolve(spec, quantity, next_available).map_err(|errors| {
        serde_json::to_string(&errors.messages()).unwrap_or_else(|_| errors.to_string())
    })?;

    let tokens: Vec<String> = serials.iter().map(Serial::to_string).collect();
    to_json(&tokens)
}

fn reference_preview(last: &str, prefix: &str, digits: usize) -> Result<String, String> {
    let last = last.trim();
    if last.is_empty() {
        return Ok(first_reference(prefix, digits).into_inner());
    }

    next_reference(&Reference::new(last))
        .map(Reference::into_inner)
        .map_err(|e| e.to_string())
}

fn progress_preview(line_json: &str, allocated: &str) -> Result<String, String> {
    let line: AllocationLine =
        serde_json::from_str(line_json).map_err(|e| format!("Invalid line JSON: {}", e))?;
    let allocated = Decimal::from_str(allocated.trim())
        .map_err(|e| format!("Invalid allocated quantity: {}", e))?;

    let progress = LineProgress::new(&line, allocated);
    to_json(&ProgressView {
        percent: progress.percent(),
        progress,
    })
}

/// Expand a serial number specification; returns a JSON array of serials
/// or throws a JSON array of error messages
#[wasm_bindgen]
pub fn resolve_serial_numbers(spec: &str, quantity: u32, next_available: u64) -> Result<String, JsValue> {
    serial_preview(spec, quantity as usize, next_available).map_err(|e| JsValue::from_str(&e))
}

/// Reference following `last`, or the first one for `prefix` when `last`
/// is empty
#[wasm_bindgen]
pub fn next_order_reference(last: &str, prefix: &str, digits: u32) -> Result<String, JsValue> {
    reference_preview(last, prefix, digits as usize).map_err(|e| JsValue::from_str(&e))
}

/// Allocation progress of a line given its allocated quantity
#[wasm_bindgen]
pub fn allocation_progress(line_json: &str, allocated: &str) -> Result<String, JsValue> {
    progress_preview(line_json, allocated).map_err(|e| JsValue::from_str(&e))
}

/// Check a reference against an optional pattern (empty means none)
#[wasm_bindgen]
pub fn is_valid_reference(value: &str, pattern: &str) -> bool {
    validate_reference(value, Some(pattern)).is_ok()
}
