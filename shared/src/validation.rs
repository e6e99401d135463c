//! Validation utilities for allocation inputs
//!
//! Field-level checks shared by the backend request DTOs and the WASM
//! previews. Engine rules (over-allocation, part matching) live in
//! [`crate::ledger::rules`].

use rust_decimal::Decimal;

/// Quantities are stored with at most this many digits in total
pub const QUANTITY_MAX_DIGITS: u32 = 15;

/// ...and at most this many after the decimal point
pub const QUANTITY_DECIMAL_PLACES: u32 = 5;

/// Maximum length of a serial number, shipment reference or tracking number
pub const MAX_FIELD_LENGTH: usize = 100;

// ============================================================================
// Quantity Validations
// ============================================================================

/// Validate a quantity fits the storage precision
pub fn validate_quantity_precision(quantity: Decimal) -> Result<(), &'static str> {
    let normalized = quantity.normalize();
    if normalized.scale() > QUANTITY_DECIMAL_PLACES {
        return Err("Quantity has too many decimal places");
    }

    let integer_digits = normalized.trunc().abs().to_string().trim_start_matches('0').len() as u32;
    if integer_digits + QUANTITY_DECIMAL_PLACES > QUANTITY_MAX_DIGITS {
        return Err("Quantity has too many digits");
    }
    Ok(())
}

/// Validate an allocation quantity: positive and within precision
pub fn validate_allocation_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    validate_quantity_precision(quantity)
}

/// Validate a line's required quantity
pub fn validate_required_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < Decimal::ZERO {
        return Err("Required quantity cannot be negative");
    }
    validate_quantity_precision(quantity)
}

/// Check if a quantity is a whole number (serialized stock is counted in units)
pub fn is_whole_quantity(quantity: Decimal) -> bool {
    quantity.fract().is_zero()
}

// ============================================================================
// Identifier Validations
// ============================================================================

/// Validate a single serial number token
pub fn validate_serial_token(serial: &str) -> Result<(), &'static str> {
    let serial = serial.trim();
    if serial.is_empty() {
        return Err("Serial number cannot be empty");
    }
    if serial.chars().count() > MAX_FIELD_LENGTH {
        return Err("Serial number is too long");
    }
    if serial.chars().any(|c| c == ',' || c.is_whitespace()) {
        return Err("Serial number cannot contain commas or whitespace");
    }
    Ok(())
}

/// Validate a shipment reference (unique within its order)
pub fn validate_shipment_reference(reference: &str) -> Result<(), &'static str> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err("Shipment reference cannot be empty");
    }
    if reference.chars().count() > MAX_FIELD_LENGTH {
        return Err("Shipment reference is too long");
    }
    Ok(())
}

/// Validate an optional tracking number
pub fn validate_tracking_number(tracking: Option<&str>) -> Result<(), &'static str> {
    match tracking {
        Some(t) if t.chars().count() > MAX_FIELD_LENGTH => Err("Tracking number is too long"),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Quantity Validation Tests
    // ========================================================================

    #[test]
    fn test_allocation_quantity_positive() {
        assert!(validate_allocation_quantity(Decimal::new(25, 1)).is_ok());
        assert!(validate_allocation_quantity(Decimal::ZERO).is_err());
        assert!(validate_allocation_quantity(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_quantity_decimal_places() {
        assert!(validate_quantity_precision(Decimal::new(12345, 5)).is_ok());
        assert!(validate_quantity_precision(Decimal::new(123456, 6)).is_err());
        // Trailing zeros do not count
        assert!(validate_quantity_precision(Decimal::new(1_000_000, 6)).is_ok());
    }

    #[test]
    fn test_quantity_total_digits() {
        assert!(validate_quantity_precision(Decimal::from(9_999_999_999i64)).is_ok());
        assert!(validate_quantity_precision(Decimal::from(10_000_000_000i64)).is_err());
    }

    #[test]
    fn test_required_quantity() {
        assert!(validate_required_quantity(Decimal::ZERO).is_ok());
        assert!(validate_required_quantity(Decimal::from(-3)).is_err());
    }

    #[test]
    fn test_whole_quantity() {
        assert!(is_whole_quantity(Decimal::from(3)));
        assert!(is_whole_quantity(Decimal::new(300, 2)));
        assert!(!is_whole_quantity(Decimal::new(35, 1)));
    }

    // ========================================================================
    // Identifier Validation Tests
    // ========================================================================

    #[test]
    fn test_serial_token() {
        assert!(validate_serial_token("SN-0001").is_ok());
        assert!(validate_serial_token("  ").is_err());
        assert!(validate_serial_token("1,2").is_err());
        assert!(validate_serial_token("A B").is_err());
        assert!(validate_serial_token(&"9".repeat(101)).is_err());
    }

    #[test]
    fn test_shipment_reference() {
        assert!(validate_shipment_reference("1").is_ok());
        assert!(validate_shipment_reference("").is_err());
    }

    #[test]
    fn test_tracking_number() {
        assert!(validate_tracking_number(None).is_ok());
        assert!(validate_tracking_number(Some("1Z999AA10123456784")).is_ok());
        assert!(validate_tracking_number(Some(&"X".repeat(101))).is_err());
    }
}
