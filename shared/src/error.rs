//! Error kinds produced by the allocation engine
//!
//! Validation failures are values, not panics. Where a single request can
//! fail in several places (a serial spec with many groups, a batch of
//! allocations) the individual kinds are collected into an aggregate so the
//! caller sees every problem at once.

use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Serial;

/// Errors raised while sequencing or validating order references
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Reference '{0}' has no numeric suffix and cannot be incremented")]
    ReferenceExhausted(String),

    #[error("Reference cannot be empty")]
    Empty,

    #[error("Reference '{value}' exceeds {max} characters")]
    TooLong { value: String, max: usize },

    #[error("Reference '{value}' must match pattern {pattern}")]
    PatternMismatch { value: String, pattern: String },

    #[error("Invalid reference pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// A single problem found while resolving a serial number specification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerialError {
    #[error("Empty serial number string")]
    EmptySpec,

    #[error("Invalid quantity provided: {0}")]
    InvalidQuantity(usize),

    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    #[error("Invalid group range: {0}")]
    InvalidGroupRange(String),

    #[error("Invalid group sequence: {0}")]
    InvalidGroupSequence(String),

    #[error("Duplicate serial: {0}")]
    DuplicateSerial(Serial),

    #[error("No serial numbers found")]
    NoSerialNumbers,

    #[error("Number of unique serial numbers ({found}) must match quantity ({expected})")]
    QuantityMismatch { found: usize, expected: usize },
}

/// Aggregated serial resolution failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialErrors(pub Vec<SerialError>);

impl SerialErrors {
    pub fn single(error: SerialError) -> Self {
        Self(vec![error])
    }

    pub fn errors(&self) -> &[SerialError] {
        &self.0
    }

    /// True if any recorded error matches the predicate
    pub fn contains(&self, predicate: impl Fn(&SerialError) -> bool) -> bool {
        self.0.iter().any(predicate)
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for SerialErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

impl std::error::Error for SerialErrors {}

impl From<SerialError> for SerialErrors {
    fn from(error: SerialError) -> Self {
        Self::single(error)
    }
}

/// Errors from the backing stock store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Stock unit {0} not found")]
    UnitNotFound(Uuid),

    #[error("Cannot take {requested} from stock unit {unit} holding {available}")]
    InsufficientStock {
        unit: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    #[error("No transaction is open")]
    NoTransaction,
}

/// Errors raised by the stock allocation ledger
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("Allocation quantity must be greater than zero (got {0})")]
    InvalidQuantity(Decimal),

    #[error("Cannot allocate part {unit_part} to a line requiring part {line_part}")]
    PartMismatch { line_part: Uuid, unit_part: Uuid },

    #[error("Stock unit {unit} is over-allocated: requested {requested}, available {available}")]
    OverAllocated {
        unit: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Quantity must be 1 for serialized stock unit {unit} (got {quantity})")]
    SerializedQuantityMismatch { unit: Uuid, quantity: Decimal },

    #[error("Line {line} does not belong to {context}")]
    OrderMismatch { line: Uuid, context: Uuid },

    #[error("Commit failed on allocation {allocation}: {reason}")]
    CommitFailed { allocation: Uuid, reason: String },

    #[error("Line {0} is not open for allocation")]
    LineNotOpen(Uuid),

    #[error("Stock unit {0} is not in stock")]
    NotInStock(Uuid),

    #[error("Shipment {0} has already been shipped")]
    AlreadyShipped(Uuid),

    #[error("Nothing has been allocated to {0}")]
    NothingToCommit(Uuid),

    #[error("Allocation {0} has already been consumed")]
    AlreadyConsumed(Uuid),

    #[error("No in-stock unit found for serial {0}")]
    SerialNotFound(Serial),

    #[error("Serial {0} is already allocated")]
    SerialAlreadyAllocated(Serial),

    #[error("Invalid serial numbers: {0}")]
    Serials(SerialErrors),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Allocation items must be provided")]
    EmptyRequest,

    #[error("Stock store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger is unavailable")]
    Unavailable,
}

impl From<SerialErrors> for AllocationError {
    fn from(errors: SerialErrors) -> Self {
        AllocationError::Serials(errors)
    }
}

/// Aggregated allocation failure for multi-item requests
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationErrors(pub Vec<AllocationError>);

impl AllocationErrors {
    pub fn errors(&self) -> &[AllocationError] {
        &self.0
    }

    pub fn contains(&self, predicate: impl Fn(&AllocationError) -> bool) -> bool {
        self.0.iter().any(predicate)
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for AllocationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

impl std::error::Error for AllocationErrors {}

impl From<AllocationError> for AllocationErrors {
    fn from(error: AllocationError) -> Self {
        Self(vec![error])
    }
}

/// Errors raised while validating a setting value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    #[error("Setting {key} expects {expected}, got '{value}'")]
    WrongType {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Setting {key} value {value} is outside {min}..={max}")]
    OutOfRange {
        key: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Setting {key} exceeds {max} characters")]
    TooLong { key: &'static str, max: usize },

    #[error("Setting {key} is not a valid pattern: {message}")]
    InvalidPattern { key: &'static str, message: String },
}
