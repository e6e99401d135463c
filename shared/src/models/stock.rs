//! Stock unit models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Serial;

/// A physical stock unit (a stock item in a location)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockUnit {
    pub id: Uuid,
    pub part_id: Uuid,
    /// Quantity on hand
    pub quantity: Decimal,
    /// Serial number; a serialized unit always holds exactly one item
    pub serial: Option<String>,
    /// Trackable parts are installed into build outputs rather than consumed
    pub trackable: bool,
    pub owner: StockOwner,
}

impl StockUnit {
    pub fn new(part_id: Uuid, quantity: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            part_id,
            quantity,
            serial: None,
            trackable: false,
            owner: StockOwner::InStock,
        }
    }

    pub fn serialized(part_id: Uuid, serial: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            part_id,
            quantity: Decimal::ONE,
            serial: Some(serial.into()),
            trackable: true,
            owner: StockOwner::InStock,
        }
    }

    pub fn trackable(mut self) -> Self {
        self.trackable = true;
        self
    }

    pub fn is_serialized(&self) -> bool {
        self.serial.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Normalized serial token, if any
    pub fn serial_token(&self) -> Option<Serial> {
        self.serial
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Serial::parse)
    }

    pub fn is_in_stock(&self) -> bool {
        self.owner == StockOwner::InStock && self.quantity > Decimal::ZERO
    }
}

/// Who currently holds a stock unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum StockOwner {
    InStock,
    /// Shipped to a customer
    Customer(Uuid),
    /// Installed into a build output
    InstalledIn(Uuid),
}

impl StockOwner {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOwner::InStock => "in_stock",
            StockOwner::Customer(_) => "customer",
            StockOwner::InstalledIn(_) => "installed_in",
        }
    }

    pub fn holder(&self) -> Option<Uuid> {
        match self {
            StockOwner::InStock => None,
            StockOwner::Customer(id) | StockOwner::InstalledIn(id) => Some(*id),
        }
    }

    pub fn from_parts(kind: &str, holder: Option<Uuid>) -> Option<Self> {
        match (kind, holder) {
            ("in_stock", _) => Some(StockOwner::InStock),
            ("customer", Some(id)) => Some(StockOwner::Customer(id)),
            ("installed_in", Some(id)) => Some(StockOwner::InstalledIn(id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for StockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockOwner::InStock => write!(f, "In Stock"),
            StockOwner::Customer(id) => write!(f, "Customer {}", id),
            StockOwner::InstalledIn(id) => write!(f, "Installed in {}", id),
        }
    }
}
