//! Order kinds and sales order shipments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order types, each with its own reference namespace
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    PurchaseOrder,
    SalesOrder,
    BuildOrder,
}

impl OrderKind {
    pub const ALL: [OrderKind; 3] = [
        OrderKind::PurchaseOrder,
        OrderKind::SalesOrder,
        OrderKind::BuildOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::PurchaseOrder => "purchase_order",
            OrderKind::SalesOrder => "sales_order",
            OrderKind::BuildOrder => "build_order",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase_order" => Some(OrderKind::PurchaseOrder),
            "sales_order" => Some(OrderKind::SalesOrder),
            "build_order" => Some(OrderKind::BuildOrder),
            _ => None,
        }
    }

    /// Reference prefix used when none is configured
    pub fn default_prefix(&self) -> &'static str {
        match self {
            OrderKind::PurchaseOrder => "PO",
            OrderKind::SalesOrder => "SO",
            OrderKind::BuildOrder => "BO",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::PurchaseOrder => write!(f, "Purchase Order"),
            OrderKind::SalesOrder => write!(f, "Sales Order"),
            OrderKind::BuildOrder => write!(f, "Build Order"),
        }
    }
}

/// A physical shipment made against a sales order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    /// Unique within the order
    pub reference: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
}

impl Shipment {
    pub fn new(order_id: Uuid, customer_id: Uuid, reference: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            customer_id,
            reference: reference.into(),
            shipped_at: None,
            tracking_number: None,
        }
    }

    pub fn is_shipped(&self) -> bool {
        self.shipped_at.is_some()
    }
}
