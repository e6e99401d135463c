//! Typed settings schema
//!
//! Every known setting is a variant of [`SettingKey`] with a fixed
//! [`SettingKind`]; raw values are validated against that kind before use.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SettingError;
use crate::models::OrderKind;

/// The shape of value a setting accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Text { max_len: usize },
    /// Regular expression; empty means "no pattern"
    Pattern,
    Integer { min: i64, max: i64 },
    Bool,
}

/// A validated setting value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Text(String),
    Pattern(Option<String>),
    Integer(i64),
    Bool(bool),
}

/// Settings understood by the allocation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettingKey {
    SalesOrderReferencePrefix,
    PurchaseOrderReferencePrefix,
    BuildOrderReferencePrefix,
    SalesOrderReferencePattern,
    PurchaseOrderReferencePattern,
    BuildOrderReferencePattern,
    /// Zero-padding width of the first reference in an empty namespace
    ReferenceDigits,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::SalesOrderReferencePrefix,
        SettingKey::PurchaseOrderReferencePrefix,
        SettingKey::BuildOrderReferencePrefix,
        SettingKey::SalesOrderReferencePattern,
        SettingKey::PurchaseOrderReferencePattern,
        SettingKey::BuildOrderReferencePattern,
        SettingKey::ReferenceDigits,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SettingKey::SalesOrderReferencePrefix => "SALESORDER_REFERENCE_PREFIX",
            SettingKey::PurchaseOrderReferencePrefix => "PURCHASEORDER_REFERENCE_PREFIX",
            SettingKey::BuildOrderReferencePrefix => "BUILDORDER_REFERENCE_PREFIX",
            SettingKey::SalesOrderReferencePattern => "SALESORDER_REFERENCE_PATTERN",
            SettingKey::PurchaseOrderReferencePattern => "PURCHASEORDER_REFERENCE_PATTERN",
            SettingKey::BuildOrderReferencePattern => "BUILDORDER_REFERENCE_PATTERN",
            SettingKey::ReferenceDigits => "REFERENCE_DIGITS",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SettingKey::SalesOrderReferencePrefix => "Prefix value for sales order reference",
            SettingKey::PurchaseOrderReferencePrefix => "Prefix value for purchase order reference",
            SettingKey::BuildOrderReferencePrefix => "Prefix value for build order reference",
            SettingKey::SalesOrderReferencePattern => {
                "Regular expression pattern for matching sales order reference"
            }
            SettingKey::PurchaseOrderReferencePattern => {
                "Regular expression pattern for matching purchase order reference"
            }
            SettingKey::BuildOrderReferencePattern => {
                "Regular expression pattern for matching build order reference"
            }
            SettingKey::ReferenceDigits => "Number of digits in a newly started reference sequence",
        }
    }

    pub fn kind(&self) -> SettingKind {
        match self {
            SettingKey::SalesOrderReferencePrefix
            | SettingKey::PurchaseOrderReferencePrefix
            | SettingKey::BuildOrderReferencePrefix => SettingKind::Text { max_len: 16 },
            SettingKey::SalesOrderReferencePattern
            | SettingKey::PurchaseOrderReferencePattern
            | SettingKey::BuildOrderReferencePattern => SettingKind::Pattern,
            SettingKey::ReferenceDigits => SettingKind::Integer { min: 1, max: 12 },
        }
    }

    pub fn default_value(&self) -> SettingValue {
        match self {
            SettingKey::SalesOrderReferencePrefix => {
                SettingValue::Text(OrderKind::SalesOrder.default_prefix().to_string())
            }
            SettingKey::PurchaseOrderReferencePrefix => {
                SettingValue::Text(OrderKind::PurchaseOrder.default_prefix().to_string())
            }
            SettingKey::BuildOrderReferencePrefix => {
                SettingValue::Text(OrderKind::BuildOrder.default_prefix().to_string())
            }
            SettingKey::SalesOrderReferencePattern
            | SettingKey::PurchaseOrderReferencePattern
            | SettingKey::BuildOrderReferencePattern => SettingValue::Pattern(None),
            SettingKey::ReferenceDigits => SettingValue::Integer(4),
        }
    }

    pub fn prefix_for(kind: OrderKind) -> Self {
        match kind {
            OrderKind::SalesOrder => SettingKey::SalesOrderReferencePrefix,
            OrderKind::PurchaseOrder => SettingKey::PurchaseOrderReferencePrefix,
            OrderKind::BuildOrder => SettingKey::BuildOrderReferencePrefix,
        }
    }

    pub fn pattern_for(kind: OrderKind) -> Self {
        match kind {
            OrderKind::SalesOrder => SettingKey::SalesOrderReferencePattern,
            OrderKind::PurchaseOrder => SettingKey::PurchaseOrderReferencePattern,
            OrderKind::BuildOrder => SettingKey::BuildOrderReferencePattern,
        }
    }

    /// Validate a raw value against this setting's kind
    pub fn validate(&self, raw: &str) -> Result<SettingValue, SettingError> {
        let key = self.name();
        let raw = raw.trim();

        match self.kind() {
            SettingKind::Text { max_len } => {
                if raw.chars().count() > max_len {
                    return Err(SettingError::TooLong { key, max: max_len });
                }
                Ok(SettingValue::Text(raw.to_string()))
            }
            SettingKind::Pattern => {
                if raw.is_empty() {
                    return Ok(SettingValue::Pattern(None));
                }
                Regex::new(raw).map_err(|e| SettingError::InvalidPattern {
                    key,
                    message: e.to_string(),
                })?;
                Ok(SettingValue::Pattern(Some(raw.to_string())))
            }
            SettingKind::Integer { min, max } => {
                let value: i64 = raw.parse().map_err(|_| SettingError::WrongType {
                    key,
                    expected: "integer",
                    value: raw.to_string(),
                })?;
                if value < min || value > max {
                    return Err(SettingError::OutOfRange {
                        key,
                        value,
                        min,
                        max,
                    });
                }
                Ok(SettingValue::Integer(value))
            }
            SettingKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(SettingValue::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(SettingValue::Bool(false)),
                _ => Err(SettingError::WrongType {
                    key,
                    expected: "boolean",
                    value: raw.to_string(),
                }),
            },
        }
    }
}

/// Reference prefixes, patterns and width for every order kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSettings {
    pub sales_order_prefix: String,
    pub purchase_order_prefix: String,
    pub build_order_prefix: String,
    pub sales_order_pattern: Option<String>,
    pub purchase_order_pattern: Option<String>,
    pub build_order_pattern: Option<String>,
    pub digits: usize,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            sales_order_prefix: OrderKind::SalesOrder.default_prefix().to_string(),
            purchase_order_prefix: OrderKind::PurchaseOrder.default_prefix().to_string(),
            build_order_prefix: OrderKind::BuildOrder.default_prefix().to_string(),
            sales_order_pattern: None,
            purchase_order_pattern: None,
            build_order_pattern: None,
            digits: 4,
        }
    }
}

impl ReferenceSettings {
    pub fn prefix(&self, kind: OrderKind) -> &str {
        match kind {
            OrderKind::SalesOrder => &self.sales_order_prefix,
            OrderKind::PurchaseOrder => &self.purchase_order_prefix,
            OrderKind::BuildOrder => &self.build_order_prefix,
        }
    }

    pub fn pattern(&self, kind: OrderKind) -> Option<&str> {
        match kind {
            OrderKind::SalesOrder => self.sales_order_pattern.as_deref(),
            OrderKind::PurchaseOrder => self.purchase_order_pattern.as_deref(),
            OrderKind::BuildOrder => self.build_order_pattern.as_deref(),
        }
    }

    /// Validate `raw` for `key` and store it
    pub fn apply(&mut self, key: SettingKey, raw: &str) -> Result<(), SettingError> {
        let value = key.validate(raw)?;

        match (key, value) {
            (SettingKey::SalesOrderReferencePrefix, SettingValue::Text(v)) => self.sales_order_prefix = v,
            (SettingKey::PurchaseOrderReferencePrefix, SettingValue::Text(v)) => {
                self.purchase_order_prefix = v
            }
            (SettingKey::BuildOrderReferencePrefix, SettingValue::Text(v)) => self.build_order_prefix = v,
            (SettingKey::SalesOrderReferencePattern, SettingValue::Pattern(v)) => {
                self.sales_order_pattern = v
            }
            (SettingKey::PurchaseOrderReferencePattern, SettingValue::Pattern(v)) => {
                self.purchase_order_pattern = v
            }
            (SettingKey::BuildOrderReferencePattern, SettingValue::Pattern(v)) => {
                self.build_order_pattern = v
            }
            (SettingKey::ReferenceDigits, SettingValue::Integer(v)) => {
                // validate() bounds the value to 1..=12
                self.digits = usize::try_from(v).unwrap_or(4)
            }
            _ => unreachable!("validate() returns the value kind declared for each key"),
        }

        Ok(())
    }
}
