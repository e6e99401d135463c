//! Database models for the allocation server
//!
//! Re-exports the engine models from the shared crate and adds the row
//! types the services read from PostgreSQL.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

pub use shared::models::*;

use crate::error::AppError;

/// Column list matching [`StockUnitRow`]
pub const STOCK_UNIT_COLUMNS: &str = "id, part_id, quantity, serial, trackable, owner_kind, owner_id";

/// Column list matching [`LineRow`]
pub const LINE_COLUMNS: &str = "id, parent_id, kind, part_id, variant_parts, substitute_parts, \
     required_quantity, fulfilled_quantity, status";

/// Column list matching [`AllocationRow`]
pub const ALLOCATION_COLUMNS: &str =
    "id, line_id, stock_unit_id, quantity, parent_id, bucket_id, install_into, state";

/// Column list matching [`ShipmentRow`]
pub const SHIPMENT_COLUMNS: &str = "id, order_id, customer_id, reference, shipped_at, tracking_number";

fn corrupt(table: &str, id: Uuid, column: &str, value: &str) -> AppError {
    AppError::Internal(format!("{} {} has invalid {} '{}'", table, id, column, value))
}

#[derive(Debug, Clone, FromRow)]
pub struct StockUnitRow {
    pub id: Uuid,
    pub part_id: Uuid,
    pub quantity: Decimal,
    pub serial: Option<String>,
    pub trackable: bool,
    pub owner_kind: String,
    pub owner_id: Option<Uuid>,
}

impl TryFrom<StockUnitRow> for StockUnit {
    type Error = AppError;

    fn try_from(row: StockUnitRow) -> Result<Self, Self::Error> {
        let owner = StockOwner::from_parts(&row.owner_kind, row.owner_id)
            .ok_or_else(|| corrupt("Stock unit", row.id, "owner", &row.owner_kind))?;

        Ok(StockUnit {
            id: row.id,
            part_id: row.part_id,
            quantity: row.quantity,
            serial: row.serial,
            trackable: row.trackable,
            owner,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LineRow {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub kind: String,
    pub part_id: Uuid,
    pub variant_parts: Vec<Uuid>,
    pub substitute_parts: Vec<Uuid>,
    pub required_quantity: Decimal,
    pub fulfilled_quantity: Decimal,
    pub status: String,
}

impl TryFrom<LineRow> for AllocationLine {
    type Error = AppError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        let kind = DemandKind::from_str(&row.kind).ok_or_else(|| corrupt("Line", row.id, "kind", &row.kind))?;
        let status =
            LineStatus::from_str(&row.status).ok_or_else(|| corrupt("Line", row.id, "status", &row.status))?;

        Ok(AllocationLine {
            id: row.id,
            parent_id: row.parent_id,
            kind,
            part_id: row.part_id,
            variant_parts: row.variant_parts,
            substitute_parts: row.substitute_parts,
            required_quantity: row.required_quantity,
            fulfilled_quantity: row.fulfilled_quantity,
            status,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AllocationRow {
    pub id: Uuid,
    pub line_id: Uuid,
    pub stock_unit_id: Uuid,
    pub quantity: Decimal,
    pub parent_id: Uuid,
    pub bucket_id: Uuid,
    pub install_into: Option<Uuid>,
    pub state: String,
}

impl TryFrom<AllocationRow> for Allocation {
    type Error = AppError;

    fn try_from(row: AllocationRow) -> Result<Self, Self::Error> {
        let state = AllocationState::from_str(&row.state)
            .ok_or_else(|| corrupt("Allocation", row.id, "state", &row.state))?;

        Ok(Allocation {
            id: row.id,
            line_id: row.line_id,
            stock_unit_id: row.stock_unit_id,
            quantity: row.quantity,
            parent_id: row.parent_id,
            bucket_id: row.bucket_id,
            install_into: row.install_into,
            state,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ShipmentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub reference: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
}

impl From<ShipmentRow> for Shipment {
    fn from(row: ShipmentRow) -> Self {
        Shipment {
            id: row.id,
            order_id: row.order_id,
            customer_id: row.customer_id,
            reference: row.reference,
            shipped_at: row.shipped_at,
            tracking_number: row.tracking_number,
        }
    }
}

/// Convert a batch of rows, failing on the first corrupt one
pub fn convert_rows<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_row(owner_kind: &str, owner_id: Option<Uuid>) -> StockUnitRow {
        StockUnitRow {
            id: Uuid::new_v4(),
            part_id: Uuid::new_v4(),
            quantity: Decimal::from(4),
            serial: None,
            trackable: false,
            owner_kind: owner_kind.to_string(),
            owner_id,
        }
    }

    #[test]
    fn test_stock_unit_owner_mapping() {
        let customer = Uuid::new_v4();
        let unit = StockUnit::try_from(unit_row("customer", Some(customer))).unwrap();
        assert_eq!(unit.owner, StockOwner::Customer(customer));

        let unit = StockUnit::try_from(unit_row("in_stock", None)).unwrap();
        assert!(unit.is_in_stock());
    }

    #[test]
    fn test_corrupt_rows_are_internal_errors() {
        assert!(matches!(
            StockUnit::try_from(unit_row("customer", None)),
            Err(AppError::Internal(_))
        ));

        let row = AllocationRow {
            id: Uuid::new_v4(),
            line_id: Uuid::new_v4(),
            stock_unit_id: Uuid::new_v4(),
            quantity: Decimal::ONE,
            parent_id: Uuid::new_v4(),
            bucket_id: Uuid::new_v4(),
            install_into: None,
            state: "shipped".to_string(),
        };
        assert!(matches!(Allocation::try_from(row), Err(AppError::Internal(_))));
    }
}
