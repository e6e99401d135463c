//! Data entry for stock units, demand lines and shipments

use rust_decimal::Decimal;
use serde::Deserialize;
use shared::models::{AllocationLine, DemandKind, LineStatus, Shipment, StockOwner, StockUnit};
use shared::validation;
use sqlx::PgPool;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};
use crate::models::{
    AllocationRow, LineRow, ShipmentRow, StockUnitRow, ALLOCATION_COLUMNS, LINE_COLUMNS, SHIPMENT_COLUMNS,
    STOCK_UNIT_COLUMNS,
};

/// Stock, line and shipment records
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

fn rule_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn on_hand_quantity(quantity: &Decimal) -> Result<(), ValidationError> {
    validation::validate_required_quantity(*quantity).map_err(|m| rule_error("quantity", m))
}

fn required_quantity(quantity: &Decimal) -> Result<(), ValidationError> {
    validation::validate_required_quantity(*quantity).map_err(|m| rule_error("required_quantity", m))
}

fn serial_token(serial: &str) -> Result<(), ValidationError> {
    validation::validate_serial_token(serial).map_err(|m| rule_error("serial", m))
}

fn shipment_reference(reference: &str) -> Result<(), ValidationError> {
    validation::validate_shipment_reference(reference).map_err(|m| rule_error("reference", m))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStockUnitInput {
    pub part_id: Uuid,
    #[validate(custom = "on_hand_quantity")]
    pub quantity: Decimal,
    #[validate(custom = "serial_token")]
    pub serial: Option<String>,
    #[serde(default)]
    pub trackable: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLineInput {
    pub parent_id: Uuid,
    pub kind: DemandKind,
    pub part_id: Uuid,
    #[serde(default)]
    pub variant_parts: Vec<Uuid>,
    #[serde(default)]
    pub substitute_parts: Vec<Uuid>,
    #[validate(custom = "required_quantity")]
    pub required_quantity: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateShipmentInput {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    #[validate(custom = "shipment_reference")]
    pub reference: Option<String>,
    #[validate(length(max = 100, message = "Tracking number is too long"))]
    pub tracking_number: Option<String>,
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_unit(&self, input: CreateStockUnitInput) -> AppResult<StockUnit> {
        let serial = input.serial.map(|s| s.trim().to_string());
        if serial.is_some() && input.quantity != Decimal::ONE {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Serialized stock must have a quantity of 1".to_string(),
            });
        }

        let sql = format!(
            r#"
            INSERT INTO stock_units (id, part_id, quantity, serial, trackable, owner_kind)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            STOCK_UNIT_COLUMNS
        );

        let row = sqlx::query_as::<_, StockUnitRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.part_id)
            .bind(input.quantity)
            .bind(&serial)
            .bind(input.trackable || serial.is_some())
            .bind(StockOwner::InStock.as_str())
            .fetch_one(&self.db)
            .await?;

        StockUnit::try_from(row)
    }

    pub async fn get_unit(&self, unit_id: Uuid) -> AppResult<StockUnit> {
        let sql = format!("SELECT {} FROM stock_units WHERE id = $1", STOCK_UNIT_COLUMNS);

        let row = sqlx::query_as::<_, StockUnitRow>(&sql)
            .bind(unit_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock unit".to_string()))?;

        StockUnit::try_from(row)
    }

    pub async fn create_line(&self, input: CreateLineInput) -> AppResult<AllocationLine> {
        let sql = format!(
            r#"
            INSERT INTO allocation_lines
                (id, parent_id, kind, part_id, variant_parts, substitute_parts, required_quantity, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            LINE_COLUMNS
        );

        let row = sqlx::query_as::<_, LineRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.parent_id)
            .bind(input.kind.as_str())
            .bind(input.part_id)
            .bind(&input.variant_parts)
            .bind(&input.substitute_parts)
            .bind(input.required_quantity)
            .bind(LineStatus::Open.as_str())
            .fetch_one(&self.db)
            .await?;

        AllocationLine::try_from(row)
    }

    pub async fn get_line(&self, line_id: Uuid) -> AppResult<AllocationLine> {
        let sql = format!("SELECT {} FROM allocation_lines WHERE id = $1", LINE_COLUMNS);

        let row = sqlx::query_as::<_, LineRow>(&sql)
            .bind(line_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Line".to_string()))?;

        AllocationLine::try_from(row)
    }

    /// Every allocation recorded against a line, pending and consumed
    pub async fn line_allocations(&self, line_id: Uuid) -> AppResult<Vec<shared::models::Allocation>> {
        let sql = format!(
            "SELECT {} FROM allocations WHERE line_id = $1 ORDER BY created_at, id",
            ALLOCATION_COLUMNS
        );

        let rows = sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(line_id)
            .fetch_all(&self.db)
            .await?;

        crate::models::convert_rows(rows)
    }

    pub async fn create_shipment(&self, input: CreateShipmentInput) -> AppResult<Shipment> {
        let reference = input
            .reference
            .map(|r| r.trim().to_string())
            .unwrap_or_else(|| "1".to_string());

        let sql = format!(
            r#"
            INSERT INTO shipments (id, order_id, customer_id, reference, tracking_number)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            SHIPMENT_COLUMNS
        );

        let result = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.order_id)
            .bind(input.customer_id)
            .bind(&reference)
            .bind(&input.tracking_number)
            .fetch_one(&self.db)
            .await;

        match result {
            Ok(row) => Ok(Shipment::from(row)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict {
                resource: "reference".to_string(),
                message: format!("Shipment '{}' already exists for this order", reference),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_shipment(&self, shipment_id: Uuid) -> AppResult<Shipment> {
        let sql = format!("SELECT {} FROM shipments WHERE id = $1", SHIPMENT_COLUMNS);

        let row = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(shipment_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Shipment".to_string()))?;

        Ok(Shipment::from(row))
    }
}
