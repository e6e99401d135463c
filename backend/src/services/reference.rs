//! Order reference service: sequencing and validation against stored orders

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::OrderKind;
use shared::reference::{first_reference, next_available_reference, validate_reference, Reference};
use shared::settings::ReferenceSettings;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Reference service backed by the `orders` table
#[derive(Clone)]
pub struct ReferenceService {
    db: PgPool,
    settings: Arc<ReferenceSettings>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NextReferenceInput {
    /// Reference to count on from; the latest stored one when absent
    #[validate(length(max = 64, message = "Reference is too long"))]
    pub last: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateReferenceInput {
    pub kind: OrderKind,
    #[validate(length(min = 1, max = 64, message = "Reference must be 1-64 characters"))]
    pub reference: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderInput {
    pub kind: OrderKind,
    /// Explicit reference; the next free one is assigned when absent
    #[validate(length(min = 1, max = 64, message = "Reference must be 1-64 characters"))]
    pub reference: Option<String>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReferenceResponse {
    pub kind: OrderKind,
    pub reference: Reference,
    pub reference_int: i64,
}

#[derive(Debug, Serialize)]
pub struct ReferenceCheck {
    pub reference: Reference,
    pub reference_int: i64,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub kind: String,
    pub reference: String,
    pub reference_int: i64,
    pub customer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ReferenceService {
    pub fn new(db: PgPool, settings: Arc<ReferenceSettings>) -> Self {
        Self { db, settings }
    }

    /// Stored references of `kind` that start with `prefix`
    async fn taken_references(&self, kind: OrderKind, prefix: &str) -> AppResult<HashSet<Reference>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT reference FROM orders WHERE kind = $1 AND LEFT(reference, char_length($2)) = $2",
        )
        .bind(kind.as_str())
        .bind(prefix)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Reference::new).collect())
    }

    /// Highest stored reference of `kind` under the configured prefix
    async fn latest_reference(&self, kind: OrderKind) -> AppResult<Option<Reference>> {
        let latest = sqlx::query_scalar::<_, String>(
            r#"
            SELECT reference FROM orders
            WHERE kind = $1 AND LEFT(reference, char_length($2)) = $2
            ORDER BY reference_int DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .bind(self.settings.prefix(kind))
        .fetch_optional(&self.db)
        .await?;

        Ok(latest.map(Reference::new))
    }

    async fn exists(&self, kind: OrderKind, reference: &Reference) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE kind = $1 AND reference = $2)",
        )
        .bind(kind.as_str())
        .bind(reference.as_str())
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    /// Next unused reference of `kind`, counting on from `last`
    pub async fn next_reference(&self, kind: OrderKind, last: Option<&str>) -> AppResult<Reference> {
        let last = match last.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => Some(Reference::new(value)),
            None => self.latest_reference(kind).await?,
        };

        let reference = match last {
            Some(last) => {
                let taken = self.taken_references(kind, last.prefix()).await?;
                next_available_reference(&last, |r| taken.contains(r))?
            }
            None => {
                let first = first_reference(self.settings.prefix(kind), self.settings.digits);
                let taken = self.taken_references(kind, first.prefix()).await?;
                if taken.contains(&first) {
                    next_available_reference(&first, |r| taken.contains(r))?
                } else {
                    first
                }
            }
        };

        tracing::debug!(kind = kind.as_str(), reference = %reference, "Sequenced reference");
        Ok(reference)
    }

    /// Check a user-supplied reference against the kind's pattern and the
    /// stored orders
    pub async fn check(&self, kind: OrderKind, value: &str) -> AppResult<ReferenceCheck> {
        let reference = validate_reference(value, self.settings.pattern(kind))?;
        let available = !self.exists(kind, &reference).await?;

        Ok(ReferenceCheck {
            reference_int: reference.reference_int(),
            reference,
            available,
        })
    }

    /// Create an order row, assigning the next free reference when none is
    /// given
    pub async fn create_order(&self, input: CreateOrderInput) -> AppResult<OrderRecord> {
        let reference = match input.reference.as_deref() {
            Some(value) => {
                let check = self.check(input.kind, value).await?;
                if !check.available {
                    return Err(AppError::Conflict {
                        resource: "reference".to_string(),
                        message: format!("Reference '{}' is already in use", check.reference),
                    });
                }
                check.reference
            }
            None => self.next_reference(input.kind, None).await?,
        };

        let result = sqlx::query_as::<_, OrderRecord>(
            r#"
            INSERT INTO orders (id, kind, reference, reference_int, customer_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, kind, reference, reference_int, customer_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.kind.as_str())
        .bind(reference.as_str())
        .bind(reference.reference_int())
        .bind(input.customer_id)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(order) => {
                tracing::info!(order = %order.id, reference = %order.reference, "Created order");
                Ok(order)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict {
                resource: "reference".to_string(),
                message: format!("Reference '{}' is already in use", reference),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
