//! Serial number service

use serde::{Deserialize, Serialize};
use shared::models::Serial;
use shared::serial;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;

/// Serial number resolution against stored stock units
#[derive(Clone)]
pub struct SerialService {
    db: PgPool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveSerialsInput {
    #[validate(length(min = 1, max = 1000, message = "Serial number string must be 1-1000 characters"))]
    pub spec: String,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: usize,
    /// Value substituted for `~`; counted from 1 when absent
    pub next_available: Option<u64>,
    /// Report serials that already exist for this part
    pub part_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ResolvedSerials {
    pub serials: Vec<Serial>,
    /// Resolved serials already used by a stock unit of the part
    pub conflicts: Vec<Serial>,
}

#[derive(Debug, Serialize)]
pub struct NextSerial {
    pub part_id: Uuid,
    pub latest: Option<Serial>,
    pub next: u64,
    /// Placeholder spec for the next `quantity` serials
    pub hint: String,
}

impl SerialService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Serials of every stock unit of `part_id`, oldest first
    pub async fn serials_for_part(&self, part_id: Uuid) -> AppResult<Vec<Serial>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT serial FROM stock_units
            WHERE part_id = $1 AND serial IS NOT NULL AND btrim(serial) <> ''
            ORDER BY created_at, id
            "#,
        )
        .bind(part_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(|s| Serial::parse(s)).collect())
    }

    pub async fn resolve(&self, input: ResolveSerialsInput) -> AppResult<ResolvedSerials> {
        let existing = match input.part_id {
            Some(part_id) => self.serials_for_part(part_id).await?,
            None => Vec::new(),
        };

        let next = input
            .next_available
            .unwrap_or_else(|| serial::next_serial_number(&existing));

        let serials = serial::resolve(&input.spec, input.quantity, next)?;
        let conflicts = serial::find_conflicts(&serials, &existing);

        tracing::debug!(count = serials.len(), conflicts = conflicts.len(), "Resolved serial numbers");
        Ok(ResolvedSerials { serials, conflicts })
    }

    pub async fn next_serial(&self, part_id: Uuid, quantity: usize) -> AppResult<NextSerial> {
        let existing = self.serials_for_part(part_id).await?;

        Ok(NextSerial {
            part_id,
            latest: serial::latest_serial(&existing),
            next: serial::next_serial_number(&existing),
            hint: serial::serial_hint(&existing, quantity.max(1)),
        })
    }
}
