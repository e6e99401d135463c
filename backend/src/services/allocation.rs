//! PostgreSQL-backed stock allocation ledger
//!
//! Every mutating operation runs in one transaction. Rows are locked with
//! `SELECT ... FOR UPDATE` in a fixed order (shipment, lines by id, units by
//! id) before allocation sums are re-read, so concurrent requests against
//! the same stock serialize instead of over-allocating. The rules themselves
//! are the shared ledger rules used by the in-memory ledger.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::error::{AllocationError, AllocationErrors, StoreError};
use shared::events::{EventRegistry, LedgerEvent, BUILD_ALLOCATION_COMPLETED, SHIPMENT_COMPLETED};
use shared::ledger::rules::{self, CommitAction, CommitStep};
use shared::models::{
    Allocation, AllocationContext, AllocationLine, AllocationRequest, AllocationState, CommitReport,
    CommitTarget, DemandKind, LineStatus, StockUnit,
};
use shared::serial;
use shared::types::LineProgress;
use shared::validation;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};
use crate::models::{
    convert_rows, AllocationRow, LineRow, ShipmentRow, StockUnitRow, ALLOCATION_COLUMNS, LINE_COLUMNS,
    SHIPMENT_COLUMNS, STOCK_UNIT_COLUMNS,
};

/// Allocation ledger over the `allocations`, `allocation_lines`,
/// `stock_units` and `shipments` tables
#[derive(Clone)]
pub struct AllocationService {
    db: PgPool,
    events: Arc<EventRegistry>,
}

fn allocation_quantity(quantity: &Decimal) -> Result<(), ValidationError> {
    validation::validate_allocation_quantity(*quantity).map_err(|m| {
        let mut error = ValidationError::new("quantity");
        error.message = Some(m.into());
        error
    })
}

#[derive(Debug, Deserialize, Validate)]
pub struct AllocateInput {
    pub line_id: Uuid,
    pub stock_unit_id: Uuid,
    #[validate(custom = "allocation_quantity")]
    pub quantity: Decimal,
    pub context: AllocationContext,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AllocationItemInput {
    pub line_id: Uuid,
    pub stock_unit_id: Uuid,
    #[validate(custom = "allocation_quantity")]
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AllocateBatchInput {
    pub context: AllocationContext,
    #[validate(length(min = 1, message = "Allocation items must be provided"))]
    pub items: Vec<AllocationItemInput>,
}

impl AllocateBatchInput {
    /// Validate the batch and each of its items
    pub fn validate_all(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        self.items.iter().try_for_each(Validate::validate)
    }

    pub fn requests(&self) -> Vec<AllocationRequest> {
        self.items
            .iter()
            .map(|item| AllocationRequest {
                line_id: item.line_id,
                stock_unit_id: item.stock_unit_id,
                quantity: item.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AllocateSerialsInput {
    pub line_id: Uuid,
    #[validate(length(min = 1, max = 1000, message = "Serial number string must be 1-1000 characters"))]
    pub serial_numbers: String,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: usize,
    pub context: AllocationContext,
}

#[derive(Debug, Deserialize)]
pub struct AutoAllocateInput {
    /// Limit to one line of the build; every open line otherwise
    pub line_id: Option<Uuid>,
    /// Build output the allocated stock installs into
    pub output: Option<Uuid>,
    #[serde(default)]
    pub interchangeable: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommitBuildInput {
    pub output: Option<Uuid>,
}

/// Allocation state of every line of a sales order or build
#[derive(Debug, Serialize)]
pub struct ParentProgress {
    pub parent_id: Uuid,
    pub lines: Vec<LineStatusEntry>,
    pub fully_allocated: bool,
    pub over_allocated: bool,
}

#[derive(Debug, Serialize)]
pub struct LineStatusEntry {
    pub line_id: Uuid,
    #[serde(flatten)]
    pub progress: LineProgress,
    pub percent: Decimal,
}

impl LineStatusEntry {
    fn new(line: &AllocationLine, allocated: Decimal) -> Self {
        let progress = LineProgress::new(line, allocated);
        Self {
            line_id: line.id,
            percent: progress.percent(),
            progress,
        }
    }
}

impl AllocationService {
    pub fn new(db: PgPool, events: Arc<EventRegistry>) -> Self {
        Self { db, events }
    }

    /// Allocate stock from one unit to one line
    pub async fn allocate(&self, input: AllocateInput) -> AppResult<Allocation> {
        let request = AllocationRequest {
            line_id: input.line_id,
            stock_unit_id: input.stock_unit_id,
            quantity: input.quantity,
        };

        let mut placed = self.allocate_many(input.context, &[request]).await?;
        placed
            .pop()
            .ok_or_else(|| AppError::Internal("Allocation was not recorded".to_string()))
    }

    /// Allocate a batch atomically; every failing item is reported and
    /// nothing is written when any item fails
    pub async fn allocate_many(
        &self,
        context: AllocationContext,
        requests: &[AllocationRequest],
    ) -> AppResult<Vec<Allocation>> {
        if requests.is_empty() {
            return Err(AllocationErrors(vec![AllocationError::EmptyRequest]).into());
        }

        let mut tx = self.db.begin().await?;
        check_context(&mut tx, &context).await?;
        let placed = place_requests(&mut tx, &context, requests).await?;
        tx.commit().await?;

        tracing::info!(
            bucket = %context.bucket_id(),
            count = placed.len(),
            "Allocated stock"
        );
        Ok(placed)
    }

    /// Resolve a serial number spec for a line's part and allocate one
    /// in-stock unit per serial
    pub async fn allocate_serials(&self, input: AllocateSerialsInput) -> AppResult<Vec<Allocation>> {
        let context = input.context;

        let mut tx = self.db.begin().await?;
        check_context(&mut tx, &context).await?;

        let line = lock_line(&mut tx, input.line_id).await?;
        let units = lock_part_units(&mut tx, &[line.part_id]).await?;

        let existing: Vec<_> = units.iter().filter_map(StockUnit::serial_token).collect();
        let next = serial::next_serial_number(&existing);
        let serials =
            serial::resolve(&input.serial_numbers, input.quantity, next).map_err(AllocationError::from)?;

        let unit_ids: Vec<Uuid> = units.iter().map(|u| u.id).collect();
        let pending = pending_for_units(&mut tx, &unit_ids).await?;

        let mut requests = Vec::with_capacity(serials.len());
        let mut errors = Vec::new();

        for sn in serials {
            let unit = units
                .iter()
                .find(|u| u.is_in_stock() && u.serial_token().as_ref() == Some(&sn));

            match unit {
                None => errors.push(AllocationError::SerialNotFound(sn)),
                Some(unit) if rules::allocated_on_unit(unit.id, &pending) > Decimal::ZERO => {
                    errors.push(AllocationError::SerialAlreadyAllocated(sn))
                }
                Some(unit) => requests.push(AllocationRequest {
                    line_id: line.id,
                    stock_unit_id: unit.id,
                    quantity: Decimal::ONE,
                }),
            }
        }

        if !errors.is_empty() {
            return Err(AllocationErrors(errors).into());
        }

        let placed = place_requests(&mut tx, &context, &requests).await?;
        tx.commit().await?;

        tracing::info!(line = %line.id, count = placed.len(), "Allocated serialized stock");
        Ok(placed)
    }

    /// Fill the unallocated quantity of a build's lines from ranked stock
    pub async fn auto_allocate(&self, build_id: Uuid, input: AutoAllocateInput) -> AppResult<Vec<Allocation>> {
        let context = AllocationContext::Build {
            build_id,
            install_into: input.output,
        };

        let mut tx = self.db.begin().await?;

        let lines = match input.line_id {
            Some(line_id) => {
                let line = lock_line(&mut tx, line_id).await?;
                if line.kind != DemandKind::Build {
                    return Err(AllocationError::OrderMismatch {
                        line: line.id,
                        context: build_id,
                    }
                    .into());
                }
                vec![line]
            }
            None => lock_open_lines(&mut tx, build_id, DemandKind::Build).await?,
        };

        let mut placed = Vec::new();
        for line in &lines {
            let units = lock_part_units(&mut tx, &line.accepted_parts()).await?;
            let unit_ids: Vec<Uuid> = units.iter().map(|u| u.id).collect();
            let allocations = allocations_for_line_and_units(&mut tx, line.id, &unit_ids).await?;

            let requests = rules::plan_auto_allocation(line, &units, &allocations, input.interchangeable);
            if requests.is_empty() {
                tracing::debug!(line = %line.id, "Nothing to auto allocate");
                continue;
            }

            placed.extend(place_requests(&mut tx, &context, &requests).await?);
        }

        tx.commit().await?;

        tracing::info!(build = %build_id, count = placed.len(), "Auto allocated stock");
        Ok(placed)
    }

    /// Remove a pending allocation
    pub async fn deallocate(&self, allocation_id: Uuid) -> AppResult<Allocation> {
        let mut tx = self.db.begin().await?;

        let line_id = sqlx::query_scalar::<_, Uuid>("SELECT line_id FROM allocations WHERE id = $1")
            .bind(allocation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AllocationError::NotFound(format!("Allocation {}", allocation_id)))?;

        // Line before allocation, the same order allocate takes them in
        let line = lock_line(&mut tx, line_id).await?;

        let sql = format!("SELECT {} FROM allocations WHERE id = $1 FOR UPDATE", ALLOCATION_COLUMNS);
        let allocation = sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(allocation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AllocationError::NotFound(format!("Allocation {}", allocation_id)))?;
        let allocation = Allocation::try_from(allocation)?;

        if allocation.state == AllocationState::Consumed {
            return Err(AllocationError::AlreadyConsumed(allocation.id).into());
        }
        if !line.is_active() {
            return Err(AllocationError::LineNotOpen(line.id).into());
        }
        if line.kind == DemandKind::SalesOrder {
            let shipped = sqlx::query_scalar::<_, bool>(
                "SELECT shipped_at IS NOT NULL FROM shipments WHERE id = $1",
            )
            .bind(allocation.bucket_id)
            .fetch_optional(&mut *tx)
            .await?
            .unwrap_or(false);

            if shipped {
                return Err(AllocationError::AlreadyShipped(allocation.bucket_id).into());
            }
        }

        sqlx::query("DELETE FROM allocations WHERE id = $1")
            .bind(allocation.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(allocation = %allocation.id, line = %line.id, "Deallocated stock");
        Ok(allocation)
    }

    /// Cancel an open line, dropping its pending allocations
    pub async fn cancel_line(&self, line_id: Uuid) -> AppResult<AllocationLine> {
        let mut tx = self.db.begin().await?;
        let line = lock_line(&mut tx, line_id).await?;
        let line = cancel_locked(&mut tx, line).await?;
        tx.commit().await?;

        Ok(line)
    }

    /// Cancel every open line of a sales order or build; returns the
    /// cancelled line ids in order
    pub async fn cancel_parent(&self, parent_id: Uuid, kind: DemandKind) -> AppResult<Vec<Uuid>> {
        let mut tx = self.db.begin().await?;

        let any = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM allocation_lines WHERE parent_id = $1 AND kind = $2)",
        )
        .bind(parent_id)
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?;

        if !any {
            return Err(AllocationError::NotFound(format!("Lines for {}", parent_id)).into());
        }

        let lines = lock_open_lines(&mut tx, parent_id, kind).await?;
        let mut cancelled = Vec::with_capacity(lines.len());
        for line in lines {
            cancelled.push(cancel_locked(&mut tx, line).await?.id);
        }

        tx.commit().await?;

        tracing::info!(parent = %parent_id, count = cancelled.len(), "Cancelled lines");
        Ok(cancelled)
    }

    pub async fn line_status(&self, line_id: Uuid) -> AppResult<LineStatusEntry> {
        let sql = format!("SELECT {} FROM allocation_lines WHERE id = $1", LINE_COLUMNS);
        let row = sqlx::query_as::<_, LineRow>(&sql)
            .bind(line_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AllocationError::NotFound(format!("Line {}", line_id)))?;
        let line = AllocationLine::try_from(row)?;

        let allocated = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(quantity), 0) FROM allocations WHERE line_id = $1",
        )
        .bind(line_id)
        .fetch_one(&self.db)
        .await?;

        Ok(LineStatusEntry::new(&line, allocated))
    }

    /// Allocation state of a whole sales order or build. Cancelled lines do
    /// not count towards the totals.
    pub async fn parent_status(&self, parent_id: Uuid, kind: DemandKind) -> AppResult<ParentProgress> {
        let sql = format!(
            "SELECT {} FROM allocation_lines WHERE parent_id = $1 AND kind = $2 ORDER BY id",
            LINE_COLUMNS
        );
        let rows = sqlx::query_as::<_, LineRow>(&sql)
            .bind(parent_id)
            .bind(kind.as_str())
            .fetch_all(&self.db)
            .await?;
        let lines: Vec<AllocationLine> = convert_rows(rows)?;

        if lines.is_empty() {
            return Err(AllocationError::NotFound(format!("Lines for {}", parent_id)).into());
        }

        let line_ids: Vec<Uuid> = lines.iter().map(|l| l.id).collect();
        let sums: HashMap<Uuid, Decimal> = sqlx::query_as::<_, (Uuid, Decimal)>(
            r#"
            SELECT line_id, COALESCE(SUM(quantity), 0)
            FROM allocations
            WHERE line_id = ANY($1)
            GROUP BY line_id
            "#,
        )
        .bind(&line_ids)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .collect();

        let entries: Vec<LineStatusEntry> = lines
            .iter()
            .map(|l| LineStatusEntry::new(l, sums.get(&l.id).copied().unwrap_or_default()))
            .collect();

        let active = || entries.iter().filter(|e| e.progress.status != LineStatus::Cancelled);

        Ok(ParentProgress {
            parent_id,
            fully_allocated: active().all(|e| e.progress.fully_allocated),
            over_allocated: active().any(|e| e.progress.over_allocated),
            lines: entries,
        })
    }

    /// Finalize every pending allocation of a shipment or build output.
    ///
    /// Any failure drops the transaction, so stock, lines and allocations
    /// are left exactly as they were.
    pub async fn commit(&self, target: CommitTarget) -> AppResult<CommitReport> {
        let report = match self.commit_in_tx(target).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(bucket = %target.bucket_id(), error = %e, "Commit rejected");
                return Err(e);
            }
        };

        let tag = match target {
            CommitTarget::Shipment { .. } => SHIPMENT_COMPLETED,
            CommitTarget::Build { .. } => BUILD_ALLOCATION_COMPLETED,
        };
        let event = LedgerEvent::new(tag, target.bucket_id()).with_payload(serde_json::json!({
            "allocations": report.allocations.len(),
            "closed_lines": report.closed_lines,
            "quantity": report.total_quantity,
        }));
        let handled = self.events.trigger(&event);

        tracing::info!(
            bucket = %target.bucket_id(),
            allocations = report.allocations.len(),
            closed = report.closed_lines.len(),
            quantity = %report.total_quantity,
            handlers = handled,
            "Committed allocations"
        );
        Ok(report)
    }

    async fn commit_in_tx(&self, target: CommitTarget) -> AppResult<CommitReport> {
        let mut tx = self.db.begin().await?;

        let customer_id = match target {
            CommitTarget::Shipment { shipment_id } => {
                let sql = format!("SELECT {} FROM shipments WHERE id = $1 FOR UPDATE", SHIPMENT_COLUMNS);
                let shipment = sqlx::query_as::<_, ShipmentRow>(&sql)
                    .bind(shipment_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AllocationError::NotFound(format!("Shipment {}", shipment_id)))?;

                if shipment.shipped_at.is_some() {
                    return Err(AllocationError::AlreadyShipped(shipment_id).into());
                }
                Some(shipment.customer_id)
            }
            CommitTarget::Build { .. } => None,
        };

        let sql = format!(
            "SELECT {} FROM allocations WHERE bucket_id = $1 AND state = 'allocated'",
            ALLOCATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(target.bucket_id())
            .fetch_all(&mut *tx)
            .await?;
        let covered: Vec<Allocation> = convert_rows::<_, Allocation>(rows)?
            .into_iter()
            .filter(|a| target.covers(a))
            .collect();

        if covered.is_empty() {
            return Err(AllocationError::NothingToCommit(target.bucket_id()).into());
        }

        let line_ids: Vec<Uuid> = covered
            .iter()
            .map(|a| a.line_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut lines = lock_lines(&mut tx, &line_ids).await?;

        // Open -> Fulfilling for the duration of the commit
        sqlx::query(
            "UPDATE allocation_lines SET status = $2 WHERE id = ANY($1) AND status = $3",
        )
        .bind(&line_ids)
        .bind(LineStatus::Fulfilling.as_str())
        .bind(LineStatus::Open.as_str())
        .execute(&mut *tx)
        .await?;
        for line in lines.iter_mut() {
            if line.status.can_transition_to(LineStatus::Fulfilling) {
                line.status = LineStatus::Fulfilling;
            }
        }

        let unit_ids: Vec<Uuid> = covered
            .iter()
            .map(|a| a.stock_unit_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let units = lock_units(&mut tx, &unit_ids).await?;

        let plan = rules::plan_commit(&target, customer_id, &covered, &units, &lines)?;

        let mut committed = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let unit_id = apply_step(&mut tx, step).await?;

            sqlx::query(
                r#"
                UPDATE allocations
                SET state = $2, stock_unit_id = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(step.allocation_id)
            .bind(AllocationState::Consumed.as_str())
            .bind(unit_id)
            .execute(&mut *tx)
            .await?;

            if let Some(allocation) = covered.iter().find(|a| a.id == step.allocation_id) {
                let mut allocation = allocation.clone();
                allocation.stock_unit_id = unit_id;
                allocation.state = AllocationState::Consumed;
                committed.push(allocation);
            }
        }

        let mut closed_lines = Vec::new();
        for (line_id, fulfilled) in plan.fulfilled_by_line() {
            let Some(line) = lines.iter().find(|l| l.id == line_id) else {
                continue;
            };
            let status = rules::status_after_commit(line, fulfilled);

            sqlx::query(
                r#"
                UPDATE allocation_lines
                SET fulfilled_quantity = fulfilled_quantity + $2, status = $3
                WHERE id = $1
                "#,
            )
            .bind(line_id)
            .bind(fulfilled)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;

            if status == LineStatus::Closed {
                closed_lines.push(line_id);
            }
        }
        closed_lines.sort();

        if let CommitTarget::Shipment { shipment_id } = target {
            sqlx::query("UPDATE shipments SET shipped_at = NOW() WHERE id = $1")
                .bind(shipment_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(CommitReport {
            target,
            total_quantity: plan.total_quantity(),
            allocations: committed,
            closed_lines,
        })
    }
}

// ============================================================================
// Locked reads
// ============================================================================

/// Check a shipment context: it must exist, belong to the context order and
/// be unshipped. The row is share-locked so a concurrent commit waits.
async fn check_context(conn: &mut PgConnection, context: &AllocationContext) -> AppResult<()> {
    let AllocationContext::Shipment { shipment_id, order_id } = *context else {
        return Ok(());
    };

    let sql = format!("SELECT {} FROM shipments WHERE id = $1 FOR SHARE", SHIPMENT_COLUMNS);
    let shipment = sqlx::query_as::<_, ShipmentRow>(&sql)
        .bind(shipment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AllocationError::NotFound(format!("Shipment {}", shipment_id)))?;

    if shipment.order_id != order_id {
        return Err(AllocationError::OrderMismatch {
            line: shipment_id,
            context: order_id,
        }
        .into());
    }

    if shipment.shipped_at.is_some() {
        return Err(AllocationError::AlreadyShipped(shipment_id).into());
    }

    Ok(())
}

async fn lock_line(conn: &mut PgConnection, line_id: Uuid) -> AppResult<AllocationLine> {
    let sql = format!("SELECT {} FROM allocation_lines WHERE id = $1 FOR UPDATE", LINE_COLUMNS);
    let row = sqlx::query_as::<_, LineRow>(&sql)
        .bind(line_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AllocationError::NotFound(format!("Line {}", line_id)))?;

    AllocationLine::try_from(row)
}

async fn lock_lines(conn: &mut PgConnection, line_ids: &[Uuid]) -> AppResult<Vec<AllocationLine>> {
    let sql = format!(
        "SELECT {} FROM allocation_lines WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        LINE_COLUMNS
    );
    let rows = sqlx::query_as::<_, LineRow>(&sql)
        .bind(line_ids)
        .fetch_all(&mut *conn)
        .await?;

    convert_rows(rows)
}

async fn lock_open_lines(
    conn: &mut PgConnection,
    parent_id: Uuid,
    kind: DemandKind,
) -> AppResult<Vec<AllocationLine>> {
    let sql = format!(
        r#"
        SELECT {} FROM allocation_lines
        WHERE parent_id = $1 AND kind = $2 AND status = $3
        ORDER BY id
        FOR UPDATE
        "#,
        LINE_COLUMNS
    );
    let rows = sqlx::query_as::<_, LineRow>(&sql)
        .bind(parent_id)
        .bind(kind.as_str())
        .bind(LineStatus::Open.as_str())
        .fetch_all(&mut *conn)
        .await?;

    convert_rows(rows)
}

async fn lock_units(conn: &mut PgConnection, unit_ids: &[Uuid]) -> AppResult<Vec<StockUnit>> {
    let sql = format!(
        "SELECT {} FROM stock_units WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        STOCK_UNIT_COLUMNS
    );
    let rows = sqlx::query_as::<_, StockUnitRow>(&sql)
        .bind(unit_ids)
        .fetch_all(&mut *conn)
        .await?;

    convert_rows(rows)
}

/// Lock every unit of `parts`, returned oldest first
async fn lock_part_units(conn: &mut PgConnection, parts: &[Uuid]) -> AppResult<Vec<StockUnit>> {
    sqlx::query("SELECT id FROM stock_units WHERE part_id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(parts)
        .execute(&mut *conn)
        .await?;

    let sql = format!(
        "SELECT {} FROM stock_units WHERE part_id = ANY($1) ORDER BY created_at, id",
        STOCK_UNIT_COLUMNS
    );
    let rows = sqlx::query_as::<_, StockUnitRow>(&sql)
        .bind(parts)
        .fetch_all(&mut *conn)
        .await?;

    convert_rows(rows)
}

/// Pending allocations against any of `unit_ids`
async fn pending_for_units(conn: &mut PgConnection, unit_ids: &[Uuid]) -> AppResult<Vec<Allocation>> {
    let sql = format!(
        "SELECT {} FROM allocations WHERE stock_unit_id = ANY($1) AND state = 'allocated' ORDER BY created_at, id",
        ALLOCATION_COLUMNS
    );
    let rows = sqlx::query_as::<_, AllocationRow>(&sql)
        .bind(unit_ids)
        .fetch_all(&mut *conn)
        .await?;

    convert_rows(rows)
}

/// Every allocation of a line plus the pending ones against `unit_ids`
async fn allocations_for_line_and_units(
    conn: &mut PgConnection,
    line_id: Uuid,
    unit_ids: &[Uuid],
) -> AppResult<Vec<Allocation>> {
    let sql = format!(
        r#"
        SELECT {} FROM allocations
        WHERE line_id = $1 OR (stock_unit_id = ANY($2) AND state = 'allocated')
        ORDER BY created_at, id
        "#,
        ALLOCATION_COLUMNS
    );
    let rows = sqlx::query_as::<_, AllocationRow>(&sql)
        .bind(line_id)
        .bind(unit_ids)
        .fetch_all(&mut *conn)
        .await?;

    convert_rows(rows)
}

// ============================================================================
// Writes
// ============================================================================

/// Validate and record a set of requests inside the caller's transaction.
///
/// Lines and units are locked before pending allocations are re-read, so
/// the over-allocation check sees every committed competitor.
async fn place_requests(
    conn: &mut PgConnection,
    context: &AllocationContext,
    requests: &[AllocationRequest],
) -> AppResult<Vec<Allocation>> {
    let line_ids: Vec<Uuid> = requests
        .iter()
        .map(|r| r.line_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let unit_ids: Vec<Uuid> = requests
        .iter()
        .map(|r| r.stock_unit_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let lines: HashMap<Uuid, AllocationLine> = lock_lines(conn, &line_ids)
        .await?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();
    let units: HashMap<Uuid, StockUnit> = lock_units(conn, &unit_ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut allocations = pending_for_units(conn, &unit_ids).await?;
    let mut placed = Vec::with_capacity(requests.len());
    let mut errors = Vec::new();

    for request in requests {
        let outcome = match (lines.get(&request.line_id), units.get(&request.stock_unit_id)) {
            (None, _) => Err(AllocationError::NotFound(format!("Line {}", request.line_id))),
            (_, None) => Err(AllocationError::Store(StoreError::UnitNotFound(request.stock_unit_id))),
            (Some(line), Some(unit)) => {
                rules::record_allocation(line, unit, request.quantity, context, &mut allocations)
            }
        };

        match outcome {
            Ok(allocation) => {
                tracing::debug!(
                    allocation = %allocation.id,
                    line = %allocation.line_id,
                    unit = %allocation.stock_unit_id,
                    quantity = %request.quantity,
                    "Placed allocation"
                );
                placed.push(allocation);
            }
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return Err(AllocationErrors(errors).into());
    }

    let touched: BTreeSet<Uuid> = placed.iter().map(|a| a.id).collect();
    for allocation in allocations.iter().filter(|a| touched.contains(&a.id)) {
        upsert_allocation(conn, allocation).await?;
    }

    Ok(placed)
}

async fn upsert_allocation(conn: &mut PgConnection, allocation: &Allocation) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO allocations
            (id, line_id, stock_unit_id, quantity, parent_id, bucket_id, install_into, state)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE
        SET quantity = EXCLUDED.quantity,
            updated_at = NOW()
        "#,
    )
    .bind(allocation.id)
    .bind(allocation.line_id)
    .bind(allocation.stock_unit_id)
    .bind(allocation.quantity)
    .bind(allocation.parent_id)
    .bind(allocation.bucket_id)
    .bind(allocation.install_into)
    .bind(allocation.state.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn cancel_locked(conn: &mut PgConnection, mut line: AllocationLine) -> AppResult<AllocationLine> {
    if !line.status.can_transition_to(LineStatus::Cancelled) {
        return Err(AllocationError::LineNotOpen(line.id).into());
    }

    sqlx::query("DELETE FROM allocations WHERE line_id = $1 AND state = 'allocated'")
        .bind(line.id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE allocation_lines SET status = $2 WHERE id = $1")
        .bind(line.id)
        .bind(LineStatus::Cancelled.as_str())
        .execute(&mut *conn)
        .await?;

    line.status = LineStatus::Cancelled;
    tracing::debug!(line = %line.id, "Cancelled line");
    Ok(line)
}

/// Apply one commit step, returning the unit the allocation now points at
async fn apply_step(conn: &mut PgConnection, step: &CommitStep) -> AppResult<Uuid> {
    let failed = |reason: String| AllocationError::CommitFailed {
        allocation: step.allocation_id,
        reason,
    };

    let unit_id = if step.split {
        let new_id = Uuid::new_v4();

        let taken = sqlx::query(
            r#"
            UPDATE stock_units
            SET quantity = quantity - $2, updated_at = NOW()
            WHERE id = $1 AND quantity > $2 AND serial IS NULL
            "#,
        )
        .bind(step.unit_id)
        .bind(step.quantity)
        .execute(&mut *conn)
        .await?;

        if taken.rows_affected() != 1 {
            return Err(failed(format!("Cannot split {} from stock unit {}", step.quantity, step.unit_id)).into());
        }

        sqlx::query(
            r#"
            INSERT INTO stock_units (id, part_id, quantity, serial, trackable, owner_kind, owner_id)
            SELECT $2, part_id, $3, serial, trackable, owner_kind, owner_id
            FROM stock_units WHERE id = $1
            "#,
        )
        .bind(step.unit_id)
        .bind(new_id)
        .bind(step.quantity)
        .execute(&mut *conn)
        .await?;

        new_id
    } else {
        step.unit_id
    };

    match step.action {
        CommitAction::Transfer(owner) => {
            sqlx::query(
                "UPDATE stock_units SET owner_kind = $2, owner_id = $3, updated_at = NOW() WHERE id = $1",
            )
            .bind(unit_id)
            .bind(owner.as_str())
            .bind(owner.holder())
            .execute(&mut *conn)
            .await?;
        }
        CommitAction::Consume => {
            let consumed = sqlx::query(
                r#"
                UPDATE stock_units
                SET quantity = quantity - $2, updated_at = NOW()
                WHERE id = $1 AND quantity >= $2
                "#,
            )
            .bind(unit_id)
            .bind(step.quantity)
            .execute(&mut *conn)
            .await?;

            if consumed.rows_affected() != 1 {
                return Err(failed(format!("Cannot consume {} from stock unit {}", step.quantity, unit_id)).into());
            }
        }
    }

    Ok(unit_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_input_rejects_non_positive_quantity() {
        let input = AllocateInput {
            line_id: Uuid::new_v4(),
            stock_unit_id: Uuid::new_v4(),
            quantity: Decimal::ZERO,
            context: AllocationContext::Build {
                build_id: Uuid::new_v4(),
                install_into: None,
            },
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("quantity"));
    }

    #[test]
    fn test_batch_input_validates_items() {
        let item = |q: i64| AllocationItemInput {
            line_id: Uuid::new_v4(),
            stock_unit_id: Uuid::new_v4(),
            quantity: Decimal::from(q),
        };
        let context = AllocationContext::Build {
            build_id: Uuid::new_v4(),
            install_into: None,
        };

        let empty = AllocateBatchInput {
            context,
            items: vec![],
        };
        assert!(empty.validate_all().is_err());

        let bad_item = AllocateBatchInput {
            context,
            items: vec![item(2), item(-1)],
        };
        assert!(bad_item.validate_all().is_err());

        let ok = AllocateBatchInput {
            context,
            items: vec![item(2)],
        };
        assert!(ok.validate_all().is_ok());
        assert_eq!(ok.requests().len(), 1);
    }

    #[test]
    fn test_context_deserializes_from_tagged_json() {
        let input: AllocateInput = serde_json::from_value(serde_json::json!({
            "line_id": Uuid::nil(),
            "stock_unit_id": Uuid::nil(),
            "quantity": "2.5",
            "context": { "type": "shipment", "shipment_id": Uuid::nil(), "order_id": Uuid::nil() }
        }))
        .unwrap();

        assert!(matches!(input.context, AllocationContext::Shipment { .. }));
        assert_eq!(input.quantity, Decimal::new(25, 1));
    }

    #[test]
    fn test_line_status_entry_percent() {
        let line = AllocationLine::new(Uuid::new_v4(), DemandKind::Build, Uuid::new_v4(), Decimal::from(4));
        let entry = LineStatusEntry::new(&line, Decimal::from(1));
        assert_eq!(entry.percent, Decimal::from(25));
        assert!(!entry.progress.fully_allocated);
    }
}
