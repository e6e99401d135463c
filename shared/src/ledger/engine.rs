//! In-memory stock allocation ledger

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::rules::{self, CommitAction, CommitPlan};
use super::store::StockStore;
use crate::error::{AllocationError, AllocationErrors};
use crate::events::{EventRegistry, LedgerEvent, BUILD_ALLOCATION_COMPLETED, SHIPMENT_COMPLETED};
use crate::models::{
    Allocation, AllocationContext, AllocationLine, AllocationRequest, AllocationState, CommitReport,
    CommitTarget, DemandKind, LineStatus, Shipment, StockUnit,
};
use crate::serial;

struct LedgerState<S> {
    store: S,
    lines: HashMap<Uuid, AllocationLine>,
    shipments: HashMap<Uuid, Shipment>,
    allocations: Vec<Allocation>,
}

/// Allocation bookkeeping for demand lines over a [`StockStore`].
///
/// All state sits behind one mutex, so every check-then-act sequence
/// (validate, then write) runs without interleaving.
pub struct StockAllocationLedger<S: StockStore> {
    state: Mutex<LedgerState<S>>,
    events: EventRegistry,
}

impl<S: StockStore> StockAllocationLedger<S> {
    pub fn new(store: S) -> Self {
        Self::with_events(store, EventRegistry::new())
    }

    pub fn with_events(store: S, events: EventRegistry) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                store,
                lines: HashMap::new(),
                shipments: HashMap::new(),
                allocations: Vec::new(),
            }),
            events,
        }
    }

    pub fn events_mut(&mut self) -> &mut EventRegistry {
        &mut self.events
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState<S>>, AllocationError> {
        self.state.lock().map_err(|_| AllocationError::Unavailable)
    }

    /// Run `f` against the stock store, e.g. to add units
    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R, AllocationError> {
        let mut state = self.lock()?;
        Ok(f(&mut state.store))
    }

    pub fn add_line(&self, line: AllocationLine) -> Result<Uuid, AllocationError> {
        let id = line.id;
        self.lock()?.lines.insert(id, line);
        Ok(id)
    }

    pub fn add_shipment(&self, shipment: Shipment) -> Result<Uuid, AllocationError> {
        let id = shipment.id;
        self.lock()?.shipments.insert(id, shipment);
        Ok(id)
    }

    pub fn line(&self, id: Uuid) -> Result<AllocationLine, AllocationError> {
        let state = self.lock()?;
        find_line(&state.lines, id).cloned()
    }

    pub fn shipment(&self, id: Uuid) -> Result<Shipment, AllocationError> {
        self.lock()?
            .shipments
            .get(&id)
            .cloned()
            .ok_or_else(|| AllocationError::NotFound(format!("Shipment {}", id)))
    }

    pub fn stock_unit(&self, id: Uuid) -> Result<StockUnit, AllocationError> {
        Ok(self.lock()?.store.unit(id)?)
    }

    pub fn allocation(&self, id: Uuid) -> Result<Allocation, AllocationError> {
        self.lock()?
            .allocations
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| AllocationError::NotFound(format!("Allocation {}", id)))
    }

    /// Every allocation record, pending and consumed
    pub fn allocations(&self) -> Result<Vec<Allocation>, AllocationError> {
        Ok(self.lock()?.allocations.clone())
    }

    pub fn allocations_for_line(&self, line_id: Uuid) -> Result<Vec<Allocation>, AllocationError> {
        let state = self.lock()?;
        find_line(&state.lines, line_id)?;
        Ok(state
            .allocations
            .iter()
            .filter(|a| a.line_id == line_id)
            .cloned()
            .collect())
    }

    /// Allocate `quantity` of a stock unit to a line.
    ///
    /// If the (line, unit) pair already holds a pending allocation in the
    /// same shipment or build output, the quantity is added to it.
    pub fn allocate(
        &self,
        line_id: Uuid,
        stock_unit_id: Uuid,
        quantity: Decimal,
        context: AllocationContext,
    ) -> Result<Allocation, AllocationError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        check_context(&state.shipments, &context)?;

        let request = AllocationRequest {
            line_id,
            stock_unit_id,
            quantity,
        };
        place(&state.store, &state.lines, &mut state.allocations, &request, &context)
    }

    /// Allocate several items at once. Either every item is placed or none
    /// is, and every failing item is reported.
    pub fn allocate_many(
        &self,
        context: AllocationContext,
        requests: &[AllocationRequest],
    ) -> Result<Vec<Allocation>, AllocationErrors> {
        if requests.is_empty() {
            return Err(AllocationError::EmptyRequest.into());
        }

        let mut guard = self.lock()?;
        let state = &mut *guard;

        check_context(&state.shipments, &context)?;
        place_all(state, &context, requests)
    }

    /// Allocate serialized stock of the line's part by serial number spec
    pub fn allocate_serials(
        &self,
        line_id: Uuid,
        spec: &str,
        quantity: usize,
        context: AllocationContext,
    ) -> Result<Vec<Allocation>, AllocationErrors> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        check_context(&state.shipments, &context)?;
        let line = find_line(&state.lines, line_id)?.clone();

        let existing = state.store.serials_for_part(line.part_id);
        let next = serial::next_serial_number(&existing);
        let serials = serial::resolve(spec, quantity, next).map_err(AllocationError::from)?;

        let units = state.store.units_for_parts(&[line.part_id]);
        let mut requests = Vec::with_capacity(serials.len());
        let mut errors = Vec::new();

        for sn in serials {
            let unit = units
                .iter()
                .find(|u| u.is_in_stock() && u.serial_token().as_ref() == Some(&sn));

            match unit {
                None => errors.push(AllocationError::SerialNotFound(sn)),
                Some(unit) if rules::allocated_on_unit(unit.id, &state.allocations) > Decimal::ZERO => {
                    errors.push(AllocationError::SerialAlreadyAllocated(sn))
                }
                Some(unit) => requests.push(AllocationRequest {
                    line_id,
                    stock_unit_id: unit.id,
                    quantity: Decimal::ONE,
                }),
            }
        }

        if !errors.is_empty() {
            return Err(AllocationErrors(errors));
        }

        place_all(state, &context, &requests)
    }

    /// Fill the unallocated quantity of a build line from available stock.
    ///
    /// Candidates are ranked direct part, then variants, then substitutes.
    /// Unless `interchangeable` is set, stock is only taken when exactly one
    /// candidate unit exists; otherwise nothing is allocated.
    pub fn auto_allocate(
        &self,
        line_id: Uuid,
        context: AllocationContext,
        interchangeable: bool,
    ) -> Result<Vec<Allocation>, AllocationError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let line = find_line(&state.lines, line_id)?.clone();
        if line.kind != DemandKind::Build {
            return Err(AllocationError::OrderMismatch {
                line: line.id,
                context: context.parent_id(),
            });
        }
        check_context(&state.shipments, &context)?;

        let units = state.store.units_for_parts(&line.accepted_parts());
        let requests = rules::plan_auto_allocation(&line, &units, &state.allocations, interchangeable);

        if requests.is_empty() {
            tracing::debug!(line = %line.id, "Nothing to auto allocate");
            return Ok(Vec::new());
        }

        let mut working = state.allocations.clone();
        let mut placed = Vec::with_capacity(requests.len());
        for request in &requests {
            placed.push(place(&state.store, &state.lines, &mut working, request, &context)?);
        }

        state.allocations = working;
        Ok(placed)
    }

    /// Remove a pending allocation
    pub fn deallocate(&self, allocation_id: Uuid) -> Result<Allocation, AllocationError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let index = state
            .allocations
            .iter()
            .position(|a| a.id == allocation_id)
            .ok_or_else(|| AllocationError::NotFound(format!("Allocation {}", allocation_id)))?;

        let allocation = &state.allocations[index];
        if !allocation.is_pending() {
            return Err(AllocationError::AlreadyConsumed(allocation_id));
        }

        let line = find_line(&state.lines, allocation.line_id)?;
        if !line.is_active() {
            return Err(AllocationError::LineNotOpen(line.id));
        }

        if line.kind == DemandKind::SalesOrder {
            if let Some(shipment) = state.shipments.get(&allocation.bucket_id) {
                if shipment.is_shipped() {
                    return Err(AllocationError::AlreadyShipped(shipment.id));
                }
            }
        }

        let removed = state.allocations.remove(index);
        tracing::debug!(allocation = %removed.id, line = %removed.line_id, "Deallocated stock");
        Ok(removed)
    }

    /// Cancel an open line, dropping its pending allocations
    pub fn cancel_line(&self, line_id: Uuid) -> Result<AllocationLine, AllocationError> {
        let mut guard = self.lock()?;
        cancel(&mut guard, line_id)
    }

    /// Cancel every open line of a sales order or build.
    ///
    /// Closed lines are left alone. Returns the ids of the cancelled lines.
    pub fn cancel_parent(&self, parent_id: Uuid) -> Result<Vec<Uuid>, AllocationError> {
        let mut guard = self.lock()?;

        let mut line_ids: Vec<Uuid> = guard
            .lines
            .values()
            .filter(|l| l.parent_id == parent_id)
            .map(|l| l.id)
            .collect();

        if line_ids.is_empty() {
            return Err(AllocationError::NotFound(format!("Lines for {}", parent_id)));
        }

        line_ids.retain(|id| guard.lines.get(id).is_some_and(AllocationLine::is_open));
        line_ids.sort();

        for id in &line_ids {
            cancel(&mut guard, *id)?;
        }
        Ok(line_ids)
    }

    /// Finalize every pending allocation covered by `target`.
    ///
    /// Stock changes run inside a store transaction. If any allocation cannot
    /// be finalized the transaction is rolled back, lines return to `Open`
    /// and nothing changes.
    pub fn commit(&self, target: CommitTarget) -> Result<CommitReport, AllocationError> {
        let report = {
            let mut guard = self.lock()?;
            commit_locked(&mut guard, target)?
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
        tracing::debug!(event = tag, handlers = handled, "Triggered commit event");

        Ok(report)
    }

    pub fn allocated_quantity(&self, line_id: Uuid) -> Result<Decimal, AllocationError> {
        let state = self.lock()?;
        find_line(&state.lines, line_id)?;
        Ok(rules::allocated_quantity(line_id, &state.allocations))
    }

    pub fn unallocated_quantity(&self, line_id: Uuid) -> Result<Decimal, AllocationError> {
        let state = self.lock()?;
        let line = find_line(&state.lines, line_id)?;
        Ok(rules::unallocated_quantity(
            line,
            rules::allocated_quantity(line_id, &state.allocations),
        ))
    }

    pub fn is_fully_allocated(&self, line_id: Uuid) -> Result<bool, AllocationError> {
        let state = self.lock()?;
        let line = find_line(&state.lines, line_id)?;
        Ok(rules::is_fully_allocated(
            line,
            rules::allocated_quantity(line_id, &state.allocations),
        ))
    }

    pub fn is_over_allocated(&self, line_id: Uuid) -> Result<bool, AllocationError> {
        let state = self.lock()?;
        let line = find_line(&state.lines, line_id)?;
        Ok(rules::is_over_allocated(
            line,
            rules::allocated_quantity(line_id, &state.allocations),
        ))
    }

    /// True when every non-cancelled line of the parent is fully allocated
    pub fn order_fully_allocated(&self, parent_id: Uuid) -> Result<bool, AllocationError> {
        let state = self.lock()?;
        Ok(state
            .lines
            .values()
            .filter(|l| l.parent_id == parent_id && l.status != LineStatus::Cancelled)
            .all(|l| rules::is_fully_allocated(l, rules::allocated_quantity(l.id, &state.allocations))))
    }

    pub fn order_over_allocated(&self, parent_id: Uuid) -> Result<bool, AllocationError> {
        let state = self.lock()?;
        Ok(state
            .lines
            .values()
            .filter(|l| l.parent_id == parent_id && l.status != LineStatus::Cancelled)
            .any(|l| rules::is_over_allocated(l, rules::allocated_quantity(l.id, &state.allocations))))
    }
}

fn find_line(lines: &HashMap<Uuid, AllocationLine>, id: Uuid) -> Result<&AllocationLine, AllocationError> {
    lines
        .get(&id)
        .ok_or_else(|| AllocationError::NotFound(format!("Line {}", id)))
}

/// Shipment contexts must name a known, unshipped shipment of the order
fn check_context(shipments: &HashMap<Uuid, Shipment>, context: &AllocationContext) -> Result<(), AllocationError> {
    let AllocationContext::Shipment { shipment_id, order_id } = context else {
        return Ok(());
    };

    let shipment = shipments
        .get(shipment_id)
        .ok_or_else(|| AllocationError::NotFound(format!("Shipment {}", shipment_id)))?;

    if shipment.order_id != *order_id {
        return Err(AllocationError::OrderMismatch {
            line: *shipment_id,
            context: *order_id,
        });
    }

    if shipment.is_shipped() {
        return Err(AllocationError::AlreadyShipped(*shipment_id));
    }

    Ok(())
}

/// Validate one request against `allocations` and record it there
fn place<S: StockStore>(
    store: &S,
    lines: &HashMap<Uuid, AllocationLine>,
    allocations: &mut Vec<Allocation>,
    request: &AllocationRequest,
    context: &AllocationContext,
) -> Result<Allocation, AllocationError> {
    let line = find_line(lines, request.line_id)?;
    let unit = store.unit(request.stock_unit_id)?;

    let allocation = rules::record_allocation(line, &unit, request.quantity, context, allocations)?;

    tracing::debug!(
        allocation = %allocation.id,
        line = %allocation.line_id,
        unit = %allocation.stock_unit_id,
        quantity = %allocation.quantity,
        "Allocated stock"
    );

    Ok(allocation)
}

/// Place every request on a copy of the allocation list; keep the copy only
/// if all succeeded
fn place_all<S: StockStore>(
    state: &mut LedgerState<S>,
    context: &AllocationContext,
    requests: &[AllocationRequest],
) -> Result<Vec<Allocation>, AllocationErrors> {
    let mut working = state.allocations.clone();
    let mut placed = Vec::with_capacity(requests.len());
    let mut errors = Vec::new();

    for request in requests {
        match place(&state.store, &state.lines, &mut working, request, context) {
            Ok(allocation) => placed.push(allocation),
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return Err(AllocationErrors(errors));
    }

    state.allocations = working;
    Ok(placed)
}

fn cancel<S: StockStore>(state: &mut LedgerState<S>, line_id: Uuid) -> Result<AllocationLine, AllocationError> {
    let line = state
        .lines
        .get_mut(&line_id)
        .ok_or_else(|| AllocationError::NotFound(format!("Line {}", line_id)))?;

    if !line.status.can_transition_to(LineStatus::Cancelled) {
        return Err(AllocationError::LineNotOpen(line_id));
    }

    line.status = LineStatus::Cancelled;
    let line = line.clone();

    state
        .allocations
        .retain(|a| !(a.line_id == line_id && a.is_pending()));

    tracing::debug!(line = %line_id, "Cancelled line");
    Ok(line)
}

fn commit_locked<S: StockStore>(
    state: &mut LedgerState<S>,
    target: CommitTarget,
) -> Result<CommitReport, AllocationError> {
    let customer_id = match target {
        CommitTarget::Shipment { shipment_id } => {
            let shipment = state
                .shipments
                .get(&shipment_id)
                .ok_or_else(|| AllocationError::NotFound(format!("Shipment {}", shipment_id)))?;
            if shipment.is_shipped() {
                return Err(AllocationError::AlreadyShipped(shipment_id));
            }
            Some(shipment.customer_id)
        }
        CommitTarget::Build { .. } => None,
    };

    let covered: Vec<Allocation> = state
        .allocations
        .iter()
        .filter(|a| target.covers(a))
        .cloned()
        .collect();

    if covered.is_empty() {
        return Err(AllocationError::NothingToCommit(target.bucket_id()));
    }

    let line_ids: BTreeSet<Uuid> = covered.iter().map(|a| a.line_id).collect();

    // Open -> Fulfilling for the duration of the commit
    let mut moved = Vec::new();
    for id in &line_ids {
        if let Some(line) = state.lines.get_mut(id) {
            if line.status.can_transition_to(LineStatus::Fulfilling) {
                line.status = LineStatus::Fulfilling;
                moved.push(*id);
            }
        }
    }

    let units: Vec<StockUnit> = covered
        .iter()
        .filter_map(|a| state.store.unit(a.stock_unit_id).ok())
        .collect();
    let lines: Vec<AllocationLine> = line_ids
        .iter()
        .filter_map(|id| state.lines.get(id).cloned())
        .collect();

    state.store.begin();

    let outcome = rules::plan_commit(&target, customer_id, &covered, &units, &lines)
        .and_then(|plan| apply_plan(&mut state.store, &plan).map(|moves| (plan, moves)));

    let (plan, repointed) = match outcome {
        Ok(result) => result,
        Err(e) => {
            if let Err(rollback) = state.store.rollback() {
                tracing::error!(error = %rollback, "Stock store rollback failed");
            }
            for id in &moved {
                if let Some(line) = state.lines.get_mut(id) {
                    line.status = LineStatus::Open;
                }
            }
            tracing::warn!(bucket = %target.bucket_id(), error = %e, "Commit rejected");
            return Err(e);
        }
    };

    state.store.commit()?;

    let mut committed = Vec::with_capacity(plan.steps.len());
    for allocation in state.allocations.iter_mut() {
        if let Some(unit_id) = repointed.get(&allocation.id) {
            allocation.stock_unit_id = *unit_id;
            allocation.state = AllocationState::Consumed;
            committed.push(allocation.clone());
        }
    }

    let mut closed_lines = Vec::new();
    for (line_id, fulfilled) in plan.fulfilled_by_line() {
        if let Some(line) = state.lines.get_mut(&line_id) {
            line.status = rules::status_after_commit(line, fulfilled);
            line.fulfilled_quantity += fulfilled;
            if line.status == LineStatus::Closed {
                closed_lines.push(line_id);
            }
        }
    }
    closed_lines.sort();

    if let CommitTarget::Shipment { shipment_id } = target {
        if let Some(shipment) = state.shipments.get_mut(&shipment_id) {
            shipment.shipped_at = Some(Utc::now());
        }
    }

    tracing::debug!(
        bucket = %target.bucket_id(),
        allocations = committed.len(),
        closed = closed_lines.len(),
        "Committed allocations"
    );

    Ok(CommitReport {
        target,
        total_quantity: plan.total_quantity(),
        allocations: committed,
        closed_lines,
    })
}

/// Apply commit steps to the store, returning the unit each allocation ends
/// up pointing at
fn apply_plan<S: StockStore>(store: &mut S, plan: &CommitPlan) -> Result<HashMap<Uuid, Uuid>, AllocationError> {
    let mut repointed = HashMap::with_capacity(plan.steps.len());

    for step in &plan.steps {
        let failed = |e: crate::error::StoreError| AllocationError::CommitFailed {
            allocation: step.allocation_id,
            reason: e.to_string(),
        };

        let unit_id = if step.split {
            store.split(step.unit_id, step.quantity).map_err(failed)?
        } else {
            step.unit_id
        };

        match step.action {
            CommitAction::Transfer(owner) => store.transfer_owner(unit_id, owner).map_err(failed)?,
            CommitAction::Consume => {
                let on_hand = store.get_available(unit_id).map_err(failed)?;
                store
                    .set_available(unit_id, on_hand - step.quantity)
                    .map_err(failed)?;
            }
        }

        repointed.insert(step.allocation_id, unit_id);
    }

    Ok(repointed)
}
