//! Allocation rules shared by every ledger backend
//!
//! Nothing here touches storage. Callers load the line, unit and current
//! allocation sums (under whatever lock their store provides) and ask these
//! functions whether a change is allowed.

use std::collections::HashMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AllocationError;
use crate::models::{
    Allocation, AllocationContext, AllocationLine, AllocationRequest, AllocationState, CommitTarget,
    LineStatus, PartMatch, StockOwner, StockUnit,
};

/// Check a proposed allocation of `quantity` from `unit` against `line`.
///
/// `allocated_on_unit` is the sum of pending allocations already held
/// against the unit (across all lines). `existing_pair` is the pending
/// quantity already allocated for this exact (line, unit) pair; a new
/// allocation is added on top of it.
pub fn validate_allocation(
    line: &AllocationLine,
    unit: &StockUnit,
    quantity: Decimal,
    context: &AllocationContext,
    allocated_on_unit: Decimal,
    existing_pair: Decimal,
) -> Result<(), AllocationError> {
    if quantity <= Decimal::ZERO {
        return Err(AllocationError::InvalidQuantity(quantity));
    }

    if !line.is_open() {
        return Err(AllocationError::LineNotOpen(line.id));
    }

    if context.parent_id() != line.parent_id || context.kind() != line.kind {
        return Err(AllocationError::OrderMismatch {
            line: line.id,
            context: context.parent_id(),
        });
    }

    if line.part_match(unit.part_id).is_none() {
        return Err(AllocationError::PartMismatch {
            line_part: line.part_id,
            unit_part: unit.part_id,
        });
    }

    if !unit.is_in_stock() {
        return Err(AllocationError::NotInStock(unit.id));
    }

    let resulting = existing_pair + quantity;
    if unit.is_serialized() && resulting != Decimal::ONE {
        return Err(AllocationError::SerializedQuantityMismatch {
            unit: unit.id,
            quantity: resulting,
        });
    }

    let available = (unit.quantity - allocated_on_unit).max(Decimal::ZERO);
    if quantity > available {
        return Err(AllocationError::OverAllocated {
            unit: unit.id,
            requested: quantity,
            available,
        });
    }

    Ok(())
}

/// Validate a request and record it in `allocations`.
///
/// A pending record for the same (line, unit) pair is topped up; otherwise a
/// new record is appended. A pair reserved for one shipment or build output
/// cannot be topped up from another (`OrderMismatch`). Returns the record as
/// it now stands.
pub fn record_allocation(
    line: &AllocationLine,
    unit: &StockUnit,
    quantity: Decimal,
    context: &AllocationContext,
    allocations: &mut Vec<Allocation>,
) -> Result<Allocation, AllocationError> {
    let on_unit = allocated_on_unit(unit.id, allocations);
    let existing = pair_quantity(line.id, unit.id, allocations);

    validate_allocation(line, unit, quantity, context, on_unit, existing)?;

    let pending = allocations
        .iter_mut()
        .find(|a| a.line_id == line.id && a.stock_unit_id == unit.id && a.is_pending());

    let allocation = match pending {
        Some(record) => {
            if record.bucket_id != context.bucket_id() || record.install_into != context.install_into() {
                return Err(AllocationError::OrderMismatch {
                    line: line.id,
                    context: context.bucket_id(),
                });
            }
            record.quantity += quantity;
            record.clone()
        }
        None => {
            let record = Allocation {
                id: Uuid::new_v4(),
                line_id: line.id,
                stock_unit_id: unit.id,
                quantity,
                parent_id: line.parent_id,
                bucket_id: context.bucket_id(),
                install_into: context.install_into(),
                state: AllocationState::Allocated,
            };
            allocations.push(record.clone());
            record
        }
    };

    Ok(allocation)
}

/// Requests that would fill a build line's unallocated quantity.
///
/// Empty when the line is already covered, when nothing is free, or when
/// more than one candidate exists and `interchangeable` is false.
pub fn plan_auto_allocation(
    line: &AllocationLine,
    units: &[StockUnit],
    allocations: &[Allocation],
    interchangeable: bool,
) -> Vec<AllocationRequest> {
    let mut remaining = unallocated_quantity(line, allocated_quantity(line.id, allocations));
    if remaining.is_zero() {
        return Vec::new();
    }

    let candidates: Vec<(Uuid, Decimal)> = rank_candidates(line, units)
        .into_iter()
        .map(|(_, unit)| (unit.id, unit.quantity - allocated_on_unit(unit.id, allocations)))
        .filter(|(_, free)| *free > Decimal::ZERO)
        .collect();

    if candidates.len() > 1 && !interchangeable {
        return Vec::new();
    }

    let mut requests = Vec::new();
    for (unit_id, free) in candidates {
        if remaining.is_zero() {
            break;
        }
        let quantity = free.min(remaining);
        requests.push(AllocationRequest {
            line_id: line.id,
            stock_unit_id: unit_id,
            quantity,
        });
        remaining -= quantity;
    }
    requests
}

/// What happens to the stock behind one allocation on commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitAction {
    /// Hand the unit to a new owner (customer or build output)
    Transfer(StockOwner),
    /// Untracked build stock: reduce the on-hand quantity
    Consume,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitStep {
    pub allocation_id: Uuid,
    pub line_id: Uuid,
    pub unit_id: Uuid,
    pub quantity: Decimal,
    /// Split `quantity` off the unit before transferring it
    pub split: bool,
    pub action: CommitAction,
}

/// Ordered steps that finalize a commit target
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommitPlan {
    pub steps: Vec<CommitStep>,
}

impl CommitPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_quantity(&self) -> Decimal {
        self.steps.iter().map(|s| s.quantity).sum()
    }

    /// Fulfilled quantity added per line
    pub fn fulfilled_by_line(&self) -> HashMap<Uuid, Decimal> {
        let mut totals: HashMap<Uuid, Decimal> = HashMap::new();
        for step in &self.steps {
            *totals.entry(step.line_id).or_default() += step.quantity;
        }
        totals
    }
}

/// Work out how every allocation covered by `target` is finalized.
///
/// `customer_id` is the receiving customer for shipment targets. Steps are
/// ordered by unit id so a store can lock units in a stable order. The first
/// allocation that cannot be finalized fails the whole plan.
pub fn plan_commit(
    target: &CommitTarget,
    customer_id: Option<Uuid>,
    allocations: &[Allocation],
    units: &[StockUnit],
    lines: &[AllocationLine],
) -> Result<CommitPlan, AllocationError> {
    let units: HashMap<Uuid, &StockUnit> = units.iter().map(|u| (u.id, u)).collect();
    let lines: HashMap<Uuid, &AllocationLine> = lines.iter().map(|l| (l.id, l)).collect();

    let mut covered: Vec<&Allocation> = allocations.iter().filter(|a| target.covers(a)).collect();
    covered.sort_by_key(|a| (a.stock_unit_id, a.id));

    // On-hand quantity left on each unit as earlier steps take from it
    let mut remaining: HashMap<Uuid, Decimal> = HashMap::new();
    let mut plan = CommitPlan::default();

    for allocation in covered {
        let failed = |reason: &str| AllocationError::CommitFailed {
            allocation: allocation.id,
            reason: reason.to_string(),
        };

        let unit = units
            .get(&allocation.stock_unit_id)
            .ok_or_else(|| failed("stock unit no longer exists"))?;

        let line = lines
            .get(&allocation.line_id)
            .ok_or_else(|| failed("allocation line no longer exists"))?;

        // A closed line may still ship what was allocated on top of it
        if !line.is_active() {
            return Err(failed("allocation line was cancelled"));
        }

        if unit.owner != StockOwner::InStock {
            return Err(failed("stock unit is not in stock"));
        }

        let on_hand = remaining.entry(unit.id).or_insert(unit.quantity);
        if allocation.quantity > *on_hand {
            return Err(failed(&format!(
                "stock unit holds {} but {} is allocated",
                on_hand, allocation.quantity
            )));
        }

        let action = match target {
            CommitTarget::Shipment { .. } => {
                let customer = customer_id.ok_or_else(|| failed("shipment has no customer"))?;
                CommitAction::Transfer(StockOwner::Customer(customer))
            }
            CommitTarget::Build { build_id, .. } => {
                if unit.trackable {
                    CommitAction::Transfer(StockOwner::InstalledIn(
                        allocation.install_into.unwrap_or(*build_id),
                    ))
                } else {
                    CommitAction::Consume
                }
            }
        };

        let split = matches!(action, CommitAction::Transfer(_)) && allocation.quantity < *on_hand;
        *on_hand -= allocation.quantity;

        plan.steps.push(CommitStep {
            allocation_id: allocation.id,
            line_id: allocation.line_id,
            unit_id: unit.id,
            quantity: allocation.quantity,
            split,
            action,
        });
    }

    Ok(plan)
}

/// Status a line moves to once a commit has added `fulfilled`
pub fn status_after_commit(line: &AllocationLine, fulfilled: Decimal) -> LineStatus {
    if line.fulfilled_quantity + fulfilled >= line.required_quantity {
        LineStatus::Closed
    } else {
        LineStatus::Open
    }
}

/// Sum of every allocation (pending and consumed) recorded for a line
pub fn allocated_quantity(line_id: Uuid, allocations: &[Allocation]) -> Decimal {
    allocations
        .iter()
        .filter(|a| a.line_id == line_id)
        .map(|a| a.quantity)
        .sum()
}

/// Sum of pending allocations held against a stock unit
pub fn allocated_on_unit(unit_id: Uuid, allocations: &[Allocation]) -> Decimal {
    allocations
        .iter()
        .filter(|a| a.stock_unit_id == unit_id && a.is_pending())
        .map(|a| a.quantity)
        .sum()
}

/// Pending quantity for one (line, unit) pair
pub fn pair_quantity(line_id: Uuid, unit_id: Uuid, allocations: &[Allocation]) -> Decimal {
    allocations
        .iter()
        .find(|a| a.line_id == line_id && a.stock_unit_id == unit_id && a.is_pending())
        .map_or(Decimal::ZERO, |a| a.quantity)
}

pub fn unallocated_quantity(line: &AllocationLine, allocated: Decimal) -> Decimal {
    (line.required_quantity - allocated).max(Decimal::ZERO)
}

/// Closed lines compare what was fulfilled; other lines what is allocated
pub fn is_fully_allocated(line: &AllocationLine, allocated: Decimal) -> bool {
    match line.status {
        LineStatus::Closed => line.fulfilled_quantity >= line.required_quantity,
        _ => allocated >= line.required_quantity,
    }
}

pub fn is_over_allocated(line: &AllocationLine, allocated: Decimal) -> bool {
    allocated > line.required_quantity
}

/// Units that could fill a line automatically, best match first.
///
/// Serialized units are never picked automatically and units that are not in
/// stock are skipped. Within a match class, larger units come first.
pub fn rank_candidates<'a>(line: &AllocationLine, units: &'a [StockUnit]) -> Vec<(PartMatch, &'a StockUnit)> {
    let mut ranked: Vec<(PartMatch, &StockUnit)> = units
        .iter()
        .filter(|u| u.is_in_stock() && !u.is_serialized())
        .filter_map(|u| line.part_match(u.part_id).map(|m| (m, u)))
        .collect();

    ranked.sort_by(|(ma, a), (mb, b)| ma.cmp(mb).then_with(|| b.quantity.cmp(&a.quantity)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DemandKind;

    fn d(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn sales_line(order: Uuid, part: Uuid, required: Decimal) -> AllocationLine {
        AllocationLine::new(order, DemandKind::SalesOrder, part, required)
    }

    fn shipment_context(order: Uuid) -> AllocationContext {
        AllocationContext::Shipment {
            shipment_id: Uuid::new_v4(),
            order_id: order,
        }
    }

    fn pending(line: &AllocationLine, unit: &StockUnit, quantity: Decimal, bucket: Uuid) -> Allocation {
        Allocation {
            id: Uuid::new_v4(),
            line_id: line.id,
            stock_unit_id: unit.id,
            quantity,
            parent_id: line.parent_id,
            bucket_id: bucket,
            install_into: None,
            state: AllocationState::Allocated,
        }
    }

    #[test]
    fn test_validate_accepts_available_stock() {
        let order = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(10));
        let unit = StockUnit::new(part, d(10));

        assert!(validate_allocation(&line, &unit, d(4), &shipment_context(order), d(6), Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_validate_check_order() {
        let order = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(10));
        let other = StockUnit::new(Uuid::new_v4(), d(5));
        let ctx = shipment_context(order);

        // Quantity is checked before anything else
        assert!(matches!(
            validate_allocation(&line, &other, d(0), &ctx, Decimal::ZERO, Decimal::ZERO),
            Err(AllocationError::InvalidQuantity(_))
        ));

        // Order before part
        assert!(matches!(
            validate_allocation(&line, &other, d(1), &shipment_context(Uuid::new_v4()), Decimal::ZERO, Decimal::ZERO),
            Err(AllocationError::OrderMismatch { .. })
        ));

        assert!(matches!(
            validate_allocation(&line, &other, d(1), &ctx, Decimal::ZERO, Decimal::ZERO),
            Err(AllocationError::PartMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_kind_mismatch() {
        let build = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(build, part, d(1));
        let unit = StockUnit::new(part, d(1));
        let ctx = AllocationContext::Build {
            build_id: build,
            install_into: None,
        };

        assert!(matches!(
            validate_allocation(&line, &unit, d(1), &ctx, Decimal::ZERO, Decimal::ZERO),
            Err(AllocationError::OrderMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_over_allocation() {
        let order = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(10));
        let unit = StockUnit::new(part, d(10));

        let err = validate_allocation(&line, &unit, d(5), &shipment_context(order), d(6), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::OverAllocated {
                unit: unit.id,
                requested: d(5),
                available: d(4),
            }
        );
    }

    #[test]
    fn test_validate_serialized_lock() {
        let order = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(3));
        let unit = StockUnit::serialized(part, "100");
        let ctx = shipment_context(order);

        assert!(matches!(
            validate_allocation(&line, &unit, d(2), &ctx, Decimal::ZERO, Decimal::ZERO),
            Err(AllocationError::SerializedQuantityMismatch { .. })
        ));
        // Adding to an existing pair of 1 would make it 2
        assert!(matches!(
            validate_allocation(&line, &unit, d(1), &ctx, d(1), d(1)),
            Err(AllocationError::SerializedQuantityMismatch { .. })
        ));
        assert!(validate_allocation(&line, &unit, d(1), &ctx, Decimal::ZERO, Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_validate_closed_line() {
        let order = Uuid::new_v4();
        let part = Uuid::new_v4();
        let mut line = sales_line(order, part, d(1));
        line.status = LineStatus::Closed;
        let unit = StockUnit::new(part, d(1));

        assert_eq!(
            validate_allocation(&line, &unit, d(1), &shipment_context(order), Decimal::ZERO, Decimal::ZERO),
            Err(AllocationError::LineNotOpen(line.id))
        );
    }

    #[test]
    fn test_validate_shipped_unit() {
        let order = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(1));
        let mut unit = StockUnit::new(part, d(1));
        unit.owner = StockOwner::Customer(Uuid::new_v4());

        assert_eq!(
            validate_allocation(&line, &unit, d(1), &shipment_context(order), Decimal::ZERO, Decimal::ZERO),
            Err(AllocationError::NotInStock(unit.id))
        );
    }

    #[test]
    fn test_plan_commit_splits_partial_allocations() {
        let order = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let shipment = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(10));
        let unit = StockUnit::new(part, d(10));
        let whole = StockUnit::new(part, d(2));

        let allocations = vec![
            pending(&line, &unit, d(4), shipment),
            pending(&line, &whole, d(2), shipment),
            // Different shipment, not part of this commit
            pending(&line, &unit, d(1), Uuid::new_v4()),
        ];

        let plan = plan_commit(
            &CommitTarget::Shipment { shipment_id: shipment },
            Some(customer),
            &allocations,
            &[unit.clone(), whole.clone()],
            &[line.clone()],
        )
        .unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.total_quantity(), d(6));

        let partial = plan.steps.iter().find(|s| s.unit_id == unit.id).unwrap();
        assert!(partial.split);
        assert_eq!(partial.action, CommitAction::Transfer(StockOwner::Customer(customer)));

        let full = plan.steps.iter().find(|s| s.unit_id == whole.id).unwrap();
        assert!(!full.split);
    }

    #[test]
    fn test_plan_commit_build_actions() {
        let build = Uuid::new_v4();
        let output = Uuid::new_v4();
        let tracked_part = Uuid::new_v4();
        let bulk_part = Uuid::new_v4();
        let tracked_line = AllocationLine::new(build, DemandKind::Build, tracked_part, d(1));
        let bulk_line = AllocationLine::new(build, DemandKind::Build, bulk_part, d(5));
        let tracked = StockUnit::serialized(tracked_part, "7");
        let bulk = StockUnit::new(bulk_part, d(20));

        let mut a = pending(&tracked_line, &tracked, d(1), build);
        a.install_into = Some(output);
        let mut b = pending(&bulk_line, &bulk, d(5), build);
        b.install_into = Some(output);

        let plan = plan_commit(
            &CommitTarget::Build {
                build_id: build,
                output: Some(output),
            },
            None,
            &[a, b],
            &[tracked.clone(), bulk.clone()],
            &[tracked_line, bulk_line],
        )
        .unwrap();

        let installed = plan.steps.iter().find(|s| s.unit_id == tracked.id).unwrap();
        assert_eq!(installed.action, CommitAction::Transfer(StockOwner::InstalledIn(output)));

        let consumed = plan.steps.iter().find(|s| s.unit_id == bulk.id).unwrap();
        assert_eq!(consumed.action, CommitAction::Consume);
        assert!(!consumed.split);
    }

    #[test]
    fn test_plan_commit_fails_on_short_unit() {
        let order = Uuid::new_v4();
        let shipment = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(10));
        let mut unit = StockUnit::new(part, d(10));
        let allocation = pending(&line, &unit, d(8), shipment);

        // Stock was adjusted after the allocation was made
        unit.quantity = d(3);

        let err = plan_commit(
            &CommitTarget::Shipment { shipment_id: shipment },
            Some(Uuid::new_v4()),
            &[allocation.clone()],
            &[unit],
            &[line],
        )
        .unwrap_err();

        assert!(matches!(err, AllocationError::CommitFailed { allocation: id, .. } if id == allocation.id));
    }

    #[test]
    fn test_line_queries() {
        let mut line = sales_line(Uuid::new_v4(), Uuid::new_v4(), d(10));

        assert_eq!(unallocated_quantity(&line, d(4)), d(6));
        assert_eq!(unallocated_quantity(&line, d(12)), Decimal::ZERO);
        assert!(!is_fully_allocated(&line, d(9)));
        assert!(is_fully_allocated(&line, d(10)));
        assert!(is_over_allocated(&line, d(11)));

        line.status = LineStatus::Closed;
        line.fulfilled_quantity = d(10);
        assert!(is_fully_allocated(&line, Decimal::ZERO));
    }

    #[test]
    fn test_status_after_commit() {
        let mut line = sales_line(Uuid::new_v4(), Uuid::new_v4(), d(10));
        line.fulfilled_quantity = d(4);

        assert_eq!(status_after_commit(&line, d(5)), LineStatus::Open);
        assert_eq!(status_after_commit(&line, d(6)), LineStatus::Closed);
    }

    #[test]
    fn test_rank_candidates_prefers_direct_parts() {
        let part = Uuid::new_v4();
        let variant = Uuid::new_v4();
        let substitute = Uuid::new_v4();
        let line = AllocationLine::new(Uuid::new_v4(), DemandKind::Build, part, d(10))
            .with_variants(vec![variant])
            .with_substitutes(vec![substitute]);

        let units = vec![
            StockUnit::new(substitute, d(50)),
            StockUnit::new(variant, d(5)),
            StockUnit::new(part, d(2)),
            StockUnit::new(part, d(8)),
            StockUnit::serialized(part, "1"),
            StockUnit::new(Uuid::new_v4(), d(100)),
        ];

        let ranked = rank_candidates(&line, &units);
        let order: Vec<(PartMatch, Decimal)> = ranked.iter().map(|(m, u)| (*m, u.quantity)).collect();

        assert_eq!(
            order,
            vec![
                (PartMatch::Direct, d(8)),
                (PartMatch::Direct, d(2)),
                (PartMatch::Variant, d(5)),
                (PartMatch::Substitute, d(50)),
            ]
        );
    }

    #[test]
    fn test_record_allocation_tops_up_pair() {
        let order = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(10));
        let unit = StockUnit::new(part, d(10));
        let ctx = shipment_context(order);
        let mut allocations = Vec::new();

        let first = record_allocation(&line, &unit, d(2), &ctx, &mut allocations).unwrap();
        let second = record_allocation(&line, &unit, d(3), &ctx, &mut allocations).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].quantity, d(5));
    }

    #[test]
    fn test_record_allocation_keeps_pair_in_its_bucket() {
        let order = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = sales_line(order, part, d(10));
        let unit = StockUnit::new(part, d(10));
        let first_shipment = shipment_context(order);
        let mut allocations = Vec::new();

        record_allocation(&line, &unit, d(4), &first_shipment, &mut allocations).unwrap();
        let err = record_allocation(&line, &unit, d(1), &shipment_context(order), &mut allocations).unwrap_err();

        assert!(matches!(err, AllocationError::OrderMismatch { .. }));
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].quantity, d(4));
        assert_eq!(allocations[0].bucket_id, first_shipment.bucket_id());
    }

    #[test]
    fn test_plan_commit_ships_remainder_of_closed_line() {
        let order = Uuid::new_v4();
        let shipment = Uuid::new_v4();
        let part = Uuid::new_v4();
        let mut line = sales_line(order, part, d(5));
        let unit = StockUnit::new(part, d(10));
        let allocation = pending(&line, &unit, d(3), shipment);

        line.status = LineStatus::Closed;
        line.fulfilled_quantity = d(5);

        let plan = plan_commit(
            &CommitTarget::Shipment { shipment_id: shipment },
            Some(Uuid::new_v4()),
            &[allocation.clone()],
            &[unit.clone()],
            &[line.clone()],
        )
        .unwrap();
        assert_eq!(plan.total_quantity(), d(3));
        assert_eq!(status_after_commit(&line, d(3)), LineStatus::Closed);

        line.status = LineStatus::Cancelled;
        let err = plan_commit(
            &CommitTarget::Shipment { shipment_id: shipment },
            Some(Uuid::new_v4()),
            &[allocation],
            &[unit],
            &[line],
        )
        .unwrap_err();
        assert!(matches!(err, AllocationError::CommitFailed { .. }));
    }

    #[test]
    fn test_plan_auto_allocation() {
        let build = Uuid::new_v4();
        let part = Uuid::new_v4();
        let line = AllocationLine::new(build, DemandKind::Build, part, d(10));
        let big = StockUnit::new(part, d(7));
        let small = StockUnit::new(part, d(5));
        let units = vec![small.clone(), big.clone()];

        assert!(plan_auto_allocation(&line, &units, &[], false).is_empty());

        let requests = plan_auto_allocation(&line, &units, &[], true);
        let taken: Vec<(Uuid, Decimal)> = requests.iter().map(|r| (r.stock_unit_id, r.quantity)).collect();
        assert_eq!(taken, vec![(big.id, d(7)), (small.id, d(3))]);

        let single = plan_auto_allocation(&line, &[small.clone()], &[], false);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].quantity, d(5));
    }
}
