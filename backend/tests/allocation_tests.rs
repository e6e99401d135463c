//! Stock allocation tests
//!
//! Tests for the allocation ledger including:
//! - Over-allocation guard across lines
//! - Serialized unit quantity lock
//! - Commit atomicity (full rollback on a failing step)
//! - Concurrent allocation against one unit
//! - Fully-allocated round trip

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::error::{AllocationError, StoreError};
use shared::ledger::{InMemoryStockStore, StockAllocationLedger, StockStore};
use shared::models::{
    AllocationContext, AllocationLine, AllocationState, CommitTarget, DemandKind, LineStatus, Serial,
    Shipment, StockOwner, StockUnit,
};
use uuid::Uuid;

fn d(n: i64) -> Decimal {
    Decimal::from(n)
}

/// In-memory store whose `split` fails for one chosen unit
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStockStore,
    fail_on: Option<Uuid>,
}

impl StockStore for FlakyStore {
    fn unit(&self, id: Uuid) -> Result<StockUnit, StoreError> {
        self.inner.unit(id)
    }

    fn get_available(&self, id: Uuid) -> Result<Decimal, StoreError> {
        self.inner.get_available(id)
    }

    fn set_available(&mut self, id: Uuid, quantity: Decimal) -> Result<(), StoreError> {
        self.inner.set_available(id, quantity)
    }

    fn split(&mut self, id: Uuid, quantity: Decimal) -> Result<Uuid, StoreError> {
        if self.fail_on == Some(id) {
            return Err(StoreError::InsufficientStock {
                unit: id,
                requested: quantity,
                available: Decimal::ZERO,
            });
        }
        self.inner.split(id, quantity)
    }

    fn transfer_owner(&mut self, id: Uuid, owner: StockOwner) -> Result<(), StoreError> {
        self.inner.transfer_owner(id, owner)
    }

    fn units_for_parts(&self, parts: &[Uuid]) -> Vec<StockUnit> {
        self.inner.units_for_parts(parts)
    }

    fn serials_for_part(&self, part: Uuid) -> Vec<Serial> {
        self.inner.serials_for_part(part)
    }

    fn begin(&mut self) {
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback()
    }
}

/// A sales order with one shipment
struct Order<S: StockStore> {
    ledger: StockAllocationLedger<S>,
    order: Uuid,
    shipment: Uuid,
    part: Uuid,
}

impl Order<InMemoryStockStore> {
    fn new() -> Self {
        Self::with_store(InMemoryStockStore::new())
    }
}

impl<S: StockStore> Order<S> {
    fn with_store(store: S) -> Self {
        let order = Uuid::new_v4();
        let ledger = StockAllocationLedger::new(store);
        let shipment = ledger
            .add_shipment(Shipment::new(order, Uuid::new_v4(), "1"))
            .unwrap();

        Self {
            ledger,
            order,
            shipment,
            part: Uuid::new_v4(),
        }
    }

    fn context(&self) -> AllocationContext {
        AllocationContext::Shipment {
            shipment_id: self.shipment,
            order_id: self.order,
        }
    }

    fn line(&self, required: i64) -> Uuid {
        self.ledger
            .add_line(AllocationLine::new(self.order, DemandKind::SalesOrder, self.part, d(required)))
            .unwrap()
    }
}

impl Order<InMemoryStockStore> {
    fn stock(&self, unit: StockUnit) -> Uuid {
        self.ledger.with_store(|s| s.insert(unit)).unwrap()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_over_allocation_guard() {
        let order = Order::new();
        let unit = order.stock(StockUnit::new(order.part, d(5)));
        let line = order.line(10);
        let line2 = order.line(10);

        let err = order.ledger.allocate(line, unit, d(6), order.context()).unwrap_err();
        assert!(matches!(err, AllocationError::OverAllocated { .. }));

        order.ledger.allocate(line, unit, d(5), order.context()).unwrap();
        let err = order.ledger.allocate(line2, unit, d(1), order.context()).unwrap_err();
        assert_eq!(
            err,
            AllocationError::OverAllocated {
                unit,
                requested: d(1),
                available: d(0),
            }
        );
    }

    #[test]
    fn test_serialized_quantity_lock() {
        let order = Order::new();
        let unit = order.stock(StockUnit::serialized(order.part, "1001"));
        let line = order.line(5);

        let err = order.ledger.allocate(line, unit, d(2), order.context()).unwrap_err();
        assert!(matches!(err, AllocationError::SerializedQuantityMismatch { .. }));

        order.ledger.allocate(line, unit, d(1), order.context()).unwrap();
    }

    #[test]
    fn test_commit_ships_and_closes() {
        let order = Order::new();
        let unit = order.stock(StockUnit::new(order.part, d(10)));
        let line = order.line(4);

        order.ledger.allocate(line, unit, d(4), order.context()).unwrap();
        let report = order
            .ledger
            .commit(CommitTarget::Shipment {
                shipment_id: order.shipment,
            })
            .unwrap();

        assert_eq!(report.total_quantity, d(4));
        assert_eq!(report.closed_lines, vec![line]);
        assert_eq!(order.ledger.line(line).unwrap().status, LineStatus::Closed);
        assert_eq!(order.ledger.stock_unit(unit).unwrap().quantity, d(6));
        assert!(order.ledger.shipment(order.shipment).unwrap().is_shipped());

        let shipped = &report.allocations[0];
        assert_eq!(shipped.state, AllocationState::Consumed);
        assert_ne!(shipped.stock_unit_id, unit);
        assert!(matches!(
            order.ledger.stock_unit(shipped.stock_unit_id).unwrap().owner,
            StockOwner::Customer(_)
        ));
    }

    #[test]
    fn test_commit_atomicity() {
        let part = Uuid::new_v4();
        let mut units: Vec<StockUnit> = (0..3).map(|_| StockUnit::new(part, d(10))).collect();
        units.sort_by_key(|u| u.id);

        // Steps run in unit id order, so the last unit fails last
        let mut store = FlakyStore {
            fail_on: Some(units[2].id),
            ..Default::default()
        };
        for unit in &units {
            store.inner.insert(unit.clone());
        }

        let mut order = Order::with_store(store);
        order.part = part;
        let line = order.line(9);
        for unit in &units {
            order.ledger.allocate(line, unit.id, d(3), order.context()).unwrap();
        }

        let err = order
            .ledger
            .commit(CommitTarget::Shipment {
                shipment_id: order.shipment,
            })
            .unwrap_err();
        assert!(matches!(err, AllocationError::CommitFailed { .. }));

        // No unit was split or transferred, nothing was consumed
        assert_eq!(order.ledger.with_store(|s| s.inner.len()).unwrap(), 3);
        for unit in &units {
            let stored = order.ledger.stock_unit(unit.id).unwrap();
            assert_eq!(stored.quantity, d(10));
            assert_eq!(stored.owner, StockOwner::InStock);
        }
        assert_eq!(order.ledger.line(line).unwrap().status, LineStatus::Open);
        assert!(!order.ledger.shipment(order.shipment).unwrap().is_shipped());
        assert!(order
            .ledger
            .allocations_for_line(line)
            .unwrap()
            .iter()
            .all(|a| a.state == AllocationState::Allocated));
    }

    #[test]
    fn test_partial_commit_reopens_line() {
        let order = Order::new();
        let unit = order.stock(StockUnit::new(order.part, d(10)));
        let line = order.line(8);

        order.ledger.allocate(line, unit, d(3), order.context()).unwrap();
        order
            .ledger
            .commit(CommitTarget::Shipment {
                shipment_id: order.shipment,
            })
            .unwrap();

        let line = order.ledger.line(line).unwrap();
        assert_eq!(line.status, LineStatus::Open);
        assert_eq!(line.fulfilled_quantity, d(3));
    }

    #[test]
    fn test_concurrent_allocations_never_exceed_stock() {
        let order = Order::new();
        let unit = order.stock(StockUnit::new(order.part, d(20)));
        let lines: Vec<Uuid> = (0..8).map(|_| order.line(10)).collect();

        // Eight threads each try to take 3 at a time from the same 20
        let accepted: Vec<Decimal> = std::thread::scope(|scope| {
            let workers: Vec<_> = lines
                .iter()
                .map(|line| {
                    let order = &order;
                    let line = *line;
                    scope.spawn(move || {
                        let mut taken = Decimal::ZERO;
                        for _ in 0..4 {
                            match order.ledger.allocate(line, unit, d(3), order.context()) {
                                Ok(_) => taken += d(3),
                                Err(e) => assert!(matches!(e, AllocationError::OverAllocated { .. })),
                            }
                        }
                        taken
                    })
                })
                .collect();

            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let accepted: Decimal = accepted.into_iter().sum();
        let recorded: Decimal = order
            .ledger
            .allocations()
            .unwrap()
            .iter()
            .map(|a| a.quantity)
            .sum();

        assert_eq!(recorded, accepted);
        assert_eq!(accepted, d(18));
    }

    #[test]
    fn test_allocate_serials() {
        let order = Order::new();
        for sn in ["1", "2", "3"] {
            order.stock(StockUnit::serialized(order.part, sn));
        }
        let line = order.line(2);

        let placed = order
            .ledger
            .allocate_serials(line, "2-3", 2, order.context())
            .unwrap();
        assert_eq!(placed.len(), 2);
        assert_eq!(order.ledger.allocated_quantity(line).unwrap(), d(2));

        let errors = order
            .ledger
            .allocate_serials(line, "3,7", 2, order.context())
            .unwrap_err();
        assert!(errors.contains(|e| matches!(e, AllocationError::SerialAlreadyAllocated(_))));
        assert!(errors.contains(|e| matches!(e, AllocationError::SerialNotFound(_))));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Whatever is requested, pending allocations never exceed the unit
        #[test]
        fn prop_unit_never_over_allocated(
            on_hand in 1i64..50,
            requests in prop::collection::vec((0usize..3, 1i64..20), 1..15),
        ) {
            let order = Order::new();
            let unit = order.stock(StockUnit::new(order.part, d(on_hand)));
            let lines: Vec<Uuid> = (0..3).map(|_| order.line(100)).collect();

            let mut accepted = Decimal::ZERO;
            for (line, quantity) in requests {
                let result = order.ledger.allocate(lines[line], unit, d(quantity), order.context());
                match result {
                    Ok(_) => accepted += d(quantity),
                    Err(e) => prop_assert!(
                        matches!(e, AllocationError::OverAllocated { .. }),
                        "unexpected error {:?}",
                        e
                    ),
                }
            }

            let total: Decimal = order
                .ledger
                .allocations()
                .unwrap()
                .iter()
                .map(|a| a.quantity)
                .sum();
            prop_assert_eq!(total, accepted);
            prop_assert!(total <= d(on_hand));
        }

        /// A line is fully allocated exactly when its allocations cover it
        #[test]
        fn prop_fully_allocated_round_trip(
            required in 1i64..40,
            chunks in prop::collection::vec(1i64..10, 0..8),
        ) {
            let order = Order::new();
            let line = order.line(required);

            for chunk in &chunks {
                let unit = order.stock(StockUnit::new(order.part, d(*chunk)));
                order.ledger.allocate(line, unit, d(*chunk), order.context()).unwrap();
            }

            let sum: Decimal = order
                .ledger
                .allocations_for_line(line)
                .unwrap()
                .iter()
                .map(|a| a.quantity)
                .sum();

            prop_assert_eq!(order.ledger.is_fully_allocated(line).unwrap(), sum >= d(required));
            prop_assert_eq!(order.ledger.is_over_allocated(line).unwrap(), sum > d(required));
            prop_assert_eq!(
                order.ledger.unallocated_quantity(line).unwrap(),
                (d(required) - sum).max(Decimal::ZERO)
            );
        }
    }
}
