//! Stock unit storage used by the in-memory ledger

use std::collections::HashMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Serial, StockOwner, StockUnit};

/// Read/write access to stock units plus a transaction boundary.
///
/// Writes made between `begin` and `rollback` are undone; `commit` keeps
/// them.
pub trait StockStore {
    fn unit(&self, id: Uuid) -> Result<StockUnit, StoreError>;

    /// On-hand quantity of a unit
    fn get_available(&self, id: Uuid) -> Result<Decimal, StoreError>;

    fn set_available(&mut self, id: Uuid, quantity: Decimal) -> Result<(), StoreError>;

    /// Move `quantity` from a unit into a new unit with the same part and
    /// owner, returning the new unit's id
    fn split(&mut self, id: Uuid, quantity: Decimal) -> Result<Uuid, StoreError>;

    fn transfer_owner(&mut self, id: Uuid, owner: StockOwner) -> Result<(), StoreError>;

    /// Every unit of any of `parts`, in insertion order
    fn units_for_parts(&self, parts: &[Uuid]) -> Vec<StockUnit>;

    /// Serials of every unit of `part`, in insertion order
    fn serials_for_part(&self, part: Uuid) -> Vec<Serial>;

    fn begin(&mut self);

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    units: HashMap<Uuid, StockUnit>,
    order: Vec<Uuid>,
}

/// Stock store held in memory; a transaction is a snapshot of all units
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    units: HashMap<Uuid, StockUnit>,
    order: Vec<Uuid>,
    snapshot: Option<Snapshot>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, unit: StockUnit) -> Uuid {
        let id = unit.id;
        if self.units.insert(id, unit).is_none() {
            self.order.push(id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn unit_mut(&mut self, id: Uuid) -> Result<&mut StockUnit, StoreError> {
        self.units.get_mut(&id).ok_or(StoreError::UnitNotFound(id))
    }

    fn ordered(&self) -> impl Iterator<Item = &StockUnit> {
        self.order.iter().filter_map(|id| self.units.get(id))
    }
}

impl StockStore for InMemoryStockStore {
    fn unit(&self, id: Uuid) -> Result<StockUnit, StoreError> {
        self.units.get(&id).cloned().ok_or(StoreError::UnitNotFound(id))
    }

    fn get_available(&self, id: Uuid) -> Result<Decimal, StoreError> {
        self.units
            .get(&id)
            .map(|u| u.quantity)
            .ok_or(StoreError::UnitNotFound(id))
    }

    fn set_available(&mut self, id: Uuid, quantity: Decimal) -> Result<(), StoreError> {
        let unit = self.unit_mut(id)?;
        if quantity < Decimal::ZERO {
            return Err(StoreError::InsufficientStock {
                unit: id,
                requested: unit.quantity - quantity,
                available: unit.quantity,
            });
        }
        unit.quantity = quantity;
        Ok(())
    }

    fn split(&mut self, id: Uuid, quantity: Decimal) -> Result<Uuid, StoreError> {
        let unit = self.unit_mut(id)?;

        if quantity <= Decimal::ZERO || quantity >= unit.quantity || unit.serial.is_some() {
            return Err(StoreError::InsufficientStock {
                unit: id,
                requested: quantity,
                available: unit.quantity,
            });
        }

        unit.quantity -= quantity;

        let mut part = unit.clone();
        part.id = Uuid::new_v4();
        part.quantity = quantity;

        Ok(self.insert(part))
    }

    fn transfer_owner(&mut self, id: Uuid, owner: StockOwner) -> Result<(), StoreError> {
        self.unit_mut(id)?.owner = owner;
        Ok(())
    }

    fn units_for_parts(&self, parts: &[Uuid]) -> Vec<StockUnit> {
        self.ordered()
            .filter(|u| parts.contains(&u.part_id))
            .cloned()
            .collect()
    }

    fn serials_for_part(&self, part: Uuid) -> Vec<Serial> {
        self.ordered()
            .filter(|u| u.part_id == part)
            .filter_map(StockUnit::serial_token)
            .collect()
    }

    fn begin(&mut self) {
        self.snapshot = Some(Snapshot {
            units: self.units.clone(),
            order: self.order.clone(),
        });
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.snapshot.take().map(|_| ()).ok_or(StoreError::NoTransaction)
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let snapshot = self.snapshot.take().ok_or(StoreError::NoTransaction)?;
        self.units = snapshot.units;
        self.order = snapshot.order;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_moves_quantity() {
        let part = Uuid::new_v4();
        let mut store = InMemoryStockStore::new();
        let id = store.insert(StockUnit::new(part, Decimal::from(10)));

        let new_id = store.split(id, Decimal::from(3)).unwrap();

        assert_eq!(store.get_available(id).unwrap(), Decimal::from(7));
        assert_eq!(store.get_available(new_id).unwrap(), Decimal::from(3));
        assert_eq!(store.unit(new_id).unwrap().part_id, part);
    }

    #[test]
    fn test_split_rejects_whole_unit() {
        let mut store = InMemoryStockStore::new();
        let id = store.insert(StockUnit::new(Uuid::new_v4(), Decimal::from(3)));

        assert!(matches!(
            store.split(id, Decimal::from(3)),
            Err(StoreError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let mut store = InMemoryStockStore::new();
        let id = store.insert(StockUnit::new(Uuid::new_v4(), Decimal::from(10)));

        store.begin();
        let new_id = store.split(id, Decimal::from(4)).unwrap();
        store
            .transfer_owner(new_id, StockOwner::Customer(Uuid::new_v4()))
            .unwrap();
        store.rollback().unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_available(id).unwrap(), Decimal::from(10));
        assert!(matches!(store.unit(new_id), Err(StoreError::UnitNotFound(_))));
    }

    #[test]
    fn test_commit_without_begin() {
        let mut store = InMemoryStockStore::new();
        assert_eq!(store.commit(), Err(StoreError::NoTransaction));
        assert_eq!(store.rollback(), Err(StoreError::NoTransaction));
    }

    #[test]
    fn test_serials_for_part_in_insertion_order() {
        let part = Uuid::new_v4();
        let mut store = InMemoryStockStore::new();
        store.insert(StockUnit::serialized(part, "5"));
        store.insert(StockUnit::new(part, Decimal::from(10)));
        store.insert(StockUnit::serialized(part, "B-2"));
        store.insert(StockUnit::serialized(Uuid::new_v4(), "99"));

        assert_eq!(
            store.serials_for_part(part),
            vec![Serial::Number(5), Serial::Text("B-2".to_string())]
        );
    }
}
