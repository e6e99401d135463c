//! Common types used across the workspace

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::rules;
use crate::models::{AllocationLine, LineStatus};

/// Allocation progress of a single demand line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineProgress {
    pub status: LineStatus,
    pub required: Decimal,
    pub allocated: Decimal,
    pub fulfilled: Decimal,
    pub unallocated: Decimal,
    pub fully_allocated: bool,
    pub over_allocated: bool,
}

impl LineProgress {
    /// `allocated` is the line's total allocated quantity, consumed
    /// allocations included
    pub fn new(line: &AllocationLine, allocated: Decimal) -> Self {
        Self {
            status: line.status,
            required: line.required_quantity,
            allocated,
            fulfilled: line.fulfilled_quantity,
            unallocated: rules::unallocated_quantity(line, allocated),
            fully_allocated: rules::is_fully_allocated(line, allocated),
            over_allocated: rules::is_over_allocated(line, allocated),
        }
    }

    /// Allocated share of the requirement, 0-100
    pub fn percent(&self) -> Decimal {
        if self.required <= Decimal::ZERO {
            return Decimal::ONE_HUNDRED;
        }
        let counted = if self.status == LineStatus::Closed {
            self.fulfilled
        } else {
            self.allocated
        };
        (counted * Decimal::ONE_HUNDRED / self.required)
            .min(Decimal::ONE_HUNDRED)
            .round_dp(2)
    }
}
