//! Demand lines and the allocations placed against them

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of parent a demand line belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DemandKind {
    SalesOrder,
    Build,
}

impl DemandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemandKind::SalesOrder => "sales_order",
            DemandKind::Build => "build",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sales_order" => Some(DemandKind::SalesOrder),
            "build" => Some(DemandKind::Build),
            _ => None,
        }
    }
}

/// Lifecycle of a demand line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    /// Accepting allocate / deallocate
    Open,
    /// Commit in progress
    Fulfilling,
    Closed,
    Cancelled,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Open => "open",
            LineStatus::Fulfilling => "fulfilling",
            LineStatus::Closed => "closed",
            LineStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(LineStatus::Open),
            "fulfilling" => Some(LineStatus::Fulfilling),
            "closed" => Some(LineStatus::Closed),
            "cancelled" => Some(LineStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LineStatus::Closed | LineStatus::Cancelled)
    }

    /// Check if a transition from this status to `next` is allowed
    pub fn can_transition_to(&self, next: LineStatus) -> bool {
        matches!(
            (self, next),
            (LineStatus::Open, LineStatus::Fulfilling)
                | (LineStatus::Open, LineStatus::Cancelled)
                | (LineStatus::Fulfilling, LineStatus::Closed)
                | (LineStatus::Fulfilling, LineStatus::Open)
        )
    }
}

impl std::fmt::Display for LineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineStatus::Open => write!(f, "Open"),
            LineStatus::Fulfilling => write!(f, "Fulfilling"),
            LineStatus::Closed => write!(f, "Closed"),
            LineStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// How a stock unit's part relates to the part a line demands.
///
/// Ordering is allocation priority: direct matches first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PartMatch {
    Direct,
    Variant,
    Substitute,
}

/// One demand: a sales order line item or a build line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationLine {
    pub id: Uuid,
    /// Sales order or build this line belongs to
    pub parent_id: Uuid,
    pub kind: DemandKind,
    pub part_id: Uuid,
    /// Variants of `part_id` that may be allocated (builds only)
    #[serde(default)]
    pub variant_parts: Vec<Uuid>,
    /// Substitute parts that may be allocated (builds only)
    #[serde(default)]
    pub substitute_parts: Vec<Uuid>,
    pub required_quantity: Decimal,
    pub fulfilled_quantity: Decimal,
    pub status: LineStatus,
}

impl AllocationLine {
    pub fn new(parent_id: Uuid, kind: DemandKind, part_id: Uuid, required_quantity: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            kind,
            part_id,
            variant_parts: Vec::new(),
            substitute_parts: Vec::new(),
            required_quantity,
            fulfilled_quantity: Decimal::ZERO,
            status: LineStatus::Open,
        }
    }

    pub fn with_variants(mut self, variants: Vec<Uuid>) -> Self {
        self.variant_parts = variants;
        self
    }

    pub fn with_substitutes(mut self, substitutes: Vec<Uuid>) -> Self {
        self.substitute_parts = substitutes;
        self
    }

    /// How `part_id` may satisfy this line, if at all
    pub fn part_match(&self, part_id: Uuid) -> Option<PartMatch> {
        if part_id == self.part_id {
            Some(PartMatch::Direct)
        } else if self.variant_parts.contains(&part_id) {
            Some(PartMatch::Variant)
        } else if self.substitute_parts.contains(&part_id) {
            Some(PartMatch::Substitute)
        } else {
            None
        }
    }

    /// Every part that may be allocated against this line
    pub fn accepted_parts(&self) -> Vec<Uuid> {
        let mut parts = vec![self.part_id];
        parts.extend(self.variant_parts.iter().copied());
        parts.extend(self.substitute_parts.iter().copied());
        parts
    }

    pub fn is_open(&self) -> bool {
        self.status == LineStatus::Open
    }

    /// Pending allocations of a line stay releasable and shippable until the
    /// line is cancelled, even after it closes
    pub fn is_active(&self) -> bool {
        self.status != LineStatus::Cancelled
    }

    pub fn is_completed(&self) -> bool {
        self.fulfilled_quantity >= self.required_quantity
    }
}

/// Lifecycle of a single allocation record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    Allocated,
    Consumed,
}

impl AllocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationState::Allocated => "allocated",
            AllocationState::Consumed => "consumed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "allocated" => Some(AllocationState::Allocated),
            "consumed" => Some(AllocationState::Consumed),
            _ => None,
        }
    }
}

/// Stock reserved from one unit against one line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Allocation {
    pub id: Uuid,
    pub line_id: Uuid,
    pub stock_unit_id: Uuid,
    pub quantity: Decimal,
    pub parent_id: Uuid,
    /// Shipment (sales) or build (builds) that commits this allocation
    pub bucket_id: Uuid,
    /// Build output the stock will be installed into
    pub install_into: Option<Uuid>,
    pub state: AllocationState,
}

impl Allocation {
    pub fn is_pending(&self) -> bool {
        self.state == AllocationState::Allocated
    }
}

/// Where a new allocation is being placed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocationContext {
    Shipment { shipment_id: Uuid, order_id: Uuid },
    Build {
        build_id: Uuid,
        #[serde(default)]
        install_into: Option<Uuid>,
    },
}

impl AllocationContext {
    pub fn parent_id(&self) -> Uuid {
        match self {
            AllocationContext::Shipment { order_id, .. } => *order_id,
            AllocationContext::Build { build_id, .. } => *build_id,
        }
    }

    pub fn bucket_id(&self) -> Uuid {
        match self {
            AllocationContext::Shipment { shipment_id, .. } => *shipment_id,
            AllocationContext::Build { build_id, .. } => *build_id,
        }
    }

    pub fn kind(&self) -> DemandKind {
        match self {
            AllocationContext::Shipment { .. } => DemandKind::SalesOrder,
            AllocationContext::Build { .. } => DemandKind::Build,
        }
    }

    pub fn install_into(&self) -> Option<Uuid> {
        match self {
            AllocationContext::Shipment { .. } => None,
            AllocationContext::Build { install_into, .. } => *install_into,
        }
    }
}

/// One entry of a batch allocation request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AllocationRequest {
    pub line_id: Uuid,
    pub stock_unit_id: Uuid,
    pub quantity: Decimal,
}

/// What a commit finalizes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommitTarget {
    Shipment { shipment_id: Uuid },
    /// Allocations of a build, limited to those installing into `output`
    Build {
        build_id: Uuid,
        #[serde(default)]
        output: Option<Uuid>,
    },
}

impl CommitTarget {
    pub fn bucket_id(&self) -> Uuid {
        match self {
            CommitTarget::Shipment { shipment_id } => *shipment_id,
            CommitTarget::Build { build_id, .. } => *build_id,
        }
    }

    /// Check if an allocation is finalized by this target
    pub fn covers(&self, allocation: &Allocation) -> bool {
        if !allocation.is_pending() || allocation.bucket_id != self.bucket_id() {
            return false;
        }
        match self {
            CommitTarget::Shipment { .. } => true,
            CommitTarget::Build { output, .. } => allocation.install_into == *output,
        }
    }
}

/// Summary returned after a successful commit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitReport {
    pub target: CommitTarget,
    pub allocations: Vec<Allocation>,
    pub closed_lines: Vec<Uuid>,
    pub total_quantity: Decimal,
}
