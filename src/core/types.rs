/// Simulated time, in model ticks
pub type SimTime = u64;

define_id!(
    /// Identifier of a declared resource type
    ResourceTypeId,
    "rt"
);
define_id!(
    /// Identifier of a declared resource
    ResourceId,
    "res"
);
define_id!(
    /// Identifier of a declared activity
    ActivityId,
    "act"
);
define_id!(
    /// Identifier of an activity manager region
    ManagerId,
    "am"
);
define_id!(
    /// Identifier of a work group, unique across all activities
    WorkGroupId,
    "wg"
);

/// Identity of a flow-layer element issuing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Identity of a work item.
///
/// Ids are handed out in creation order starting at 1, so they double as the
/// arrival tie-break and as the canonical lock order for conflict zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItemId(u64);

impl WorkItemId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WI{}", self.0)
    }
}
