use super::work_group::WorkGroup;
use crate::core::types::{ActivityId, ManagerId, WorkGroupId};

/// Something elements request to do, with one or more ways of staffing it
#[derive(Debug)]
pub struct Activity {
    id: ActivityId,
    name: String,
    priority: i32,
    manager: ManagerId,
    /// Sorted by ascending work group priority, declaration order within ties
    work_groups: Vec<WorkGroup>,
}

impl Activity {
    pub(crate) fn new(
        id: ActivityId,
        name: String,
        priority: i32,
        manager: ManagerId,
        mut work_groups: Vec<WorkGroup>,
    ) -> Self {
        work_groups.sort_by_key(|wg| wg.priority());
        Self {
            id,
            name,
            priority,
            manager,
            work_groups,
        }
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn manager(&self) -> ManagerId {
        self.manager
    }

    pub fn work_groups(&self) -> &[WorkGroup] {
        &self.work_groups
    }

    pub fn work_group(&self, id: WorkGroupId) -> Option<&WorkGroup> {
        self.work_groups.iter().find(|wg| wg.id() == id)
    }
}
