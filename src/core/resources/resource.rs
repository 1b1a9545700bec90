use super::entry::MultiRoleEntry;
use crate::core::admission::conflict_zone::ConflictZones;
use crate::core::sync::lock;
use crate::core::types::{ManagerId, ResourceId, ResourceTypeId, SimTime, WorkItemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Binds a resource to one resource type over `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleWindow {
    pub resource_type: ResourceTypeId,
    pub start: SimTime,
    pub end: SimTime,
}

impl RoleWindow {
    pub fn new(resource_type: ResourceTypeId, start: SimTime, end: SimTime) -> Self {
        Self {
            resource_type,
            start,
            end,
        }
    }

    pub fn contains(&self, now: SimTime) -> bool {
        self.start <= now && now < self.end
    }
}

/// A physical resource with a timetable of role windows
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    name: String,
    entry: MultiRoleEntry,
    timetable: Mutex<Vec<RoleWindow>>,
    timed_out: AtomicBool,
    /// Managers to notify when this resource frees up
    watchers: Mutex<BTreeSet<ManagerId>>,
    /// Work items whose in-flight admission checks touched this resource
    probers: Mutex<Vec<WorkItemId>>,
}

impl Resource {
    pub(crate) fn new(id: ResourceId, name: String) -> Self {
        Self {
            id,
            name,
            entry: MultiRoleEntry::new(),
            timetable: Mutex::new(Vec::new()),
            timed_out: AtomicBool::new(false),
            watchers: Mutex::new(BTreeSet::new()),
            probers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &MultiRoleEntry {
        &self.entry
    }

    pub fn timetable(&self) -> Vec<RoleWindow> {
        lock(&self.timetable).clone()
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    /// Install a role window; clears a previous time-out
    pub(crate) fn register_window(&self, window: RoleWindow, watcher: ManagerId) {
        lock(&self.timetable).push(window);
        lock(&self.watchers).insert(watcher);
        self.timed_out.store(false, Ordering::Release);
    }

    pub(crate) fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::Release);
    }

    /// Whether the resource can currently serve `resource_type`
    pub fn offers(&self, resource_type: ResourceTypeId, now: SimTime) -> bool {
        !self.is_timed_out() && self.has_role(resource_type, now)
    }

    pub fn has_role(&self, resource_type: ResourceTypeId, now: SimTime) -> bool {
        lock(&self.timetable)
            .iter()
            .any(|w| w.resource_type == resource_type && w.contains(now))
    }

    pub fn watchers(&self) -> BTreeSet<ManagerId> {
        lock(&self.watchers).clone()
    }

    /// Register an admission check touching this resource, merging its
    /// conflict zone with every other check currently touching it
    pub(crate) fn probe(&self, requester: WorkItemId, zones: &ConflictZones) -> bool {
        let mut probers = lock(&self.probers);
        for &other in probers.iter().filter(|&&other| other != requester) {
            zones.merge_conflict_list(requester, other);
        }
        if probers.contains(&requester) {
            return false;
        }
        probers.push(requester);
        true
    }

    pub(crate) fn unprobe(&self, requester: WorkItemId) {
        lock(&self.probers).retain(|&other| other != requester);
    }
}
