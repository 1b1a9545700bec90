use crate::core::errors::KernelError;
use crate::core::resources::{Caught, Resource};
use crate::core::sync::{lock, Semaphore};
use crate::core::types::{ActivityId, ElementId, SimTime, WorkGroupId, WorkItemId};
use log::trace;
use std::sync::{Arc, Mutex};

/// Admission state of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItemPhase {
    Unbound,
    ZoneAssigned,
    LockHeld,
    Feasible,
    Infeasible,
    /// Waiting on the activity queue for an availability notification
    Queued,
    ResourcesCaught,
    Released,
}

impl WorkItemPhase {
    fn allows(self, next: WorkItemPhase) -> bool {
        use WorkItemPhase::*;
        matches!(
            (self, next),
            (Unbound | Queued, ZoneAssigned)
                | (ZoneAssigned, LockHeld)
                | (LockHeld, Feasible | Infeasible)
                | (Infeasible, Queued)
                | (Feasible, ResourcesCaught)
                | (ResourcesCaught, Released)
        )
    }
}

#[derive(Debug)]
struct WorkItemState {
    phase: WorkItemPhase,
    work_group: Option<WorkGroupId>,
    caught: Vec<Caught>,
    /// Resources registered by the current admission attempt
    touched: Vec<Arc<Resource>>,
}

/// One activity request of a flow-layer element
pub struct WorkItem {
    id: WorkItemId,
    element: ElementId,
    activity: ActivityId,
    arrival: SimTime,
    semaphore: Arc<Semaphore>,
    state: Mutex<WorkItemState>,
}

impl WorkItem {
    pub(crate) fn new(id: WorkItemId, element: ElementId, activity: ActivityId, arrival: SimTime) -> Self {
        Self {
            id,
            element,
            activity,
            arrival,
            semaphore: Arc::new(Semaphore::new(1)),
            state: Mutex::new(WorkItemState {
                phase: WorkItemPhase::Unbound,
                work_group: None,
                caught: Vec::new(),
                touched: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> WorkItemId {
        self.id
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn activity(&self) -> ActivityId {
        self.activity
    }

    pub fn arrival(&self) -> SimTime {
        self.arrival
    }

    /// Queue ordering key: arrival time, then creation order
    pub fn ordering_key(&self) -> (SimTime, WorkItemId) {
        (self.arrival, self.id)
    }

    pub(crate) fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.semaphore)
    }

    pub fn phase(&self) -> WorkItemPhase {
        lock(&self.state).phase
    }

    pub fn work_group(&self) -> Option<WorkGroupId> {
        lock(&self.state).work_group
    }

    /// Resources currently held; empty unless the item has been admitted
    pub fn caught(&self) -> Vec<Caught> {
        lock(&self.state).caught.clone()
    }

    pub(crate) fn set_phase(&self, next: WorkItemPhase) -> Result<(), KernelError> {
        let mut state = lock(&self.state);
        if !state.phase.allows(next) {
            return Err(KernelError::AllocationInvariant(format!(
                "{} cannot move from {:?} to {:?}",
                self.id, state.phase, next
            )));
        }
        trace!("{}: {:?} -> {:?}", self.id, state.phase, next);
        state.phase = next;
        Ok(())
    }

    /// Publish a complete allocation in one step
    pub(crate) fn record_caught(&self, work_group: WorkGroupId, caught: Vec<Caught>) -> Result<(), KernelError> {
        let mut state = lock(&self.state);
        if state.phase != WorkItemPhase::Feasible || !state.caught.is_empty() {
            return Err(KernelError::AllocationInvariant(format!(
                "{} recorded an allocation in phase {:?}",
                self.id, state.phase
            )));
        }
        state.phase = WorkItemPhase::ResourcesCaught;
        state.work_group = Some(work_group);
        state.caught = caught;
        Ok(())
    }

    /// Hand back the allocation for release. `None` if nothing is held.
    pub(crate) fn take_caught(&self) -> Option<Vec<Caught>> {
        let mut state = lock(&self.state);
        if state.phase != WorkItemPhase::ResourcesCaught {
            return None;
        }
        state.phase = WorkItemPhase::Released;
        Some(std::mem::take(&mut state.caught))
    }

    pub(crate) fn remember_touched(&self, resources: Vec<Arc<Resource>>) {
        lock(&self.state).touched.extend(resources);
    }

    pub(crate) fn take_touched(&self) -> Vec<Arc<Resource>> {
        std::mem::take(&mut lock(&self.state).touched)
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("element", &self.element)
            .field("activity", &self.activity)
            .field("arrival", &self.arrival)
            .field("phase", &state.phase)
            .field("work_group", &state.work_group)
            .finish()
    }
}
