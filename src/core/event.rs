use super::admission::work_item::WorkItem;
use super::errors::KernelError;
use super::execution::logical_process::EventContext;
use super::types::{ElementId, ManagerId, ResourceId, ResourceTypeId, SimTime, WorkGroupId};
use std::sync::Arc;

/// Flow-layer payload executed when its event comes due
pub type EventCallback =
    Box<dyn FnOnce(&mut EventContext<'_>) -> Result<(), KernelError> + Send + 'static>;

/// Notification that an admitted activity has run for its sampled duration
#[derive(Debug, Clone)]
pub struct Completion {
    pub work_item: Arc<WorkItem>,
    pub work_group: WorkGroupId,
    pub duration: SimTime,
}

/// The closed set of things an event can do
pub enum EventKind {
    Callback(EventCallback),
    /// Admission request for an activity
    Request(Arc<WorkItem>),
    Completion(Completion),
    /// Resources watched by a manager became available
    AvailableResource(ManagerId),
    RoleWindowOpened {
        resource: ResourceId,
        resource_type: ResourceTypeId,
    },
    /// Marks the end time; keeps the queue non-empty until termination
    Sentinel,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Callback(_) => "callback",
            EventKind::Request(_) => "request",
            EventKind::Completion(_) => "completion",
            EventKind::AvailableResource(_) => "available-resource",
            EventKind::RoleWindowOpened { .. } => "role-window-opened",
            EventKind::Sentinel => "sentinel",
        }
    }
}

impl std::fmt::Debug for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Callback(_) => f.write_str("Callback(..)"),
            EventKind::Request(work_item) => f.debug_tuple("Request").field(&work_item.id()).finish(),
            EventKind::Completion(completion) => f
                .debug_struct("Completion")
                .field("work_item", &completion.work_item.id())
                .field("work_group", &completion.work_group)
                .field("duration", &completion.duration)
                .finish(),
            EventKind::AvailableResource(manager) => {
                f.debug_tuple("AvailableResource").field(manager).finish()
            }
            EventKind::RoleWindowOpened {
                resource,
                resource_type,
            } => f
                .debug_struct("RoleWindowOpened")
                .field("resource", resource)
                .field("resource_type", resource_type)
                .finish(),
            EventKind::Sentinel => f.write_str("Sentinel"),
        }
    }
}

/// A timestamped unit of work. Immutable once created.
#[derive(Debug)]
pub struct Event {
    time: SimTime,
    owner: Option<ElementId>,
    kind: EventKind,
}

impl Event {
    pub fn new(time: SimTime, owner: Option<ElementId>, kind: EventKind) -> Self {
        Self { time, owner, kind }
    }

    /// An event running a flow-layer closure
    pub fn callback<F>(time: SimTime, owner: Option<ElementId>, f: F) -> Self
    where
        F: FnOnce(&mut EventContext<'_>) -> Result<(), KernelError> + Send + 'static,
    {
        Self::new(time, owner, EventKind::Callback(Box::new(f)))
    }

    pub fn sentinel(time: SimTime) -> Self {
        Self::new(time, None, EventKind::Sentinel)
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn owner(&self) -> Option<ElementId> {
        self.owner
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, EventKind::Sentinel)
    }

    pub fn into_kind(self) -> EventKind {
        self.kind
    }
}
