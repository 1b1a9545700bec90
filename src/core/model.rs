use crate::core::admission::{Activity, ActivityManager, Admission, ConflictZones, WorkItem};
use crate::core::builder::Topology;
use crate::core::errors::KernelError;
use crate::core::event::{Completion, EventKind};
use crate::core::execution::config::SimulationConfig;
use crate::core::execution::logical_process::EventContext;
use crate::core::resources::{Resource, ResourceType, RoleWindow};
use crate::core::simulation_engine::FlowListener;
use crate::core::sync::lock;
use crate::core::types::{
    ActivityId, ElementId, ManagerId, ResourceId, ResourceTypeId, SimTime, WorkItemId,
};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Runtime state shared by every event of a run: the resource universe, the
/// activity managers guarding it and the conflict-zone registry
pub struct Model {
    managers: Vec<ActivityManager>,
    resource_types: Vec<Arc<ResourceType>>,
    resources: Vec<Arc<Resource>>,
    activities: Vec<Activity>,
    zones: ConflictZones,
    rng: Mutex<StdRng>,
    search_budget: Option<usize>,
    next_work_item: AtomicU64,
    listener: Arc<dyn FlowListener>,
}

impl Model {
    pub fn new(topology: Topology, config: &SimulationConfig, listener: Arc<dyn FlowListener>) -> Self {
        let Topology {
            managers,
            resource_types,
            resources,
            activities,
        } = topology;
        Self {
            managers,
            resource_types,
            resources,
            activities,
            zones: ConflictZones::new(),
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            search_budget: config.max_search_steps,
            next_work_item: AtomicU64::new(1),
            listener,
        }
    }

    pub fn managers(&self) -> &[ActivityManager] {
        &self.managers
    }

    pub fn resource_types(&self) -> &[Arc<ResourceType>] {
        &self.resource_types
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn manager(&self, id: ManagerId) -> Result<&ActivityManager, KernelError> {
        self.managers
            .get(id.index())
            .ok_or_else(|| KernelError::Topology(format!("unknown activity manager {}", id)))
    }

    pub fn resource_type(&self, id: ResourceTypeId) -> Result<&Arc<ResourceType>, KernelError> {
        self.resource_types
            .get(id.index())
            .ok_or_else(|| KernelError::Topology(format!("unknown resource type {}", id)))
    }

    pub fn resource(&self, id: ResourceId) -> Result<&Arc<Resource>, KernelError> {
        self.resources
            .get(id.index())
            .ok_or_else(|| KernelError::Topology(format!("unknown resource {}", id)))
    }

    pub fn activity(&self, id: ActivityId) -> Result<&Activity, KernelError> {
        self.activities
            .get(id.index())
            .ok_or_else(|| KernelError::Topology(format!("unknown activity {}", id)))
    }

    pub fn zones(&self) -> &ConflictZones {
        &self.zones
    }

    pub fn search_budget(&self) -> Option<usize> {
        self.search_budget
    }

    pub(crate) fn rng(&self) -> MutexGuard<'_, StdRng> {
        lock(&self.rng)
    }

    /// Create a work item for `element` asking to perform `activity`
    pub fn create_work_item(
        &self,
        element: ElementId,
        activity: ActivityId,
        arrival: SimTime,
    ) -> Result<Arc<WorkItem>, KernelError> {
        self.activity(activity)?;
        let id = WorkItemId::new(self.next_work_item.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(WorkItem::new(id, element, activity, arrival)))
    }

    /// Issue a request from inside a running event. The request is admitted
    /// at the current instant, after the calling event.
    pub fn submit(
        &self,
        element: ElementId,
        activity: ActivityId,
        ctx: &mut EventContext<'_>,
    ) -> Result<Arc<WorkItem>, KernelError> {
        let work_item = self.create_work_item(element, activity, ctx.now())?;
        ctx.schedule_kind(ctx.now(), Some(element), EventKind::Request(Arc::clone(&work_item)))?;
        Ok(work_item)
    }

    /// Run admission control for `work_item`: start it now or leave it queued
    pub fn request(&self, work_item: Arc<WorkItem>, ctx: &mut EventContext<'_>) -> Result<(), KernelError> {
        let manager = self.manager(self.activity(work_item.activity())?.manager())?;
        match manager.request(self, Arc::clone(&work_item), ctx.now())? {
            Some(admission) => self.start(admission, ctx),
            None => {
                self.listener.activity_queued(&work_item, ctx.now());
                Ok(())
            }
        }
    }

    fn start(&self, admission: Admission, ctx: &mut EventContext<'_>) -> Result<(), KernelError> {
        self.listener.activity_started(&admission, ctx)?;
        let element = admission.work_item.element();
        let completion = Completion {
            work_item: admission.work_item,
            work_group: admission.work_group,
            duration: admission.duration,
        };
        ctx.schedule_kind(
            ctx.now().saturating_add(completion.duration),
            Some(element),
            EventKind::Completion(completion),
        )
    }

    /// The activity ran for its sampled duration: release and report it
    pub fn complete(&self, completion: Completion, ctx: &mut EventContext<'_>) -> Result<(), KernelError> {
        if !self.finish(&completion.work_item, ctx)? {
            debug!(
                "{} was finished before its completion at {}",
                completion.work_item.id(),
                ctx.now()
            );
            return Ok(());
        }
        self.listener.activity_completed(&completion, ctx)
    }

    /// Release everything `work_item` holds. Queued items of its manager that
    /// fit the freed capacity start immediately; other managers watching the
    /// released resources are notified at the current instant. Returns whether
    /// anything was held.
    pub fn finish(&self, work_item: &WorkItem, ctx: &mut EventContext<'_>) -> Result<bool, KernelError> {
        let manager = self.manager(self.activity(work_item.activity())?.manager())?;
        let release = manager.finish(self, work_item, ctx.now())?;
        for admission in release.admitted {
            self.start(admission, ctx)?;
        }
        for watcher in release.notify {
            ctx.schedule_kind(ctx.now(), None, EventKind::AvailableResource(watcher))?;
        }
        Ok(release.held)
    }

    /// Re-evaluate the queue of `manager` after an availability notification
    pub fn resources_available(&self, manager: ManagerId, ctx: &mut EventContext<'_>) -> Result<(), KernelError> {
        let admitted = self.manager(manager)?.reevaluate(self, ctx.now())?;
        for admission in admitted {
            self.start(admission, ctx)?;
        }
        Ok(())
    }

    /// A timetabled resource came on shift for `resource_type`
    pub fn role_window_opened(
        &self,
        resource: ResourceId,
        resource_type: ResourceTypeId,
        ctx: &mut EventContext<'_>,
    ) -> Result<(), KernelError> {
        let resource = self.resource(resource)?;
        let resource_type = self.resource_type(resource_type)?;
        if !resource.offers(resource_type.id(), ctx.now()) {
            return Ok(());
        }
        debug!(
            "{} ({}) on shift as {} at {}",
            resource.name(),
            resource.id(),
            resource_type.name(),
            ctx.now()
        );
        self.resources_available(resource_type.manager(), ctx)
    }

    /// Give `resource` a new role window, lifting a time-out. Returns when the
    /// window's opening should be announced.
    pub fn register_window(&self, resource: ResourceId, window: RoleWindow) -> Result<SimTime, KernelError> {
        if window.start >= window.end {
            return Err(KernelError::Topology(format!(
                "empty window [{}, {}) for {}",
                window.start, window.end, resource
            )));
        }
        let resource = self.resource(resource)?;
        let resource_type = self.resource_type(window.resource_type)?;
        resource.register_window(window, resource_type.manager());
        resource_type.add_entry(Arc::clone(resource));
        info!(
            "{} ({}) registered for {} over [{}, {})",
            resource.name(),
            resource.id(),
            resource_type.name(),
            window.start,
            window.end
        );
        Ok(window.start)
    }

    /// Re-register `resource` from inside a running event and announce the
    /// window's opening to the owning manager
    pub fn reopen(
        &self,
        resource: ResourceId,
        window: RoleWindow,
        ctx: &mut EventContext<'_>,
    ) -> Result<(), KernelError> {
        let opens = self.register_window(resource, window)?.max(ctx.now());
        ctx.schedule_kind(
            opens,
            None,
            EventKind::RoleWindowOpened {
                resource,
                resource_type: window.resource_type,
            },
        )
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("managers", &self.managers.len())
            .field("resource_types", &self.resource_types.len())
            .field("resources", &self.resources.len())
            .field("activities", &self.activities.len())
            .field("search_budget", &self.search_budget)
            .finish()
    }
}
