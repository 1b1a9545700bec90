use crate::core::admission::{Admission, WorkItem};
use crate::core::builder::Topology;
use crate::core::errors::KernelError;
use crate::core::event::{Completion, Event, EventKind};
use crate::core::execution::config::SimulationConfig;
use crate::core::execution::logical_process::{EventContext, EventExecutor, LogicalProcess, RunSummary};
use crate::core::model::Model;
use crate::core::resources::RoleWindow;
use crate::core::types::{ActivityId, ElementId, ResourceId, SimTime};
use log::debug;
use std::sync::Arc;

/// Callbacks into the flow layer that issues requests.
///
/// Methods run on worker threads while the calling event executes; follow-on
/// work is scheduled through the supplied context.
pub trait FlowListener: Send + Sync {
    /// Admission failed; the item waits for released resources
    fn activity_queued(&self, _work_item: &WorkItem, _now: SimTime) {}

    /// Resources were caught; the completion is scheduled right after this returns
    fn activity_started(&self, _admission: &Admission, _ctx: &mut EventContext<'_>) -> Result<(), KernelError> {
        Ok(())
    }

    /// The activity ran for its duration and its resources were released
    fn activity_completed(&self, _completion: &Completion, _ctx: &mut EventContext<'_>) -> Result<(), KernelError> {
        Ok(())
    }
}

/// Listener for runs driven entirely by pre-scheduled requests
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl FlowListener for NoopListener {}

/// Executes kernel events against the shared model
pub struct KernelExecutor {
    model: Arc<Model>,
}

impl KernelExecutor {
    pub fn new(model: Arc<Model>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }
}

impl EventExecutor for KernelExecutor {
    fn execute(&self, event: Event, ctx: &mut EventContext<'_>) -> Result<(), KernelError> {
        match event.into_kind() {
            EventKind::Callback(callback) => callback(ctx),
            EventKind::Request(work_item) => self.model.request(work_item, ctx),
            EventKind::Completion(completion) => self.model.complete(completion, ctx),
            EventKind::AvailableResource(manager) => self.model.resources_available(manager, ctx),
            EventKind::RoleWindowOpened {
                resource,
                resource_type,
            } => self.model.role_window_opened(resource, resource_type, ctx),
            EventKind::Sentinel => Ok(()),
        }
    }
}

/// A configured run: one logical process executing kernel events over a model
pub struct Simulation {
    model: Arc<Model>,
    lp: LogicalProcess<KernelExecutor>,
}

impl Simulation {
    /// Create a simulation. Opening of every declared role window is
    /// announced so requests queued before a shift starts are re-evaluated.
    pub fn new(
        topology: Topology,
        config: &SimulationConfig,
        listener: Arc<dyn FlowListener>,
    ) -> Result<Self, KernelError> {
        let model = Arc::new(Model::new(topology, config, listener));
        let lp = LogicalProcess::new(KernelExecutor::new(Arc::clone(&model)), config)?;
        let simulation = Self { model, lp };

        for resource in simulation.model.resources() {
            for window in resource.timetable() {
                if window.start > 0 && window.start < config.end_time {
                    simulation.announce(resource.id(), window)?;
                }
            }
        }
        debug!(
            "simulation ready: {} pending event(s), end time {}",
            simulation.lp.pending(),
            simulation.lp.end_time()
        );
        Ok(simulation)
    }

    fn announce(&self, resource: ResourceId, window: RoleWindow) -> Result<(), KernelError> {
        self.lp.schedule(Event::new(
            window.start.max(self.lp.now()),
            None,
            EventKind::RoleWindowOpened {
                resource,
                resource_type: window.resource_type,
            },
        ))
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn now(&self) -> SimTime {
        self.lp.now()
    }

    pub fn end_time(&self) -> SimTime {
        self.lp.end_time()
    }

    /// Ask for `activity` on behalf of `element` at time `at`
    pub fn request(&self, element: ElementId, activity: ActivityId, at: SimTime) -> Result<Arc<WorkItem>, KernelError> {
        let work_item = self.model.create_work_item(element, activity, at)?;
        self.lp.schedule(Event::new(
            at,
            Some(element),
            EventKind::Request(Arc::clone(&work_item)),
        ))?;
        Ok(work_item)
    }

    pub fn schedule(&self, event: Event) -> Result<(), KernelError> {
        self.lp.schedule(event)
    }

    /// Schedule a flow-layer closure at `time`
    pub fn schedule_callback<F>(&self, time: SimTime, owner: Option<ElementId>, f: F) -> Result<(), KernelError>
    where
        F: FnOnce(&mut EventContext<'_>) -> Result<(), KernelError> + Send + 'static,
    {
        self.lp.schedule(Event::callback(time, owner, f))
    }

    /// Re-register `resource` for a new role window, lifting any time-out.
    /// Queued requests are re-evaluated when the window opens.
    pub fn register_window(&self, resource: ResourceId, window: RoleWindow) -> Result<(), KernelError> {
        self.model.register_window(resource, window)?;
        if window.end > self.lp.now() {
            self.announce(resource, window)?;
        }
        Ok(())
    }

    pub fn run(self) -> Result<RunSummary, KernelError> {
        self.lp.run()
    }
}
