use super::activity::Activity;
use super::work_item::{WorkItem, WorkItemPhase};
use crate::core::errors::KernelError;
use crate::core::model::Model;
use crate::core::sync::lock;
use crate::core::types::{ActivityId, ManagerId, ResourceTypeId, SimTime, WorkGroupId, WorkItemId};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

/// A work item that passed admission control
#[derive(Debug, Clone)]
pub struct Admission {
    pub work_item: Arc<WorkItem>,
    pub work_group: WorkGroupId,
    pub duration: SimTime,
}

/// Outcome of releasing a work item's resources
#[derive(Debug, Default)]
pub struct Release {
    /// Whether the work item held anything to release
    pub held: bool,
    /// Queued items of this manager admitted with the freed capacity
    pub admitted: Vec<Admission>,
    /// Other managers watching resources that became available
    pub notify: BTreeSet<ManagerId>,
}

/// Items waiting for resources, grouped by activity. Activities are visited in
/// priority order; items within one activity in arrival order.
#[derive(Debug, Default)]
struct WaitQueues {
    by_activity: BTreeMap<(i32, ActivityId), VecDeque<Arc<WorkItem>>>,
}

impl WaitQueues {
    fn enqueue(&mut self, activity: &Activity, work_item: Arc<WorkItem>) {
        let waiting = self
            .by_activity
            .entry((activity.priority(), activity.id()))
            .or_default();
        let key = work_item.ordering_key();
        let position = waiting.partition_point(|queued| queued.ordering_key() <= key);
        waiting.insert(position, work_item);
    }

    fn withdraw(&mut self, id: WorkItemId) -> bool {
        let mut found = false;
        for waiting in self.by_activity.values_mut() {
            let before = waiting.len();
            waiting.retain(|queued| queued.id() != id);
            found |= waiting.len() != before;
        }
        self.by_activity.retain(|_, waiting| !waiting.is_empty());
        found
    }

    fn len(&self) -> usize {
        self.by_activity.values().map(VecDeque::len).sum()
    }
}

/// A region of the resource universe whose admission decisions are serialized
/// by one mutex
#[derive(Debug)]
pub struct ActivityManager {
    id: ManagerId,
    name: String,
    activities: Vec<ActivityId>,
    resource_types: Vec<ResourceTypeId>,
    queues: Mutex<WaitQueues>,
}

impl ActivityManager {
    pub(crate) fn new(
        id: ManagerId,
        name: String,
        activities: Vec<ActivityId>,
        resource_types: Vec<ResourceTypeId>,
    ) -> Self {
        Self {
            id,
            name,
            activities,
            resource_types,
            queues: Mutex::new(WaitQueues::default()),
        }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn activities(&self) -> &[ActivityId] {
        &self.activities
    }

    pub fn resource_types(&self) -> &[ResourceTypeId] {
        &self.resource_types
    }

    /// Queued work items in the order they will be re-evaluated
    pub fn queued(&self) -> Vec<WorkItemId> {
        lock(&self.queues)
            .by_activity
            .values()
            .flat_map(|waiting| waiting.iter().map(|wi| wi.id()))
            .collect()
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.queues).len()
    }

    /// Admit `work_item` now or queue it until resources are released
    pub fn request(
        &self,
        model: &Model,
        work_item: Arc<WorkItem>,
        now: SimTime,
    ) -> Result<Option<Admission>, KernelError> {
        let mut queues = lock(&self.queues);
        if let Some(admission) = self.try_admit(model, &work_item, now)? {
            return Ok(Some(admission));
        }
        work_item.set_phase(WorkItemPhase::Queued)?;
        let activity = model.activity(work_item.activity())?;
        debug!("{} queued {} on {}", self.name, work_item.id(), activity.name());
        queues.enqueue(activity, work_item);
        Ok(None)
    }

    /// Release everything `work_item` holds, or withdraw it from the queue if
    /// it was never admitted. Queued items of this manager are
    /// re-evaluated before the lock is dropped, so they see the freed capacity
    /// ahead of new arrivals.
    pub fn finish(
        &self,
        model: &Model,
        work_item: &WorkItem,
        now: SimTime,
    ) -> Result<Release, KernelError> {
        let mut queues = lock(&self.queues);
        let Some(caught) = work_item.take_caught() else {
            if queues.withdraw(work_item.id()) {
                debug!("{} withdrew queued {}", self.name, work_item.id());
            }
            return Ok(Release::default());
        };

        let mut notify = BTreeSet::new();
        for held in caught {
            let resource_type = model.resource_type(held.resource_type)?;
            notify.extend(resource_type.release(held, work_item.id(), now)?);
        }

        let admitted = if notify.remove(&self.id) {
            self.reevaluate_locked(&mut queues, model, now)?
        } else {
            Vec::new()
        };
        Ok(Release {
            held: true,
            admitted,
            notify,
        })
    }

    /// Re-evaluate queued items after an availability notification
    pub fn reevaluate(&self, model: &Model, now: SimTime) -> Result<Vec<Admission>, KernelError> {
        let mut queues = lock(&self.queues);
        self.reevaluate_locked(&mut queues, model, now)
    }

    fn reevaluate_locked(
        &self,
        queues: &mut WaitQueues,
        model: &Model,
        now: SimTime,
    ) -> Result<Vec<Admission>, KernelError> {
        let mut admitted = Vec::new();
        for waiting in queues.by_activity.values_mut() {
            // Items of one activity share their work groups: once the head
            // fails, the rest of that queue would too
            while let Some(work_item) = waiting.front().cloned() {
                match self.try_admit(model, &work_item, now)? {
                    Some(admission) => {
                        waiting.pop_front();
                        admitted.push(admission);
                    }
                    None => {
                        work_item.set_phase(WorkItemPhase::Queued)?;
                        break;
                    }
                }
            }
        }
        queues.by_activity.retain(|_, waiting| !waiting.is_empty());
        if !admitted.is_empty() {
            debug!("{} admitted {} queued item(s) at {}", self.name, admitted.len(), now);
        }
        Ok(admitted)
    }

    /// One admission attempt: fresh conflict zone, probe, lock the zone, try
    /// work groups in priority order, catch resources on the first feasible one
    fn try_admit(
        &self,
        model: &Model,
        work_item: &Arc<WorkItem>,
        now: SimTime,
    ) -> Result<Option<Admission>, KernelError> {
        let activity = model.activity(work_item.activity())?;
        let id = work_item.id();
        let zones = model.zones();

        zones.reset_conflict_zone(id, work_item.semaphore());
        let outcome = work_item
            .set_phase(WorkItemPhase::ZoneAssigned)
            .and_then(|()| {
                let mut touched = Vec::new();
                for work_group in activity.work_groups() {
                    for (resource_type, _) in work_group.needs() {
                        resource_type.probe(id, now, zones, &mut touched);
                    }
                }
                work_item.remember_touched(touched);
                self.resolve(model, activity, work_item, now)
            });

        for resource in work_item.take_touched() {
            resource.unprobe(id);
        }
        zones.leave(id);
        outcome
    }

    fn resolve(
        &self,
        model: &Model,
        activity: &Activity,
        work_item: &Arc<WorkItem>,
        now: SimTime,
    ) -> Result<Option<Admission>, KernelError> {
        let zones = model.zones();
        let zone_lock = zones.wait_conflict_semaphore(work_item.id());
        work_item.set_phase(WorkItemPhase::LockHeld)?;

        let chosen = activity
            .work_groups()
            .iter()
            .find(|wg| wg.is_feasible(work_item.id(), now, model.search_budget()));
        let Some(work_group) = chosen else {
            work_item.set_phase(WorkItemPhase::Infeasible)?;
            zones.signal_conflict_semaphore(zone_lock);
            return Ok(None);
        };

        work_item.set_phase(WorkItemPhase::Feasible)?;
        let duration = work_group.catch_resources(work_item, &mut *model.rng())?;
        zones.signal_conflict_semaphore(zone_lock);

        debug!(
            "{} admitted {} via {} for {} tick(s) at {}",
            self.name,
            work_item.id(),
            work_group.id(),
            duration,
            now
        );
        Ok(Some(Admission {
            work_item: Arc::clone(work_item),
            work_group: work_group.id(),
            duration,
        }))
    }
}
