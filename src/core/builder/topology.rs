use crate::core::admission::{Activity, ActivityManager, DurationFn, WorkGroup};
use crate::core::errors::KernelError;
use crate::core::resources::{Resource, ResourceType, RoleWindow};
use crate::core::types::{ActivityId, ManagerId, ResourceId, ResourceTypeId, WorkGroupId};
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

struct ResourceTypeDecl {
    name: String,
    manager: ManagerId,
    capacity: usize,
}

struct ResourceDecl {
    name: String,
    windows: Vec<RoleWindow>,
}

struct WorkGroupDecl {
    id: WorkGroupId,
    needs: Vec<(ResourceTypeId, usize)>,
    duration: DurationFn,
    priority: i32,
}

struct ActivityDecl {
    name: String,
    priority: i32,
    work_groups: Vec<WorkGroupDecl>,
}

/// A validated, fully wired resource universe
#[derive(Debug)]
pub struct Topology {
    pub(crate) managers: Vec<ActivityManager>,
    pub(crate) resource_types: Vec<Arc<ResourceType>>,
    pub(crate) resources: Vec<Arc<Resource>>,
    pub(crate) activities: Vec<Activity>,
}

impl Topology {
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
}

/// Declares managers, resource types, resources and activities, then checks
/// and wires them into a [`Topology`]
#[derive(Default)]
pub struct TopologyBuilder {
    managers: Vec<String>,
    resource_types: Vec<ResourceTypeDecl>,
    resources: Vec<ResourceDecl>,
    activities: Vec<ActivityDecl>,
    work_group_count: usize,
    names: HashSet<String>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_name(&mut self, kind: &str, name: &str) -> Result<(), KernelError> {
        if name.is_empty() {
            return Err(KernelError::Topology(format!("{} name must not be empty", kind)));
        }
        if !self.names.insert(format!("{}:{}", kind, name)) {
            return Err(KernelError::Topology(format!("{} '{}' already exists", kind, name)));
        }
        Ok(())
    }

    pub fn add_manager(&mut self, name: &str) -> Result<ManagerId, KernelError> {
        self.claim_name("manager", name)?;
        self.managers.push(name.to_string());
        Ok(ManagerId::new(self.managers.len() - 1))
    }

    /// Declare a resource type owned by `manager`. `capacity` anonymous units
    /// are available in addition to any resources given a role window for it.
    pub fn add_resource_type(
        &mut self,
        name: &str,
        manager: ManagerId,
        capacity: usize,
    ) -> Result<ResourceTypeId, KernelError> {
        if manager.index() >= self.managers.len() {
            return Err(KernelError::Topology(format!(
                "resource type '{}' refers to unknown manager {}",
                name, manager
            )));
        }
        self.claim_name("resource type", name)?;
        self.resource_types.push(ResourceTypeDecl {
            name: name.to_string(),
            manager,
            capacity,
        });
        Ok(ResourceTypeId::new(self.resource_types.len() - 1))
    }

    pub fn add_resource(&mut self, name: &str, windows: Vec<RoleWindow>) -> Result<ResourceId, KernelError> {
        for window in &windows {
            if window.resource_type.index() >= self.resource_types.len() {
                return Err(KernelError::Topology(format!(
                    "resource '{}' has a window for unknown resource type {}",
                    name, window.resource_type
                )));
            }
            if window.start >= window.end {
                return Err(KernelError::Topology(format!(
                    "resource '{}' has an empty window [{}, {}) for {}",
                    name, window.start, window.end, window.resource_type
                )));
            }
        }
        self.claim_name("resource", name)?;
        self.resources.push(ResourceDecl {
            name: name.to_string(),
            windows,
        });
        Ok(ResourceId::new(self.resources.len() - 1))
    }

    /// Declare an activity. Lower `priority` values are re-evaluated first.
    pub fn add_activity(&mut self, name: &str, priority: i32) -> Result<ActivityId, KernelError> {
        self.claim_name("activity", name)?;
        self.activities.push(ActivityDecl {
            name: name.to_string(),
            priority,
            work_groups: Vec::new(),
        });
        Ok(ActivityId::new(self.activities.len() - 1))
    }

    /// Add a way of executing `activity`. Repeated resource types in `needs`
    /// are summed.
    pub fn add_work_group(
        &mut self,
        activity: ActivityId,
        needs: &[(ResourceTypeId, usize)],
        duration: DurationFn,
        priority: i32,
    ) -> Result<WorkGroupId, KernelError> {
        if activity.index() >= self.activities.len() {
            return Err(KernelError::Topology(format!("unknown activity {}", activity)));
        }
        duration.validate().map_err(KernelError::Topology)?;

        let mut merged: Vec<(ResourceTypeId, usize)> = Vec::with_capacity(needs.len());
        for &(resource_type, count) in needs {
            if resource_type.index() >= self.resource_types.len() {
                return Err(KernelError::Topology(format!(
                    "work group of {} needs unknown resource type {}",
                    activity, resource_type
                )));
            }
            match merged.iter_mut().find(|(existing, _)| *existing == resource_type) {
                Some((_, total)) => *total += count,
                None => merged.push((resource_type, count)),
            }
        }
        merged.retain(|(_, count)| *count > 0);
        if merged.is_empty() {
            return Err(KernelError::Topology(format!(
                "work group of {} needs no resources",
                activity
            )));
        }

        let managers: HashSet<ManagerId> = merged
            .iter()
            .map(|(rt, _)| self.resource_types[rt.index()].manager)
            .collect();
        if managers.len() > 1 {
            return Err(KernelError::Topology(format!(
                "work group of {} spans {} activity managers",
                activity,
                managers.len()
            )));
        }

        let id = WorkGroupId::new(self.work_group_count);
        self.work_group_count += 1;
        self.activities[activity.index()].work_groups.push(WorkGroupDecl {
            id,
            needs: merged,
            duration,
            priority,
        });
        Ok(id)
    }

    fn manager_of(&self, work_group: &WorkGroupDecl) -> Option<ManagerId> {
        work_group
            .needs
            .first()
            .map(|(rt, _)| self.resource_types[rt.index()].manager)
    }

    pub fn build(self) -> Result<Topology, KernelError> {
        // Every activity must be servable, and by a single manager
        let mut activity_managers = Vec::with_capacity(self.activities.len());
        for (index, activity) in self.activities.iter().enumerate() {
            let mut owners = activity.work_groups.iter().filter_map(|wg| self.manager_of(wg));
            let Some(owner) = owners.next() else {
                return Err(KernelError::Topology(format!(
                    "activity '{}' has no work groups",
                    activity.name
                )));
            };
            if owners.any(|other| other != owner) {
                return Err(KernelError::Topology(format!(
                    "work groups of activity '{}' belong to different managers",
                    activity.name
                )));
            }
            debug!("{} '{}' handled by {}", ActivityId::new(index), activity.name, owner);
            activity_managers.push(owner);
        }

        let resource_types: Vec<Arc<ResourceType>> = self
            .resource_types
            .iter()
            .enumerate()
            .map(|(index, decl)| {
                Arc::new(ResourceType::new(
                    ResourceTypeId::new(index),
                    decl.name.clone(),
                    decl.manager,
                    decl.capacity,
                ))
            })
            .collect();

        let mut resources = Vec::with_capacity(self.resources.len());
        for (index, decl) in self.resources.into_iter().enumerate() {
            let resource = Arc::new(Resource::new(ResourceId::new(index), decl.name));
            for window in decl.windows {
                let resource_type = &resource_types[window.resource_type.index()];
                resource.register_window(window, resource_type.manager());
                resource_type.add_entry(Arc::clone(&resource));
            }
            resources.push(resource);
        }

        let mut activities = Vec::with_capacity(self.activities.len());
        for (index, (decl, manager)) in self.activities.into_iter().zip(activity_managers).enumerate() {
            let id = ActivityId::new(index);
            let work_groups = decl
                .work_groups
                .into_iter()
                .map(|wg| {
                    let needs = wg
                        .needs
                        .into_iter()
                        .map(|(rt, count)| (Arc::clone(&resource_types[rt.index()]), count))
                        .collect();
                    WorkGroup::new(wg.id, id, needs, wg.duration, wg.priority)
                })
                .collect();
            activities.push(Activity::new(id, decl.name, decl.priority, manager, work_groups));
        }

        let managers: Vec<ActivityManager> = self
            .managers
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let id = ManagerId::new(index);
                let owned_activities = activities
                    .iter()
                    .filter(|activity| activity.manager() == id)
                    .map(Activity::id)
                    .collect();
                let owned_types = resource_types
                    .iter()
                    .filter(|rt| rt.manager() == id)
                    .map(|rt| rt.id())
                    .collect();
                ActivityManager::new(id, name, owned_activities, owned_types)
            })
            .collect();

        info!(
            "topology built: {} manager(s), {} resource type(s), {} resource(s), {} activities",
            managers.len(),
            resource_types.len(),
            resources.len(),
            activities.len()
        );
        Ok(Topology {
            managers,
            resource_types,
            resources,
            activities,
        })
    }
}
