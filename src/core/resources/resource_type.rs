use super::entry::{BookOutcome, Booking};
use super::resource::Resource;
use crate::core::admission::conflict_zone::ConflictZones;
use crate::core::errors::KernelError;
use crate::core::sync::{read, write};
use crate::core::types::{ManagerId, ResourceTypeId, SimTime, WorkItemId};
use log::{error, warn};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Units a resource type can supply right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Availability {
    /// Units available outright from the simple counter
    pub simple: usize,
    /// Additional units from multi-role entries booked for the requester
    pub overlapping: usize,
}

impl Availability {
    pub fn total(&self) -> usize {
        self.simple + self.overlapping
    }
}

/// Resources of one type held by a work item
#[derive(Debug, Clone)]
pub struct Caught {
    pub resource_type: ResourceTypeId,
    /// Units taken from the simple counter
    pub simple: usize,
    pub entries: Vec<Arc<Resource>>,
}

impl Caught {
    pub fn count(&self) -> usize {
        self.simple + self.entries.len()
    }
}

#[derive(Debug)]
pub struct ResourceType {
    id: ResourceTypeId,
    name: String,
    manager: ManagerId,
    capacity: usize,
    available: AtomicUsize,
    entries: RwLock<Vec<Arc<Resource>>>,
}

impl ResourceType {
    pub(crate) fn new(id: ResourceTypeId, name: String, manager: ManagerId, capacity: usize) -> Self {
        Self {
            id,
            name,
            manager,
            capacity,
            available: AtomicUsize::new(capacity),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ResourceTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manager(&self) -> ManagerId {
        self.manager
    }

    /// Declared simple capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn simple_available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    pub fn entries(&self) -> Vec<Arc<Resource>> {
        read(&self.entries).clone()
    }

    pub(crate) fn add_entry(&self, resource: Arc<Resource>) {
        let mut entries = write(&self.entries);
        if !entries.iter().any(|existing| existing.id() == resource.id()) {
            entries.push(resource);
        }
    }

    /// Register `requester` on every entry it could book, merging conflict zones
    /// with other checks touching the same entries. Newly touched entries are
    /// appended to `touched`.
    pub(crate) fn probe(
        &self,
        requester: WorkItemId,
        now: SimTime,
        zones: &ConflictZones,
        touched: &mut Vec<Arc<Resource>>,
    ) {
        for resource in read(&self.entries).iter() {
            if resource.offers(self.id, now) && resource.probe(requester, zones) {
                touched.push(Arc::clone(resource));
            }
        }
    }

    /// Count available units, provisionally booking every free entry inspected.
    /// Callers that end up not using this type must call `reset_available`.
    pub fn available_count(&self, requester: WorkItemId, now: SimTime) -> Availability {
        let simple = self.simple_available();
        let mut overlapping = 0;
        for resource in read(&self.entries).iter() {
            if !resource.offers(self.id, now) {
                continue;
            }
            let entry = resource.entry();
            match entry.try_book(requester) {
                BookOutcome::Booked => overlapping += 1,
                BookOutcome::AlreadyMine => {
                    if entry.booked_for().map_or(true, |claimed| claimed == self.id) {
                        overlapping += 1;
                    }
                }
                BookOutcome::Taken(_) => {}
            }
        }
        Availability {
            simple,
            overlapping,
        }
    }

    /// Drop the provisional books `requester` holds on entries of this type
    /// that no assignment claimed
    pub fn reset_available(&self, requester: WorkItemId) {
        for resource in read(&self.entries).iter() {
            let entry = resource.entry();
            if entry.booked_for().is_none() {
                entry.unbook(requester);
            }
        }
    }

    /// Entries booked by `requester` that could serve this type
    pub(crate) fn booked_candidates(&self, requester: WorkItemId, now: SimTime) -> Vec<Arc<Resource>> {
        read(&self.entries)
            .iter()
            .filter(|resource| {
                resource.offers(self.id, now)
                    && resource.entry().booking() == Booking::Booked(requester)
            })
            .cloned()
            .collect()
    }

    fn take_simple(&self, wanted: usize) -> usize {
        let mut taken = 0;
        let _ = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                taken = current.min(wanted);
                Some(current - taken)
            });
        taken
    }

    /// Take `count` units: simple capacity first, then entries claimed for this
    /// type by the assignment search. Feasibility must already be proven.
    pub fn reserve(&self, count: usize, requester: WorkItemId) -> Result<Caught, KernelError> {
        let simple = self.take_simple(count);
        let mut entries = Vec::new();
        if simple < count {
            for resource in read(&self.entries).iter() {
                if simple + entries.len() == count {
                    break;
                }
                let entry = resource.entry();
                if entry.booked_for() == Some(self.id) && entry.claim(requester) {
                    entries.push(Arc::clone(resource));
                }
            }
        }

        if simple + entries.len() < count {
            self.available.fetch_add(simple, Ordering::AcqRel);
            for resource in &entries {
                let _ = resource.entry().vacate(requester);
            }
            error!(
                "{} ({}) could only reserve {} of {} unit(s) for {}",
                self.name,
                self.id,
                simple + entries.len(),
                count,
                requester
            );
            return Err(KernelError::AllocationInvariant(format!(
                "reserve of {} unit(s) of {} for {} exceeded certified availability",
                count, self.id, requester
            )));
        }

        Ok(Caught {
            resource_type: self.id,
            simple,
            entries,
        })
    }

    /// Return caught units. Entries whose role window ended while in use are
    /// timed out instead of offered again. Returns the managers to notify.
    pub fn release(
        &self,
        caught: Caught,
        requester: WorkItemId,
        now: SimTime,
    ) -> Result<BTreeSet<ManagerId>, KernelError> {
        if caught.resource_type != self.id {
            return Err(KernelError::AllocationInvariant(format!(
                "{} asked to release units caught for {}",
                self.id, caught.resource_type
            )));
        }

        let mut notify = BTreeSet::new();
        for resource in caught.entries {
            let entry = resource.entry();
            if entry.booked_for() != Some(self.id) {
                return Err(KernelError::AllocationInvariant(format!(
                    "{} held by {} is booked for {:?} instead of {}",
                    resource.id(),
                    requester,
                    entry.booked_for(),
                    self.id
                )));
            }

            let elapsed = !resource.has_role(self.id, now);
            if elapsed {
                resource.mark_timed_out();
                warn!(
                    "{} ({}) timed out: role window for {} ended before release at {}",
                    resource.name(),
                    resource.id(),
                    self.id,
                    now
                );
            }
            entry.vacate(requester).map_err(|state| {
                KernelError::AllocationInvariant(format!(
                    "{} released by {} in state {:?}",
                    resource.id(),
                    requester,
                    state
                ))
            })?;
            if !elapsed {
                notify.extend(resource.watchers());
            }
        }

        if caught.simple > 0 {
            self.available.fetch_add(caught.simple, Ordering::AcqRel);
            notify.insert(self.manager);
        }
        Ok(notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resources::resource::RoleWindow;
    use crate::core::types::ResourceId;

    fn wi(id: u64) -> WorkItemId {
        WorkItemId::new(id)
    }

    #[test]
    fn test_simple_capacity_is_conserved() {
        let rt = ResourceType::new(ResourceTypeId::new(0), "berth".into(), ManagerId::new(0), 3);

        let a = rt.reserve(2, wi(1)).unwrap();
        assert_eq!(rt.simple_available() + a.count(), 3);
        let b = rt.reserve(1, wi(2)).unwrap();
        assert_eq!(rt.simple_available(), 0);

        assert!(rt.reserve(1, wi(3)).is_err());
        assert_eq!(rt.simple_available(), 0);

        let notify = rt.release(a, wi(1), 5).unwrap();
        assert!(notify.contains(&ManagerId::new(0)));
        rt.release(b, wi(2), 5).unwrap();
        assert_eq!(rt.simple_available(), 3);
    }

    #[test]
    fn test_available_count_books_free_entries() {
        let x = ResourceTypeId::new(0);
        let rt = ResourceType::new(x, "crane".into(), ManagerId::new(0), 1);
        let resource = Arc::new(Resource::new(ResourceId::new(0), "c1".into()));
        resource.register_window(RoleWindow::new(x, 0, 10), ManagerId::new(0));
        rt.add_entry(Arc::clone(&resource));

        let first = rt.available_count(wi(1), 0);
        assert_eq!(first, Availability { simple: 1, overlapping: 1 });
        let second = rt.available_count(wi(2), 0);
        assert_eq!(second, Availability { simple: 1, overlapping: 0 });

        rt.reset_available(wi(1));
        assert_eq!(resource.entry().booking(), Booking::Free);
        assert_eq!(rt.available_count(wi(2), 0).overlapping, 1);
    }
}
