use super::work_item::WorkItem;
use crate::core::errors::KernelError;
use crate::core::resources::{Resource, ResourceType};
use crate::core::types::{ActivityId, ResourceTypeId, SimTime, WorkGroupId, WorkItemId};
use log::{debug, warn};
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// How long an activity runs once its resources are caught
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DurationFn {
    Fixed(SimTime),
    /// Uniform over `[min, max]`
    Uniform { min: SimTime, max: SimTime },
    Exponential { mean: f64 },
    Normal { mean: f64, std_dev: f64 },
}

impl DurationFn {
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            DurationFn::Fixed(_) => Ok(()),
            DurationFn::Uniform { min, max } if min > max => {
                Err(format!("uniform duration has min {} above max {}", min, max))
            }
            DurationFn::Uniform { .. } => Ok(()),
            DurationFn::Exponential { mean } if !(mean.is_finite() && mean > 0.0) => {
                Err(format!("exponential duration needs a positive mean, got {}", mean))
            }
            DurationFn::Exponential { .. } => Ok(()),
            DurationFn::Normal { mean, std_dev } if !(mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0) => {
                Err(format!("invalid normal duration ({}, {})", mean, std_dev))
            }
            DurationFn::Normal { .. } => Ok(()),
        }
    }

    /// Draw a duration, rounded to whole ticks and clamped at zero
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SimTime {
        match *self {
            DurationFn::Fixed(ticks) => ticks,
            DurationFn::Uniform { min, max } => rng.gen_range(min..=max),
            DurationFn::Exponential { mean } => match Exp::new(1.0 / mean) {
                Ok(dist) => to_ticks(dist.sample(rng)),
                Err(_) => to_ticks(mean),
            },
            DurationFn::Normal { mean, std_dev } => match Normal::new(mean, std_dev) {
                Ok(dist) => to_ticks(dist.sample(rng)),
                Err(_) => to_ticks(mean),
            },
        }
    }
}

fn to_ticks(value: f64) -> SimTime {
    if value.is_finite() && value > 0.0 {
        value.round() as SimTime
    } else {
        0
    }
}

/// Demand a resource type's simple counter cannot cover
struct Shortfall {
    resource_type: ResourceTypeId,
    missing: usize,
    candidates: Vec<Arc<Resource>>,
}

/// Depth-first assignment of booked entries to shortfalls, one resource type
/// at a time
struct AssignmentSearch<'a> {
    requester: WorkItemId,
    shortfalls: &'a [Shortfall],
    budget: Option<usize>,
    steps: usize,
    exhausted: bool,
}

impl<'a> AssignmentSearch<'a> {
    fn assign(&mut self, level: usize, remaining: usize, start: usize) -> bool {
        let shortfalls = self.shortfalls;
        let Some(shortfall) = shortfalls.get(level) else {
            return true;
        };
        if remaining == 0 {
            let next = shortfalls.get(level + 1).map_or(0, |s| s.missing);
            return self.assign(level + 1, next, 0);
        }
        if shortfall.candidates.len().saturating_sub(start) < remaining {
            return false;
        }

        for (position, resource) in shortfall.candidates.iter().enumerate().skip(start) {
            if self.budget.is_some_and(|budget| self.steps >= budget) {
                self.exhausted = true;
                return false;
            }
            self.steps += 1;

            let entry = resource.entry();
            if !entry.mark_for(shortfall.resource_type, self.requester) {
                continue;
            }
            if self.assign(level, remaining - 1, position + 1) {
                return true;
            }
            entry.clear_mark(shortfall.resource_type, self.requester);
            if self.exhausted {
                return false;
            }
        }
        false
    }
}

/// One way of executing an activity: a resource multiset plus a duration
#[derive(Debug)]
pub struct WorkGroup {
    id: WorkGroupId,
    activity: ActivityId,
    needs: Vec<(Arc<ResourceType>, usize)>,
    duration: DurationFn,
    priority: i32,
}

impl WorkGroup {
    pub(crate) fn new(
        id: WorkGroupId,
        activity: ActivityId,
        needs: Vec<(Arc<ResourceType>, usize)>,
        duration: DurationFn,
        priority: i32,
    ) -> Self {
        Self {
            id,
            activity,
            needs,
            duration,
            priority,
        }
    }

    pub fn id(&self) -> WorkGroupId {
        self.id
    }

    pub fn activity(&self) -> ActivityId {
        self.activity
    }

    /// Lower value means tried first
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn duration(&self) -> &DurationFn {
        &self.duration
    }

    pub fn needs(&self) -> &[(Arc<ResourceType>, usize)] {
        &self.needs
    }

    fn reset_books(&self, requester: WorkItemId, upto: usize) {
        for (resource_type, _) in self.needs.iter().take(upto) {
            resource_type.reset_available(requester);
        }
    }

    /// Decide whether every need can be met right now.
    ///
    /// On success, entries needed to cover shortfalls of the simple counters
    /// stay booked by `requester` and claimed for their type; every other
    /// provisional book is dropped.
    pub fn is_feasible(&self, requester: WorkItemId, now: SimTime, budget: Option<usize>) -> bool {
        let mut short = Vec::new();
        for (position, (resource_type, needed)) in self.needs.iter().enumerate() {
            let available = resource_type.available_count(requester, now);
            if available.total() < *needed {
                self.reset_books(requester, position + 1);
                debug!(
                    "{} infeasible for {}: {} has {} of {} unit(s)",
                    self.id,
                    requester,
                    resource_type.id(),
                    available.total(),
                    needed
                );
                return false;
            }
            if available.simple < *needed {
                short.push((resource_type, needed - available.simple));
            }
        }

        let shortfalls: Vec<Shortfall> = short
            .into_iter()
            .map(|(resource_type, missing)| Shortfall {
                resource_type: resource_type.id(),
                missing,
                candidates: resource_type.booked_candidates(requester, now),
            })
            .collect();

        let found = shortfalls.is_empty() || self.search(requester, &shortfalls, budget);
        if !found {
            for shortfall in &shortfalls {
                for resource in &shortfall.candidates {
                    resource.entry().clear_mark(shortfall.resource_type, requester);
                }
            }
        }
        self.reset_books(requester, self.needs.len());
        found
    }

    fn search(&self, requester: WorkItemId, shortfalls: &[Shortfall], budget: Option<usize>) -> bool {
        let total_missing: usize = shortfalls.iter().map(|s| s.missing).sum();
        let distinct: HashSet<_> = shortfalls
            .iter()
            .flat_map(|s| s.candidates.iter().map(|resource| resource.id()))
            .collect();
        // Depth can never exceed the number of entries examined
        if total_missing > distinct.len() {
            return false;
        }

        let mut search = AssignmentSearch {
            requester,
            shortfalls,
            budget,
            steps: 0,
            exhausted: false,
        };
        let found = search.assign(0, shortfalls[0].missing, 0);
        if search.exhausted {
            warn!(
                "{}: assignment search for {} gave up after {} step(s)",
                self.id, requester, search.steps
            );
        }
        found
    }

    /// Reserve every need, publish the allocation on the work item and sample
    /// the execution time
    pub fn catch_resources<R: Rng + ?Sized>(
        &self,
        work_item: &WorkItem,
        rng: &mut R,
    ) -> Result<SimTime, KernelError> {
        let mut caught = Vec::with_capacity(self.needs.len());
        for (resource_type, needed) in &self.needs {
            caught.push(resource_type.reserve(*needed, work_item.id())?);
        }
        work_item.record_caught(self.id, caught)?;
        Ok(self.duration.sample(rng))
    }
}
