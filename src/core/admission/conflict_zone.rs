use crate::core::sync::{lock, Semaphore};
use crate::core::types::WorkItemId;
use log::trace;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// A mergeable lock domain. The representative is the lowest member id and
/// the semaphore stack is kept sorted by owner id.
#[derive(Debug)]
struct Zone {
    members: BTreeSet<WorkItemId>,
    stack: Vec<(WorkItemId, Arc<Semaphore>)>,
}

impl Zone {
    fn singleton(id: WorkItemId, semaphore: Arc<Semaphore>) -> Self {
        Self {
            members: BTreeSet::from([id]),
            stack: vec![(id, semaphore)],
        }
    }

    fn representative(&self) -> Option<WorkItemId> {
        self.members.first().copied()
    }

    fn absorb(&mut self, other: Zone) {
        self.members.extend(other.members);
        self.stack.extend(other.stack);
        self.stack.sort_by_key(|(id, _)| *id);
        self.stack.dedup_by_key(|(id, _)| *id);
    }
}

#[derive(Debug, Default)]
struct ZoneTable {
    zone_of: HashMap<WorkItemId, WorkItemId>,
    zones: BTreeMap<WorkItemId, Zone>,
}

impl ZoneTable {
    fn detach(&mut self, id: WorkItemId) {
        let Some(rep) = self.zone_of.remove(&id) else {
            return;
        };
        let Some(mut zone) = self.zones.remove(&rep) else {
            return;
        };
        zone.members.remove(&id);
        zone.stack.retain(|(owner, _)| *owner != id);
        if let Some(new_rep) = zone.representative() {
            if new_rep != rep {
                for member in &zone.members {
                    self.zone_of.insert(*member, new_rep);
                }
            }
            self.zones.insert(new_rep, zone);
        }
    }
}

/// Semaphores of one zone acquired in id order; released in reverse on drop
pub struct ZoneLock {
    owner: WorkItemId,
    held: Vec<(WorkItemId, Arc<Semaphore>)>,
}

impl ZoneLock {
    /// Ids whose semaphores are held, in acquisition order
    pub fn held(&self) -> Vec<WorkItemId> {
        self.held.iter().map(|(id, _)| *id).collect()
    }
}

impl Drop for ZoneLock {
    fn drop(&mut self) {
        while let Some((id, semaphore)) = self.held.pop() {
            semaphore.release();
            trace!("{} signalled zone semaphore of {}", self.owner, id);
        }
    }
}

/// Registry of conflict zones, keyed by work item id.
///
/// Merging only relabels members and concatenates stacks; it never waits on a
/// semaphore, and the absorbing zone is always the one with the lower
/// representative, so concurrent merges of the same pair agree.
#[derive(Debug, Default)]
pub struct ConflictZones {
    table: Mutex<ZoneTable>,
}

impl ConflictZones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh admission attempt: `id` alone in a new zone
    pub fn reset_conflict_zone(&self, id: WorkItemId, semaphore: Arc<Semaphore>) {
        let mut table = lock(&self.table);
        table.detach(id);
        table.zone_of.insert(id, id);
        table.zones.insert(id, Zone::singleton(id, semaphore));
    }

    /// Fold the zones of `a` and `b` together. Returns whether two distinct
    /// zones were merged.
    pub fn merge_conflict_list(&self, a: WorkItemId, b: WorkItemId) -> bool {
        let mut table = lock(&self.table);
        let (Some(&rep_a), Some(&rep_b)) = (table.zone_of.get(&a), table.zone_of.get(&b)) else {
            return false;
        };
        if rep_a == rep_b {
            return false;
        }

        let (keep, absorbed) = if rep_a < rep_b {
            (rep_a, rep_b)
        } else {
            (rep_b, rep_a)
        };
        let Some(absorbed_zone) = table.zones.remove(&absorbed) else {
            return false;
        };
        for member in &absorbed_zone.members {
            table.zone_of.insert(*member, keep);
        }
        if let Some(zone) = table.zones.get_mut(&keep) {
            zone.absorb(absorbed_zone);
        }
        trace!("conflict zone {} absorbed zone {}", keep, absorbed);
        true
    }

    /// Acquire every semaphore currently in the zone of `id`, lowest owner id
    /// first. The zone is snapshotted; later merges do not extend the lock.
    pub fn wait_conflict_semaphore(&self, id: WorkItemId) -> ZoneLock {
        let stack: Vec<(WorkItemId, Arc<Semaphore>)> = {
            let table = lock(&self.table);
            table
                .zone_of
                .get(&id)
                .and_then(|rep| table.zones.get(rep))
                .map(|zone| zone.stack.clone())
                .unwrap_or_default()
        };

        let mut guard = ZoneLock {
            owner: id,
            held: Vec::with_capacity(stack.len()),
        };
        for (owner, semaphore) in stack {
            semaphore.acquire();
            guard.held.push((owner, semaphore));
        }
        guard
    }

    /// Release the semaphores held for `id`
    pub fn signal_conflict_semaphore(&self, guard: ZoneLock) {
        drop(guard);
    }

    /// Remove `id` from its zone once its admission attempt has resolved
    pub fn leave(&self, id: WorkItemId) {
        lock(&self.table).detach(id);
    }

    pub fn representative(&self, id: WorkItemId) -> Option<WorkItemId> {
        lock(&self.table).zone_of.get(&id).copied()
    }

    pub fn members(&self, id: WorkItemId) -> Vec<WorkItemId> {
        let table = lock(&self.table);
        table
            .zone_of
            .get(&id)
            .and_then(|rep| table.zones.get(rep))
            .map(|zone| zone.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Owner ids of the semaphore stack of `id`'s zone, in acquisition order
    pub fn stack_order(&self, id: WorkItemId) -> Vec<WorkItemId> {
        let table = lock(&self.table);
        table
            .zone_of
            .get(&id)
            .and_then(|rep| table.zones.get(rep))
            .map(|zone| zone.stack.iter().map(|(owner, _)| *owner).collect())
            .unwrap_or_default()
    }

    pub fn zone_count(&self) -> usize {
        lock(&self.table).zones.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wi(id: u64) -> WorkItemId {
        WorkItemId::new(id)
    }

    fn zones_with(ids: &[u64]) -> (ConflictZones, Vec<Arc<Semaphore>>) {
        let zones = ConflictZones::new();
        let sems: Vec<Arc<Semaphore>> = ids.iter().map(|_| Arc::new(Semaphore::new(1))).collect();
        for (id, sem) in ids.iter().zip(&sems) {
            zones.reset_conflict_zone(wi(*id), Arc::clone(sem));
        }
        (zones, sems)
    }

    #[test]
    fn test_merge_keeps_lowest_representative() {
        let (zones, _sems) = zones_with(&[4, 2, 7]);
        assert!(zones.merge_conflict_list(wi(7), wi(4)));
        assert_eq!(zones.representative(wi(7)), Some(wi(4)));

        assert!(zones.merge_conflict_list(wi(4), wi(2)));
        assert_eq!(zones.representative(wi(7)), Some(wi(2)));
        assert_eq!(zones.members(wi(4)), vec![wi(2), wi(4), wi(7)]);
        assert_eq!(zones.stack_order(wi(2)), vec![wi(2), wi(4), wi(7)]);

        assert!(!zones.merge_conflict_list(wi(2), wi(7)));
        assert_eq!(zones.zone_count(), 1);
    }

    #[test]
    fn test_merge_direction_is_symmetric() {
        let (left, _l) = zones_with(&[3, 9]);
        let (right, _r) = zones_with(&[3, 9]);
        left.merge_conflict_list(wi(3), wi(9));
        right.merge_conflict_list(wi(9), wi(3));
        assert_eq!(left.representative(wi(9)), right.representative(wi(9)));
        assert_eq!(left.stack_order(wi(3)), right.stack_order(wi(3)));
    }

    #[test]
    fn test_leave_shrinks_and_rekeys_zone() {
        let (zones, _sems) = zones_with(&[1, 5, 6]);
        zones.merge_conflict_list(wi(1), wi(5));
        zones.merge_conflict_list(wi(5), wi(6));

        zones.leave(wi(1));
        assert_eq!(zones.representative(wi(6)), Some(wi(5)));
        assert_eq!(zones.stack_order(wi(5)), vec![wi(5), wi(6)]);
        assert_eq!(zones.representative(wi(1)), None);

        zones.leave(wi(5));
        zones.leave(wi(6));
        assert_eq!(zones.zone_count(), 0);
    }

    #[test]
    fn test_zone_lock_releases_in_reverse_on_drop() {
        let (zones, sems) = zones_with(&[1, 2]);
        zones.merge_conflict_list(wi(1), wi(2));

        let guard = zones.wait_conflict_semaphore(wi(2));
        assert_eq!(guard.held(), vec![wi(1), wi(2)]);
        assert!(sems.iter().all(|sem| sem.available_permits() == 0));

        zones.signal_conflict_semaphore(guard);
        assert!(sems.iter().all(|sem| sem.available_permits() == 1));
    }
}
