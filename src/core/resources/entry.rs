use crate::core::types::{ResourceTypeId, WorkItemId};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const TAG_BITS: u32 = 2;
const TAG_MASK: u64 = 0b11;
const TAG_BOOKED: u64 = 1;
const TAG_USED: u64 = 2;
const FREE: u64 = 0;
const NOT_BOOKED_FOR: usize = 0;

/// Tri-state booking flag of a multi-role entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Booking {
    Free,
    /// Provisionally claimed by one admission check
    Booked(WorkItemId),
    /// Held by an admitted work item
    Used(WorkItemId),
}

impl Booking {
    fn encode(self) -> u64 {
        match self {
            Booking::Free => FREE,
            Booking::Booked(wi) => (wi.get() << TAG_BITS) | TAG_BOOKED,
            Booking::Used(wi) => (wi.get() << TAG_BITS) | TAG_USED,
        }
    }

    fn decode(raw: u64) -> Self {
        let owner = WorkItemId::new(raw >> TAG_BITS);
        match raw & TAG_MASK {
            TAG_BOOKED => Booking::Booked(owner),
            TAG_USED => Booking::Used(owner),
            _ => Booking::Free,
        }
    }
}

/// Outcome of a provisional booking attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookOutcome {
    /// This call performed the FREE -> BOOKED transition
    Booked,
    /// The requester already held the book from an earlier probe this round
    AlreadyMine,
    /// Someone else holds it
    Taken(Booking),
}

/// Booking state of a resource shared by several resource types.
///
/// The owner and the tri-state flag live in one word so every transition is a
/// single compare-and-swap.
#[derive(Debug, Default)]
pub struct MultiRoleEntry {
    state: AtomicU64,
    booked_for: AtomicUsize,
}

impl MultiRoleEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn booking(&self) -> Booking {
        Booking::decode(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: Booking, to: Booking) -> Result<(), Booking> {
        self.state
            .compare_exchange(from.encode(), to.encode(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Booking::decode)
    }

    /// FREE -> BOOKED on behalf of `requester`
    pub fn try_book(&self, requester: WorkItemId) -> BookOutcome {
        match self.transition(Booking::Free, Booking::Booked(requester)) {
            Ok(()) => BookOutcome::Booked,
            Err(Booking::Booked(owner)) if owner == requester => BookOutcome::AlreadyMine,
            Err(current) => BookOutcome::Taken(current),
        }
    }

    /// BOOKED -> FREE, dropping any type claim first
    pub fn unbook(&self, requester: WorkItemId) -> bool {
        if self.booking() != Booking::Booked(requester) {
            return false;
        }
        self.booked_for.store(NOT_BOOKED_FOR, Ordering::Release);
        self.transition(Booking::Booked(requester), Booking::Free)
            .is_ok()
    }

    /// BOOKED -> USED
    pub fn claim(&self, requester: WorkItemId) -> bool {
        self.transition(Booking::Booked(requester), Booking::Used(requester))
            .is_ok()
    }

    /// USED -> FREE, dropping the type claim first
    pub fn vacate(&self, holder: WorkItemId) -> Result<(), Booking> {
        let current = self.booking();
        if current != Booking::Used(holder) {
            return Err(current);
        }
        self.booked_for.store(NOT_BOOKED_FOR, Ordering::Release);
        self.transition(Booking::Used(holder), Booking::Free)
    }

    pub fn booked_for(&self) -> Option<ResourceTypeId> {
        match self.booked_for.load(Ordering::Acquire) {
            NOT_BOOKED_FOR => None,
            slot => Some(ResourceTypeId::new(slot - 1)),
        }
    }

    /// Claim a booked entry for one resource type during the assignment
    /// search. Only the booker may mark it, and only while unclaimed.
    pub fn mark_for(&self, resource_type: ResourceTypeId, requester: WorkItemId) -> bool {
        if self.booking() != Booking::Booked(requester) {
            return false;
        }
        self.booked_for
            .compare_exchange(
                NOT_BOOKED_FOR,
                resource_type.index() + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn clear_mark(&self, resource_type: ResourceTypeId, requester: WorkItemId) {
        if self.booking() == Booking::Booked(requester) {
            let _ = self.booked_for.compare_exchange(
                resource_type.index() + 1,
                NOT_BOOKED_FOR,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn wi(id: u64) -> WorkItemId {
        WorkItemId::new(id)
    }

    #[test]
    fn test_booking_lifecycle() {
        let entry = MultiRoleEntry::new();
        assert_eq!(entry.try_book(wi(1)), BookOutcome::Booked);
        assert_eq!(entry.try_book(wi(1)), BookOutcome::AlreadyMine);
        assert_eq!(entry.try_book(wi(2)), BookOutcome::Taken(Booking::Booked(wi(1))));

        assert!(entry.mark_for(ResourceTypeId::new(3), wi(1)));
        assert!(!entry.mark_for(ResourceTypeId::new(4), wi(1)));
        assert_eq!(entry.booked_for(), Some(ResourceTypeId::new(3)));

        assert!(entry.claim(wi(1)));
        assert_eq!(entry.booking(), Booking::Used(wi(1)));
        assert_eq!(entry.vacate(wi(2)), Err(Booking::Used(wi(1))));
        assert_eq!(entry.vacate(wi(1)), Ok(()));
        assert_eq!(entry.booking(), Booking::Free);
        assert_eq!(entry.booked_for(), None);
    }

    #[test]
    fn test_unbook_clears_type_claim() {
        let entry = MultiRoleEntry::new();
        entry.try_book(wi(5));
        entry.mark_for(ResourceTypeId::new(0), wi(5));
        assert!(!entry.unbook(wi(6)));
        assert!(entry.unbook(wi(5)));
        assert_eq!(entry.booked_for(), None);
        assert_eq!(entry.booking(), Booking::Free);
    }

    #[test]
    fn test_concurrent_booking_has_single_winner() {
        let entry = Arc::new(MultiRoleEntry::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let start = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (1..=8)
            .map(|id| {
                let entry = Arc::clone(&entry);
                let winners = Arc::clone(&winners);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    if entry.try_book(wi(id)) == BookOutcome::Booked {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(matches!(entry.booking(), Booking::Booked(_)));
    }
}
