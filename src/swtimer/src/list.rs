//! The pending list: an intrusive singly-linked list of active timers, sorted
//! by expiry time.
//!
//! The list doesn't own or allocate anything. Each [`Timer`] carries its own
//! link field, and the list merely threads `&'static Timer`s through it.
use core::fmt;

use crate::{
    klock::{CpuLockCell, CpuLockTokenRefMut},
    time::{self, UTicks},
    timer::Timer,
    utils::Init,
    SchedulerTraits,
};

/// Reference to a [`Timer`] that implements `PartialEq` and `Eq` by identity
/// comparison.
pub(crate) struct TimerRef<Traits: SchedulerTraits>(pub(crate) &'static Timer<Traits>);

impl<Traits: SchedulerTraits> Clone for TimerRef<Traits> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Traits: SchedulerTraits> Copy for TimerRef<Traits> {}

impl<Traits: SchedulerTraits> PartialEq for TimerRef<Traits> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.0, other.0)
    }
}

impl<Traits: SchedulerTraits> Eq for TimerRef<Traits> {}

impl<Traits: SchedulerTraits> fmt::Debug for TimerRef<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Do not print the pointee. Its `next` field would lead to the rest of
        // the list.
        f.debug_tuple("TimerRef")
            .field(&(self.0 as *const Timer<Traits>))
            .finish()
    }
}

/// The list header.
pub(crate) struct PendingList<Traits: SchedulerTraits> {
    head: CpuLockCell<Traits, Option<TimerRef<Traits>>>,
}

impl<Traits: SchedulerTraits> Init for PendingList<Traits> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self { head: Init::INIT };
}

impl<Traits: SchedulerTraits> fmt::Debug for PendingList<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PendingList")
            .field("head", &self.head)
            .finish()
    }
}

impl<Traits: SchedulerTraits> PendingList<Traits> {
    /// Get the timer that expires first.
    #[inline]
    pub(crate) fn front(&self, lock: CpuLockTokenRefMut<'_, Traits>) -> Option<&'static Timer<Traits>> {
        self.head.get(&*lock).map(|TimerRef(timer)| timer)
    }

    /// Link `timer` after the last element whose expiry time is not later than
    /// `timer`'s, or at the front if there's none. Returns `true` if `timer`
    /// became the new head.
    ///
    /// `timer` must not be linked already.
    pub(crate) fn insert(
        &self,
        mut lock: CpuLockTokenRefMut<'_, Traits>,
        timer: &'static Timer<Traits>,
        critical_point: UTicks,
    ) -> bool {
        debug_assert!(timer.next.get(&*lock).is_none());
        debug_assert!(!self.contains(lock.borrow_mut(), timer));

        let at = timer.at.get(&*lock);

        let Some(TimerRef(head)) = self.head.get(&*lock) else {
            self.head.replace(&mut *lock, Some(TimerRef(timer)));
            return true;
        };

        if time::is_before(at, head.at.get(&*lock), critical_point) {
            // `timer` is strictly earlier than everything in the list
            timer.next.replace(&mut *lock, Some(TimerRef(head)));
            self.head.replace(&mut *lock, Some(TimerRef(timer)));
            return true;
        }

        // Find the last element that doesn't expire later than `timer`.
        // Stopping at the first strictly later element keeps the insertion
        // order among equal expiry times.
        let mut cur = head;
        while let Some(TimerRef(next)) = cur.next.get(&*lock) {
            if time::is_before(at, next.at.get(&*lock), critical_point) {
                break;
            }
            cur = next;
        }

        let after = cur.next.get(&*lock);
        timer.next.replace(&mut *lock, after);
        cur.next.replace(&mut *lock, Some(TimerRef(timer)));
        false
    }

    /// Unlink `timer`. Returns `None` if it wasn't in the list, or
    /// `Some(was_head)` otherwise.
    pub(crate) fn remove(
        &self,
        mut lock: CpuLockTokenRefMut<'_, Traits>,
        timer: &'static Timer<Traits>,
    ) -> Option<bool> {
        let target = TimerRef(timer);
        let mut prev: Option<&'static Timer<Traits>> = None;
        let mut cur = self.head.get(&*lock);

        while let Some(TimerRef(cur_timer)) = cur {
            let next = cur_timer.next.get(&*lock);
            if TimerRef(cur_timer) == target {
                match prev {
                    None => self.head.replace(&mut *lock, next),
                    Some(prev) => prev.next.replace(&mut *lock, next),
                };
                timer.next.replace(&mut *lock, None);
                return Some(prev.is_none());
            }
            prev = Some(cur_timer);
            cur = next;
        }

        None
    }

    /// Unlink and return the head.
    pub(crate) fn pop_front(
        &self,
        mut lock: CpuLockTokenRefMut<'_, Traits>,
    ) -> Option<&'static Timer<Traits>> {
        let TimerRef(head) = self.head.get(&*lock)?;
        let next = head.next.replace(&mut *lock, None);
        self.head.replace(&mut *lock, next);
        Some(head)
    }

    /// Return `true` if `timer` is linked. This walks the list; the scheduler
    /// uses [`Timer::active`] instead and only calls this to check its
    /// invariants.
    pub(crate) fn contains(
        &self,
        lock: CpuLockTokenRefMut<'_, Traits>,
        timer: &'static Timer<Traits>,
    ) -> bool {
        let mut found = false;
        self.for_each(lock, |x| found |= core::ptr::eq(x, timer));
        found
    }

    /// Visit every element in list order.
    pub(crate) fn for_each(
        &self,
        lock: CpuLockTokenRefMut<'_, Traits>,
        mut f: impl FnMut(&'static Timer<Traits>),
    ) {
        let mut cur = self.head.get(&*lock);
        while let Some(TimerRef(timer)) = cur {
            f(timer);
            cur = timer.next.get(&*lock);
        }
    }
}
