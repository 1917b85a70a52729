//! The scheduler: keeps the alarm armed for the earliest pending timer.
//!
//! # Invariants
//!
//!  - A timer's `active` flag is set iff the timer is in the pending list.
//!  - The pending list is sorted by expiry time, in the order defined in
//!    [`crate::time`]. Timers with equal expiry times are kept in the order
//!    they were inserted.
//!  - Outside [`handle_alarm`], the alarm is armed iff the pending list is
//!    non-empty, and then it's armed for the head's expiry time, and the head
//!    has `next_to_expire` set. No other timer has `next_to_expire` set.
//!
//! # Clamping
//!
//! An alarm target that is closer than [`PortClock::min_lead_ticks`] to the
//! current time might be missed by the hardware. Before the alarm is armed for
//! a timer, its expiry time is pushed forward to the earliest safe target.
//! The stored expiry time is updated, not just the armed one, and so are the
//! expiry times of the following timers that would otherwise come before it.
//!
//! [`PortClock::min_lead_ticks`]: crate::PortClock::min_lead_ticks
use core::{fmt, marker::PhantomData};

use crate::{
    alarm::Alarm,
    error::QueryTimerError,
    klock::{assume_cpu_lock, lock_cpu, CpuLockTokenRefMut},
    list::{PendingList, TimerRef},
    time::{self, UTicks},
    timer::Timer,
    utils::Init,
    SchedulerTraits,
};

/// The scheduler state, instantiated once per traits type by
/// [`use_scheduler!`](crate::use_scheduler).
pub struct State<Traits: SchedulerTraits> {
    /// Active timers, sorted by expiry time.
    pending: PendingList<Traits>,

    alarm: Alarm<Traits>,
}

impl<Traits: SchedulerTraits> Init for State<Traits> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        pending: Init::INIT,
        alarm: Init::INIT,
    };
}

impl<Traits: SchedulerTraits> fmt::Debug for State<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("State")
            .field("pending", &self.pending)
            .field("alarm", &self.alarm)
            .finish()
    }
}

/// A snapshot of an entry of the pending list, passed to the closure given to
/// [`Scheduler::for_each_pending`].
pub struct PendingTimer<Traits: SchedulerTraits> {
    /// The timer.
    pub timer: &'static Timer<Traits>,
    /// The timer's expiry time.
    pub expires_at: UTicks,
}

impl<Traits: SchedulerTraits> Clone for PendingTimer<Traits> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Traits: SchedulerTraits> Copy for PendingTimer<Traits> {}

impl<Traits: SchedulerTraits> fmt::Debug for PendingTimer<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PendingTimer")
            .field("timer", &(self.timer as *const Timer<Traits>))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl<Traits: SchedulerTraits> PendingTimer<Traits> {
    /// Return `true` if this entry refers to `timer`.
    #[inline]
    pub fn is(&self, timer: &Timer<Traits>) -> bool {
        core::ptr::eq(self.timer, timer)
    }
}

/// Scheduler-wide queries.
pub struct Scheduler<Traits>(PhantomData<Traits>);

impl<Traits: SchedulerTraits> Scheduler<Traits> {
    /// Get the current tick count.
    #[inline]
    pub fn current_time() -> UTicks {
        Traits::tick_count()
    }

    /// Get the number of milliseconds elapsed since `past`, a value previously
    /// returned by [`Self::current_time`].
    ///
    /// `past == 0` is treated as "never recorded" and yields `0`. The result
    /// is correct across a wraparound of the tick counter provided that the
    /// actual interval is shorter than the counter period.
    pub fn elapsed_time(past: UTicks) -> u32 {
        if past == 0 {
            return 0;
        }
        Traits::ticks_to_ms(time::ticks_since(Traits::tick_count(), past))
    }

    /// Get the tick count the alarm is currently armed for.
    pub fn armed_alarm() -> Result<Option<UTicks>, QueryTimerError> {
        let mut lock = lock_cpu::<Traits>()?;
        Ok(Traits::state().alarm.armed_at(lock.borrow_mut()))
    }

    /// Call `f` for each pending timer in the order they will fire.
    ///
    /// `f` is called with CPU Lock active, so any timer operation it attempts
    /// will fail with `BadContext`.
    pub fn for_each_pending(
        mut f: impl FnMut(PendingTimer<Traits>),
    ) -> Result<(), QueryTimerError> {
        let mut lock = lock_cpu::<Traits>()?;
        let mut cur = Traits::state().pending.front(lock.borrow_mut());
        while let Some(timer) = cur {
            f(PendingTimer {
                timer,
                expires_at: timer.at.get(&*lock),
            });
            cur = timer.next.get(&*lock).map(|TimerRef(next)| next);
        }
        Ok(())
    }
}

/// The core portion of [`Timer::start`].
pub(crate) fn start_timer<Traits: SchedulerTraits>(
    mut lock: CpuLockTokenRefMut<'_, Traits>,
    timer: &'static Timer<Traits>,
) {
    assert!(
        timer.callback.get(&*lock).is_some(),
        "cannot start an uninitialized timer"
    );

    if timer.active.get(&*lock) {
        // Restart. Take the stale entry out without touching the alarm;
        // `insert_timer` will bring the alarm up to date.
        unlink_timer(lock.borrow_mut(), timer);
    }

    let at = Traits::tick_count().wrapping_add(timer.period.get(&*lock));
    timer.at.replace(&mut *lock, at);
    timer.active.replace(&mut *lock, true);

    insert_timer(lock.borrow_mut(), timer);
}

/// The core portion of [`Timer::stop`].
pub(crate) fn stop_timer<Traits: SchedulerTraits>(
    mut lock: CpuLockTokenRefMut<'_, Traits>,
    timer: &'static Timer<Traits>,
) {
    if !timer.active.get(&*lock) {
        return;
    }

    if unlink_timer(lock.borrow_mut(), timer) {
        // The alarm was armed for `timer`
        update_alarm(lock.borrow_mut());
    }
}

/// Remove `timer` from the pending list and clear its flags. Returns `true` if
/// it was the head.
fn unlink_timer<Traits: SchedulerTraits>(
    mut lock: CpuLockTokenRefMut<'_, Traits>,
    timer: &'static Timer<Traits>,
) -> bool {
    let was_head = Traits::state().pending.remove(lock.borrow_mut(), timer);
    debug_assert!(was_head.is_some(), "active timer is not in the list");

    timer.active.replace(&mut *lock, false);
    timer.next_to_expire.replace(&mut *lock, false);
    was_head.unwrap_or(false)
}

/// Link `timer` into the pending list and re-arm the alarm if needed.
pub(crate) fn insert_timer<Traits: SchedulerTraits>(
    mut lock: CpuLockTokenRefMut<'_, Traits>,
    timer: &'static Timer<Traits>,
) {
    let critical_point = time::critical_point(Traits::tick_count());

    if Traits::state()
        .pending
        .insert(lock.borrow_mut(), timer, critical_point)
    {
        insert_new_head_timer(lock.borrow_mut(), timer);
    } else {
        // The head is unchanged, but it might have lost its alarm if `timer`
        // used to be the head before a restart
        update_alarm(lock.borrow_mut());
    }
}

/// Handle `timer` becoming the head of the pending list.
fn insert_new_head_timer<Traits: SchedulerTraits>(
    mut lock: CpuLockTokenRefMut<'_, Traits>,
    timer: &'static Timer<Traits>,
) {
    if let Some(TimerRef(old_head)) = timer.next.get(&*lock) {
        old_head.next_to_expire.replace(&mut *lock, false);
    }

    set_timeout(lock.borrow_mut(), timer);
}

/// Arm the alarm for `timer`, which must be the head of the pending list,
/// clamping its expiry time to the earliest target the hardware can catch.
pub(crate) fn set_timeout<Traits: SchedulerTraits>(
    mut lock: CpuLockTokenRefMut<'_, Traits>,
    timer: &'static Timer<Traits>,
) {
    debug_assert!(Traits::state()
        .pending
        .front(lock.borrow_mut())
        .map_or(false, |head| core::ptr::eq(head, timer)));

    let now = Traits::tick_count();
    let critical_point = time::critical_point(now);
    let earliest = now.wrapping_add(Traits::min_lead_ticks());

    let mut at = timer.at.get(&*lock);
    if time::is_before(at, earliest, critical_point) {
        at = earliest;
        timer.at.replace(&mut *lock, at);

        // Keep the list sorted
        let mut cur = timer.next.get(&*lock);
        while let Some(TimerRef(next)) = cur {
            if !time::is_before(next.at.get(&*lock), earliest, critical_point) {
                break;
            }
            next.at.replace(&mut *lock, earliest);
            cur = next.next.get(&*lock);
        }
    }

    timer.next_to_expire.replace(&mut *lock, true);
    Traits::state().alarm.arm(lock.borrow_mut(), at);
}

/// Make the alarm reflect the current head of the pending list.
fn update_alarm<Traits: SchedulerTraits>(mut lock: CpuLockTokenRefMut<'_, Traits>) {
    let state = Traits::state();
    match state.pending.front(lock.borrow_mut()) {
        Some(head) => {
            let armed = head.next_to_expire.get(&*lock)
                && state.alarm.armed_at(lock.borrow_mut()) == Some(head.at.get(&*lock));
            if !armed {
                set_timeout(lock.borrow_mut(), head);
            }
        }
        None => state.alarm.disarm(lock.borrow_mut()),
    }
}

/// The core portion of [`PortToScheduler::alarm_fired`].
///
/// Fires at most one timer. If more than one timer is due, the alarm is
/// re-armed for the next one immediately (after clamping), and the port
/// delivers another notification.
///
/// [`PortToScheduler::alarm_fired`]: crate::PortToScheduler::alarm_fired
pub(crate) fn handle_alarm<Traits: SchedulerTraits>() {
    // The precondition includes CPU Lock being inactive, so this `unwrap`
    // should succeed
    let mut lock = lock_cpu::<Traits>().unwrap();
    let state = Traits::state();

    // The one-shot alarm is spent
    state.alarm.acknowledge(lock.borrow_mut());

    let Some(head) = state.pending.front(lock.borrow_mut()) else {
        // Nothing is pending; a stale notification
        return;
    };

    if !time::is_due(head.at.get(&*lock), Traits::tick_count()) {
        // The notification was meant for a timer that has since been stopped
        // or restarted
        set_timeout(lock.borrow_mut(), head);
        return;
    }

    let popped = state.pending.pop_front(lock.borrow_mut());
    debug_assert!(popped.map_or(false, |x| core::ptr::eq(x, head)));

    head.active.replace(&mut *lock, false);
    head.next_to_expire.replace(&mut *lock, false);
    let callback = head.callback.get(&*lock);
    let context = head.context.get(&*lock);

    // Release CPU Lock before calling the application-provided callback
    // function. It may start, stop, or reset any timer, including `head`.
    drop(lock);

    if let Some(callback) = callback {
        callback(context);
    }

    // Re-acquire CPU Lock. If the callback left CPU Lock active, take over.
    // Safety: In that case no `CpuLockGuard` exists; ours was dropped above.
    let mut lock = lock_cpu::<Traits>().unwrap_or_else(|_| unsafe { assume_cpu_lock() });

    update_alarm(lock.borrow_mut());
}
