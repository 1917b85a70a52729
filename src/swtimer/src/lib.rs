#![doc = include_str!("./lib.md")]
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

mod alarm;
pub mod error;
mod klock;
mod list;
mod scheduler;
pub mod time;
mod timer;
pub mod utils;

pub use self::{
    error::*,
    scheduler::{PendingTimer, Scheduler, State},
    time::UTicks,
    timer::{Timer, TimerFn},
};

/// Implemented by a port. Provides CPU Lock, the critical section used to
/// serialize access to the pending list.
///
/// On a real target, entering CPU Lock usually means masking the alarm
/// interrupt (or all interrupts). The scheduler never waits for CPU Lock to
/// become available; if it's already active, the operation fails with
/// `BadContext`.
///
/// # Safety
///
/// The implementation must guarantee that [`PortToScheduler::alarm_fired`] is
/// not called while CPU Lock is active.
pub unsafe trait PortThreading: Sized + 'static {
    /// Disable the alarm interrupt and return `true` if CPU Lock was inactive.
    /// Return `false` and leave the state unchanged otherwise.
    ///
    /// # Safety
    ///
    /// Only meant to be called by the scheduler.
    unsafe fn try_enter_cpu_lock() -> bool;

    /// Re-enable the alarm interrupt.
    ///
    /// # Safety
    ///
    /// Only meant to be called by the scheduler. CPU Lock must be active.
    unsafe fn leave_cpu_lock();

    /// Return a flag indicating whether CPU Lock is currently active.
    fn is_cpu_lock_active() -> bool;
}

/// Implemented by a port. Wraps the hardware tick counter and the alarm
/// peripheral.
pub trait PortClock: Sized + 'static {
    /// The tick frequency in hertz.
    const FREQUENCY: u32;

    /// Read the current value of the free-running tick counter. The counter
    /// must wrap around at `UTicks::MAX + 1`.
    fn tick_count() -> UTicks;

    /// The minimum distance between the current tick count and an alarm target
    /// that the hardware is guaranteed to catch, accounting for interrupt
    /// latency and the time needed to program the alarm.
    fn min_lead_ticks() -> UTicks;

    /// Program the alarm to call [`PortToScheduler::alarm_fired`] when the tick
    /// count reaches `at`. Replaces any previously armed target.
    ///
    /// # Safety
    ///
    /// Only meant to be called by the scheduler with CPU Lock active.
    unsafe fn arm_alarm(at: UTicks);

    /// Cancel the alarm.
    ///
    /// # Safety
    ///
    /// Only meant to be called by the scheduler with CPU Lock active.
    unsafe fn disarm_alarm();

    /// Convert a duration in milliseconds to ticks, rounding up.
    #[inline]
    fn ms_to_ticks(ms: u32) -> UTicks {
        time::ticks_from_ms(ms, Self::FREQUENCY)
    }

    /// Convert a span of ticks to milliseconds, rounding down.
    #[inline]
    fn ticks_to_ms(ticks: UTicks) -> u32 {
        time::ms_from_ticks(ticks, Self::FREQUENCY)
    }
}

/// The combination of all port traits.
pub trait Port: PortThreading + PortClock {}
impl<T: PortThreading + PortClock> Port for T {}

/// Methods intended to be called by a port.
pub trait PortToScheduler {
    /// Deliver an alarm notification. Fires the timer at the head of the
    /// pending list (if it's due) and re-arms the alarm for the next one.
    ///
    /// # Safety
    ///
    /// CPU Lock inactive. Should be called from the alarm interrupt handler or
    /// an equivalent context that can't be preempted by task code.
    unsafe fn alarm_fired();
}

impl<Traits: SchedulerTraits> PortToScheduler for Traits {
    #[inline]
    unsafe fn alarm_fired() {
        scheduler::handle_alarm::<Traits>();
    }
}

/// Associates a traits type with the scheduler state instantiated for it.
///
/// # Safety
///
/// Only meant to be implemented by [`use_scheduler!`].
pub unsafe trait SchedulerTraits: Port {
    /// Get the scheduler state.
    fn state() -> &'static State<Self>;
}

/// Instantiate the scheduler state for a traits type that implements [`Port`].
///
/// ```rust,ignore
/// swtimer::use_scheduler!(unsafe impl SchedulerTraits for SystemTraits);
/// ```
#[macro_export]
macro_rules! use_scheduler {
    (unsafe impl SchedulerTraits for $Traits:ty) => {
        const _: () = {
            static SCHEDULER_STATE: $crate::State<$Traits> =
                <$crate::State<$Traits> as $crate::utils::Init>::INIT;

            unsafe impl $crate::SchedulerTraits for $Traits {
                #[inline(always)]
                fn state() -> &'static $crate::State<$Traits> {
                    &SCHEDULER_STATE
                }
            }
        };
    };
}
