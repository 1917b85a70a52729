#![doc = include_str!("./lib.md")]
#![deny(unsafe_op_in_unsafe_fn)]
use spin::Mutex as SpinMutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use swtimer::{time::DURATION_MAX, PortToScheduler, SchedulerTraits, UTicks};

/// Used by `use_port!`
#[doc(hidden)]
pub extern crate swtimer;

/// The tick frequency used when `use_port!` isn't given one.
pub const DEFAULT_FREQUENCY: u32 = 1000;

/// The default value of [`State::min_lead_ticks`].
pub const DEFAULT_MIN_LEAD_TICKS: UTicks = 3;

/// Implemented on a traits type by [`use_port!`].
///
/// # Safety
///
/// Only meant to be implemented by [`use_port!`].
pub unsafe trait PortInstance: SchedulerTraits {
    /// Get the simulated hardware.
    fn port_state() -> &'static State;
}

/// The simulated hardware: a free-running tick counter, a one-shot alarm, and
/// an interrupt mask standing in for CPU Lock.
///
/// Time doesn't pass by itself. Tests move it forward by [`Self::advance`],
/// which delivers the alarm notifications that become due on the way.
///
/// # Safety
///
/// For the safety information of this type's methods, see the documentation of
/// the corresponding trait methods of `Port*`.
pub struct State {
    cpu_lock: AtomicBool,
    tick_count: AtomicU32,
    min_lead_ticks: AtomicU32,
    /// The tick count the alarm is armed for.
    alarm: SpinMutex<Option<UTicks>>,
    /// Every target passed to `arm_alarm`, oldest first.
    arm_history: SpinMutex<Vec<UTicks>>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::missing_safety_doc)]
impl State {
    pub const fn new() -> Self {
        Self {
            cpu_lock: AtomicBool::new(false),
            tick_count: AtomicU32::new(0),
            min_lead_ticks: AtomicU32::new(DEFAULT_MIN_LEAD_TICKS),
            alarm: SpinMutex::new(None),
            arm_history: SpinMutex::new(Vec::new()),
        }
    }

    pub unsafe fn try_enter_cpu_lock(&self) -> bool {
        self.cpu_lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub unsafe fn leave_cpu_lock(&self) {
        let was_active = self.cpu_lock.swap(false, Ordering::Release);
        assert!(was_active, "CPU Lock is not active");
    }

    pub fn is_cpu_lock_active(&self) -> bool {
        self.cpu_lock.load(Ordering::Relaxed)
    }

    pub fn tick_count(&self) -> UTicks {
        self.tick_count.load(Ordering::Relaxed)
    }

    pub fn min_lead_ticks(&self) -> UTicks {
        self.min_lead_ticks.load(Ordering::Relaxed)
    }

    pub unsafe fn arm_alarm(&self, at: UTicks) {
        assert!(self.is_cpu_lock_active());
        log::trace!("arm_alarm({at}) at {}", self.tick_count());
        *self.alarm.lock() = Some(at);
        self.arm_history.lock().push(at);
    }

    pub unsafe fn disarm_alarm(&self) {
        assert!(self.is_cpu_lock_active());
        log::trace!("disarm_alarm at {}", self.tick_count());
        *self.alarm.lock() = None;
    }

    /// Set the tick counter. This doesn't deliver any alarm notifications and
    /// is meant to be used to set up a test before any timer is started.
    pub fn set_tick_count(&self, now: UTicks) {
        self.tick_count.store(now, Ordering::Relaxed);
    }

    /// Change the value reported by `PortClock::min_lead_ticks`.
    pub fn set_min_lead_ticks(&self, ticks: UTicks) {
        self.min_lead_ticks.store(ticks, Ordering::Relaxed);
    }

    /// Get the tick count the simulated alarm is armed for.
    pub fn pending_alarm(&self) -> Option<UTicks> {
        *self.alarm.lock()
    }

    /// Take the record of `arm_alarm` calls made so far.
    pub fn take_arm_history(&self) -> Vec<UTicks> {
        std::mem::take(&mut *self.arm_history.lock())
    }

    /// Move the tick counter forward by `ticks`, delivering an alarm
    /// notification each time the counter reaches the armed target.
    ///
    /// A target that is already behind the counter when it's armed is
    /// delivered right away, as if the compare-match interrupt had latched.
    ///
    /// Must not be called from a timer callback.
    pub fn advance<Traits: PortInstance>(&self, ticks: UTicks) {
        assert!(
            !self.is_cpu_lock_active(),
            "advance called with CPU Lock active"
        );
        let mut remaining = ticks;
        loop {
            let now = self.tick_count();
            let armed = *self.alarm.lock();
            let due = armed.and_then(|at| {
                let delta = at.wrapping_sub(now);
                if delta > DURATION_MAX {
                    // Missed. The scheduler never arms further ahead than
                    // `DURATION_MAX`.
                    Some(0)
                } else if delta <= remaining {
                    Some(delta)
                } else {
                    None
                }
            });

            let Some(delta) = due else {
                self.set_tick_count(now.wrapping_add(remaining));
                break;
            };

            remaining -= delta;
            self.set_tick_count(now.wrapping_add(delta));
            *self.alarm.lock() = None;

            log::trace!("delivering the alarm at {}", self.tick_count());
            // Safety: CPU Lock inactive, and nothing else is running on
            //         behalf of `Traits`
            unsafe { <Traits as PortToScheduler>::alarm_fired() };
        }
    }

    /// Deliver an alarm notification without moving the tick counter,
    /// simulating a stale or spurious interrupt.
    pub fn fire_alarm_now<Traits: PortInstance>(&self) {
        assert!(!self.is_cpu_lock_active());
        log::trace!("delivering a spurious alarm at {}", self.tick_count());
        *self.alarm.lock() = None;
        // Safety: CPU Lock inactive
        unsafe { <Traits as PortToScheduler>::alarm_fired() };
    }
}

/// Define a traits type and bind the simulated hardware and the scheduler to
/// it.
///
/// ```rust,ignore
/// swtimer_port_std::use_port!(unsafe struct SystemTraits);
/// swtimer_port_std::use_port!(unsafe pub struct RtcTraits, frequency = 32768);
/// ```
#[macro_export]
macro_rules! use_port {
    (unsafe $vis:vis struct $Traits:ident) => {
        $crate::use_port!(unsafe $vis struct $Traits, frequency = $crate::DEFAULT_FREQUENCY);
    };
    (unsafe $vis:vis struct $Traits:ident, frequency = $frequency:expr) => {
        $vis struct $Traits;

        const _: () = {
            use $crate::swtimer::{PortClock, PortThreading, UTicks};
            use $crate::{PortInstance, State};

            static PORT_STATE: State = State::new();

            unsafe impl PortInstance for $Traits {
                #[inline]
                fn port_state() -> &'static State {
                    &PORT_STATE
                }
            }

            unsafe impl PortThreading for $Traits {
                unsafe fn try_enter_cpu_lock() -> bool {
                    unsafe { PORT_STATE.try_enter_cpu_lock() }
                }

                unsafe fn leave_cpu_lock() {
                    unsafe { PORT_STATE.leave_cpu_lock() }
                }

                fn is_cpu_lock_active() -> bool {
                    PORT_STATE.is_cpu_lock_active()
                }
            }

            impl PortClock for $Traits {
                const FREQUENCY: u32 = $frequency;

                fn tick_count() -> UTicks {
                    PORT_STATE.tick_count()
                }

                fn min_lead_ticks() -> UTicks {
                    PORT_STATE.min_lead_ticks()
                }

                unsafe fn arm_alarm(at: UTicks) {
                    unsafe { PORT_STATE.arm_alarm(at) }
                }

                unsafe fn disarm_alarm() {
                    unsafe { PORT_STATE.disarm_alarm() }
                }
            }
        };

        $crate::swtimer::use_scheduler!(unsafe impl SchedulerTraits for $Traits);
    };
}
