//! Timer objects
use core::fmt;

use crate::{
    error::{
        InitTimerError, QueryTimerError, ResetTimerError, SetTimerContextError,
        SetTimerValueError, StartTimerError, StopTimerError,
    },
    klock::{lock_cpu, CpuLockCell},
    list::TimerRef,
    scheduler,
    time::{self, UTicks},
    utils::Init,
    SchedulerTraits,
};

/// The callback function type of a timer. The parameter is the context value
/// set by [`Timer::set_context`].
pub type TimerFn = fn(usize);

/// A software timer.
///
/// Timers are meant to be placed in `static` items. The scheduler links them
/// into its pending list by reference and never allocates or frees them.
///
/// ```rust,ignore
/// static BLINK: Timer<SystemTraits> = Timer::new();
/// ```
///
/// A timer must be initialized by [`Self::init`] before it's started. Timers
/// are one-shot: a timer that has fired stays inactive until it's started
/// again.
pub struct Timer<Traits: SchedulerTraits> {
    /// The callback function. `None` until [`Self::init`] is called.
    pub(crate) callback: CpuLockCell<Traits, Option<TimerFn>>,

    /// The parameter supplied for `callback`.
    pub(crate) context: CpuLockCell<Traits, usize>,

    /// The expiry time. Only meaningful while `active` is `true`.
    pub(crate) at: CpuLockCell<Traits, UTicks>,

    /// The delay between [`Self::start`] and the expiry, measured in ticks.
    pub(crate) period: CpuLockCell<Traits, UTicks>,

    /// `true` iff the timer is in the pending list.
    pub(crate) active: CpuLockCell<Traits, bool>,

    /// `true` iff the timer is the head of the pending list and the alarm is
    /// armed for it.
    pub(crate) next_to_expire: CpuLockCell<Traits, bool>,

    /// The next element in the pending list.
    pub(crate) next: CpuLockCell<Traits, Option<TimerRef<Traits>>>,
}

impl<Traits: SchedulerTraits> Timer<Traits> {
    /// Construct an uninitialized timer.
    pub const fn new() -> Self {
        Self {
            callback: CpuLockCell::new(None),
            context: CpuLockCell::new(0),
            at: CpuLockCell::new(0),
            period: CpuLockCell::new(0),
            active: CpuLockCell::new(false),
            next_to_expire: CpuLockCell::new(false),
            next: CpuLockCell::new(None),
        }
    }
}

impl<Traits: SchedulerTraits> Init for Timer<Traits> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();
}

impl<Traits: SchedulerTraits> Default for Timer<Traits> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Traits: SchedulerTraits> fmt::Debug for Timer<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Timer")
            .field("self", &(self as *const _))
            .field("callback", &self.callback)
            .field("context", &self.context)
            .field("at", &self.at)
            .field("period", &self.period)
            .field("active", &self.active)
            .field("next_to_expire", &self.next_to_expire)
            .field("next", &self.next)
            .finish()
    }
}

impl<Traits: SchedulerTraits> Timer<Traits> {
    /// Bind the callback function and put the timer in its initial state:
    /// inactive, zero period, zero context.
    ///
    /// # Panics
    ///
    /// This method panics if the timer is active.
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn init(&'static self, callback: TimerFn) -> Result<(), InitTimerError> {
        let mut lock = lock_cpu::<Traits>()?;
        assert!(
            !self.active.get(&*lock),
            "cannot re-initialize an active timer"
        );
        debug_assert!(self.next.get(&*lock).is_none());

        self.callback.replace(&mut *lock, Some(callback));
        self.context.replace(&mut *lock, 0);
        self.period.replace(&mut *lock, 0);
        self.at.replace(&mut *lock, 0);
        self.next_to_expire.replace(&mut *lock, false);
        Ok(())
    }

    /// Set the value passed to the callback function.
    ///
    /// This can be done while the timer is active. The new value is used when
    /// the timer fires.
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn set_context(&'static self, context: usize) -> Result<(), SetTimerContextError> {
        let mut lock = lock_cpu::<Traits>()?;
        self.context.replace(&mut *lock, context);
        Ok(())
    }

    /// Set the period, i.e., the delay between [`Self::start`] and the
    /// expiry, in milliseconds.
    ///
    /// This doesn't affect the expiry time of the timer if it's already
    /// active.
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn set_value(&'static self, duration_ms: u32) -> Result<(), SetTimerValueError> {
        let period = time::period_from_ticks(Traits::ms_to_ticks(duration_ms))?;
        let mut lock = lock_cpu::<Traits>()?;
        self.period.replace(&mut *lock, period);
        Ok(())
    }

    /// Start the timer. It will expire after the current period.
    ///
    /// If the timer is already active, it's restarted.
    ///
    /// # Panics
    ///
    /// This method panics if the timer hasn't been initialized by
    /// [`Self::init`].
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn start(&'static self) -> Result<(), StartTimerError> {
        let mut lock = lock_cpu::<Traits>()?;
        scheduler::start_timer(lock.borrow_mut(), self);
        Ok(())
    }

    /// Stop the timer. This has no effect if the timer is inactive.
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn stop(&'static self) -> Result<(), StopTimerError> {
        let mut lock = lock_cpu::<Traits>()?;
        scheduler::stop_timer(lock.borrow_mut(), self);
        Ok(())
    }

    /// Stop and start the timer atomically, restarting the full period from
    /// now.
    ///
    /// # Panics
    ///
    /// This method panics if the timer hasn't been initialized by
    /// [`Self::init`].
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn reset(&'static self) -> Result<(), ResetTimerError> {
        let mut lock = lock_cpu::<Traits>()?;
        scheduler::stop_timer(lock.borrow_mut(), self);
        scheduler::start_timer(lock.borrow_mut(), self);
        Ok(())
    }

    /// Get a flag indicating whether the timer is in the pending list.
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn is_active(&self) -> Result<bool, QueryTimerError> {
        let lock = lock_cpu::<Traits>()?;
        Ok(self.active.get(&*lock))
    }

    /// Get the tick count at which the timer will fire, or `None` if it's
    /// inactive. This may be later than the time requested by
    /// [`Self::start`] if that was too close to be scheduled.
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn expires_at(&self) -> Result<Option<UTicks>, QueryTimerError> {
        let lock = lock_cpu::<Traits>()?;
        Ok(self.active.get(&*lock).then(|| self.at.get(&*lock)))
    }

    /// Get the value passed to the callback function.
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn context(&self) -> Result<usize, QueryTimerError> {
        let lock = lock_cpu::<Traits>()?;
        Ok(self.context.get(&*lock))
    }

    /// Get the period in ticks.
    #[cfg_attr(not(feature = "inline_syscall"), inline(never))]
    pub fn period(&self) -> Result<UTicks, QueryTimerError> {
        let lock = lock_cpu::<Traits>()?;
        Ok(self.period.get(&*lock))
    }
}
