//! Shadow of the hardware alarm
use core::fmt;

use crate::{
    klock::{CpuLockCell, CpuLockTokenRefMut},
    time::UTicks,
    utils::Init,
    SchedulerTraits,
};

/// Tracks the target the port's alarm is currently armed for. This is the only
/// place that calls [`PortClock::arm_alarm`] and
/// [`PortClock::disarm_alarm`].
///
/// [`PortClock::arm_alarm`]: crate::PortClock::arm_alarm
/// [`PortClock::disarm_alarm`]: crate::PortClock::disarm_alarm
pub(crate) struct Alarm<Traits: SchedulerTraits> {
    armed_at: CpuLockCell<Traits, Option<UTicks>>,
}

impl<Traits: SchedulerTraits> Init for Alarm<Traits> {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        armed_at: Init::INIT,
    };
}

impl<Traits: SchedulerTraits> fmt::Debug for Alarm<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Alarm")
            .field("armed_at", &self.armed_at)
            .finish()
    }
}

impl<Traits: SchedulerTraits> Alarm<Traits> {
    #[inline]
    pub(crate) fn armed_at(&self, lock: CpuLockTokenRefMut<'_, Traits>) -> Option<UTicks> {
        self.armed_at.get(&*lock)
    }

    /// Program the alarm for `at`, replacing the current target.
    pub(crate) fn arm(&self, mut lock: CpuLockTokenRefMut<'_, Traits>, at: UTicks) {
        self.armed_at.replace(&mut *lock, Some(at));
        // Safety: CPU Lock active, and we are the scheduler
        unsafe { Traits::arm_alarm(at) };
    }

    /// Cancel the alarm if it's armed.
    pub(crate) fn disarm(&self, mut lock: CpuLockTokenRefMut<'_, Traits>) {
        if self.armed_at.replace(&mut *lock, None).is_some() {
            // Safety: CPU Lock active, and we are the scheduler
            unsafe { Traits::disarm_alarm() };
        }
    }

    /// Record that the alarm went off. A one-shot alarm is no longer armed
    /// after delivering its notification.
    #[inline]
    pub(crate) fn acknowledge(&self, mut lock: CpuLockTokenRefMut<'_, Traits>) {
        self.armed_at.replace(&mut *lock, None);
    }
}
