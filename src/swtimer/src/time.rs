//! Tick arithmetic.
//!
//! # Ticks
//!
//! All points of time handled by this crate are raw values of the port's
//! free-running tick counter ([`PortClock::tick_count`]), represented by
//! [`UTicks`]. The counter is assumed to wrap around at `UTicks::MAX + 1`.
//! Nothing in this crate tracks wraparound epochs. Instead, every computation
//! is done with wrapping arithmetic and relies on the intervals involved being
//! much shorter than the counter period.
//!
//! [`PortClock::tick_count`]: crate::PortClock::tick_count
//!
//! # Ordering Expiry Times
//!
//! This line represents the value range of [`UTicks`]. The current time (CT)
//! is a mobile point on the line, constantly moving left to right. When it
//! reaches the end of the line, it goes back to the other end and keeps
//! moving. The expiry times of pending timers are immobile points on the line.
//!
//! ```text
//!   critical point
//!        │        CT
//! ═══════╧════════╤════════════════════════════════════╤═════════
//!        ▒▒▒▒▒▒▒▒▒│░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░│
//!        overdue  │          schedulable              CT + DURATION_MAX
//! ```
//!
//!  - `CT ..= CT + DURATION_MAX`: A timer that is started now always expires
//!    in this **schedulable zone**. [`Timer::set_value`] rejects periods that
//!    would put it anywhere else.
//!
//!  - `CT - HEADROOM .. CT`: Timers that are late (because the alarm was
//!    serviced late or because they are waiting for an earlier timer's
//!    callback to finish) are in this **overdue zone**.
//!
//! The earlier endpoint of the overdue zone is called **the critical point**.
//! Expiry times `x` and `y` can have their chronological order determined by
//! `x.wrapping_sub(critical_point).cmp(&y.wrapping_sub(critical_point))`. As
//! CT moves forward, every key shifts by the same amount, so the order of the
//! pending list stays valid without being recomputed, as long as no timer
//! falls behind the critical point.
//!
//! [`Timer::set_value`]: crate::Timer::set_value
use crate::error::BadParamError;

/// Unsigned integer type representing a tick count or a span of ticks.
pub type UTicks = u32;

/// The longest period a timer can be configured with, measured in ticks.
pub const DURATION_MAX: UTicks = 1 << 31;

/// How far behind the current time a pending timer can fall before the
/// ordering of the pending list breaks down.
pub(crate) const HEADROOM: UTicks = 1 << 30;

/// Find the critical point based on the current time.
#[inline]
pub(crate) fn critical_point(now: UTicks) -> UTicks {
    now.wrapping_sub(HEADROOM)
}

/// Return `true` iff `x` is strictly earlier than `y`.
#[inline]
pub(crate) fn is_before(x: UTicks, y: UTicks, critical_point: UTicks) -> bool {
    x.wrapping_sub(critical_point) < y.wrapping_sub(critical_point)
}

/// Return `true` iff a timer expiring at `at` is due at `now`.
#[inline]
pub(crate) fn is_due(at: UTicks, now: UTicks) -> bool {
    !is_before(now, at, critical_point(now))
}

/// Validate a timer period.
#[inline]
pub(crate) fn period_from_ticks(ticks: UTicks) -> Result<UTicks, BadParamError> {
    if ticks > DURATION_MAX {
        Err(BadParamError::BadParam)
    } else {
        Ok(ticks)
    }
}

/// Calculate the number of ticks that have elapsed since `past`.
///
/// The subtraction intentionally wraps around. The result is correct as long
/// as the actual interval is shorter than the counter period.
#[inline]
pub const fn ticks_since(now: UTicks, past: UTicks) -> UTicks {
    now.wrapping_sub(past)
}

/// Convert milliseconds to ticks of a `frequency`-Hz clock.
///
/// The result is rounded up so that a timer never expires earlier than
/// requested. It saturates at [`UTicks::MAX`].
#[inline]
pub const fn ticks_from_ms(ms: u32, frequency: u32) -> UTicks {
    let ticks = (ms as u64 * frequency as u64 + 999) / 1000;
    if ticks > UTicks::MAX as u64 {
        UTicks::MAX
    } else {
        ticks as UTicks
    }
}

/// Convert ticks of a `frequency`-Hz clock to milliseconds, rounding down.
///
/// It saturates at [`u32::MAX`]. `frequency` must not be zero.
#[inline]
pub const fn ms_from_ticks(ticks: UTicks, frequency: u32) -> u32 {
    let ms = ticks as u64 * 1000 / frequency as u64;
    if ms > u32::MAX as u64 {
        u32::MAX
    } else {
        ms as u32
    }
}
