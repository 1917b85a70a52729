//! Scheduling behavior observed through the simulation port.
//!
//! Each test module defines its own traits type, so the modules have separate
//! scheduler states and can run in parallel. For the same reason, each module
//! contains only one test.
use std::sync::Mutex;
use swtimer::{Scheduler, SchedulerTraits, Timer, UTicks};
use swtimer_port_std::PortInstance;

/// Get `(timer, expiry time)` for every pending timer, in list order.
fn pending<Traits: SchedulerTraits>() -> Vec<(*const Timer<Traits>, UTicks)> {
    let mut out = Vec::new();
    Scheduler::<Traits>::for_each_pending(|p| out.push((p.timer as *const _, p.expires_at)))
        .unwrap();
    out
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two timers started at the same time are ordered by their periods, and the
/// alarm is armed for the shorter one.
mod sorted_insertion {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static B: Timer<Sys> = Timer::new();

    #[test]
    fn test() {
        init_logger();

        A.init(|_| {}).unwrap();
        A.set_value(100).unwrap();
        B.init(|_| {}).unwrap();
        B.set_value(50).unwrap();

        A.start().unwrap();
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(100)));

        B.start().unwrap();
        assert_eq!(pending::<Sys>(), [(&B as *const _, 50), (&A as *const _, 100)]);
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(50)));
        assert_eq!(Sys::port_state().pending_alarm(), Some(50));
        assert_eq!(Sys::port_state().take_arm_history(), [100, 50]);

        assert_eq!(A.is_active(), Ok(true));
        assert_eq!(A.expires_at(), Ok(Some(100)));
        assert_eq!(B.expires_at(), Ok(Some(50)));
    }
}

/// A callback that restarts its own timer goes behind a timer that expires at
/// the same time, and the alarm moves on to the remaining head.
mod restart_from_callback {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static B: Timer<Sys> = Timer::new();
    static FIRED: Mutex<Vec<(usize, UTicks)>> = Mutex::new(Vec::new());

    fn on_fire(context: usize) {
        FIRED
            .lock()
            .unwrap()
            .push((context, Scheduler::<Sys>::current_time()));
        if context == 2 && FIRED.lock().unwrap().len() == 1 {
            // The firing timer is already unlinked
            assert_eq!(B.is_active(), Ok(false));
            B.start().unwrap();
        }
    }

    #[test]
    fn test() {
        init_logger();

        A.init(on_fire).unwrap();
        A.set_context(1).unwrap();
        A.set_value(100).unwrap();
        B.init(on_fire).unwrap();
        B.set_context(2).unwrap();
        B.set_value(50).unwrap();

        A.start().unwrap();
        B.start().unwrap();

        Sys::port_state().advance::<Sys>(50);
        assert_eq!(*FIRED.lock().unwrap(), [(2, 50)]);
        assert_eq!(pending::<Sys>(), [(&A as *const _, 100), (&B as *const _, 100)]);
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(100)));

        // Both expire at 100. They fire in insertion order, one per
        // notification. By the time `A`'s callback returns, `B` is too close
        // to be scheduled and gets pushed back by the minimum lead time.
        Sys::port_state().advance::<Sys>(50);
        assert_eq!(*FIRED.lock().unwrap(), [(2, 50), (1, 100)]);
        assert_eq!(pending::<Sys>(), [(&B as *const _, 103)]);

        Sys::port_state().advance::<Sys>(3);
        assert_eq!(*FIRED.lock().unwrap(), [(2, 50), (1, 100), (2, 103)]);
        assert!(pending::<Sys>().is_empty());
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(None));
        assert_eq!(Sys::port_state().pending_alarm(), None);
    }
}

/// An expiry time closer than the minimum lead time is pushed forward, and
/// the stored expiry time reflects that.
mod clamp_to_min_lead {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static FIRED: Mutex<Vec<UTicks>> = Mutex::new(Vec::new());

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();
        port.set_tick_count(1000);
        port.set_min_lead_ticks(3);

        A.init(|_| FIRED.lock().unwrap().push(Scheduler::<Sys>::current_time()))
            .unwrap();
        A.set_value(1).unwrap();
        A.start().unwrap();

        assert_eq!(A.expires_at(), Ok(Some(1003)));
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(1003)));

        port.advance::<Sys>(2);
        assert!(FIRED.lock().unwrap().is_empty());
        port.advance::<Sys>(1);
        assert_eq!(*FIRED.lock().unwrap(), [1003]);
    }
}

/// Clamping the head doesn't let the list get out of order.
mod clamp_keeps_order {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static B: Timer<Sys> = Timer::new();
    static C: Timer<Sys> = Timer::new();

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();

        for (timer, period) in [(&A, 0), (&B, 1), (&C, 10)] {
            timer.init(|_| {}).unwrap();
            timer.set_value(period).unwrap();
        }

        // Insert C and B first so that A's clamping affects B
        C.start().unwrap();
        port.set_min_lead_ticks(0);
        B.start().unwrap();
        port.set_min_lead_ticks(5);
        A.start().unwrap();

        assert_eq!(
            pending::<Sys>(),
            [
                (&A as *const _, 5),
                (&B as *const _, 5),
                (&C as *const _, 10)
            ]
        );
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(5)));
    }
}

/// Stopping the head re-arms the alarm for the next timer.
mod stop_head {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static B: Timer<Sys> = Timer::new();

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();

        A.init(|_| panic!("A must not fire")).unwrap();
        A.set_value(100).unwrap();
        B.init(|_| panic!("B must not fire")).unwrap();
        B.set_value(50).unwrap();
        A.start().unwrap();
        B.start().unwrap();
        port.take_arm_history();

        B.stop().unwrap();
        assert_eq!(pending::<Sys>(), [(&A as *const _, 100)]);
        assert_eq!(port.take_arm_history(), [100]);
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(100)));

        // Stopping a timer that isn't the head doesn't touch the alarm
        B.start().unwrap();
        port.take_arm_history();
        A.stop().unwrap();
        assert!(port.take_arm_history().is_empty());

        // Stopping the last timer disarms the alarm
        B.stop().unwrap();
        assert_eq!(port.pending_alarm(), None);
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(None));

        port.advance::<Sys>(200);
    }
}

/// Stopping twice is the same as stopping once.
mod stop_is_idempotent {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static B: Timer<Sys> = Timer::new();

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();

        A.init(|_| {}).unwrap();
        A.set_value(10).unwrap();
        B.init(|_| {}).unwrap();
        B.set_value(20).unwrap();
        A.start().unwrap();
        B.start().unwrap();

        A.stop().unwrap();
        let after_once = (pending::<Sys>(), port.pending_alarm());
        port.take_arm_history();

        A.stop().unwrap();
        assert_eq!((pending::<Sys>(), port.pending_alarm()), after_once);
        assert!(port.take_arm_history().is_empty());
        assert_eq!(A.is_active(), Ok(false));
        assert_eq!(A.expires_at(), Ok(None));
    }
}

/// `reset` restarts the full period from the current time.
mod reset_restarts_period {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static B: Timer<Sys> = Timer::new();
    static FIRED: Mutex<Vec<(usize, UTicks)>> = Mutex::new(Vec::new());

    fn on_fire(context: usize) {
        FIRED
            .lock()
            .unwrap()
            .push((context, Scheduler::<Sys>::current_time()));
    }

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();

        A.init(on_fire).unwrap();
        A.set_context(0xa).unwrap();
        A.set_value(100).unwrap();
        B.init(on_fire).unwrap();
        B.set_context(0xb).unwrap();
        B.set_value(120).unwrap();
        A.start().unwrap();
        B.start().unwrap();

        port.advance::<Sys>(60);
        A.reset().unwrap();
        assert_eq!(A.expires_at(), Ok(Some(160)));
        assert_eq!(pending::<Sys>(), [(&B as *const _, 120), (&A as *const _, 160)]);
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(120)));

        // Starting an active timer is the same as resetting it
        port.advance::<Sys>(10);
        A.start().unwrap();
        assert_eq!(A.expires_at(), Ok(Some(170)));

        port.advance::<Sys>(200);
        assert_eq!(*FIRED.lock().unwrap(), [(0xb, 120), (0xa, 170)]);
    }
}

/// Changing the period doesn't affect a running timer.
mod set_value_while_active {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();

    #[test]
    fn test() {
        init_logger();

        A.init(|_| {}).unwrap();
        A.set_value(100).unwrap();
        A.start().unwrap();
        A.set_value(30).unwrap();
        assert_eq!(A.period(), Ok(30));
        assert_eq!(A.expires_at(), Ok(Some(100)));

        A.reset().unwrap();
        assert_eq!(A.expires_at(), Ok(Some(30)));
    }
}

/// The context can be changed while the timer is pending; the callback sees
/// the latest value.
mod context_passthrough {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static SEEN: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    #[test]
    fn test() {
        init_logger();

        A.init(|context| SEEN.lock().unwrap().push(context)).unwrap();
        assert_eq!(A.context(), Ok(0));
        A.set_value(10).unwrap();
        A.set_context(usize::MAX).unwrap();
        A.start().unwrap();
        A.set_context(42).unwrap();

        Sys::port_state().advance::<Sys>(10);
        assert_eq!(*SEEN.lock().unwrap(), [42]);
    }
}

/// Time queries, including across a wraparound of the tick counter.
mod elapsed_time {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();

        port.set_tick_count(500);
        assert_eq!(Scheduler::<Sys>::elapsed_time(0), 0);
        assert_eq!(Scheduler::<Sys>::elapsed_time(200), 300);

        port.set_tick_count(UTicks::MAX - 9);
        let past = Scheduler::<Sys>::current_time();
        port.advance::<Sys>(25);
        assert_eq!(Scheduler::<Sys>::current_time(), 15);
        assert_eq!(Scheduler::<Sys>::elapsed_time(past), 25);
    }
}

/// A timer whose expiry time lies beyond a wraparound of the tick counter
/// fires at the right time and in the right order.
mod expiry_across_wrap {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static B: Timer<Sys> = Timer::new();
    static FIRED: Mutex<Vec<(usize, UTicks)>> = Mutex::new(Vec::new());

    fn on_fire(context: usize) {
        FIRED
            .lock()
            .unwrap()
            .push((context, Scheduler::<Sys>::current_time()));
    }

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();
        port.set_tick_count(UTicks::MAX - 19);

        A.init(on_fire).unwrap();
        A.set_context(1).unwrap();
        A.set_value(50).unwrap();
        B.init(on_fire).unwrap();
        B.set_context(2).unwrap();
        B.set_value(10).unwrap();

        A.start().unwrap();
        B.start().unwrap();
        assert_eq!(A.expires_at(), Ok(Some(30)));
        assert_eq!(B.expires_at(), Ok(Some(UTicks::MAX - 9)));
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(UTicks::MAX - 9)));

        port.advance::<Sys>(49);
        assert_eq!(*FIRED.lock().unwrap(), [(2, UTicks::MAX - 9)]);
        port.advance::<Sys>(1);
        assert_eq!(*FIRED.lock().unwrap(), [(2, UTicks::MAX - 9), (1, 30)]);
    }
}

/// Alarm notifications that don't correspond to a due timer fire nothing.
mod stale_alarm {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static FIRED: Mutex<usize> = Mutex::new(0);

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();

        // Nothing is pending
        port.fire_alarm_now::<Sys>();
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(None));
        assert_eq!(port.pending_alarm(), None);

        A.init(|_| *FIRED.lock().unwrap() += 1).unwrap();
        A.set_value(100).unwrap();
        A.start().unwrap();

        // The head isn't due yet
        port.advance::<Sys>(40);
        port.fire_alarm_now::<Sys>();
        assert_eq!(*FIRED.lock().unwrap(), 0);
        assert_eq!(A.is_active(), Ok(true));
        assert_eq!(port.pending_alarm(), Some(100));
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(100)));

        port.advance::<Sys>(60);
        assert_eq!(*FIRED.lock().unwrap(), 1);

        // Fired timers are one-shot
        port.advance::<Sys>(1000);
        assert_eq!(*FIRED.lock().unwrap(), 1);
        assert_eq!(A.is_active(), Ok(false));
    }
}

/// Every operation fails with `BadContext` inside a critical section.
mod bad_context {
    use super::*;
    use swtimer::{
        InitTimerError, QueryTimerError, ResetTimerError, SetTimerContextError,
        SetTimerValueError, StartTimerError, StopTimerError,
    };

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();

        A.init(|_| {}).unwrap();
        A.set_value(10).unwrap();

        assert!(unsafe { port.try_enter_cpu_lock() });
        assert_eq!(A.init(|_| {}), Err(InitTimerError::BadContext));
        assert_eq!(A.set_context(1), Err(SetTimerContextError::BadContext));
        assert_eq!(A.set_value(1), Err(SetTimerValueError::BadContext));
        assert_eq!(A.start(), Err(StartTimerError::BadContext));
        assert_eq!(A.stop(), Err(StopTimerError::BadContext));
        assert_eq!(A.reset(), Err(ResetTimerError::BadContext));
        assert_eq!(A.is_active(), Err(QueryTimerError::BadContext));
        assert_eq!(
            Scheduler::<Sys>::armed_alarm(),
            Err(QueryTimerError::BadContext)
        );
        unsafe { port.leave_cpu_lock() };

        // Nothing has changed
        assert_eq!(A.is_active(), Ok(false));
        assert_eq!(A.period(), Ok(10));
        assert_eq!(A.context(), Ok(0));
    }
}

/// Periods that can't be ordered reliably are rejected.
mod bad_param {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use swtimer::{time::DURATION_MAX, ResultCode, SetTimerValueError};

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();
    static FIRE_COUNT: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn test() {
        init_logger();

        A.init(|_| {
            FIRE_COUNT.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        A.set_value(25).unwrap();
        assert_eq!(A.set_value(u32::MAX), Err(SetTimerValueError::BadParam));
        assert_eq!(
            ResultCode::from(A.set_value(DURATION_MAX + 1)),
            ResultCode::BadParam
        );
        assert_eq!(A.period(), Ok(25));

        assert_eq!(A.set_value(DURATION_MAX), Ok(()));
        assert_eq!(A.period(), Ok(DURATION_MAX));

        // The longest period can be scheduled, and stays pending until it
        // has fully elapsed
        let port = Sys::port_state();
        assert_eq!(port.tick_count(), 0);
        A.start().unwrap();
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(Some(DURATION_MAX)));

        port.advance::<Sys>(1);
        assert_eq!(A.is_active(), Ok(true));
        assert_eq!(A.expires_at(), Ok(Some(DURATION_MAX)));
        assert_eq!(port.pending_alarm(), Some(DURATION_MAX));
        assert_eq!(FIRE_COUNT.load(Ordering::Relaxed), 0);

        port.advance::<Sys>(DURATION_MAX - 2);
        assert_eq!(A.is_active(), Ok(true));
        assert_eq!(FIRE_COUNT.load(Ordering::Relaxed), 0);

        port.advance::<Sys>(1);
        assert_eq!(port.tick_count(), DURATION_MAX);
        assert_eq!(A.is_active(), Ok(false));
        assert_eq!(FIRE_COUNT.load(Ordering::Relaxed), 1);
        assert_eq!(Scheduler::<Sys>::armed_alarm(), Ok(None));
    }
}

/// Durations are converted according to the port's frequency.
mod rtc_frequency {
    use super::*;
    use swtimer::PortClock;

    swtimer_port_std::use_port!(unsafe struct Sys, frequency = 32768);

    static A: Timer<Sys> = Timer::new();

    #[test]
    fn test() {
        init_logger();
        let port = Sys::port_state();

        assert_eq!(Sys::ms_to_ticks(1000), 32768);
        assert_eq!(Sys::ms_to_ticks(1), 33);
        assert_eq!(Sys::ticks_to_ms(16384), 500);

        A.init(|_| {}).unwrap();
        A.set_value(1000).unwrap();
        assert_eq!(A.period(), Ok(32768));

        port.set_tick_count(1);
        let past = Scheduler::<Sys>::current_time();
        A.start().unwrap();
        assert_eq!(A.expires_at(), Ok(Some(32769)));

        port.advance::<Sys>(32768);
        assert_eq!(A.is_active(), Ok(false));
        assert_eq!(Scheduler::<Sys>::elapsed_time(past), 1000);
    }
}

mod start_uninitialized {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();

    #[test]
    #[should_panic(expected = "cannot start an uninitialized timer")]
    fn test() {
        init_logger();
        let _ = A.start();
    }
}

mod init_active {
    use super::*;

    swtimer_port_std::use_port!(unsafe struct Sys);

    static A: Timer<Sys> = Timer::new();

    #[test]
    #[should_panic(expected = "cannot re-initialize an active timer")]
    fn test() {
        init_logger();
        A.init(|_| {}).unwrap();
        A.set_value(10).unwrap();
        A.start().unwrap();
        let _ = A.init(|_| {});
    }
}
