//! Result codes and the error types of the timer operations.
//!
//! Only conditions the caller can act upon are reported. Deadlines that are
//! too close to be scheduled are clamped, restarting an active timer is a
//! normal restart, and spurious alarm notifications are ignored; none of them
//! shows up here. Violated preconditions (e.g., starting a timer that was never
//! initialized) cause a panic instead.
use core::{fmt, mem::transmute};

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use swtimer::ResultCode;
            /// assert_eq!(ResultCode::BadContext.as_str(), "BadContext");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            fn fmt(self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that the timer operations can
    /// produce.
    ///
    /// The values are chosen so that a `ResultCode` fits in a single
    /// register-sized return value of a C-compatible wrapper.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful. No additional information is available.
        Success = 0,
        /// A parameter is out of the supported range.
        BadParam = -17,
        /// The current context disallows the operation. Every operation that
        /// touches the pending list reports this when CPU Lock is already
        /// active.
        BadContext = -25,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (*self).fmt(f)
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode` for cost-free
                // conversion
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                // Safety: `ResultCode` and `$name` has the same representation
                //         type, and the representation of `ResultCode` is a
                //         superset of `x`.
                unsafe { transmute(x) }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
            }
        }
    };
}

define_error! {
    mod init_timer_error {}
    /// Error type for [`Timer::init`].
    ///
    /// [`Timer::init`]: crate::Timer::init
    pub enum InitTimerError {
        /// CPU Lock is active.
        BadContext,
    }
}

define_error! {
    mod set_timer_context_error {}
    /// Error type for [`Timer::set_context`].
    ///
    /// [`Timer::set_context`]: crate::Timer::set_context
    pub enum SetTimerContextError {
        /// CPU Lock is active.
        BadContext,
    }
}

define_error! {
    mod set_timer_value_error {}
    /// Error type for [`Timer::set_value`].
    ///
    /// [`Timer::set_value`]: crate::Timer::set_value
    pub enum SetTimerValueError {
        /// CPU Lock is active.
        BadContext,
        /// The duration, converted to ticks, exceeds [`DURATION_MAX`].
        ///
        /// [`DURATION_MAX`]: crate::time::DURATION_MAX
        BadParam,
    }
}

define_error! {
    mod start_timer_error {}
    /// Error type for [`Timer::start`].
    ///
    /// [`Timer::start`]: crate::Timer::start
    pub enum StartTimerError {
        /// CPU Lock is active.
        BadContext,
    }
}

define_error! {
    mod stop_timer_error {}
    /// Error type for [`Timer::stop`].
    ///
    /// [`Timer::stop`]: crate::Timer::stop
    pub enum StopTimerError {
        /// CPU Lock is active.
        BadContext,
    }
}

define_error! {
    mod reset_timer_error {}
    /// Error type for [`Timer::reset`].
    ///
    /// [`Timer::reset`]: crate::Timer::reset
    pub enum ResetTimerError {
        /// CPU Lock is active.
        BadContext,
    }
}

define_error! {
    mod query_timer_error {}
    /// Error type for the read-only queries on [`Timer`] and [`Scheduler`].
    ///
    /// [`Timer`]: crate::Timer
    /// [`Scheduler`]: crate::Scheduler
    pub enum QueryTimerError {
        /// CPU Lock is active.
        BadContext,
    }
}

/// The internal error type produced by [`lock_cpu`] and convertible into
/// every public error type that has a `BadContext` variant.
///
/// [`lock_cpu`]: crate::klock::lock_cpu
#[derive(PartialEq, Eq, Copy, Clone)]
pub(crate) enum BadContextError {
    BadContext,
}

impl fmt::Debug for BadContextError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        ResultCode::BadContext.fmt(f)
    }
}

macro_rules! impl_from_bad_context {
    ( $( $Supererror:ty ),* $(,)* ) => {
        $(
            impl From<BadContextError> for $Supererror {
                #[inline]
                fn from(x: BadContextError) -> Self {
                    match x {
                        BadContextError::BadContext => Self::BadContext,
                    }
                }
            }
        )*
    };
}

impl_from_bad_context!(
    ResultCode,
    InitTimerError,
    SetTimerContextError,
    SetTimerValueError,
    StartTimerError,
    StopTimerError,
    ResetTimerError,
    QueryTimerError,
);

/// `BadParam`
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) enum BadParamError {
    BadParam,
}

impl From<BadParamError> for SetTimerValueError {
    #[inline]
    fn from(x: BadParamError) -> Self {
        match x {
            BadParamError::BadParam => Self::BadParam,
        }
    }
}
