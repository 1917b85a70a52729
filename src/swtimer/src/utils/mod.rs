//! Utility
//!
//! **This module is exempt from the API stability guarantee.** It's exposed
//! only because it's needed by macros.
mod init;
pub use self::init::*;
