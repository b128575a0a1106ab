//! HID usage tables used to validate key-carrying binding parameters.
//!
//! The canonical representation is a packed USB HID usage (page + id) as
//! documented in [`hid`].

pub mod hid;

pub use hid::{HidUsage, HidUsageError, UsageLimits};
