//! USB HID usages as carried in behavior binding parameters.
//!
//! A binding parameter that names a key does not store a bare Usage ID.  It
//! packs the Usage Page next to the Usage ID so that one `u32` can address a
//! keyboard key, a consumer (media) key, or anything else the HID Usage
//! Tables define:
//!
//! ```text
//!  31        24 23        16 15                        0
//! ┌────────────┬────────────┬───────────────────────────┐
//! │ implicit   │ usage page │ usage id                  │
//! │ modifiers  │            │                           │
//! └────────────┴────────────┴───────────────────────────┘
//! ```
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07)
//! and Section 15 (Consumer page 0x0C).
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The **USB Human Interface Device (HID)** standard assigns a unique number to
//! every key on a keyboard.  These numbers are called *Usage IDs* and they are
//! grouped by *Usage Page*.  All keyboard keys are on page 0x07
//! ("Keyboard/Keypad"); media keys such as Play/Pause or Volume Up live on page
//! 0x0C ("Consumer").
//!
//! | Key          | Page | HID Usage ID |
//! |--------------|------|-------------|
//! | Letter A     | 0x07 | 0x04        |
//! | Enter        | 0x07 | 0x28        |
//! | Left Ctrl    | 0x07 | 0xE0        |
//! | Play/Pause   | 0x0C | 0xCD        |
//!
//! The firmware only reports a bounded set of usages.  A usage outside that set
//! would be accepted by the keymap and then silently never sent to the host, so
//! the remote editor must be told "invalid parameters" instead.

use thiserror::Error;
use tracing::{debug, warn};

/// Keyboard/Keypad usage page.
pub const HID_USAGE_KEY: u16 = 0x07;

/// Consumer usage page.
pub const HID_USAGE_CONSUMER: u16 = 0x0C;

/// Highest keyboard usage reported by the standard NKRO report (Keypad `=`).
pub const KEYBOARD_NKRO_MAX_USAGE: u16 = 0x67;

/// Highest keyboard usage reported by the extended NKRO report (LANG8).
pub const KEYBOARD_NKRO_EXTENDED_MAX_USAGE: u16 = 0x97;

/// Highest consumer usage with the basic (8-bit) consumer report.
pub const CONSUMER_BASIC_MAX_USAGE: u16 = 0xFF;

/// Highest consumer usage with the full (12-bit) consumer report.
pub const CONSUMER_FULL_MAX_USAGE: u16 = 0xFFF;

/// Left Control, the first modifier usage.
pub const LEFT_CONTROL: u16 = 0xE0;

/// Right GUI, the last modifier usage.
pub const RIGHT_GUI: u16 = 0xE7;

/// Returns `true` if `usage_id` is one of the eight keyboard modifiers.
///
/// Modifiers are reported through the modifier byte rather than the NKRO
/// bitmap, so they stay valid even above the NKRO maximum.
pub fn is_modifier_usage(usage_id: u16) -> bool {
    (LEFT_CONTROL..=RIGHT_GUI).contains(&usage_id)
}

/// A usage page / usage id pair decoded from a binding parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HidUsage {
    pub page: u16,
    pub id: u16,
}

impl HidUsage {
    /// Decodes a packed binding parameter.  Implicit modifiers are discarded.
    pub fn from_param(param: u32) -> Self {
        Self {
            page: ((param >> 16) & 0xFF) as u16,
            id: (param & 0xFFFF) as u16,
        }
    }
}

/// Reasons a HID usage cannot be reported by this firmware build.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum HidUsageError {
    /// Keyboard usage 0 means "no event" and can never be bound.
    #[error("keyboard usage id 0 is reserved")]
    ReservedKeyUsage,

    /// The keyboard usage is above the NKRO maximum and is not a modifier.
    #[error("keyboard usage 0x{0:02X} is outside the reportable range")]
    KeyUsageOutOfRange(u16),

    /// The consumer usage is above the configured consumer report ceiling.
    #[error("consumer usage 0x{0:03X} is outside the reportable range")]
    ConsumerUsageOutOfRange(u16),

    /// Only the keyboard and consumer pages are reported.
    #[error("unsupported HID usage page 0x{0:02X}")]
    UnsupportedPage(u16),
}

/// Build-dependent ceilings for each supported usage page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLimits {
    /// Highest keyboard usage the NKRO report can carry.
    pub key_max_usage: u16,
    /// Highest consumer usage the consumer report can carry.
    pub consumer_max_usage: u16,
}

impl UsageLimits {
    /// Limits for the basic consumer report and the standard NKRO report.
    pub const BASIC: UsageLimits = UsageLimits {
        key_max_usage: KEYBOARD_NKRO_MAX_USAGE,
        consumer_max_usage: CONSUMER_BASIC_MAX_USAGE,
    };

    /// Limits for the full consumer report and the standard NKRO report.
    pub const FULL_CONSUMER: UsageLimits = UsageLimits {
        key_max_usage: KEYBOARD_NKRO_MAX_USAGE,
        consumer_max_usage: CONSUMER_FULL_MAX_USAGE,
    };

    /// Checks that `usage` can be reported with these limits.
    ///
    /// # Errors
    ///
    /// Returns a [`HidUsageError`] describing why the usage is rejected.
    pub fn validate(&self, usage: HidUsage) -> Result<(), HidUsageError> {
        debug!(page = usage.page, id = usage.id, "validating HID usage");
        match usage.page {
            HID_USAGE_KEY => {
                if usage.id == 0 {
                    return Err(HidUsageError::ReservedKeyUsage);
                }
                if usage.id > self.key_max_usage && !is_modifier_usage(usage.id) {
                    return Err(HidUsageError::KeyUsageOutOfRange(usage.id));
                }
                Ok(())
            }
            HID_USAGE_CONSUMER => {
                if usage.id > self.consumer_max_usage {
                    return Err(HidUsageError::ConsumerUsageOutOfRange(usage.id));
                }
                Ok(())
            }
            other => {
                warn!(page = other, "unsupported HID usage page");
                Err(HidUsageError::UnsupportedPage(other))
            }
        }
    }
}

impl Default for UsageLimits {
    /// Limits selected by the crate features this build was compiled with.
    fn default() -> Self {
        let key_max_usage = if cfg!(feature = "nkro-extended-report") {
            KEYBOARD_NKRO_EXTENDED_MAX_USAGE
        } else {
            KEYBOARD_NKRO_MAX_USAGE
        };
        let consumer_max_usage = if cfg!(feature = "consumer-usages-basic") {
            CONSUMER_BASIC_MAX_USAGE
        } else {
            CONSUMER_FULL_MAX_USAGE
        };
        Self {
            key_max_usage,
            consumer_max_usage,
        }
    }
}
