//! LoanDesk Persistence Configuration
//!
//! This module provides the storage key catalog and persistence tunables shared by
//! the LoanDesk client state layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Debounce window applied between the final save request for a key and its commit,
/// in milliseconds. Rapid successive saves within this window coalesce into one write.
pub const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 1000;

/// Maximum recursion depth of the quota sanitization pass. Values nested inside more
/// than this many containers are passed through untouched.
pub const SANITIZE_MAX_DEPTH: usize = 5;

/// Size threshold in bytes above which an embedded image payload is eligible for
/// replacement under quota pressure. Payloads at exactly this size are kept.
pub const IMAGE_PAYLOAD_THRESHOLD: usize = 500;

/// Prefix identifying an embedded image payload (a data-URI string).
pub const IMAGE_DATA_URI_MARKER: &str = "data:image";

/// Placeholder written in place of an oversized embedded image payload.
pub const IMAGE_PLACEHOLDER: &str = "[image removed]";

/// Default capacity budget for bounded storage backends, in bytes. Sized to the
/// browser local-storage class of backend the state layer was designed against.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Namespace prefix shared by every declared storage key.
pub const KEY_PREFIX: &str = "loandesk.";

/// Statically-declared storage keys, one per logical entity.
///
/// Every record type the application persists lives under exactly one of these keys;
/// no two entity types may share a key.
pub mod keys {
    /// Client and deal CRM records.
    pub const CLIENTS: &str = "loandesk.clients";
    /// Cached rate sheets.
    pub const RATES: &str = "loandesk.rates";
    /// Free-form notes.
    pub const NOTES: &str = "loandesk.notes";
    /// Calendar events, including AI-generated ones.
    pub const CALENDAR_EVENTS: &str = "loandesk.calendar_events";
    /// Compensation plan settings.
    pub const COMPENSATION_SETTINGS: &str = "loandesk.compensation_settings";
    /// Manually entered deals outside the CRM pipeline.
    pub const MANUAL_DEALS: &str = "loandesk.manual_deals";
    /// Market data snapshots.
    pub const MARKET_DATA: &str = "loandesk.market_data";
    /// Property valuations.
    pub const VALUATIONS: &str = "loandesk.valuations";
    /// User profile and preferences.
    pub const USER_PROFILE: &str = "loandesk.user_profile";
    /// Daily planner state.
    pub const DAILY_PLAN: &str = "loandesk.daily_plan";

    /// Every declared storage key.
    pub const ALL: &[&str] = &[
        CLIENTS,
        RATES,
        NOTES,
        CALENDAR_EVENTS,
        COMPENSATION_SETTINGS,
        MANUAL_DEALS,
        MARKET_DATA,
        VALUATIONS,
        USER_PROFILE,
        DAILY_PLAN,
    ];
}

/// Checks whether a string is usable as a storage key.
///
/// A valid key is non-empty and contains no interior NUL bytes. Keys outside the
/// declared catalog are permitted; collisions with declared keys are the caller's
/// responsibility.
pub fn valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('\0')
}

/// State store tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Delay between the final save request for a key and its commit. Saves landing
    /// inside the window replace the scheduled value and restart the timer.
    pub debounce_window: Duration,
    /// Maximum recursion depth of the quota sanitization pass.
    pub sanitize_max_depth: usize,
    /// Minimum embedded-image payload size eligible for replacement, in bytes.
    pub image_payload_threshold: usize,
    /// Placeholder written in place of an oversized image payload.
    pub image_placeholder: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(DEFAULT_DEBOUNCE_WINDOW_MS),
            sanitize_max_depth: SANITIZE_MAX_DEPTH,
            image_payload_threshold: IMAGE_PAYLOAD_THRESHOLD,
            image_placeholder: IMAGE_PLACEHOLDER.to_string(),
        }
    }
}
