//! Compact wall-clock time utilities.
//!
//! Expiry instants are stored as UNIX milliseconds in a plain `u64` so
//! they survive a restart through the snapshot file. `0` is the sentinel
//! for "no expiry".

use std::time::{SystemTime, UNIX_EPOCH};

/// Sentinel value meaning "no expiry".
pub const NO_EXPIRY: u64 = 0;

/// Returns the current wall-clock time in UNIX milliseconds.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Returns `true` if the given expiry instant has passed.
#[inline]
pub fn is_expired(expires_at_ms: u64) -> bool {
    expires_at_ms != NO_EXPIRY && now_ms() >= expires_at_ms
}

/// Converts a relative offset in seconds (possibly negative) into an
/// absolute expiry instant. The result is clamped so it can never
/// collide with the [`NO_EXPIRY`] sentinel.
#[inline]
pub fn expiry_after_secs(secs: i64) -> u64 {
    now_ms()
        .saturating_add_signed(secs.saturating_mul(1000))
        .max(1)
}

/// Remaining whole seconds until the expiry instant, or `None` when no
/// expiry is set. Zero or negative remainders return `Some(0)`.
#[inline]
pub fn remaining_secs(expires_at_ms: u64) -> Option<u64> {
    if expires_at_ms == NO_EXPIRY {
        None
    } else {
        Some(expires_at_ms.saturating_sub(now_ms()) / 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_never_expires() {
        assert!(!is_expired(NO_EXPIRY));
    }

    #[test]
    fn past_instant_is_expired() {
        assert!(is_expired(1));
    }

    #[test]
    fn future_instant_is_not_expired() {
        assert!(!is_expired(now_ms() + 60_000));
    }

    #[test]
    fn expiry_after_negative_secs_is_in_the_past() {
        let at = expiry_after_secs(-5);
        assert_ne!(at, NO_EXPIRY);
        assert!(is_expired(at));
    }

    #[test]
    fn remaining_secs_rounds_down() {
        assert_eq!(remaining_secs(NO_EXPIRY), None);
        let at = now_ms() + 2500;
        let left = remaining_secs(at).unwrap();
        assert!(left <= 2, "got {left}");
    }
}
