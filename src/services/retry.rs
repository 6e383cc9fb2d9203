//! Retry policy for image uploads: attempt cap, capped exponential backoff,
//! and classification of store errors by message.

use std::time::Duration;

/// Substrings (lowercase) of error messages that indicate a transient failure.
const RETRYABLE_PHRASES: [&str; 8] = [
    "failed to fetch",
    "network",
    "timeout",
    "timed out",
    "connection",
    "fetch",
    "broken pipe",
    "reset by peer",
];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RETRYABLE_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

/// Turn a raw store error message into something a person can act on.
pub fn readable_message(message: &str) -> String {
    let lower = message.to_lowercase();

    if lower.contains("failed to fetch") || lower.contains("network") {
        return "Network connection issue. Please check your internet connection and try again."
            .into();
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        return "Upload timed out. Please try again with a smaller image or better connection."
            .into();
    }

    if lower.contains("storage") {
        return "Storage service temporarily unavailable. Please try again in a moment.".into();
    }

    if message.trim().is_empty() {
        "Unknown upload error".into()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(8000));
    }

    #[test]
    fn backoff_is_capped_at_ten_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(10_000));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(10_000));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn transient_messages_are_retryable() {
        assert!(is_retryable_message("request timeout after 30s"));
        assert!(is_retryable_message("Network error"));
        assert!(is_retryable_message("pool timed out while waiting for an open connection"));
        assert!(is_retryable_message("Failed to fetch"));
    }

    #[test]
    fn permission_and_quota_errors_are_terminal() {
        assert!(!is_retryable_message("permission denied"));
        assert!(!is_retryable_message("storage quota exceeded"));
        assert!(!is_retryable_message("object `x.jpg` already exists"));
    }

    #[test]
    fn readable_messages_by_class() {
        assert!(readable_message("NetworkError when attempting").starts_with("Network connection"));
        assert!(readable_message("gateway timeout").starts_with("Upload timed out"));
        assert!(readable_message("storage quota exceeded").starts_with("Storage service"));
        assert_eq!(readable_message("permission denied"), "permission denied");
        assert_eq!(readable_message("  "), "Unknown upload error");
    }
}
