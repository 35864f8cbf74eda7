//! Window policy: the limit and the window it applies to.

use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// A validated rate limit: at most `max_requests` per rolling `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    max_requests: u32,
    window: Duration,
}

impl WindowPolicy {
    /// Create a new policy.
    ///
    /// A zero limit or a zero window fails with a configuration error.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(TurnstileError::Configuration(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TurnstileError::Configuration(
                "window must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    /// Maximum admitted requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for WindowPolicy {
    /// Five requests per minute.
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_policy() {
        let policy = WindowPolicy::new(10, Duration::from_secs(1)).unwrap();
        assert_eq!(policy.max_requests(), 10);
        assert_eq!(policy.window(), Duration::from_secs(1));
    }

    #[test]
    fn test_degenerate_policies_rejected() {
        assert!(matches!(
            WindowPolicy::new(0, Duration::from_secs(60)),
            Err(TurnstileError::Configuration(_))
        ));
        assert!(matches!(
            WindowPolicy::new(5, Duration::ZERO),
            Err(TurnstileError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_policy() {
        let policy = WindowPolicy::default();
        assert_eq!(policy.max_requests(), 5);
        assert_eq!(policy.window(), Duration::from_secs(60));
    }
}
