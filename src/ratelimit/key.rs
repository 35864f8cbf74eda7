//! Client key derivation and handling.

use std::net::SocketAddr;

use crate::error::{Result, TurnstileError};

/// A key that identifies the caller a request is accounted against.
///
/// Keys are opaque, compared by value, and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from any non-empty string. Surrounding whitespace is trimmed.
    pub fn new(key: impl AsRef<str>) -> Result<Self> {
        let key = key.as_ref().trim();
        if key.is_empty() {
            return Err(TurnstileError::InvalidKey(
                "client key must not be empty".to_string(),
            ));
        }
        Ok(Self(key.to_string()))
    }

    /// Derive a key the way a proxied request identifies its caller.
    ///
    /// The first entry of a forwarded-for style header wins; the peer
    /// address is used when the header is absent or blank.
    pub fn from_forwarded(forwarded_for: Option<&str>, peer: Option<SocketAddr>) -> Result<Self> {
        let forwarded = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());

        match (forwarded, peer) {
            (Some(first), _) => Self::new(first),
            (None, Some(addr)) => Ok(Self(addr.ip().to_string())),
            (None, None) => Err(TurnstileError::InvalidKey(
                "no forwarded address or peer address available".to_string(),
            )),
        }
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn peer() -> Option<SocketAddr> {
        Some("192.168.1.20:51234".parse().unwrap())
    }

    #[test]
    fn test_client_key_creation() {
        let key = assert_ok!(ClientKey::new("10.0.0.1"));
        assert_eq!(key.as_str(), "10.0.0.1");
        assert_eq!(key.to_string(), "10.0.0.1");
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(ClientKey::new(""), Err(TurnstileError::InvalidKey(_))));
        assert!(matches!(ClientKey::new("   "), Err(TurnstileError::InvalidKey(_))));
    }

    #[test]
    fn test_client_key_equality() {
        assert_eq!(ClientKey::new("A").unwrap(), ClientKey::new(" A ").unwrap());
        assert_ne!(ClientKey::new("A").unwrap(), ClientKey::new("B").unwrap());
    }

    #[test]
    fn test_forwarded_first_entry_wins() {
        let key = ClientKey::from_forwarded(Some("203.0.113.7, 10.0.0.2, 10.0.0.3"), peer()).unwrap();
        assert_eq!(key.as_str(), "203.0.113.7");
    }

    #[test]
    fn test_falls_back_to_peer() {
        let key = ClientKey::from_forwarded(None, peer()).unwrap();
        assert_eq!(key.as_str(), "192.168.1.20");

        let key = ClientKey::from_forwarded(Some("  "), peer()).unwrap();
        assert_eq!(key.as_str(), "192.168.1.20");

        let key = ClientKey::from_forwarded(Some(", 10.0.0.2"), peer()).unwrap();
        assert_eq!(key.as_str(), "192.168.1.20");
    }

    #[test]
    fn test_no_source_is_invalid() {
        let result = ClientKey::from_forwarded(None, None);
        assert!(matches!(result, Err(TurnstileError::InvalidKey(_))));
    }
}
