//! Device authentication
//!
//! Embedded clients authenticate with a static bearer token carried in the
//! upgrade request headers. Known device ids may be allowlisted past the
//! token check. A failure here closes the connection before any session
//! resources exist.

use axum::http::HeaderMap;
use std::collections::HashSet;
use thiserror::Error;

use crate::config::AuthConfig;

/// Authentication failure
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
}

/// Validates the upgrade request of every new session
pub struct AuthGate {
    enabled: bool,
    tokens: HashSet<String>,
    allowed_devices: HashSet<String>,
}

impl AuthGate {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled,
            tokens: config.tokens.iter().cloned().collect(),
            allowed_devices: config.allowed_devices.iter().cloned().collect(),
        }
    }

    /// Check the headers of a new connection
    pub fn authenticate(&self, headers: &HeaderMap, device_id: &str) -> Result<(), AuthError> {
        if !self.enabled {
            return Ok(());
        }
        if self.allowed_devices.contains(device_id) {
            return Ok(());
        }
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingToken)?;
        if self.tokens.contains(token) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(enabled: bool) -> AuthGate {
        AuthGate::new(&AuthConfig {
            enabled,
            tokens: vec!["secret-token".to_string()],
            allowed_devices: vec!["aa:bb:cc:dd:ee:ff".to_string()],
        })
    }

    #[test]
    fn test_disabled_accepts_everything() {
        let headers = HeaderMap::new();
        assert!(gate(false).authenticate(&headers, "any-device").is_ok());
    }

    #[test]
    fn test_valid_token_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret-token".parse().unwrap());
        assert!(gate(true).authenticate(&headers, "dev-1").is_ok());
    }

    #[test]
    fn test_missing_token_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(
            gate(true).authenticate(&headers, "dev-1"),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_wrong_token_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(matches!(
            gate(true).authenticate(&headers, "dev-1"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_allowlisted_device_skips_token() {
        let headers = HeaderMap::new();
        assert!(gate(true).authenticate(&headers, "aa:bb:cc:dd:ee:ff").is_ok());
    }
}
