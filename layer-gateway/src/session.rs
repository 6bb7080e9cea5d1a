//! Caller-held session tokens and process-wide API credentials.

use std::fmt;

use serde::Serialize;

/// Opaque serialized session, stored by the caller and echoed on every
/// request.
///
/// The empty token is the anonymous session. `Debug` never prints the
/// contents.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    /// The unauthenticated, empty session.
    pub fn anonymous() -> Self {
        Self(String::new())
    }

    /// Token from an optional request field; blank counts as anonymous.
    pub fn from_optional(raw: Option<&str>) -> Self {
        raw.map(Self::new).unwrap_or_default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "SessionToken(anonymous)")
        } else {
            write!(f, "SessionToken({} bytes)", self.0.len())
        }
    }
}

/// Application credentials from https://my.telegram.org.
///
/// Process-wide configuration, never session data.
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_id:   i32,
    pub api_hash: String,
}

impl ApiCredentials {
    pub fn new(api_id: i32, api_hash: impl Into<String>) -> Self {
        Self { api_id, api_hash: api_hash.into() }
    }

    /// Both the id and the hash must be set before a connection can succeed.
    pub fn is_complete(&self) -> bool {
        self.api_id != 0 && !self.api_hash.trim().is_empty()
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredentials {{ api_id: {}, api_hash: <redacted> }}", self.api_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_is_anonymous() {
        assert!(SessionToken::from_optional(None).is_anonymous());
        assert!(SessionToken::from_optional(Some("   ")).is_anonymous());
        assert!(!SessionToken::from_optional(Some("1AbC")).is_anonymous());
    }

    #[test]
    fn debug_redacts() {
        let t = SessionToken::new("1secretsecret");
        assert_eq!(format!("{t:?}"), "SessionToken(13 bytes)");
        let c = ApiCredentials::new(42, "deadbeef");
        assert!(!format!("{c:?}").contains("deadbeef"));
    }

    #[test]
    fn credentials_completeness() {
        assert!(ApiCredentials::new(1, "h").is_complete());
        assert!(!ApiCredentials::new(0, "h").is_complete());
        assert!(!ApiCredentials::new(1, " ").is_complete());
    }
}
