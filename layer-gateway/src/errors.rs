//! Error types for layer-gateway.
//!
//! [`BackendError`] is what the underlying MTProto library reports;
//! [`GatewayError`] is the taxonomy every command resolves to.

use thiserror::Error;

// ─── BackendError ─────────────────────────────────────────────────────────────

/// A failure reported by the protocol backend.
///
/// Server-side errors keep their structure so callers can match on the error
/// name instead of probing message text.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Telegram rejected the request.
    ///
    /// `FLOOD_WAIT_30` is stored as `name: "FLOOD_WAIT", value: Some(30)`.
    #[error("{}", rpc_text(.name, .value))]
    Rpc {
        /// HTTP-like status code.
        code:  i32,
        /// Error name in SCREAMING_SNAKE_CASE with the numeric suffix removed.
        name:  String,
        /// Numeric suffix extracted from the name, if any.
        value: Option<u32>,
    },
    /// Network / I/O failure on the transport.
    #[error("I/O error: {0}")]
    Io(String),
    /// The transport link is gone; the connection must be rebuilt.
    #[error("connection closed")]
    Disconnected,
    /// The backend has no access hash for this peer id.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
    /// Anything the library reported only as free-form text.
    #[error("{0}")]
    Other(String),
}

fn rpc_text(name: &str, value: &Option<u32>) -> String {
    match value {
        Some(v) => format!("{name}_{v}"),
        None    => name.to_string(),
    }
}

impl BackendError {
    /// Parse a raw Telegram error message like `"FLOOD_WAIT_30"`.
    pub fn from_telegram(code: i32, message: &str) -> Self {
        if let Some(idx) = message.rfind('_') {
            let suffix = &message[idx + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    return Self::Rpc { code, name: message[..idx].to_string(), value: Some(v) };
                }
            }
        }
        Self::Rpc { code, name: message.to_string(), value: None }
    }

    /// Match the RPC error name, with optional wildcard prefix/suffix `'*'`.
    ///
    /// - `err.is("FLOOD_WAIT")`: exact match
    /// - `err.is("PHONE_CODE_*")`: starts-with match
    /// - `err.is("*_INVALID")`: ends-with match
    ///
    /// Non-RPC errors never match.
    pub fn is(&self, pattern: &str) -> bool {
        let Self::Rpc { name, .. } = self else { return false };
        if let Some(prefix) = pattern.strip_suffix('*') {
            name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            name.ends_with(suffix)
        } else {
            name == pattern
        }
    }

    /// `true` for failures that happened below the RPC layer.
    ///
    /// These are the only ones worth a reconnect.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Disconnected)
    }

    /// `true` if sign-in stopped because the account has a cloud password.
    pub fn is_password_required(&self) -> bool {
        match self {
            Self::Rpc { .. } => self.is(PASSWORD_NEEDED),
            Self::Other(message) => mentions_password_needed(message),
            _ => false,
        }
    }
}

const PASSWORD_NEEDED: &str = "SESSION_PASSWORD_NEEDED";

/// Last-resort detection for backends that only surface the error as text.
///
/// Structured [`BackendError::Rpc`] values never go through here.
fn mentions_password_needed(message: &str) -> bool {
    message.contains(PASSWORD_NEEDED)
}

// ─── GatewayError ─────────────────────────────────────────────────────────────

/// Every way a command can fail.
///
/// The `Display` text is exactly what goes into the `error` field of the
/// response envelope, so callers can branch on it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// A required payload field was missing or malformed. Raised before any
    /// network call.
    #[error("{field} is required")]
    InvalidRequest { field: &'static str },
    /// The request named an action this gateway does not know.
    #[error("Invalid action")]
    UnknownAction(String),
    /// The body was not a JSON command object.
    #[error("Invalid JSON body")]
    MalformedBody(String),
    /// The transport could not be established.
    #[error("{reason}")]
    ConnectionFailed { attempts: u32, reason: String },
    /// `auth.sendCode` failed.
    #[error("{reason}")]
    CodeSendFailed { reason: String },
    /// `auth.signIn` failed for a reason other than 2FA.
    #[error("{reason}")]
    SignInFailed { reason: String },
    /// The account is protected by a cloud password; finishing the login is
    /// out of scope for this gateway.
    #[error("PASSWORD_REQUIRED")]
    PasswordRequired,
    /// No dialog matches the requested id.
    #[error("Entity not found")]
    EntityNotFound { id: String },
    /// Any other backend failure, carrying the library's message.
    #[error("{reason}")]
    NetworkOperationFailed { operation: &'static str, reason: String },
}

impl GatewayError {
    /// HTTP status the failure envelope is returned with.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } | Self::UnknownAction(_) | Self::MalformedBody(_) => 400,
            Self::EntityNotFound { .. } => 404,
            Self::ConnectionFailed { .. } => 500,
            _ => 200,
        }
    }

    /// Extra context for the `details` envelope field.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::ConnectionFailed { attempts, .. } => {
                Some(format!("could not connect after {attempts} attempt(s)"))
            }
            Self::MalformedBody(why) => Some(why.clone()),
            _ => None,
        }
    }

    /// Wrap a backend failure for a non-auth operation.
    ///
    /// Unresolvable peers become [`GatewayError::EntityNotFound`].
    pub(crate) fn network(operation: &'static str, err: BackendError) -> Self {
        match err {
            BackendError::UnknownPeer(id) => Self::EntityNotFound { id },
            other => Self::NetworkOperationFailed { operation, reason: other.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flood_wait_value_is_split_off() {
        let e = BackendError::from_telegram(420, "FLOOD_WAIT_30");
        assert_eq!(e, BackendError::Rpc { code: 420, name: "FLOOD_WAIT".into(), value: Some(30) });
        assert_eq!(e.to_string(), "FLOOD_WAIT_30");
    }

    #[test]
    fn wildcard_matching() {
        let e = BackendError::from_telegram(400, "PHONE_CODE_EXPIRED");
        assert!(e.is("PHONE_CODE_*"));
        assert!(e.is("*_EXPIRED"));
        assert!(!e.is("PHONE_CODE"));
        assert!(!BackendError::Io("reset".into()).is("*"));
    }

    #[test]
    fn password_detection_prefers_structure() {
        assert!(BackendError::from_telegram(401, "SESSION_PASSWORD_NEEDED").is_password_required());
        // an RPC whose name merely contains the marker is a different error
        assert!(!BackendError::from_telegram(400, "NOT_SESSION_PASSWORD_NEEDED_X").is_password_required());
        assert!(BackendError::Other("RPC 401: SESSION_PASSWORD_NEEDED (auth.signIn)".into()).is_password_required());
        assert!(!BackendError::Other("PHONE_CODE_INVALID".into()).is_password_required());
    }

    #[test]
    fn statuses() {
        assert_eq!(GatewayError::InvalidRequest { field: "phone" }.status(), 400);
        assert_eq!(GatewayError::EntityNotFound { id: "1".into() }.status(), 404);
        assert_eq!(GatewayError::PasswordRequired.status(), 200);
        assert_eq!(GatewayError::ConnectionFailed { attempts: 5, reason: "x".into() }.status(), 500);
        assert_eq!(GatewayError::PasswordRequired.to_string(), "PASSWORD_REQUIRED");
        assert_eq!(GatewayError::InvalidRequest { field: "phone" }.to_string(), "phone is required");
    }

    #[test]
    fn unknown_peer_maps_to_not_found() {
        let e = GatewayError::network("send-message", BackendError::UnknownPeer("-1001".into()));
        assert_eq!(e, GatewayError::EntityNotFound { id: "-1001".into() });
    }
}
