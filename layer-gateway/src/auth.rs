//! Phone login: `auth.sendCode` followed by `auth.signIn`.
//!
//! ```text
//! Anonymous ──request_code──▶ CodeSent ──complete_sign_in──▶ Authenticated
//!                               ▲   │
//!                               └───┤ wrong/expired code
//!                                   ▼
//!                            PasswordRequired (2FA, finished elsewhere)
//! ```
//!
//! Nothing about an attempt is kept here between the two calls: the caller
//! round-trips the phone and `phone_code_hash`. The second call must land on
//! the authorization that asked for the code, which the registry guarantees
//! whether or not the caller echoes the session token.

use serde::Serialize;

use crate::backend::Identity;
use crate::errors::GatewayError;
use crate::pool::Connection;
use crate::session::SessionToken;

/// Login progress of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Anonymous,
    CodeSent,
    Authenticated,
    /// The account has a cloud password; this gateway cannot finish.
    PasswordRequired,
}

/// An in-flight login attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingVerification {
    /// E.164 form: `+` followed by digits only.
    pub phone:           String,
    pub phone_code_hash: String,
}

/// Result of a successful `request_code`.
#[derive(Clone, Debug)]
pub struct CodeRequest {
    pub verification: PendingVerification,
    /// Token to echo on the matching sign-in.
    pub session:      SessionToken,
}

/// Result of a successful `complete_sign_in`.
#[derive(Clone, Debug)]
pub struct SignedIn {
    /// Persistable token that resumes this identity.
    pub session:  SessionToken,
    pub identity: Identity,
}

/// Normalize a phone number to `+` and digits, dropping spaces, dashes,
/// parentheses and any other punctuation.
pub fn normalize_phone(raw: &str) -> Result<String, GatewayError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(GatewayError::InvalidRequest { field: "phone" });
    }
    Ok(format!("+{digits}"))
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, GatewayError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GatewayError::InvalidRequest { field });
    }
    Ok(value)
}

/// The login state machine for one connection.
pub struct AuthenticationFlow<'c> {
    conn: &'c Connection,
}

impl<'c> AuthenticationFlow<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Ask Telegram to send a login code to `phone`.
    pub async fn request_code(&self, phone: &str) -> Result<CodeRequest, GatewayError> {
        let phone = normalize_phone(phone)?;

        let sent = {
            let backend = self.conn.lock().await;
            backend.send_code(&phone).await.map_err(|e| self.conn.observe(e))
        };
        let phone_code_hash = sent.map_err(|e| GatewayError::CodeSendFailed { reason: e.to_string() })?;
        self.conn.set_auth_state(AuthState::CodeSent).await;
        tracing::info!("[gateway] login code sent (connection #{})", self.conn.id());

        let session = self.export_or_current().await;
        Ok(CodeRequest {
            verification: PendingVerification { phone, phone_code_hash },
            session,
        })
    }

    /// Finish the login with the code the user received.
    pub async fn complete_sign_in(
        &self,
        phone:           &str,
        code:            &str,
        phone_code_hash: &str,
    ) -> Result<SignedIn, GatewayError> {
        let phone           = normalize_phone(required(phone, "phone")?)?;
        let code            = required(code, "code")?;
        let phone_code_hash = required(phone_code_hash, "phone_code_hash")?;

        let result = {
            let backend = self.conn.lock().await;
            backend.sign_in(&phone, code, phone_code_hash).await.map_err(|e| self.conn.observe(e))
        };

        let identity = match result {
            Ok(identity) => identity,
            Err(e) if e.is_password_required() => {
                self.conn.set_auth_state(AuthState::PasswordRequired).await;
                tracing::info!("[gateway] sign-in needs a 2FA password (connection #{})", self.conn.id());
                return Err(GatewayError::PasswordRequired);
            }
            Err(e) => {
                self.conn.set_auth_state(AuthState::CodeSent).await;
                return Err(GatewayError::SignInFailed { reason: e.to_string() });
            }
        };

        self.conn.set_auth_state(AuthState::Authenticated).await;
        tracing::info!("[gateway] signed in as {} (connection #{})", identity.name, self.conn.id());

        let exported = {
            let backend = self.conn.lock().await;
            backend.export_session().await.map_err(|e| self.conn.observe(e))
        };
        let session = exported.map_err(|e| GatewayError::SignInFailed {
            reason: format!("signed in, but the session could not be exported: {e}"),
        })?;
        Ok(SignedIn { session, identity })
    }

    async fn export_or_current(&self) -> SessionToken {
        let exported = {
            let backend = self.conn.lock().await;
            backend.export_session().await.map_err(|e| self.conn.observe(e))
        };
        match exported {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("[gateway] session export failed ({e}); keeping the current token");
                self.conn.session().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_punctuation_is_stripped() {
        assert_eq!(normalize_phone("1 (234) 567-8900").unwrap(), "+12345678900");
        assert_eq!(normalize_phone("+44 20 7946 0958").unwrap(), "+442079460958");
        assert_eq!(normalize_phone("++7.912.345.67.89").unwrap(), "+79123456789");
        assert_eq!(normalize_phone("12345678900").unwrap(), "+12345678900");
    }

    #[test]
    fn phone_without_digits_is_rejected() {
        assert_eq!(normalize_phone("   "), Err(GatewayError::InvalidRequest { field: "phone" }));
        assert_eq!(normalize_phone("+() -"), Err(GatewayError::InvalidRequest { field: "phone" }));
    }

    #[test]
    fn normalized_form_is_plus_then_digits() {
        for raw in ["1 (234) 567-8900", "+1-234-567-8900", " 001 234 ", "(0)12"] {
            let p = normalize_phone(raw).unwrap();
            assert!(p.starts_with('+'));
            assert!(p[1..].chars().all(|c| c.is_ascii_digit()), "{p}");
            assert_eq!(p.matches('+').count(), 1);
        }
    }
}
