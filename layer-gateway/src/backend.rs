//! The seam between the gateway and the MTProto client library.
//!
//! A [`Connector`] builds one live link from a session token; the resulting
//! [`Backend`] performs the protocol calls. The gateway never touches the
//! wire itself.

use async_trait::async_trait;
use serde::Serialize;

use crate::entity::{RawDialog, RawEntity};
use crate::errors::BackendError;
use crate::message::RawMessage;
use crate::session::{ApiCredentials, SessionToken};

/// The account a successful sign-in authenticated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Identity {
    pub id:       String,
    pub name:     String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Builds a transport link. One call is one attempt; retrying is the
/// caller's business.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        credentials: &ApiCredentials,
        session:     &SessionToken,
    ) -> Result<Box<dyn Backend>, BackendError>;
}

/// Protocol operations on one established link.
///
/// Implementations need not be safe for concurrent use; the gateway
/// serializes every call on a given backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `auth.sendCode`; returns the server's `phone_code_hash`.
    async fn send_code(&self, phone: &str) -> Result<String, BackendError>;

    /// `auth.signIn` with a hash from [`Backend::send_code`].
    async fn sign_in(
        &self,
        phone:           &str,
        code:            &str,
        phone_code_hash: &str,
    ) -> Result<Identity, BackendError>;

    /// Serialize the current session so the caller can resume it later.
    async fn export_session(&self) -> Result<SessionToken, BackendError>;

    /// Every dialog of the account, most recent first.
    async fn dialogs(&self) -> Result<Vec<RawDialog>, BackendError>;

    /// `channels.createChannel` as a broadcast channel.
    async fn create_channel(&self, title: &str, about: &str) -> Result<RawEntity, BackendError>;

    async fn delete_channel(&self, peer_id: &str) -> Result<(), BackendError>;

    /// The newest `limit` messages of a peer's history.
    async fn messages(&self, peer_id: &str, limit: i32) -> Result<Vec<RawMessage>, BackendError>;

    async fn send_message(&self, peer_id: &str, text: &str) -> Result<(), BackendError>;
}
