//! Maps named actions onto protocol calls.
//!
//! Every call validates its payload first, then borrows the connection for
//! the caller's session token, runs exactly one action and normalizes the
//! result. A failed action leaves the connection usable for the next one,
//! except after a transport failure, where the connection is evicted and the
//! next call reconnects.

use std::sync::Arc;

use crate::auth::AuthenticationFlow;
use crate::command::{Action, ChannelSummary, Command, CommandRequest, Outcome, Reply};
use crate::entity::{display_title, DialogEntry, EntityDetails, RawDialog};
use crate::errors::{BackendError, GatewayError};
use crate::message::normalize_history;
use crate::pool::{Connection, ConnectionManager};
use crate::session::SessionToken;

/// The single entry point of the command surface.
pub struct CommandDispatcher {
    manager: Arc<ConnectionManager>,
}

impl CommandDispatcher {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Parse a raw request body and handle it.
    ///
    /// Anything that is not a JSON command object gets a 400 envelope.
    pub async fn handle_json(&self, body: &[u8]) -> Reply {
        match serde_json::from_slice::<CommandRequest>(body) {
            Ok(req) => self.handle(&req).await,
            Err(e) => {
                tracing::debug!("[gateway] rejected body: {e}");
                Reply::from(Err(GatewayError::MalformedBody(e.to_string())))
            }
        }
    }

    /// Handle one decoded request, turning every failure into an envelope.
    pub async fn handle(&self, req: &CommandRequest) -> Reply {
        let result = self.dispatch(&req.action, req, &req.session_token()).await;
        match &result {
            Ok(_) => tracing::debug!("[gateway] action={} ok", req.action),
            Err(e) => tracing::warn!("[gateway] action={} failed: {e}", req.action),
        }
        Reply::from(result)
    }

    /// Run `action` with `req` as payload on the connection for `session`.
    pub async fn dispatch(
        &self,
        action:  &str,
        req:     &CommandRequest,
        session: &SessionToken,
    ) -> Result<Outcome, GatewayError> {
        let action = Action::parse(action)
            .ok_or_else(|| GatewayError::UnknownAction(action.to_string()))?;
        let command = Command::from_request(action, req)?;

        let conn = self.manager.acquire(session).await?;
        tracing::debug!("[gateway] {} on connection #{}", action.name(), conn.id());

        let result = self.execute(&conn, command).await;
        if conn.is_broken() {
            self.manager.evict(&conn).await;
        }
        result
    }

    async fn execute(&self, conn: &Connection, command: Command) -> Result<Outcome, GatewayError> {
        match command {
            Command::SendCode { phone } => {
                let sent = AuthenticationFlow::new(conn).request_code(&phone).await?;
                self.manager.alias(conn, sent.session.clone()).await;
                Ok(Outcome::CodeSent {
                    phone_code_hash: sent.verification.phone_code_hash,
                    session:         sent.session,
                })
            }

            Command::SignIn { phone, code, phone_code_hash } => {
                let signed = AuthenticationFlow::new(conn)
                    .complete_sign_in(&phone, &code, &phone_code_hash)
                    .await?;
                self.manager.rebind(conn, signed.session.clone()).await;
                Ok(Outcome::SignedIn { session: signed.session, user: signed.identity })
            }

            Command::ListDialogs => {
                let dialogs = dialogs(conn, "list-dialogs").await?;
                Ok(Outcome::Dialogs { chats: dialogs.iter().map(DialogEntry::from_raw).collect() })
            }

            Command::GetEntityDetails { id } => {
                let dialogs = dialogs(conn, "get-entity-details").await?;
                let dialog = dialogs
                    .iter()
                    .find(|d| d.id == id)
                    .ok_or(GatewayError::EntityNotFound { id })?;
                Ok(Outcome::Details { details: EntityDetails::from_raw(dialog) })
            }

            Command::CreateChannel { title, about } => {
                let created = {
                    let backend = conn.lock().await;
                    backend.create_channel(&title, &about).await
                };
                let entity = created
                    .map_err(|e| GatewayError::network("create-channel", conn.observe(e)))?;
                let id = entity.marked_id().ok_or_else(|| GatewayError::NetworkOperationFailed {
                    operation: "create-channel",
                    reason:    format!("server answered with a {} instead of a channel", entity.tag()),
                })?;
                let title = display_title(entity.title().or(Some(title.as_str())), Some(&entity));
                tracing::info!("[gateway] created channel {id}");
                Ok(Outcome::ChannelCreated { channel: ChannelSummary { id: id.to_string(), title } })
            }

            Command::DeleteChannel { channel_id } => {
                let deleted = {
                    let backend = conn.lock().await;
                    backend.delete_channel(&channel_id).await
                };
                deleted.map_err(|e| GatewayError::network("delete-channel", conn.observe(e)))?;
                tracing::info!("[gateway] deleted channel {channel_id}");
                Ok(Outcome::Done {})
            }

            Command::ListMessages { channel_id, limit } => {
                let page = {
                    let backend = conn.lock().await;
                    backend.messages(&channel_id, limit).await
                };
                let page = page.map_err(|e| GatewayError::network("list-messages", conn.observe(e)))?;
                // `limit` is validated positive
                let limit = usize::try_from(limit).unwrap_or(0);
                Ok(Outcome::Messages { messages: normalize_history(page, limit) })
            }

            Command::SendMessage { channel_id, message } => {
                let sent = {
                    let backend = conn.lock().await;
                    backend.send_message(&channel_id, &message).await
                };
                sent.map_err(|e| GatewayError::network("send-message", conn.observe(e)))?;
                Ok(Outcome::Done {})
            }
        }
    }
}

async fn dialogs(conn: &Connection, operation: &'static str) -> Result<Vec<RawDialog>, GatewayError> {
    let listed = {
        let backend = conn.lock().await;
        backend.dialogs().await
    };
    listed.map_err(|e: BackendError| GatewayError::network(operation, conn.observe(e)))
}
