//! # layer-gateway
//!
//! Stateless JSON command gateway over long-lived Telegram MTProto sessions.
//!
//! ## Features
//! - Two-call phone login (`send-code`, `sign-in`) with a distinguished
//!   `PASSWORD_REQUIRED` answer for 2FA accounts
//! - Caller-held session tokens; one live connection per token, created once
//!   even under concurrent first use
//! - Dialog listing and lookup with a stable contact/group/channel/bot
//!   classification
//! - Broadcast channel creation and deletion
//! - Message history normalized to ascending, JSON-friendly records
//! - An axum router exposing all of it on `POST /api/telegram/mtproto`
//!
//! The protocol client sits behind the [`Connector`]/[`Backend`] traits; the
//! `layer` feature provides the real one on top of `layer-client`.

#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod errors;
mod retry;
mod session;

pub mod auth;
pub mod backend;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod http;
pub mod message;
pub mod pool;

#[cfg(feature = "layer")]
#[cfg_attr(docsrs, doc(cfg(feature = "layer")))]
pub mod layer;

pub use auth::{AuthState, AuthenticationFlow, PendingVerification};
pub use backend::{Backend, Connector, Identity};
pub use command::{CommandRequest, Envelope, Outcome, Reply};
pub use config::{ConfigError, GatewayConfig};
pub use dispatch::CommandDispatcher;
pub use errors::{BackendError, GatewayError};
pub use pool::{Connection, ConnectionManager};
pub use retry::{BoundedRetries, NoRetries, RetryContext, RetryPolicy};
pub use session::{ApiCredentials, SessionToken};
