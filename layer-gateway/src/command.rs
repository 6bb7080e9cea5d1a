//! The JSON command surface: request body, typed commands and the response
//! envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::normalize_phone;
use crate::backend::Identity;
use crate::entity::{DialogEntry, EntityDetails};
use crate::errors::GatewayError;
use crate::message::MessageRecord;
use crate::session::SessionToken;

/// Default page size of `list-messages`.
pub const DEFAULT_MESSAGE_LIMIT: i32 = 100;

// ─── Request ──────────────────────────────────────────────────────────────────

/// A command body as posted by the caller.
///
/// Field values are kept loose (phones and ids often arrive as JSON numbers)
/// and checked per action.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub action:          String,
    #[serde(default)]
    pub phone:           Option<Value>,
    #[serde(default)]
    pub code:            Option<Value>,
    #[serde(default)]
    pub phone_code_hash: Option<Value>,
    #[serde(default)]
    pub id:              Option<Value>,
    #[serde(default, rename = "channelId")]
    pub channel_id:      Option<Value>,
    #[serde(default)]
    pub title:           Option<Value>,
    #[serde(default)]
    pub about:           Option<Value>,
    #[serde(default)]
    pub message:         Option<Value>,
    #[serde(default)]
    pub limit:           Option<Value>,
    #[serde(default)]
    pub session:         Option<String>,
}

impl CommandRequest {
    pub fn session_token(&self) -> SessionToken {
        SessionToken::from_optional(self.session.as_deref())
    }
}

fn text(value: Option<&Value>, field: &'static str) -> Result<Option<String>, GatewayError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(GatewayError::InvalidRequest { field }),
    }
}

fn required(value: Option<&Value>, field: &'static str) -> Result<String, GatewayError> {
    text(value, field)?.ok_or(GatewayError::InvalidRequest { field })
}

fn limit(value: Option<&Value>) -> Result<i32, GatewayError> {
    const FIELD: &str = "limit";
    let Some(raw) = text(value, FIELD)? else { return Ok(DEFAULT_MESSAGE_LIMIT) };
    match raw.trim().parse::<i32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(GatewayError::InvalidRequest { field: FIELD }),
    }
}

// ─── Action ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    SendCode,
    SignIn,
    ListDialogs,
    GetEntityDetails,
    CreateChannel,
    DeleteChannel,
    ListMessages,
    SendMessage,
}

impl Action {
    /// Parse an action name. Both `send-code` and the older `sendCode`
    /// spellings are accepted.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim() {
            "send-code" | "sendCode" => Self::SendCode,
            "sign-in" | "signIn" => Self::SignIn,
            "list-dialogs" | "getChats" | "getDialogs" => Self::ListDialogs,
            "get-entity-details" | "getEntityDetails" => Self::GetEntityDetails,
            "create-channel" | "createChannel" => Self::CreateChannel,
            "delete-channel" | "deleteChannel" => Self::DeleteChannel,
            "list-messages" | "getMessages" => Self::ListMessages,
            "send-message" | "sendMessage" => Self::SendMessage,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SendCode         => "send-code",
            Self::SignIn           => "sign-in",
            Self::ListDialogs      => "list-dialogs",
            Self::GetEntityDetails => "get-entity-details",
            Self::CreateChannel    => "create-channel",
            Self::DeleteChannel    => "delete-channel",
            Self::ListMessages     => "list-messages",
            Self::SendMessage      => "send-message",
        }
    }
}

// ─── Command ──────────────────────────────────────────────────────────────────

/// A validated command, ready to run.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SendCode { phone: String },
    SignIn { phone: String, code: String, phone_code_hash: String },
    ListDialogs,
    GetEntityDetails { id: String },
    CreateChannel { title: String, about: String },
    DeleteChannel { channel_id: String },
    ListMessages { channel_id: String, limit: i32 },
    SendMessage { channel_id: String, message: String },
}

impl Command {
    /// Check the payload for `action`. Never touches the network.
    pub fn from_request(action: Action, req: &CommandRequest) -> Result<Self, GatewayError> {
        Ok(match action {
            Action::SendCode => Self::SendCode {
                phone: normalize_phone(&required(req.phone.as_ref(), "phone")?)?,
            },
            Action::SignIn => Self::SignIn {
                phone:           normalize_phone(&required(req.phone.as_ref(), "phone")?)?,
                code:            required(req.code.as_ref(), "code")?.trim().to_string(),
                phone_code_hash: required(req.phone_code_hash.as_ref(), "phone_code_hash")?,
            },
            Action::ListDialogs => Self::ListDialogs,
            Action::GetEntityDetails => Self::GetEntityDetails {
                id: required(req.id.as_ref(), "id")?.trim().to_string(),
            },
            Action::CreateChannel => Self::CreateChannel {
                title: required(req.title.as_ref(), "title")?,
                about: text(req.about.as_ref(), "about")?.unwrap_or_default(),
            },
            Action::DeleteChannel => Self::DeleteChannel {
                channel_id: required(req.channel_id.as_ref(), "channelId")?.trim().to_string(),
            },
            Action::ListMessages => Self::ListMessages {
                channel_id: required(req.channel_id.as_ref(), "channelId")?.trim().to_string(),
                limit:      limit(req.limit.as_ref())?,
            },
            Action::SendMessage => Self::SendMessage {
                channel_id: required(req.channel_id.as_ref(), "channelId")?.trim().to_string(),
                message:    required(req.message.as_ref(), "message")?,
            },
        })
    }
}

// ─── Outcome / envelope ──────────────────────────────────────────────────────

/// `{id, title}` of a freshly created channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub id:    String,
    pub title: String,
}

/// The action-specific part of a successful response.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    CodeSent { phone_code_hash: String, session: SessionToken },
    SignedIn { session: SessionToken, user: Identity },
    Dialogs { chats: Vec<DialogEntry> },
    Details { details: EntityDetails },
    ChannelCreated { channel: ChannelSummary },
    Messages { messages: Vec<MessageRecord> },
    Done {},
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    Ok(Outcome),
    Failed {
        error:   String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

/// `{ "success": bool, ... }`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(flatten)]
    pub body:    Body,
}

/// An envelope plus the HTTP status it goes out with.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status:   u16,
    pub envelope: Envelope,
}

impl From<Result<Outcome, GatewayError>> for Reply {
    fn from(result: Result<Outcome, GatewayError>) -> Self {
        match result {
            Ok(outcome) => Self {
                status:   200,
                envelope: Envelope { success: true, body: Body::Ok(outcome) },
            },
            Err(err) => Self {
                status:   err.status(),
                envelope: Envelope {
                    success: false,
                    body:    Body::Failed { error: err.to_string(), details: err.details() },
                },
            },
        }
    }
}

impl Reply {
    /// The failure's `error` string, if this is a failure.
    pub fn error(&self) -> Option<&str> {
        match &self.envelope.body {
            Body::Failed { error, .. } => Some(error),
            Body::Ok(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(v: Value) -> CommandRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn both_spellings_parse() {
        assert_eq!(Action::parse("send-code"), Some(Action::SendCode));
        assert_eq!(Action::parse("sendCode"), Some(Action::SendCode));
        assert_eq!(Action::parse("getChats"), Some(Action::ListDialogs));
        assert_eq!(Action::parse("dance"), None);
    }

    #[test]
    fn numbers_are_accepted_as_text() {
        let req = request(json!({"action": "send-code", "phone": 12345678900u64}));
        assert_eq!(
            Command::from_request(Action::SendCode, &req).unwrap(),
            Command::SendCode { phone: "+12345678900".into() }
        );
    }

    #[test]
    fn missing_fields_name_the_field() {
        let req = request(json!({"action": "sign-in", "phone": "+1 234", "code": "12345"}));
        assert_eq!(
            Command::from_request(Action::SignIn, &req),
            Err(GatewayError::InvalidRequest { field: "phone_code_hash" })
        );
        let req = request(json!({"action": "send-message", "channelId": "-1001", "message": "  "}));
        assert_eq!(
            Command::from_request(Action::SendMessage, &req),
            Err(GatewayError::InvalidRequest { field: "message" })
        );
    }

    #[test]
    fn limit_defaults_and_validates() {
        let req = request(json!({"channelId": "1"}));
        assert_eq!(
            Command::from_request(Action::ListMessages, &req).unwrap(),
            Command::ListMessages { channel_id: "1".into(), limit: DEFAULT_MESSAGE_LIMIT }
        );
        let req = request(json!({"channelId": "1", "limit": "25"}));
        assert!(matches!(Command::from_request(Action::ListMessages, &req), Ok(Command::ListMessages { limit: 25, .. })));
        for bad in [json!(0), json!(-3), json!("many"), json!(true)] {
            let req = request(json!({"channelId": "1", "limit": bad}));
            assert_eq!(
                Command::from_request(Action::ListMessages, &req),
                Err(GatewayError::InvalidRequest { field: "limit" })
            );
        }
    }

    #[test]
    fn envelope_shapes() {
        let ok: Reply = Ok(Outcome::CodeSent {
            phone_code_hash: "abc".into(),
            session:         SessionToken::new("1xyz"),
        }).into();
        assert_eq!(
            serde_json::to_value(&ok.envelope).unwrap(),
            json!({"success": true, "phone_code_hash": "abc", "session": "1xyz"})
        );

        let done: Reply = Ok(Outcome::Done {}).into();
        assert_eq!(serde_json::to_value(&done.envelope).unwrap(), json!({"success": true}));

        let failed: Reply = Err(GatewayError::PasswordRequired).into();
        assert_eq!(failed.status, 200);
        assert_eq!(
            serde_json::to_value(&failed.envelope).unwrap(),
            json!({"success": false, "error": "PASSWORD_REQUIRED"})
        );
    }
}
