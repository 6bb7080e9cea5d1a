//! [`Connector`] and [`Backend`] on top of `layer-client`.
//!
//! # Session tokens
//!
//! A token is `"1"` followed by the standard base64 of the library's binary
//! session file. Before connecting, the token is written to a file in the
//! session directory (named after the SHA-256 of the token) and handed to
//! [`BinaryFileBackend`]; exporting saves the session and re-encodes that
//! file. Anonymous connections start from a fresh, process-unique file.
//!
//! # Peer ids
//!
//! Payload and response ids are marked peer ids: users are positive, basic
//! groups `-chat_id`, channels `-(1_000_000_000_000 + channel_id)`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use layer_client::{AutoSleep, BinaryFileBackend, Client, Config, InvocationError};
use layer_tl_types as tl;
use sha2::{Digest, Sha256};

use crate::backend::{Backend, Connector, Identity};
use crate::entity::{
    display_title, marked_channel_id, RawChannel, RawChat, RawDialog, RawEntity, RawUser,
    CHANNEL_ID_OFFSET,
};
use crate::errors::BackendError;
use crate::message::{MediaKind, RawMessage, RawReply};
use crate::session::{ApiCredentials, SessionToken};

/// Version prefix of the token format.
const TOKEN_VERSION: char = '1';

// ─── Token <-> session file ──────────────────────────────────────────────────

fn encode_token(session_file: &[u8]) -> SessionToken {
    SessionToken::new(format!("{TOKEN_VERSION}{}", STANDARD.encode(session_file)))
}

fn decode_token(token: &SessionToken) -> Result<Vec<u8>, BackendError> {
    let body = token
        .as_str()
        .strip_prefix(TOKEN_VERSION)
        .ok_or_else(|| BackendError::Other("unsupported session token version".into()))?;
    STANDARD
        .decode(body)
        .map_err(|e| BackendError::Other(format!("malformed session token: {e}")))
}

fn token_file_name(token: &SessionToken) -> String {
    let digest = Sha256::digest(token.as_str().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{hex}.session")
}

fn io_error(e: std::io::Error) -> BackendError {
    BackendError::Io(e.to_string())
}

fn from_invocation(e: InvocationError) -> BackendError {
    match e {
        InvocationError::Rpc(r) => BackendError::Rpc { code: r.code, name: r.name, value: r.value },
        InvocationError::Io(e)  => io_error(e),
        InvocationError::Dropped => BackendError::Disconnected,
        other => BackendError::Other(other.to_string()),
    }
}

// ─── LayerConnector ──────────────────────────────────────────────────────────

/// Connects through `layer-client`, one session file per live connection.
pub struct LayerConnector {
    session_dir: PathBuf,
    next_anon:   AtomicU64,
}

impl LayerConnector {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self { session_dir: session_dir.into(), next_anon: AtomicU64::new(0) }
    }

    fn session_path(&self, session: &SessionToken) -> PathBuf {
        if session.is_anonymous() {
            let n = self.next_anon.fetch_add(1, Ordering::Relaxed);
            self.session_dir.join(format!("anon-{}-{n}.session", std::process::id()))
        } else {
            self.session_dir.join(token_file_name(session))
        }
    }
}

#[async_trait]
impl Connector for LayerConnector {
    async fn connect(
        &self,
        credentials: &ApiCredentials,
        session:     &SessionToken,
    ) -> Result<Box<dyn Backend>, BackendError> {
        tokio::fs::create_dir_all(&self.session_dir).await.map_err(io_error)?;

        let file = SessionFile::new(self.session_path(session));
        if session.is_anonymous() {
            // a stale file with the same name must not resume someone else
            if tokio::fs::try_exists(file.path()).await.unwrap_or(false) {
                tokio::fs::remove_file(file.path()).await.map_err(io_error)?;
            }
        } else {
            tokio::fs::write(file.path(), decode_token(session)?).await.map_err(io_error)?;
        }

        let client = Client::connect(Config {
            api_id:          credentials.api_id,
            api_hash:        credentials.api_hash.clone(),
            session_backend: Arc::new(BinaryFileBackend::new(file.path().to_path_buf())),
            retry_policy:    Arc::new(AutoSleep::default()),
            ..Default::default()
        })
        .await
        .map_err(from_invocation)?;

        Ok(Box::new(LayerBackend {
            client,
            credentials:  credentials.clone(),
            session_path: file.keep(),
        }))
    }
}

/// A session file on disk, removed on drop unless [`SessionFile::keep`] hands
/// it over. A failed connect must not leave an auth key behind.
struct SessionFile {
    path: PathBuf,
    kept: bool,
}

impl SessionFile {
    fn new(path: PathBuf) -> Self {
        Self { path, kept: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) -> PathBuf {
        self.kept = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for SessionFile {
    fn drop(&mut self) {
        if !self.kept {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

// ─── LayerBackend ────────────────────────────────────────────────────────────

pub struct LayerBackend {
    client:       Client,
    credentials:  ApiCredentials,
    session_path: PathBuf,
}

impl Drop for LayerBackend {
    fn drop(&mut self) {
        // the token held by the caller is the only copy that matters
        let _ = std::fs::remove_file(&self.session_path);
    }
}

impl LayerBackend {
    fn send_code_request(&self, phone: &str) -> tl::functions::auth::SendCode {
        tl::functions::auth::SendCode {
            phone_number: phone.to_string(),
            api_id:       self.credentials.api_id,
            api_hash:     self.credentials.api_hash.clone(),
            settings:     tl::enums::CodeSettings::CodeSettings(tl::types::CodeSettings {
                allow_flashcall: false, current_number: false, allow_app_hash: false,
                allow_missed_call: false, allow_firebase: false, unknown_number: false,
                logout_tokens: None, token: None, app_sandbox: None,
            }),
        }
    }

    /// Resolve a marked id to an input peer, refreshing the dialog list once
    /// if the library has no access hash for it yet.
    async fn input_peer(&self, peer_id: &str) -> Result<tl::enums::InputPeer, BackendError> {
        let peer = parse_marked(peer_id)?;
        if let Ok(input) = self.client.resolve_to_input_peer(&peer).await {
            return Ok(input);
        }
        self.dialogs().await?;
        self.client
            .resolve_to_input_peer(&peer)
            .await
            .map_err(|_| BackendError::UnknownPeer(peer_id.to_string()))
    }
}

#[async_trait]
impl Backend for LayerBackend {
    async fn send_code(&self, phone: &str) -> Result<String, BackendError> {
        use tl::enums::auth::SentCode;

        let req = self.send_code_request(phone);
        let sent = match self.client.invoke(&req).await {
            // PHONE_MIGRATE_X: the library's own login request switches the
            // home DC; ask again there to learn the hash.
            Err(InvocationError::Rpc(ref r)) if r.code == 303 => {
                tracing::info!("[gateway] phone lives on DC {:?}, migrating", r.value);
                self.client.request_login_code(phone).await.map_err(from_invocation)?;
                self.client.invoke(&req).await
            }
            other => other,
        }
        .map_err(from_invocation)?;

        match sent {
            SentCode::SentCode(s) => Ok(s.phone_code_hash),
            SentCode::Success(_) => Err(BackendError::Other("already authorized".into())),
            SentCode::PaymentRequired(_) => Err(BackendError::Other("payment required to send code".into())),
        }
    }

    async fn sign_in(
        &self,
        phone:           &str,
        code:            &str,
        phone_code_hash: &str,
    ) -> Result<Identity, BackendError> {
        use tl::enums::auth::Authorization;

        let req = tl::functions::auth::SignIn {
            phone_number:       phone.to_string(),
            phone_code_hash:    phone_code_hash.to_string(),
            phone_code:         Some(code.to_string()),
            email_verification: None,
        };
        match self.client.invoke(&req).await.map_err(from_invocation)? {
            Authorization::Authorization(a) => identity(&a.user),
            Authorization::SignUpRequired(_) => Err(BackendError::Other(
                "SIGN_UP_REQUIRED: this phone number is not registered".into(),
            )),
        }
    }

    async fn export_session(&self) -> Result<SessionToken, BackendError> {
        self.client.save_session().await.map_err(from_invocation)?;
        let bytes = tokio::fs::read(&self.session_path).await.map_err(io_error)?;
        Ok(encode_token(&bytes))
    }

    async fn dialogs(&self) -> Result<Vec<RawDialog>, BackendError> {
        let mut iter = self.client.iter_dialogs();
        let mut out  = Vec::new();
        while let Some(dialog) = iter.next(&self.client).await.map_err(from_invocation)? {
            // folders have no peer
            let Some(peer) = dialog.peer() else { continue };
            out.push(RawDialog {
                id:     marked_peer_id(peer).to_string(),
                title:  forbidden_title(dialog.chat.as_ref()),
                entity: raw_entity(dialog.entity.as_ref(), dialog.chat.as_ref()),
            });
        }
        tracing::debug!("[gateway] listed {} dialogs", out.len());
        Ok(out)
    }

    async fn create_channel(&self, title: &str, about: &str) -> Result<RawEntity, BackendError> {
        let req = tl::functions::channels::CreateChannel {
            broadcast:  true,
            megagroup:  false,
            for_import: false,
            forum:      false,
            title:      title.to_string(),
            about:      about.to_string(),
            geo_point:  None,
            address:    None,
            ttl_period: None,
        };
        let updates = self.client.invoke(&req).await.map_err(from_invocation)?;
        let chats = match updates {
            tl::enums::Updates::Updates(u)  => u.chats,
            tl::enums::Updates::Combined(u) => u.chats,
            _ => Vec::new(),
        };
        chats
            .iter()
            .find_map(|c| match raw_entity(None, Some(c)) {
                Some(e @ RawEntity::Channel(_)) => Some(e),
                _ => None,
            })
            .ok_or_else(|| BackendError::Other("channels.createChannel returned no channel".into()))
    }

    async fn delete_channel(&self, peer_id: &str) -> Result<(), BackendError> {
        let tl::enums::InputPeer::Channel(c) = self.input_peer(peer_id).await? else {
            return Err(BackendError::Other(format!("{peer_id} is not a channel")));
        };
        let req = tl::functions::channels::DeleteChannel {
            channel: tl::enums::InputChannel::InputChannel(tl::types::InputChannel {
                channel_id:  c.channel_id,
                access_hash: c.access_hash,
            }),
        };
        self.client.invoke(&req).await.map_err(from_invocation)?;
        Ok(())
    }

    async fn messages(&self, peer_id: &str, limit: i32) -> Result<Vec<RawMessage>, BackendError> {
        let input = self.input_peer(peer_id).await?;
        let page = self.client.get_messages(input, limit, 0).await.map_err(from_invocation)?;
        Ok(page.iter().filter_map(|m| raw_message(&m.raw)).collect())
    }

    async fn send_message(&self, peer_id: &str, text: &str) -> Result<(), BackendError> {
        // resolve first so an unknown id is reported as such
        self.input_peer(peer_id).await?;
        self.client
            .send_message_to_peer(parse_marked(peer_id)?, text)
            .await
            .map_err(from_invocation)
    }
}

// ─── TL -> raw shapes ────────────────────────────────────────────────────────

fn parse_marked(peer_id: &str) -> Result<tl::enums::Peer, BackendError> {
    let unknown = || BackendError::UnknownPeer(peer_id.to_string());
    let id: i64 = peer_id.trim().parse().map_err(|_| unknown())?;
    Ok(match id {
        0 => return Err(unknown()),
        id if id > 0 => tl::enums::Peer::User(tl::types::PeerUser { user_id: id }),
        id if id <= -CHANNEL_ID_OFFSET => {
            tl::enums::Peer::Channel(tl::types::PeerChannel { channel_id: -id - CHANNEL_ID_OFFSET })
        }
        id => tl::enums::Peer::Chat(tl::types::PeerChat { chat_id: -id }),
    })
}

fn marked_peer_id(peer: &tl::enums::Peer) -> i64 {
    match peer {
        tl::enums::Peer::User(u)    => u.user_id,
        tl::enums::Peer::Chat(c)    => -c.chat_id,
        tl::enums::Peer::Channel(c) => marked_channel_id(c.channel_id),
    }
}

fn forbidden_title(chat: Option<&tl::enums::Chat>) -> Option<String> {
    match chat? {
        tl::enums::Chat::Forbidden(c)        => Some(c.title.clone()),
        tl::enums::Chat::ChannelForbidden(c) => Some(c.title.clone()),
        _ => None,
    }
}

fn raw_user(user: &tl::enums::User) -> RawEntity {
    match user {
        tl::enums::User::User(u) => RawEntity::User(RawUser {
            id:         u.id,
            first_name: u.first_name.clone(),
            last_name:  u.last_name.clone(),
            username:   u.username.clone(),
            phone:      u.phone.clone(),
            bot:        u.bot,
            verified:   u.verified,
            restricted: u.restricted,
            scam:       u.scam,
            fake:       u.fake,
        }),
        tl::enums::User::Empty(_) => RawEntity::Other { tag: "UserEmpty".into() },
    }
}

fn raw_entity(user: Option<&tl::enums::User>, chat: Option<&tl::enums::Chat>) -> Option<RawEntity> {
    if let Some(user) = user {
        return Some(raw_user(user));
    }
    Some(match chat? {
        tl::enums::Chat::Channel(c) => RawEntity::Channel(RawChannel {
            id:                 c.id,
            title:              c.title.clone(),
            username:           c.username.clone(),
            megagroup:          c.megagroup,
            broadcast:          c.broadcast,
            creator:            c.creator,
            verified:           c.verified,
            restricted:         c.restricted,
            scam:               c.scam,
            fake:               c.fake,
            participants_count: c.participants_count,
        }),
        tl::enums::Chat::Chat(c) => RawEntity::Chat(RawChat {
            id:                 c.id,
            title:              c.title.clone(),
            creator:            c.creator,
            participants_count: Some(c.participants_count),
        }),
        tl::enums::Chat::Forbidden(_)        => RawEntity::Other { tag: "ChatForbidden".into() },
        tl::enums::Chat::ChannelForbidden(_) => RawEntity::Other { tag: "ChannelForbidden".into() },
        tl::enums::Chat::Empty(_)            => RawEntity::Other { tag: "ChatEmpty".into() },
    })
}

fn identity(user: &tl::enums::User) -> Result<Identity, BackendError> {
    let entity = raw_user(user);
    let RawEntity::User(u) = &entity else {
        return Err(BackendError::Other("sign-in returned an empty user".into()));
    };
    Ok(Identity {
        id:       u.id.to_string(),
        name:     display_title(None, Some(&entity)),
        username: u.username.clone(),
    })
}

fn raw_reply(header: Option<&tl::enums::MessageReplyHeader>) -> Option<RawReply> {
    match header? {
        tl::enums::MessageReplyHeader::MessageReplyHeader(h) => Some(RawReply {
            message_id: h.reply_to_msg_id?,
            top_id:     h.reply_to_top_id,
        }),
        _ => None,
    }
}

fn media_kind(media: &tl::enums::MessageMedia) -> Option<MediaKind> {
    use tl::enums::MessageMedia as M;
    Some(match media {
        M::Empty          => return None,
        M::Photo(_)       => MediaKind::Photo,
        M::Document(_)    => MediaKind::Document,
        M::Geo(_)         => MediaKind::Geo,
        M::GeoLive(_)     => MediaKind::GeoLive,
        M::Venue(_)       => MediaKind::Venue,
        M::Contact(_)     => MediaKind::Contact,
        M::WebPage(_)     => MediaKind::WebPage,
        M::Poll(_)        => MediaKind::Poll,
        M::Dice(_)        => MediaKind::Dice,
        M::Game(_)        => MediaKind::Game,
        M::Invoice(_)     => MediaKind::Invoice,
        M::Unsupported    => MediaKind::Unsupported,
        other             => MediaKind::Other(variant_tag(other)),
    })
}

/// Lower-cased variant name from the derived `Debug` output.
fn variant_tag(value: &impl std::fmt::Debug) -> String {
    let debug = format!("{value:?}");
    debug
        .split(|c: char| !c.is_ascii_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn raw_message(message: &tl::enums::Message) -> Option<RawMessage> {
    match message {
        tl::enums::Message::Message(m) => Some(RawMessage {
            id:        m.id,
            date:      i64::from(m.date),
            text:      m.message.clone(),
            sender_id: m.from_id.as_ref().map(marked_peer_id),
            views:     m.views,
            forwards:  m.forwards,
            reply_to:  raw_reply(m.reply_to.as_ref()),
            media:     m.media.as_ref().and_then(media_kind),
        }),
        tl::enums::Message::Service(m) => Some(RawMessage {
            id:        m.id,
            date:      i64::from(m.date),
            sender_id: m.from_id.as_ref().map(marked_peer_id),
            reply_to:  raw_reply(m.reply_to.as_ref()),
            ..Default::default()
        }),
        tl::enums::Message::Empty(_) => None,
    }
}
