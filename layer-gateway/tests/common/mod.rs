//! In-memory fake of the protocol backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use layer_gateway::entity::{RawChannel, RawDialog, RawEntity, RawUser};
use layer_gateway::message::RawMessage;
use layer_gateway::{
    ApiCredentials, Backend, BackendError, CommandDispatcher, ConnectionManager, Connector,
    Identity, NoRetries, SessionToken,
};

pub const CODE: &str = "12345";

#[derive(Default)]
pub struct World {
    pub connects:         AtomicUsize,
    pub connect_failures: Mutex<VecDeque<BackendError>>,
    /// Every call reaching a backend, as `"<method> <arg>"`.
    pub calls:            Mutex<Vec<String>>,
    /// `(link, hash)`: a hash is only good on the link that asked for it.
    pub issued_hashes:    Mutex<Vec<(usize, String)>>,
    pub password_needed:  Mutex<bool>,
    pub dialogs:          Mutex<Vec<RawDialog>>,
    pub history:          Mutex<Vec<RawMessage>>,
    /// Failure returned by the next backend call, once.
    pub fail_next:        Mutex<Option<BackendError>>,
    pub next_channel:     AtomicUsize,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_next(&self, err: BackendError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    fn record(&self, call: String) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call);
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct FakeConnector {
    pub world: Arc<World>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _credentials: &ApiCredentials,
        session:      &SessionToken,
    ) -> Result<Box<dyn Backend>, BackendError> {
        let n = self.world.connects.fetch_add(1, Ordering::SeqCst) + 1;
        // give concurrent callers a chance to pile up
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(err) = self.world.connect_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let signed_in = session.as_str().strip_prefix("1user-").map(str::to_string);
        Ok(Box::new(FakeBackend {
            world: self.world.clone(),
            link:  n,
            user:  Mutex::new(signed_in),
        }))
    }
}

pub struct FakeBackend {
    world: Arc<World>,
    link:  usize,
    user:  Mutex<Option<String>>,
}

#[async_trait]
impl Backend for FakeBackend {
    async fn send_code(&self, phone: &str) -> Result<String, BackendError> {
        self.world.record(format!("send_code {phone}"))?;
        let mut hashes = self.world.issued_hashes.lock().unwrap();
        let hash = format!("hash-{}", hashes.len() + 1);
        hashes.push((self.link, hash.clone()));
        Ok(hash)
    }

    async fn sign_in(&self, phone: &str, code: &str, hash: &str) -> Result<Identity, BackendError> {
        self.world.record(format!("sign_in {phone}"))?;
        if *self.world.password_needed.lock().unwrap() {
            return Err(BackendError::from_telegram(401, "SESSION_PASSWORD_NEEDED"));
        }
        let latest = self.world.issued_hashes.lock().unwrap()
            .iter()
            .rev()
            .find(|(link, _)| *link == self.link)
            .map(|(_, h)| h.clone());
        if latest.as_deref() != Some(hash) {
            return Err(BackendError::from_telegram(400, "PHONE_CODE_EXPIRED"));
        }
        if code != CODE {
            return Err(BackendError::from_telegram(400, "PHONE_CODE_INVALID"));
        }
        let id = phone.trim_start_matches('+').to_string();
        *self.user.lock().unwrap() = Some(id.clone());
        Ok(Identity { id, name: "Ada Lovelace".into(), username: Some("ada".into()) })
    }

    async fn export_session(&self) -> Result<SessionToken, BackendError> {
        self.world.record("export_session".into())?;
        Ok(match self.user.lock().unwrap().as_deref() {
            Some(user) => SessionToken::new(format!("1user-{user}")),
            None => SessionToken::new(format!("1anon-{}", self.link)),
        })
    }

    async fn dialogs(&self) -> Result<Vec<RawDialog>, BackendError> {
        self.world.record("dialogs".into())?;
        Ok(self.world.dialogs.lock().unwrap().clone())
    }

    async fn create_channel(&self, title: &str, _about: &str) -> Result<RawEntity, BackendError> {
        self.world.record(format!("create_channel {title}"))?;
        let id = 500 + self.world.next_channel.fetch_add(1, Ordering::SeqCst) as i64;
        Ok(RawEntity::Channel(RawChannel {
            id,
            title: title.to_string(),
            broadcast: true,
            creator: true,
            ..Default::default()
        }))
    }

    async fn delete_channel(&self, peer_id: &str) -> Result<(), BackendError> {
        self.world.record(format!("delete_channel {peer_id}"))?;
        self.known(peer_id)
    }

    async fn messages(&self, peer_id: &str, _limit: i32) -> Result<Vec<RawMessage>, BackendError> {
        self.world.record(format!("messages {peer_id}"))?;
        self.known(peer_id)?;
        Ok(self.world.history.lock().unwrap().clone())
    }

    async fn send_message(&self, peer_id: &str, text: &str) -> Result<(), BackendError> {
        self.world.record(format!("send_message {peer_id} {text}"))?;
        self.known(peer_id)
    }
}

impl FakeBackend {
    fn known(&self, peer_id: &str) -> Result<(), BackendError> {
        if self.world.dialogs.lock().unwrap().iter().any(|d| d.id == peer_id) {
            Ok(())
        } else {
            Err(BackendError::UnknownPeer(peer_id.to_string()))
        }
    }
}

pub fn credentials() -> ApiCredentials {
    ApiCredentials::new(12345, "0123456789abcdef")
}

pub fn manager(world: &Arc<World>) -> Arc<ConnectionManager> {
    let connector = Arc::new(FakeConnector { world: world.clone() });
    Arc::new(ConnectionManager::new(connector, credentials()).with_retry_policy(Arc::new(NoRetries)))
}

pub fn dispatcher(world: &Arc<World>) -> CommandDispatcher {
    CommandDispatcher::new(manager(world))
}

pub fn sample_dialogs() -> Vec<RawDialog> {
    vec![
        RawDialog {
            id:     "-1000000000077".into(),
            title:  Some("Announcements".into()),
            entity: Some(RawEntity::Channel(RawChannel {
                id: 77, title: "Announcements".into(), broadcast: true, creator: true,
                participants_count: Some(1200), ..Default::default()
            })),
        },
        RawDialog {
            id:     "-1000000000088".into(),
            title:  None,
            entity: Some(RawEntity::Channel(RawChannel {
                id: 88, title: "Rust Lounge".into(), megagroup: true, ..Default::default()
            })),
        },
        RawDialog {
            id:     "1001".into(),
            title:  None,
            entity: Some(RawEntity::User(RawUser {
                id: 1001, first_name: Some("Grace".into()), last_name: Some("Hopper".into()),
                phone: Some("15550001001".into()), ..Default::default()
            })),
        },
        RawDialog {
            id:     "1002".into(),
            title:  None,
            entity: Some(RawEntity::User(RawUser {
                id: 1002, first_name: Some("Helper".into()), username: Some("helper_bot".into()),
                bot: true, ..Default::default()
            })),
        },
    ]
}

pub fn message(id: i32, date: i64) -> RawMessage {
    RawMessage { id, date, text: format!("message {id}"), ..Default::default() }
}
