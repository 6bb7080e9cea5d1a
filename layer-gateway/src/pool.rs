//! Connection registry.
//!
//! Keeps one live [`Connection`] per session token and hands it to every
//! request carrying that token. Construction for a given token is mutually
//! exclusive: concurrent first callers all wait on the same attempt. The
//! empty token keys the shared anonymous connection.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tokio::time::sleep;

use crate::auth::AuthState;
use crate::backend::{Backend, Connector};
use crate::errors::{BackendError, GatewayError};
use crate::retry::{BoundedRetries, RetryContext, RetryPolicy};
use crate::session::{ApiCredentials, SessionToken};

// ─── Connection ───────────────────────────────────────────────────────────────

struct ConnectionInner {
    id:      u64,
    backend: Mutex<Box<dyn Backend>>,
    session: Mutex<SessionToken>,
    state:   Mutex<AuthState>,
    broken:  AtomicBool,
}

/// One live link to the network. Cheap to clone; clones share the link.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    fn new(id: u64, backend: Box<dyn Backend>, session: SessionToken) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                backend: Mutex::new(backend),
                session: Mutex::new(session),
                state:   Mutex::new(AuthState::Anonymous),
                broken:  AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique id of this link.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The token this connection is currently registered under.
    pub async fn session(&self) -> SessionToken {
        self.inner.session.lock().await.clone()
    }

    pub async fn auth_state(&self) -> AuthState {
        *self.inner.state.lock().await
    }

    pub(crate) async fn set_auth_state(&self, state: AuthState) {
        *self.inner.state.lock().await = state;
    }

    /// Exclusive access to the backend. Holding the guard keeps every other
    /// caller of this connection waiting, so hold it for one call only.
    pub async fn lock(&self) -> MutexGuard<'_, Box<dyn Backend>> {
        self.inner.backend.lock().await
    }

    /// Record a backend failure, marking the link broken if the transport
    /// went away. Returns the error for chaining into `map_err`.
    pub(crate) fn observe(&self, err: BackendError) -> BackendError {
        if err.is_transport() {
            self.inner.broken.store(true, Ordering::Release);
        }
        err
    }

    /// `true` once a transport failure was seen on this link.
    pub fn is_broken(&self) -> bool {
        self.inner.broken.load(Ordering::Acquire)
    }
}

// The session token never appears here.
impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("auth_state", &self.inner.state.try_lock().ok().map(|s| *s))
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}

// ─── ConnectionManager ───────────────────────────────────────────────────────

type Slot = Arc<OnceCell<Connection>>;

/// Owns every [`Connection`] of the process.
pub struct ConnectionManager {
    connector:   Arc<dyn Connector>,
    credentials: ApiCredentials,
    retry:       Arc<dyn RetryPolicy>,
    slots:       Mutex<HashMap<SessionToken, Slot>>,
    next_id:     AtomicU64,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, credentials: ApiCredentials) -> Self {
        Self {
            connector,
            credentials,
            retry:   Arc::new(BoundedRetries::default()),
            slots:   Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the connection retry policy (default: 5 attempts, 1 s apart).
    pub fn with_retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    /// The connection for `session`, establishing it on first use.
    pub async fn acquire(&self, session: &SessionToken) -> Result<Connection, GatewayError> {
        if !self.credentials.is_complete() {
            return Err(GatewayError::ConnectionFailed {
                attempts: 0,
                reason:   "API id and hash must be configured".into(),
            });
        }

        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(session.clone()).or_default().clone()
        };

        match slot.get_or_try_init(|| self.establish(session)).await {
            Ok(conn) => Ok(conn.clone()),
            Err(e) => {
                // drop the empty slot unless it was replaced or others still
                // wait on it (the map and this call hold the only two refs)
                let mut slots = self.slots.lock().await;
                let idle = |s: &Slot| Arc::ptr_eq(s, &slot) && !s.initialized() && Arc::strong_count(s) == 2;
                if slots.get(session).is_some_and(idle) {
                    slots.remove(session);
                }
                Err(e)
            }
        }
    }

    async fn establish(&self, session: &SessionToken) -> Result<Connection, GatewayError> {
        let mut fail_count   = NonZeroU32::MIN;
        let mut slept_so_far = Duration::default();
        loop {
            match self.connector.connect(&self.credentials, session).await {
                Ok(backend) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        "[gateway] connection #{id} established ({})",
                        if session.is_anonymous() { "anonymous" } else { "resumed session" }
                    );
                    return Ok(Connection::new(id, backend, session.clone()));
                }
                Err(error) => {
                    let ctx = RetryContext { fail_count, slept_so_far, error };
                    match self.retry.should_retry(&ctx) {
                        ControlFlow::Continue(delay) => {
                            sleep(delay).await;
                            slept_so_far += delay;
                            fail_count = fail_count.saturating_add(1);
                        }
                        ControlFlow::Break(()) => {
                            tracing::warn!("[gateway] giving up after {fail_count} attempt(s): {}", ctx.error);
                            return Err(GatewayError::ConnectionFailed {
                                attempts: fail_count.get(),
                                reason:   ctx.error.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Also reach `conn` through `session`, keeping every key it already has.
    ///
    /// Used after `send-code`: the code is bound to this link's auth key, so
    /// sign-in must land here whether or not the caller echoes the token.
    pub async fn alias(&self, conn: &Connection, session: SessionToken) {
        let mut slots = self.slots.lock().await;
        if holds(&slots, &session, conn) {
            return;
        }
        slots.insert(session, Arc::new(OnceCell::new_with(Some(conn.clone()))));
        tracing::debug!("[gateway] connection #{} reachable through its exported session", conn.id());
    }

    /// Move `conn` under `session`, typically a token it just exported.
    ///
    /// Every key that still points at `conn` is released, so neither the
    /// anonymous slot nor an earlier alias keeps an identity that has since
    /// signed in.
    pub async fn rebind(&self, conn: &Connection, session: SessionToken) {
        let mut slots = self.slots.lock().await;
        release(&mut slots, conn);
        if let Some(previous) = slots.get(&session).and_then(|s| s.get()) {
            tracing::debug!("[gateway] connection #{} replaces #{} for a session", conn.id(), previous.id());
        }
        slots.insert(session.clone(), Arc::new(OnceCell::new_with(Some(conn.clone()))));
        *conn.inner.session.lock().await = session;
        tracing::info!("[gateway] connection #{} rebound to its exported session", conn.id());
    }

    /// Forget `conn`; the next `acquire` for any of its tokens reconnects.
    pub async fn evict(&self, conn: &Connection) {
        let mut slots = self.slots.lock().await;
        if release(&mut slots, conn) > 0 {
            tracing::info!("[gateway] connection #{} evicted", conn.id());
        }
    }

    /// Number of established connections. A connection reachable through
    /// several tokens counts once.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter_map(|s| s.get()).map(Connection::id).collect::<HashSet<_>>().len()
    }

    /// Number of tokens the registry currently tracks, pending ones included.
    pub async fn tokens(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drop every key pointing at `conn`, returning how many there were.
fn release(slots: &mut HashMap<SessionToken, Slot>, conn: &Connection) -> usize {
    let before = slots.len();
    slots.retain(|_, s| !s.get().is_some_and(|c| c.id() == conn.id()));
    before - slots.len()
}

fn holds(slots: &HashMap<SessionToken, Slot>, key: &SessionToken, conn: &Connection) -> bool {
    slots.get(key).and_then(|s| s.get()).is_some_and(|c| c.id() == conn.id())
}
