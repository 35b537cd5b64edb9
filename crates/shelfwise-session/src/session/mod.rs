use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use shelfwise_core::{
    storage_keys, LoginCredentials, RefreshRequest, RegisterRequest, UserProfile,
};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::coordinator::SessionControl;
use crate::error::{ApiError, StorageError};
use crate::report::{ErrorReporter, TracingReporter};
use crate::storage::SessionStorage;


#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub has_initialised: bool,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub remembering: bool,
}

/// The subset of [`Session`] that outlives the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedSession {
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub has_initialised: bool,
    #[serde(default)]
    pub remembering: bool,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            user: session.user.clone(),
            is_authenticated: session.is_authenticated,
            has_initialised: session.has_initialised,
            remembering: session.remembering,
        }
    }
}

impl From<PersistedSession> for Session {
    fn from(persisted: PersistedSession) -> Self {
        Self {
            is_authenticated: persisted.is_authenticated && persisted.user.is_some(),
            user: persisted.user,
            has_initialised: persisted.has_initialised,
            access_expires_at: None,
            remembering: persisted.remembering,
        }
    }
}

/// Owns the one session of the process.
///
/// Every mutation of a persisted field is followed by an explicit [`save`].
/// `refresh` is not guarded against concurrent calls; the
/// [`RefreshCoordinator`](crate::RefreshCoordinator) keeps it single-flight.
///
/// [`save`]: SessionStore::save
pub struct SessionStore<A> {
    api: A,
    storage: SessionStorage,
    reporter: Arc<dyn ErrorReporter>,
    state: watch::Sender<Session>,
    initialised: OnceCell<()>,
}

impl<A: AuthApi> SessionStore<A> {
    pub fn new(api: A, storage: SessionStorage) -> Self {
        let session = restore(&storage);
        debug!(
            authenticated = session.is_authenticated,
            remembering = session.remembering,
            "restored session record"
        );
        let (state, _) = watch::channel(session);
        Self {
            api,
            storage,
            reporter: Arc::new(TracingReporter),
            state,
            initialised: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Checks once per store whether a previous session can be resumed.
    pub async fn initialise(&self) {
        self.initialised.get_or_init(|| self.probe()).await;
    }

    async fn probe(&self) {
        let (authenticated, remembering) = {
            let session = self.state.borrow();
            (session.is_authenticated, session.remembering)
        };
        if !authenticated && !remembering {
            self.update(|session| session.has_initialised = true);
            self.save();
            return;
        }

        match self.api.fetch_profile().await {
            Ok(profile) => {
                info!(user = %profile.username, "session resumed");
                self.update(|session| {
                    session.user = Some(profile);
                    session.is_authenticated = true;
                    session.has_initialised = true;
                    session.access_expires_at = None;
                });
            }
            Err(err) => {
                if err.is_unauthorized() {
                    debug!("no session to resume");
                } else {
                    self.reporter.report("initialise", &err);
                }
                self.reset();
            }
        }
        self.save();
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Session, ApiError> {
        let request = credentials.to_request();
        let response = self.api.login(&request).await?;
        let expires_at = expires_in(response.access_expires);
        info!(
            email = %request.email,
            remember = response.remember,
            "logged in"
        );
        self.update(|session| {
            session.is_authenticated = response.user.is_some();
            session.user = response.user;
            session.has_initialised = true;
            session.access_expires_at = expires_at;
            session.remembering = response.remember;
        });
        self.save();
        Ok(self.snapshot())
    }

    pub async fn register(&self, payload: &RegisterRequest) -> Result<(), ApiError> {
        self.api.register(payload).await
    }

    pub async fn refresh(&self) -> Result<(), ApiError> {
        let remembering = self.state.borrow().remembering;
        match self.api.refresh(&RefreshRequest::new(remembering)).await {
            Ok(response) => {
                let expires_at = expires_in(response.access_expires);
                self.update(|session| {
                    session.access_expires_at = expires_at;
                    session.is_authenticated = session.user.is_some();
                    session.has_initialised = true;
                });
                self.save();
                Ok(())
            }
            Err(err) => {
                if is_expected_refresh_failure(&err) {
                    debug!("refresh credential missing or invalid");
                } else {
                    self.reporter.report("refresh", &err);
                }
                self.reset();
                self.save();
                Err(err)
            }
        }
    }

    /// Clears the local session whatever the server says.
    pub async fn logout(&self) {
        if let Err(err) = self.api.logout().await {
            debug!("logout request failed: {err}");
        }
        self.reset();
        self.evict();
        info!("logged out");
    }

    /// Writes the persisted subset to durable storage.
    pub fn save(&self) {
        let persisted = PersistedSession::from(&*self.state.borrow());
        let result = serde_json::to_string(&persisted)
            .map_err(StorageError::from)
            .and_then(|raw| self.storage.durable.set(storage_keys::SESSION, &raw));
        if let Err(err) = result {
            warn!("failed to save session record: {err}");
        }
    }

    fn evict(&self) {
        for (scope, backend) in [
            ("durable", &self.storage.durable),
            ("session", &self.storage.scoped),
        ] {
            if let Err(err) = backend.remove(storage_keys::SESSION) {
                warn!(scope, "failed to evict session record: {err}");
            }
        }
    }

    fn reset(&self) {
        self.update(|session| {
            session.user = None;
            session.is_authenticated = false;
            session.has_initialised = true;
            session.access_expires_at = None;
            session.remembering = false;
        });
    }

    fn update(&self, apply: impl FnOnce(&mut Session)) {
        self.state.send_modify(apply);
    }
}

#[async_trait]
impl<A: AuthApi> SessionControl for SessionStore<A> {
    async fn refresh(&self) -> Result<(), ApiError> {
        SessionStore::refresh(self).await
    }

    async fn logout(&self) {
        SessionStore::logout(self).await;
    }
}

fn restore(storage: &SessionStorage) -> Session {
    for (scope, backend) in [("durable", &storage.durable), ("session", &storage.scoped)] {
        match backend.get(storage_keys::SESSION) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedSession>(&raw) {
                Ok(persisted) => return persisted.into(),
                Err(err) => warn!(scope, "ignoring unreadable session record: {err}"),
            },
            Ok(None) => {}
            Err(err) => warn!(scope, "failed to read session record: {err}"),
        }
    }
    Session::default()
}

fn expires_in(seconds: i64) -> Option<DateTime<Utc>> {
    chrono::Duration::try_seconds(seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

fn is_expected_refresh_failure(err: &ApiError) -> bool {
    matches!(
        err.status(),
        Some(StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED)
    )
}
