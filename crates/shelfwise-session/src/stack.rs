use std::sync::Arc;

use crate::api::HttpAuthApi;
use crate::client::{ClientConfig, HttpClient, ReqwestClient};
use crate::coordinator::RefreshCoordinator;
use crate::error::ApiError;
use crate::jar::CredentialJar;
use crate::report::ErrorReporter;
use crate::session::SessionStore;
use crate::storage::SessionStorage;

/// The session store and the client the rest of the application talks to,
/// wired to each other.
pub struct SessionStack {
    pub store: Arc<SessionStore<HttpAuthApi>>,
    pub client: Arc<RefreshCoordinator>,
    pub jar: Arc<CredentialJar>,
}

impl SessionStack {
    pub fn connect(config: &ClientConfig, storage: SessionStorage) -> Result<Self, ApiError> {
        Self::build(config, storage, None)
    }

    pub fn connect_with_reporter(
        config: &ClientConfig,
        storage: SessionStorage,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, ApiError> {
        Self::build(config, storage, Some(reporter))
    }

    fn build(
        config: &ClientConfig,
        storage: SessionStorage,
        reporter: Option<Arc<dyn ErrorReporter>>,
    ) -> Result<Self, ApiError> {
        let jar = Arc::new(CredentialJar::load(Arc::clone(&storage.durable)));
        let raw: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(config, Arc::clone(&jar))?);
        let client = Arc::new(RefreshCoordinator::new(Arc::clone(&raw)));
        let api = HttpAuthApi::new(raw).with_profile_client(client.clone());
        let mut store = SessionStore::new(api, storage);
        if let Some(reporter) = reporter {
            store = store.with_reporter(reporter);
        }
        let store = Arc::new(store);
        let attached = client.attach(&store);
        debug_assert!(attached, "fresh coordinator already had a session");
        Ok(Self { store, client, jar })
    }
}
