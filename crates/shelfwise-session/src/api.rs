use std::sync::Arc;

use async_trait::async_trait;
use shelfwise_core::{
    paths, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, RegisterRequest,
    UserProfile,
};
use tracing::debug;

use crate::client::{ApiRequest, HttpClient};
use crate::error::ApiError;

/// The authentication endpoints the session store depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn fetch_profile(&self) -> Result<UserProfile, ApiError>;
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError>;
    async fn register(&self, request: &RegisterRequest) -> Result<(), ApiError>;
    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse, ApiError>;
    async fn logout(&self) -> Result<(), ApiError>;
}

pub struct HttpAuthApi {
    client: Arc<dyn HttpClient>,
    profile_client: Arc<dyn HttpClient>,
}

impl HttpAuthApi {
    #[must_use]
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            profile_client: Arc::clone(&client),
            client,
        }
    }

    /// Routes the profile probe through another client, usually the refresh
    /// coordinator, so an expired access credential is renewed on the way.
    #[must_use]
    pub fn with_profile_client(mut self, profile_client: Arc<dyn HttpClient>) -> Self {
        self.profile_client = profile_client;
        self
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let response = self
            .profile_client
            .execute(&ApiRequest::get(paths::PROFILE))
            .await?;
        response.json()
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let request = ApiRequest::post(paths::TOKEN).with_json(request)?;
        let response = self.client.execute(&request).await?;
        response.json()
    }

    async fn register(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        let request = ApiRequest::post(paths::REGISTER).with_json(request)?;
        self.client.execute(&request).await?;
        Ok(())
    }

    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse, ApiError> {
        let mut call = ApiRequest::post(paths::TOKEN_REFRESH);
        if request.has_body() {
            call = call.with_json(request)?;
        }
        let response = self.client.execute(&call).await?;
        let refreshed: RefreshResponse = response.json()?;
        debug!(
            access_expires = refreshed.access_expires,
            rotated = refreshed.rotated,
            "access credential refreshed"
        );
        Ok(refreshed)
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .client
            .execute(&ApiRequest::post(paths::LOGOUT))
            .await
            .map(|_| ());
        self.client.clear_credentials();
        result
    }
}
