use async_trait::async_trait;
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use thiserror::Error;

use crate::auth::Role;

/// IdentityError
///
/// Failures while talking to the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity provider returned {status} for user {user_id}")]
    Status {
        status: reqwest::StatusCode,
        user_id: String,
    },
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// IdentityProvider
///
/// The external service that owns users and their role metadata. This service only reads
/// the role claim; it never writes to the provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves the role stored in the user's public metadata.
    async fn role_of(&self, user_id: &str) -> Result<Role, IdentityError>;
}

/// IdentityState
///
/// Shared handle to the identity provider, constructed once in `main`.
pub type IdentityState = Arc<dyn IdentityProvider>;

/// Subset of the provider's user object that carries the role claim.
#[derive(Debug, Deserialize)]
struct ProviderUser {
    #[serde(default, deserialize_with = "metadata_or_default")]
    public_metadata: PublicMetadata,
}

/// Metadata is free-form; a non-string role claim counts as no claim.
#[derive(Debug, Default, Deserialize)]
struct PublicMetadata {
    #[serde(default)]
    role: Option<serde_json::Value>,
}

impl PublicMetadata {
    fn role_claim(&self) -> Option<&str> {
        self.role.as_ref().and_then(serde_json::Value::as_str)
    }
}

/// `public_metadata: null` is treated like missing metadata.
fn metadata_or_default<'de, D>(deserializer: D) -> Result<PublicMetadata, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<PublicMetadata>::deserialize(deserializer)?.unwrap_or_default())
}

/// ClerkClient
///
/// Calls the identity provider's backend API (`GET {api_url}/users/{id}`) with the secret
/// key as a bearer token.
#[derive(Clone)]
pub struct ClerkClient {
    http: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl ClerkClient {
    pub fn new(api_url: &str, secret_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// `{api_url}/users/{user_id}` with the id percent-encoded as a single path segment.
    pub fn user_url(&self, user_id: &str) -> Result<reqwest::Url, IdentityError> {
        let mut url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| IdentityError::Unavailable(format!("invalid CLERK_API_URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| IdentityError::Unavailable("CLERK_API_URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("users")
            .push(user_id);
        Ok(url)
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn role_of(&self, user_id: &str) -> Result<Role, IdentityError> {
        let url = self.user_url(user_id)?;

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Status {
                status: response.status(),
                user_id: user_id.to_string(),
            });
        }

        let user = response.json::<ProviderUser>().await?;
        let claim = user.public_metadata.role_claim();
        tracing::debug!(user_id, role = ?claim, "resolved role claim");
        Ok(Role::from_claim(claim))
    }
}

// --- Mock Implementation (For Tests) ---

/// MockIdentityProvider
///
/// Answers role lookups from a fixed map. Unknown users resolve to `Role::Standard`. Every
/// lookup increments `lookups`.
#[derive(Default)]
pub struct MockIdentityProvider {
    roles: HashMap<String, Role>,
    lookups: AtomicUsize,
    /// When true, every lookup fails as if the provider were down.
    pub should_fail: bool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_role(mut self, user_id: &str, role: Role) -> Self {
        self.roles.insert(user_id.to_string(), role);
        self
    }

    /// Number of role lookups made so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn role_of(&self, user_id: &str) -> Result<Role, IdentityError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(IdentityError::Unavailable(
                "Mock identity error: simulation requested".to_string(),
            ));
        }
        Ok(self.roles.get(user_id).copied().unwrap_or(Role::Standard))
    }
}
