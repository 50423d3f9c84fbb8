use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult},
    identity::IdentityState,
};

/// Cookie carrying the session JWT for browser navigations.
pub const SESSION_COOKIE: &str = "__session";

/// Header accepted as the caller's identity in `Env::Local` only.
pub const LOCAL_USER_HEADER: &str = "x-user-id";

/// Value of the role claim that grants admin access.
pub const ADMIN_ROLE: &str = "admin";

/// Role
///
/// The caller's privilege, resolved once per request from the provider's role claim.
/// Anything other than the exact string `"admin"` (including no claim) is `Standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Standard,
}

impl Role {
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some(ADMIN_ROLE) => Role::Admin,
            _ => Role::Standard,
        }
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

/// Claims
///
/// Payload of a session JWT issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the provider's user id, e.g. `user_2NNEqL2nrIRdJ194ndJqAHwEfxC`.
    pub sub: String,
    /// Expiration Time (exp).
    pub exp: usize,
    /// Issued At (iat).
    #[serde(default)]
    pub iat: usize,
}

/// session_token
///
/// Pulls the raw session token from `Authorization: Bearer ...`, falling back to the session
/// cookie set by the provider's frontend SDK.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Builds the key and validation rules for the configured signing scheme.
fn verifier(config: &AppConfig) -> Option<(DecodingKey, Validation)> {
    match &config.jwt_public_key {
        Some(pem) => match DecodingKey::from_rsa_pem(pem.as_bytes()) {
            Ok(key) => Some((key, Validation::new(Algorithm::RS256))),
            Err(e) => {
                tracing::error!("invalid SESSION_JWT_PUBLIC_KEY: {:?}", e);
                None
            }
        },
        None => Some((
            DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            Validation::default(),
        )),
    }
}

/// resolve_session
///
/// Returns the caller's user id, or `None` for an anonymous request. A missing, malformed,
/// expired or badly signed token is treated as anonymous.
pub fn resolve_session(headers: &HeaderMap, config: &AppConfig) -> Option<String> {
    // Local development bypass: trust the header as-is.
    if config.env == Env::Local {
        if let Some(user_id) = headers
            .get(LOCAL_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            return Some(user_id.to_string());
        }
    }

    let token = session_token(headers)?;
    let (key, mut validation) = verifier(config)?;
    validation.validate_exp = true;

    match decode::<Claims>(&token, &key, &validation) {
        Ok(data) => Some(data.claims.sub),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("session token expired"),
                _ => tracing::debug!("session token rejected: {:?}", e),
            }
            None
        }
    }
}

/// Caller Extractor Result
///
/// The resolved identity of a request to an admin operation.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    /// Admin-only gate used by every admin handler before it touches the repository.
    pub fn require_admin(&self) -> AppResult<()> {
        if self.role.is_admin() {
            Ok(())
        } else {
            tracing::warn!(user_id = %self.user_id, "non-admin caller rejected");
            Err(AppError::Unauthorized)
        }
    }
}

/// Caller Extractor Implementation
///
/// 1. Reuses the `Caller` already resolved by the route guard, if any.
/// 2. Otherwise resolves the session identity from the request headers and looks up the
///    caller's role with the identity provider.
///
/// Rejection: 401 when no identity is present, 500 when the provider lookup fails.
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>() {
            return Ok(caller.clone());
        }

        let identity = IdentityState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let user_id = resolve_session(&parts.headers, &config).ok_or(AppError::Unauthorized)?;
        let role = identity.role_of(&user_id).await?;

        Ok(Caller { user_id, role })
    }
}
