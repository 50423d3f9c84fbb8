//! Registration webhook.
//!
//! Receives signed user events from the identity provider and mirrors newly created users
//! into the `users` table so the admin console can look them up by email.
//!
//! Signatures follow the Svix scheme: HMAC-SHA256 over `"{id}.{timestamp}.{body}"`, keyed
//! with the base64 part of the `whsec_...` secret, sent as space-separated `v1,<base64>`
//! entries in the `svix-signature` header.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::MessageResponse,
};

pub const ID_HEADER: &str = "svix-id";
pub const TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SIGNATURE_HEADER: &str = "svix-signature";

/// Maximum clock skew accepted between the sender's timestamp and now, in seconds.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";
const USER_CREATED: &str = "user.created";

type HmacSha256 = Hmac<Sha256>;

/// Provider event envelope (partial - only fields we need).
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CreatedUser {
    pub id: String,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
}

#[derive(Debug, Deserialize)]
pub struct EmailAddress {
    pub id: String,
    pub email_address: String,
}

impl CreatedUser {
    /// The primary address, or the first one when no primary is flagged.
    pub fn primary_email(&self) -> Option<&str> {
        let primary = self
            .primary_email_address_id
            .as_deref()
            .and_then(|id| self.email_addresses.iter().find(|e| e.id == id));

        primary
            .or_else(|| self.email_addresses.first())
            .map(|e| e.email_address.as_str())
    }
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret))
        .ok()
}

/// MAC over `"{msg_id}.{timestamp}.{payload}"`.
fn signed_content_mac(key: &[u8], msg_id: &str, timestamp: &str, payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(msg_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

/// Computes the base64 `v1` signature for a payload.
pub fn sign(secret: &str, msg_id: &str, timestamp: &str, payload: &[u8]) -> Option<String> {
    let key = decode_secret(secret)?;
    let mac = signed_content_mac(&key, msg_id, timestamp, payload)?;
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// verify_signature
///
/// Checks the timestamp window and that at least one `v1` entry of the signature header
/// matches. Comparison of the decoded MAC is constant time.
pub fn verify_signature(
    secret: &str,
    headers: &HeaderMap,
    payload: &[u8],
    now_secs: i64,
) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let (Some(msg_id), Some(timestamp), Some(signatures)) = (
        header(ID_HEADER),
        header(TIMESTAMP_HEADER),
        header(SIGNATURE_HEADER),
    ) else {
        return false;
    };

    let Ok(sent_at) = timestamp.parse::<i64>() else {
        return false;
    };
    if now_secs.abs_diff(sent_at) > TIMESTAMP_TOLERANCE_SECS.unsigned_abs() {
        return false;
    }

    let Some(key) = decode_secret(secret) else {
        return false;
    };

    signatures
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .filter_map(|sig| STANDARD.decode(sig).ok())
        .any(|expected| {
            signed_content_mac(&key, msg_id, timestamp, payload)
                .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
        })
}

/// register_user
///
/// [Public Route] Verifies the event signature and, for `user.created`, upserts the user
/// with their primary email. Other event types are acknowledged and ignored.
#[utoipa::path(
    post,
    path = "/api/webhook/register",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Processed", body = MessageResponse),
        (status = 400, description = "Bad signature or payload"),
        (status = 500, description = "Webhook secret missing or store failure")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<MessageResponse>> {
    let secret = state
        .config
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Internal("WEBHOOK_SECRET is not configured".to_string()))?;

    if !verify_signature(secret, &headers, &body, Utc::now().timestamp()) {
        tracing::warn!("webhook signature validation failed");
        return Err(AppError::BadRequest("Invalid webhook signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Invalid webhook payload".to_string()))?;

    if event.event_type != USER_CREATED {
        tracing::debug!(event_type = %event.event_type, "ignoring webhook event");
        return Ok(Json(MessageResponse::new("Event ignored")));
    }

    let created: CreatedUser = serde_json::from_value(event.data)
        .map_err(|_| AppError::BadRequest("Invalid webhook payload".to_string()))?;
    let email = created
        .primary_email()
        .ok_or_else(|| AppError::BadRequest("No email address on user".to_string()))?;

    let user = state.repo.upsert_user(&created.id, email).await?;
    tracing::info!(user_id = %user.id, email = %user.email, "user registered from webhook");

    Ok(Json(MessageResponse::new("User registered")))
}
