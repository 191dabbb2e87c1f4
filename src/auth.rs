use crate::error::AppError;
use crate::schemas::UserId;
use crate::settings;
use actix_web::{http::header::HeaderValue, HttpRequest};
use chrono::{DateTime, Utc};
use hmac::{digest::InvalidLength, Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::ParseIntError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq)]
pub enum AuthorizationLevel {
    Service,
    Member(UserId),
}

impl AuthorizationLevel {
    /// The user acting on its own behalf, refusing service callers.
    pub fn member(&self) -> Result<&str, AppError> {
        match self {
            AuthorizationLevel::Member(id) => Ok(id.as_str()),
            AuthorizationLevel::Service => Err(AppError::Forbidden(
                "this action needs a member signature".to_string(),
            )),
        }
    }
}

/// Signed identity sent by clients in the `Authorization` header.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SignedAuth {
    pub user_id: UserId,
    pub issued_at: i64,
    pub hash: String,
}

impl SignedAuth {
    /// Signs `user_id` at `issued_at` with `secret`.
    pub fn sign(
        user_id: &str,
        issued_at: DateTime<Utc>,
        secret: &str,
    ) -> Result<Self, InvalidLength> {
        let issued_at = issued_at.timestamp();
        let hash: String = new_mac(secret, user_id, issued_at)?
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Ok(Self {
            user_id: user_id.to_string(),
            issued_at,
            hash,
        })
    }
}

pub fn check_authorization_level(
    request: &HttpRequest,
    auth: &settings::Auth,
    now: DateTime<Utc>,
) -> Option<AuthorizationLevel> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    if authorization == auth.service_key {
        return Some(AuthorizationLevel::Service);
    }
    let signed: SignedAuth = serde_json::from_str(authorization).ok()?;
    if now.timestamp().abs_diff(signed.issued_at) > auth.max_age_secs.unsigned_abs() {
        tracing::debug!(user = %signed.user_id, "expired signature");
        return None;
    }
    let hash = signed
        .hash
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()?;
    new_mac(&auth.secret, &signed.user_id, signed.issued_at)
        .ok()?
        .verify_slice(&hash)
        .ok()?;
    Some(AuthorizationLevel::Member(signed.user_id))
}

/// Same as [`check_authorization_level`], failing with
/// [`AppError::Unauthorized`].
pub fn authorize(request: &HttpRequest, auth: &settings::Auth) -> Result<AuthorizationLevel, AppError> {
    check_authorization_level(request, auth, Utc::now()).ok_or(AppError::Unauthorized)
}

fn new_mac(secret: &str, user_id: &str, issued_at: i64) -> Result<HmacSha256, InvalidLength> {
    let hash_content = format!("issued_at={issued_at}\nuser_id={user_id}");
    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(secret.as_bytes());
    let secret_hash = sha256_hasher.finalize();

    let mut hmac_hasher = <HmacSha256 as Mac>::new_from_slice(&secret_hash)?;
    hmac_hasher.update(hash_content.as_bytes());
    Ok(hmac_hasher)
}
