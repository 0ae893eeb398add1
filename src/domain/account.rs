//! User accounts, auth tokens, password resets and API keys.
//!
//! Auth tokens are opaque 40-character hex strings, one per user, sent as
//! `Authorization: AuthToken <key>`. Password-reset tokens and API keys are
//! prefixed keys of the form `<prefix>.<secret>`; only the prefix and an
//! argon2 hash of the whole key are stored.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::domain::error::ScreenerError;
use crate::ports::account_port::AccountPort;
use crate::ports::mail_port::MailPort;

pub const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_BYTES: usize = 20;
const PREFIX_BYTES: usize = 4;
const SECRET_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    pub key: String,
    pub user_id: Uuid,
    pub created: DateTime<Utc>,
}

/// Stored half of a prefixed key (password reset token or API key).
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub id: Uuid,
    pub prefix: String,
    pub hashed_key: String,
    pub name: String,
    pub user_id: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub revoked: bool,
}

impl KeyRecord {
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= now)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.has_expired(now)
    }

    /// Whether `key` is the key this record was issued for.
    pub fn verifies(&self, key: &str) -> bool {
        PasswordHash::new(&self.hashed_key)
            .map(|parsed| key_hasher().verify_password(key.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }
}

/// A freshly issued prefixed key. `key` is shown once and never stored.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub key: String,
    pub record: KeyRecord,
}

fn password_hasher() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

// keys are random, so a light parameter set is enough
fn key_hasher() -> Argon2<'static> {
    let params = Params::new(Params::MIN_M_COST * 4, 1, 1, None).unwrap_or_default();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

fn hash_with(hasher: &Argon2<'_>, secret: &str) -> Result<String, ScreenerError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ScreenerError::PasswordHash {
            reason: e.to_string(),
        })
}

pub fn hash_password(password: &str) -> Result<String, ScreenerError> {
    hash_with(&password_hasher(), password)
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = match PasswordHash::new(password_hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn validate_password(password: &str) -> Result<(), ScreenerError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ScreenerError::validation(
            "password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn generate_token_key() -> String {
    random_hex(TOKEN_BYTES)
}

/// Split `<prefix>.<secret>`; `None` when the shape is wrong.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let (prefix, secret) = key.split_once('.')?;
    if prefix.is_empty() || secret.is_empty() {
        return None;
    }
    Some((prefix, secret))
}

pub fn issue_key(
    name: &str,
    user_id: Option<Uuid>,
    expiry_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<IssuedKey, ScreenerError> {
    let prefix = random_hex(PREFIX_BYTES);
    let key = format!("{prefix}.{}", random_hex(SECRET_BYTES));
    let hashed_key = hash_with(&key_hasher(), &key)?;
    Ok(IssuedKey {
        key,
        record: KeyRecord {
            id: Uuid::new_v4(),
            prefix,
            hashed_key,
            name: name.to_string(),
            user_id,
            created: now,
            expiry_date,
            revoked: false,
        },
    })
}

pub fn create_user(
    accounts: &dyn AccountPort,
    username: &str,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<User, ScreenerError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ScreenerError::validation("username", "username must not be empty"));
    }
    validate_password(password)?;
    if accounts.find_user_by_username(username)?.is_some() {
        return Err(ScreenerError::Conflict {
            reason: format!("user '{username}' already exists"),
        });
    }
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.trim().to_string(),
        password_hash: hash_password(password)?,
        is_active: true,
        date_joined: now,
    };
    accounts.insert_user(&user)?;
    tracing::info!(user_id = %user.id, username = %user.username, "user created");
    Ok(user)
}

/// Check credentials and return the user's token, creating it on first login.
pub fn authenticate(
    accounts: &dyn AccountPort,
    username: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<(User, AuthToken), ScreenerError> {
    let rejected = || ScreenerError::Unauthorized {
        reason: "Unable to log in with provided credentials.".to_string(),
    };
    let user = accounts
        .find_user_by_username(username)?
        .filter(|user| user.is_active)
        .ok_or_else(rejected)?;
    if !verify_password(password, &user.password_hash) {
        return Err(rejected());
    }

    let token = match accounts.find_auth_token(user.id)? {
        Some(token) => token,
        None => {
            let token = AuthToken {
                key: generate_token_key(),
                user_id: user.id,
                created: now,
            };
            accounts.insert_auth_token(&token)?;
            token
        }
    };
    Ok((user, token))
}

/// Active user owning `key`, if any.
pub fn user_for_token(accounts: &dyn AccountPort, key: &str) -> Result<Option<User>, ScreenerError> {
    Ok(accounts
        .find_user_by_auth_token(key)?
        .filter(|user| user.is_active))
}

/// Revoke the user's token, logging them out on every device.
pub fn logout(accounts: &dyn AccountPort, user_id: Uuid) -> Result<User, ScreenerError> {
    let user = accounts.find_user(user_id)?.ok_or(ScreenerError::NotFound {
        entity: "user",
        id: user_id.to_string(),
    })?;
    if !accounts.delete_auth_token(user_id)? {
        return Err(ScreenerError::validation(
            "user_id",
            "Only authenticated users can be logged out!",
        ));
    }
    Ok(user)
}

/// Issue a reset token for `requester` and mail it as a link under `link_base`.
pub fn request_password_reset(
    accounts: &dyn AccountPort,
    mailer: &dyn MailPort,
    requester: &User,
    user_id: Uuid,
    validity: Duration,
    link_base: &str,
    now: DateTime<Utc>,
) -> Result<(), ScreenerError> {
    if requester.id != user_id {
        return Err(ScreenerError::Forbidden {
            reason: "You are not authorized to perform this action!".to_string(),
        });
    }

    let mut pending = false;
    for token in accounts.reset_tokens_for_user(user_id)? {
        if token.is_usable(now) {
            pending = true;
        } else {
            accounts.delete_reset_token(token.id)?;
        }
    }
    if pending {
        return Err(ScreenerError::Conflict {
            reason: "A password reset request has already been made for this account!"
                .to_string(),
        });
    }

    let issued = issue_key(
        &format!("Password reset token for {}", requester.email),
        Some(user_id),
        Some(now + validity),
        now,
    )?;
    accounts.insert_reset_token(&issued.record)?;

    let link = format!(
        "{}/api/v1/accounts/reset-password/?token={}",
        link_base.trim_end_matches('/'),
        issued.key
    );
    if let Err(e) = mailer.send_password_reset(requester, &link) {
        tracing::error!(user_id = %user_id, error = %e, "password reset mail failed");
        accounts.delete_reset_token(issued.record.id)?;
        return Err(e);
    }
    Ok(())
}

/// The stored token for `key` when it exists, matches and is still usable.
pub fn check_reset_token(
    accounts: &dyn AccountPort,
    key: &str,
    now: DateTime<Utc>,
) -> Result<Option<KeyRecord>, ScreenerError> {
    let Some((prefix, _)) = split_key(key) else {
        return Ok(None);
    };
    Ok(accounts
        .find_reset_token(prefix)?
        .filter(|record| record.is_usable(now) && record.verifies(key)))
}

/// Set a new password with a reset token. Consumes every reset token of the
/// user and revokes their auth token.
pub fn reset_password(
    accounts: &dyn AccountPort,
    key: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> Result<User, ScreenerError> {
    let invalid = || ScreenerError::validation("token", "Invalid or expired password reset token.");
    let record = check_reset_token(accounts, key, now)?.ok_or_else(invalid)?;
    let user_id = record.user_id.ok_or_else(invalid)?;
    validate_password(new_password)?;

    let mut user = accounts.find_user(user_id)?.ok_or(ScreenerError::NotFound {
        entity: "user",
        id: user_id.to_string(),
    })?;
    user.password_hash = hash_password(new_password)?;
    accounts.update_password_hash(user.id, &user.password_hash)?;
    accounts.delete_reset_tokens_for_user(user.id)?;
    accounts.delete_auth_token(user.id)?;
    tracing::info!(user_id = %user.id, "password reset");
    Ok(user)
}

/// Issue a new API key. The returned key is the only copy.
pub fn create_api_key(
    accounts: &dyn AccountPort,
    name: &str,
    expiry_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<String, ScreenerError> {
    if name.trim().is_empty() {
        return Err(ScreenerError::validation("name", "name must not be empty"));
    }
    let issued = issue_key(name.trim(), None, expiry_date, now)?;
    accounts.insert_api_key(&issued.record)?;
    tracing::info!(prefix = %issued.record.prefix, name = %issued.record.name, "API key created");
    Ok(issued.key)
}

pub fn verify_api_key(
    accounts: &dyn AccountPort,
    key: &str,
    now: DateTime<Utc>,
) -> Result<bool, ScreenerError> {
    let Some((prefix, _)) = split_key(key) else {
        return Ok(false);
    };
    Ok(accounts
        .find_api_key(prefix)?
        .is_some_and(|record| record.is_usable(now) && record.verifies(key)))
}
