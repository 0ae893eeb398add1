//! Request authentication extractors.
//!
//! Data endpoints accept either an API key or an auth token. API keys are
//! read from the `X-API-KEY` header, an `Authorization: Api-Key <key>`
//! header or the `api_key` query parameter. Auth tokens come in as
//! `Authorization: AuthToken <key>`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;

use crate::domain::account::{self, User};

use super::{AppState, WebError};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY: &str = "api_key";
pub const API_KEY_KEYWORD: &str = "Api-Key";
pub const TOKEN_KEYWORD: &str = "AuthToken";

const ACCESS_DENIED: &str = "Unauthorized! Ensure a valid API key is included in your request's header or url query params.";

/// Value of `Authorization: <keyword> <credential>`.
fn authorization(headers: &HeaderMap, keyword: &str) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, credential) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let credential = credential.trim();
    (!credential.is_empty()).then(|| credential.to_string())
}

fn api_key(parts: &Parts) -> Option<String> {
    if let Some(key) = parts
        .headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(key.to_string());
    }
    if let Some(key) = authorization(&parts.headers, API_KEY_KEYWORD) {
        return Some(key);
    }
    Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(mut params)| params.remove(API_KEY_QUERY))
        .filter(|key| !key.trim().is_empty())
}

fn token_user(parts: &Parts, state: &AppState) -> Result<Option<User>, WebError> {
    match authorization(&parts.headers, TOKEN_KEYWORD) {
        Some(key) => Ok(account::user_for_token(state.accounts.as_ref(), &key)?),
        None => Ok(None),
    }
}

/// A user signed in with an auth token.
pub struct Authenticated(pub User);

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if authorization(&parts.headers, TOKEN_KEYWORD).is_none() {
            return Err(WebError::unauthorized(
                "Authentication credentials were not provided.",
            ));
        }
        token_user(parts, state)?
            .map(Authenticated)
            .ok_or_else(|| WebError::unauthorized("Invalid token."))
    }
}

/// Permission to read and write screener data.
#[derive(Debug)]
pub enum ApiAccess {
    ApiKey,
    User(User),
}

impl FromRequestParts<Arc<AppState>> for ApiAccess {
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(key) = api_key(parts) {
            if account::verify_api_key(state.accounts.as_ref(), &key, Utc::now())? {
                return Ok(ApiAccess::ApiKey);
            }
        }
        if let Some(user) = token_user(parts, state)? {
            return Ok(ApiAccess::User(user));
        }
        tracing::debug!(path = %parts.uri.path(), "request without valid credentials");
        Err(WebError::forbidden(ACCESS_DENIED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, HeaderValue::from_str(value).unwrap());
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn authorization_matches_keyword() {
        let p = parts("/", &[("authorization", "AuthToken abc123")]);
        assert_eq!(authorization(&p.headers, TOKEN_KEYWORD), Some("abc123".into()));
        assert_eq!(authorization(&p.headers, API_KEY_KEYWORD), None);
    }

    #[test]
    fn api_key_sources() {
        assert_eq!(api_key(&parts("/", &[("X-API-KEY", "a.b")])), Some("a.b".into()));
        assert_eq!(
            api_key(&parts("/", &[("authorization", "Api-Key c.d")])),
            Some("c.d".into())
        );
        assert_eq!(api_key(&parts("/x?api_key=e.f&watch=A", &[])), Some("e.f".into()));
        assert_eq!(api_key(&parts("/x?watch=A", &[])), None);
        assert_eq!(api_key(&parts("/", &[("x-api-key", " ")])), None);
    }
}
