//! HTTP request handlers for the web adapter.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::domain::account;
use crate::domain::currency::NewCurrency;
use crate::domain::ema_record::{EmaRecord, EmaRecordPatch, NewEmaRecord};
use crate::domain::error::ScreenerError;
use crate::domain::filter::QueryPredicate;
use crate::domain::notification::{Notification, publish_record_event};
use crate::domain::watch::internal_to_external;
use crate::ports::record_port::Page;

use super::auth::{ApiAccess, Authenticated};
use super::{AppState, WebError};

type Params = Query<Vec<(String, String)>>;

fn success(message: impl Into<String>, data: Option<Value>) -> Json<Value> {
    let message = message.into();
    Json(match data {
        Some(data) => json!({ "status": "success", "message": message, "data": data }),
        None => json!({ "status": "success", "message": message }),
    })
}

/// `limit`/`offset` from the query string. Bad or missing values fall back to
/// the configured page size and the first row.
fn page(params: &[(String, String)], state: &AppState) -> Page {
    let get = |key: &str| {
        params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
    };
    let limit = get("limit")
        .filter(|limit| *limit > 0)
        .unwrap_or(state.settings.page_size)
        .min(state.settings.max_page_size);
    Page {
        limit,
        offset: get("offset").unwrap_or(0),
    }
}

fn listing(count: usize, page: Page, results: Vec<Value>) -> Json<Value> {
    Json(json!({
        "count": count,
        "limit": page.limit,
        "offset": page.offset,
        "results": results,
    }))
}

fn record_json(record: &EmaRecord) -> Value {
    Value::Object(internal_to_external(&record.representation()))
}

fn publish(state: &AppState, notification: &Notification) {
    publish_record_event(
        state.notifier.as_ref(),
        &state.settings.notification_group,
        notification,
    );
}

pub async fn health() -> Json<Value> {
    Json(json!({ "message": "Server is !down." }))
}

pub async fn not_found() -> WebError {
    WebError::not_found("Not found.")
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, WebError> {
    let Json(request) = payload?;
    let (user, token) = account::authenticate(
        state.accounts.as_ref(),
        &request.username,
        &request.password,
        Utc::now(),
    )
    .map_err(|e| match e {
        // credentials problems are a bad request, not a missing token
        ScreenerError::Unauthorized { reason } => WebError::bad_request(reason.clone())
            .with_error("non_field_errors", reason),
        other => other.into(),
    })?;
    tracing::info!(user_id = %user.id, "user authenticated");
    Ok(success(
        format!("{} was authenticated successfully", user.username),
        Some(json!({ "token": token.key, "user_id": user.id })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UserIdRequest {
    pub user_id: Uuid,
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Authenticated(requester): Authenticated,
    payload: Result<Json<UserIdRequest>, JsonRejection>,
) -> Result<Json<Value>, WebError> {
    let Json(request) = payload?;
    if requester.id != request.user_id {
        return Err(WebError::forbidden(
            "You are not authorized to perform this action!",
        ));
    }
    let user = account::logout(state.accounts.as_ref(), request.user_id)?;
    tracing::info!(user_id = %user.id, "user logged out");
    Ok(success(
        format!("{} was logged out successfully!", user.username),
        None,
    ))
}

pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Authenticated(requester): Authenticated,
    payload: Result<Json<UserIdRequest>, JsonRejection>,
) -> Result<Json<Value>, WebError> {
    let Json(request) = payload?;
    account::request_password_reset(
        state.accounts.as_ref(),
        state.mailer.as_ref(),
        &requester,
        request.user_id,
        state.settings.reset_token_validity,
        &state.settings.public_url,
        Utc::now(),
    )?;
    Ok(success(
        format!(
            "Request processed successfully. An email has been sent to {}.",
            requester.email
        ),
        None,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ResetTokenRequest {
    pub token: String,
}

pub async fn validate_reset_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResetTokenRequest>, JsonRejection>,
) -> Result<Json<Value>, WebError> {
    let Json(request) = payload?;
    match account::check_reset_token(state.accounts.as_ref(), &request.token, Utc::now())? {
        Some(_) => Ok(success(
            "Password reset token is valid.",
            Some(json!({ "valid": true })),
        )),
        None => Err(WebError::bad_request("Invalid or expired password reset token.")
            .with_error("token", "Invalid or expired password reset token.")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<Value>, WebError> {
    let Json(request) = payload?;
    let user = account::reset_password(
        state.accounts.as_ref(),
        &request.token,
        &request.new_password,
        Utc::now(),
    )?;
    Ok(success(
        format!("Password for {} was reset successfully!", user.username),
        None,
    ))
}

pub async fn list_currencies(
    State(state): State<Arc<AppState>>,
    _access: ApiAccess,
    Query(params): Params,
) -> Result<Json<Value>, WebError> {
    let search = params
        .iter()
        .rev()
        .find(|(k, _)| k == "search")
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty());
    let page = page(&params, &state);
    let currencies = state.currencies.list_currencies(search)?;
    let count = currencies.len();
    let results = currencies
        .iter()
        .skip(page.offset)
        .take(page.limit)
        .map(|c| c.representation())
        .collect();
    Ok(listing(count, page, results))
}

pub async fn create_currency(
    State(state): State<Arc<AppState>>,
    _access: ApiAccess,
    payload: Result<Json<NewCurrency>, JsonRejection>,
) -> Result<Response, WebError> {
    let Json(new) = payload?;
    new.validate()?;
    let currency = state.currencies.create_currency(new)?;
    tracing::info!(currency_id = %currency.id, symbol = %currency.symbol, "currency created");
    Ok((StatusCode::CREATED, Json(currency.representation())).into_response())
}

pub async fn delete_currency(
    State(state): State<Arc<AppState>>,
    _access: ApiAccess,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, WebError> {
    if !state.currencies.delete_currency(id)? {
        return Err(WebError::not_found("No Currency matches the given query."));
    }
    tracing::info!(currency_id = %id, "currency deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    _access: ApiAccess,
    Query(params): Params,
) -> Result<Json<Value>, WebError> {
    let predicate = QueryPredicate::from_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .map_err(|errors| {
            tracing::warn!(%errors, "rejected record filter");
            ScreenerError::from(errors)
        })?;
    let page = page(&params, &state);
    let found = state.records.list_records(&predicate, page)?;
    let results = found.records.iter().map(record_json).collect();
    Ok(listing(found.count, page, results))
}

pub async fn create_record(
    State(state): State<Arc<AppState>>,
    _access: ApiAccess,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Response, WebError> {
    let Json(body) = payload?;
    let new = NewEmaRecord::from_json(&body)?;
    new.validate()?;
    let currency = state
        .currencies
        .find_currency_by_symbol(&new.currency_symbol)?
        .ok_or_else(|| {
            ScreenerError::validation(
                "currency_symbol",
                format!("Currency with symbol '{}' does not exist.", new.currency_symbol.trim()),
            )
        })?;
    let record = state.records.insert_record(&currency, new)?;
    tracing::info!(record_id = %record.id, symbol = %currency.symbol, "record created");
    publish(&state, &Notification::created(&record));
    Ok((StatusCode::CREATED, Json(record_json(&record))).into_response())
}

pub async fn update_record(
    State(state): State<Arc<AppState>>,
    _access: ApiAccess,
    Path(id): Path<Uuid>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<Value>, WebError> {
    let Json(body) = payload?;
    let patch = EmaRecordPatch::from_json(&body)?;
    let update = state
        .records
        .update_record(id, &patch, Utc::now())?
        .ok_or_else(|| WebError::not_found("No EMARecord matches the given query."))?;
    if let Some(notification) = Notification::updated(&update.before, &update.after) {
        publish(&state, &notification);
    }
    Ok(Json(record_json(&update.after)))
}
