#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use ema_screener::adapters::broadcast_notifier::BroadcastNotifier;
use ema_screener::adapters::log_mailer::LogMailer;
use ema_screener::adapters::sqlite_adapter::SqliteAdapter;
use ema_screener::adapters::web::{AppState, build_router};
use ema_screener::domain::account::{self, User};
use ema_screener::domain::config_validation::ServerSettings;
use ema_screener::domain::currency::{Currency, CurrencyCategory, NewCurrency};
use ema_screener::domain::ema_record::{EmaRecord, NewEmaRecord};
use ema_screener::domain::error::ScreenerError;
use ema_screener::domain::watch::WatchFilter;
use ema_screener::ports::config_port::ConfigPort;
use ema_screener::ports::currency_port::CurrencyPort;
use ema_screener::ports::mail_port::MailPort;
use ema_screener::ports::record_port::RecordPort;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "testpass123";

pub struct MockConfigPort {
    values: HashMap<(String, String), String>,
}

impl MockConfigPort {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
        .with("database", "path", ":memory:")
        .with("web", "public_url", "http://screener.test")
        .with("web", "page_size", "2")
    }

    pub fn with(mut self, section: &str, key: &str, value: &str) -> Self {
        self.values
            .insert((section.to_string(), key.to_string()), value.to_string());
        self
    }
}

impl ConfigPort for MockConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

pub struct FailingMailer;

impl MailPort for FailingMailer {
    fn send_password_reset(&self, _user: &User, _reset_link: &str) -> Result<(), ScreenerError> {
        Err(ScreenerError::Mail {
            reason: "smtp unreachable".to_string(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<SqliteAdapter>,
    pub notifier: Arc<BroadcastNotifier>,
    pub mailer: Arc<LogMailer>,
    pub api_key: String,
}

pub fn test_app() -> TestApp {
    build_app(None)
}

pub fn test_app_with_mailer(mailer: Arc<dyn MailPort + Send + Sync>) -> TestApp {
    build_app(Some(mailer))
}

fn build_app(mailer: Option<Arc<dyn MailPort + Send + Sync>>) -> TestApp {
    let settings = ServerSettings::from_config(&MockConfigPort::new()).unwrap();
    let store = Arc::new(SqliteAdapter::in_memory().unwrap());
    store.initialize_schema().unwrap();
    let api_key = account::create_api_key(store.as_ref(), "tests", None, Utc::now()).unwrap();

    let notifier = Arc::new(BroadcastNotifier::new(16));
    let log_mailer = Arc::new(LogMailer::new());
    let state = AppState {
        records: store.clone(),
        currencies: store.clone(),
        accounts: store.clone(),
        notifier: notifier.clone(),
        mailer: mailer.unwrap_or_else(|| log_mailer.clone() as Arc<dyn MailPort + Send + Sync>),
        settings,
    };

    TestApp {
        router: build_router(state),
        store,
        notifier,
        mailer: log_mailer,
        api_key,
    }
}

impl TestApp {
    pub fn currency(&self, symbol: &str, name: &str) -> Currency {
        self.store
            .create_currency(NewCurrency {
                name: name.to_string(),
                symbol: symbol.to_string(),
                exchange: "Binance".to_string(),
                category: CurrencyCategory::A,
                subcategory: "Layer 1".to_string(),
                current_price: None,
            })
            .unwrap()
    }

    pub fn record(&self, currency: &Currency, ema20: f64, trend: i32, flags: WatchFilter) -> EmaRecord {
        self.store
            .insert_record(currency, new_record(&currency.symbol, ema20, trend, flags))
            .unwrap()
    }

    pub fn user(&self, username: &str) -> User {
        account::create_user(
            self.store.as_ref(),
            username,
            &format!("{username}@example.com"),
            TEST_PASSWORD,
            Utc::now(),
        )
        .unwrap()
    }

    pub fn token_for(&self, username: &str) -> String {
        let (_, token) =
            account::authenticate(self.store.as_ref(), username, TEST_PASSWORD, Utc::now()).unwrap();
        token.key
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .uri(uri)
                .header("X-API-KEY", &self.api_key)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("X-API-KEY", &self.api_key)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("AuthToken {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn new_record(symbol: &str, ema20: f64, trend: i32, flags: WatchFilter) -> NewEmaRecord {
    NewEmaRecord {
        currency_symbol: symbol.to_string(),
        timeframe: "1:00:00".to_string(),
        close: 100.0,
        ema20,
        ema50: 2.0,
        ema100: 3.0,
        ema200: 4.0,
        trend,
        monhigh: 0.0,
        monlow: 0.0,
        monmid: 0.0,
        twenty_greater_than_fifty: flags.twenty_greater_than_fifty,
        fifty_greater_than_hundred: flags.fifty_greater_than_hundred,
        hundred_greater_than_twohundred: flags.hundred_greater_than_twohundred,
        close_greater_than_hundred: flags.close_greater_than_hundred,
    }
}
