//! SQLite storage adapter for currencies, EMA records and accounts.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params, params_from_iter};
use uuid::Uuid;

use crate::domain::account::{AuthToken, KeyRecord, User};
use crate::domain::currency::{Currency, CurrencyCategory, NewCurrency};
use crate::domain::ema_record::{EmaRecord, EmaRecordPatch, NewEmaRecord};
use crate::domain::error::ScreenerError;
use crate::domain::filter::{Clause, QueryPredicate};
use crate::ports::account_port::AccountPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::currency_port::CurrencyPort;
use crate::ports::record_port::{Page, RecordPage, RecordPort, RecordUpdate};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS currencies (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        symbol TEXT NOT NULL UNIQUE COLLATE NOCASE,
        exchange TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL,
        subcategory TEXT NOT NULL DEFAULT '',
        current_price REAL,
        added_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS ema_records (
        id TEXT PRIMARY KEY,
        currency_id TEXT NOT NULL REFERENCES currencies(id) ON DELETE CASCADE,
        timeframe TEXT NOT NULL,
        close REAL NOT NULL,
        ema20 REAL NOT NULL,
        ema50 REAL NOT NULL,
        ema100 REAL NOT NULL,
        ema200 REAL NOT NULL,
        trend INTEGER NOT NULL,
        monhigh REAL NOT NULL DEFAULT 0,
        monlow REAL NOT NULL DEFAULT 0,
        monmid REAL NOT NULL DEFAULT 0,
        twenty_greater_than_fifty INTEGER NOT NULL,
        fifty_greater_than_hundred INTEGER NOT NULL,
        hundred_greater_than_twohundred INTEGER NOT NULL,
        close_greater_than_hundred INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_ema_records_timestamp ON ema_records(timestamp);
    CREATE INDEX IF NOT EXISTS idx_ema_records_currency ON ema_records(currency_id);
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL DEFAULT '',
        password_hash TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        date_joined TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS auth_tokens (
        key TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        created TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS password_reset_tokens (
        id TEXT PRIMARY KEY,
        prefix TEXT NOT NULL UNIQUE,
        hashed_key TEXT NOT NULL,
        name TEXT NOT NULL,
        user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
        created TEXT NOT NULL,
        expiry_date TEXT,
        revoked INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS api_keys (
        id TEXT PRIMARY KEY,
        prefix TEXT NOT NULL UNIQUE,
        hashed_key TEXT NOT NULL,
        name TEXT NOT NULL,
        user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
        created TEXT NOT NULL,
        expiry_date TEXT,
        revoked INTEGER NOT NULL DEFAULT 0
    );";

const CURRENCY_COLUMNS: &str =
    "c.id, c.name, c.symbol, c.exchange, c.category, c.subcategory, c.current_price, c.added_at, c.updated_at";

const RECORD_SELECT: &str = "SELECT
        c.id, c.name, c.symbol, c.exchange, c.category, c.subcategory, c.current_price, c.added_at, c.updated_at,
        r.id, r.timeframe, r.close, r.ema20, r.ema50, r.ema100, r.ema200, r.trend,
        r.monhigh, r.monlow, r.monmid,
        r.twenty_greater_than_fifty, r.fifty_greater_than_hundred,
        r.hundred_greater_than_twohundred, r.close_greater_than_hundred,
        r.timestamp, r.updated_at
    FROM ema_records r JOIN currencies c ON c.id = r.currency_id";

const USER_COLUMNS: &str = "id, username, email, password_hash, is_active, date_joined";

const KEY_COLUMNS: &str = "id, prefix, hashed_key, name, user_id, created, expiry_date, revoked";

const RESET_TOKENS: &str = "password_reset_tokens";
const API_KEYS: &str = "api_keys";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScreenerError> {
        let db_path =
            config
                .get_string("database", "path")
                .ok_or_else(|| ScreenerError::ConfigMissing {
                    section: "database".into(),
                    key: "path".into(),
                })?;
        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;
        Self::open(&db_path, pool_size)
    }

    pub fn open(db_path: &str, pool_size: u32) -> Result<Self, ScreenerError> {
        let manager = SqliteConnectionManager::file(db_path).with_init(enable_foreign_keys);
        Self::with_manager(manager, pool_size)
    }

    pub fn in_memory() -> Result<Self, ScreenerError> {
        let manager = SqliteConnectionManager::memory().with_init(enable_foreign_keys);
        Self::with_manager(manager, 1)
    }

    fn with_manager(
        manager: SqliteConnectionManager,
        pool_size: u32,
    ) -> Result<Self, ScreenerError> {
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| ScreenerError::Database {
                reason: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), ScreenerError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_error)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, ScreenerError> {
        self.pool.get().map_err(|e: r2d2::Error| ScreenerError::Database {
            reason: e.to_string(),
        })
    }

    fn find_key(&self, table: &str, prefix: &str) -> Result<Option<KeyRecord>, ScreenerError> {
        self.conn()?
            .query_row(
                &format!("SELECT {KEY_COLUMNS} FROM {table} WHERE prefix = ?1"),
                params![prefix],
                key_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn insert_key(&self, table: &str, record: &KeyRecord) -> Result<(), ScreenerError> {
        self.conn()?
            .execute(
                &format!("INSERT INTO {table} ({KEY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    record.id.to_string(),
                    record.prefix,
                    record.hashed_key,
                    record.name,
                    record.user_id.map(|id| id.to_string()),
                    timestamp(record.created),
                    record.expiry_date.map(timestamp),
                    record.revoked,
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }
}

fn enable_foreign_keys(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

fn query_error(e: rusqlite::Error) -> ScreenerError {
    ScreenerError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// Fixed-width RFC 3339 so that text order is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => time_at(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Reads the nine currency columns starting at `base`.
fn currency_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Currency> {
    let category: String = row.get(base + 4)?;
    let category = CurrencyCategory::parse(&category).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            base + 4,
            Type::Text,
            format!("unknown currency category '{category}'").into(),
        )
    })?;
    Ok(Currency {
        id: uuid_at(row, base)?,
        name: row.get(base + 1)?,
        symbol: row.get(base + 2)?,
        exchange: row.get(base + 3)?,
        category,
        subcategory: row.get(base + 5)?,
        current_price: row.get(base + 6)?,
        added_at: time_at(row, base + 7)?,
        updated_at: time_at(row, base + 8)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<EmaRecord> {
    Ok(EmaRecord {
        currency: currency_at(row, 0)?,
        id: uuid_at(row, 9)?,
        timeframe: row.get(10)?,
        close: row.get(11)?,
        ema20: row.get(12)?,
        ema50: row.get(13)?,
        ema100: row.get(14)?,
        ema200: row.get(15)?,
        trend: row.get(16)?,
        monhigh: row.get(17)?,
        monlow: row.get(18)?,
        monmid: row.get(19)?,
        twenty_greater_than_fifty: row.get(20)?,
        fifty_greater_than_hundred: row.get(21)?,
        hundred_greater_than_twohundred: row.get(22)?,
        close_greater_than_hundred: row.get(23)?,
        timestamp: time_at(row, 24)?,
        updated_at: time_at(row, 25)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_active: row.get(4)?,
        date_joined: time_at(row, 5)?,
    })
}

fn key_from_row(row: &Row<'_>) -> rusqlite::Result<KeyRecord> {
    let user_id = match row.get::<_, Option<String>>(4)? {
        Some(raw) => Some(Uuid::from_str(&raw).map_err(|e| conversion_error(4, e))?),
        None => None,
    };
    Ok(KeyRecord {
        id: uuid_at(row, 0)?,
        prefix: row.get(1)?,
        hashed_key: row.get(2)?,
        name: row.get(3)?,
        user_id,
        created: time_at(row, 5)?,
        expiry_date: optional_time_at(row, 6)?,
        revoked: row.get(7)?,
    })
}

/// SQL condition and bound values equivalent to `predicate`.
pub fn where_clause(predicate: &QueryPredicate) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();
    for clause in predicate.clauses() {
        match clause {
            Clause::Ema { window, value } => {
                conditions.push(format!("r.{} = ?", window.column()));
                values.push(Value::Real(*value));
            }
            Clause::Timeframe(timeframe) => {
                conditions.push("r.timeframe = ?".to_string());
                values.push(Value::Text(timeframe.clone()));
            }
            Clause::Trend(trend) => {
                conditions.push("r.trend = ?".to_string());
                values.push(Value::Integer(i64::from(*trend)));
            }
            Clause::Currency(name) => {
                conditions
                    .push("(c.symbol = ? COLLATE NOCASE OR c.name = ? COLLATE NOCASE)".to_string());
                values.push(Value::Text(name.clone()));
                values.push(Value::Text(name.clone()));
            }
            Clause::Watch(filters) if filters.is_empty() => conditions.push("0".to_string()),
            Clause::Watch(filters) => {
                let alternatives: Vec<String> = filters
                    .iter()
                    .map(|filter| {
                        let parts: Vec<String> = filter
                            .fields()
                            .iter()
                            .map(|(column, flag)| {
                                values.push(Value::Integer(i64::from(*flag)));
                                format!("r.{column} = ?")
                            })
                            .collect();
                        format!("({})", parts.join(" AND "))
                    })
                    .collect();
                conditions.push(format!("({})", alternatives.join(" OR ")));
            }
        }
    }
    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

impl RecordPort for SqliteAdapter {
    fn list_records(
        &self,
        predicate: &QueryPredicate,
        page: Page,
    ) -> Result<RecordPage, ScreenerError> {
        let conn = self.conn()?;
        let (condition, mut values) = where_clause(predicate);

        let count: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM ema_records r JOIN currencies c ON c.id = r.currency_id{condition}"
                ),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .map_err(query_error)?;

        values.push(Value::Integer(page.limit as i64));
        values.push(Value::Integer(page.offset as i64));
        let mut stmt = conn
            .prepare(&format!(
                "{RECORD_SELECT}{condition} ORDER BY r.timestamp DESC, r.id LIMIT ? OFFSET ?"
            ))
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), record_from_row)
            .map_err(query_error)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(query_error)?);
        }

        Ok(RecordPage {
            count: count as usize,
            records,
        })
    }

    fn get_record(&self, id: Uuid) -> Result<Option<EmaRecord>, ScreenerError> {
        self.conn()?
            .query_row(
                &format!("{RECORD_SELECT} WHERE r.id = ?1"),
                params![id.to_string()],
                record_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn insert_record(
        &self,
        currency: &Currency,
        new: NewEmaRecord,
    ) -> Result<EmaRecord, ScreenerError> {
        let record = new.into_record(currency.clone(), Utc::now());
        self.conn()?
            .execute(
                "INSERT INTO ema_records (
                    id, currency_id, timeframe, close, ema20, ema50, ema100, ema200, trend,
                    monhigh, monlow, monmid,
                    twenty_greater_than_fifty, fifty_greater_than_hundred,
                    hundred_greater_than_twohundred, close_greater_than_hundred,
                    timestamp, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    record.id.to_string(),
                    record.currency.id.to_string(),
                    record.timeframe,
                    record.close,
                    record.ema20,
                    record.ema50,
                    record.ema100,
                    record.ema200,
                    record.trend,
                    record.monhigh,
                    record.monlow,
                    record.monmid,
                    record.twenty_greater_than_fifty,
                    record.fifty_greater_than_hundred,
                    record.hundred_greater_than_twohundred,
                    record.close_greater_than_hundred,
                    timestamp(record.timestamp),
                    timestamp(record.updated_at),
                ],
            )
            .map_err(query_error)?;
        Ok(record)
    }

    fn update_record(
        &self,
        id: Uuid,
        patch: &EmaRecordPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<RecordUpdate>, ScreenerError> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock before the read, so concurrent
        // patches of one record apply one after the other.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_error)?;
        let Some(before) = tx
            .query_row(
                &format!("{RECORD_SELECT} WHERE r.id = ?1"),
                params![id.to_string()],
                record_from_row,
            )
            .optional()
            .map_err(query_error)?
        else {
            return Ok(None);
        };

        let mut after = before.clone();
        if patch.apply_to(&mut after, now)? {
            tx.execute(
                "UPDATE ema_records SET
                    timeframe = ?2, close = ?3, ema20 = ?4, ema50 = ?5, ema100 = ?6, ema200 = ?7,
                    trend = ?8, monhigh = ?9, monlow = ?10, monmid = ?11,
                    twenty_greater_than_fifty = ?12, fifty_greater_than_hundred = ?13,
                    hundred_greater_than_twohundred = ?14, close_greater_than_hundred = ?15,
                    updated_at = ?16
                 WHERE id = ?1",
                params![
                    after.id.to_string(),
                    after.timeframe,
                    after.close,
                    after.ema20,
                    after.ema50,
                    after.ema100,
                    after.ema200,
                    after.trend,
                    after.monhigh,
                    after.monlow,
                    after.monmid,
                    after.twenty_greater_than_fifty,
                    after.fifty_greater_than_hundred,
                    after.hundred_greater_than_twohundred,
                    after.close_greater_than_hundred,
                    timestamp(after.updated_at),
                ],
            )
            .map_err(query_error)?;
            tx.commit().map_err(query_error)?;
        }
        Ok(Some(RecordUpdate { before, after }))
    }
}

impl CurrencyPort for SqliteAdapter {
    fn list_currencies(&self, search: Option<&str>) -> Result<Vec<Currency>, ScreenerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CURRENCY_COLUMNS} FROM currencies c ORDER BY c.symbol"
            ))
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| currency_at(row, 0))
            .map_err(query_error)?;

        let mut currencies = Vec::new();
        for row in rows {
            let currency = row.map_err(query_error)?;
            if search.is_none_or(|query| currency.matches_search(query)) {
                currencies.push(currency);
            }
        }
        Ok(currencies)
    }

    fn find_currency_by_symbol(&self, symbol: &str) -> Result<Option<Currency>, ScreenerError> {
        self.conn()?
            .query_row(
                &format!("SELECT {CURRENCY_COLUMNS} FROM currencies c WHERE c.symbol = ?1 COLLATE NOCASE"),
                params![symbol.trim()],
                |row| currency_at(row, 0),
            )
            .optional()
            .map_err(query_error)
    }

    fn create_currency(&self, new: NewCurrency) -> Result<Currency, ScreenerError> {
        if self.find_currency_by_symbol(&new.symbol)?.is_some() {
            return Err(ScreenerError::Conflict {
                reason: format!("currency with symbol '{}' already exists", new.symbol.trim()),
            });
        }
        let currency = new.into_currency(Utc::now());
        self.conn()?
            .execute(
                "INSERT INTO currencies (id, name, symbol, exchange, category, subcategory, current_price, added_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    currency.id.to_string(),
                    currency.name,
                    currency.symbol,
                    currency.exchange,
                    currency.category.as_str(),
                    currency.subcategory,
                    currency.current_price,
                    timestamp(currency.added_at),
                    timestamp(currency.updated_at),
                ],
            )
            .map_err(query_error)?;
        Ok(currency)
    }

    fn delete_currency(&self, id: Uuid) -> Result<bool, ScreenerError> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM currencies WHERE id = ?1", params![id.to_string()])
            .map_err(query_error)?;
        Ok(deleted > 0)
    }
}

impl AccountPort for SqliteAdapter {
    fn insert_user(&self, user: &User) -> Result<(), ScreenerError> {
        self.conn()?
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    user.id.to_string(),
                    user.username,
                    user.email,
                    user.password_hash,
                    user.is_active,
                    timestamp(user.date_joined),
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn find_user(&self, id: Uuid) -> Result<Option<User>, ScreenerError> {
        self.conn()?
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                user_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ScreenerError> {
        self.conn()?
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), ScreenerError> {
        self.conn()?
            .execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                params![id.to_string(), password_hash],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn find_auth_token(&self, user_id: Uuid) -> Result<Option<AuthToken>, ScreenerError> {
        self.conn()?
            .query_row(
                "SELECT key, user_id, created FROM auth_tokens WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| {
                    Ok(AuthToken {
                        key: row.get(0)?,
                        user_id: uuid_at(row, 1)?,
                        created: time_at(row, 2)?,
                    })
                },
            )
            .optional()
            .map_err(query_error)
    }

    fn insert_auth_token(&self, token: &AuthToken) -> Result<(), ScreenerError> {
        self.conn()?
            .execute(
                "INSERT INTO auth_tokens (key, user_id, created) VALUES (?1, ?2, ?3)",
                params![token.key, token.user_id.to_string(), timestamp(token.created)],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn find_user_by_auth_token(&self, key: &str) -> Result<Option<User>, ScreenerError> {
        self.conn()?
            .query_row(
                "SELECT u.id, u.username, u.email, u.password_hash, u.is_active, u.date_joined
                 FROM auth_tokens t JOIN users u ON u.id = t.user_id
                 WHERE t.key = ?1",
                params![key],
                user_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn delete_auth_token(&self, user_id: Uuid) -> Result<bool, ScreenerError> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM auth_tokens WHERE user_id = ?1",
                params![user_id.to_string()],
            )
            .map_err(query_error)?;
        Ok(deleted > 0)
    }

    fn insert_reset_token(&self, record: &KeyRecord) -> Result<(), ScreenerError> {
        self.insert_key(RESET_TOKENS, record)
    }

    fn find_reset_token(&self, prefix: &str) -> Result<Option<KeyRecord>, ScreenerError> {
        self.find_key(RESET_TOKENS, prefix)
    }

    fn reset_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<KeyRecord>, ScreenerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {KEY_COLUMNS} FROM {RESET_TOKENS} WHERE user_id = ?1 ORDER BY created"
            ))
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![user_id.to_string()], key_from_row)
            .map_err(query_error)?;

        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(row.map_err(query_error)?);
        }
        Ok(tokens)
    }

    fn delete_reset_token(&self, id: Uuid) -> Result<(), ScreenerError> {
        self.conn()?
            .execute(
                &format!("DELETE FROM {RESET_TOKENS} WHERE id = ?1"),
                params![id.to_string()],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn delete_reset_tokens_for_user(&self, user_id: Uuid) -> Result<usize, ScreenerError> {
        self.conn()?
            .execute(
                &format!("DELETE FROM {RESET_TOKENS} WHERE user_id = ?1"),
                params![user_id.to_string()],
            )
            .map_err(query_error)
    }

    fn insert_api_key(&self, record: &KeyRecord) -> Result<(), ScreenerError> {
        self.insert_key(API_KEYS, record)
    }

    fn find_api_key(&self, prefix: &str) -> Result<Option<KeyRecord>, ScreenerError> {
        self.find_key(API_KEYS, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::domain::account;
    use crate::domain::watch::{self, WatchFilter};
    use chrono::Duration;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn currency(adapter: &SqliteAdapter, symbol: &str, name: &str) -> Currency {
        adapter
            .create_currency(NewCurrency {
                name: name.into(),
                symbol: symbol.into(),
                exchange: "Binance".into(),
                category: CurrencyCategory::A,
                subcategory: "Layer 1".into(),
                current_price: None,
            })
            .unwrap()
    }

    fn new_record(symbol: &str, ema20: f64, trend: i32, flags: WatchFilter) -> NewEmaRecord {
        NewEmaRecord {
            currency_symbol: symbol.into(),
            timeframe: "1:00:00".into(),
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

    fn predicate(pairs: &[(&str, &str)]) -> QueryPredicate {
        QueryPredicate::from_params(pairs.iter().copied()).unwrap()
    }

    const ALL: Page = Page {
        limit: 100,
        offset: 0,
    };

    #[test]
    fn from_config_missing_path() {
        match SqliteAdapter::from_config(&EmptyConfig) {
            Err(ScreenerError::ConfigMissing { section, key }) => {
                assert_eq!(section, "database");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn schema_initialization_is_idempotent() {
        let adapter = adapter();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screener.db");
        let path = path.to_str().unwrap();
        {
            let adapter = SqliteAdapter::open(path, 2).unwrap();
            adapter.initialize_schema().unwrap();
            currency(&adapter, "ETH", "Ethereum");
        }
        let reopened = SqliteAdapter::open(path, 2).unwrap();
        assert!(reopened.find_currency_by_symbol("eth").unwrap().is_some());
    }

    #[test]
    fn insert_and_get_record() {
        let adapter = adapter();
        let btc = currency(&adapter, "btc", "Bitcoin");
        assert_eq!(btc.symbol, "BTC");
        let flags = watch::classify("B").unwrap();
        let inserted = adapter
            .insert_record(&btc, new_record("BTC", 1.5, 1, flags))
            .unwrap();

        let fetched = adapter.get_record(inserted.id).unwrap().unwrap();
        assert_eq!(fetched.currency.symbol, "BTC");
        assert_relative_eq!(fetched.ema20, 1.5);
        assert_eq!(WatchFilter::of(&fetched), flags);
        assert_eq!(fetched.timestamp, inserted.timestamp);
        assert!(adapter.get_record(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn list_filters_and_counts() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let eth = currency(&adapter, "ETH", "Ethereum");
        let a = watch::classify("A").unwrap();
        let c = watch::classify("C").unwrap();
        adapter.insert_record(&btc, new_record("BTC", 1.0, 1, a)).unwrap();
        adapter.insert_record(&btc, new_record("BTC", 2.0, -1, c)).unwrap();
        adapter.insert_record(&eth, new_record("ETH", 1.0, 1, c)).unwrap();

        assert_eq!(adapter.list_records(&QueryPredicate::all(), ALL).unwrap().count, 3);
        assert_eq!(adapter.list_records(&predicate(&[("ema20", "1")]), ALL).unwrap().count, 2);
        assert_eq!(adapter.list_records(&predicate(&[("trend", "-1")]), ALL).unwrap().count, 1);
        assert_eq!(adapter.list_records(&predicate(&[("watch", "c")]), ALL).unwrap().count, 2);
        assert_eq!(
            adapter
                .list_records(&predicate(&[("watch", "C"), ("currency", "ethereum")]), ALL)
                .unwrap()
                .count,
            1
        );
        assert_eq!(adapter.list_records(&predicate(&[("currency", "btc")]), ALL).unwrap().count, 2);
        assert_eq!(adapter.list_records(&predicate(&[("timeframe", "4:00:00")]), ALL).unwrap().count, 0);
    }

    #[test]
    fn sideways_filter_matches_only_unnamed_combinations() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let sideways = WatchFilter::new(true, false, true, false);
        adapter.insert_record(&btc, new_record("BTC", 1.0, 0, sideways)).unwrap();
        adapter
            .insert_record(&btc, new_record("BTC", 1.0, 0, watch::classify("F").unwrap()))
            .unwrap();
        // unreachable through the sideways pool
        adapter
            .insert_record(&btc, new_record("BTC", 1.0, 0, WatchFilter::new(false, true, false, true)))
            .unwrap();

        let page = adapter
            .list_records(&predicate(&[("watch", "sideways")]), ALL)
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(WatchFilter::of(&page.records[0]), sideways);
    }

    #[test]
    fn sql_and_in_memory_filtering_agree() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        for (i, (_, flags)) in watch::WATCH_CATEGORIES.iter().enumerate() {
            adapter
                .insert_record(&btc, new_record("BTC", i as f64, (i % 3) as i32 - 1, *flags))
                .unwrap();
        }
        let everything = adapter.list_records(&QueryPredicate::all(), ALL).unwrap().records;
        for params in [
            vec![("watch", "D")],
            vec![("trend", "0")],
            vec![("ema20", "3"), ("currency", "BTC")],
            vec![("watch", "SIDEWAYS")],
        ] {
            let predicate = predicate(&params);
            let expected = predicate.apply(&everything).len();
            assert_eq!(adapter.list_records(&predicate, ALL).unwrap().count, expected, "{params:?}");
        }
    }

    #[test]
    fn list_pages_newest_first() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let flags = watch::classify("A").unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut record = adapter
                .insert_record(&btc, new_record("BTC", i as f64, 1, flags))
                .unwrap();
            ids.push(record.id);
            // distinct timestamps
            record.timestamp = record.timestamp + Duration::seconds(i);
            adapter
                .conn()
                .unwrap()
                .execute(
                    "UPDATE ema_records SET timestamp = ?2 WHERE id = ?1",
                    params![record.id.to_string(), timestamp(record.timestamp)],
                )
                .unwrap();
        }

        let page = adapter
            .list_records(&QueryPredicate::all(), Page { limit: 2, offset: 1 })
            .unwrap();
        assert_eq!(page.count, 5);
        let got: Vec<Uuid> = page.records.iter().map(|r| r.id).collect();
        assert_eq!(got, vec![ids[3], ids[2]]);
    }

    #[test]
    fn update_record_writes_patched_fields() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let record = adapter
            .insert_record(&btc, new_record("BTC", 1.0, 1, watch::classify("A").unwrap()))
            .unwrap();
        let patch = EmaRecordPatch {
            ema20: Some(9.5),
            close_greater_than_hundred: Some(true),
            ..Default::default()
        };
        let stored = adapter.get_record(record.id).unwrap().unwrap();
        let later = stored.updated_at + Duration::minutes(5);

        let update = adapter.update_record(record.id, &patch, later).unwrap().unwrap();
        assert_relative_eq!(update.before.ema20, 1.0);
        assert_relative_eq!(update.after.ema20, 9.5);

        let fetched = adapter.get_record(record.id).unwrap().unwrap();
        assert_relative_eq!(fetched.ema20, 9.5);
        assert!(fetched.close_greater_than_hundred);
        assert_eq!(fetched.updated_at, later);

        assert!(
            adapter
                .update_record(Uuid::new_v4(), &patch, later)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn unchanged_update_leaves_row_alone() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let record = adapter
            .insert_record(&btc, new_record("BTC", 1.0, 1, watch::classify("A").unwrap()))
            .unwrap();
        let stored = adapter.get_record(record.id).unwrap().unwrap();
        let patch = EmaRecordPatch {
            ema20: Some(1.0),
            ..Default::default()
        };

        let update = adapter
            .update_record(record.id, &patch, stored.updated_at + Duration::hours(1))
            .unwrap()
            .unwrap();
        assert_eq!(update.before, update.after);
        let fetched = adapter.get_record(record.id).unwrap().unwrap();
        assert_eq!(fetched.updated_at, stored.updated_at);
    }

    #[test]
    fn invalid_patch_rolls_back() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let record = adapter
            .insert_record(&btc, new_record("BTC", 1.0, 1, watch::classify("A").unwrap()))
            .unwrap();
        let patch = EmaRecordPatch {
            timeframe: Some(" ".into()),
            ema20: Some(5.0),
            ..Default::default()
        };
        assert!(adapter.update_record(record.id, &patch, Utc::now()).is_err());
        let fetched = adapter.get_record(record.id).unwrap().unwrap();
        assert_relative_eq!(fetched.ema20, 1.0);
    }

    #[test]
    fn concurrent_updates_keep_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screener.db");
        let adapter = SqliteAdapter::open(path.to_str().unwrap(), 8).unwrap();
        adapter.initialize_schema().unwrap();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let record = adapter
            .insert_record(&btc, new_record("BTC", 1.0, 1, watch::classify("A").unwrap()))
            .unwrap();

        let patches = [
            EmaRecordPatch { close: Some(10.0), ..Default::default() },
            EmaRecordPatch { ema20: Some(20.0), ..Default::default() },
            EmaRecordPatch { ema50: Some(50.0), ..Default::default() },
            EmaRecordPatch { ema100: Some(100.0), ..Default::default() },
            EmaRecordPatch { ema200: Some(200.0), ..Default::default() },
            EmaRecordPatch { monhigh: Some(7.0), ..Default::default() },
            EmaRecordPatch { monlow: Some(5.0), ..Default::default() },
            EmaRecordPatch { monmid: Some(6.0), ..Default::default() },
        ];
        let barrier = std::sync::Barrier::new(patches.len());
        std::thread::scope(|scope| {
            for patch in &patches {
                let (adapter, barrier) = (&adapter, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    adapter.update_record(record.id, patch, Utc::now()).unwrap();
                });
            }
        });

        let fetched = adapter.get_record(record.id).unwrap().unwrap();
        assert_relative_eq!(fetched.close, 10.0);
        assert_relative_eq!(fetched.ema20, 20.0);
        assert_relative_eq!(fetched.ema50, 50.0);
        assert_relative_eq!(fetched.ema100, 100.0);
        assert_relative_eq!(fetched.ema200, 200.0);
        assert_relative_eq!(fetched.monhigh, 7.0);
        assert_relative_eq!(fetched.monlow, 5.0);
        assert_relative_eq!(fetched.monmid, 6.0);
    }

    #[test]
    fn watch_labels_agree_with_sideways_listing() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let mut labelled_sideways = Vec::new();
        for bits in 0u8..16 {
            let flags = WatchFilter::new(bits & 8 != 0, bits & 4 != 0, bits & 2 != 0, bits & 1 != 0);
            let record = adapter
                .insert_record(&btc, new_record("BTC", f64::from(bits), 0, flags))
                .unwrap();
            if record.watch_label().as_deref() == Some("sideways") {
                labelled_sideways.push(record.id);
            }
        }

        let page = adapter
            .list_records(&predicate(&[("watch", "sideways")]), ALL)
            .unwrap();
        let mut listed: Vec<Uuid> = page.records.iter().map(|r| r.id).collect();
        listed.sort();
        labelled_sideways.sort();
        assert_eq!(listed, labelled_sideways);
        assert_eq!(listed.len(), watch::sideways_filters().len());
    }

    #[test]
    fn duplicate_symbol_conflicts() {
        let adapter = adapter();
        currency(&adapter, "BTC", "Bitcoin");
        let err = adapter
            .create_currency(NewCurrency {
                name: "Bitcoin again".into(),
                symbol: "btc".into(),
                exchange: String::new(),
                category: CurrencyCategory::B,
                subcategory: String::new(),
                current_price: None,
            })
            .unwrap_err();
        assert!(matches!(err, ScreenerError::Conflict { .. }));
    }

    #[test]
    fn list_currencies_searches() {
        let adapter = adapter();
        currency(&adapter, "ETH", "Ethereum");
        currency(&adapter, "BTC", "Bitcoin");
        let all = adapter.list_currencies(None).unwrap();
        let symbols: Vec<&str> = all.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "ETH"]);
        let found = adapter.list_currencies(Some("ether")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].symbol, "ETH");
    }

    #[test]
    fn deleting_currency_cascades_to_records() {
        let adapter = adapter();
        let btc = currency(&adapter, "BTC", "Bitcoin");
        let record = adapter
            .insert_record(&btc, new_record("BTC", 1.0, 1, watch::classify("A").unwrap()))
            .unwrap();
        assert!(adapter.delete_currency(btc.id).unwrap());
        assert!(!adapter.delete_currency(btc.id).unwrap());
        assert!(adapter.get_record(record.id).unwrap().is_none());
    }

    #[test]
    fn login_logout_round() {
        let adapter = adapter();
        let now = Utc::now();
        let user = account::create_user(&adapter, "alice", "alice@example.com", "password123", now)
            .unwrap();

        let (_, token) = account::authenticate(&adapter, "alice", "password123", now).unwrap();
        let (_, again) = account::authenticate(&adapter, "alice", "password123", now).unwrap();
        assert_eq!(token.key, again.key);
        assert_eq!(
            account::user_for_token(&adapter, &token.key).unwrap().map(|u| u.id),
            Some(user.id)
        );

        account::logout(&adapter, user.id).unwrap();
        assert!(account::user_for_token(&adapter, &token.key).unwrap().is_none());
        assert!(account::logout(&adapter, user.id).is_err());
    }

    #[test]
    fn key_records_round_trip_through_tables() {
        let adapter = adapter();
        let now = Utc::now();
        let key = account::create_api_key(&adapter, "screener bot", None, now).unwrap();
        assert!(account::verify_api_key(&adapter, &key, now).unwrap());
        assert!(!account::verify_api_key(&adapter, "nope.nope", now).unwrap());

        let (prefix, _) = account::split_key(&key).unwrap();
        assert!(adapter.find_reset_token(prefix).unwrap().is_none());
    }
}
