//! EMA indicator records and their wire representation.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::domain::currency::Currency;
use crate::domain::error::ScreenerError;
use crate::domain::watch::{self, WatchFilter};

/// `HH:MM:SS DD-MM-YYYY +zzzz`
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S %d-%m-%Y %z";

#[derive(Debug, Clone, PartialEq)]
pub struct EmaRecord {
    pub id: Uuid,
    /// Charting interval, e.g. `1:00:00` for one hour.
    pub timeframe: String,
    pub currency: Currency,
    pub close: f64,
    pub ema20: f64,
    pub ema50: f64,
    pub ema100: f64,
    pub ema200: f64,
    /// 1 upwards, -1 downwards, 0 sideways.
    pub trend: i32,
    pub monhigh: f64,
    pub monlow: f64,
    pub monmid: f64,
    pub twenty_greater_than_fifty: bool,
    pub fifty_greater_than_hundred: bool,
    pub hundred_greater_than_twohundred: bool,
    pub close_greater_than_hundred: bool,
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmaRecord {
    /// Watch category letter, `sideways` for a member of the sideways set, or
    /// `None` for a flag combination neither can produce.
    pub fn watch_label(&self) -> Option<String> {
        let flags = WatchFilter::of(self);
        match watch::category_of(flags) {
            Some(code) => Some(code.to_string()),
            None if watch::sideways_filters().contains(&flags) => Some("sideways".to_string()),
            None => None,
        }
    }

    /// Field mapping with internal key names, in a stable order.
    pub fn representation(&self) -> Map<String, Value> {
        let value = json!({
            "id": self.id.to_string(),
            "timeframe": self.timeframe,
            "currency": self.currency.representation(),
            "close": self.close,
            "ema20": self.ema20,
            "ema50": self.ema50,
            "ema100": self.ema100,
            "ema200": self.ema200,
            "trend": self.trend,
            "monhigh": self.monhigh,
            "monlow": self.monlow,
            "monmid": self.monmid,
            "twenty_greater_than_fifty": self.twenty_greater_than_fifty,
            "fifty_greater_than_hundred": self.fifty_greater_than_hundred,
            "hundred_greater_than_twohundred": self.hundred_greater_than_twohundred,
            "close_greater_than_hundred": self.close_greater_than_hundred,
            "watch": self.watch_label(),
            "timestamp": self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            "updated_at": self.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Body of a record creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEmaRecord {
    pub currency_symbol: String,
    pub timeframe: String,
    pub close: f64,
    pub ema20: f64,
    pub ema50: f64,
    pub ema100: f64,
    pub ema200: f64,
    pub trend: i32,
    #[serde(default)]
    pub monhigh: f64,
    #[serde(default)]
    pub monlow: f64,
    #[serde(default)]
    pub monmid: f64,
    pub twenty_greater_than_fifty: bool,
    pub fifty_greater_than_hundred: bool,
    pub hundred_greater_than_twohundred: bool,
    pub close_greater_than_hundred: bool,
}

impl NewEmaRecord {
    /// Parse a creation body that may use either internal or display key names.
    pub fn from_json(body: &Map<String, Value>) -> Result<Self, ScreenerError> {
        let internal = watch::external_to_internal(body);
        serde_json::from_value(Value::Object(internal))
            .map_err(|e| ScreenerError::validation("body", e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ScreenerError> {
        if self.currency_symbol.trim().is_empty() {
            return Err(ScreenerError::validation(
                "currency_symbol",
                "This field is required.",
            ));
        }
        if self.timeframe.trim().is_empty() {
            return Err(ScreenerError::validation("timeframe", "This field is required."));
        }
        let values = [
            ("close", self.close),
            ("ema20", self.ema20),
            ("ema50", self.ema50),
            ("ema100", self.ema100),
            ("ema200", self.ema200),
            ("monhigh", self.monhigh),
            ("monlow", self.monlow),
            ("monmid", self.monmid),
        ];
        for (field, value) in values {
            if !value.is_finite() {
                return Err(ScreenerError::validation(field, "must be a finite number"));
            }
        }
        Ok(())
    }

    pub fn into_record(self, currency: Currency, now: DateTime<Utc>) -> EmaRecord {
        EmaRecord {
            id: Uuid::new_v4(),
            timeframe: self.timeframe,
            currency,
            close: self.close,
            ema20: self.ema20,
            ema50: self.ema50,
            ema100: self.ema100,
            ema200: self.ema200,
            trend: self.trend,
            monhigh: self.monhigh,
            monlow: self.monlow,
            monmid: self.monmid,
            twenty_greater_than_fifty: self.twenty_greater_than_fifty,
            fifty_greater_than_hundred: self.fifty_greater_than_hundred,
            hundred_greater_than_twohundred: self.hundred_greater_than_twohundred,
            close_greater_than_hundred: self.close_greater_than_hundred,
            timestamp: now,
            updated_at: now,
        }
    }
}

/// Partial update of a record; absent fields stay untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmaRecordPatch {
    pub timeframe: Option<String>,
    pub close: Option<f64>,
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub ema100: Option<f64>,
    pub ema200: Option<f64>,
    pub trend: Option<i32>,
    pub monhigh: Option<f64>,
    pub monlow: Option<f64>,
    pub monmid: Option<f64>,
    pub twenty_greater_than_fifty: Option<bool>,
    pub fifty_greater_than_hundred: Option<bool>,
    pub hundred_greater_than_twohundred: Option<bool>,
    pub close_greater_than_hundred: Option<bool>,
}

impl EmaRecordPatch {
    pub fn from_json(body: &Map<String, Value>) -> Result<Self, ScreenerError> {
        let internal = watch::external_to_internal(body);
        serde_json::from_value(Value::Object(internal))
            .map_err(|e| ScreenerError::validation("body", e.to_string()))
    }

    /// Apply the patch. `updated_at` is stamped with `now` only when a field
    /// actually changed; the return value says whether one did.
    pub fn apply_to(&self, record: &mut EmaRecord, now: DateTime<Utc>) -> Result<bool, ScreenerError> {
        if let Some(timeframe) = &self.timeframe {
            if timeframe.trim().is_empty() {
                return Err(ScreenerError::validation("timeframe", "must not be blank"));
            }
        }
        let numbers = [
            ("close", self.close),
            ("ema20", self.ema20),
            ("ema50", self.ema50),
            ("ema100", self.ema100),
            ("ema200", self.ema200),
            ("monhigh", self.monhigh),
            ("monlow", self.monlow),
            ("monmid", self.monmid),
        ];
        for (field, value) in numbers {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(ScreenerError::validation(field, "must be a finite number"));
            }
        }

        let before = record.clone();
        if let Some(timeframe) = &self.timeframe {
            record.timeframe = timeframe.clone();
        }
        set(&mut record.close, self.close);
        set(&mut record.ema20, self.ema20);
        set(&mut record.ema50, self.ema50);
        set(&mut record.ema100, self.ema100);
        set(&mut record.ema200, self.ema200);
        set(&mut record.trend, self.trend);
        set(&mut record.monhigh, self.monhigh);
        set(&mut record.monlow, self.monlow);
        set(&mut record.monmid, self.monmid);
        set(&mut record.twenty_greater_than_fifty, self.twenty_greater_than_fifty);
        set(&mut record.fifty_greater_than_hundred, self.fifty_greater_than_hundred);
        set(
            &mut record.hundred_greater_than_twohundred,
            self.hundred_greater_than_twohundred,
        );
        set(&mut record.close_greater_than_hundred, self.close_greater_than_hundred);
        let changed = *record != before;
        if changed {
            record.updated_at = now;
        }
        Ok(changed)
    }
}

fn set<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}
