//! Query-parameter filtering of EMA records.
//!
//! A list request's query parameters are parsed into a [`QueryPredicate`]: one
//! [`Clause`] per recognised parameter, all of which must hold for a record to
//! match. Parameters are parsed by the rule registered for their key in
//! [`FILTER_PARAMS`]. Unknown keys and blank values are ignored; every
//! parameter that fails to parse is reported in a single [`ParameterErrors`].

use crate::domain::ema_record::EmaRecord;
use crate::domain::error::ParameterErrors;
use crate::domain::watch::{self, SIDEWAYS, WatchFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmaWindow {
    Twenty,
    Fifty,
    Hundred,
    TwoHundred,
}

impl EmaWindow {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Twenty => "ema20",
            Self::Fifty => "ema50",
            Self::Hundred => "ema100",
            Self::TwoHundred => "ema200",
        }
    }

    pub fn value(&self, record: &EmaRecord) -> f64 {
        match self {
            Self::Twenty => record.ema20,
            Self::Fifty => record.ema50,
            Self::Hundred => record.ema100,
            Self::TwoHundred => record.ema200,
        }
    }
}

/// A single constraint on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Exact match on one EMA window.
    Ema { window: EmaWindow, value: f64 },
    Timeframe(String),
    Trend(i32),
    /// Currency symbol or name, ASCII case-insensitive.
    Currency(String),
    /// Any of the listed flag combinations.
    Watch(Vec<WatchFilter>),
}

impl Clause {
    pub fn matches(&self, record: &EmaRecord) -> bool {
        match self {
            Self::Ema { window, value } => window.value(record) == *value,
            Self::Timeframe(timeframe) => record.timeframe == *timeframe,
            Self::Trend(trend) => record.trend == *trend,
            Self::Currency(name) => {
                record.currency.symbol.eq_ignore_ascii_case(name)
                    || record.currency.name.eq_ignore_ascii_case(name)
            }
            Self::Watch(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

/// The supported query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterParam {
    Ema(EmaWindow),
    Timeframe,
    Trend,
    Currency,
    Watch,
}

pub const FILTER_PARAMS: [(&str, FilterParam); 8] = [
    ("ema20", FilterParam::Ema(EmaWindow::Twenty)),
    ("ema50", FilterParam::Ema(EmaWindow::Fifty)),
    ("ema100", FilterParam::Ema(EmaWindow::Hundred)),
    ("ema200", FilterParam::Ema(EmaWindow::TwoHundred)),
    ("timeframe", FilterParam::Timeframe),
    ("trend", FilterParam::Trend),
    ("currency", FilterParam::Currency),
    ("watch", FilterParam::Watch),
];

impl FilterParam {
    pub fn lookup(key: &str) -> Option<Self> {
        FILTER_PARAMS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, param)| *param)
    }

    pub fn key(&self) -> &'static str {
        FILTER_PARAMS
            .iter()
            .find(|(_, param)| param == self)
            .map_or("", |(name, _)| *name)
    }

    /// Parse a raw query value into a clause, or a message for the client.
    pub fn parse(&self, raw: &str) -> Result<Clause, String> {
        match self {
            Self::Ema(window) => parse_decimal(raw).map(|value| Clause::Ema {
                window: *window,
                value,
            }),
            Self::Timeframe => Ok(Clause::Timeframe(raw.to_string())),
            Self::Trend => raw
                .trim()
                .parse::<i32>()
                .map(Clause::Trend)
                .map_err(|_| format!("'{raw}' is not a valid integer")),
            Self::Currency => Ok(Clause::Currency(raw.to_string())),
            Self::Watch => parse_watch(raw),
        }
    }
}

fn parse_decimal(raw: &str) -> Result<f64, String> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("'{raw}' is not a valid decimal number")),
    }
}

fn parse_watch(raw: &str) -> Result<Clause, String> {
    if raw.trim().to_uppercase() == SIDEWAYS {
        return Ok(Clause::Watch(
            watch::sideways_filters().iter().copied().collect(),
        ));
    }
    watch::classify(raw)
        .map(|filter| Clause::Watch(vec![filter]))
        .map_err(|_| format!("Invalid value '{raw}' for watch parameter"))
}

/// Conjunction of clauses built from one request's query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPredicate {
    clauses: Vec<Clause>,
}

impl QueryPredicate {
    /// Predicate that matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse query parameters. A key given more than once keeps its last value.
    pub fn from_params<I, K, V>(params: I) -> Result<Self, ParameterErrors>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut latest: Vec<(String, String)> = Vec::new();
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            match latest.iter_mut().find(|(k, _)| k.as_str() == key) {
                Some(slot) => slot.1 = value.to_string(),
                None => latest.push((key.to_string(), value.to_string())),
            }
        }

        let mut clauses = Vec::new();
        let mut errors = ParameterErrors::new();
        for (key, value) in &latest {
            if value.trim().is_empty() {
                continue;
            }
            let Some(param) = FilterParam::lookup(key) else {
                continue;
            };
            match param.parse(value) {
                Ok(clause) => clauses.push(clause),
                Err(message) => errors.insert(key, message),
            }
        }

        if errors.is_empty() {
            Ok(Self { clauses })
        } else {
            Err(errors)
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, record: &EmaRecord) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }

    /// Records that satisfy the predicate, in their original order.
    pub fn apply<'a>(&self, records: &'a [EmaRecord]) -> Vec<&'a EmaRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}
