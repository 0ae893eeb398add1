//! Currencies tracked by the screener.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::domain::error::ScreenerError;

pub const SYMBOL_MAX_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CurrencyCategory {
    A,
    B,
    C,
    D,
    E,
}

impl CurrencyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Currency {
    pub id: Uuid,
    pub name: String,
    pub symbol: String,
    pub exchange: String,
    pub category: CurrencyCategory,
    pub subcategory: String,
    pub current_price: Option<f64>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Currency {
    pub fn representation(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "name": self.name,
            "symbol": self.symbol,
            "exchange": self.exchange,
            "current_price": self.current_price,
            "category": self.category.as_str(),
            "subcategory": self.subcategory,
        })
    }

    /// Whether every whitespace-separated term of `query` appears in the
    /// name, symbol, category or subcategory (ASCII case-insensitive).
    pub fn matches_search(&self, query: &str) -> bool {
        let haystacks = [
            self.name.to_ascii_lowercase(),
            self.symbol.to_ascii_lowercase(),
            self.category.as_str().to_ascii_lowercase(),
            self.subcategory.to_ascii_lowercase(),
        ];
        query.split_whitespace().all(|term| {
            let term = term.to_ascii_lowercase();
            haystacks.iter().any(|h| h.contains(&term))
        })
    }
}

/// Body of a currency creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCurrency {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub exchange: String,
    pub category: CurrencyCategory,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub current_price: Option<f64>,
}

impl NewCurrency {
    pub fn validate(&self) -> Result<(), ScreenerError> {
        let symbol = self.symbol.trim();
        if symbol.is_empty() {
            return Err(ScreenerError::validation("symbol", "symbol must not be empty"));
        }
        if symbol.chars().count() > SYMBOL_MAX_LEN {
            return Err(ScreenerError::validation(
                "symbol",
                format!("symbol must be at most {SYMBOL_MAX_LEN} characters"),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(ScreenerError::validation("name", "name must not be empty"));
        }
        if let Some(price) = self.current_price {
            if !price.is_finite() || price < 0.0 {
                return Err(ScreenerError::validation(
                    "current_price",
                    "current_price must be a non-negative number",
                ));
            }
        }
        Ok(())
    }

    pub fn into_currency(self, now: DateTime<Utc>) -> Currency {
        Currency {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            symbol: self.symbol.trim().to_uppercase(),
            exchange: self.exchange.trim().to_string(),
            category: self.category,
            subcategory: self.subcategory.trim().to_string(),
            current_price: self.current_price,
            added_at: now,
            updated_at: now,
        }
    }
}
