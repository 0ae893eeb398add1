//! Watch categories: named combinations of the four EMA trend flags.
//!
//! Each record carries four booleans comparing EMA windows with each other and
//! with the closing price. A fixed set of flag combinations is named `A`..`F`;
//! every other reachable combination counts as "sideways". This module also
//! owns the mapping between the internal flag identifiers and the compact
//! tokens (`20>50`, ...) shown to clients.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use serde_json::{Map, Value};

use crate::domain::ema_record::EmaRecord;
use crate::domain::error::UnknownWatchCode;

/// The four trend flags of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchFilter {
    pub twenty_greater_than_fifty: bool,
    pub fifty_greater_than_hundred: bool,
    pub hundred_greater_than_twohundred: bool,
    pub close_greater_than_hundred: bool,
}

impl WatchFilter {
    pub const fn new(
        twenty_greater_than_fifty: bool,
        fifty_greater_than_hundred: bool,
        hundred_greater_than_twohundred: bool,
        close_greater_than_hundred: bool,
    ) -> Self {
        Self {
            twenty_greater_than_fifty,
            fifty_greater_than_hundred,
            hundred_greater_than_twohundred,
            close_greater_than_hundred,
        }
    }

    fn from_slice(flags: &[bool]) -> Self {
        Self::new(flags[0], flags[1], flags[2], flags[3])
    }

    pub fn of(record: &EmaRecord) -> Self {
        Self::new(
            record.twenty_greater_than_fifty,
            record.fifty_greater_than_hundred,
            record.hundred_greater_than_twohundred,
            record.close_greater_than_hundred,
        )
    }

    pub fn matches(&self, record: &EmaRecord) -> bool {
        Self::of(record) == *self
    }

    /// Flags paired with their internal field identifiers, in column order.
    pub fn fields(&self) -> [(&'static str, bool); 4] {
        [
            (FIELD_NAMES[0].0, self.twenty_greater_than_fifty),
            (FIELD_NAMES[1].0, self.fifty_greater_than_hundred),
            (FIELD_NAMES[2].0, self.hundred_greater_than_twohundred),
            (FIELD_NAMES[3].0, self.close_greater_than_hundred),
        ]
    }
}

pub const WATCH_CATEGORIES: [(char, WatchFilter); 6] = [
    ('A', WatchFilter::new(true, true, false, false)),
    ('B', WatchFilter::new(true, true, true, false)),
    ('C', WatchFilter::new(true, true, true, true)),
    ('D', WatchFilter::new(false, false, true, true)),
    ('E', WatchFilter::new(false, false, false, true)),
    ('F', WatchFilter::new(false, false, false, false)),
];

/// Literal accepted by the `watch` parameter for the sideways set.
pub const SIDEWAYS: &str = "SIDEWAYS";

/// Pool the sideways candidates are drawn from.
const CANONICAL_FLAGS: [bool; 8] = [true, true, false, false, true, true, false, false];

/// Internal field identifier to external display token.
pub const FIELD_NAMES: [(&str, &str); 4] = [
    ("twenty_greater_than_fifty", "20>50"),
    ("fifty_greater_than_hundred", "50>100"),
    ("hundred_greater_than_twohundred", "100>200"),
    ("close_greater_than_hundred", "close>100"),
];

static SIDEWAYS_FILTERS: LazyLock<BTreeSet<WatchFilter>> = LazyLock::new(|| {
    let mut filters: BTreeSet<WatchFilter> = combinations_with_replacement(&CANONICAL_FLAGS, 4)
        .iter()
        .map(|combo| WatchFilter::from_slice(combo))
        .collect();
    for (_, named) in &WATCH_CATEGORIES {
        filters.remove(named);
    }
    filters
});

/// Look up a category by code. Surrounding whitespace and case are ignored.
pub fn classify(code: &str) -> Result<WatchFilter, UnknownWatchCode> {
    let normalized = code.trim().to_uppercase();
    let mut chars = normalized.chars();
    let letter = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => return Err(UnknownWatchCode(code.to_string())),
    };
    WATCH_CATEGORIES
        .iter()
        .find(|(c, _)| *c == letter)
        .map(|(_, filter)| *filter)
        .ok_or_else(|| UnknownWatchCode(code.to_string()))
}

/// Inverse of [`classify`]; `None` for sideways combinations.
pub fn category_of(filter: WatchFilter) -> Option<char> {
    WATCH_CATEGORIES
        .iter()
        .find(|(_, named)| *named == filter)
        .map(|(c, _)| *c)
}

/// Every reachable flag combination that is not a named category.
pub fn sideways_filters() -> &'static BTreeSet<WatchFilter> {
    &SIDEWAYS_FILTERS
}

/// All length-`r` selections from `pool` taken at non-decreasing positions.
fn combinations_with_replacement<T: Copy>(pool: &[T], r: usize) -> Vec<Vec<T>> {
    let mut out = Vec::new();
    if pool.is_empty() && r > 0 {
        return out;
    }
    let mut indices = vec![0usize; r];
    loop {
        out.push(indices.iter().map(|&i| pool[i]).collect());

        // rightmost index that can still advance
        let Some(pos) = (0..r).rev().find(|&i| indices[i] != pool.len() - 1) else {
            return out;
        };
        let next = indices[pos] + 1;
        for index in &mut indices[pos..] {
            *index = next;
        }
    }
}

pub fn to_external_key(key: &str) -> &str {
    FIELD_NAMES
        .iter()
        .find(|(internal, _)| *internal == key)
        .map_or(key, |(_, external)| *external)
}

pub fn to_internal_key(key: &str) -> &str {
    FIELD_NAMES
        .iter()
        .find(|(_, external)| *external == key)
        .map_or(key, |(internal, _)| *internal)
}

/// Rename flag keys to their display tokens. Values and other keys are kept.
pub fn internal_to_external(map: &Map<String, Value>) -> Map<String, Value> {
    rename_keys(map, to_external_key)
}

/// Rename display tokens back to flag identifiers. Values and other keys are kept.
pub fn external_to_internal(map: &Map<String, Value>) -> Map<String, Value> {
    rename_keys(map, to_internal_key)
}

fn rename_keys(map: &Map<String, Value>, rename: fn(&str) -> &str) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (rename(key).to_string(), value.clone()))
        .collect()
}
