//! EMA record storage port.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::currency::Currency;
use crate::domain::ema_record::{EmaRecord, EmaRecordPatch, NewEmaRecord};
use crate::domain::error::ScreenerError;
use crate::domain::filter::QueryPredicate;

/// Window into a filtered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

/// One page of matching records plus the total match count.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub count: usize,
    pub records: Vec<EmaRecord>,
}

/// A record as stored before and after one update.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub before: EmaRecord,
    pub after: EmaRecord,
}

pub trait RecordPort {
    /// Records matching `predicate`, newest first.
    fn list_records(
        &self,
        predicate: &QueryPredicate,
        page: Page,
    ) -> Result<RecordPage, ScreenerError>;

    fn get_record(&self, id: Uuid) -> Result<Option<EmaRecord>, ScreenerError>;

    fn insert_record(
        &self,
        currency: &Currency,
        new: NewEmaRecord,
    ) -> Result<EmaRecord, ScreenerError>;

    /// Read, patch and write the record `id` as one atomic step. `None` when
    /// no such record exists. Nothing is written when the patch changes no
    /// field.
    fn update_record(
        &self,
        id: Uuid,
        patch: &EmaRecordPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<RecordUpdate>, ScreenerError>;
}
