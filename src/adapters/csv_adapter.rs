//! CSV import of EMA records.
//!
//! The header row names the fields; flag columns may use either their
//! internal identifiers or the display tokens (`20>50`, ...).

use std::fs;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::domain::ema_record::NewEmaRecord;
use crate::domain::error::ScreenerError;
use crate::domain::watch;

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl Into<String>) -> ScreenerError {
        ScreenerError::Csv {
            file: self.path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Parse and validate every row. The first bad row aborts the read and is
    /// reported with its line number.
    pub fn read_records(&self) -> Result<Vec<NewEmaRecord>, ScreenerError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| self.error(format!("failed to read file: {e}")))?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| self.error(format!("CSV header error: {e}")))?
            .clone();
        let internal: StringRecord = headers.iter().map(watch::to_internal_key).collect();

        let mut records = Vec::new();
        for result in rdr.records() {
            let row = result.map_err(|e| {
                let line = e.position().map_or(0, |p| p.line());
                self.error(format!("line {line}: {e}"))
            })?;
            let line = row.position().map_or(0, |p| p.line());
            let record: NewEmaRecord = row
                .deserialize(Some(&internal))
                .map_err(|e| self.error(format!("line {line}: {e}")))?;
            record
                .validate()
                .map_err(|e| self.error(format!("line {line}: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }
}
