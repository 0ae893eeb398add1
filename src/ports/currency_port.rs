//! Currency storage port.

use uuid::Uuid;

use crate::domain::currency::{Currency, NewCurrency};
use crate::domain::error::ScreenerError;

pub trait CurrencyPort {
    /// All currencies ordered by symbol, optionally narrowed by a search query.
    fn list_currencies(&self, search: Option<&str>) -> Result<Vec<Currency>, ScreenerError>;

    /// Case-insensitive lookup by symbol.
    fn find_currency_by_symbol(&self, symbol: &str) -> Result<Option<Currency>, ScreenerError>;

    /// Fails with `Conflict` when the symbol is taken.
    fn create_currency(&self, new: NewCurrency) -> Result<Currency, ScreenerError>;

    /// Delete a currency and its records. `false` when it did not exist.
    fn delete_currency(&self, id: Uuid) -> Result<bool, ScreenerError>;
}
