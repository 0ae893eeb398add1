//! Account, token and key storage port.

use uuid::Uuid;

use crate::domain::account::{AuthToken, KeyRecord, User};
use crate::domain::error::ScreenerError;

pub trait AccountPort {
    fn insert_user(&self, user: &User) -> Result<(), ScreenerError>;
    fn find_user(&self, id: Uuid) -> Result<Option<User>, ScreenerError>;
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, ScreenerError>;
    fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), ScreenerError>;

    fn find_auth_token(&self, user_id: Uuid) -> Result<Option<AuthToken>, ScreenerError>;
    fn insert_auth_token(&self, token: &AuthToken) -> Result<(), ScreenerError>;
    fn find_user_by_auth_token(&self, key: &str) -> Result<Option<User>, ScreenerError>;
    /// `false` when the user had no token.
    fn delete_auth_token(&self, user_id: Uuid) -> Result<bool, ScreenerError>;

    fn insert_reset_token(&self, record: &KeyRecord) -> Result<(), ScreenerError>;
    fn find_reset_token(&self, prefix: &str) -> Result<Option<KeyRecord>, ScreenerError>;
    fn reset_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<KeyRecord>, ScreenerError>;
    fn delete_reset_token(&self, id: Uuid) -> Result<(), ScreenerError>;
    fn delete_reset_tokens_for_user(&self, user_id: Uuid) -> Result<usize, ScreenerError>;

    fn insert_api_key(&self, record: &KeyRecord) -> Result<(), ScreenerError>;
    fn find_api_key(&self, prefix: &str) -> Result<Option<KeyRecord>, ScreenerError>;
}
