use anyhow::{Context, Result};
use tracing::warn;

use super::storage::KeyValueStore;
use crate::models::UserInfo;

/// Storage key holding the raw bearer token
pub(crate) const TOKEN_KEY: &str = "token";

/// Storage key holding the JSON user-info record
pub(crate) const USER_KEY: &str = "user";

/// A token and user-info pair read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredCredential {
    pub token: String,
    pub user_info: UserInfo,
}

/// The persisted credential record.
///
/// Owned by `SessionState`; nothing outside the `auth` module can reach it.
pub(crate) struct CredentialStore {
    backend: Box<dyn KeyValueStore>,
}

impl CredentialStore {
    pub(crate) fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Write the token and user-info together.
    ///
    /// If the second write fails the token is removed again, so callers never
    /// observe a half-written record.
    pub(crate) fn save(&self, token: &str, user_info: &UserInfo) -> Result<()> {
        let user_json =
            serde_json::to_string(user_info).context("Failed to serialize user info")?;

        self.backend
            .set(TOKEN_KEY, token)
            .context("Failed to store token")?;

        if let Err(e) = self.backend.set(USER_KEY, &user_json) {
            if let Err(rollback) = self.backend.remove(TOKEN_KEY) {
                warn!(error = %rollback, "Failed to roll back token after partial save");
            }
            return Err(e).context("Failed to store user info");
        }
        Ok(())
    }

    /// Read the record. Missing keys, unreadable storage and corrupt user
    /// records all come back as `None`.
    pub(crate) fn load(&self) -> Option<StoredCredential> {
        let token = match self.backend.get(TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Credential storage unreadable, treating as logged out");
                return None;
            }
        };

        let user_json = match self.backend.get(USER_KEY) {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Credential storage unreadable, treating as logged out");
                return None;
            }
        };

        match serde_json::from_str::<UserInfo>(&user_json) {
            Ok(user_info) => Some(StoredCredential { token, user_info }),
            Err(e) => {
                warn!(error = %e, "Stored user info is corrupt");
                None
            }
        }
    }

    /// Whether either key holds something. After a `load` that came back
    /// `None`, this means a half-written or corrupt record.
    pub(crate) fn has_leftovers(&self) -> bool {
        [TOKEN_KEY, USER_KEY]
            .iter()
            .any(|key| matches!(self.backend.get(key), Ok(Some(_))))
    }

    /// Remove both keys. Both removals are attempted even if one fails.
    pub(crate) fn clear(&self) -> Result<()> {
        let token = self.backend.remove(TOKEN_KEY);
        let user = self.backend.remove(USER_KEY);
        token.context("Failed to remove token")?;
        user.context("Failed to remove user info")?;
        Ok(())
    }
}
