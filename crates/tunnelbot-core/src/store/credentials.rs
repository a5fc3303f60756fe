// ── Credential registry ──
//
// `[[client]]` entries the endpoint authenticates against. Mutations are
// committed under the store lock and reconciled afterwards; a failed
// reconcile never rolls the file back.

use std::path::PathBuf;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::document::{StoreRecord, StructuredStore};
use crate::error::CoreError;
use crate::reconcile::{ReconcileOutcome, Reconciler};

const USERNAME_MAX: usize = 32;
const PASSWORD_LEN: usize = 16;

/// One VPN login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
}

impl Account {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl StoreRecord for Account {
    const TABLE: &'static str = "client";

    fn validate(&self) -> Result<(), String> {
        if self.username.is_empty() {
            return Err("username is empty".into());
        }
        if self.password.is_empty() {
            return Err(format!("password for '{}' is empty", self.username));
        }
        Ok(())
    }
}

/// Check a username against the accepted alphabet and length.
pub fn validate_username(username: &str) -> Result<(), CoreError> {
    if username.is_empty() {
        return Err(CoreError::validation("username must not be empty"));
    }
    if username.chars().count() > USERNAME_MAX {
        return Err(CoreError::validation(format!(
            "username must be at most {USERNAME_MAX} characters"
        )));
    }
    if username.starts_with('.') {
        return Err(CoreError::validation("username must not start with '.'"));
    }
    if let Some(bad) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(CoreError::validation(format!(
            "username contains '{bad}'; use letters, digits, '_', '.' or '-'"
        )));
    }
    Ok(())
}

/// Trim whitespace and a leading `@` from typed input.
pub fn normalize_username(input: &str) -> String {
    let trimmed = input.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed).to_owned()
}

/// Random alphanumeric password for new accounts.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Result of a committed credential change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserChange {
    pub username: String,
    /// Store file that now holds the change.
    pub path: PathBuf,
    pub outcome: ReconcileOutcome,
}

impl UserChange {
    pub fn used_live_reload(&self) -> bool {
        matches!(self.outcome, ReconcileOutcome::ReloadedLive)
    }
}

/// Add, delete and list VPN accounts.
#[derive(Debug, Clone)]
pub struct CredentialRegistry {
    store: StructuredStore<Account>,
    reconciler: Reconciler,
}

impl CredentialRegistry {
    pub fn new(store: StructuredStore<Account>, reconciler: Reconciler) -> Self {
        Self { store, reconciler }
    }

    pub fn store(&self) -> &StructuredStore<Account> {
        &self.store
    }

    /// Usernames in file order.
    pub async fn list_users(&self) -> Result<Vec<String>, CoreError> {
        Ok(self
            .store
            .load()
            .await?
            .into_iter()
            .map(|a| a.username)
            .collect())
    }

    pub async fn find(&self, username: &str) -> Result<Option<Account>, CoreError> {
        Ok(self
            .store
            .load()
            .await?
            .into_iter()
            .find(|a| a.username == username))
    }

    /// Append a new account and reconcile the endpoint.
    pub async fn add_user(&self, username: &str, password: &str) -> Result<UserChange, CoreError> {
        validate_username(username)?;
        if password.is_empty() {
            return Err(CoreError::validation("password must not be empty"));
        }

        let account = Account::new(username, password);
        self.store
            .with_lock(move |accounts| {
                if accounts.iter().any(|a| a.username == account.username) {
                    return Err(CoreError::DuplicateUser {
                        username: account.username,
                    });
                }
                accounts.push(account);
                Ok(())
            })
            .await?;

        info!(username, "user added");
        Ok(self.committed(username).await)
    }

    /// Remove every account with this username and reconcile the endpoint.
    pub async fn delete_user(&self, username: &str) -> Result<UserChange, CoreError> {
        let name = username.to_owned();
        self.store
            .with_lock(move |accounts| {
                let before = accounts.len();
                accounts.retain(|a| a.username != name);
                if accounts.len() == before {
                    return Err(CoreError::UserNotFound { username: name });
                }
                Ok(())
            })
            .await?;

        info!(username, "user deleted");
        Ok(self.committed(username).await)
    }

    async fn committed(&self, username: &str) -> UserChange {
        UserChange {
            username: username.to_owned(),
            path: self.store.path().to_path_buf(),
            outcome: self.reconciler.reconcile().await,
        }
    }
}
