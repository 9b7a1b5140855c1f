//! User records.
//!
//! One row per username in [`Table::Users`], holding the JSON-encoded
//! [`User`] under a single `user` column.

use std::sync::Arc;

use chrono::Utc;
use twissandra_db::{ColumnKey, Row, Store, Table};
use twissandra_types::{User, Username};

use crate::error::CoreError;
use crate::retry::RetryPolicy;

/// Column holding the serialized record.
const USER_COLUMN: &str = "user";

/// Reads and writes user records.
pub struct UserRepository<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S> Clone for UserRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry,
        }
    }
}

impl<S: Store> UserRepository<S> {
    /// Create a repository over the given store.
    pub const fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Register a new user.
    ///
    /// The existence check and the write are two store calls, so two
    /// concurrent registrations of the same name can both succeed; the later
    /// write wins and the records are identical apart from `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the name is already taken.
    pub async fn register(&self, username: &Username) -> Result<User, CoreError> {
        if self.find(username).await?.is_some() {
            return Err(CoreError::InvalidInput(format!(
                "username {username} is already taken"
            )));
        }

        let user = User {
            username: username.clone(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_vec(&user).map_err(twissandra_db::DbError::from)?;
        let column = ColumnKey::from_name(USER_COLUMN);
        self.retry
            .run("register user", || {
                self.store
                    .put(Table::Users, username.as_str(), &column, &value)
            })
            .await?;

        tracing::info!(username = %username, "User registered");
        Ok(user)
    }

    /// Look up a user, returning `None` if not registered.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] or [`CoreError::Store`] if the
    /// record cannot be read or decoded.
    pub async fn find(&self, username: &Username) -> Result<Option<User>, CoreError> {
        let key = [username.as_str().to_owned()];
        let rows = self
            .retry
            .run("get user", || self.store.multi_get(Table::Users, &key))
            .await?;
        rows.get(username.as_str())
            .map(|row| decode(username.as_str(), row))
            .transpose()
    }

    /// Look up a user.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the user is not registered.
    pub async fn get(&self, username: &Username) -> Result<User, CoreError> {
        self.find(username)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {username}")))
    }

    /// Look up several users in one batched read.
    ///
    /// Unknown names are left out of the result; undecodable records are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] if the batch read fails.
    pub async fn get_many(&self, usernames: &[Username]) -> Result<Vec<User>, CoreError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = usernames.iter().map(|u| u.as_str().to_owned()).collect();
        let rows = self
            .retry
            .run("get users", || self.store.multi_get(Table::Users, &keys))
            .await?;

        let mut users = Vec::with_capacity(rows.len());
        for name in &keys {
            let Some(row) = rows.get(name) else {
                continue;
            };
            match decode(name, row) {
                Ok(user) => users.push(user),
                Err(err) => {
                    tracing::warn!(
                        username = %name,
                        error = %err,
                        "Skipping unreadable user record"
                    );
                }
            }
        }
        Ok(users)
    }
}

fn decode(name: &str, row: &Row) -> Result<User, CoreError> {
    let corrupt = |reason: String| twissandra_db::DbError::Corrupt {
        table: Table::Users,
        row: name.to_owned(),
        reason,
    };
    let bytes = row
        .get(&ColumnKey::from_name(USER_COLUMN))
        .ok_or_else(|| corrupt("missing user column".to_owned()))?;
    serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()).into())
}
