//! Validated usernames.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum username length in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// Reasons a string is rejected as a [`Username`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    /// The name is empty.
    #[error("username is empty")]
    Empty,

    /// The name is longer than [`MAX_USERNAME_LEN`].
    #[error("username {0:?} is longer than {MAX_USERNAME_LEN} characters")]
    TooLong(String),

    /// The name contains something other than ASCII letters, digits or `_`.
    #[error("username {0:?} may only contain ASCII letters, digits and underscores")]
    InvalidCharacter(String),
}

/// A user's unique handle.
///
/// Restricted to ASCII letters, digits and underscores, which keeps it apart
/// from reserved row keys such as [`PUBLIC_FEED_KEY`].
///
/// [`PUBLIC_FEED_KEY`]: crate::PUBLIC_FEED_KEY
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Validate and wrap `name`.
    ///
    /// # Errors
    ///
    /// Returns [`UsernameError`] if `name` is empty, too long, or contains a
    /// character outside `[A-Za-z0-9_]`.
    pub fn new(name: impl Into<String>) -> Result<Self, UsernameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(UsernameError::Empty);
        }
        if name.len() > MAX_USERNAME_LEN {
            return Err(UsernameError::TooLong(name));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(UsernameError::InvalidCharacter(name));
        }
        Ok(Self(name))
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the inner [`String`].
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for Username {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
