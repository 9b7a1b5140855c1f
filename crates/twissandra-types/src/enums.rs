//! Enumeration types shared across the workspace.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Row key of the global public line.
///
/// Contains `!`, which [`Username`] never admits, so it cannot collide with a
/// user's own row.
///
/// [`Username`]: crate::Username
pub const PUBLIC_FEED_KEY: &str = "!PUBLIC!";

/// The three logical feed spaces a reader can page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Tweets authored by the feed owner.
    Userline,
    /// Tweets shown to the feed owner: their own plus their followees'.
    Timeline,
    /// The global firehose, stored under [`PUBLIC_FEED_KEY`].
    Public,
}

impl FeedKind {
    /// Lowercase name used in configuration and on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Userline => "userline",
            Self::Timeline => "timeline",
            Self::Public => "public",
        }
    }
}

impl core::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no [`FeedKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feed kind {0:?} (expected userline, timeline or public)")]
pub struct FeedKindParseError(pub String);

impl FromStr for FeedKind {
    type Err = FeedKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "userline" => Ok(Self::Userline),
            "timeline" => Ok(Self::Timeline),
            "public" => Ok(Self::Public),
            _ => Err(FeedKindParseError(s.to_owned())),
        }
    }
}
