//! Shared type definitions for the Twissandra timeline engine.
//!
//! This crate is the single source of truth for the domain types used by
//! the storage layer, the engine and the command line.
//!
//! # Modules
//!
//! - [`ids`] -- Time-ordered [`TweetId`] and its monotonic generator
//! - [`username`] -- Validated [`Username`] handles
//! - [`enums`] -- [`FeedKind`] and the reserved public feed key
//! - [`structs`] -- Users, tweets, feed entries and feed pages

pub mod enums;
pub mod ids;
pub mod structs;
pub mod username;

// Re-export all public types at crate root for convenience.
pub use enums::{FeedKind, FeedKindParseError, PUBLIC_FEED_KEY};
pub use ids::{TweetId, TweetIdGenerator, TweetIdParseError};
pub use structs::{FeedEntry, FeedItem, FeedPage, Tweet, User};
pub use username::{MAX_USERNAME_LEN, Username, UsernameError};
