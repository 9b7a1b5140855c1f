//! The Twissandra timeline engine: fan-out on write and paged feed reads.
//!
//! Posting a tweet stores the record once and then writes a pointer to it
//! into the author's userline, the public line and the timeline of the
//! author and every follower. Reading a feed pages those pointers newest
//! first and joins them back to tweet bodies and author records.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `twissandra-config.yaml` into
//!   strongly-typed structs.
//! - [`error`] -- [`CoreError`], shared by every component.
//! - [`retry`] -- Per-operation timeouts and bounded exponential backoff.
//! - [`users`] -- User registration and batched lookup.
//! - [`tweets`] -- Immutable tweet records and id assignment.
//! - [`graph`] -- Following and follower indexes kept as mirrors.
//! - [`fanout`] -- [`TimelineEngine`], the write path.
//! - [`feed`] -- [`FeedReader`], the cursor-paged read path.
//! - [`service`] -- The [`Twissandra`] facade over all of the above.
//!
//! [`CoreError`]: error::CoreError
//! [`TimelineEngine`]: fanout::TimelineEngine
//! [`FeedReader`]: feed::FeedReader
//! [`Twissandra`]: service::Twissandra

pub mod config;
pub mod error;
pub mod fanout;
pub mod feed;
pub mod graph;
pub mod retry;
pub mod service;
pub mod tweets;
pub mod users;

pub use config::{EngineConfig, TwissandraConfig};
pub use error::CoreError;
pub use service::Twissandra;
