//! Command-line arguments.

use std::path::PathBuf;

use twissandra_core::service::DEFAULT_GRAPH_LIMIT;
use twissandra_types::FeedKind;

/// Post tweets, follow people and page through feeds.
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[clap(
        long,
        env = "TWISSANDRA_CONFIG",
        default_value = "twissandra-config.yaml"
    )]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

/// Subcommands, one per service operation.
#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Register a new user
    Register {
        /// Username (letters, digits and underscores)
        username: String,
    },

    /// Show a registered user
    User {
        /// Username to look up
        username: String,
    },

    /// Post a tweet and fan it out to followers
    Post {
        /// Author of the tweet
        author: String,
        /// Tweet text
        body: String,
    },

    /// Follow one or more users
    Follow {
        /// The user who follows
        from: String,
        /// Users to follow
        #[clap(required = true)]
        to: Vec<String>,
    },

    /// Stop following a user
    Unfollow {
        /// The user who unfollows
        from: String,
        /// User to stop following
        to: String,
    },

    /// Read one page of a feed
    Feed {
        /// userline, timeline or public
        kind: FeedKind,
        /// Whose feed to read (not needed for the public line)
        owner: Option<String>,
        /// The `next_cursor` of the previous page
        #[clap(long)]
        cursor: Option<String>,
        /// Page size
        #[clap(long)]
        limit: Option<usize>,
    },

    /// Show a single tweet
    Tweet {
        /// Tweet id
        id: String,
    },

    /// List the users someone follows
    Following {
        /// Whose follow list to show
        username: String,
        /// Maximum number of entries
        #[clap(long, default_value_t = DEFAULT_GRAPH_LIMIT)]
        limit: usize,
        /// Print full user records instead of names
        #[clap(long)]
        records: bool,
    },

    /// List someone's followers
    Followers {
        /// Whose followers to show
        username: String,
        /// Maximum number of entries
        #[clap(long, default_value_t = DEFAULT_GRAPH_LIMIT)]
        limit: usize,
        /// Print full user records instead of names
        #[clap(long)]
        records: bool,
    },
}
