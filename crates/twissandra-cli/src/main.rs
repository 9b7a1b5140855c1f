//! `twissandra` command-line front end.
//!
//! Runs one service operation per invocation and prints the result as JSON
//! on stdout. Logs go to stderr.
//!
//! # Startup Sequence
//!
//! 1. Parse arguments
//! 2. Load configuration from `twissandra-config.yaml` (or `--config`)
//! 3. Initialize structured logging (tracing)
//! 4. Open the configured store backend
//! 5. Run the subcommand and print its result

mod cli;
mod error;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use twissandra_core::config::{LoggingConfig, StoreBackend, TwissandraConfig};
use twissandra_core::{EngineConfig, Twissandra};
use twissandra_db::{DragonflyStore, MemoryStore, PostgresConfig, PostgresStore, Store};

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the store connection or the command
/// itself fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    init_logging(&config.logging);
    info!(
        backend = ?config.store.backend,
        fanout_width = config.fanout.width,
        "Configuration loaded"
    );

    let engine = config.engine();
    let output = match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; nothing outlives this process");
            execute(Arc::new(MemoryStore::new()), &engine, cli.command).await?
        }
        StoreBackend::Postgres => {
            let pg = PostgresConfig::new(&config.store.postgres_url)
                .with_max_connections(config.store.max_connections)
                .with_connect_timeout(config.store.connect_timeout());
            let store = PostgresStore::connect(&pg).await.map_err(CliError::from)?;
            if config.store.run_migrations {
                store.run_migrations().await.map_err(CliError::from)?;
            }
            let result = execute(Arc::new(store.clone()), &engine, cli.command).await;
            store.close().await;
            result?
        }
        StoreBackend::Dragonfly => {
            let store = DragonflyStore::connect(&config.store.dragonfly_url)
                .await
                .map_err(CliError::from)?;
            execute(Arc::new(store), &engine, cli.command).await?
        }
    };

    println!("{output}");
    Ok(())
}

/// Load configuration, falling back to defaults when the file is absent.
fn load_config(path: &Path) -> Result<TwissandraConfig, CliError> {
    if path.exists() {
        Ok(TwissandraConfig::from_file(path)?)
    } else {
        Ok(TwissandraConfig::parse("")?)
    }
}

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run one subcommand against a store and render its result.
async fn execute<S: Store>(
    store: Arc<S>,
    engine: &EngineConfig,
    command: Command,
) -> Result<String, CliError> {
    let svc = Twissandra::new(store, engine);
    match command {
        Command::Register { username } => render(&svc.register(&username).await?),
        Command::User { username } => render(&svc.user(&username).await?),
        Command::Post { author, body } => {
            let tweet = svc.post_tweet(&author, &body).await?;
            info!(tweet_id = %tweet.id, "Tweet posted");
            render(&tweet)
        }
        Command::Follow { from, to } => {
            svc.follow_many(&from, to.as_slice()).await?;
            render(&serde_json::json!({ "follower": from, "followed": to }))
        }
        Command::Unfollow { from, to } => {
            svc.unfollow(&from, &to).await?;
            render(&serde_json::json!({ "follower": from, "unfollowed": to }))
        }
        Command::Feed {
            kind,
            owner,
            cursor,
            limit,
        } => render(
            &svc.get_feed(kind, owner.as_deref(), cursor.as_deref(), limit)
                .await?,
        ),
        Command::Tweet { id } => render(&svc.tweet(&id).await?),
        Command::Following {
            username,
            limit,
            records,
        } => {
            if records {
                render(&svc.friends(&username, limit).await?)
            } else {
                render(&svc.followees(&username, limit).await?)
            }
        }
        Command::Followers {
            username,
            limit,
            records,
        } => {
            if records {
                render(&svc.follower_users(&username, limit).await?)
            } else {
                render(&svc.followers(&username, limit).await?)
            }
        }
    }
}

fn render<T: Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use twissandra_types::FeedKind;

    use super::*;

    #[tokio::test]
    async fn commands_share_one_store() {
        let store = Arc::new(MemoryStore::new());
        let engine = EngineConfig::default();
        let run = |command| execute(Arc::clone(&store), &engine, command);

        run(Command::Register {
            username: "brian".to_owned(),
        })
        .await
        .unwrap();
        let posted = run(Command::Post {
            author: "brian".to_owned(),
            body: "Shaken, not stirred".to_owned(),
        })
        .await
        .unwrap();
        assert!(posted.contains("\"author\": \"brian\""));

        let page = run(Command::Feed {
            kind: FeedKind::Public,
            owner: None,
            cursor: None,
            limit: None,
        })
        .await
        .unwrap();
        let page: serde_json::Value = serde_json::from_str(&page).unwrap();
        assert_eq!(page["items"].as_array().map(Vec::len), Some(1));
        assert!(page["next_cursor"].is_null());
    }

    #[tokio::test]
    async fn engine_errors_surface() {
        let err = execute(
            Arc::new(MemoryStore::new()),
            &EngineConfig::default(),
            Command::Tweet {
                id: "nope".to_owned(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CliError::Core { .. }));
    }

    #[test]
    fn missing_config_file_means_defaults() {
        let config = load_config(Path::new("does-not-exist.yaml")).unwrap();
        assert_eq!(config.fanout.default_page_size, 40);
    }
}
