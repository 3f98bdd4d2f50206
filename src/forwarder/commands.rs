// Command handlers for the forwarder CLI

use crate::forwarder::*;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a flow needs to talk to Telegram, validated up front
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub session: PathBuf,
    pub timeout: Duration,
    pub source: PeerRef,
    pub target: Option<PeerRef>,
    pub credentials: Credentials,
}

impl ForwarderConfig {
    /// Build from CLI arguments and the credential environment
    pub fn from_args(
        connection: &ConnectionArgs,
        target: Option<&TargetArgs>,
        credentials: Credentials,
    ) -> Result<Self, ConfigError> {
        if connection.timeout == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "must be at least one second".to_string(),
            });
        }

        let source: PeerRef = connection
            .source
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                field: "source",
                reason,
            })?;

        let target = match target {
            None => None,
            Some(args) => {
                let raw = args.target.as_deref().ok_or(ConfigError::MissingTarget)?;
                let peer: PeerRef = raw.parse().map_err(|reason| ConfigError::Invalid {
                    field: "target",
                    reason,
                })?;
                if peer == source {
                    return Err(ConfigError::Invalid {
                        field: "target",
                        reason: "target and source are the same chat".to_string(),
                    });
                }
                Some(peer)
            }
        };

        let session = match &connection.session {
            Some(path) if path.as_os_str().is_empty() => {
                return Err(ConfigError::Invalid {
                    field: "session",
                    reason: "path is empty".to_string(),
                })
            }
            Some(path) => path.clone(),
            None => PathBuf::from(format!("{}.session", credentials.phone)),
        };

        Ok(Self {
            session,
            timeout: Duration::from_secs(connection.timeout),
            source,
            target,
            credentials,
        })
    }

    /// A fresh, unconnected Telegram client
    pub fn client(&self) -> TelegramClient {
        TelegramClient::new(self.credentials.clone(), self.session.clone()).with_timeout(self.timeout)
    }

    fn target(&self) -> Result<&PeerRef, ConfigError> {
        self.target.as_ref().ok_or(ConfigError::MissingTarget)
    }
}

/// Execute a forwarder command, returning the process exit code
pub async fn execute_command(command: ForwarderCommand) -> Result<i32> {
    match command {
        ForwarderCommand::Forward {
            connection,
            target,
            pacing,
        } => handle_forward(connection, target, pacing).await,
        ForwarderCommand::Cache {
            connection,
            pacing,
            cache_dir,
        } => handle_cache(connection, pacing, cache_dir.as_path()).await,
        ForwarderCommand::Replay {
            connection,
            target,
            delay,
            cache_dir,
            checkpoint,
            order,
        } => {
            handle_replay(
                connection,
                target,
                Duration::from_secs(delay),
                cache_dir.as_path(),
                checkpoint.as_path(),
                order,
            )
            .await
        }
        ForwarderCommand::Status {
            cache_dir,
            checkpoint,
            order,
        } => handle_status(cache_dir.as_path(), checkpoint.as_path(), order),
    }
}

/// Token cancelled on Ctrl+C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Process interrupted by user, shutting down");
            token.cancel();
        }
    });

    cancel
}

fn pacing_from(args: &PacingArgs) -> Result<Pacing, ConfigError> {
    Pacing::new(args.batch_size, Duration::from_secs(args.delay))
}

async fn handle_forward(
    connection: ConnectionArgs,
    target: TargetArgs,
    pacing: PacingArgs,
) -> Result<i32> {
    let config = ForwarderConfig::from_args(&connection, Some(&target), Credentials::from_env()?)?;
    let pacing = pacing_from(&pacing)?;
    let target = config.target()?;

    println!("Forwarding {} -> {}", config.source, target);
    println!("  Batch size: {}", pacing.batch_size);
    println!("  Delay: {}s", pacing.delay.as_secs());

    let cancel = cancel_on_ctrl_c();
    let summary = forward_direct(config.client(), &config.source, target, &pacing, &cancel).await;

    report(&summary, "Forwarded");
    Ok(summary.stop.exit_code())
}

async fn handle_cache(connection: ConnectionArgs, pacing: PacingArgs, cache_dir: &Path) -> Result<i32> {
    let config = ForwarderConfig::from_args(&connection, None, Credentials::from_env()?)?;
    let pacing = pacing_from(&pacing)?;
    let store = DirBatchStore::open(cache_dir)
        .with_context(|| format!("Failed to open cache directory {:?}", cache_dir))?;

    println!("Caching {} into {:?}", config.source, store.dir());
    println!("  Batch size: {}", pacing.batch_size);

    let cancel = cancel_on_ctrl_c();
    let summary = cache_history(config.client(), &store, &config.source, &pacing, &cancel).await;

    report(&summary, "Cached");
    Ok(summary.stop.exit_code())
}

async fn handle_replay(
    connection: ConnectionArgs,
    target: TargetArgs,
    delay: Duration,
    cache_dir: &Path,
    checkpoint: &Path,
    order: ReplayOrder,
) -> Result<i32> {
    let config = ForwarderConfig::from_args(&connection, Some(&target), Credentials::from_env()?)?;
    let store = DirBatchStore::open(cache_dir)
        .with_context(|| format!("Failed to open cache directory {:?}", cache_dir))?;
    let checkpoint = FileCheckpoint::new(checkpoint);

    let options = ReplayOptions {
        source: config.source.clone(),
        target: config.target()?.clone(),
        order,
        delay,
        retry: RetryPolicy::default(),
    };

    println!("Replaying {:?} -> {}", store.dir(), options.target);
    println!("  Order: {}", order);
    println!("  Checkpoint: {:?}", checkpoint.path());

    let cancel = cancel_on_ctrl_c();
    let summary = replay_cached(config.client(), &store, &checkpoint, &options, &cancel).await;

    report(&summary, "Forwarded");
    if let Some(ref key) = summary.checkpoint {
        println!("  Checkpoint: {}", key);
    }
    Ok(summary.stop.exit_code())
}

fn handle_status(cache_dir: &Path, checkpoint: &Path, order: ReplayOrder) -> Result<i32> {
    if !cache_dir.is_dir() {
        println!("No cache at {:?}", cache_dir);
        return Ok(0);
    }

    let store = DirBatchStore::open(cache_dir)?;
    let last = FileCheckpoint::new(checkpoint)
        .read()
        .context("Failed to read checkpoint")?;

    let keys = store.list_keys()?;
    let batches = plan_replay(keys.clone(), None, order).keys;
    let ignored = keys.len() - batches.len();
    let plan = plan_replay(keys, last.as_deref(), order);

    let mut total = 0;
    let mut broken = 0;

    println!("Cache {:?}:", store.dir());
    for key in &batches {
        match store.read(key) {
            Ok(page) => {
                total += page.len();
                println!("  {:<20} {:>4} messages", key, page.len());
            }
            Err(e) => {
                broken += 1;
                println!("  {:<20} unreadable ({})", key, e);
            }
        }
    }

    println!();
    println!("  Messages: {}", total);
    if broken > 0 {
        println!("  Unreadable batches: {}", broken);
    }
    if ignored > 0 {
        println!("  Other files ignored: {}", ignored);
    }

    match (&last, &plan.resumed_from) {
        (None, _) => println!("  Checkpoint: none, replay starts at the first batch"),
        (Some(key), Some(_)) => println!(
            "  Checkpoint: {} ({} batches left, including it)",
            key,
            plan.keys.len()
        ),
        (Some(key), None) => println!("  Checkpoint: {} (not in cache, replay starts over)", key),
    }

    Ok(0)
}

fn report(summary: &RunSummary, verb: &str) {
    println!();
    println!(
        "{} {} {} messages in {} batches: {}",
        if summary.is_success() { "✓" } else { "✗" },
        verb,
        summary.messages,
        summary.pages,
        summary.stop
    );
    if summary.skipped > 0 {
        println!("  Skipped batches: {}", summary.skipped);
    }
    if summary.failed > 0 {
        println!("  Failed batches: {}", summary.failed);
    }
}
