// CLI for the forwarder

use crate::forwarder::checkpoint::DEFAULT_CHECKPOINT_FILE;
use crate::forwarder::message::ReplayOrder;
use crate::forwarder::storage::DEFAULT_CACHE_DIR;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Forward saved Telegram messages into a group, in batches
#[derive(Debug, Parser)]
#[command(name = "tgforward")]
#[command(author, version, about, long_about = None)]
pub struct ForwarderCli {
    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: ForwarderCommand,
}

/// Forwarder subcommands
#[derive(Debug, Subcommand)]
pub enum ForwarderCommand {
    /// Forward the source history straight into the target chat
    Forward {
        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        pacing: PacingArgs,
    },

    /// Cache the source history into numbered batch files
    Cache {
        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        pacing: PacingArgs,

        /// Directory for batch files
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,
    },

    /// Forward cached batches into the target chat, resuming from the checkpoint
    Replay {
        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Seconds to wait between batches
        #[arg(long, default_value = "10")]
        delay: u64,

        /// Directory holding batch files
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,

        /// Checkpoint file
        #[arg(long, default_value = DEFAULT_CHECKPOINT_FILE)]
        checkpoint: PathBuf,

        /// Order in which batches are replayed
        #[arg(long, value_enum, default_value_t = ReplayOrder::OldestFirst)]
        order: ReplayOrder,
    },

    /// Show the cache contents and where a replay would resume
    Status {
        /// Directory holding batch files
        #[arg(long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,

        /// Checkpoint file
        #[arg(long, default_value = DEFAULT_CHECKPOINT_FILE)]
        checkpoint: PathBuf,

        /// Order in which batches would be replayed
        #[arg(long, value_enum, default_value_t = ReplayOrder::OldestFirst)]
        order: ReplayOrder,
    },
}

/// Telegram session and the chat to read from
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Session file [default: <phone number>.session]
    #[arg(long, env = "TGFORWARD_SESSION")]
    pub session: Option<PathBuf>,

    /// Source chat: "me" for saved messages, a chat id or @username
    #[arg(long, default_value = "me", allow_hyphen_values = true)]
    pub source: String,

    /// Seconds to wait for each Telegram call
    #[arg(long, default_value = "60")]
    pub timeout: u64,
}

/// Chat receiving the forwarded messages
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Target group or supergroup: chat id (e.g. -1001234567890) or @username
    #[arg(short, long, env = "TGFORWARD_TARGET", allow_hyphen_values = true)]
    pub target: Option<String>,
}

/// Batch size and pause between batches
#[derive(Debug, Clone, Args)]
pub struct PacingArgs {
    /// Messages per batch (1-100)
    #[arg(short, long, default_value = "100")]
    pub batch_size: usize,

    /// Seconds to wait between batches
    #[arg(long, default_value = "10")]
    pub delay: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = vec![
            "tgforward",
            "forward",
            "--target",
            "-1001234567890",
            "--batch-size",
            "50",
        ];

        let cli = ForwarderCli::try_parse_from(args).unwrap();
        match cli.command {
            ForwarderCommand::Forward { target, pacing, connection } => {
                assert_eq!(target.target.as_deref(), Some("-1001234567890"));
                assert_eq!(pacing.batch_size, 50);
                assert_eq!(pacing.delay, 10);
                assert_eq!(connection.source, "me");
                assert_eq!(connection.timeout, 60);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_replay_defaults() {
        let cli = ForwarderCli::try_parse_from(vec!["tgforward", "replay", "-t", "@mygroup"]).unwrap();
        match cli.command {
            ForwarderCommand::Replay {
                cache_dir,
                checkpoint,
                order,
                delay,
                ..
            } => {
                assert_eq!(cache_dir, PathBuf::from("cached_batches"));
                assert_eq!(checkpoint, PathBuf::from("checkpoint.txt"));
                assert_eq!(order, ReplayOrder::OldestFirst);
                assert_eq!(delay, 10);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_session_option() {
        let cli = ForwarderCli::try_parse_from(vec![
            "tgforward",
            "cache",
            "--session",
            "/tmp/work.session",
        ])
        .unwrap();
        match cli.command {
            ForwarderCommand::Cache { connection, .. } => {
                assert_eq!(connection.session, Some(PathBuf::from("/tmp/work.session")));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(ForwarderCli::try_parse_from(vec![
            "tgforward",
            "cache",
            "--gateway",
            "127.0.0.1:9400",
        ])
        .is_err());
    }

    #[test]
    fn test_order_values() {
        let cli = ForwarderCli::try_parse_from(vec![
            "tgforward",
            "status",
            "--order",
            "as-recorded",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            ForwarderCommand::Status {
                order: ReplayOrder::AsRecorded,
                ..
            }
        ));

        assert!(ForwarderCli::try_parse_from(vec!["tgforward", "status", "--order", "random"]).is_err());
    }
}
