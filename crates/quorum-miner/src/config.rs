use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use quorum::{MissingHandlerPolicy, PoolConfig};
use std::path::PathBuf;

/// What a worker does with a job it has no handler for.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingHandler {
    /// Skip the job and keep serving.
    Ignore,
    /// Stop the worker and shrink the quorum.
    Terminate,
    /// Stop the worker and fail the pool at shutdown.
    Fatal,
}

impl From<MissingHandler> for MissingHandlerPolicy {
    fn from(value: MissingHandler) -> Self {
        match value {
            MissingHandler::Ignore => Self::Ignore,
            MissingHandler::Terminate => Self::TerminateWorker,
            MissingHandler::Fatal => Self::Fatal,
        }
    }
}

/// Which hash puzzle every round mines.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzleKind {
    /// The hash must be divisible by ten.
    TrailingZero,
    /// The hash must leave a random remainder modulo a random modulus,
    /// drawn fresh for each round.
    Modulo,
}

/// Runtime configuration for the `quorum-miner` binary.
///
/// Every value can come from a flag, an environment variable, or a `.env`
/// file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "quorum-miner",
    version,
    about = "Mines toy blocks on a pool of workers that must all agree"
)]
pub struct CliArgs {
    /// Number of worker threads in the pool.
    ///
    /// Every job is dispatched once by each of them.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 5)]
    pub workers: usize,

    /// Number of blocks to mine before exiting.
    ///
    /// Environment variable: `ROUNDS`
    #[arg(long, env = "ROUNDS", default_value_t = 3)]
    pub rounds: usize,

    /// Directory holding one `process-<id>.jsonl` file per worker.
    ///
    /// Environment variable: `STORE_DIR`
    #[arg(long, env = "STORE_DIR", default_value = "blocks")]
    pub store_dir: PathBuf,

    /// Longest time, in milliseconds, a blocked worker or coordinator sleeps
    /// before re-checking the queue.
    ///
    /// Environment variable: `POLL_INTERVAL_MS`
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 2)]
    pub poll_interval_ms: u64,

    /// Policy for jobs without a registered handler.
    ///
    /// Environment variable: `MISSING_HANDLER`
    #[arg(long, env = "MISSING_HANDLER", value_enum, default_value_t = MissingHandler::Ignore)]
    pub missing_handler: MissingHandler,

    /// Puzzle mined in every round.
    ///
    /// Environment variable: `PUZZLE`
    #[arg(long, env = "PUZZLE", value_enum, default_value_t = PuzzleKind::TrailingZero)]
    pub puzzle: PuzzleKind,

    /// Owner id written into every block.
    ///
    /// Environment variable: `OWNER_ID`
    #[arg(long, env = "OWNER_ID", default_value = "1")]
    pub owner_id: String,

    /// Owner name written into every block.
    ///
    /// Environment variable: `OWNER_NAME`
    #[arg(long, env = "OWNER_NAME", default_value = "satoshi")]
    pub owner_name: String,

    /// Message carried by the mined blocks. The round number is appended.
    ///
    /// Environment variable: `MESSAGE`
    #[arg(long, env = "MESSAGE", default_value = "hello quorum")]
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub pool: PoolConfig,
    pub rounds: usize,
    pub store_dir: PathBuf,
    pub puzzle: PuzzleKind,
    pub owner_id: String,
    pub owner_name: String,
    pub message: String,
}

impl TryFrom<CliArgs> for MinerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if u32::try_from(args.workers).is_err() {
            bail!("NUM_WORKERS ({}) exceeds {}", args.workers, u32::MAX);
        }

        if args.poll_interval_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than 0");
        }

        if args.owner_id.trim().is_empty() {
            bail!("OWNER_ID must not be empty");
        }

        let pool = PoolConfig::new(args.workers)
            .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
            .with_missing_handler(args.missing_handler.into());
        pool.validate()?;

        Ok(Self {
            pool,
            rounds: args.rounds,
            store_dir: args.store_dir,
            puzzle: args.puzzle,
            owner_id: args.owner_id,
            owner_name: args.owner_name,
            message: args.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<MinerConfig> {
        let argv = std::iter::once("quorum-miner").chain(args.iter().copied());
        MinerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn flags_reach_the_pool_config() {
        let config = parse(&[
            "--workers",
            "8",
            "--poll-interval-ms",
            "5",
            "--missing-handler",
            "terminate",
            "--puzzle",
            "modulo",
            "--store-dir",
            "/tmp/quorum",
        ])
        .unwrap();

        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.pool.poll_interval, Duration::from_millis(5));
        assert_eq!(
            config.pool.missing_handler,
            MissingHandlerPolicy::TerminateWorker
        );
        assert_eq!(config.puzzle, PuzzleKind::Modulo);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/quorum"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse(&["--workers", "0"]).is_err());
        assert!(parse(&["--poll-interval-ms", "0"]).is_err());
        assert!(parse(&["--owner-id", " "]).is_err());
        assert!(parse(&["--missing-handler", "panic"]).is_err());
    }
}
