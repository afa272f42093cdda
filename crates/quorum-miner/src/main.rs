#![doc = include_str!("../README.md")]

mod block;
mod config;
mod puzzle;
mod store;
mod telemetry;

use anyhow::Context;
use block::Block;
use clap::Parser;
use config::{CliArgs, MinerConfig, PuzzleKind};
use puzzle::{HashPuzzle, Job, JobTag, Outcome, PuzzleRule};
use quorum::{Coordinator, Response};
use store::JsonlStore;
use telemetry::init_telemetry;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type MinerPool = Coordinator<Job, Outcome, JsonlStore>;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = MinerConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let store = JsonlStore::open(&config.store_dir)
        .with_context(|| format!("cannot open store at {}", config.store_dir.display()))?;

    let pool = Coordinator::<Job, Outcome>::builder(config.pool.clone())
        .handler(JobTag::Mine, puzzle::mine)
        .handler(JobTag::Echo, puzzle::echo)
        .handler(JobTag::Factor, puzzle::factorize)
        .build_with_store(store)?;

    warm_up(&pool)?;

    for round in 1..=config.rounds {
        let block = Block::new(
            config.owner_id.as_str(),
            config.owner_name.as_str(),
            format!("{} #{round}", config.message),
        );
        let puzzle = HashPuzzle::new(block, rule_for(config.puzzle));
        tracing::info!("Round {round}/{}: mining with {:?}", config.rounds, puzzle.rule);

        match pool.mine(Job::Mine(puzzle.clone()), &puzzle) {
            Ok(report) => tracing::info!(
                "Round {round}: {} won with {} of {} workers agreeing",
                report.record.worker,
                report.record.verified_by + 1,
                report.record.total_workers
            ),
            Err(quorum::Error::NoValidResponse { harvested, .. }) => {
                tracing::warn!("Round {round}: none of {harvested} responses was valid");
            }
            Err(e) => return Err(e.into()),
        }
    }

    for record in pool.find(&|_| true)? {
        if let Outcome::Block(block) = &record.result {
            println!("{block}");
        }
    }

    pool.shutdown()?;
    tracing::info!("Miner shut down successfully");
    Ok(())
}

/// Echoes a greeting and factors a number through the whole pool, then
/// drains the answers so the first mining round starts clean.
fn warm_up(pool: &MinerPool) -> anyhow::Result<()> {
    pool.broadcast(Job::Echo("hello from the coordinator".into()))?;
    pool.broadcast(Job::Factor(600_851_475_143))?;
    pool.await_completion();

    for response in pool.drain_responses() {
        log_response(&response);
    }
    Ok(())
}

fn log_response(response: &Response<Outcome>) {
    match response.result() {
        Outcome::Echo(text) => tracing::debug!("{} echoed {text:?}", response.sender()),
        Outcome::Factors(factors) => {
            tracing::debug!("{} factored into {factors:?}", response.sender());
        }
        Outcome::Block(block) => {
            tracing::debug!("{} mined nonce {}", response.sender(), block.nonce);
        }
    }
}

fn rule_for(kind: PuzzleKind) -> PuzzleRule {
    match kind {
        PuzzleKind::TrailingZero => PuzzleRule::TrailingZero,
        PuzzleKind::Modulo => PuzzleRule::random_modulo(),
    }
}

fn log_startup_info(config: &MinerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting miner with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting miner with {} workers for {} rounds",
            config.pool.workers,
            config.rounds
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum::{PoolConfig, Verify, WorkerId};
    use std::fs;

    #[test]
    fn a_mined_block_lands_in_the_winner_partition_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        let pool: MinerPool = Coordinator::<Job, Outcome>::builder(PoolConfig::new(5))
            .handler(JobTag::Mine, puzzle::mine)
            .build_with_store(store.clone())
            .unwrap();

        let puzzle = HashPuzzle::new(Block::new("1", "satoshi", "e2e"), PuzzleRule::TrailingZero);
        let report = pool.mine(Job::Mine(puzzle.clone()), &puzzle).unwrap();
        let winner = report.record.worker;

        assert_eq!(report.harvested, 5);
        assert_eq!(report.record.total_workers, 5);
        assert_eq!(report.record.verified_by, 4);
        assert!(puzzle.verify(&report.record.result));

        let lines = fs::read_to_string(store.partition(winner)).unwrap();
        assert_eq!(lines.lines().count(), 1);
        for other in (1..=5).map(WorkerId::new).filter(|w| *w != winner) {
            assert!(!store.partition(other).exists(), "{other} wrote a record");
        }

        let stored = pool.find(&|_| true).unwrap();
        assert_eq!(stored, vec![report.record]);
        pool.shutdown().unwrap();
    }
}
