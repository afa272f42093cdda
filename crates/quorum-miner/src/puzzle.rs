//! Jobs understood by the miner pool and the handlers that answer them.

use crate::block::Block;
use quorum::{Message, Tagged, Verify, WorkerId};
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};

/// Upper bound on nonces tried per worker before giving up on a puzzle.
pub const MAX_ATTEMPTS: u64 = 1 << 24;

/// Acceptance rule for a mined hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PuzzleRule {
    /// The hash must end in a decimal zero.
    TrailingZero,
    /// `hash % modulus == remainder`.
    Modulo { modulus: u64, remainder: u64 },
}

impl PuzzleRule {
    /// A modulo rule with `remainder` in `[0, 100)` and `modulus` strictly
    /// greater than it.
    pub fn random_modulo() -> Self {
        let mut rng = rng();
        let remainder = rng.random_range(0..100);
        let modulus = 1 + remainder + rng.random_range(0..2000);
        Self::Modulo { modulus, remainder }
    }

    pub fn accepts(&self, hash: u64) -> bool {
        match *self {
            Self::TrailingZero => hash % 10 == 0,
            Self::Modulo { modulus, remainder } => hash % modulus == remainder,
        }
    }
}

/// A block to mine and the rule its hash has to satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashPuzzle {
    pub block: Block,
    pub rule: PuzzleRule,
}

impl HashPuzzle {
    pub const fn new(block: Block, rule: PuzzleRule) -> Self {
        Self { block, rule }
    }

    /// Searches nonces upward from `start`, wrapping around, and returns the
    /// sealed block for the first one whose digest satisfies the rule.
    pub fn solve_from(&self, start: u64, attempts: u64) -> Option<Block> {
        let nonce = (0..attempts)
            .map(|i| start.wrapping_add(i))
            .find(|&nonce| self.rule.accepts(self.block.digest(nonce)))?;

        let mut block = self.block.clone();
        block.seal(block.digest(nonce), nonce);
        Some(block)
    }
}

impl Verify<Outcome> for HashPuzzle {
    fn verify(&self, candidate: &Outcome) -> bool {
        match candidate {
            Outcome::Block(mined) => {
                mined.same_payload(&self.block)
                    && mined.verify_integrity()
                    && self.rule.accepts(mined.hash)
            }
            _ => false,
        }
    }
}

/// Work broadcast to every miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Mine(HashPuzzle),
    Echo(String),
    Factor(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobTag {
    Mine,
    Echo,
    Factor,
}

impl Tagged for Job {
    type Tag = JobTag;

    fn tag(&self) -> JobTag {
        match self {
            Self::Mine(_) => JobTag::Mine,
            Self::Echo(_) => JobTag::Echo,
            Self::Factor(_) => JobTag::Factor,
        }
    }
}

/// What a miner answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Block(Block),
    Echo(String),
    Factors(Vec<u64>),
}

/// Brute-forces the puzzle from a random nonce.
pub fn mine(worker: WorkerId, msg: &Message<Job>) -> Option<Outcome> {
    let Some(Job::Mine(puzzle)) = msg.job() else {
        return None;
    };
    let start = rng().random::<u64>();
    let Some(mined) = puzzle.solve_from(start, MAX_ATTEMPTS) else {
        tracing::warn!("{worker} gave up on {} after {MAX_ATTEMPTS} nonces", msg.id());
        return None;
    };
    tracing::debug!("{worker} found nonce {} for {}", mined.nonce, msg.id());
    Some(Outcome::Block(mined))
}

/// Answers with the text it was given.
pub fn echo(worker: WorkerId, msg: &Message<Job>) -> Option<Outcome> {
    let Some(Job::Echo(text)) = msg.job() else {
        return None;
    };
    tracing::info!("{worker} echoes {text:?}");
    Some(Outcome::Echo(text.clone()))
}

/// Answers with the prime factors of the number, in ascending order.
pub fn factorize(_worker: WorkerId, msg: &Message<Job>) -> Option<Outcome> {
    match msg.job() {
        Some(Job::Factor(n)) => prime_factors(*n).map(Outcome::Factors),
        _ => None,
    }
}

/// Trial division. Zero has no factorization; one has an empty one.
pub fn prime_factors(mut n: u64) -> Option<Vec<u64>> {
    if n == 0 {
        return None;
    }
    let mut factors = Vec::new();
    let mut d = 2;
    while d <= n / d {
        while n % d == 0 {
            factors.push(d);
            n /= d;
        }
        d += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    Some(factors)
}
