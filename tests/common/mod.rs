//! Shared harness for the multi-rank integration tests.

#![allow(dead_code)]

use std::time::Duration;

use mpi_bridge::{LocalConfig, Mpi, Result, Universe};

/// Upper bound for any single blocking call, so a hang fails the test.
pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn config(size: usize) -> LocalConfig {
    LocalConfig::new(size).with_timeout(TIMEOUT)
}

/// Run `f` on `size` ranks and unwrap every rank's result.
pub fn run<F, R>(size: usize, f: F) -> Vec<R>
where
    F: Fn(Mpi) -> Result<R> + Sync,
    R: Send,
{
    Universe::new(config(size))
        .run(f)
        .expect("universe aborted")
        .into_iter()
        .enumerate()
        .map(|(rank, result)| result.unwrap_or_else(|e| panic!("rank {rank} failed: {e}")))
        .collect()
}
