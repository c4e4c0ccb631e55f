//! In-process transport: every rank is a thread of the current process.
//!
//! A [`Universe`] owns the state all ranks share (one mailbox per rank and the
//! collective rendezvous table). Each rank talks to it through its own
//! [`LocalTransport`] endpoint.
//!
//! Sends are eager: the payload is copied into the destination mailbox and the
//! send completes at once. A rank can therefore send to itself, and ring
//! patterns where every rank sends before receiving cannot deadlock.
//!
//! # Example
//!
//! ```
//! use mpi_bridge::{LocalConfig, Universe, ANY_SOURCE, ANY_TAG};
//!
//! // Every rank reports to rank 0, rank 0 included
//! let results = Universe::new(LocalConfig::new(3))
//!     .run(|mpi| -> mpi_bridge::Result<Vec<String>> {
//!         let world = mpi.world()?;
//!         world.send(&format!("Hello from {}", world.rank()), 0, world.rank())?;
//!         let mut lines = Vec::new();
//!         if world.rank() == 0 {
//!             for _ in 0..world.size() {
//!                 let mut buf = vec![0u8; 32];
//!                 let status = world.recv(&mut buf, ANY_SOURCE, ANY_TAG)?;
//!                 buf.truncate(status.count as usize);
//!                 lines.push(String::from_utf8_lossy(&buf).into_owned());
//!             }
//!         }
//!         Ok(lines)
//!     })
//!     .unwrap();
//! assert_eq!(results[0].as_ref().unwrap().len(), 3);
//! ```

mod config;
mod endpoint;
mod reduce;
mod state;

pub use config::{LocalConfig, ENV_ERRHANDLER, ENV_NP, ENV_TIMEOUT_MS};
pub use endpoint::{CallCounts, LocalTransport};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crate::error::{Error, Result};
use crate::Mpi;
use state::Shared;

/// A group of in-process ranks.
pub struct Universe {
    shared: Arc<Shared>,
}

impl Universe {
    /// Build the shared state for `config.size` ranks.
    pub fn new(config: LocalConfig) -> Self {
        Universe {
            shared: Arc::new(Shared::new(config)),
        }
    }

    /// Number of ranks.
    pub fn size(&self) -> i32 {
        self.shared.size()
    }

    /// The configuration the universe was built with.
    pub fn config(&self) -> &LocalConfig {
        &self.shared.config
    }

    /// One fresh endpoint per rank, in rank order.
    ///
    /// For harnesses that drive ranks themselves. Each endpoint must be used
    /// from a single thread of control.
    pub fn endpoints(&self) -> Vec<LocalTransport> {
        (0..self.size())
            .map(|rank| LocalTransport::new(Arc::clone(&self.shared), rank))
            .collect()
    }

    /// Run `f` once per rank, each on its own thread, and collect the results
    /// in rank order.
    ///
    /// If any rank panics, the universe is aborted: blocked calls on every
    /// other rank fail and `run` returns [`Error::Internal`].
    pub fn run<F, R>(&self, f: F) -> Result<Vec<R>>
    where
        F: Fn(Mpi) -> R + Sync,
        R: Send,
    {
        tracing::debug!(size = self.size(), "universe starting");
        let f = &f;
        let outcomes: Vec<Result<R>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.size())
                .map(|rank| {
                    let shared = Arc::clone(&self.shared);
                    scope.spawn(move || run_rank(shared, rank, f))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| Err(Error::Internal(panic_message(&*payload))))
                })
                .collect()
        });
        outcomes.into_iter().collect()
    }
}

fn run_rank<F, R>(shared: Arc<Shared>, rank: i32, f: &F) -> Result<R>
where
    F: Fn(Mpi) -> R,
{
    let transport = Arc::new(LocalTransport::new(Arc::clone(&shared), rank));
    let mpi = match Mpi::init(transport) {
        Ok(mpi) => mpi,
        Err(err) => {
            shared.abort();
            return Err(err);
        }
    };
    match panic::catch_unwind(AssertUnwindSafe(|| f(mpi))) {
        Ok(value) => {
            tracing::debug!(rank, "rank finished");
            Ok(value)
        }
        Err(payload) => {
            shared.abort();
            let message = panic_message(&*payload);
            tracing::error!(rank, %message, "rank panicked, aborting universe");
            Err(Error::Internal(format!("rank {rank} panicked: {message}")))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
