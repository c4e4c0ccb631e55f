//! MPI message status information.
//!
//! This module provides the [`Status`] struct produced by completed receives,
//! completed requests and probes.

use crate::error::ErrorClass;
use crate::transport::RawStatus;
use crate::{ANY_TAG, PROC_NULL};

/// Outcome of a completed receive, request or probe.
///
/// `source` and `tag` always describe the matched message, never the
/// wildcards a receive was posted with.
///
/// # Example
///
/// ```
/// # use mpi_bridge::{Universe, LocalConfig};
/// let results = Universe::new(LocalConfig::new(1))
///     .run(|mpi| {
///         let world = mpi.world()?;
///         world.send(&[1.0f64, 2.0], 0, 5)?;
///         let mut buf = [0.0f64; 4];
///         world.recv(&mut buf, mpi_bridge::ANY_SOURCE, mpi_bridge::ANY_TAG)
///     })
///     .unwrap();
/// let status = results[0].as_ref().unwrap();
/// assert_eq!((status.source, status.tag, status.count), (0, 5, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Source rank of the message, or [`PROC_NULL`].
    pub source: i32,
    /// Tag of the message.
    pub tag: i32,
    /// Error class of the operation.
    pub error: ErrorClass,
    /// Number of elements in the message.
    pub count: i64,
}

impl Status {
    /// Status of an operation whose peer was [`PROC_NULL`].
    pub fn proc_null() -> Self {
        Status {
            source: PROC_NULL,
            tag: ANY_TAG,
            error: ErrorClass::Success,
            count: 0,
        }
    }

    /// Whether the operation had no real peer.
    pub fn is_proc_null(&self) -> bool {
        self.source == PROC_NULL
    }

    pub(crate) fn from_raw(raw: &RawStatus) -> Self {
        Status {
            source: raw.source,
            tag: raw.tag,
            error: ErrorClass::from_raw(raw.error),
            count: raw.count,
        }
    }
}
