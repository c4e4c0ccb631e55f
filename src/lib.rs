//! # mpi-bridge
//!
//! Buffer marshalling and completion tracking for MPI-style message passing.
//!
//! This crate sits between host containers and a message-passing runtime,
//! providing:
//! - A closed [`ElementType`] registry and non-copying [`BufferView`]s over
//!   slices, vectors, strings and dynamically typed [`NumArray`]s
//! - Blocking and nonblocking point-to-point communication with exact
//!   `(source, tag, communicator)` matching
//! - Collective operations with local argument validation
//! - [`Request`] handles that pin their buffers until completion, started
//!   inside a [`scope`] that finishes any request left behind
//! - Typed errors mapped from transport codes, governed by an [`Errhandler`]
//!   policy
//!
//! The runtime itself is reached through the [`Transport`] trait. The crate
//! ships [`LocalTransport`], which runs every rank as a thread of one process.
//!
//! ## Quick Start
//!
//! ```
//! use mpi_bridge::{LocalConfig, ReduceOp, Universe};
//!
//! fn main() -> Result<(), mpi_bridge::Error> {
//!     let sums = Universe::new(LocalConfig::new(4)).run(|mpi| {
//!         let world = mpi.world()?;
//!         let rank = world.rank();
//!
//!         // Broadcast from rank 0
//!         let mut data = vec![0.0f64; 8];
//!         if rank == 0 {
//!             data.fill(42.0);
//!         }
//!         world.bcast(&mut data, 0)?;
//!
//!         // Sum of all ranks
//!         world.allreduce_scalar(rank, ReduceOp::Sum)
//!     })?;
//!
//!     for sum in sums {
//!         assert_eq!(sum?, 6);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Types
//!
//! Operations are generic over host containers implementing [`Buffer`] /
//! [`BufferMut`]. Typed slices work for every [`MpiDatatype`]: `u8`, `i8`,
//! `i16`, `i32`, `i64`, `u16`, `u32`, `u64`, `f32`, `f64`, `Complex<f32>`,
//! `Complex<f64>`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::similar_names)]

mod buffer;
mod collective;
mod comm;
mod datatype;
mod errhandler;
mod error;
pub mod local;
mod narray;
mod request;
mod status;
pub mod transport;

pub use buffer::{view_of, view_of_mut, Buffer, BufferMut, BufferView, Strided};
pub use comm::Communicator;
pub use datatype::{ElementType, MpiDatatype};
pub use errhandler::Errhandler;
pub use error::{Error, ErrorClass, Result};
pub use local::{CallCounts, LocalConfig, LocalTransport, Universe};
pub use narray::{NumArray, TypeCode};
pub use request::{scope, Request, RequestScope, RequestState};
pub use status::Status;
pub use transport::Transport;

use std::marker::PhantomData;
use std::sync::Arc;

/// Rank of a non-existent peer. Operations addressed to it complete at once.
pub const PROC_NULL: i32 = -1;

/// Wildcard source rank for receives and probes.
pub const ANY_SOURCE: i32 = -2;

/// Wildcard tag for receives and probes.
pub const ANY_TAG: i32 = -1;

/// Largest valid tag.
pub const TAG_UB: i32 = i32::MAX;

/// Reduction operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReduceOp {
    /// Sum of values
    Sum = 0,
    /// Maximum value
    Max = 1,
    /// Minimum value
    Min = 2,
    /// Product of values
    Prod = 3,
    /// Logical and
    Land = 4,
    /// Logical or
    Lor = 5,
    /// Logical exclusive or
    Lxor = 6,
    /// Bitwise and
    Band = 7,
    /// Bitwise or
    Bor = 8,
    /// Bitwise exclusive or
    Bxor = 9,
}

impl ReduceOp {
    /// Look up the operation for a transport op tag.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ReduceOp::Sum),
            1 => Some(ReduceOp::Max),
            2 => Some(ReduceOp::Min),
            3 => Some(ReduceOp::Prod),
            4 => Some(ReduceOp::Land),
            5 => Some(ReduceOp::Lor),
            6 => Some(ReduceOp::Lxor),
            7 => Some(ReduceOp::Band),
            8 => Some(ReduceOp::Bor),
            9 => Some(ReduceOp::Bxor),
            _ => None,
        }
    }

    /// Whether the operation is defined for `element_type`.
    ///
    /// | Operation | Defined for |
    /// |-----------|-------------|
    /// | `Sum`, `Prod` | integers, floats, complex |
    /// | `Max`, `Min` | integers, floats |
    /// | `Land`, `Lor`, `Lxor` | integers |
    /// | `Band`, `Bor`, `Bxor` | integers, `Byte` |
    pub fn supports(self, element_type: ElementType) -> bool {
        let integer = element_type.is_integer();
        match self {
            ReduceOp::Sum | ReduceOp::Prod => {
                integer || element_type.is_float() || element_type.is_complex()
            }
            ReduceOp::Max | ReduceOp::Min => integer || element_type.is_float(),
            ReduceOp::Land | ReduceOp::Lor | ReduceOp::Lxor => integer,
            ReduceOp::Band | ReduceOp::Bor | ReduceOp::Bxor => {
                integer || element_type == ElementType::Byte
            }
        }
    }
}

/// Message-passing session handle.
///
/// Initializes the transport on creation and finalizes it on drop. Every
/// [`Communicator`] obtained from it shares its transport.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use mpi_bridge::{LocalConfig, Mpi, Universe};
///
/// let universe = Universe::new(LocalConfig::new(1));
/// let endpoint = universe.endpoints().remove(0);
/// let mpi = Mpi::init(Arc::new(endpoint)).expect("init failed");
/// let world = mpi.world().expect("world");
/// assert_eq!(world.size(), 1);
/// // The transport is finalized when `mpi` goes out of scope
/// ```
pub struct Mpi {
    transport: Arc<dyn Transport>,
    /// Marker to make Mpi !Send and !Sync
    _marker: PhantomData<*const ()>,
}

impl Mpi {
    /// Initialize `transport` and wrap it in a session.
    pub fn init(transport: Arc<dyn Transport>) -> Result<Self> {
        Error::check(transport.init())?;
        tracing::debug!("message-passing session initialized");
        Ok(Mpi {
            transport,
            _marker: PhantomData,
        })
    }

    /// Get a handle to the world communicator.
    pub fn world(&self) -> Result<Communicator> {
        Communicator::world(Arc::clone(&self.transport))
    }

    /// The transport behind this session.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Version and subversion of the standard the transport implements.
    pub fn version(&self) -> Result<(i32, i32)> {
        let mut version = 0;
        let mut subversion = 0;
        Error::check(self.transport.get_version(&mut version, &mut subversion))?;
        Ok((version, subversion))
    }

    /// Get the current wall-clock time.
    pub fn wtime(&self) -> f64 {
        self.transport.wtime()
    }
}

impl Drop for Mpi {
    fn drop(&mut self) {
        let ret = self.transport.finalize();
        if ret != 0 {
            tracing::warn!(code = ret, "finalize failed");
        } else {
            tracing::debug!("message-passing session finalized");
        }
    }
}
