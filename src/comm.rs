//! Safe wrappers for communicator operations.
//!
//! This module holds the [`Communicator`] type, its argument validation and
//! the point-to-point entry points. Collective operations live in
//! `collective.rs` as a second `impl` block.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::{view_of, view_of_mut, Buffer, BufferMut};
use crate::datatype::MpiDatatype;
use crate::errhandler::Errhandler;
use crate::error::{Error, Result};
use crate::request::{Request, RequestScope};
use crate::status::Status;
use crate::transport::{CommHandle, RawStatus, RequestHandle, Transport};
use crate::{ANY_SOURCE, ANY_TAG, PROC_NULL, TAG_UB};

/// A process group plus this process's place in it.
///
/// Rank and size are fixed when the communicator is built. The only mutable
/// state is the [`Errhandler`] policy, which every fallible call reads.
/// Communicators own no buffers: each call borrows the caller's containers
/// for exactly as long as the operation needs them.
///
/// # Example
///
/// ```
/// use mpi_bridge::{LocalConfig, Universe};
///
/// Universe::new(LocalConfig::new(2))
///     .run(|mpi| {
///         let world = mpi.world().unwrap();
///         println!("I am rank {} of {}", world.rank(), world.size());
///     })
///     .unwrap();
/// ```
pub struct Communicator {
    transport: Arc<dyn Transport>,
    handle: CommHandle,
    rank: i32,
    size: i32,
    errhandler: Cell<Errhandler>,
    /// Marker to prevent Send/Sync (one thread of control per rank)
    _marker: PhantomData<*mut ()>,
}

impl Communicator {
    /// Get a handle to the world communicator of `transport`.
    pub(crate) fn world(transport: Arc<dyn Transport>) -> Result<Self> {
        let handle = transport.world();

        let mut rank = 0;
        let mut size = 0;
        let mut policy = 0;
        Error::check(transport.comm_rank(handle, &mut rank))?;
        Error::check(transport.comm_size(handle, &mut size))?;
        Error::check(transport.errhandler_get(handle, &mut policy))?;

        if size <= 0 || rank < 0 || rank >= size {
            return Err(Error::Internal(format!(
                "transport reported rank {rank} of size {size}"
            )));
        }
        let errhandler = Errhandler::from_raw(policy)
            .ok_or_else(|| Error::Internal(format!("unknown errhandler policy {policy}")))?;

        Ok(Communicator {
            transport,
            handle,
            rank,
            size,
            errhandler: Cell::new(errhandler),
            _marker: PhantomData,
        })
    }

    /// Get the raw communicator handle (for advanced use).
    pub fn raw_handle(&self) -> CommHandle {
        self.handle
    }

    /// Get the rank of the calling process in this communicator.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Get the number of processes in this communicator.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Current errhandler policy.
    pub fn errhandler(&self) -> Errhandler {
        self.errhandler.get()
    }

    /// Change the errhandler policy for subsequent calls.
    pub fn set_errhandler(&self, policy: Errhandler) -> Result<()> {
        Error::check(self.transport.errhandler_set(self.handle, policy.raw()))?;
        self.errhandler.set(policy);
        Ok(())
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn shared_transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Route a call outcome through the errhandler policy.
    pub(crate) fn outcome<T>(&self, result: Result<T>) -> Result<T> {
        self.errhandler().apply(result)
    }

    /// Map a transport code through the errhandler policy.
    pub(crate) fn check(&self, code: i32) -> Result<()> {
        self.outcome(Error::check(code))
    }

    // ========================================================================
    // Argument validation
    // ========================================================================

    fn is_rank(&self, rank: i32) -> bool {
        (0..self.size).contains(&rank)
    }

    pub(crate) fn validate_dest(&self, dest: i32) -> Result<()> {
        if dest == PROC_NULL || self.is_rank(dest) {
            Ok(())
        } else {
            Err(Error::InvalidRank(dest))
        }
    }

    pub(crate) fn validate_source(&self, source: i32) -> Result<()> {
        if source == ANY_SOURCE {
            Ok(())
        } else {
            self.validate_dest(source)
        }
    }

    pub(crate) fn validate_root(&self, root: i32) -> Result<()> {
        if self.is_rank(root) {
            Ok(())
        } else {
            Err(Error::InvalidRank(root))
        }
    }

    pub(crate) fn validate_send_tag(tag: i32) -> Result<()> {
        if (0..=TAG_UB).contains(&tag) {
            Ok(())
        } else {
            Err(Error::InvalidTag(tag))
        }
    }

    pub(crate) fn validate_recv_tag(tag: i32) -> Result<()> {
        if tag == ANY_TAG {
            Ok(())
        } else {
            Self::validate_send_tag(tag)
        }
    }

    // ========================================================================
    // Point-to-Point Communication
    // ========================================================================

    /// Blocking send.
    ///
    /// Returns once `buf` may be reused, which does not imply the message has
    /// been received. Sending to [`PROC_NULL`] succeeds without doing anything.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRank`] unless `dest` is a rank of this communicator or
    /// [`PROC_NULL`]; [`Error::InvalidTag`] for negative tags; buffer view
    /// errors; transport failures under [`Errhandler::ErrorsReturn`].
    pub fn send<B: Buffer + ?Sized>(&self, buf: &B, dest: i32, tag: i32) -> Result<()> {
        self.validate_dest(dest)?;
        Self::validate_send_tag(tag)?;
        let view = view_of(buf, 0)?;
        if dest == PROC_NULL {
            return Ok(());
        }

        tracing::trace!(rank = self.rank, dest, tag, count = view.count(), "send");
        let ret = unsafe {
            self.transport.send(
                view.as_ptr(),
                view.count_i64(),
                view.element_type().tag(),
                dest,
                tag,
                self.handle,
            )
        };
        self.check(ret)
    }

    /// Blocking receive.
    ///
    /// Use [`ANY_SOURCE`] and [`ANY_TAG`] to match any sender or tag; the
    /// returned [`Status`] names the actual sender and tag. `buf` must be
    /// pre-sized to the largest message expected.
    ///
    /// # Errors
    ///
    /// [`Error::MessageTruncated`] when the message is larger than `buf`. The
    /// first `buf.len()` elements are still written.
    pub fn recv<B: BufferMut + ?Sized>(&self, buf: &mut B, source: i32, tag: i32) -> Result<Status> {
        self.validate_source(source)?;
        Self::validate_recv_tag(tag)?;
        let mut view = view_of_mut(buf, 0)?;
        if source == PROC_NULL {
            return Ok(Status::proc_null());
        }

        let mut raw = RawStatus::default();
        let ret = unsafe {
            self.transport.recv(
                view.as_mut_ptr(),
                view.count_i64(),
                view.element_type().tag(),
                source,
                tag,
                self.handle,
                &mut raw,
            )
        };
        let status = Status::from_raw(&raw);
        tracing::trace!(
            rank = self.rank,
            source = status.source,
            tag = status.tag,
            count = status.count,
            "recv"
        );
        self.outcome(Error::check_status(ret, &status, view.count()))?;
        Ok(status)
    }

    /// Send to `dest` and receive from `source` in one call.
    ///
    /// Safe to use with `dest == source == self.rank()` and in ring patterns
    /// where every rank sends before it receives.
    #[allow(clippy::too_many_arguments)]
    pub fn sendrecv<S, R>(
        &self,
        sendbuf: &S,
        dest: i32,
        sendtag: i32,
        recvbuf: &mut R,
        source: i32,
        recvtag: i32,
    ) -> Result<Status>
    where
        S: Buffer + ?Sized,
        R: BufferMut + ?Sized,
    {
        self.validate_dest(dest)?;
        self.validate_source(source)?;
        Self::validate_send_tag(sendtag)?;
        Self::validate_recv_tag(recvtag)?;
        let send = view_of(sendbuf, 0)?;
        let mut recv = view_of_mut(recvbuf, 0)?;

        let mut raw = RawStatus::default();
        let ret = unsafe {
            self.transport.sendrecv(
                send.as_ptr(),
                send.count_i64(),
                send.element_type().tag(),
                dest,
                sendtag,
                recv.as_mut_ptr(),
                recv.count_i64(),
                recv.element_type().tag(),
                source,
                recvtag,
                self.handle,
                &mut raw,
            )
        };
        let status = Status::from_raw(&raw);
        tracing::trace!(rank = self.rank, dest, source = status.source, "sendrecv");
        self.outcome(Error::check_status(ret, &status, recv.count()))?;
        Ok(status)
    }

    /// Start a nonblocking send inside `scope`.
    ///
    /// The returned [`Request`] borrows `buf` until it is dropped, so the
    /// buffer cannot be modified while the send is in flight. `buf` has to
    /// outlive the scope.
    pub fn isend<'s, 'a: 's, B: Buffer + ?Sized>(
        &'s self,
        scope: &'s RequestScope<'a>,
        buf: &'a B,
        dest: i32,
        tag: i32,
    ) -> Result<Request<'s>> {
        self.validate_dest(dest)?;
        Self::validate_send_tag(tag)?;
        let view = view_of(buf, 0)?;
        if dest == PROC_NULL {
            return Ok(Request::completed(self, scope.outstanding(), Status::proc_null()));
        }

        let mut handle: RequestHandle = 0;
        let ret = unsafe {
            self.transport.isend(
                view.as_ptr(),
                view.count_i64(),
                view.element_type().tag(),
                dest,
                tag,
                self.handle,
                &mut handle,
            )
        };
        self.check(ret)?;
        tracing::trace!(rank = self.rank, dest, tag, handle, "isend");
        Ok(Request::pending(self, scope.outstanding(), handle, view))
    }

    /// Start a nonblocking receive inside `scope`.
    ///
    /// The returned [`Request`] holds the only access to `buf` until it is
    /// dropped; read the data after [`Request::wait`] or a successful
    /// [`Request::test`]. `buf` has to outlive the scope.
    pub fn irecv<'s, 'a: 's, B: BufferMut + ?Sized>(
        &'s self,
        scope: &'s RequestScope<'a>,
        buf: &'a mut B,
        source: i32,
        tag: i32,
    ) -> Result<Request<'s>> {
        self.validate_source(source)?;
        Self::validate_recv_tag(tag)?;
        let mut view = view_of_mut(buf, 0)?;
        if source == PROC_NULL {
            return Ok(Request::completed(self, scope.outstanding(), Status::proc_null()));
        }

        let mut handle: RequestHandle = 0;
        let ret = unsafe {
            self.transport.irecv(
                view.as_mut_ptr(),
                view.count_i64(),
                view.element_type().tag(),
                source,
                tag,
                self.handle,
                &mut handle,
            )
        };
        self.check(ret)?;
        tracing::trace!(rank = self.rank, source, tag, handle, "irecv");
        Ok(Request::pending(self, scope.outstanding(), handle, view))
    }

    /// Block until a message matching `(source, tag)` is available and
    /// describe it without receiving it. `count` is in elements of `T`.
    pub fn probe<T: MpiDatatype>(&self, source: i32, tag: i32) -> Result<Status> {
        self.validate_source(source)?;
        Self::validate_recv_tag(tag)?;
        if source == PROC_NULL {
            return Ok(Status::proc_null());
        }

        let mut raw = RawStatus::default();
        let ret = self
            .transport
            .probe(source, tag, T::ELEMENT.tag(), self.handle, &mut raw);
        self.check(ret)?;
        Ok(Status::from_raw(&raw))
    }

    /// Check for a message matching `(source, tag)` without blocking.
    pub fn iprobe<T: MpiDatatype>(&self, source: i32, tag: i32) -> Result<Option<Status>> {
        self.validate_source(source)?;
        Self::validate_recv_tag(tag)?;
        if source == PROC_NULL {
            return Ok(Some(Status::proc_null()));
        }

        let mut flag = false;
        let mut raw = RawStatus::default();
        let ret = self
            .transport
            .iprobe(source, tag, T::ELEMENT.tag(), self.handle, &mut flag, &mut raw);
        self.check(ret)?;
        Ok(flag.then(|| Status::from_raw(&raw)))
    }
}
