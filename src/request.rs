//! Request handles for nonblocking operations.
//!
//! Nonblocking operations are started inside a [`scope`]. The buffers handed
//! to them must be declared outside the scope, and the scope completes every
//! request still registered with it before it returns, including requests
//! that were leaked with `std::mem::forget`. A buffer is therefore never
//! released while the transport may still write into it.
//!
//! Within the scope, a [`Request`] holds the operation's [`BufferView`], which
//! keeps the caller away from that memory until the request is gone.
//! Completion moves the request from `Pending` to a terminal state exactly
//! once; later calls replay the terminal result without asking the transport
//! again.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::BufferView;
use crate::comm::Communicator;
use crate::error::{Error, ErrorClass, Result};
use crate::status::Status;
use crate::transport::{RawStatus, RequestHandle, Transport};

/// Completion state of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// The operation is still in flight
    Pending,
    /// The operation finished with this status
    Completed(Status),
    /// The operation was cancelled before it matched
    Cancelled,
}

/// Operations of one scope that have not completed yet.
#[derive(Default)]
pub(crate) struct Outstanding {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(u64, Arc<dyn Transport>, RequestHandle)>>,
}

impl Outstanding {
    fn register(&self, transport: Arc<dyn Transport>, handle: RequestHandle) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, transport, handle));
        id
    }

    fn unregister(&self, id: u64) {
        self.entries.borrow_mut().retain(|(entry, _, _)| *entry != id);
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// A region of code that every nonblocking operation started in it finishes
/// inside.
///
/// Obtain one from [`scope`]. Buffers lent to its requests live for `'a`,
/// which spans the whole scope.
pub struct RequestScope<'a> {
    outstanding: Outstanding,
    /// Invariant in `'a`
    _marker: PhantomData<Cell<&'a ()>>,
}

impl RequestScope<'_> {
    pub(crate) fn outstanding(&self) -> &Outstanding {
        &self.outstanding
    }

    /// Number of requests started in this scope that have not completed.
    pub fn pending(&self) -> usize {
        self.outstanding.len()
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        for (_, transport, handle) in std::mem::take(self.outstanding.entries.get_mut()) {
            tracing::warn!(handle, "request leaked from its scope; cancelling");
            let mut raw = RawStatus::default();
            // SAFETY: the buffers of this scope's requests outlive the scope.
            unsafe {
                transport.cancel(handle);
                transport.wait(handle, &mut raw);
            }
        }
    }
}

/// Run `f` with a fresh [`RequestScope`].
///
/// Buffers used by nonblocking operations must be declared outside the
/// closure. Requests that have not completed when `f` returns (or unwinds)
/// are cancelled and waited for before `scope` returns.
///
/// # Example
///
/// ```
/// use mpi_bridge::{scope, LocalConfig, Universe};
///
/// Universe::new(LocalConfig::new(2))
///     .run(|mpi| -> mpi_bridge::Result<()> {
///         let world = mpi.world()?;
///         let next = (world.rank() + 1) % world.size();
///         let prev = (world.rank() + world.size() - 1) % world.size();
///
///         let send = vec![world.rank() as f64; 4];
///         let mut recv = vec![0.0; 4];
///
///         scope(|scope| -> mpi_bridge::Result<()> {
///             let mut recv_req = world.irecv(scope, &mut recv, prev, 0)?;
///             let mut send_req = world.isend(scope, &send, next, 0)?;
///             send_req.wait()?;
///             let status = recv_req.wait()?;
///             assert_eq!(status.source, prev);
///
///             // Waiting again replays the same status
///             assert_eq!(recv_req.wait()?, status);
///             Ok(())
///         })?;
///
///         assert_eq!(recv, vec![prev as f64; 4]);
///         Ok(())
///     })
///     .unwrap();
/// ```
///
/// A buffer declared inside the scope cannot be lent to a request:
///
/// ```compile_fail
/// use mpi_bridge::{scope, LocalConfig, Universe};
///
/// Universe::new(LocalConfig::new(1)).run(|mpi| {
///     let world = mpi.world().unwrap();
///     scope(|scope| {
///         let mut buf = vec![0u8; 4];
///         let _req = world.irecv(scope, &mut buf, 0, 0);
///     });
/// });
/// ```
pub fn scope<'a, F, R>(f: F) -> R
where
    F: FnOnce(&RequestScope<'a>) -> R,
{
    let scope = RequestScope {
        outstanding: Outstanding::default(),
        _marker: PhantomData,
    };
    f(&scope)
}

/// A handle to a nonblocking operation.
///
/// You must call [`wait()`](Self::wait) or [`test()`](Self::test) to complete
/// the operation. The buffer stays borrowed for as long as the request
/// exists. Dropping a pending request cancels it (best effort) and waits for
/// it; a request that is leaked instead is finished by its [`RequestScope`].
pub struct Request<'s> {
    comm: &'s Communicator,
    scope: &'s Outstanding,
    registration: Option<u64>,
    handle: Option<RequestHandle>,
    /// Pinned buffer, released on completion
    view: Option<BufferView<'s>>,
    capacity: usize,
    state: RequestState,
}

impl<'s> Request<'s> {
    pub(crate) fn pending(
        comm: &'s Communicator,
        scope: &'s Outstanding,
        handle: RequestHandle,
        view: BufferView<'s>,
    ) -> Self {
        let registration = scope.register(comm.shared_transport(), handle);
        Request {
            comm,
            scope,
            registration: Some(registration),
            handle: Some(handle),
            capacity: view.count(),
            view: Some(view),
            state: RequestState::Pending,
        }
    }

    pub(crate) fn completed(comm: &'s Communicator, scope: &'s Outstanding, status: Status) -> Self {
        Request {
            comm,
            scope,
            registration: None,
            handle: None,
            view: None,
            capacity: 0,
            state: RequestState::Completed(status),
        }
    }

    /// Get the raw request handle while the operation is pending.
    pub fn raw_handle(&self) -> Option<RequestHandle> {
        self.handle
    }

    /// Current completion state.
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Check if this request has reached a terminal state.
    pub fn is_completed(&self) -> bool {
        self.state != RequestState::Pending
    }

    /// Whether the request still pins its buffer.
    pub fn is_pinned(&self) -> bool {
        self.view.is_some()
    }

    /// Wait for this operation to complete.
    ///
    /// Blocks until the transport reports completion. Calling `wait` again
    /// returns the same result without involving the transport.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] if the request was cancelled; the operation's
    /// runtime error (such as [`Error::MessageTruncated`]) under
    /// [`Errhandler::ErrorsReturn`](crate::Errhandler::ErrorsReturn).
    pub fn wait(&mut self) -> Result<Status> {
        let Some(handle) = self.pending_handle() else {
            return self.replay();
        };
        let mut raw = RawStatus::default();
        // SAFETY: the pinned view keeps the buffer borrowed until completion.
        let ret = unsafe { self.comm.transport().wait(handle, &mut raw) };
        self.complete(ret, raw)
    }

    /// Test if this operation has completed without blocking.
    ///
    /// Returns `Ok(None)` while the operation is pending. Once it has
    /// completed, behaves like [`wait`](Self::wait).
    pub fn test(&mut self) -> Result<Option<Status>> {
        let Some(handle) = self.pending_handle() else {
            return self.replay().map(Some);
        };
        let mut flag = false;
        let mut raw = RawStatus::default();
        // SAFETY: the pinned view keeps the buffer borrowed until completion.
        let ret = unsafe { self.comm.transport().test(handle, &mut flag, &mut raw) };
        if !flag {
            self.comm.check(ret)?;
            return Ok(None);
        }
        self.complete(ret, raw).map(Some)
    }

    /// Try to cancel the operation.
    ///
    /// Returns `true` if the cancel took effect, after which `wait` and
    /// `test` report [`Error::Cancelled`]. Returns `false` if the operation
    /// had already completed; its result stays available through `wait`.
    pub fn cancel(&mut self) -> Result<bool> {
        let Some(handle) = self.pending_handle() else {
            return Ok(self.state == RequestState::Cancelled);
        };
        let transport = self.comm.transport();
        // SAFETY: the pinned view keeps the buffer borrowed until completion.
        self.comm.check(unsafe { transport.cancel(handle) })?;

        let mut raw = RawStatus::default();
        let ret = unsafe { transport.wait(handle, &mut raw) };
        self.settle(ret, raw);
        tracing::trace!(handle, cancelled = raw.cancelled, "cancel");
        Ok(self.state == RequestState::Cancelled)
    }

    /// Wait for all requests in a collection to complete.
    ///
    /// Every request is waited on even if an earlier one fails; the first
    /// error is returned.
    pub fn wait_all(requests: &mut [Request<'_>]) -> Result<Vec<Status>> {
        let mut statuses = Vec::with_capacity(requests.len());
        let mut first_error = None;
        for request in requests.iter_mut() {
            match request.wait() {
                Ok(status) => statuses.push(status),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(statuses),
        }
    }

    fn pending_handle(&self) -> Option<RequestHandle> {
        match self.state {
            RequestState::Pending => self.handle,
            _ => None,
        }
    }

    /// Record the transport's completion and release the pinned buffer.
    fn settle(&mut self, ret: i32, raw: RawStatus) {
        if let Some(registration) = self.registration.take() {
            self.scope.unregister(registration);
        }
        self.handle = None;
        self.view = None;
        self.state = if raw.cancelled {
            RequestState::Cancelled
        } else {
            let mut status = Status::from_raw(&raw);
            if status.error == ErrorClass::Success && ret != 0 {
                status.error = ErrorClass::from_raw(ret);
            }
            RequestState::Completed(status)
        };
    }

    fn complete(&mut self, ret: i32, raw: RawStatus) -> Result<Status> {
        self.settle(ret, raw);
        self.replay()
    }

    fn replay(&self) -> Result<Status> {
        match self.state {
            RequestState::Completed(status) => {
                let result = Error::check_status(status.error.code(), &status, self.capacity);
                self.comm.outcome(result).map(|()| status)
            }
            RequestState::Cancelled => Err(Error::Cancelled),
            RequestState::Pending => Err(Error::Internal("request is still pending".into())),
        }
    }
}

impl Drop for Request<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending_handle() {
            // The transport may still write into the pinned buffer, so the
            // operation has to be finished before the borrow ends.
            tracing::warn!(handle, "pending request dropped; cancelling");
            let transport = self.comm.transport();
            let mut raw = RawStatus::default();
            // SAFETY: the buffer is still borrowed by this request.
            let ret = unsafe {
                transport.cancel(handle);
                transport.wait(handle, &mut raw)
            };
            self.settle(ret, raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{LocalConfig, LocalTransport, Universe};
    use crate::{Errhandler, Mpi, ANY_SOURCE, ANY_TAG};

    fn single_rank() -> (Mpi, Arc<LocalTransport>) {
        let universe = Universe::new(LocalConfig::new(1));
        let endpoint = Arc::new(universe.endpoints().remove(0));
        let mpi = Mpi::init(endpoint.clone()).unwrap();
        (mpi, endpoint)
    }

    #[test]
    fn nonblocking_round_trip_matches_blocking_content() {
        let (mpi, _) = single_rank();
        let world = mpi.world().unwrap();
        let send = vec![1u16, 2, 3];
        let mut recv = vec![0u16; 3];

        scope(|scope| {
            let mut send_req = world.isend(scope, &send, 0, 9).unwrap();
            let send_status = send_req.wait().unwrap();
            assert_eq!((send_status.source, send_status.tag), (0, 9));

            let mut recv_req = world.irecv(scope, &mut recv, 0, 9).unwrap();
            let first = recv_req.wait().unwrap();
            let second = recv_req.wait().unwrap();
            assert_eq!(first, second);
            assert_eq!(first.count, 3);
        });
        assert_eq!(recv, send);
    }

    #[test]
    fn test_is_idempotent_after_completion() {
        let (mpi, endpoint) = single_rank();
        let world = mpi.world().unwrap();
        let mut recv = [0i32; 1];
        scope(|scope| {
            let mut req = world.irecv(scope, &mut recv, 0, 1).unwrap();

            assert_eq!(req.test().unwrap(), None);
            world.send(&[77i32], 0, 1).unwrap();
            let status = req.test().unwrap().unwrap();
            let tests_after_completion = endpoint.call_counts().tests;

            assert_eq!(req.test().unwrap(), Some(status));
            assert_eq!(req.wait().unwrap(), status);
            assert_eq!(endpoint.call_counts().tests, tests_after_completion);
            assert_eq!(endpoint.call_counts().waits, 0);
        });
        assert_eq!(recv, [77]);
    }

    #[test]
    fn completion_releases_the_buffer() {
        let (mpi, _) = single_rank();
        let world = mpi.world().unwrap();
        let send = [1u8; 4];
        scope(|scope| {
            let mut req = world.isend(scope, &send, 0, 0).unwrap();
            assert!(req.is_pinned());
            assert_eq!(req.state(), RequestState::Pending);
            assert_eq!(scope.pending(), 1);
            req.wait().unwrap();
            assert!(!req.is_pinned());
            assert!(req.is_completed());
            assert_eq!(scope.pending(), 0);
        });
    }

    #[test]
    fn cancelled_receive_reports_cancelled() {
        let (mpi, _) = single_rank();
        let world = mpi.world().unwrap();
        let mut buf = [0u8; 8];
        scope(|scope| {
            let mut req = world.irecv(scope, &mut buf, ANY_SOURCE, ANY_TAG).unwrap();
            assert!(req.cancel().unwrap());
            assert_eq!(req.state(), RequestState::Cancelled);
            assert_eq!(req.wait(), Err(Error::Cancelled));
            assert_eq!(req.test(), Err(Error::Cancelled));
            assert!(req.cancel().unwrap());
            assert_eq!(scope.pending(), 0);
        });
    }

    #[test]
    fn cancel_after_completion_keeps_the_result() {
        let (mpi, _) = single_rank();
        let world = mpi.world().unwrap();
        let send = [5.0f64];
        scope(|scope| {
            let mut req = world.isend(scope, &send, 0, 3).unwrap();
            assert!(!req.cancel().unwrap());
            let status = req.wait().unwrap();
            assert_eq!(status.tag, 3);
        });
    }

    #[test]
    fn cancelled_receive_does_not_consume_messages() {
        let (mpi, _) = single_rank();
        let world = mpi.world().unwrap();
        let mut buf = [0u8; 2];
        scope(|scope| {
            let mut req = world.irecv(scope, &mut buf, 0, 5).unwrap();
            req.cancel().unwrap();
        });
        world.send(&[4u8, 2], 0, 5).unwrap();
        world.recv(&mut buf, 0, 5).unwrap();
        assert_eq!(buf, [4, 2]);
    }

    #[test]
    fn truncation_is_replayed_on_every_wait() {
        let (mpi, _) = single_rank();
        let world = mpi.world().unwrap();
        world.send(&[1i16, 2, 3], 0, 0).unwrap();
        let mut buf = [0i16; 1];
        scope(|scope| {
            let mut req = world.irecv(scope, &mut buf, 0, 0).unwrap();
            let first = req.wait().unwrap_err();
            assert!(matches!(first, Error::MessageTruncated { count: 3, capacity: 1, .. }));
            assert_eq!(req.wait().unwrap_err(), first);
            match req.state() {
                RequestState::Completed(status) => assert_eq!(status.error, ErrorClass::Truncate),
                other => panic!("unexpected state {other:?}"),
            }
        });
    }

    #[test]
    #[should_panic(expected = "fatal MPI error")]
    fn truncation_on_wait_panics_under_fatal_policy() {
        let (mpi, _) = single_rank();
        let world = mpi.world().unwrap();
        world.set_errhandler(Errhandler::Fatal).unwrap();
        world.send(&[1u8, 2], 0, 0).unwrap();
        let mut buf = [0u8; 1];
        scope(|scope| {
            let mut req = world.irecv(scope, &mut buf, 0, 0).unwrap();
            let _ = req.wait();
        });
    }

    #[test]
    fn dropping_a_pending_receive_cancels_it() {
        let (mpi, endpoint) = single_rank();
        let world = mpi.world().unwrap();
        let mut buf = [0u32; 1];
        scope(|scope| {
            let req = world.irecv(scope, &mut buf, 0, 0).unwrap();
            drop(req);
            assert_eq!(scope.pending(), 0);
        });
        assert_eq!(endpoint.call_counts().cancels, 1);
        assert_eq!(endpoint.call_counts().waits, 1);
    }

    #[test]
    fn scope_finishes_leaked_requests() {
        let (mpi, endpoint) = single_rank();
        let world = mpi.world().unwrap();
        let mut buf = vec![0u64; 64];
        scope(|scope| {
            let req = world.irecv(scope, &mut buf, 0, 7).unwrap();
            std::mem::forget(req);
            assert_eq!(scope.pending(), 1);
        });
        assert_eq!(endpoint.call_counts().cancels, 1);
        assert_eq!(endpoint.call_counts().waits, 1);
        drop(buf);

        // The leaked receive is gone, so the message goes to the next receive
        world.send(&[0xdead_beef_u64; 64], 0, 7).unwrap();
        let mut fresh = vec![0u64; 64];
        world.recv(&mut fresh, 0, 7).unwrap();
        assert_eq!(fresh, vec![0xdead_beef; 64]);
    }

    #[test]
    fn scope_finishes_requests_when_unwinding() {
        let (mpi, endpoint) = single_rank();
        let world = mpi.world().unwrap();
        let mut buf = [0u8; 4];
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scope(|scope| {
                let req = world.irecv(scope, &mut buf, 0, 1).unwrap();
                std::mem::forget(req);
                panic!("rank gave up");
            })
        }));
        assert!(result.is_err());
        assert_eq!(endpoint.call_counts().cancels, 1);
        assert_eq!(endpoint.call_counts().waits, 1);
    }

    #[test]
    fn wait_all_collects_statuses_in_order() {
        let (mpi, _) = single_rank();
        let world = mpi.world().unwrap();
        let payloads = [vec![1u64], vec![2, 2], vec![3, 3, 3]];
        let statuses = scope(|scope| {
            let mut sends: Vec<_> = payloads
                .iter()
                .enumerate()
                .map(|(i, p)| world.isend(scope, p, 0, i as i32).unwrap())
                .collect();
            Request::wait_all(&mut sends).unwrap()
        });
        let counts: Vec<i64> = statuses.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }
}
