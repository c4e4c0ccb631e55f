//! The boundary to the underlying message-passing runtime.
//!
//! A [`Transport`] exposes the runtime the way a thin C shim would: integer
//! return codes (0 on success, an [`ErrorClass`](crate::ErrorClass) code
//! otherwise), `&mut` out-parameters, and `(pointer, count, type tag)`
//! triples for buffers. The safe layer in [`Communicator`](crate::Communicator)
//! and [`Request`](crate::Request) builds every call; nothing above this
//! module touches raw pointers.
//!
//! Type tags are [`ElementType::tag`](crate::ElementType::tag) values and
//! reduce operations are [`ReduceOp`](crate::ReduceOp) discriminants.
//!
//! # Safety
//!
//! Every buffer-taking method is `unsafe`. Callers guarantee that each
//! `(buf, count, datatype)` triple describes `count` contiguous elements of
//! that type which stay valid (and, for receive sides, exclusively writable)
//! until the call returns, or for nonblocking calls until the request has
//! been completed by `wait`, `test` or `cancel` followed by `wait`. The
//! completion calls are `unsafe` for the same reason: they are the point at
//! which the runtime writes into a receive buffer.

/// Communicator handle.
pub type CommHandle = i32;

/// Request handle for a nonblocking operation.
pub type RequestHandle = u64;

/// Completion record filled in by receives, waits, tests and probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawStatus {
    /// Source rank of the matched message
    pub source: i32,
    /// Tag of the matched message
    pub tag: i32,
    /// Error code of the completed operation
    pub error: i32,
    /// Element count of the matched message
    pub count: i64,
    /// Whether the operation was cancelled
    pub cancelled: bool,
}

/// A message-passing runtime.
#[allow(clippy::too_many_arguments)]
pub trait Transport: Send + Sync {
    // ============================================================
    // Initialization and Finalization
    // ============================================================

    /// Initialize the runtime for this process.
    fn init(&self) -> i32;

    /// Finalize the runtime for this process.
    fn finalize(&self) -> i32;

    /// Version of the standard the runtime implements.
    fn get_version(&self, version: &mut i32, subversion: &mut i32) -> i32;

    /// Wall-clock time in seconds.
    fn wtime(&self) -> f64;

    // ============================================================
    // Communicator Operations
    // ============================================================

    /// Handle of the world communicator.
    fn world(&self) -> CommHandle;

    /// Rank of the calling process in `comm`.
    fn comm_rank(&self, comm: CommHandle, rank: &mut i32) -> i32;

    /// Number of processes in `comm`.
    fn comm_size(&self, comm: CommHandle, size: &mut i32) -> i32;

    /// Current errhandler policy of `comm`.
    fn errhandler_get(&self, comm: CommHandle, policy: &mut i32) -> i32;

    /// Set the errhandler policy of `comm`.
    fn errhandler_set(&self, comm: CommHandle, policy: i32) -> i32;

    // ============================================================
    // Point-to-Point Communication
    // ============================================================

    /// Blocking send with local completion semantics.
    unsafe fn send(
        &self,
        buf: *const u8,
        count: i64,
        datatype: i32,
        dest: i32,
        tag: i32,
        comm: CommHandle,
    ) -> i32;

    /// Blocking receive. Fills `status` even when the message was truncated.
    unsafe fn recv(
        &self,
        buf: *mut u8,
        count: i64,
        datatype: i32,
        source: i32,
        tag: i32,
        comm: CommHandle,
        status: &mut RawStatus,
    ) -> i32;

    /// Combined send and receive that cannot deadlock against itself.
    unsafe fn sendrecv(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        dest: i32,
        sendtag: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        source: i32,
        recvtag: i32,
        comm: CommHandle,
        status: &mut RawStatus,
    ) -> i32;

    /// Start a nonblocking send.
    unsafe fn isend(
        &self,
        buf: *const u8,
        count: i64,
        datatype: i32,
        dest: i32,
        tag: i32,
        comm: CommHandle,
        request: &mut RequestHandle,
    ) -> i32;

    /// Start a nonblocking receive.
    unsafe fn irecv(
        &self,
        buf: *mut u8,
        count: i64,
        datatype: i32,
        source: i32,
        tag: i32,
        comm: CommHandle,
        request: &mut RequestHandle,
    ) -> i32;

    /// Block until a matching message is available, without receiving it.
    fn probe(
        &self,
        source: i32,
        tag: i32,
        datatype: i32,
        comm: CommHandle,
        status: &mut RawStatus,
    ) -> i32;

    /// Check for a matching message without blocking.
    fn iprobe(
        &self,
        source: i32,
        tag: i32,
        datatype: i32,
        comm: CommHandle,
        flag: &mut bool,
        status: &mut RawStatus,
    ) -> i32;

    // ============================================================
    // Request Completion
    // ============================================================

    /// Block until `request` completes. The handle is freed.
    ///
    /// # Safety
    ///
    /// Completing a receive writes into the buffer it was started with. That
    /// buffer must still be valid and not borrowed anywhere else.
    unsafe fn wait(&self, request: RequestHandle, status: &mut RawStatus) -> i32;

    /// Check whether `request` has completed. On completion the handle is
    /// freed and `flag` is set.
    ///
    /// # Safety
    ///
    /// Same contract as [`Transport::wait`].
    unsafe fn test(&self, request: RequestHandle, flag: &mut bool, status: &mut RawStatus) -> i32;

    /// Ask the runtime to cancel `request`. The request must still be
    /// completed with `wait` or `test`; its status reports whether the cancel
    /// took effect.
    ///
    /// # Safety
    ///
    /// Same contract as [`Transport::wait`]. A cancel that does not take
    /// effect may complete the operation.
    unsafe fn cancel(&self, request: RequestHandle) -> i32;

    // ============================================================
    // Collective Operations
    // ============================================================

    /// Block until every rank of `comm` has entered.
    fn barrier(&self, comm: CommHandle) -> i32;

    /// Broadcast `count` elements from `root`.
    unsafe fn bcast(
        &self,
        buf: *mut u8,
        count: i64,
        datatype: i32,
        root: i32,
        comm: CommHandle,
    ) -> i32;

    /// Gather `sendcount` elements from every rank at `root`.
    unsafe fn gather(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        root: i32,
        comm: CommHandle,
    ) -> i32;

    /// Gather `sendcount` elements from every rank at every rank.
    unsafe fn allgather(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        comm: CommHandle,
    ) -> i32;

    /// Deal `sendcount` elements per rank out of `root`'s buffer.
    unsafe fn scatter(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        root: i32,
        comm: CommHandle,
    ) -> i32;

    /// Exchange `sendcount` elements between every pair of ranks.
    unsafe fn alltoall(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        comm: CommHandle,
    ) -> i32;

    /// Combine `count` elements from every rank at `root`.
    unsafe fn reduce(
        &self,
        sendbuf: *const u8,
        recvbuf: *mut u8,
        count: i64,
        datatype: i32,
        op: i32,
        root: i32,
        comm: CommHandle,
    ) -> i32;

    /// Combine `count` elements from every rank at every rank.
    unsafe fn allreduce(
        &self,
        sendbuf: *const u8,
        recvbuf: *mut u8,
        count: i64,
        datatype: i32,
        op: i32,
        comm: CommHandle,
    ) -> i32;
}
