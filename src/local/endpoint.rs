//! One rank's view of a [`Universe`](super::Universe).

use std::collections::HashMap;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::reduce;
use super::state::{Contribution, Envelope, Kind, Shared};
use crate::datatype::ElementType;
use crate::error::ErrorClass;
use crate::transport::{CommHandle, RawStatus, RequestHandle, Transport};
use crate::{ReduceOp, ANY_SOURCE, ANY_TAG, PROC_NULL};

/// Handle of the only communicator a universe has.
const WORLD: CommHandle = 0;

const SUCCESS: i32 = 0;

/// Snapshot of how often an endpoint's transport entry points were called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `send`, `isend` and the send half of `sendrecv`
    pub sends: u64,
    /// `recv`, `irecv` and the receive half of `sendrecv`
    pub recvs: u64,
    /// `wait`
    pub waits: u64,
    /// `test`
    pub tests: u64,
    /// `cancel`
    pub cancels: u64,
    /// `probe` and `iprobe`
    pub probes: u64,
    /// Every collective, barrier included
    pub collectives: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sends: AtomicU64,
    recvs: AtomicU64,
    waits: AtomicU64,
    tests: AtomicU64,
    cancels: AtomicU64,
    probes: AtomicU64,
    collectives: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// A posted receive that has not matched yet.
#[derive(Debug)]
struct RecvTarget {
    buf: *mut u8,
    capacity: usize,
    element_type: ElementType,
    source: i32,
    tag: i32,
    comm: CommHandle,
}

// SAFETY: the buffer is pinned by the Request that posted the receive (or by
// its scope, if the request leaked), and only the owning rank's thread ever
// lands a message in it.
unsafe impl Send for RecvTarget {}

#[derive(Debug)]
enum Pending {
    Done(RawStatus, i32),
    Recv(RecvTarget),
}

/// In-process [`Transport`] for one rank.
///
/// Obtained from [`Universe::endpoints`](super::Universe::endpoints) or
/// created implicitly by [`Universe::run`](super::Universe::run).
#[derive(Debug)]
pub struct LocalTransport {
    shared: Arc<Shared>,
    rank: i32,
    errhandler: AtomicI32,
    initialized: AtomicBool,
    next_request: AtomicU64,
    collective_seq: AtomicU64,
    requests: Mutex<HashMap<RequestHandle, Pending>>,
    counters: Counters,
}

impl LocalTransport {
    pub(crate) fn new(shared: Arc<Shared>, rank: i32) -> Self {
        let errhandler = shared.config.errhandler.raw();
        LocalTransport {
            shared,
            rank,
            errhandler: AtomicI32::new(errhandler),
            initialized: AtomicBool::new(false),
            next_request: AtomicU64::new(1),
            collective_seq: AtomicU64::new(0),
            requests: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Rank this endpoint speaks for.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// How often each entry point has been called so far.
    pub fn call_counts(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            sends: c.sends.load(Ordering::Relaxed),
            recvs: c.recvs.load(Ordering::Relaxed),
            waits: c.waits.load(Ordering::Relaxed),
            tests: c.tests.load(Ordering::Relaxed),
            cancels: c.cancels.load(Ordering::Relaxed),
            probes: c.probes.load(Ordering::Relaxed),
            collectives: c.collectives.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Argument checks
    // ========================================================================

    fn check_comm(comm: CommHandle) -> Result<(), ErrorClass> {
        if comm == WORLD {
            Ok(())
        } else {
            Err(ErrorClass::Comm)
        }
    }

    fn check_buffer(count: i64, datatype: i32) -> Result<(usize, ElementType), ErrorClass> {
        let element_type = ElementType::from_tag(datatype).ok_or(ErrorClass::Type)?;
        let count = usize::try_from(count).map_err(|_| ErrorClass::Count)?;
        Ok((count, element_type))
    }

    fn is_rank(&self, rank: i32) -> bool {
        (0..self.shared.size()).contains(&rank)
    }

    fn check_peer(&self, rank: i32, wildcard: bool) -> Result<(), ErrorClass> {
        if rank == PROC_NULL || self.is_rank(rank) || (wildcard && rank == ANY_SOURCE) {
            Ok(())
        } else {
            Err(ErrorClass::Rank)
        }
    }

    fn check_tag(tag: i32, wildcard: bool) -> Result<(), ErrorClass> {
        if tag >= 0 || (wildcard && tag == ANY_TAG) {
            Ok(())
        } else {
            Err(ErrorClass::Tag)
        }
    }

    fn check_root(&self, root: i32) -> Result<(), ErrorClass> {
        if self.is_rank(root) {
            Ok(())
        } else {
            Err(ErrorClass::Root)
        }
    }

    // ========================================================================
    // Point-to-point plumbing
    // ========================================================================

    /// Copy the message out of `buf` and queue it at `dest`.
    unsafe fn post(
        &self,
        buf: *const u8,
        count: i64,
        datatype: i32,
        dest: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<RawStatus, ErrorClass> {
        Self::check_comm(comm)?;
        let (count, element_type) = Self::check_buffer(count, datatype)?;
        self.check_peer(dest, false)?;
        Self::check_tag(tag, false)?;
        bump(&self.counters.sends);

        if dest != PROC_NULL {
            let payload = read(buf, count * element_type.size());
            self.shared.deliver(
                dest,
                Envelope {
                    comm,
                    source: self.rank,
                    tag,
                    payload,
                },
            );
        }
        Ok(RawStatus {
            source: self.rank,
            tag,
            error: SUCCESS,
            count: count as i64,
            cancelled: false,
        })
    }

    /// Check and describe a receive side without matching anything.
    unsafe fn target(
        &self,
        buf: *mut u8,
        count: i64,
        datatype: i32,
        source: i32,
        tag: i32,
        comm: CommHandle,
    ) -> Result<RecvTarget, ErrorClass> {
        Self::check_comm(comm)?;
        let (capacity, element_type) = Self::check_buffer(count, datatype)?;
        self.check_peer(source, true)?;
        Self::check_tag(tag, true)?;
        bump(&self.counters.recvs);
        Ok(RecvTarget {
            buf,
            capacity,
            element_type,
            source,
            tag,
            comm,
        })
    }

    /// Block until a message matches `target` and land it.
    fn receive(&self, target: &RecvTarget, status: &mut RawStatus) -> i32 {
        if target.source == PROC_NULL {
            *status = proc_null_status();
            return SUCCESS;
        }
        let rank = self.rank;
        let matched = self
            .shared
            .block_on(|state| state.take_match(rank, target.comm, target.source, target.tag));
        match matched {
            Ok(envelope) => unsafe { land(&envelope, target, status) },
            Err(class) => fail(status, class),
        }
    }

    fn try_receive(&self, target: &RecvTarget) -> Option<(RawStatus, i32)> {
        let mut status = RawStatus::default();
        if target.source == PROC_NULL {
            return Some((proc_null_status(), SUCCESS));
        }
        let rank = self.rank;
        let envelope = self
            .shared
            .with_state(|state| state.take_match(rank, target.comm, target.source, target.tag))?;
        let code = unsafe { land(&envelope, target, &mut status) };
        Some((status, code))
    }

    fn register(&self, pending: Pending) -> RequestHandle {
        let handle = self.next_request.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().insert(handle, pending);
        handle
    }

    fn check_probe(
        &self,
        source: i32,
        tag: i32,
        datatype: i32,
        comm: CommHandle,
    ) -> Result<ElementType, ErrorClass> {
        Self::check_comm(comm)?;
        let element_type = ElementType::from_tag(datatype).ok_or(ErrorClass::Type)?;
        self.check_peer(source, true)?;
        Self::check_tag(tag, true)?;
        bump(&self.counters.probes);
        Ok(element_type)
    }

    // ========================================================================
    // Collective plumbing
    // ========================================================================

    /// Take part in the next collective round and check that every rank
    /// called the same operation with the same parameters.
    fn join(&self, comm: CommHandle, contribution: Contribution) -> Result<Arc<Vec<Contribution>>, ErrorClass> {
        Self::check_comm(comm)?;
        bump(&self.counters.collectives);
        let seq = self.collective_seq.fetch_add(1, Ordering::Relaxed);
        let (kind, root, datatype, op) = (
            contribution.kind,
            contribution.root,
            contribution.datatype,
            contribution.op,
        );
        tracing::trace!(rank = self.rank, seq, ?kind, "local collective");

        let all = self.shared.rendezvous(comm, seq, self.rank, contribution)?;
        if all.iter().any(|c| c.kind != kind) {
            return Err(ErrorClass::Other);
        }
        if all.iter().any(|c| c.root != root) {
            return Err(ErrorClass::Root);
        }
        if all.iter().any(|c| c.datatype != datatype) {
            return Err(ErrorClass::Type);
        }
        if all.iter().any(|c| c.op != op) {
            return Err(ErrorClass::Op);
        }
        Ok(all)
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn gather_into(
        &self,
        kind: Kind,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        root: i32,
        comm: CommHandle,
    ) -> Result<(), ErrorClass> {
        let (sendcount, element_type) = Self::check_buffer(sendcount, sendtype)?;
        let (recvcount, _) = Self::check_buffer(recvcount, recvtype)?;
        if kind == Kind::Gather {
            self.check_root(root)?;
        }
        let receives = kind == Kind::Allgather || self.rank == root;
        if receives && recvtype != sendtype {
            return Err(ErrorClass::Type);
        }

        let payload = read(sendbuf, sendcount * element_type.size());
        let all = self.join(
            comm,
            Contribution {
                kind,
                root,
                datatype: sendtype,
                op: 0,
                payload,
            },
        )?;
        if !receives {
            return Ok(());
        }
        let segment = recvcount * element_type.size();
        let mut truncated = false;
        for (i, c) in all.iter().enumerate() {
            truncated |= copy_prefix(&c.payload, recvbuf.add(i * segment), segment);
        }
        if truncated {
            Err(ErrorClass::Truncate)
        } else {
            Ok(())
        }
    }

    unsafe fn bcast_into(
        &self,
        buf: *mut u8,
        count: i64,
        datatype: i32,
        root: i32,
        comm: CommHandle,
    ) -> Result<(), ErrorClass> {
        let (count, element_type) = Self::check_buffer(count, datatype)?;
        self.check_root(root)?;
        let len = count * element_type.size();
        let payload = if self.rank == root {
            read(buf, len)
        } else {
            Vec::new()
        };
        let all = self.join(
            comm,
            Contribution {
                kind: Kind::Bcast,
                root,
                datatype,
                op: 0,
                payload,
            },
        )?;
        if self.rank == root {
            return Ok(());
        }
        let source = &all[root as usize].payload;
        if copy_prefix(source, buf, len) {
            Err(ErrorClass::Truncate)
        } else {
            Ok(())
        }
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn scatter_into(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        root: i32,
        comm: CommHandle,
    ) -> Result<(), ErrorClass> {
        let (recvcount, element_type) = Self::check_buffer(recvcount, recvtype)?;
        let (sendcount, _) = Self::check_buffer(sendcount, sendtype)?;
        self.check_root(root)?;
        if self.rank == root && sendtype != recvtype {
            return Err(ErrorClass::Type);
        }
        let size = element_type.size();
        let payload = if self.rank == root {
            read(sendbuf, sendcount * size * self.shared.config.size)
        } else {
            Vec::new()
        };
        let all = self.join(
            comm,
            Contribution {
                kind: Kind::Scatter,
                root,
                datatype: recvtype,
                op: 0,
                payload,
            },
        )?;
        let source = &all[root as usize].payload;
        let segment = source.len() / self.shared.config.size;
        let start = self.rank as usize * segment;
        let mine = &source[start..start + segment];
        if copy_prefix(mine, recvbuf, recvcount * size) {
            Err(ErrorClass::Truncate)
        } else {
            Ok(())
        }
    }

    unsafe fn alltoall_into(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        comm: CommHandle,
    ) -> Result<(), ErrorClass> {
        let (sendcount, element_type) = Self::check_buffer(sendcount, sendtype)?;
        let (recvcount, _) = Self::check_buffer(recvcount, recvtype)?;
        if sendtype != recvtype {
            return Err(ErrorClass::Type);
        }
        let size = element_type.size();
        let ranks = self.shared.config.size;
        let all = self.join(
            comm,
            Contribution {
                kind: Kind::Alltoall,
                root: 0,
                datatype: sendtype,
                op: 0,
                payload: read(sendbuf, sendcount * size * ranks),
            },
        )?;
        let capacity = recvcount * size;
        let mut truncated = false;
        for (i, c) in all.iter().enumerate() {
            let segment = c.payload.len() / ranks;
            let start = self.rank as usize * segment;
            let piece = &c.payload[start..start + segment];
            truncated |= copy_prefix(piece, recvbuf.add(i * capacity), capacity);
        }
        if truncated {
            Err(ErrorClass::Truncate)
        } else {
            Ok(())
        }
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn reduce_into(
        &self,
        kind: Kind,
        sendbuf: *const u8,
        recvbuf: *mut u8,
        count: i64,
        datatype: i32,
        op: i32,
        root: i32,
        comm: CommHandle,
    ) -> Result<(), ErrorClass> {
        let (count, element_type) = Self::check_buffer(count, datatype)?;
        let reduce_op = ReduceOp::from_raw(op).ok_or(ErrorClass::Op)?;
        if kind == Kind::Reduce {
            self.check_root(root)?;
        }
        if !reduce_op.supports(element_type) {
            return Err(ErrorClass::Op);
        }

        let len = count * element_type.size();
        let all = self.join(
            comm,
            Contribution {
                kind,
                root,
                datatype,
                op,
                payload: read(sendbuf, len),
            },
        )?;
        if kind == Kind::Reduce && self.rank != root {
            return Ok(());
        }

        let mut contributions = all.iter();
        let mut acc = contributions
            .next()
            .map(|c| c.payload.clone())
            .unwrap_or_default();
        for c in contributions {
            reduce::combine(reduce_op, element_type, &mut acc, &c.payload)?;
        }
        if acc.len() != len {
            return Err(ErrorClass::Count);
        }
        ptr::copy_nonoverlapping(acc.as_ptr(), recvbuf, len);
        Ok(())
    }
}

fn proc_null_status() -> RawStatus {
    RawStatus {
        source: PROC_NULL,
        tag: ANY_TAG,
        ..RawStatus::default()
    }
}

fn code_of(result: Result<(), ErrorClass>) -> i32 {
    match result {
        Ok(()) => SUCCESS,
        Err(class) => class.code(),
    }
}

fn fail(status: &mut RawStatus, class: ErrorClass) -> i32 {
    status.error = class.code();
    class.code()
}

/// Copy `len` bytes out of a caller buffer.
unsafe fn read(buf: *const u8, len: usize) -> Vec<u8> {
    if len == 0 {
        Vec::new()
    } else {
        slice::from_raw_parts(buf, len).to_vec()
    }
}

/// Copy as much of `payload` as fits into `capacity` bytes at `dst`.
/// Returns whether the payload was cut short.
unsafe fn copy_prefix(payload: &[u8], dst: *mut u8, capacity: usize) -> bool {
    let n = payload.len().min(capacity);
    if n > 0 {
        ptr::copy_nonoverlapping(payload.as_ptr(), dst, n);
    }
    payload.len() > capacity
}

/// Write a matched message into a receive target and fill in `status`.
unsafe fn land(envelope: &Envelope, target: &RecvTarget, status: &mut RawStatus) -> i32 {
    let size = target.element_type.size();
    let truncated = copy_prefix(&envelope.payload, target.buf, target.capacity * size);
    *status = RawStatus {
        source: envelope.source,
        tag: envelope.tag,
        error: SUCCESS,
        count: (envelope.payload.len() / size) as i64,
        cancelled: false,
    };
    if truncated {
        fail(status, ErrorClass::Truncate)
    } else {
        SUCCESS
    }
}

impl Transport for LocalTransport {
    fn init(&self) -> i32 {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return ErrorClass::Other.code();
        }
        tracing::debug!(rank = self.rank, size = self.shared.size(), "local endpoint up");
        SUCCESS
    }

    fn finalize(&self) -> i32 {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return ErrorClass::Other.code();
        }
        let outstanding = self.requests.lock().len();
        if outstanding > 0 {
            tracing::warn!(rank = self.rank, outstanding, "finalized with requests outstanding");
        }
        SUCCESS
    }

    fn get_version(&self, version: &mut i32, subversion: &mut i32) -> i32 {
        *version = 2;
        *subversion = 2;
        SUCCESS
    }

    fn wtime(&self) -> f64 {
        self.shared.epoch.elapsed().as_secs_f64()
    }

    fn world(&self) -> CommHandle {
        WORLD
    }

    fn comm_rank(&self, comm: CommHandle, rank: &mut i32) -> i32 {
        code_of(Self::check_comm(comm).map(|()| *rank = self.rank))
    }

    fn comm_size(&self, comm: CommHandle, size: &mut i32) -> i32 {
        code_of(Self::check_comm(comm).map(|()| *size = self.shared.size()))
    }

    fn errhandler_get(&self, comm: CommHandle, policy: &mut i32) -> i32 {
        code_of(Self::check_comm(comm).map(|()| *policy = self.errhandler.load(Ordering::Relaxed)))
    }

    fn errhandler_set(&self, comm: CommHandle, policy: i32) -> i32 {
        if crate::Errhandler::from_raw(policy).is_none() {
            return ErrorClass::Arg.code();
        }
        code_of(Self::check_comm(comm).map(|()| self.errhandler.store(policy, Ordering::Relaxed)))
    }

    unsafe fn send(
        &self,
        buf: *const u8,
        count: i64,
        datatype: i32,
        dest: i32,
        tag: i32,
        comm: CommHandle,
    ) -> i32 {
        code_of(self.post(buf, count, datatype, dest, tag, comm).map(|_| ()))
    }

    unsafe fn recv(
        &self,
        buf: *mut u8,
        count: i64,
        datatype: i32,
        source: i32,
        tag: i32,
        comm: CommHandle,
        status: &mut RawStatus,
    ) -> i32 {
        match self.target(buf, count, datatype, source, tag, comm) {
            Ok(target) => self.receive(&target, status),
            Err(class) => fail(status, class),
        }
    }

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
    ) -> i32 {
        let target = match self.target(recvbuf, recvcount, recvtype, source, recvtag, comm) {
            Ok(target) => target,
            Err(class) => return fail(status, class),
        };
        // Sends are eager, so posting first cannot deadlock
        if let Err(class) = self.post(sendbuf, sendcount, sendtype, dest, sendtag, comm) {
            return fail(status, class);
        }
        self.receive(&target, status)
    }

    unsafe fn isend(
        &self,
        buf: *const u8,
        count: i64,
        datatype: i32,
        dest: i32,
        tag: i32,
        comm: CommHandle,
        request: &mut RequestHandle,
    ) -> i32 {
        match self.post(buf, count, datatype, dest, tag, comm) {
            Ok(status) => {
                *request = self.register(Pending::Done(status, SUCCESS));
                SUCCESS
            }
            Err(class) => class.code(),
        }
    }

    unsafe fn irecv(
        &self,
        buf: *mut u8,
        count: i64,
        datatype: i32,
        source: i32,
        tag: i32,
        comm: CommHandle,
        request: &mut RequestHandle,
    ) -> i32 {
        match self.target(buf, count, datatype, source, tag, comm) {
            Ok(target) => {
                let pending = match self.try_receive(&target) {
                    Some((status, code)) => Pending::Done(status, code),
                    None => Pending::Recv(target),
                };
                *request = self.register(pending);
                SUCCESS
            }
            Err(class) => class.code(),
        }
    }

    fn probe(
        &self,
        source: i32,
        tag: i32,
        datatype: i32,
        comm: CommHandle,
        status: &mut RawStatus,
    ) -> i32 {
        let element_type = match self.check_probe(source, tag, datatype, comm) {
            Ok(element_type) => element_type,
            Err(class) => return fail(status, class),
        };
        let rank = self.rank;
        let found = self.shared.block_on(|state| {
            state
                .peek_match(rank, comm, source, tag)
                .map(|e| (e.source, e.tag, e.payload.len()))
        });
        match found {
            Ok((source, tag, len)) => {
                *status = RawStatus {
                    source,
                    tag,
                    count: (len / element_type.size()) as i64,
                    ..RawStatus::default()
                };
                SUCCESS
            }
            Err(class) => fail(status, class),
        }
    }

    fn iprobe(
        &self,
        source: i32,
        tag: i32,
        datatype: i32,
        comm: CommHandle,
        flag: &mut bool,
        status: &mut RawStatus,
    ) -> i32 {
        let element_type = match self.check_probe(source, tag, datatype, comm) {
            Ok(element_type) => element_type,
            Err(class) => return fail(status, class),
        };
        let rank = self.rank;
        let found = self.shared.with_state(|state| {
            state
                .peek_match(rank, comm, source, tag)
                .map(|e| (e.source, e.tag, e.payload.len()))
        });
        *flag = found.is_some();
        if let Some((source, tag, len)) = found {
            *status = RawStatus {
                source,
                tag,
                count: (len / element_type.size()) as i64,
                ..RawStatus::default()
            };
        }
        SUCCESS
    }

    unsafe fn wait(&self, request: RequestHandle, status: &mut RawStatus) -> i32 {
        bump(&self.counters.waits);
        let Some(pending) = self.requests.lock().remove(&request) else {
            return ErrorClass::Request.code();
        };
        match pending {
            Pending::Done(done, code) => {
                *status = done;
                code
            }
            Pending::Recv(target) => self.receive(&target, status),
        }
    }

    unsafe fn test(&self, request: RequestHandle, flag: &mut bool, status: &mut RawStatus) -> i32 {
        bump(&self.counters.tests);
        let mut requests = self.requests.lock();
        let Some(pending) = requests.get(&request) else {
            return ErrorClass::Request.code();
        };
        let outcome = match pending {
            Pending::Done(done, code) => Some((*done, *code)),
            Pending::Recv(target) => self.try_receive(target),
        };
        *flag = outcome.is_some();
        match outcome {
            Some((done, code)) => {
                requests.remove(&request);
                *status = done;
                code
            }
            None if self.shared.is_aborted() => ErrorClass::Other.code(),
            None => SUCCESS,
        }
    }

    unsafe fn cancel(&self, request: RequestHandle) -> i32 {
        bump(&self.counters.cancels);
        let mut requests = self.requests.lock();
        let Some(pending) = requests.get_mut(&request) else {
            return ErrorClass::Request.code();
        };
        if let Pending::Recv(target) = pending {
            let cancelled = RawStatus {
                source: target.source,
                tag: target.tag,
                cancelled: true,
                ..RawStatus::default()
            };
            *pending = Pending::Done(cancelled, SUCCESS);
        }
        SUCCESS
    }

    fn barrier(&self, comm: CommHandle) -> i32 {
        let contribution = Contribution {
            kind: Kind::Barrier,
            root: 0,
            datatype: 0,
            op: 0,
            payload: Vec::new(),
        };
        code_of(self.join(comm, contribution).map(|_| ()))
    }

    unsafe fn bcast(
        &self,
        buf: *mut u8,
        count: i64,
        datatype: i32,
        root: i32,
        comm: CommHandle,
    ) -> i32 {
        code_of(self.bcast_into(buf, count, datatype, root, comm))
    }

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
    ) -> i32 {
        code_of(self.gather_into(
            Kind::Gather,
            sendbuf,
            sendcount,
            sendtype,
            recvbuf,
            recvcount,
            recvtype,
            root,
            comm,
        ))
    }

    unsafe fn allgather(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        comm: CommHandle,
    ) -> i32 {
        code_of(self.gather_into(
            Kind::Allgather,
            sendbuf,
            sendcount,
            sendtype,
            recvbuf,
            recvcount,
            recvtype,
            0,
            comm,
        ))
    }

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
    ) -> i32 {
        code_of(self.scatter_into(
            sendbuf,
            sendcount,
            sendtype,
            recvbuf,
            recvcount,
            recvtype,
            root,
            comm,
        ))
    }

    unsafe fn alltoall(
        &self,
        sendbuf: *const u8,
        sendcount: i64,
        sendtype: i32,
        recvbuf: *mut u8,
        recvcount: i64,
        recvtype: i32,
        comm: CommHandle,
    ) -> i32 {
        code_of(self.alltoall_into(
            sendbuf,
            sendcount,
            sendtype,
            recvbuf,
            recvcount,
            recvtype,
            comm,
        ))
    }

    unsafe fn reduce(
        &self,
        sendbuf: *const u8,
        recvbuf: *mut u8,
        count: i64,
        datatype: i32,
        op: i32,
        root: i32,
        comm: CommHandle,
    ) -> i32 {
        code_of(self.reduce_into(Kind::Reduce, sendbuf, recvbuf, count, datatype, op, root, comm))
    }

    unsafe fn allreduce(
        &self,
        sendbuf: *const u8,
        recvbuf: *mut u8,
        count: i64,
        datatype: i32,
        op: i32,
        comm: CommHandle,
    ) -> i32 {
        code_of(self.reduce_into(Kind::Allreduce, sendbuf, recvbuf, count, datatype, op, 0, comm))
    }
}
