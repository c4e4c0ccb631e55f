//! Collective operations on a [`Communicator`].
//!
//! Every rank of the communicator has to make the same call with consistent
//! arguments. Arguments that can be checked locally (root range, element type
//! agreement between send and receive buffers, receive buffer sizes and
//! op/type compatibility) are validated here before the transport is invoked.
//! Agreement across ranks is the caller's obligation; transports may detect
//! and report violations, but need not.
//!
//! Buffers that a rank does not use (the receive buffer of a non-root gather
//! rank, the send buffer of a non-root scatter rank) are neither validated nor
//! handed to the transport.

use std::ptr::NonNull;

use crate::buffer::{view_of, view_of_mut, Buffer, BufferMut};
use crate::comm::Communicator;
use crate::datatype::MpiDatatype;
use crate::error::{Error, Result};
use crate::{ReduceOp, ANY_SOURCE};

/// Placeholder for buffers a rank does not take part with.
fn unused() -> *mut u8 {
    NonNull::<u8>::dangling().as_ptr()
}

impl Communicator {
    /// Number of processes as an element multiplier.
    fn group_len(&self) -> usize {
        self.size() as usize
    }

    fn check_op(op: ReduceOp, element_type: crate::ElementType) -> Result<()> {
        if op.supports(element_type) {
            Ok(())
        } else {
            Err(Error::InvalidOp { op, element_type })
        }
    }

    /// Map the code of a collective that writes into a receive buffer of
    /// `capacity` elements per contributing rank.
    fn check_received(&self, ret: i32, source: i32, capacity: usize) -> Result<()> {
        self.outcome(Error::check(ret).map_err(|err| err.received_from(source, capacity)))
    }

    /// Block until all processes in this communicator have reached this point.
    pub fn barrier(&self) -> Result<()> {
        tracing::trace!(rank = self.rank(), "barrier");
        let ret = self.transport().barrier(self.raw_handle());
        self.check(ret)
    }

    /// Broadcast `buf` from `root` to every rank.
    ///
    /// At the root `buf` is input and stays unchanged. Everywhere else it is
    /// overwritten with the root's content and must hold at least as many
    /// elements as the root sends.
    pub fn bcast<B: BufferMut + ?Sized>(&self, buf: &mut B, root: i32) -> Result<()> {
        self.validate_root(root)?;
        let mut view = view_of_mut(buf, 0)?;

        tracing::trace!(rank = self.rank(), root, count = view.count(), "bcast");
        let ret = unsafe {
            self.transport().bcast(
                view.as_mut_ptr(),
                view.count_i64(),
                view.element_type().tag(),
                root,
                self.raw_handle(),
            )
        };
        self.check_received(ret, root, view.count())
    }

    /// Gather every rank's `send` at `root`.
    ///
    /// At the root, `recv` is split into `size` segments of `send.len()`
    /// elements; segment `i` receives rank `i`'s data. `recv` is ignored on
    /// every other rank.
    ///
    /// # Errors
    ///
    /// At the root, [`Error::TooSmall`] if `recv` holds fewer than
    /// `send.len() * size` elements and [`Error::TypeMismatch`] if the two
    /// buffers disagree on element type.
    pub fn gather<S, R>(&self, send: &S, recv: &mut R, root: i32) -> Result<()>
    where
        S: Buffer + ?Sized,
        R: BufferMut + ?Sized,
    {
        self.validate_root(root)?;
        let send = view_of(send, 0)?;
        let element_type = send.element_type();

        let mut recv_view = None;
        if self.rank() == root {
            let view = view_of_mut(recv, send.count() * self.group_len())?;
            view.expect_type(element_type)?;
            recv_view = Some(view);
        }
        let (recv_ptr, recv_count) = match recv_view.as_mut() {
            Some(view) => (view.as_mut_ptr(), send.count_i64()),
            None => (unused(), 0),
        };

        tracing::trace!(rank = self.rank(), root, count = send.count(), "gather");
        let ret = unsafe {
            self.transport().gather(
                send.as_ptr(),
                send.count_i64(),
                element_type.tag(),
                recv_ptr,
                recv_count,
                element_type.tag(),
                root,
                self.raw_handle(),
            )
        };
        self.check_received(ret, ANY_SOURCE, send.count())
    }

    /// Gather every rank's `send` at every rank.
    ///
    /// `recv` is split into `size` segments of `send.len()` elements, ordered
    /// by rank.
    pub fn allgather<S, R>(&self, send: &S, recv: &mut R) -> Result<()>
    where
        S: Buffer + ?Sized,
        R: BufferMut + ?Sized,
    {
        let send = view_of(send, 0)?;
        let element_type = send.element_type();
        let mut recv = view_of_mut(recv, send.count() * self.group_len())?;
        recv.expect_type(element_type)?;

        tracing::trace!(rank = self.rank(), count = send.count(), "allgather");
        let ret = unsafe {
            self.transport().allgather(
                send.as_ptr(),
                send.count_i64(),
                element_type.tag(),
                recv.as_mut_ptr(),
                send.count_i64(),
                element_type.tag(),
                self.raw_handle(),
            )
        };
        self.check_received(ret, ANY_SOURCE, send.count())
    }

    /// Deal `root`'s `send` out to every rank.
    ///
    /// The per-rank share is `recv.len()` elements. At the root, `send` is
    /// split into `size` segments of that length and segment `i` goes to rank
    /// `i`. `send` is ignored on every other rank.
    pub fn scatter<S, R>(&self, send: &S, recv: &mut R, root: i32) -> Result<()>
    where
        S: Buffer + ?Sized,
        R: BufferMut + ?Sized,
    {
        self.validate_root(root)?;
        let mut recv = view_of_mut(recv, 0)?;
        let element_type = recv.element_type();

        let mut send_view = None;
        if self.rank() == root {
            let view = view_of(send, recv.count() * self.group_len())?;
            view.expect_type(element_type)?;
            send_view = Some(view);
        }
        let (send_ptr, send_count) = match send_view.as_ref() {
            Some(view) => (view.as_ptr(), recv.count_i64()),
            None => (unused().cast_const(), 0),
        };

        tracing::trace!(rank = self.rank(), root, count = recv.count(), "scatter");
        let ret = unsafe {
            self.transport().scatter(
                send_ptr,
                send_count,
                element_type.tag(),
                recv.as_mut_ptr(),
                recv.count_i64(),
                element_type.tag(),
                root,
                self.raw_handle(),
            )
        };
        self.check_received(ret, root, recv.count())
    }

    /// Exchange one segment with every rank.
    ///
    /// `send` is split into `size` equal segments; segment `j` goes to rank
    /// `j`. Segment `i` of `recv` receives rank `i`'s segment addressed to
    /// this rank.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCount`] if `send.len()` is not a multiple of `size`.
    pub fn alltoall<S, R>(&self, send: &S, recv: &mut R) -> Result<()>
    where
        S: Buffer + ?Sized,
        R: BufferMut + ?Sized,
    {
        let send = view_of(send, 0)?;
        let element_type = send.element_type();
        if send.count() % self.group_len() != 0 {
            return Err(Error::InvalidCount(send.count_i64()));
        }
        let segment = (send.count() / self.group_len()) as i64;
        let mut recv = view_of_mut(recv, send.count())?;
        recv.expect_type(element_type)?;

        tracing::trace!(rank = self.rank(), segment, "alltoall");
        let ret = unsafe {
            self.transport().alltoall(
                send.as_ptr(),
                segment,
                element_type.tag(),
                recv.as_mut_ptr(),
                segment,
                element_type.tag(),
                self.raw_handle(),
            )
        };
        self.check_received(ret, ANY_SOURCE, segment as usize)
    }

    /// Combine every rank's `send` element-wise under `op`, leaving the
    /// result in `recv` at `root`. `recv` is ignored on every other rank.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOp`] if `op` is not defined for the element type.
    pub fn reduce<S, R>(&self, send: &S, recv: &mut R, op: ReduceOp, root: i32) -> Result<()>
    where
        S: Buffer + ?Sized,
        R: BufferMut + ?Sized,
    {
        self.validate_root(root)?;
        let send = view_of(send, 0)?;
        let element_type = send.element_type();
        Self::check_op(op, element_type)?;

        let mut recv_view = None;
        if self.rank() == root {
            let view = view_of_mut(recv, send.count())?;
            view.expect_type(element_type)?;
            recv_view = Some(view);
        }
        let recv_ptr = match recv_view.as_mut() {
            Some(view) => view.as_mut_ptr(),
            None => unused(),
        };

        tracing::trace!(rank = self.rank(), root, ?op, count = send.count(), "reduce");
        let ret = unsafe {
            self.transport().reduce(
                send.as_ptr(),
                recv_ptr,
                send.count_i64(),
                element_type.tag(),
                op as i32,
                root,
                self.raw_handle(),
            )
        };
        self.check(ret)
    }

    /// Combine every rank's `send` element-wise under `op`, leaving the
    /// result in `recv` at every rank.
    ///
    /// # Example
    ///
    /// ```
    /// use mpi_bridge::{LocalConfig, ReduceOp, Universe};
    ///
    /// let results = Universe::new(LocalConfig::new(3))
    ///     .run(|mpi| {
    ///         let world = mpi.world()?;
    ///         let send = vec![world.rank() as i64; 4];
    ///         let mut recv = vec![0i64; 4];
    ///         world.allreduce(&send, &mut recv, ReduceOp::Sum)?;
    ///         Ok::<_, mpi_bridge::Error>(recv)
    ///     })
    ///     .unwrap();
    /// for recv in results {
    ///     assert_eq!(recv.unwrap(), vec![3; 4]);
    /// }
    /// ```
    pub fn allreduce<S, R>(&self, send: &S, recv: &mut R, op: ReduceOp) -> Result<()>
    where
        S: Buffer + ?Sized,
        R: BufferMut + ?Sized,
    {
        let send = view_of(send, 0)?;
        let element_type = send.element_type();
        Self::check_op(op, element_type)?;
        let mut recv = view_of_mut(recv, send.count())?;
        recv.expect_type(element_type)?;

        tracing::trace!(rank = self.rank(), ?op, count = send.count(), "allreduce");
        let ret = unsafe {
            self.transport().allreduce(
                send.as_ptr(),
                recv.as_mut_ptr(),
                send.count_i64(),
                element_type.tag(),
                op as i32,
                self.raw_handle(),
            )
        };
        self.check(ret)
    }

    /// All-reduce a single value.
    pub fn allreduce_scalar<T: MpiDatatype>(&self, value: T, op: ReduceOp) -> Result<T> {
        let send = [value];
        let mut recv = [value];
        self.allreduce(&send, &mut recv, op)?;
        Ok(recv[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{LocalConfig, Universe};
    use crate::{ElementType, Mpi};
    use num_complex::Complex;
    use std::sync::Arc;

    fn single_rank() -> Mpi {
        let universe = Universe::new(LocalConfig::new(1));
        let endpoint = universe.endpoints().remove(0);
        Mpi::init(Arc::new(endpoint)).unwrap()
    }

    #[test]
    fn roots_outside_the_group_are_rejected() {
        let mpi = single_rank();
        let world = mpi.world().unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(world.bcast(&mut buf, 1), Err(Error::InvalidRank(1)));
        assert_eq!(
            world.gather(&[1i32], &mut [0i32; 1], crate::PROC_NULL),
            Err(Error::InvalidRank(crate::PROC_NULL))
        );
    }

    #[test]
    fn gather_needs_room_for_every_rank() {
        let mpi = single_rank();
        let world = mpi.world().unwrap();
        let mut recv = [0.0f64; 2];
        assert_eq!(
            world.gather(&[1.0f64, 2.0, 3.0], &mut recv, 0),
            Err(Error::TooSmall {
                required: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn mixed_element_types_are_rejected() {
        let mpi = single_rank();
        let world = mpi.world().unwrap();
        let mut recv = [0i64; 4];
        assert_eq!(
            world.allgather(&[1i32, 2], &mut recv),
            Err(Error::TypeMismatch {
                expected: ElementType::Int32,
                found: ElementType::Int64
            })
        );
    }

    #[test]
    fn reduction_ops_are_checked_against_the_type() {
        let mpi = single_rank();
        let world = mpi.world().unwrap();
        let send = [Complex::new(1.0f64, 0.0)];
        let mut recv = [Complex::new(0.0f64, 0.0)];
        assert_eq!(
            world.allreduce(&send, &mut recv, ReduceOp::Max),
            Err(Error::InvalidOp {
                op: ReduceOp::Max,
                element_type: ElementType::Complex128
            })
        );
        world.allreduce(&send, &mut recv, ReduceOp::Sum).unwrap();
        assert_eq!(recv, send);
    }

    #[test]
    fn single_rank_collectives_are_identity() {
        let mpi = single_rank();
        let world = mpi.world().unwrap();
        world.barrier().unwrap();

        let mut data = vec![1u32, 2, 3];
        world.bcast(&mut data, 0).unwrap();
        assert_eq!(data, vec![1, 2, 3]);

        let mut gathered = vec![0u32; 3];
        world.gather(&data, &mut gathered, 0).unwrap();
        assert_eq!(gathered, data);

        let mut scattered = vec![0u32; 3];
        world.scatter(&gathered, &mut scattered, 0).unwrap();
        assert_eq!(scattered, data);

        let mut exchanged = vec![0u32; 3];
        world.alltoall(&data, &mut exchanged).unwrap();
        assert_eq!(exchanged, data);

        let mut reduced = vec![0u32; 3];
        world.reduce(&data, &mut reduced, ReduceOp::Max, 0).unwrap();
        assert_eq!(reduced, data);
        assert_eq!(world.allreduce_scalar(7.5f32, ReduceOp::Prod).unwrap(), 7.5);
    }

    #[test]
    fn strided_send_buffers_are_rejected() {
        let mpi = single_rank();
        let world = mpi.world().unwrap();
        let data = [1i16, 2, 3, 4];
        let mut recv = [0i16; 2];
        assert_eq!(
            world.allreduce(&crate::Strided::new(&data, 2), &mut recv, ReduceOp::Sum),
            Err(Error::NotContiguous { stride: 2 })
        );
    }
}
