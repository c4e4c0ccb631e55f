//! Nonblocking point-to-point traffic and request completion.

mod common;

use std::sync::Arc;

use mpi_bridge::{
    scope, Error, Mpi, Request, RequestState, Result, Status, Universe, ANY_SOURCE,
};

#[test]
fn isend_wait_reports_the_sender() {
    let results = common::run(3, |mpi| {
        let world = mpi.world()?;
        let rank = world.rank();
        let message = format!("Hello from {rank}");
        scope(|scope| -> Result<()> {
            let mut request = world.isend(scope, &message, 0, rank)?;
            let status = request.wait()?;
            assert_eq!(status.source, rank);
            assert_eq!(status.tag, rank);
            Ok(())
        })?;

        if rank == 0 {
            for source in 0..world.size() {
                let mut buf = vec![0u8; 16];
                let status = scope(|scope| -> Result<Status> {
                    world.irecv(scope, &mut buf, source, source)?.wait()
                })?;
                buf.truncate(status.count as usize);
                assert_eq!(buf, format!("Hello from {source}").into_bytes());
            }
        }
        Ok(())
    });
    assert_eq!(results.len(), 3);
}

#[test]
fn nonblocking_ring_matches_blocking_content() {
    let results = common::run(4, |mpi| {
        let world = mpi.world()?;
        let (rank, size) = (world.rank(), world.size());
        let next = (rank + 1) % size;
        let prev = (rank + size - 1) % size;
        let send = vec![f64::from(rank) * 10.0 + 1.0, f64::from(rank) * 10.0 + 2.0];
        let mut recv = vec![0.0f64; 2];

        scope(|scope| -> Result<()> {
            let mut recv_req = world.irecv(scope, &mut recv, prev, 100)?;
            let mut send_req = world.isend(scope, &send, next, 100)?;
            send_req.wait()?;
            let first = recv_req.wait()?;
            let second = recv_req.wait()?;
            assert_eq!(first, second);
            assert_eq!(first.source, prev);
            Ok(())
        })?;
        Ok(recv)
    });
    for (rank, recv) in results.iter().enumerate() {
        let prev = ((rank + 3) % 4) as f64;
        assert_eq!(*recv, vec![prev * 10.0 + 1.0, prev * 10.0 + 2.0]);
    }
}

#[test]
fn wait_all_completes_outstanding_receives() {
    let results = common::run(2, |mpi| {
        let world = mpi.world()?;
        if world.rank() == 0 {
            let payloads = [[1i32; 4], [2; 4], [3; 4]];
            scope(|scope| -> Result<Vec<Status>> {
                let mut requests = payloads
                    .iter()
                    .enumerate()
                    .map(|(tag, p)| world.isend(scope, p, 1, tag as i32))
                    .collect::<Result<Vec<_>>>()?;
                Request::wait_all(&mut requests)
            })?;
            return Ok(Vec::new());
        }

        let mut bufs = [[0i32; 4]; 3];
        let statuses = scope(|scope| -> Result<Vec<Status>> {
            let mut requests = bufs
                .iter_mut()
                .enumerate()
                .map(|(tag, buf)| world.irecv(scope, buf, 0, tag as i32))
                .collect::<Result<Vec<_>>>()?;
            Request::wait_all(&mut requests)
        })?;
        assert!(statuses.iter().all(|s| s.count == 4));
        Ok(bufs.to_vec())
    });
    assert_eq!(results[1], vec![[1; 4], [2; 4], [3; 4]]);
}

#[test]
fn test_polls_until_the_message_arrives() {
    let results = common::run(2, |mpi| {
        let world = mpi.world()?;
        if world.rank() == 1 {
            // Let rank 0 post its receive and poll at least once
            world.barrier()?;
            world.send(&[42u64], 0, 9)?;
            return Ok(0);
        }
        let mut buf = [0u64; 1];
        scope(|scope| -> Result<()> {
            let mut request = world.irecv(scope, &mut buf, 1, 9)?;
            assert_eq!(request.test()?, None);
            world.barrier()?;
            let status = loop {
                if let Some(status) = request.test()? {
                    break status;
                }
                std::thread::yield_now();
            };
            assert_eq!(request.state(), RequestState::Completed(status));
            assert_eq!(request.test()?, Some(status));
            Ok(())
        })?;
        Ok(buf[0])
    });
    assert_eq!(results[0], 42);
}

#[test]
fn completed_requests_are_answered_without_the_transport() {
    let universe = Universe::new(common::config(2));
    let endpoints: Vec<_> = universe.endpoints().into_iter().map(Arc::new).collect();

    std::thread::scope(|s| {
        let receiver = Arc::clone(&endpoints[0]);
        let sender = Arc::clone(&endpoints[1]);
        s.spawn(move || {
            let mpi = Mpi::init(sender).unwrap();
            let world = mpi.world().unwrap();
            world.send(&[1.0f32, 2.0], 0, 0).unwrap();
        });
        s.spawn(move || {
            let counts = Arc::clone(&receiver);
            let mpi = Mpi::init(receiver).unwrap();
            let world = mpi.world().unwrap();
            let mut buf = [0.0f32; 2];
            scope(|scope| {
                let mut request = world.irecv(scope, &mut buf, ANY_SOURCE, 0).unwrap();
                let status = request.wait().unwrap();

                let before = counts.call_counts();
                for _ in 0..5 {
                    assert_eq!(request.test().unwrap(), Some(status));
                    assert_eq!(request.wait().unwrap(), status);
                }
                let after = counts.call_counts();
                assert_eq!(before, after);
                assert_eq!(after.waits, 1);
            });
            assert_eq!(buf, [1.0, 2.0]);
        });
    });
}

#[test]
fn cancelled_receive_leaves_the_message_queued() {
    let results = common::run(2, |mpi| {
        let world = mpi.world()?;
        if world.rank() == 0 {
            world.barrier()?;
            world.send(&[5i8, 6], 1, 0)?;
            return Ok(Vec::new());
        }
        let mut buf = [0i8; 2];
        scope(|scope| -> Result<()> {
            let mut request = world.irecv(scope, &mut buf, 0, 0)?;
            assert!(request.cancel()?);
            assert_eq!(request.wait(), Err(Error::Cancelled));
            assert_eq!(request.state(), RequestState::Cancelled);
            Ok(())
        })?;
        world.barrier()?;
        world.recv(&mut buf, 0, 0)?;
        Ok(buf.to_vec())
    });
    assert_eq!(results[1], vec![5, 6]);
}

#[test]
fn leaked_receive_is_withdrawn_when_its_scope_ends() {
    let results = common::run(2, |mpi| {
        let world = mpi.world()?;
        if world.rank() == 0 {
            world.barrier()?;
            world.send(&[0xdead_beef_u64; 8], 1, 7)?;
            return Ok(Vec::new());
        }
        let mut doomed = vec![0u64; 8];
        scope(|scope| -> Result<()> {
            let request = world.irecv(scope, &mut doomed, 0, 7)?;
            std::mem::forget(request);
            Ok(())
        })?;
        drop(doomed);
        world.barrier()?;

        let mut fresh = vec![0u64; 8];
        world.recv(&mut fresh, 0, 7)?;
        Ok(fresh)
    });
    assert_eq!(results[1], vec![0xdead_beef; 8]);
}
