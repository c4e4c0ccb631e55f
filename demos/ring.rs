//! Ring communication example - point-to-point and collective traffic.
//!
//! Each rank passes a token to the next rank in a ring, then all ranks agree
//! on a checksum with an all-reduce.
//!
//! Run with: MPI_BRIDGE_NP=4 RUST_LOG=mpi_bridge=trace cargo run --example ring

use mpi_bridge::{LocalConfig, ReduceOp, Result, Universe};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_names(true)
        .init();

    let mut config = LocalConfig::from_env();
    if config.size < 2 {
        config.size = 4;
    }

    let results = Universe::new(config).run(|mpi| -> Result<f64> {
        let world = mpi.world()?;
        let rank = world.rank();
        let size = world.size();

        let next = (rank + 1) % size;
        let prev = (rank + size - 1) % size;

        // Data to send
        let send_data = vec![f64::from(rank) * 100.0 + 1.0, f64::from(rank) * 100.0 + 2.0];
        let mut recv_data = vec![0.0; 2];

        println!("Rank {rank}: sending {send_data:?} to rank {next}");

        // Sends complete eagerly, so every rank may send first
        world.send(&send_data, next, 0)?;
        let status = world.recv(&mut recv_data, prev, 0)?;
        println!(
            "Rank {rank}: received {recv_data:?} from rank {} (tag={}, count={})",
            status.source, status.tag, status.count
        );

        let expected = vec![f64::from(prev) * 100.0 + 1.0, f64::from(prev) * 100.0 + 2.0];
        assert_eq!(recv_data, expected, "Data mismatch!");

        world.barrier()?;
        world.allreduce_scalar(recv_data.iter().sum::<f64>(), ReduceOp::Sum)
    })?;

    let checksum = results.into_iter().next().transpose()?.unwrap_or_default();
    println!("\nRing communication test passed! (checksum {checksum})");
    Ok(())
}
