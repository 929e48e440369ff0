//! Test the collectives of an MPI process group.

use bempp_forest::{tools::inclusive_cumsum, MpiGroup, ProcessGroup};
use itertools::Itertools;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

pub fn main() {
    // Initialise MPI
    let universe = mpi::initialize().unwrap();

    // Get the world communicator
    let world = universe.world();
    let comm = MpiGroup::new(&world);

    // Every rank draws the values of all ranks from the same seed.
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let values = (0..comm.size())
        .map(|_| rng.gen_range(0..100u64))
        .collect_vec();

    // Exclusive prefix sum of one value per rank.
    let offset = comm.exclusive_prefix_sum(values[comm.rank()]);
    let expected = inclusive_cumsum(&values);
    assert_eq!(offset + values[comm.rank()], expected[comm.rank()]);

    // Reductions over a vector with one entry per rank.
    let mut local = vec![0.0; comm.size()];
    local[comm.rank()] = values[comm.rank()] as f64;
    let global = comm.all_reduce_sum(&local);
    assert_eq!(
        global,
        values.iter().map(|&value| value as f64).collect_vec()
    );

    let gathered = comm.all_gather(values[comm.rank()]);
    assert_eq!(gathered, values);

    let min = comm.all_reduce_min(&[values[comm.rank()]]);
    let max = comm.all_reduce_max(&[values[comm.rank()]]);
    assert_eq!(min[0], *values.iter().min().unwrap());
    assert_eq!(max[0], *values.iter().max().unwrap());

    if comm.rank() == 0 {
        println!("Process group collectives agree with the serial computation.");
    }
}
