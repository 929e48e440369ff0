//! Repartition a refined cube with one heavy cell across MPI ranks.
//!
//! Run with `mpirun -n 3 cargo run --example mpi_cell_weights --features mpi`.

use bempp_forest::{DistributedMesh, Forest, MpiGroup, ProcessGroup, Settings};
use itertools::Itertools;

pub fn main() {
    // Initialise MPI
    let universe = mpi::initialize().unwrap();

    // Get the world communicator
    let world = universe.world();
    let comm = MpiGroup::new(&world);

    let forest = Forest::<3>::subdivided_hyper_cube(8, 0.0, 1.0).unwrap();
    let mut mesh = DistributedMesh::new(forest, Settings::default(), &comm).unwrap();
    mesh.refine_global(1).unwrap();

    let heavy = mesh.n_global_active_cells() as f64;
    let weight = |id| {
        if mesh.forest().center(id).iter().all(|&x| x < 1.0 / 16.0) {
            heavy
        } else {
            1.0
        }
    };

    let weights = mesh
        .locally_owned_active_cells()
        .into_iter()
        .map(weight)
        .collect_vec();
    mesh.repartition(Some(&weights)).unwrap();

    let weight = |id| {
        if mesh.forest().center(id).iter().all(|&x| x < 1.0 / 16.0) {
            heavy
        } else {
            1.0
        }
    };
    let integrated = mesh.integrated_weights(weight);

    if comm.rank() == 0 {
        for (rank, (count, weight)) in mesh
            .n_locally_owned_active_cells_per_process()
            .iter()
            .zip(integrated)
            .enumerate()
        {
            println!("Rank {rank} owns {count} cells with weight {weight}.");
        }
    }

    // Every cell has a single owner.
    assert_eq!(
        mesh.n_locally_owned_active_cells_per_process()
            .iter()
            .sum::<usize>(),
        mesh.n_global_active_cells()
    );
}
