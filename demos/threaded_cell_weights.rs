//! Repartition a refined square with one heavy cell on three threads.

use bempp_forest::{io::export_partition_to_vtk, DistributedMesh, Forest, ProcessGroup, Settings, ThreadGroup};
use itertools::Itertools;

pub fn main() {
    let counts = ThreadGroup::run(3, |comm| {
        let forest = Forest::<2>::subdivided_hyper_cube(8, 0.0, 1.0).unwrap();
        let mut mesh = DistributedMesh::new(forest, Settings::default(), &comm).unwrap();
        mesh.refine_global(1).unwrap();

        // The bottom left cell weighs as much as the whole mesh.
        let heavy = mesh.n_global_active_cells() as f64;
        let weights = mesh
            .locally_owned_active_cells()
            .into_iter()
            .map(|id| {
                if mesh.forest().center(id).iter().all(|&x| x < 1.0 / 16.0) {
                    heavy
                } else {
                    1.0
                }
            })
            .collect_vec();

        mesh.repartition(Some(&weights)).unwrap();

        if comm.rank() == 0 {
            export_partition_to_vtk(&mesh, "threaded_cell_weights.vtk").unwrap();
        }

        mesh.n_locally_owned_active_cells()
    });

    for (rank, count) in counts.iter().enumerate() {
        println!("Rank {rank} owns {count} cells.");
    }
}
