//! Ghost layer of a set of owned cells.

use itertools::Itertools;

use crate::forest::{CellId, Forest};

/// Compute the active cells that are not owned but touch an owned cell.
///
/// Cells touching only in a vertex or edge are included. The result is sorted by cell id.
pub fn ghost_layer<const DIM: usize>(
    forest: &Forest<DIM>,
    owned: &[CellId],
    is_owned: impl Fn(CellId) -> bool,
) -> Vec<CellId> {
    owned
        .iter()
        .flat_map(|&id| forest.touching_active_cells(id))
        .filter(|&neighbour| !is_owned(neighbour))
        .sorted_unstable()
        .dedup()
        .collect()
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::ghost_layer;
    use crate::forest::Forest;

    #[test]
    fn test_ghost_layer_of_a_strip() {
        // Trees are numbered with x running fastest. Own the first column.
        let forest = Forest::<2>::subdivided_hyper_cube(4, 0.0, 4.0).unwrap();
        let owned = (0..4).map(|row| 4 * row).collect_vec();

        let ghosts = ghost_layer(&forest, &owned, |id| id % 4 == 0);

        assert_eq!(ghosts, vec![1, 5, 9, 13]);
    }

    #[test]
    fn test_ghost_layer_with_hanging_cells() {
        let mut forest = Forest::<2>::subdivided_hyper_cube(2, 0.0, 2.0).unwrap();
        let children = forest.refine(1).unwrap().collect_vec();

        let ghosts = ghost_layer(&forest, &[0], |id| id == 0);

        assert_eq!(ghosts, vec![2, 3, children[0], children[2]]);
    }

    #[test]
    fn test_nothing_owned() {
        let forest = Forest::<3>::subdivided_hyper_cube(2, 0.0, 1.0).unwrap();
        assert!(ghost_layer(&forest, &[], |_| false).is_empty());
    }
}
