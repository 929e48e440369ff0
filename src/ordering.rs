//! Linear ordering of the active cells of a forest.

use std::collections::HashMap;

use crate::{
    forest::{CellId, Forest},
    morton::{fingerprint, CellKey},
};

/// The global, process independent order of the active cells of a forest.
///
/// The order is a depth first pre-order traversal of the trees in tree order,
/// visiting children in canonical order. Siblings are therefore adjacent and the
/// order only depends on the topology of the forest.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearOrdering {
    cells: Vec<CellId>,
    keys: Vec<CellKey>,
    positions: HashMap<CellId, usize>,
}

impl LinearOrdering {
    /// Traverse a forest and number its active cells.
    pub fn new<const DIM: usize>(forest: &Forest<DIM>) -> Self {
        let mut cells = Vec::with_capacity(forest.n_active_cells());
        let mut stack = (0..forest.n_trees())
            .rev()
            .map(|tree| forest.root(tree))
            .collect::<Vec<_>>();

        while let Some(current) = stack.pop() {
            match forest.cell(current).children() {
                Some(children) => stack.extend(children.rev()),
                None => cells.push(current),
            }
        }

        let keys = cells
            .iter()
            .map(|&id| forest.cell(id).key())
            .collect::<Vec<_>>();

        debug_assert!(keys.windows(2).all(|w| w[0] < w[1]));

        let positions = cells
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect();

        Self {
            cells,
            keys,
            positions,
        }
    }

    /// Number of active cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Return true if there are no active cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The active cells in linear order.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// The cell at a given linear index.
    pub fn cell(&self, index: usize) -> CellId {
        self.cells[index]
    }

    /// The key of the cell at a given linear index.
    pub fn key(&self, index: usize) -> CellKey {
        self.keys[index]
    }

    /// The linear index of an active cell, `None` if the cell is not active.
    pub fn position(&self, id: CellId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Fingerprint of the ordering used to compare orderings across processes.
    pub fn fingerprint(&self) -> u64 {
        fingerprint(&self.keys)
    }
}

#[cfg(test)]
mod test {
    use super::LinearOrdering;
    use crate::forest::Forest;

    #[test]
    fn test_siblings_are_consecutive() {
        let mut forest = Forest::<2>::subdivided_hyper_cube(2, 0.0, 1.0).unwrap();
        let children = forest.refine(1).unwrap();
        let grandchildren = forest.refine(children.start + 3).unwrap();

        let ordering = LinearOrdering::new(&forest);

        // Tree 0, three children of tree 1, the four grandchildren, the last child of
        // tree 1 is refined, then trees 2 and 3.
        let mut expected = vec![0];
        expected.extend(children.start..children.start + 3);
        expected.extend(grandchildren);
        expected.extend([2, 3]);

        assert_eq!(ordering.cells(), expected.as_slice());
        assert_eq!(ordering.len(), 10);
        assert_eq!(ordering.position(1), None);
        assert_eq!(ordering.position(2), Some(8));
    }

    #[test]
    fn test_ordering_is_independent_of_refinement_order() {
        // Refining in a different order changes the cell ids but not the keys.
        let mut first = Forest::<3>::subdivided_hyper_cube(2, 0.0, 1.0).unwrap();
        first.refine(0).unwrap();
        first.refine(7).unwrap();

        let mut second = Forest::<3>::subdivided_hyper_cube(2, 0.0, 1.0).unwrap();
        second.refine(7).unwrap();
        second.refine(0).unwrap();

        let first = LinearOrdering::new(&first);
        let second = LinearOrdering::new(&second);

        assert_ne!(first.cells(), second.cells());
        assert_eq!(first.fingerprint(), second.fingerprint());
        for index in 0..first.len() {
            assert_eq!(first.key(index), second.key(index));
        }
    }
}
