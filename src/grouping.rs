//! Grouping of active cells into families that must not be split.

use std::ops::Range;

use crate::{constants::nchildren, forest::Forest, ordering::LinearOrdering};

/// A run of consecutive active cells in the linear ordering that must share one owner.
///
/// A group is either a single cell or the complete set of `2^DIM` active children
/// of one parent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AtomicGroup {
    /// Linear index of the first cell of the group.
    pub start: usize,
    /// Number of cells in the group.
    pub len: usize,
}

impl AtomicGroup {
    /// The linear indices of the cells of the group.
    pub fn cells(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    /// Return true if the group is a complete family.
    pub fn is_family(&self) -> bool {
        self.len > 1
    }
}

/// Split the linearly ordered active cells into atomic groups.
///
/// The children of a parent collapse into one group if all of them are active.
/// Every other active cell forms a group of its own.
pub fn group_families<const DIM: usize>(
    forest: &Forest<DIM>,
    ordering: &LinearOrdering,
) -> Vec<AtomicGroup> {
    let family_size = nchildren(DIM);
    let mut groups = Vec::with_capacity(ordering.len());
    let mut index = 0;

    while index < ordering.len() {
        let id = ordering.cell(index);

        let complete_family = forest
            .cell(id)
            .parent()
            .and_then(|parent| forest.cell(parent).children())
            .is_some_and(|siblings| {
                siblings.start == id
                    && siblings.clone().all(|sibling| forest.cell(sibling).is_active())
            });

        let len = if complete_family { family_size } else { 1 };

        // All active siblings follow each other in the pre-order traversal.
        debug_assert!(
            !complete_family
                || (0..len).all(|offset| ordering.cell(index + offset) == id + offset)
        );

        groups.push(AtomicGroup { start: index, len });
        index += len;
    }

    groups
}

/// Map every linear cell index to the index of the group containing it.
pub fn group_of_cells(groups: &[AtomicGroup]) -> Vec<usize> {
    groups
        .iter()
        .enumerate()
        .flat_map(|(group, atomic)| atomic.cells().map(move |_| group))
        .collect()
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::{group_families, group_of_cells, AtomicGroup};
    use crate::{forest::Forest, ordering::LinearOrdering};

    #[test]
    fn test_uniform_refinement() {
        let mut forest = Forest::<2>::subdivided_hyper_cube(8, 0.0, 16.0).unwrap();
        forest.refine_global(1).unwrap();

        let ordering = LinearOrdering::new(&forest);
        let groups = group_families(&forest, &ordering);

        assert_eq!(groups.len(), 64);
        assert!(groups.iter().all(|group| group.len == 4));
        assert_eq!(groups[1], AtomicGroup { start: 4, len: 4 });
    }

    #[test]
    fn test_coarse_cells_are_singletons() {
        let forest = Forest::<3>::subdivided_hyper_cube(3, 0.0, 1.0).unwrap();

        let ordering = LinearOrdering::new(&forest);
        let groups = group_families(&forest, &ordering);

        assert_eq!(groups.len(), 27);
        assert!(groups.iter().all(|group| !group.is_family()));
    }

    #[test]
    fn test_partially_refined_family() {
        let mut forest = Forest::<2>::subdivided_hyper_cube(1, 0.0, 1.0).unwrap();
        let children = forest.refine(0).unwrap();
        forest.refine(children.start + 1).unwrap();

        let ordering = LinearOrdering::new(&forest);
        let groups = group_families(&forest, &ordering);

        // The three active children of the root are not grouped, the four
        // grandchildren form one family.
        assert_eq!(
            groups,
            vec![
                AtomicGroup { start: 0, len: 1 },
                AtomicGroup { start: 1, len: 4 },
                AtomicGroup { start: 5, len: 1 },
                AtomicGroup { start: 6, len: 1 },
            ]
        );

        assert_eq!(group_of_cells(&groups), vec![0, 1, 1, 1, 1, 2, 3]);
    }

    #[test]
    fn test_groups_cover_all_cells() {
        let mut forest = Forest::<3>::subdivided_hyper_cube(2, 0.0, 1.0).unwrap();
        forest.refine_global(1).unwrap();
        let active = forest.active_cells().collect_vec();
        for &id in active.iter().step_by(3) {
            forest.refine(id).unwrap();
        }

        let ordering = LinearOrdering::new(&forest);
        let groups = group_families(&forest, &ordering);

        let covered = groups.iter().flat_map(|group| group.cells()).collect_vec();
        assert_eq!(covered, (0..ordering.len()).collect_vec());
    }
}
