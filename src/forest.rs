//! Forest of quadtrees and octrees.
//!
//! The forest is stored as an arena of cells. Parent and child relations are
//! indices into the arena. The children of a refined cell occupy `2^DIM`
//! consecutive arena slots and are stored in canonical order: child `c` has the
//! offset `(c >> d) & 1` in direction `d`.

use std::{cmp::Reverse, ops::Range};

use itertools::Itertools;

use crate::{
    constants::{nchildren, DEEPEST_LEVEL, LEVEL_SIZE},
    error::{Error, Result},
    geometry::PhysicalBox,
    morton::CellKey,
};

/// Index of a cell in the arena of a [Forest].
pub type CellId = usize;

/// A cell of the forest.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell<const DIM: usize> {
    tree: usize,
    level: usize,
    anchor: [u64; DIM],
    parent: Option<CellId>,
    first_child: Option<CellId>,
}

impl<const DIM: usize> Cell<DIM> {
    /// Index of the tree (coarse cell) containing this cell.
    pub fn tree(&self) -> usize {
        self.tree
    }

    /// Refinement level. Roots of the trees are on level 0.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Position of the cell within its tree in units of cells on its level.
    pub fn anchor(&self) -> [u64; DIM] {
        self.anchor
    }

    /// The parent cell, `None` for the root of a tree.
    pub fn parent(&self) -> Option<CellId> {
        self.parent
    }

    /// A cell is active if it has not been refined.
    pub fn is_active(&self) -> bool {
        self.first_child.is_none()
    }

    /// The children of a refined cell in canonical order.
    pub fn children(&self) -> Option<Range<CellId>> {
        self.first_child
            .map(|first| first..first + nchildren(DIM))
    }

    /// Process independent key of the cell.
    pub fn key(&self) -> CellKey {
        CellKey::new(self.tree, self.anchor, self.level)
    }
}

/// A forest of `2^DIM`-trees over a subdivided hypercube.
#[derive(Clone, Debug)]
pub struct Forest<const DIM: usize> {
    cells: Vec<Cell<DIM>>,
    repetitions: usize,
    domain: PhysicalBox<DIM>,
}

impl<const DIM: usize> Forest<DIM> {
    /// Create a forest of `repetitions^DIM` trees covering `[left, right]^DIM`.
    ///
    /// The trees are numbered lexicographically with the first coordinate running fastest.
    pub fn subdivided_hyper_cube(repetitions: usize, left: f64, right: f64) -> Result<Self> {
        if DIM == 0 || DIM > 3 {
            return Err(Error::UnsupportedDimension(DIM));
        }
        if repetitions == 0 || left >= right {
            return Err(Error::MalformedTree(format!(
                "cannot subdivide [{left}, {right}] into {repetitions} trees per direction"
            )));
        }

        let ntrees = repetitions.pow(DIM as u32);
        let cells = (0..ntrees)
            .map(|tree| Cell {
                tree,
                level: 0,
                anchor: [0; DIM],
                parent: None,
                first_child: None,
            })
            .collect_vec();

        Ok(Self {
            cells,
            repetitions,
            domain: PhysicalBox::hypercube(left, right),
        })
    }

    /// The physical domain covered by the forest.
    pub fn domain(&self) -> &PhysicalBox<DIM> {
        &self.domain
    }

    /// Number of trees.
    pub fn n_trees(&self) -> usize {
        self.repetitions.pow(DIM as u32)
    }

    /// Number of cells on all levels.
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of active cells.
    pub fn n_active_cells(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_active()).count()
    }

    /// Access a cell.
    pub fn cell(&self, id: CellId) -> &Cell<DIM> {
        &self.cells[id]
    }

    /// The root cell of a tree.
    pub fn root(&self, tree: usize) -> CellId {
        debug_assert!(tree < self.n_trees());
        tree
    }

    /// Iterate over the ids of all active cells in arena order.
    pub fn active_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(id, cell)| if cell.is_active() { Some(id) } else { None })
    }

    /// Position of a tree in the coarse grid.
    pub fn tree_position(&self, tree: usize) -> [u64; DIM] {
        std::array::from_fn(|d| ((tree / self.repetitions.pow(d as u32)) % self.repetitions) as u64)
    }

    /// Refine an active cell and return the range of its new children.
    pub fn refine(&mut self, id: CellId) -> Result<Range<CellId>> {
        let cell = &self.cells[id];
        if !cell.is_active() {
            return Err(Error::MalformedTree(format!("cell {id} is already refined")));
        }
        if cell.level == DEEPEST_LEVEL {
            return Err(Error::RefinementLimit {
                cell: id,
                level: cell.level,
            });
        }

        let (tree, level, anchor) = (cell.tree, cell.level, cell.anchor);
        let first = self.cells.len();

        for child in 0..nchildren(DIM) {
            self.cells.push(Cell {
                tree,
                level: level + 1,
                anchor: std::array::from_fn(|d| 2 * anchor[d] + ((child >> d) & 1) as u64),
                parent: Some(id),
                first_child: None,
            });
        }
        self.cells[id].first_child = Some(first);

        Ok(first..first + nchildren(DIM))
    }

    /// Check that every active cell can be refined `times` more times.
    ///
    /// Reports the deepest active cell if it would pass [DEEPEST_LEVEL].
    pub fn check_global_refinement(&self, times: usize) -> Result<()> {
        let deepest = self
            .active_cells()
            .min_by_key(|&id| Reverse(self.cells[id].level));

        match deepest {
            Some(id) if self.cells[id].level + times > DEEPEST_LEVEL => {
                Err(Error::RefinementLimit {
                    cell: id,
                    level: self.cells[id].level,
                })
            }
            _ => Ok(()),
        }
    }

    /// Refine every active cell `times` times.
    ///
    /// Nothing is refined if a cell would be refined beyond [DEEPEST_LEVEL].
    pub fn refine_global(&mut self, times: usize) -> Result<()> {
        self.check_global_refinement(times)?;
        for _ in 0..times {
            let active = self.active_cells().collect_vec();
            for id in active {
                self.refine(id)?;
            }
        }
        Ok(())
    }

    /// Bounds of a cell in integer coordinates on the deepest level.
    ///
    /// The lower bound is inclusive and the upper bound exclusive.
    pub fn integer_bounds(&self, id: CellId) -> ([u64; DIM], [u64; DIM]) {
        let cell = &self.cells[id];
        let position = self.tree_position(cell.tree);
        let shift = DEEPEST_LEVEL - cell.level;

        let lower: [u64; DIM] =
            std::array::from_fn(|d| position[d] * LEVEL_SIZE + (cell.anchor[d] << shift));
        let upper = std::array::from_fn(|d| lower[d] + (1 << shift));
        (lower, upper)
    }

    /// Physical bounding box of a cell.
    pub fn bounding_box(&self, id: CellId) -> PhysicalBox<DIM> {
        let (lower, upper) = self.integer_bounds(id);
        let extent = (self.repetitions as u64 * LEVEL_SIZE) as f64;

        PhysicalBox::new(
            self.domain
                .reference_to_physical(lower.map(|coord| coord as f64 / extent)),
            self.domain
                .reference_to_physical(upper.map(|coord| coord as f64 / extent)),
        )
    }

    /// Physical center of a cell.
    pub fn center(&self, id: CellId) -> [f64; DIM] {
        let bounds = self.bounding_box(id);
        let (lower, upper) = (bounds.lower(), bounds.upper());
        std::array::from_fn(|d| 0.5 * (lower[d] + upper[d]))
    }

    /// Return true if the closures of two cells intersect.
    pub fn touches(&self, first: CellId, second: CellId) -> bool {
        let (lower1, upper1) = self.integer_bounds(first);
        let (lower2, upper2) = self.integer_bounds(second);

        (0..DIM).all(|d| lower1[d] <= upper2[d] && lower2[d] <= upper1[d])
    }

    /// All active cells other than `id` whose closure intersects the closure of `id`.
    ///
    /// Subtrees are only entered if their root touches the cell.
    pub fn touching_active_cells(&self, id: CellId) -> Vec<CellId> {
        let mut result = Vec::new();
        let mut stack = (0..self.n_trees())
            .rev()
            .map(|tree| self.root(tree))
            .collect_vec();

        while let Some(current) = stack.pop() {
            if current == id || !self.touches(current, id) {
                continue;
            }
            match self.cells[current].children() {
                Some(children) => stack.extend(children.rev()),
                None => result.push(current),
            }
        }

        result
    }

    /// Check the parent and child links of the arena.
    pub fn validate(&self) -> Result<()> {
        for (id, cell) in self.cells.iter().enumerate() {
            match cell.parent {
                None if cell.level != 0 || id >= self.n_trees() => {
                    return Err(Error::MalformedTree(format!(
                        "cell {id} on level {} has no parent",
                        cell.level
                    )));
                }
                Some(parent) => {
                    let consistent = self
                        .cells
                        .get(parent)
                        .and_then(|p| p.children().map(|children| (p, children)))
                        .is_some_and(|(p, children)| {
                            children.contains(&id)
                                && p.level + 1 == cell.level
                                && p.tree == cell.tree
                        });
                    if !consistent {
                        return Err(Error::MalformedTree(format!(
                            "cell {id} is not a child of its parent {parent}"
                        )));
                    }
                }
                None => (),
            }

            if let Some(children) = cell.children() {
                if children.end > self.cells.len()
                    || children
                        .clone()
                        .any(|child| self.cells[child].parent != Some(id))
                {
                    return Err(Error::MalformedTree(format!(
                        "children of cell {id} do not point back to it"
                    )));
                }
            }
        }
        Ok(())
    }
}
