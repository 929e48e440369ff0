//! Computation of partition boundaries from cumulative weights.

use std::ops::Range;

use itertools::Itertools;

use crate::{
    error::{Error, Result},
    grouping::AtomicGroup,
};

/// Boundaries of a partition of the global group order into `P` contiguous shares.
///
/// Entry `p` is the index of the first group owned by process `p` and entry `P`
/// is the total number of groups. Shares may be empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionVector(Vec<usize>);

impl PartitionVector {
    /// Create a partition vector from its boundaries.
    ///
    /// The boundaries must start at 0 and be non-decreasing.
    pub fn new(boundaries: Vec<usize>) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(Error::InvalidProcessCount(boundaries.len().saturating_sub(1)));
        }
        if boundaries[0] != 0 || boundaries.iter().tuple_windows().any(|(a, b)| a > b) {
            return Err(Error::ConsistencyViolation(format!(
                "partition boundaries {boundaries:?} are not non-decreasing from 0"
            )));
        }
        Ok(Self(boundaries))
    }

    /// The boundaries.
    pub fn boundaries(&self) -> &[usize] {
        &self.0
    }

    /// Number of processes.
    pub fn nprocs(&self) -> usize {
        self.0.len() - 1
    }

    /// Total number of groups.
    pub fn ngroups(&self) -> usize {
        self.0[self.nprocs()]
    }

    /// The groups owned by a process.
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.0[rank]..self.0[rank + 1]
    }

    /// Number of groups owned by each process.
    pub fn counts(&self) -> Vec<usize> {
        self.0.iter().tuple_windows().map(|(a, b)| b - a).collect()
    }

    /// The process owning a group.
    pub fn owner(&self, group: usize) -> usize {
        debug_assert!(group < self.ngroups());
        // The last process whose share starts at or before the group.
        self.0.partition_point(|&start| start <= group) - 1
    }

    /// Translate group boundaries into boundaries in the linear order of active cells.
    pub fn cell_boundaries(&self, groups: &[AtomicGroup], ncells: usize) -> Vec<usize> {
        debug_assert_eq!(groups.len(), self.ngroups());
        self.0
            .iter()
            .map(|&group| groups.get(group).map_or(ncells, |atomic| atomic.start))
            .collect()
    }
}

/// Compute the boundaries of a weighted partition into `nprocs` shares.
///
/// `cumulative` holds the inclusive cumulative weights of the groups in global
/// order and `total` the total weight. The boundary of process `p` is the smallest
/// group index whose cumulative weight reaches `p * total / nprocs`. Ties resolve
/// to the first group attaining the target, so lower ranks never receive more
/// groups than needed. A single group heavier than `total / nprocs` makes several
/// consecutive boundaries coincide, leaving the affected processes without groups.
pub fn solve_boundaries(cumulative: &[f64], total: f64, nprocs: usize) -> Result<PartitionVector> {
    if nprocs == 0 {
        return Err(Error::InvalidProcessCount(nprocs));
    }
    debug_assert!(cumulative.iter().tuple_windows().all(|(a, b)| a <= b));

    let mut boundaries = Vec::with_capacity(nprocs + 1);
    boundaries.push(0);
    for p in 1..nprocs {
        let target = total * p as f64 / nprocs as f64;
        boundaries.push(cumulative.partition_point(|&weight| weight < target));
    }
    boundaries.push(cumulative.len());

    PartitionVector::new(boundaries)
}
