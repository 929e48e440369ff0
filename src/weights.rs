//! Accumulation of cell weights into group weights.

use log::debug;

use crate::{
    comm::ProcessGroup,
    error::{Error, Result},
    tools::inclusive_cumsum,
};

/// Weights of the atomic groups in global order.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupWeights {
    weights: Vec<f64>,
    cumulative: Vec<f64>,
    total: f64,
}

impl GroupWeights {
    /// Build group weights from the weight of every group.
    pub fn from_weights(weights: Vec<f64>) -> Self {
        let cumulative = inclusive_cumsum(&weights);
        let total = cumulative.last().copied().unwrap_or(0.0);
        Self {
            weights,
            cumulative,
            total,
        }
    }

    /// Weight of each group.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Inclusive cumulative weights. Entry `g` is the weight of groups `0..=g`.
    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    /// Total weight over all groups.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Largest weight of a single group.
    pub fn max_weight(&self) -> f64 {
        self.weights.iter().copied().fold(0.0, f64::max)
    }
}

/// Check the weights supplied for the locally owned active cells.
///
/// Weights must be finite and non-negative. Without weights every cell has weight one.
pub fn local_weights(weights: Option<&[f64]>, nlocal: usize) -> Result<Vec<f64>> {
    let Some(weights) = weights else {
        return Ok(vec![1.0; nlocal]);
    };

    if weights.len() != nlocal {
        return Err(Error::WeightCountMismatch {
            expected: nlocal,
            actual: weights.len(),
        });
    }

    if let Some((index, &weight)) = weights
        .iter()
        .enumerate()
        .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
    {
        return Err(Error::InvalidWeight { index, weight });
    }

    Ok(weights.to_vec())
}

/// Compute the global weight of every atomic group.
///
/// `contributions` holds pairs of linear cell index and weight for the cells known
/// locally and `group_of_cell` maps linear cell indices to groups. The local group
/// sums are added up over all ranks with a single reduction, after which every rank
/// forms the cumulative sums over the global group order.
pub fn accumulate_group_weights<G: ProcessGroup>(
    contributions: impl IntoIterator<Item = (usize, f64)>,
    group_of_cell: &[usize],
    ngroups: usize,
    comm: &G,
) -> GroupWeights {
    let mut local = vec![0.0; ngroups];
    for (cell, weight) in contributions {
        local[group_of_cell[cell]] += weight;
    }

    let group_weights = GroupWeights::from_weights(comm.all_reduce_sum(&local));

    debug!(
        "Accumulated weights of {} groups, total weight {}",
        ngroups,
        group_weights.total()
    );

    group_weights
}

#[cfg(test)]
mod test {
    use super::{accumulate_group_weights, local_weights, GroupWeights};
    use crate::{
        comm::{ProcessGroup, ThreadGroup},
        error::Error,
    };

    #[test]
    fn test_local_weights() {
        assert_eq!(local_weights(None, 3), Ok(vec![1.0; 3]));
        assert_eq!(local_weights(Some(&[0.0, 2.5]), 2), Ok(vec![0.0, 2.5]));
        assert_eq!(
            local_weights(Some(&[1.0]), 2),
            Err(Error::WeightCountMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            local_weights(Some(&[1.0, -1.0]), 2),
            Err(Error::InvalidWeight {
                index: 1,
                weight: -1.0
            })
        );
        assert!(matches!(
            local_weights(Some(&[f64::NAN]), 1),
            Err(Error::InvalidWeight { index: 0, .. })
        ));
        assert_eq!(
            local_weights(Some(&[2.0, f64::INFINITY]), 2),
            Err(Error::InvalidWeight {
                index: 1,
                weight: f64::INFINITY
            })
        );
    }

    #[test]
    fn test_empty_groups() {
        let weights = GroupWeights::from_weights(Vec::new());
        assert_eq!(weights.total(), 0.0);
        assert!(weights.cumulative().is_empty());
        assert_eq!(weights.max_weight(), 0.0);
    }

    #[test]
    fn test_accumulate_across_ranks() {
        // Six cells in three groups [0, 1], [2], [3, 4, 5]. The cells are scattered
        // over the ranks such that groups are split between ranks.
        let group_of_cell = [0, 0, 1, 2, 2, 2];
        let owned = [vec![0, 3], vec![1, 4], vec![2, 5]];

        let results = ThreadGroup::run(3, |comm| {
            let contributions = owned[comm.rank()]
                .iter()
                .map(|&cell| (cell, (cell + 1) as f64));
            accumulate_group_weights(contributions, &group_of_cell, 3, &comm)
        });

        for weights in results {
            assert_eq!(weights.weights(), &[3.0, 3.0, 15.0]);
            assert_eq!(weights.cumulative(), &[3.0, 6.0, 21.0]);
            assert_eq!(weights.total(), 21.0);
            assert_eq!(weights.max_weight(), 15.0);
        }
    }
}
