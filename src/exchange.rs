//! Transfer of cell ownership between processes.

use std::ops::Range;

use itertools::{izip, Itertools};
use log::{debug, error};

use crate::{
    comm::{agree, ProcessGroup},
    error::{Error, Result},
    morton::CellKey,
    ordering::LinearOrdering,
    tools::sort_to_bins,
};

/// Metadata of an active cell sent to its new owner.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "mpi", derive(mpi::traits::Equivalence))]
pub struct CellRecord {
    /// Position of the cell in the linear ordering.
    pub linear_index: u64,
    /// Tree of the cell.
    pub tree: u64,
    /// Morton key of the cell within its tree.
    pub morton: u64,
    /// Rank that owned the cell before the exchange.
    pub source: u64,
}

impl CellRecord {
    /// Key of the transferred cell.
    pub fn key(&self) -> CellKey {
        CellKey {
            tree: self.tree,
            morton: self.morton,
        }
    }
}

/// Owner of every linear cell index given the cell boundaries of a partition.
pub fn owners_from_boundaries(cell_boundaries: &[usize]) -> Vec<usize> {
    cell_boundaries
        .iter()
        .tuple_windows()
        .enumerate()
        .flat_map(|(rank, (&start, &end))| (start..end).map(move |_| rank))
        .collect()
}

/// The cells a process sends and receives to move from an old to a new ownership.
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangePlan {
    rank: usize,
    outgoing: Vec<CellRecord>,
    counts: Vec<usize>,
    incoming: Vec<usize>,
    owned: Range<usize>,
}

impl ExchangePlan {
    /// Plan the exchange for `rank`.
    ///
    /// `old_owners` holds the current owner of every cell in linear order and
    /// `cell_boundaries` the `P + 1` boundaries of the new partition in the same order.
    pub fn new(
        rank: usize,
        ordering: &LinearOrdering,
        old_owners: &[usize],
        cell_boundaries: &[usize],
    ) -> Self {
        assert_eq!(old_owners.len(), ordering.len());

        let nprocs = cell_boundaries.len() - 1;
        let new_owners = owners_from_boundaries(cell_boundaries);

        let mut outgoing = Vec::new();
        let mut incoming = Vec::new();

        for (index, &old, &new) in izip!(0.., old_owners, &new_owners) {
            if old == new {
                continue;
            }
            if old == rank {
                let key = ordering.key(index);
                outgoing.push(CellRecord {
                    linear_index: index as u64,
                    tree: key.tree,
                    morton: key.morton,
                    source: rank as u64,
                });
            } else if new == rank {
                incoming.push(index);
            }
        }

        // Outgoing records are sorted by linear index and therefore by destination.
        let outgoing_indices = outgoing
            .iter()
            .map(|record| record.linear_index as usize)
            .collect_vec();
        let counts = sort_to_bins(&outgoing_indices, &cell_boundaries[..nprocs]);

        Self {
            rank,
            outgoing,
            counts,
            incoming,
            owned: cell_boundaries[rank]..cell_boundaries[rank + 1],
        }
    }

    /// Records sent by this process.
    pub fn outgoing(&self) -> &[CellRecord] {
        &self.outgoing
    }

    /// Number of records sent to each rank.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Linear indices of the cells this process receives.
    pub fn incoming(&self) -> &[usize] {
        &self.incoming
    }

    /// Linear indices owned by this process after the exchange.
    pub fn owned(&self) -> Range<usize> {
        self.owned.clone()
    }

    /// Perform the exchange and check the received records.
    ///
    /// The exchange succeeds on every rank or fails on every rank. On failure no
    /// rank may apply the new ownership.
    pub fn execute<G: ProcessGroup>(
        &self,
        ordering: &LinearOrdering,
        old_owners: &[usize],
        comm: &G,
    ) -> Result<Vec<CellRecord>> {
        debug_assert_eq!(comm.rank(), self.rank);

        debug!(
            "Rank {} sends {} cells and expects {} cells",
            self.rank,
            self.outgoing.len(),
            self.incoming.len()
        );

        let mut received = comm.exchange(&self.outgoing, &self.counts);
        let offset = comm.exclusive_prefix_sum(self.owned.len() as u64) as usize;

        received.sort_unstable_by_key(|record| record.linear_index);

        let local = self
            .verify(&received, ordering, old_owners, offset)
            .map(|_| received);

        if let Err(err) = &local {
            error!("Rank {}: {}", self.rank, err);
        }

        agree(local, comm)
    }

    /// Linear indices owned by this process after a verified exchange.
    ///
    /// These are the cells kept from the old ownership merged with the received records.
    pub fn owned_cells(&self, old_owners: &[usize], received: &[CellRecord]) -> Vec<usize> {
        let kept = self.owned().filter(|&index| old_owners[index] == self.rank);
        kept.merge(received.iter().map(|record| record.linear_index as usize))
            .collect()
    }

    fn verify(
        &self,
        received: &[CellRecord],
        ordering: &LinearOrdering,
        old_owners: &[usize],
        offset: usize,
    ) -> Result<()> {
        if offset != self.owned.start {
            return Err(Error::ConsistencyViolation(format!(
                "rank {} expects to own cells from {} but preceding ranks own {} cells",
                self.rank, self.owned.start, offset
            )));
        }

        if received.len() != self.incoming.len() {
            return Err(Error::ConsistencyViolation(format!(
                "rank {} received {} cells but expected {}",
                self.rank,
                received.len(),
                self.incoming.len()
            )));
        }

        for (record, &index) in izip!(received, &self.incoming) {
            let consistent = record.linear_index as usize == index
                && record.key() == ordering.key(index)
                && record.source as usize == old_owners[index];
            if !consistent {
                return Err(Error::ConsistencyViolation(format!(
                    "rank {} received cell {} from rank {} but expected cell {} ({}) from rank {}",
                    self.rank,
                    record.key(),
                    record.source,
                    ordering.key(index),
                    index,
                    old_owners[index]
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{owners_from_boundaries, ExchangePlan};
    use crate::{
        comm::{ProcessGroup, SerialGroup, ThreadGroup},
        error::Error,
        forest::Forest,
        ordering::LinearOrdering,
    };

    fn ordering() -> LinearOrdering {
        let forest = Forest::<2>::subdivided_hyper_cube(3, 0.0, 1.0).unwrap();
        LinearOrdering::new(&forest)
    }

    #[test]
    fn test_owners_from_boundaries() {
        assert_eq!(owners_from_boundaries(&[0, 2, 2, 5]), vec![0, 0, 2, 2, 2]);
        assert!(owners_from_boundaries(&[0, 0]).is_empty());
    }

    #[test]
    fn test_plan() {
        let ordering = ordering();
        let old_owners = owners_from_boundaries(&[0, 3, 6, 9]);

        let plan = ExchangePlan::new(1, &ordering, &old_owners, &[0, 1, 8, 9]);

        // Rank 1 keeps 3..6, receives 1, 2 from rank 0 and 6, 7 from rank 2.
        assert_eq!(plan.incoming(), &[1, 2, 6, 7]);
        assert!(plan.outgoing().is_empty());
        assert_eq!(plan.counts(), &[0, 0, 0]);
        assert_eq!(plan.owned(), 1..8);

        let plan = ExchangePlan::new(2, &ordering, &old_owners, &[0, 1, 8, 9]);
        assert_eq!(plan.counts(), &[0, 2, 0]);
        assert_eq!(plan.outgoing()[0].linear_index, 6);
        assert_eq!(plan.outgoing()[1].source, 2);
    }

    #[test]
    fn test_execute() {
        let ordering = ordering();
        let old_owners = owners_from_boundaries(&[0, 3, 6, 9]);
        let boundaries = [0, 1, 8, 9];

        let results = ThreadGroup::run(3, |comm| {
            let plan = ExchangePlan::new(comm.rank(), &ordering, &old_owners, &boundaries);
            let received = plan.execute(&ordering, &old_owners, &comm).unwrap();
            (
                received
                    .iter()
                    .map(|record| record.linear_index)
                    .collect::<Vec<_>>(),
                plan.owned_cells(&old_owners, &received),
            )
        });

        let received = results
            .iter()
            .map(|(received, _)| received.clone())
            .collect::<Vec<_>>();
        assert_eq!(received, vec![vec![], vec![1, 2, 6, 7], vec![]]);

        for (rank, (_, owned)) in results.iter().enumerate() {
            assert_eq!(*owned, (boundaries[rank]..boundaries[rank + 1]).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_divergent_boundaries_fail_everywhere() {
        let ordering = ordering();
        let old_owners = owners_from_boundaries(&[0, 3, 6, 9]);

        let results = ThreadGroup::run(3, |comm| {
            // Rank 2 disagrees on the new partition.
            let boundaries = if comm.rank() == 2 {
                [0, 4, 5, 9]
            } else {
                [0, 3, 6, 9]
            };
            let plan = ExchangePlan::new(comm.rank(), &ordering, &old_owners, &boundaries);
            plan.execute(&ordering, &old_owners, &comm)
        });

        assert!(results
            .iter()
            .all(|result| matches!(result, Err(Error::ConsistencyViolation(_)))));
    }

    #[test]
    fn test_serial_exchange_is_empty() {
        let ordering = ordering();
        let old_owners = vec![0; 9];

        let plan = ExchangePlan::new(0, &ordering, &old_owners, &[0, 9]);
        let received = plan.execute(&ordering, &old_owners, &SerialGroup).unwrap();

        assert!(received.is_empty());
        assert_eq!(plan.counts(), &[0]);
    }
}
