//! Process group over an MPI communicator.

use itertools::Itertools;
use mpi::{collective::SystemOperation, traits::CommunicatorCollectives};

use super::ProcessGroup;
use crate::{
    exchange::CellRecord,
    tools::{gather_to_all, redistribute},
};

/// A process group backed by an MPI communicator.
pub struct MpiGroup<'c, C> {
    comm: &'c C,
}

impl<'c, C: CommunicatorCollectives> MpiGroup<'c, C> {
    /// Wrap a communicator.
    pub fn new(comm: &'c C) -> Self {
        Self { comm }
    }

    /// The underlying communicator.
    pub fn comm(&self) -> &C {
        self.comm
    }
}

impl<C: CommunicatorCollectives> ProcessGroup for MpiGroup<'_, C> {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn all_reduce_sum(&self, local: &[f64]) -> Vec<f64> {
        let mut global = vec![0.0; local.len()];
        self.comm
            .all_reduce_into(local, &mut global[..], SystemOperation::sum());
        global
    }

    fn all_reduce_min(&self, local: &[u64]) -> Vec<u64> {
        let mut global = vec![0; local.len()];
        self.comm
            .all_reduce_into(local, &mut global[..], SystemOperation::min());
        global
    }

    fn all_reduce_max(&self, local: &[u64]) -> Vec<u64> {
        let mut global = vec![0; local.len()];
        self.comm
            .all_reduce_into(local, &mut global[..], SystemOperation::max());
        global
    }

    fn exclusive_prefix_sum(&self, local: u64) -> u64 {
        let mut result = 0;
        self.comm
            .exclusive_scan_into(&local, &mut result, SystemOperation::sum());

        // The receive buffer of the first rank is undefined after an exclusive scan.
        if self.comm.rank() == 0 {
            0
        } else {
            result
        }
    }

    fn all_gather(&self, local: u64) -> Vec<u64> {
        gather_to_all(std::slice::from_ref(&local), self.comm)
    }

    fn exchange(&self, outgoing: &[CellRecord], counts: &[usize]) -> Vec<CellRecord> {
        let counts = counts.iter().map(|&count| count as i32).collect_vec();
        redistribute(outgoing, &counts, self.comm)
    }
}
