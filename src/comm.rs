//! Process groups.
//!
//! The repartitioning code only relies on the handful of collective and point to
//! point operations collected in [ProcessGroup]. Backends exist for a single
//! process, for ranks simulated by threads of one process and, with the `mpi`
//! feature, for any MPI communicator.
mod threaded;

#[cfg(feature = "mpi")]
mod mpi_group;

#[cfg(feature = "mpi")]
pub use mpi_group::MpiGroup;
pub use threaded::ThreadGroup;

use crate::{
    error::{Error, Result},
    exchange::CellRecord,
};

/// A group of cooperating processes.
///
/// All methods except [ProcessGroup::rank] and [ProcessGroup::size] are
/// collective and must be called by every rank in the same order.
pub trait ProcessGroup {
    /// Rank of this process.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Element-wise sum of `local` over all ranks. Every rank receives the result.
    fn all_reduce_sum(&self, local: &[f64]) -> Vec<f64>;

    /// Element-wise minimum of `local` over all ranks.
    fn all_reduce_min(&self, local: &[u64]) -> Vec<u64>;

    /// Element-wise maximum of `local` over all ranks.
    fn all_reduce_max(&self, local: &[u64]) -> Vec<u64>;

    /// Sum of `local` over all ranks smaller than this rank. Rank 0 receives 0.
    fn exclusive_prefix_sum(&self, local: u64) -> u64;

    /// Gather one value from every rank onto all ranks.
    fn all_gather(&self, local: u64) -> Vec<u64>;

    /// Send `counts[r]` consecutive records of `outgoing` to rank `r`.
    ///
    /// Returns the records received from all ranks ordered by source rank.
    fn exchange(&self, outgoing: &[CellRecord], counts: &[usize]) -> Vec<CellRecord>;
}

/// A process group consisting of a single process.
#[derive(Copy, Clone, Debug, Default)]
pub struct SerialGroup;

impl ProcessGroup for SerialGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, local: &[f64]) -> Vec<f64> {
        local.to_vec()
    }

    fn all_reduce_min(&self, local: &[u64]) -> Vec<u64> {
        local.to_vec()
    }

    fn all_reduce_max(&self, local: &[u64]) -> Vec<u64> {
        local.to_vec()
    }

    fn exclusive_prefix_sum(&self, _local: u64) -> u64 {
        0
    }

    fn all_gather(&self, local: u64) -> Vec<u64> {
        vec![local]
    }

    fn exchange(&self, outgoing: &[CellRecord], counts: &[usize]) -> Vec<CellRecord> {
        assert_eq!(counts, [outgoing.len()]);
        outgoing.to_vec()
    }
}

/// Agree on the outcome of a local step across all ranks.
///
/// A rank whose own step failed returns its error. If the step succeeded locally
/// but failed on other ranks, a consistency violation elsewhere is reported as
/// such and any other failure as [Error::PeerFailure]. Every rank therefore
/// returns `Ok` or every rank returns an error.
pub(crate) fn agree<T, G: ProcessGroup>(local: Result<T>, comm: &G) -> Result<T> {
    let status = local.as_ref().map_or_else(Error::status_code, |_| 0);
    let codes = comm.all_gather(status);

    let failed = codes
        .iter()
        .enumerate()
        .filter_map(|(rank, &code)| if code != 0 { Some(rank) } else { None })
        .collect::<Vec<_>>();

    match local {
        Err(err) => Err(err),
        Ok(_) if codes.contains(&Error::CONSISTENCY_STATUS) => {
            Err(Error::ConsistencyViolation(format!(
                "ranks {failed:?} detected inconsistent global state"
            )))
        }
        Ok(_) if !failed.is_empty() => Err(Error::PeerFailure { ranks: failed }),
        Ok(value) => Ok(value),
    }
}

#[cfg(test)]
mod test {
    use super::{agree, ProcessGroup, SerialGroup, ThreadGroup};
    use crate::error::Error;

    #[test]
    fn test_serial_group() {
        let comm = SerialGroup;

        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert_eq!(comm.all_reduce_sum(&[1.0, 2.0]), vec![1.0, 2.0]);
        assert_eq!(comm.exclusive_prefix_sum(5), 0);
        assert_eq!(agree(Ok(3), &comm), Ok(3));
    }

    #[test]
    fn test_agree_on_peer_failure() {
        let results = ThreadGroup::run(4, |comm| {
            let local = if comm.rank() % 2 == 1 {
                Err(Error::InvalidProcessCount(0))
            } else {
                Ok(comm.rank())
            };
            agree(local, &comm)
        });

        assert_eq!(results[0], Err(Error::PeerFailure { ranks: vec![1, 3] }));
        assert_eq!(results[1], Err(Error::InvalidProcessCount(0)));
        assert_eq!(results[2], Err(Error::PeerFailure { ranks: vec![1, 3] }));
        assert_eq!(results[3], Err(Error::InvalidProcessCount(0)));
    }

    #[test]
    fn test_agree_on_consistency_violation() {
        let results = ThreadGroup::run(3, |comm| {
            let local = if comm.rank() == 2 {
                Err(Error::ConsistencyViolation("diverged".to_string()))
            } else {
                Ok(())
            };
            agree(local, &comm)
        });

        assert!(results
            .iter()
            .all(|result| matches!(result, Err(Error::ConsistencyViolation(_)))));
    }
}
