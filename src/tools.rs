//! Utility routines.

use num::traits::Zero;

/// Compute displacements from a vector of counts.
///
/// This is useful for global MPI varcount operations. Let
/// count [ 3, 4, 5]. Then the corresponding displacements are
/// [0, 3, 7]. Note that the last element `5` is ignored.
pub fn displacements<T: Zero + Copy>(counts: &[T]) -> Vec<T> {
    counts
        .iter()
        .scan(T::zero(), |acc, &x| {
            let tmp = *acc;
            *acc = *acc + x;
            Some(tmp)
        })
        .collect()
}

/// Compute the inclusive cumulative sum of an array.
///
/// For the array `[1, 3, 5, 7]` the output will be `[1, 4, 9, 16]`.
pub fn inclusive_cumsum<T: Zero + Copy>(arr: &[T]) -> Vec<T> {
    arr.iter()
        .scan(T::zero(), |state, &x| {
            *state = *state + x;
            Some(*state)
        })
        .collect()
}

/// Distribute a sorted sequence into bins.
///
/// The array `bins` holds the first element of each of its p bins. Bin `j` is the
/// half-open interval `[bins[j], bins[j+1])` and the last bin is `[bins[p-1], \infty)`.
/// Empty bins (repeated bin starts) are allowed. Every element must be at least
/// `bins[0]`. The function returns a p element array with the counts of how many
/// elements go to each bin. Since the sequence is sorted this fully defines what
/// element goes into which bin.
pub fn sort_to_bins<T: Ord>(sorted_keys: &[T], bins: &[T]) -> Vec<usize> {
    debug_assert!(sorted_keys.windows(2).all(|w| w[0] <= w[1]));
    debug_assert!(bins.windows(2).all(|w| w[0] <= w[1]));

    let Some(first_bin) = bins.first() else {
        assert!(sorted_keys.is_empty());
        return Vec::new();
    };
    assert!(sorted_keys.first().map_or(true, |key| first_bin <= key));

    // Number of keys smaller than the start of each bin.
    let starts = bins
        .iter()
        .map(|bin| sorted_keys.partition_point(|key| key < bin))
        .collect::<Vec<_>>();

    starts
        .iter()
        .enumerate()
        .map(|(index, &start)| starts.get(index + 1).unwrap_or(&sorted_keys.len()) - start)
        .collect()
}

#[cfg(feature = "mpi")]
pub use self::parallel::{gather_to_all, redistribute};

#[cfg(feature = "mpi")]
mod parallel {
    use mpi::{
        datatype::{Partition, PartitionMut},
        traits::{CommunicatorCollectives, Equivalence},
    };

    use super::displacements;

    /// Gather array to all processes
    pub fn gather_to_all<T: Equivalence + Default + Clone, C: CommunicatorCollectives>(
        arr: &[T],
        comm: &C,
    ) -> Vec<T> {
        // First we need to broadcast the individual sizes on each process.

        let size = comm.size();
        let local_len = arr.len() as i32;
        let mut sizes = vec![0; size as usize];

        comm.all_gather_into(&local_len, &mut sizes[..]);

        let recv_len = sizes.iter().sum::<i32>() as usize;
        let mut recvbuffer = vec![T::default(); recv_len];
        let recv_displs = displacements(&sizes);

        let mut receiv_partition = PartitionMut::new(&mut recvbuffer[..], sizes, &recv_displs[..]);
        comm.all_gather_varcount_into(arr, &mut receiv_partition);

        recvbuffer
    }

    /// Redistribute an array via an all_to_all_varcount operation.
    pub fn redistribute<T: Equivalence + Default + Clone, C: CommunicatorCollectives>(
        arr: &[T],
        counts: &[i32],
        comm: &C,
    ) -> Vec<T> {
        assert_eq!(counts.len(), comm.size() as usize);

        // First send the counts around via an alltoall operation.

        let mut recv_counts = vec![0; counts.len()];

        comm.all_to_all_into(counts, &mut recv_counts[..]);

        // We have the recv_counts. Allocate space and setup the partitions.

        let nelems = recv_counts.iter().sum::<i32>() as usize;
        let mut output = vec![T::default(); nelems];

        let send_partition = Partition::new(arr, counts, displacements(counts));
        let mut recv_partition =
            PartitionMut::new(&mut output[..], &recv_counts[..], displacements(&recv_counts));

        comm.all_to_all_varcount_into(&send_partition, &mut recv_partition);

        output
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::{displacements, inclusive_cumsum, sort_to_bins};

    #[test]
    fn test_sort_to_bins() {
        let elems = (0..100).collect_vec();
        let bins = [0, 17, 55];

        let counts = sort_to_bins(&elems, &bins);

        assert_eq!(counts[0], 17);
        assert_eq!(counts[1], 38);
        assert_eq!(counts[2], 45);
    }

    #[test]
    fn test_sort_to_empty_bins() {
        let elems = (0..10).collect_vec();

        assert_eq!(sort_to_bins(&elems, &[0, 0, 4, 4, 10]), vec![0, 4, 0, 6, 0]);
        assert_eq!(sort_to_bins::<usize>(&[], &[0, 3]), vec![0, 0]);
    }

    #[test]
    fn test_cumsum_and_displacements() {
        assert_eq!(inclusive_cumsum(&[1, 3, 5, 7]), vec![1, 4, 9, 16]);
        assert_eq!(inclusive_cumsum(&[0.5, 0.0, 1.5]), vec![0.5, 0.5, 2.0]);
        assert_eq!(displacements(&[3, 4, 5]), vec![0, 3, 7]);
        assert!(inclusive_cumsum::<f64>(&[]).is_empty());
    }
}
