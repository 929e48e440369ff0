//! Ranks simulated by threads of a single process.

use std::{
    any::Any,
    sync::{Arc, Barrier},
};

use itertools::Itertools;
use parking_lot::Mutex;

use super::ProcessGroup;
use crate::exchange::CellRecord;

type Slot = Option<Box<dyn Any + Send>>;

struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Slot>>,
}

/// A process group whose ranks are threads of the current process.
///
/// Collective operations deposit the contribution of each rank in a shared slot
/// and synchronise through a barrier, so all ranks must take part in every call.
#[derive(Clone)]
pub struct ThreadGroup {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadGroup {
    /// Run `f` on `size` ranks, each on its own thread, and return the results ordered by rank.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadGroup) -> R + Sync,
    {
        assert!(size > 0);

        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });

        std::thread::scope(|scope| {
            let handles = (0..size)
                .map(|rank| {
                    let group = ThreadGroup {
                        rank,
                        size,
                        shared: Arc::clone(&shared),
                    };
                    let f = &f;
                    scope.spawn(move || f(group))
                })
                .collect_vec();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    /// Gather an arbitrary value from every rank onto all ranks.
    fn gather_any<T: Clone + Send + 'static>(&self, value: T) -> Vec<T> {
        self.shared.slots.lock()[self.rank] = Some(Box::new(value) as Box<dyn Any + Send>);
        self.shared.barrier.wait();

        let result = self
            .shared
            .slots
            .lock()
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .and_then(|value| value.downcast_ref::<T>())
                    .cloned()
                    .expect("ranks must enter the same collective operation")
            })
            .collect_vec();

        // Nobody may overwrite a slot before every rank has read all of them.
        self.shared.barrier.wait();
        result
    }

    fn reduce<T, F>(&self, local: &[T], op: F) -> Vec<T>
    where
        T: Copy + Send + 'static,
        F: Fn(T, T) -> T,
    {
        let contributions = self.gather_any(local.to_vec());
        let mut result = local.to_vec();
        for (index, value) in result.iter_mut().enumerate() {
            *value = contributions
                .iter()
                .map(|contribution| contribution[index])
                .reduce(&op)
                .unwrap_or(*value);
        }
        result
    }
}

impl ProcessGroup for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, local: &[f64]) -> Vec<f64> {
        self.reduce(local, |a, b| a + b)
    }

    fn all_reduce_min(&self, local: &[u64]) -> Vec<u64> {
        self.reduce(local, u64::min)
    }

    fn all_reduce_max(&self, local: &[u64]) -> Vec<u64> {
        self.reduce(local, u64::max)
    }

    fn exclusive_prefix_sum(&self, local: u64) -> u64 {
        self.gather_any(local)[..self.rank].iter().sum()
    }

    fn all_gather(&self, local: u64) -> Vec<u64> {
        self.gather_any(local)
    }

    fn exchange(&self, outgoing: &[CellRecord], counts: &[usize]) -> Vec<CellRecord> {
        assert_eq!(counts.len(), self.size);
        assert_eq!(counts.iter().sum::<usize>(), outgoing.len());

        let mut buckets = Vec::with_capacity(self.size);
        let mut rest = outgoing;
        for &count in counts {
            let (bucket, tail) = rest.split_at(count);
            buckets.push(bucket.to_vec());
            rest = tail;
        }

        self.gather_any(buckets)
            .into_iter()
            .flat_map(|mut buckets| std::mem::take(&mut buckets[self.rank]))
            .collect()
    }
}
