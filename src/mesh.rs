//! Distributed mesh with weighted repartitioning.

use itertools::Itertools;
use log::{debug, error, info, warn};

use crate::{
    comm::{agree, ProcessGroup},
    constants::DEEPEST_LEVEL,
    error::{Error, Result},
    exchange::{owners_from_boundaries, ExchangePlan},
    forest::{CellId, Forest},
    ghost::ghost_layer,
    grouping::{group_families, group_of_cells, AtomicGroup},
    ordering::LinearOrdering,
    partition::{solve_boundaries, PartitionVector},
    weights::{accumulate_group_weights, local_weights, GroupWeights},
};

/// Settings of a distributed mesh.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Repartition with unit weights after every refinement.
    pub automatic_repartitioning: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            automatic_repartitioning: true,
        }
    }
}

/// A forest whose active cells are distributed over the ranks of a process group.
///
/// Every rank holds the topology of the whole forest together with the owner of
/// every active cell. The owners only change through [DistributedMesh::repartition]
/// and through refinement, where children inherit the owner of their parent.
pub struct DistributedMesh<'g, G, const DIM: usize> {
    forest: Forest<DIM>,
    owners: Vec<Option<usize>>,
    n_owned_per_process: Vec<usize>,
    partition: Option<PartitionVector>,
    ghosts: Vec<CellId>,
    settings: Settings,
    comm: &'g G,
}

impl<'g, G: ProcessGroup, const DIM: usize> DistributedMesh<'g, G, DIM> {
    /// Distribute a forest over the ranks of `comm`.
    ///
    /// Must be called on all ranks with identical forests. The initial owners are
    /// computed from unit cell weights without any data exchange.
    pub fn new(forest: Forest<DIM>, settings: Settings, comm: &'g G) -> Result<Self> {
        agree(forest.validate(), comm)?;

        let ordering = LinearOrdering::new(&forest);
        let groups = group_families(&forest, &ordering);
        check_global_consistency(&ordering, &groups, comm)?;

        let weights = GroupWeights::from_weights(groups.iter().map(|g| g.len as f64).collect());
        let partition = solve_boundaries(weights.cumulative(), weights.total(), comm.size())?;
        let cell_boundaries = partition.cell_boundaries(&groups, ordering.len());

        let mut mesh = Self {
            owners: vec![None; forest.n_cells()],
            forest,
            n_owned_per_process: Vec::new(),
            partition: None,
            ghosts: Vec::new(),
            settings,
            comm,
        };
        mesh.assign_owners(&ordering, &cell_boundaries);
        mesh.partition = Some(partition);
        mesh.update_ownership_metadata();

        Ok(mesh)
    }

    /// Redistribute the active cells according to weights.
    ///
    /// `weights` holds one non-negative weight per locally owned active cell, in the
    /// order of [DistributedMesh::locally_owned_active_cells]. Without weights every
    /// cell has weight one. Must be called on all ranks. Either all ranks adopt the
    /// new partition or all ranks return an error and keep the old one.
    pub fn repartition(&mut self, weights: Option<&[f64]>) -> Result<()> {
        let rank = self.comm.rank();

        let ordering = LinearOrdering::new(&self.forest);
        let groups = group_families(&self.forest, &ordering);
        check_global_consistency(&ordering, &groups, self.comm)?;

        let local_cells = self.locally_owned_active_cells();
        let local = local_weights(weights, local_cells.len()).and_then(|weights| {
            self.owners_in_order(&ordering)
                .map(|old_owners| (weights, old_owners))
        });
        let (weights, old_owners) = agree(local, self.comm)?;

        let contributions = local_cells
            .iter()
            .zip(weights)
            .filter_map(|(&id, weight)| ordering.position(id).map(|index| (index, weight)));

        let group_weights = accumulate_group_weights(
            contributions,
            &group_of_cells(&groups),
            groups.len(),
            self.comm,
        );

        let partition = solve_boundaries(
            group_weights.cumulative(),
            group_weights.total(),
            self.comm.size(),
        )?;
        debug!("Partition boundaries {:?}", partition.boundaries());

        let empty = partition
            .counts()
            .iter()
            .positions(|&count| count == 0)
            .collect_vec();
        if rank == 0 && !empty.is_empty() && !groups.is_empty() {
            warn!(
                "Ranks {:?} receive no cells, the largest group weighs {} of a total {}",
                empty,
                group_weights.max_weight(),
                group_weights.total()
            );
        }

        let cell_boundaries = partition.cell_boundaries(&groups, ordering.len());
        let plan = ExchangePlan::new(rank, &ordering, &old_owners, &cell_boundaries);
        let received = plan.execute(&ordering, &old_owners, self.comm)?;
        let owned = plan.owned_cells(&old_owners, &received);

        self.commit_owners(&ordering, &cell_boundaries, &owned);
        self.partition = Some(partition);
        self.update_ownership_metadata();

        info!(
            "Rank {} owns {} active cells after repartitioning, {} received, {} sent",
            rank,
            self.n_locally_owned_active_cells(),
            received.len(),
            plan.outgoing().len()
        );

        Ok(())
    }

    /// Refine all active cells `times` times.
    ///
    /// Must be called on all ranks. Nothing is refined if a cell would be refined
    /// beyond [DEEPEST_LEVEL].
    pub fn refine_global(&mut self, times: usize) -> Result<()> {
        self.forest.check_global_refinement(times)?;
        for _ in 0..times {
            let active = self.forest.active_cells().collect_vec();
            self.refine_cells(&active)?;
        }
        self.finish_refinement()
    }

    /// Refine a set of active cells.
    ///
    /// Must be called on all ranks with the same cells. Nothing is refined if one of
    /// the cells cannot be refined.
    pub fn refine(&mut self, cells: &[CellId]) -> Result<()> {
        self.refine_cells(cells)?;
        self.finish_refinement()
    }

    fn refine_cells(&mut self, cells: &[CellId]) -> Result<()> {
        if let Some(id) = cells.iter().duplicates().next() {
            return Err(Error::MalformedTree(format!("cell {id} is refined twice")));
        }
        for &id in cells {
            if id >= self.forest.n_cells() || !self.forest.cell(id).is_active() {
                return Err(Error::MalformedTree(format!("cell {id} is not an active cell")));
            }
            if self.forest.cell(id).level() == DEEPEST_LEVEL {
                return Err(Error::RefinementLimit {
                    cell: id,
                    level: self.forest.cell(id).level(),
                });
            }
        }

        for &id in cells {
            let children = self.forest.refine(id)?;
            let owner = self.owners[id].take();
            self.owners.resize(self.forest.n_cells(), None);
            for child in children {
                self.owners[child] = owner;
            }
        }
        Ok(())
    }

    fn finish_refinement(&mut self) -> Result<()> {
        // Group boundaries refer to the ordering before refinement.
        self.partition = None;
        self.update_ownership_metadata();

        if self.settings.automatic_repartitioning {
            self.repartition(None)
        } else {
            Ok(())
        }
    }

    /// The forest.
    pub fn forest(&self) -> &Forest<DIM> {
        &self.forest
    }

    /// The process group.
    pub fn comm(&self) -> &G {
        self.comm
    }

    /// The settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The partition computed by the last repartitioning, `None` after refinement.
    pub fn partition(&self) -> Option<&PartitionVector> {
        self.partition.as_ref()
    }

    /// Number of active cells on all ranks.
    pub fn n_global_active_cells(&self) -> usize {
        self.forest.n_active_cells()
    }

    /// Number of active cells owned by each rank.
    pub fn n_locally_owned_active_cells_per_process(&self) -> &[usize] {
        &self.n_owned_per_process
    }

    /// Number of active cells owned by this rank.
    pub fn n_locally_owned_active_cells(&self) -> usize {
        self.n_owned_per_process[self.comm.rank()]
    }

    /// Owner of an active cell, `None` for refined cells.
    pub fn owner(&self, id: CellId) -> Option<usize> {
        self.owners.get(id).copied().flatten()
    }

    /// Return true if this rank owns the cell.
    pub fn is_locally_owned(&self, id: CellId) -> bool {
        self.owner(id) == Some(self.comm.rank())
    }

    /// The active cells owned by this rank in ascending id order.
    ///
    /// The position of a cell in this list is its local active cell index.
    pub fn locally_owned_active_cells(&self) -> Vec<CellId> {
        let rank = self.comm.rank();
        self.forest
            .active_cells()
            .filter(|&id| self.owners[id] == Some(rank))
            .collect()
    }

    /// Active cells owned by other ranks that touch a locally owned cell.
    pub fn ghost_cells(&self) -> &[CellId] {
        &self.ghosts
    }

    /// Return true if the cell is a ghost cell of this rank.
    pub fn is_ghost(&self, id: CellId) -> bool {
        self.ghosts.binary_search(&id).is_ok()
    }

    /// Return true if all children of `parent` are active and owned by this rank.
    ///
    /// Only then can the family be coarsened without communication.
    pub fn can_coarsen_locally(&self, parent: CellId) -> bool {
        self.forest.cell(parent).children().is_some_and(|mut children| {
            children.all(|child| {
                self.forest.cell(child).is_active() && self.is_locally_owned(child)
            })
        })
    }

    /// Sum a per cell weight over the owned cells of every rank.
    ///
    /// Must be called on all ranks. Every rank receives the sums of all ranks.
    pub fn integrated_weights(&self, weight: impl Fn(CellId) -> f64) -> Vec<f64> {
        let mut local = vec![0.0; self.comm.size()];
        local[self.comm.rank()] = self
            .locally_owned_active_cells()
            .into_iter()
            .map(weight)
            .sum();
        self.comm.all_reduce_sum(&local)
    }

    fn owners_in_order(&self, ordering: &LinearOrdering) -> Result<Vec<usize>> {
        ordering
            .cells()
            .iter()
            .map(|&id| {
                self.owner(id).ok_or_else(|| {
                    Error::MalformedTree(format!("active cell {id} has no owner"))
                })
            })
            .collect()
    }

    fn assign_owners(&mut self, ordering: &LinearOrdering, cell_boundaries: &[usize]) {
        self.owners.resize(self.forest.n_cells(), None);
        for (&id, owner) in ordering
            .cells()
            .iter()
            .zip(owners_from_boundaries(cell_boundaries))
        {
            self.owners[id] = Some(owner);
        }
    }

    /// Take the owners of remote cells from the partition and the locally owned
    /// cells from the verified exchange.
    fn commit_owners(
        &mut self,
        ordering: &LinearOrdering,
        cell_boundaries: &[usize],
        owned: &[usize],
    ) {
        let rank = self.comm.rank();
        self.owners.resize(self.forest.n_cells(), None);
        for (&id, owner) in ordering
            .cells()
            .iter()
            .zip(owners_from_boundaries(cell_boundaries))
        {
            self.owners[id] = (owner != rank).then_some(owner);
        }
        for &index in owned {
            self.owners[ordering.cell(index)] = Some(rank);
        }
    }

    fn update_ownership_metadata(&mut self) {
        let owned = self.locally_owned_active_cells();

        self.n_owned_per_process = self
            .comm
            .all_gather(owned.len() as u64)
            .into_iter()
            .map(|count| count as usize)
            .collect();

        let rank = self.comm.rank();
        self.ghosts = ghost_layer(&self.forest, &owned, |id| self.owners[id] == Some(rank));
    }
}

/// Check that all ranks see the same active cells and groups.
fn check_global_consistency<G: ProcessGroup>(
    ordering: &LinearOrdering,
    groups: &[AtomicGroup],
    comm: &G,
) -> Result<()> {
    let local = [
        ordering.len() as u64,
        groups.len() as u64,
        ordering.fingerprint(),
    ];

    let min = comm.all_reduce_min(&local);
    let max = comm.all_reduce_max(&local);

    if min != max {
        let err = Error::ConsistencyViolation(format!(
            "ranks disagree on the global ordering: active cells {}..={}, groups {}..={}",
            min[0], max[0], min[1], max[1]
        ));
        error!("{}", err);
        return Err(err);
    }

    Ok(())
}
