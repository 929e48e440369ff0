//! Weighted repartitioning of distributed forests of quadtrees and octrees
#![cfg_attr(feature = "strict", deny(warnings), deny(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod comm;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod forest;
pub mod geometry;
pub mod ghost;
pub mod grouping;
pub mod io;
pub mod mesh;
pub mod morton;
pub mod ordering;
pub mod partition;
pub mod tools;
pub mod weights;

pub use comm::{ProcessGroup, SerialGroup, ThreadGroup};
pub use error::{Error, Result};
pub use forest::{CellId, Forest};
pub use mesh::{DistributedMesh, Settings};

#[cfg(feature = "mpi")]
pub use comm::MpiGroup;

// Dev dependencies are only used by the integration tests and demos.
#[cfg(test)]
use rand as _;
#[cfg(test)]
use rand_chacha as _;
