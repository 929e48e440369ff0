//! Crate wide constants.

/// Deepest level a cell can be refined to.
pub const DEEPEST_LEVEL: usize = 16;

/// Number of cells along one axis of a tree on the deepest level.
pub const LEVEL_SIZE: u64 = 1 << DEEPEST_LEVEL;

/// Number of bits reserved for the level in a Morton key.
pub const LEVEL_DISPLACEMENT: usize = 5;

/// Mask to extract the level from a Morton key.
pub const LEVEL_MASK: u64 = (1 << LEVEL_DISPLACEMENT) - 1;

/// Number of children of a refined cell in `dim` dimensions.
pub const fn nchildren(dim: usize) -> usize {
    1 << dim
}
