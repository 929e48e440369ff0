//! Routines for working with Morton indices.
//!
//! A [CellKey] identifies a cell independently of the process and of the order in
//! which cells were created. Keys are compared first by tree and then by the Morton
//! code of the anchor on the deepest level, with the level in the lowest bits. Sorting
//! keys therefore yields a depth first pre-order traversal of the forest.

use crate::constants::{DEEPEST_LEVEL, LEVEL_DISPLACEMENT, LEVEL_MASK};

/// Process independent identifier of a cell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    /// Index of the coarse cell (tree) containing the cell.
    pub tree: u64,
    /// Morton code of the anchor together with the level.
    pub morton: u64,
}

impl CellKey {
    /// Create the key of a cell from its tree, anchor and level.
    ///
    /// The anchor is given in units of cells on `level`.
    pub fn new<const DIM: usize>(tree: usize, anchor: [u64; DIM], level: usize) -> Self {
        Self {
            tree: tree as u64,
            morton: encode_morton(anchor, level),
        }
    }

    /// The level of the cell.
    pub fn level(&self) -> usize {
        (self.morton & LEVEL_MASK) as usize
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(tree: {}, morton: {}, level: {})",
            self.tree,
            self.morton >> LEVEL_DISPLACEMENT,
            self.level()
        )
    }
}

/// Encode an anchor on a given level as Morton key.
///
/// The bits of the anchor coordinates on the deepest level are interleaved with
/// the first coordinate in the lowest position, matching the canonical order of
/// children within a refined cell.
pub fn encode_morton<const DIM: usize>(anchor: [u64; DIM], level: usize) -> u64 {
    assert!(level <= DEEPEST_LEVEL);
    assert!(DIM * DEEPEST_LEVEL + LEVEL_DISPLACEMENT <= 64);

    // If we are not on the deepest level we need to shift the box.
    // The box with x-index one on DEEPEST_LEVEL-1 has index two on
    // DEEPEST_LEVEL.

    let level_diff = DEEPEST_LEVEL - level;

    let mut key = 0;
    for bit in 0..DEEPEST_LEVEL {
        for (d, &coord) in anchor.iter().enumerate() {
            key |= (((coord << level_diff) >> bit) & 1) << (bit * DIM + d);
        }
    }

    (key << LEVEL_DISPLACEMENT) | level as u64
}

/// Fold a sequence of keys into a single fingerprint.
///
/// Two processes holding the same key sequence obtain the same fingerprint (FNV-1a).
pub fn fingerprint<'a>(keys: impl IntoIterator<Item = &'a CellKey>) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET;
    for key in keys {
        for value in [key.tree, key.morton] {
            for byte in value.to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(PRIME);
            }
        }
    }
    hash
}

#[cfg(test)]
mod test {
    use super::{encode_morton, fingerprint, CellKey};

    #[test]
    fn test_children_follow_parent() {
        let parent = CellKey::new(0, [0, 0], 1);

        let children = (0..4_u64)
            .map(|c| CellKey::new(0, [c & 1, (c >> 1) & 1], 2))
            .collect::<Vec<_>>();

        for (index, child) in children.iter().enumerate() {
            assert!(parent < *child);
            if index > 0 {
                assert!(children[index - 1] < *child);
            }
        }

        // The next sibling of the parent comes after all of its children.
        let next = CellKey::new(0, [1, 0], 1);
        assert!(children.iter().all(|child| *child < next));
    }

    #[test]
    fn test_level_roundtrip() {
        let key = CellKey::new(3, [5, 7, 1], 4);
        assert_eq!(key.level(), 4);
        assert_eq!(key.tree, 3);
    }

    #[test]
    fn test_interleaving() {
        // On the deepest level the anchor [1, 0] has key 1, [0, 1] has key 2.
        let x = encode_morton([1, 0], 16) >> 5;
        let y = encode_morton([0, 1], 16) >> 5;
        assert_eq!(x, 1);
        assert_eq!(y, 2);
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = CellKey::new(0, [0, 0], 1);
        let b = CellKey::new(0, [1, 0], 1);

        assert_eq!(fingerprint(&[a, b]), fingerprint(&[a, b]));
        assert_ne!(fingerprint(&[a, b]), fingerprint(&[b, a]));
    }
}
