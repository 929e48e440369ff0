//! Geometry information

/// A box describing the physical domain covered by a forest.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhysicalBox<const DIM: usize> {
    lower: [f64; DIM],
    upper: [f64; DIM],
}

impl<const DIM: usize> PhysicalBox<DIM> {
    /// Create a new box from its lower and upper corner.
    pub fn new(lower: [f64; DIM], upper: [f64; DIM]) -> Self {
        debug_assert!(lower.iter().zip(upper.iter()).all(|(l, u)| l < u));
        Self { lower, upper }
    }

    /// The hypercube `[left, right]^DIM`.
    pub fn hypercube(left: f64, right: f64) -> Self {
        Self::new([left; DIM], [right; DIM])
    }

    /// Lower corner.
    pub fn lower(&self) -> [f64; DIM] {
        self.lower
    }

    /// Upper corner.
    pub fn upper(&self) -> [f64; DIM] {
        self.upper
    }

    /// Map a point from the reference box [0, 1]^DIM to the physical box.
    pub fn reference_to_physical(&self, point: [f64; DIM]) -> [f64; DIM] {
        std::array::from_fn(|d| self.lower[d] + (self.upper[d] - self.lower[d]) * point[d])
    }

    /// Map a point from the physical box to the reference box.
    pub fn physical_to_reference(&self, point: [f64; DIM]) -> [f64; DIM] {
        std::array::from_fn(|d| (point[d] - self.lower[d]) / (self.upper[d] - self.lower[d]))
    }
}

impl<const DIM: usize> std::fmt::Display for PhysicalBox<DIM> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(lower: {:?}, upper: {:?})", self.lower, self.upper)
    }
}

#[cfg(test)]
mod test {
    use super::PhysicalBox;

    #[test]
    fn test_reference_maps() {
        let domain = PhysicalBox::new([0.0, -1.0], [16.0, 1.0]);

        let physical = domain.reference_to_physical([0.5, 0.25]);
        assert_eq!(physical, [8.0, -0.5]);

        let reference = domain.physical_to_reference(physical);
        assert_eq!(reference, [0.5, 0.25]);
    }
}
