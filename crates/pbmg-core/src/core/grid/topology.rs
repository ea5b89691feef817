use nalgebra::Point3;

const GEOMETRY_RELATIVE_TOLERANCE: f64 = 1e-9;

/// Shape and placement of a node-centered grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTopology {
    /// Number of nodes along x, y and z.
    pub dims: [usize; 3],
    /// Node spacing along x, y and z in Angstroms.
    pub spacing: [f64; 3],
    /// Position of node `(0, 0, 0)`.
    pub origin: [f64; 3],
}

impl GridTopology {
    pub fn new(dims: [usize; 3], spacing: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            dims,
            spacing,
            origin,
        }
    }

    /// Builds the topology whose central node sits at `center`.
    pub fn centered(dims: [usize; 3], spacing: [f64; 3], center: [f64; 3]) -> Self {
        let origin = std::array::from_fn(|d| {
            center[d] - 0.5 * (dims[d].saturating_sub(1)) as f64 * spacing[d]
        });
        Self::new(dims, spacing, origin)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    #[inline]
    pub fn coords(&self, idx: usize) -> (usize, usize, usize) {
        let i = idx % self.dims[0];
        let rest = idx / self.dims[0];
        (i, rest % self.dims[1], rest / self.dims[1])
    }

    #[inline]
    pub fn in_range(&self, i: usize, j: usize, k: usize) -> bool {
        i < self.dims[0] && j < self.dims[1] && k < self.dims[2]
    }

    #[inline]
    pub fn is_boundary(&self, i: usize, j: usize, k: usize) -> bool {
        i == 0
            || j == 0
            || k == 0
            || i + 1 == self.dims[0]
            || j + 1 == self.dims[1]
            || k + 1 == self.dims[2]
    }

    #[inline]
    pub fn node_position(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        [
            self.origin[0] + i as f64 * self.spacing[0],
            self.origin[1] + j as f64 * self.spacing[1],
            self.origin[2] + k as f64 * self.spacing[2],
        ]
    }

    pub fn node_point(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        let [x, y, z] = self.node_position(i, j, k);
        Point3::new(x, y, z)
    }

    /// Position of the last node, the far corner of the bounding box.
    pub fn upper_corner(&self) -> [f64; 3] {
        std::array::from_fn(|d| {
            self.origin[d] + (self.dims[d].saturating_sub(1)) as f64 * self.spacing[d]
        })
    }

    pub fn center(&self) -> [f64; 3] {
        let upper = self.upper_corner();
        std::array::from_fn(|d| 0.5 * (self.origin[d] + upper[d]))
    }

    /// Volume of one grid cell, `hx hy hz`.
    #[inline]
    pub fn cell_volume(&self) -> f64 {
        self.spacing[0] * self.spacing[1] * self.spacing[2]
    }

    /// Whether `point` lies in the bounding box, widened by `margin` on every side.
    pub fn contains(&self, point: &[f64; 3], margin: f64) -> bool {
        let upper = self.upper_corner();
        (0..3).all(|d| point[d] >= self.origin[d] - margin && point[d] <= upper[d] + margin)
    }

    /// Fractional grid coordinate of `x` along axis `d`.
    #[inline]
    pub fn fractional(&self, d: usize, x: f64) -> f64 {
        (x - self.origin[d]) / self.spacing[d]
    }

    /// Same dimensions, and spacing/origin equal up to round-off.
    pub fn is_compatible(&self, other: &GridTopology) -> bool {
        if self.dims != other.dims {
            return false;
        }
        (0..3).all(|d| {
            let h = self.spacing[d].abs().max(other.spacing[d].abs());
            (self.spacing[d] - other.spacing[d]).abs() <= GEOMETRY_RELATIVE_TOLERANCE * h
                && (self.origin[d] - other.origin[d]).abs() <= GEOMETRY_RELATIVE_TOLERANCE * h
        })
    }
}
