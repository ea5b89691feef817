use super::topology::GridTopology;
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use thiserror::Error;

/// Slack, in grid units, granted to points sitting on the bounding box.
const DOMAIN_SLACK: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("Node index ({i}, {j}, {k}) is outside grid of dimensions {dims:?}")]
    IndexOutOfRange {
        i: usize,
        j: usize,
        k: usize,
        dims: [usize; 3],
    },

    #[error("Point ({x:.4}, {y:.4}, {z:.4}) lies outside the grid bounding box")]
    OutOfDomain { x: f64, y: f64, z: f64 },

    #[error("Expected {expected} node values, found {found}")]
    ValueCountMismatch { expected: usize, found: usize },

    #[error("Grid dimensions {found:?} do not match the expected {expected:?}")]
    DimensionMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },
}

/// What point evaluation does with a point outside the bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutOfDomain {
    /// Fail with [`GridError::OutOfDomain`].
    #[default]
    Fail,
    /// Evaluate as zero.
    Zero,
    /// Evaluate at the nearest point of the bounding box.
    Clamp,
}

/// A scalar field sampled on the nodes of a [`GridTopology`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridField {
    topology: GridTopology,
    values: Vec<f64>,
}

/// Base node and fractional offsets of a point inside its cell.
struct CellLocation {
    base: [usize; 3],
    next: [usize; 3],
    frac: [f64; 3],
}

impl GridField {
    /// A zero-initialized field.
    pub fn new(topology: GridTopology) -> Self {
        Self::filled(topology, 0.0)
    }

    pub fn filled(topology: GridTopology, value: f64) -> Self {
        Self {
            values: vec![value; topology.len()],
            topology,
        }
    }

    pub fn from_values(topology: GridTopology, values: Vec<f64>) -> Result<Self, GridError> {
        if values.len() != topology.len() {
            return Err(GridError::ValueCountMismatch {
                expected: topology.len(),
                found: values.len(),
            });
        }
        Ok(Self { topology, values })
    }

    /// Wraps values produced by a full sweep over `topology`.
    pub(crate) fn from_sampled(topology: GridTopology, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), topology.len());
        Self { topology, values }
    }

    /// Samples `f(x, y, z)` at every node.
    pub fn from_fn<F>(topology: GridTopology, f: F) -> Self
    where
        F: Fn(f64, f64, f64) -> f64,
    {
        let values = (0..topology.len())
            .map(|idx| {
                let (i, j, k) = topology.coords(idx);
                let [x, y, z] = topology.node_position(i, j, k);
                f(x, y, z)
            })
            .collect();
        Self { topology, values }
    }

    #[inline]
    pub fn topology(&self) -> &GridTopology {
        &self.topology
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.topology.dims
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Result<f64, GridError> {
        self.check_index(i, j, k)?;
        Ok(self.values[self.topology.index(i, j, k)])
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) -> Result<(), GridError> {
        self.check_index(i, j, k)?;
        let idx = self.topology.index(i, j, k);
        self.values[idx] = value;
        Ok(())
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    /// Trilinearly interpolated value; points outside the bounding box are an error.
    pub fn value_at(&self, point: &Point3<f64>) -> Result<f64, GridError> {
        self.value_at_with(point, OutOfDomain::Fail)
    }

    pub fn value_at_with(&self, point: &Point3<f64>, policy: OutOfDomain) -> Result<f64, GridError> {
        let Some(cell) = self.locate(point, policy)? else {
            return Ok(0.0);
        };
        let mut value = 0.0;
        for corner in 0..8 {
            let (idx, weight) = self.corner(&cell, corner);
            value += weight * self.values[idx];
        }
        Ok(value)
    }

    /// Gradient estimated from central differences at the surrounding nodes (second-order
    /// one-sided differences on the faces), interpolated trilinearly to `point`.
    pub fn gradient_at(&self, point: &Point3<f64>) -> Result<Vector3<f64>, GridError> {
        self.gradient_at_with(point, OutOfDomain::Fail)
    }

    pub fn gradient_at_with(
        &self,
        point: &Point3<f64>,
        policy: OutOfDomain,
    ) -> Result<Vector3<f64>, GridError> {
        let Some(cell) = self.locate(point, policy)? else {
            return Ok(Vector3::zeros());
        };
        let mut gradient = Vector3::zeros();
        for corner in 0..8 {
            let (idx, weight) = self.corner(&cell, corner);
            if weight == 0.0 {
                continue;
            }
            let (i, j, k) = self.topology.coords(idx);
            gradient += weight * self.nodal_gradient([i, j, k]);
        }
        Ok(gradient)
    }

    fn check_index(&self, i: usize, j: usize, k: usize) -> Result<(), GridError> {
        if self.topology.in_range(i, j, k) {
            Ok(())
        } else {
            Err(GridError::IndexOutOfRange {
                i,
                j,
                k,
                dims: self.topology.dims,
            })
        }
    }

    fn locate(
        &self,
        point: &Point3<f64>,
        policy: OutOfDomain,
    ) -> Result<Option<CellLocation>, GridError> {
        let p = [point.x, point.y, point.z];
        let mut base = [0; 3];
        let mut next = [0; 3];
        let mut frac = [0.0; 3];
        for d in 0..3 {
            let n = self.topology.dims[d];
            let upper = n.saturating_sub(1) as f64;
            let mut s = self.topology.fractional(d, p[d]);
            if !(-DOMAIN_SLACK..=upper + DOMAIN_SLACK).contains(&s) {
                match policy {
                    OutOfDomain::Fail => {
                        return Err(GridError::OutOfDomain {
                            x: point.x,
                            y: point.y,
                            z: point.z,
                        });
                    }
                    OutOfDomain::Zero => return Ok(None),
                    OutOfDomain::Clamp => {}
                }
            }
            s = s.clamp(0.0, upper);
            let i0 = (s.floor() as usize).min(n.saturating_sub(2));
            base[d] = i0;
            next[d] = (i0 + 1).min(n.saturating_sub(1));
            frac[d] = if next[d] == i0 { 0.0 } else { s - i0 as f64 };
        }
        Ok(Some(CellLocation { base, next, frac }))
    }

    #[inline]
    fn corner(&self, cell: &CellLocation, corner: usize) -> (usize, f64) {
        let mut ijk = [0; 3];
        let mut weight = 1.0;
        for d in 0..3 {
            if corner >> d & 1 == 1 {
                ijk[d] = cell.next[d];
                weight *= cell.frac[d];
            } else {
                ijk[d] = cell.base[d];
                weight *= 1.0 - cell.frac[d];
            }
        }
        (self.topology.index(ijk[0], ijk[1], ijk[2]), weight)
    }

    fn nodal_gradient(&self, ijk: [usize; 3]) -> Vector3<f64> {
        let mut g = Vector3::zeros();
        for d in 0..3 {
            let n = self.topology.dims[d];
            if n < 2 {
                continue;
            }
            let h = self.topology.spacing[d];
            let at = |offset: isize| {
                let mut c = ijk;
                c[d] = (c[d] as isize + offset) as usize;
                self.values[self.topology.index(c[0], c[1], c[2])]
            };
            let i = ijk[d];
            g[d] = if i > 0 && i + 1 < n {
                (at(1) - at(-1)) / (2.0 * h)
            } else if n == 2 {
                if i == 0 {
                    (at(1) - at(0)) / h
                } else {
                    (at(0) - at(-1)) / h
                }
            } else if i == 0 {
                (-3.0 * at(0) + 4.0 * at(1) - at(2)) / (2.0 * h)
            } else {
                (3.0 * at(0) - 4.0 * at(-1) + at(-2)) / (2.0 * h)
            };
        }
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-10;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn unit_topology(n: usize, h: f64) -> GridTopology {
        GridTopology::new([n, n, n], [h, h, h], [0.0, 0.0, 0.0])
    }

    #[test]
    fn new_field_is_zero_initialized() {
        let field = GridField::new(unit_topology(4, 1.0));
        assert_eq!(field.values().len(), 64);
        assert!(field.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn set_then_get_returns_value() {
        let mut field = GridField::new(unit_topology(4, 1.0));
        field.set(1, 2, 3, 7.5).unwrap();
        assert_eq!(field.get(1, 2, 3).unwrap(), 7.5);
    }

    #[test]
    fn access_outside_dimensions_fails_with_index_out_of_range() {
        let mut field = GridField::new(unit_topology(4, 1.0));
        assert!(matches!(
            field.get(4, 0, 0),
            Err(GridError::IndexOutOfRange { i: 4, .. })
        ));
        assert!(matches!(
            field.set(0, 0, 9, 1.0),
            Err(GridError::IndexOutOfRange { k: 9, .. })
        ));
    }

    #[test]
    fn from_values_rejects_wrong_length() {
        let result = GridField::from_values(unit_topology(3, 1.0), vec![0.0; 26]);
        assert!(matches!(
            result,
            Err(GridError::ValueCountMismatch {
                expected: 27,
                found: 26
            })
        ));
    }

    #[test]
    fn trilinear_interpolation_is_exact_for_linear_fields() {
        let topo = GridTopology::new([5, 6, 7], [0.5, 0.4, 0.3], [-1.0, 0.5, 2.0]);
        let f = |x: f64, y: f64, z: f64| 2.0 * x - 3.0 * y + 0.5 * z + 1.0;
        let field = GridField::from_fn(topo, f);
        let p = Point3::new(0.37, 1.21, 2.93);
        assert!(f64_approx_equal(field.value_at(&p).unwrap(), f(p.x, p.y, p.z)));
    }

    #[test]
    fn value_at_on_far_corner_is_inside_domain() {
        let field = GridField::filled(unit_topology(3, 1.0), 4.0);
        assert!(f64_approx_equal(
            field.value_at(&Point3::new(2.0, 2.0, 2.0)).unwrap(),
            4.0
        ));
    }

    #[test]
    fn out_of_domain_policy_is_honored() {
        let field = GridField::from_fn(unit_topology(3, 1.0), |x, _, _| x);
        let outside = Point3::new(3.5, 1.0, 1.0);
        assert!(matches!(
            field.value_at(&outside),
            Err(GridError::OutOfDomain { .. })
        ));
        assert_eq!(
            field.value_at_with(&outside, OutOfDomain::Zero).unwrap(),
            0.0
        );
        assert!(f64_approx_equal(
            field.value_at_with(&outside, OutOfDomain::Clamp).unwrap(),
            2.0
        ));
    }

    #[test]
    fn gradient_of_linear_field_is_exact_everywhere() {
        let field = GridField::from_fn(unit_topology(6, 0.5), |x, y, z| x - 2.0 * y + 3.0 * z);
        for p in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.1, 0.3, 2.4),
            Point3::new(2.5, 2.5, 2.5),
        ] {
            let g = field.gradient_at(&p).unwrap();
            assert!(f64_approx_equal(g.x, 1.0));
            assert!(f64_approx_equal(g.y, -2.0));
            assert!(f64_approx_equal(g.z, 3.0));
        }
    }

    #[test]
    fn gradient_error_shrinks_at_second_order_with_spacing() {
        let f = |x: f64, y: f64, z: f64| x.sin() * (0.7 * y).cos() * (0.5 * z).exp();
        let grad = |x: f64, y: f64, z: f64| {
            Vector3::new(
                x.cos() * (0.7 * y).cos() * (0.5 * z).exp(),
                -0.7 * x.sin() * (0.7 * y).sin() * (0.5 * z).exp(),
                0.5 * x.sin() * (0.7 * y).cos() * (0.5 * z).exp(),
            )
        };
        let probes = [
            Point3::new(0.83, 1.37, 0.61),
            Point3::new(1.52, 0.44, 1.93),
            Point3::new(1.01, 1.77, 1.29),
        ];

        let max_error = |n: usize| {
            let h = 2.4 / (n - 1) as f64;
            let field = GridField::from_fn(unit_topology(n, h), f);
            probes
                .iter()
                .map(|p| (field.gradient_at(p).unwrap() - grad(p.x, p.y, p.z)).norm())
                .fold(0.0, f64::max)
        };

        let coarse = max_error(13);
        let fine = max_error(25);
        let finer = max_error(49);
        assert!(fine < coarse && finer < fine);
        assert!(coarse / fine > 3.0, "ratio {}", coarse / fine);
        assert!(fine / finer > 3.0, "ratio {}", fine / finer);
    }
}
