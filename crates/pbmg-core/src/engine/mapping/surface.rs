use super::neighbors::{AtomNeighborhood, PointCloud};
use crate::core::grid::GridTopology;
use crate::core::models::atom::Atom;
use crate::core::physics::splines::smooth_step;
use crate::core::utils::geometry::{fibonacci_sphere, sphere_point_count};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Evaluates `f` at every node of `topology` shifted by `offset`.
pub fn sample_grid<F>(topology: &GridTopology, offset: [f64; 3], f: F) -> Vec<f64>
where
    F: Fn([f64; 3]) -> f64 + Sync + Send,
{
    let [nx, ny, _] = topology.dims;
    let plane = nx * ny;
    let mut values = vec![0.0; topology.len()];
    if plane == 0 {
        return values;
    }

    #[cfg(not(feature = "parallel"))]
    let iterator = values.chunks_mut(plane);

    #[cfg(feature = "parallel")]
    let iterator = values.par_chunks_mut(plane);

    iterator.enumerate().for_each(|(k, slab)| {
        for j in 0..ny {
            for i in 0..nx {
                let [x, y, z] = topology.node_position(i, j, k);
                slab[i + nx * j] = f([x + offset[0], y + offset[1], z + offset[2]]);
            }
        }
    });
    values
}

/// Half-spacing shift placing node `(i, j, k)` on the face towards `(i, j, k) + e_axis`.
pub fn face_offset(topology: &GridTopology, axis: usize) -> [f64; 3] {
    let mut offset = [0.0; 3];
    offset[axis] = 0.5 * topology.spacing[axis];
    offset
}

/// Product of per-atom cubic smooth steps: 0 deep inside the solute, 1 in bulk solvent.
pub struct SplineSurface<'a> {
    neighborhood: AtomNeighborhood<'a>,
    window: f64,
}

impl<'a> SplineSurface<'a> {
    pub fn new(atoms: &'a [Atom], window: f64) -> Self {
        Self {
            neighborhood: AtomNeighborhood::new(atoms),
            window,
        }
    }

    /// Solvent character with every radius inflated by `inflation`.
    pub fn solvent_fraction(&self, point: &[f64; 3], inflation: f64) -> f64 {
        let atoms = self.neighborhood.atoms();
        let mut value = 1.0;
        self.neighborhood
            .for_each_within(point, inflation + self.window, |i, d| {
                value *= smooth_step(d, atoms[i].radius + inflation, self.window);
            });
        value
    }
}

/// Sharp solvent-excluded (molecular) surface traced by a rolling solvent probe.
pub struct MolecularSurface<'a> {
    neighborhood: AtomNeighborhood<'a>,
    probe_radius: f64,
    probes: PointCloud,
    probe_count: usize,
}

impl<'a> MolecularSurface<'a> {
    pub fn new(atoms: &'a [Atom], probe_radius: f64, sphere_density: f64) -> Self {
        let neighborhood = AtomNeighborhood::new(atoms);
        let mut centres = Vec::new();
        if probe_radius > 0.0 {
            for (index, atom) in atoms.iter().enumerate() {
                let radius = atom.radius + probe_radius;
                for direction in fibonacci_sphere(sphere_point_count(radius, sphere_density)) {
                    let c = atom.position + direction * radius;
                    let c = [c.x, c.y, c.z];
                    let mut buried = false;
                    // Probe spheres touching a neighbour are not accessible.
                    neighborhood.for_each_within(&c, probe_radius - 1e-9, |j, _| {
                        if j != index {
                            buried = true;
                        }
                    });
                    if !buried {
                        centres.push(c);
                    }
                }
            }
        }
        Self {
            neighborhood,
            probe_radius,
            probes: PointCloud::new(&centres),
            probe_count: centres.len(),
        }
    }

    pub fn is_solvent(&self, point: &[f64; 3]) -> bool {
        if self.neighborhood.any_within(point, 0.0) {
            return false;
        }
        if !self.neighborhood.any_within(point, self.probe_radius) {
            return true;
        }
        self.probes.any_within(point, self.probe_radius)
    }

    pub fn probe_count(&self) -> usize {
        self.probe_count
    }
}
