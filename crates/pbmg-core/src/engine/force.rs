use crate::core::grid::GridTopology;
use crate::core::models::atom::{Atom, AtomForce};
use crate::core::physics::splines::{smooth_step, smooth_step_derivative};
use crate::engine::config::{ConfigError, GridParameters, PbeParameters, SurfaceMethod};
use crate::engine::energy::{EvaluationError, IonEnergyDensity, check_inputs};
use crate::engine::mapping::FieldMaps;
use crate::engine::mapping::neighbors::AtomNeighborhood;
use crate::engine::mapping::stencil::atom_stencils;
use crate::engine::nonpolar::solvent_accessible_surface;
use crate::engine::potential::PotentialField;
use crate::engine::self_energy::{self, self_energy_gradient};
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;
use tracing::{info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Differentiates the discrete solvation energy with respect to every atom position.
///
/// The potential is held fixed at its converged value; because the discrete energy is
/// stationary in the potential, this gives the exact gradient of that energy.
pub struct ForceEvaluator<'a> {
    grid: &'a GridParameters,
    pbe: &'a PbeParameters,
}

/// Quantities shared by all per-atom force evaluations.
struct ForceContext<'a> {
    topology: GridTopology,
    atoms: &'a [Atom],
    neighborhood: AtomNeighborhood<'a>,
    potential: &'a [f64],
    window: f64,
    ion_radius: f64,
    dielectric_jump: f64,
    density: IonEnergyDensity,
}

impl<'a> ForceEvaluator<'a> {
    pub fn new(grid: &'a GridParameters, pbe: &'a PbeParameters) -> Self {
        Self { grid, pbe }
    }

    #[instrument(skip_all, name = "force_evaluation")]
    pub fn compute_forces(
        &self,
        potential: &PotentialField,
        maps: &FieldMaps,
        atoms: &[Atom],
    ) -> Result<Vec<AtomForce>, EvaluationError> {
        let topology = self.grid.topology();
        check_inputs(potential, maps, &topology)?;
        if self.pbe.surface.method != SurfaceMethod::Spline {
            return Err(ConfigError::InvalidCombination(format!(
                "forces need the smooth spline surface, not {:?}",
                self.pbe.surface.method
            ))
            .into());
        }

        let u = potential.values();
        let lambda = self.pbe.coulomb_length();
        let volume = topology.cell_volume();
        let stencils = atom_stencils(&topology, self.grid, atoms)?;
        let kernel = self_energy::kernel(topology.spacing)?;

        let surface = &self.pbe.surface;
        let np_gradients = if self.pbe.surface_tension != 0.0 {
            solvent_accessible_surface(
                atoms,
                surface.solvent_radius,
                surface.smoothing_window,
                surface.sphere_density,
            )
            .gradients
        } else {
            vec![Vector3::zeros(); atoms.len()]
        };
        let gamma = self.pbe.surface_tension_kt();

        let context = ForceContext {
            topology,
            atoms,
            neighborhood: AtomNeighborhood::new(atoms),
            potential: u,
            window: surface.smoothing_window,
            ion_radius: self.pbe.ion_exclusion_radius(),
            dielectric_jump: self.pbe.solvent_dielectric - self.pbe.solute_dielectric,
            density: IonEnergyDensity::new(self.pbe),
        };

        #[cfg(feature = "parallel")]
        let iterator = (0..atoms.len()).into_par_iter();
        #[cfg(not(feature = "parallel"))]
        let iterator = 0..atoms.len();

        let forces: Vec<AtomForce> = iterator
            .map(|k| {
                let atom = &atoms[k];
                let stencil = &stencils[k];
                let qf = -atom.charge * stencil.interpolate_gradient(u)
                    + self_energy_gradient(
                        stencil,
                        atom.charge,
                        &kernel,
                        lambda,
                        self.pbe.solute_dielectric,
                    );
                let db = context.dielectric_gradient(k) * (0.5 * volume / (4.0 * PI * lambda));
                let ib = context.accessibility_gradient(k) * volume;
                AtomForce {
                    ib,
                    qf,
                    db,
                    np: -gamma * np_gradients[k],
                }
            })
            .collect();

        let net: Vector3<f64> = forces.iter().map(AtomForce::total).sum();
        info!(atoms = atoms.len(), net = ?net, "Computed atomic forces");
        Ok(forces)
    }
}

impl ForceContext<'_> {
    /// `Σ_faces ∂ε_f/∂x_k (Δu/h)²`.
    fn dielectric_gradient(&self, k: usize) -> Vector3<f64> {
        let atom = &self.atoms[k];
        if self.dielectric_jump == 0.0 || self.window <= 0.0 {
            return Vector3::zeros();
        }
        let topology = &self.topology;
        let dims = topology.dims;
        let strides = [1, dims[0], dims[0] * dims[1]];
        let max_h = topology.spacing.iter().copied().fold(0.0, f64::max);
        let mut sum = Vector3::zeros();
        visit_nodes_near(topology, &atom.position, atom.radius + self.window + max_h, |idx, ijk| {
            for axis in 0..3 {
                if ijk[axis] + 1 >= dims[axis] {
                    continue;
                }
                let mut next = ijk;
                next[axis] += 1;
                if topology.is_boundary(ijk[0], ijk[1], ijk[2])
                    && topology.is_boundary(next[0], next[1], next[2])
                {
                    continue;
                }
                let mut face = topology.node_point(ijk[0], ijk[1], ijk[2]);
                face[axis] += 0.5 * topology.spacing[axis];
                let Some(direction) = self.surface_derivative(k, &face, 0.0) else {
                    continue;
                };
                let slope = (self.potential[idx + strides[axis]] - self.potential[idx])
                    / topology.spacing[axis];
                sum += direction * (self.dielectric_jump * slope * slope);
            }
        });
        sum
    }

    /// `Σ_interior ∂H_a/∂x_k q_m(u_a)`.
    fn accessibility_gradient(&self, k: usize) -> Vector3<f64> {
        let atom = &self.atoms[k];
        if self.density.is_empty() || self.window <= 0.0 {
            return Vector3::zeros();
        }
        let topology = &self.topology;
        let mut sum = Vector3::zeros();
        let reach = atom.radius + self.ion_radius + self.window;
        visit_nodes_near(topology, &atom.position, reach, |idx, ijk| {
            if topology.is_boundary(ijk[0], ijk[1], ijk[2]) {
                return;
            }
            let node = topology.node_point(ijk[0], ijk[1], ijk[2]);
            if let Some(direction) = self.surface_derivative(k, &node, self.ion_radius) {
                sum += direction * self.density.at(self.potential[idx]);
            }
        });
        sum
    }

    /// Derivative with respect to `x_k` of `Π_j v(|p - x_j|; R_j + inflation, w)`, or `None`
    /// where atom `k` does not affect the product.
    fn surface_derivative(&self, k: usize, point: &Point3<f64>, inflation: f64) -> Option<Vector3<f64>> {
        let atom = &self.atoms[k];
        let offset = atom.position - point;
        let distance = offset.norm();
        if distance == 0.0 {
            return None;
        }
        let dv = smooth_step_derivative(distance, atom.radius + inflation, self.window);
        if dv == 0.0 {
            return None;
        }
        let mut others = 1.0;
        self.neighborhood
            .for_each_within(&[point.x, point.y, point.z], inflation + self.window, |j, d| {
                if j != k {
                    others *= smooth_step(d, self.atoms[j].radius + inflation, self.window);
                }
            });
        if others == 0.0 {
            return None;
        }
        Some(offset * (others * dv / distance))
    }
}

/// Visits nodes in the box of half-width `reach` around `center`, clipped to the grid.
fn visit_nodes_near<F>(topology: &GridTopology, center: &Point3<f64>, reach: f64, mut visit: F)
where
    F: FnMut(usize, [usize; 3]),
{
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    for d in 0..3 {
        let n = topology.dims[d];
        if n == 0 {
            return;
        }
        let first = topology.fractional(d, center[d] - reach).floor();
        let last = topology.fractional(d, center[d] + reach).ceil();
        if last < 0.0 || first > (n - 1) as f64 {
            return;
        }
        lo[d] = first.max(0.0) as usize;
        hi[d] = (last as usize).min(n - 1);
    }
    for k in lo[2]..=hi[2] {
        for j in lo[1]..=hi[1] {
            for i in lo[0]..=hi[0] {
                visit(topology.index(i, j, k), [i, j, k]);
            }
        }
    }
}
