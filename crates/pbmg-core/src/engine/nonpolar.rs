use crate::core::models::atom::Atom;
use crate::core::physics::splines::{smooth_step, smooth_step_derivative};
use crate::core::utils::geometry::{fibonacci_sphere, sphere_point_count};
use crate::engine::mapping::neighbors::AtomNeighborhood;
use nalgebra::Vector3;
use std::f64::consts::PI;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Smooth solvent-accessible surface of a set of atoms and its derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessibleSurface {
    /// Exposed area (Å²) contributed by each atom's sphere.
    pub per_atom: Vec<f64>,
    /// `∂SASA/∂x_k` for each atom.
    pub gradients: Vec<Vector3<f64>>,
}

impl AccessibleSurface {
    pub fn total(&self) -> f64 {
        self.per_atom.iter().sum()
    }
}

struct SphereContribution {
    area: f64,
    own_gradient: Vector3<f64>,
    neighbor_gradients: Vec<(usize, Vector3<f64>)>,
}

/// Total smooth SASA (Å²).
pub fn solvent_accessible_area(atoms: &[Atom], probe_radius: f64, window: f64, density: f64) -> f64 {
    solvent_accessible_surface(atoms, probe_radius, window, density).total()
}

/// Smooth SASA: every atom carries quasi-uniform points on its sphere of radius `R + probe`;
/// each point contributes its area share times `Π_j v(|p - x_j|; R_j + probe, window)` over
/// the other atoms.
pub fn solvent_accessible_surface(
    atoms: &[Atom],
    probe_radius: f64,
    window: f64,
    density: f64,
) -> AccessibleSurface {
    let neighborhood = AtomNeighborhood::new(atoms);

    #[cfg(feature = "parallel")]
    let iterator = (0..atoms.len()).into_par_iter();
    #[cfg(not(feature = "parallel"))]
    let iterator = 0..atoms.len();

    let contributions: Vec<SphereContribution> = iterator
        .map(|i| sphere_contribution(&neighborhood, i, probe_radius, window, density))
        .collect();

    let mut per_atom = Vec::with_capacity(atoms.len());
    let mut gradients = vec![Vector3::zeros(); atoms.len()];
    for (i, contribution) in contributions.into_iter().enumerate() {
        per_atom.push(contribution.area);
        gradients[i] += contribution.own_gradient;
        for (j, g) in contribution.neighbor_gradients {
            gradients[j] += g;
        }
    }
    AccessibleSurface {
        per_atom,
        gradients,
    }
}

fn sphere_contribution(
    neighborhood: &AtomNeighborhood<'_>,
    i: usize,
    probe_radius: f64,
    window: f64,
    density: f64,
) -> SphereContribution {
    let atoms = neighborhood.atoms();
    let center = atoms[i].position;
    let radius = atoms[i].radius + probe_radius;
    let mut contribution = SphereContribution {
        area: 0.0,
        own_gradient: Vector3::zeros(),
        neighbor_gradients: Vec::new(),
    };
    if radius <= 0.0 {
        return contribution;
    }
    let count = sphere_point_count(radius, density);
    let point_area = 4.0 * PI * radius * radius / count as f64;

    let mut neighbors: Vec<(usize, f64)> = Vec::new();
    for direction in fibonacci_sphere(count) {
        let p = center + direction * radius;
        neighbors.clear();
        neighborhood.for_each_within(&[p.x, p.y, p.z], probe_radius + window, |j, d| {
            if j != i {
                neighbors.push((j, d));
            }
        });
        let values: Vec<f64> = neighbors
            .iter()
            .map(|&(j, d)| smooth_step(d, atoms[j].radius + probe_radius, window))
            .collect();
        let exposure: f64 = values.iter().product();
        contribution.area += point_area * exposure;

        for (slot, &(j, d)) in neighbors.iter().enumerate() {
            let dv = smooth_step_derivative(d, atoms[j].radius + probe_radius, window);
            if dv == 0.0 || d == 0.0 {
                continue;
            }
            let others: f64 = values
                .iter()
                .enumerate()
                .filter(|&(m, _)| m != slot)
                .map(|(_, v)| v)
                .product();
            // d|p - x_j| / dp = (p - x_j) / d; p moves with x_i, x_j moves against it.
            let unit = (p - atoms[j].position) / d;
            let g = unit * (point_area * dv * others);
            contribution.own_gradient += g;
            contribution.neighbor_gradients.push((j, -g));
        }
    }
    contribution
}
