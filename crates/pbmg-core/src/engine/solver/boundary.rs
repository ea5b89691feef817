use super::problem::for_each_boundary;
use crate::core::grid::{GridField, GridTopology, OutOfDomain};
use crate::core::models::atom::Atom;
use crate::core::physics::debye_huckel::sphere_potential;
use crate::engine::config::{BoundaryCondition, ConfigError, PbeParameters};
use nalgebra::Point3;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const FOCUS_CONTAINMENT_TOLERANCE: f64 = 1e-9;

/// Dirichlet values for every boundary node of `topology`; interior entries are zero.
pub fn boundary_values(
    topology: &GridTopology,
    condition: BoundaryCondition,
    pbe: &PbeParameters,
    atoms: &[Atom],
    parent: Option<&GridField>,
) -> Result<Vec<f64>, ConfigError> {
    let mut values = vec![0.0; topology.len()];
    let kappa = pbe.mobile_ions().debye_kappa(pbe.solvent_dielectric);
    let eps_s = pbe.solvent_dielectric;
    let temperature = pbe.temperature;

    let evaluate: Box<dyn Fn(&Point3<f64>) -> f64 + Send + Sync + '_> = match condition {
        BoundaryCondition::Zero => return Ok(values),
        BoundaryCondition::SingleDebyeHuckel => {
            let (center, charge, radius) = enclosing_sphere(atoms);
            debug!(charge, radius, "Single Debye-Hückel boundary sphere");
            Box::new(move |p: &Point3<f64>| {
                sphere_potential(charge, radius, (p - center).norm(), kappa, eps_s, temperature)
            })
        }
        BoundaryCondition::MultipleDebyeHuckel => Box::new(move |p: &Point3<f64>| {
            atoms
                .iter()
                .filter(|atom| atom.charge != 0.0)
                .map(|atom| {
                    let r = (p - atom.position).norm();
                    sphere_potential(atom.charge, atom.radius, r, kappa, eps_s, temperature)
                })
                .sum()
        }),
        BoundaryCondition::Focus => {
            let parent =
                parent.ok_or(ConfigError::MissingParameter("focus parent potential"))?;
            check_focus_containment(topology, parent.topology())?;
            Box::new(move |p: &Point3<f64>| {
                parent
                    .value_at_with(p, OutOfDomain::Clamp)
                    .unwrap_or_default()
            })
        }
    };

    let mut nodes = Vec::new();
    for_each_boundary(topology, |idx| nodes.push(idx));

    #[cfg(feature = "parallel")]
    let iterator = nodes.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iterator = nodes.iter();

    let computed: Vec<f64> = iterator
        .map(|&idx| {
            let (i, j, k) = topology.coords(idx);
            evaluate(&topology.node_point(i, j, k))
        })
        .collect();
    for (&idx, value) in nodes.iter().zip(computed) {
        values[idx] = value;
    }
    Ok(values)
}

/// Geometric centre, total charge and enclosing radius (including atomic radii).
fn enclosing_sphere(atoms: &[Atom]) -> (Point3<f64>, f64, f64) {
    if atoms.is_empty() {
        return (Point3::origin(), 0.0, 0.0);
    }
    let n = atoms.len() as f64;
    let center = Point3::from(
        atoms
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, a| acc + a.position.coords)
            / n,
    );
    let charge = atoms.iter().map(|a| a.charge).sum();
    let radius = atoms
        .iter()
        .map(|a| (a.position - center).norm() + a.radius)
        .fold(0.0, f64::max);
    (center, charge, radius)
}

fn check_focus_containment(
    child: &GridTopology,
    parent: &GridTopology,
) -> Result<(), ConfigError> {
    let lower = child.origin;
    let upper = child.upper_corner();
    let tolerance = FOCUS_CONTAINMENT_TOLERANCE
        * parent.spacing.iter().copied().fold(0.0, f64::max).max(1.0);
    if parent.contains(&lower, tolerance) && parent.contains(&upper, tolerance) {
        Ok(())
    } else {
        Err(ConfigError::InvalidCombination(format!(
            "focused grid [{:?}, {:?}] is not contained in the parent grid [{:?}, {:?}]",
            lower,
            upper,
            parent.origin,
            parent.upper_corner()
        )))
    }
}
