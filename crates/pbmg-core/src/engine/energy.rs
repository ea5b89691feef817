use crate::core::grid::GridTopology;
use crate::core::models::atom::Atom;
use crate::core::physics::constants::kt_to_kj_per_mol;
use crate::core::physics::ions::MobileIons;
use crate::engine::config::{ConfigError, Equation, GridParameters, PbeParameters};
use crate::engine::mapping::stencil::{ChargeStencil, atom_stencils};
use crate::engine::mapping::{FieldMaps, MappingError};
use crate::engine::nonpolar::solvent_accessible_area;
use crate::engine::potential::{PotentialField, PotentialStatus};
use crate::engine::self_energy::{self, GreenKernel};
use std::f64::consts::PI;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Energies and forces need a converged potential, but the potential is {status:?}")]
    IncompletePotential { status: PotentialStatus },

    #[error("Invalid evaluation setup: {source}")]
    Configuration {
        #[from]
        source: ConfigError,
    },

    #[error("Charge stencils could not be built: {source}")]
    Mapping {
        #[from]
        source: MappingError,
    },

    #[error("The self-energy kernel did not converge")]
    KernelConvergence,
}

/// Energies of one calculation, in kT.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergySummary {
    /// Electrostatic energy with the self-energy removed.
    pub total: f64,
    pub fixed_charge: f64,
    pub mobile_ion: f64,
    pub dielectric: f64,
    pub self_energy: f64,
    /// `γ · SASA`; reported beside, not inside, the electrostatic total.
    pub nonpolar: f64,
}

impl EnergySummary {
    pub fn total_kj_per_mol(&self, temperature: f64) -> f64 {
        kt_to_kj_per_mol(self.total, temperature)
    }
}

/// Energy density `q_m(u)` of the mobile ions, in kT/Å³.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IonEnergyDensity {
    equation: Equation,
    ions: MobileIons,
    coulomb_length: f64,
}

impl IonEnergyDensity {
    pub fn new(pbe: &PbeParameters) -> Self {
        Self {
            equation: pbe.equation,
            ions: pbe.mobile_ions(),
            coulomb_length: pbe.coulomb_length(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ions.is_empty()
    }

    #[inline]
    pub fn at(&self, u: f64) -> f64 {
        if self.ions.is_empty() {
            return 0.0;
        }
        match self.equation {
            Equation::Linear => self.ions.kappa2_bar() * u * u / (8.0 * PI * self.coulomb_length),
            Equation::Nonlinear => self.ions.osmotic_density(u),
        }
    }
}

/// Guards shared by the energy and force evaluators.
pub(crate) fn check_inputs(
    potential: &PotentialField,
    maps: &FieldMaps,
    topology: &GridTopology,
) -> Result<(), EvaluationError> {
    if !potential.is_converged() {
        return Err(EvaluationError::IncompletePotential {
            status: potential.status(),
        });
    }
    maps.validate(topology)?;
    if !potential.topology().is_compatible(topology) {
        return Err(ConfigError::IncompatibleMap {
            map: "potential",
            expected: topology.dims,
            found: potential.topology().dims,
        }
        .into());
    }
    Ok(())
}

/// Calls `f(axis, a, b)` for every face `a → b = a + e_axis` with at least one interior
/// endpoint.
pub(crate) fn for_each_face<F>(topology: &GridTopology, mut f: F)
where
    F: FnMut(usize, usize, usize),
{
    let [nx, ny, nz] = topology.dims;
    let strides = [1, nx, nx * ny];
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let a = i + nx * (j + ny * k);
                let ijk = [i, j, k];
                for axis in 0..3 {
                    if ijk[axis] + 1 >= topology.dims[axis] {
                        continue;
                    }
                    let mut next = ijk;
                    next[axis] += 1;
                    if topology.is_boundary(i, j, k)
                        && topology.is_boundary(next[0], next[1], next[2])
                    {
                        continue;
                    }
                    f(axis, a, a + strides[axis]);
                }
            }
        }
    }
}

/// Calls `f(index, ijk)` for every interior node.
pub(crate) fn for_each_interior<F>(topology: &GridTopology, mut f: F)
where
    F: FnMut(usize, [usize; 3]),
{
    let [nx, ny, nz] = topology.dims;
    for k in 1..nz.saturating_sub(1) {
        for j in 1..ny.saturating_sub(1) {
            for i in 1..nx.saturating_sub(1) {
                f(i + nx * (j + ny * k), [i, j, k]);
            }
        }
    }
}

/// Reduces a converged potential to energies.
pub struct EnergyEvaluator<'a> {
    grid: &'a GridParameters,
    pbe: &'a PbeParameters,
}

impl<'a> EnergyEvaluator<'a> {
    pub fn new(grid: &'a GridParameters, pbe: &'a PbeParameters) -> Self {
        Self { grid, pbe }
    }

    #[instrument(skip_all, name = "energy_evaluation")]
    pub fn compute_energies(
        &self,
        potential: &PotentialField,
        maps: &FieldMaps,
        atoms: &[Atom],
    ) -> Result<EnergySummary, EvaluationError> {
        let topology = self.grid.topology();
        check_inputs(potential, maps, &topology)?;
        let u = potential.values();
        let lambda = self.pbe.coulomb_length();
        let volume = topology.cell_volume();

        let stencils = atom_stencils(&topology, self.grid, atoms)?;
        let fixed_charge: f64 = atoms
            .iter()
            .zip(&stencils)
            .map(|(atom, stencil)| atom.charge * stencil.interpolate(u))
            .sum();

        let kernel = self_energy::kernel(topology.spacing)?;
        let self_energy = self.self_energy(atoms, &stencils, &kernel);

        let mut face_sum = 0.0;
        let inv_h = topology.spacing.map(|h| 1.0 / h);
        let eps = maps.dielectric.components().map(|c| c.values());
        for_each_face(&topology, |axis, a, b| {
            let gradient = (u[b] - u[a]) * inv_h[axis];
            face_sum += eps[axis][a] * gradient * gradient;
        });
        let dielectric = volume / (8.0 * PI * lambda) * face_sum;

        let density = IonEnergyDensity::new(self.pbe);
        let mut mobile_ion = 0.0;
        if !density.is_empty() {
            let accessibility = maps.accessibility.values();
            for_each_interior(&topology, |idx, _| {
                mobile_ion += accessibility[idx] * density.at(u[idx]);
            });
            mobile_ion *= volume;
        }

        let total = match self.pbe.equation {
            Equation::Linear => 0.5 * fixed_charge - self_energy,
            Equation::Nonlinear => fixed_charge - dielectric - mobile_ion - self_energy,
        };

        let nonpolar = if self.pbe.surface_tension != 0.0 {
            let surface = &self.pbe.surface;
            let area = solvent_accessible_area(
                atoms,
                surface.solvent_radius,
                surface.smoothing_window,
                surface.sphere_density,
            );
            self.pbe.surface_tension_kt() * area
        } else {
            0.0
        };

        debug!(fixed_charge, dielectric, mobile_ion, self_energy, "Energy components");
        info!(total, "Electrostatic energy (kT)");
        Ok(EnergySummary {
            total,
            fixed_charge,
            mobile_ion,
            dielectric,
            self_energy,
            nonpolar,
        })
    }

    fn self_energy(&self, atoms: &[Atom], stencils: &[ChargeStencil], kernel: &GreenKernel) -> f64 {
        let lambda = self.pbe.coulomb_length();
        atoms
            .iter()
            .zip(stencils)
            .map(|(atom, stencil)| {
                self_energy::self_energy(
                    stencil,
                    atom.charge,
                    kernel,
                    lambda,
                    self.pbe.solute_dielectric,
                )
            })
            .sum()
    }

    /// Potential (kT/e) at each atom, read back through its charge stencil.
    pub fn atom_potentials(
        &self,
        potential: &PotentialField,
        atoms: &[Atom],
    ) -> Result<Vec<f64>, EvaluationError> {
        if !potential.is_converged() {
            return Err(EvaluationError::IncompletePotential {
                status: potential.status(),
            });
        }
        let topology = self.grid.topology();
        let stencils = atom_stencils(&topology, self.grid, atoms)?;
        Ok(stencils
            .iter()
            .map(|stencil| stencil.interpolate(potential.values()))
            .collect())
    }

    /// `q_i u(x_i)` per atom, in kT.
    pub fn atom_energies(
        &self,
        potential: &PotentialField,
        atoms: &[Atom],
    ) -> Result<Vec<f64>, EvaluationError> {
        Ok(self
            .atom_potentials(potential, atoms)?
            .into_iter()
            .zip(atoms)
            .map(|(u, atom)| atom.charge * u)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::GridField;
    use crate::core::physics::ions::IonSpecies;
    use crate::engine::config::{
        BoundaryCondition, GridParametersBuilder, PbeParametersBuilder, SolverConfigBuilder,
    };
    use crate::engine::mapping::MoleculeMapper;
    use crate::engine::solver::MultigridSolver;
    use nalgebra::Point3;

    fn single_ion(n: usize, h: f64) -> (GridParameters, PbeParameters, Vec<Atom>) {
        let grid = GridParametersBuilder::new()
            .dims([n; 3])
            .uniform_spacing(h)
            .center([0.0; 3])
            .boundary(BoundaryCondition::MultipleDebyeHuckel)
            .build()
            .unwrap();
        let pbe = PbeParametersBuilder::new()
            .temperature(298.15)
            .solute_dielectric(2.0)
            .solvent_dielectric(2.0)
            .build()
            .unwrap();
        (grid, pbe, vec![Atom::new(Point3::new(0.1, -0.05, 0.2), 1.0, 1.5)])
    }

    fn solve(
        grid: &GridParameters,
        pbe: &PbeParameters,
        atoms: &[Atom],
    ) -> (FieldMaps, PotentialField) {
        let maps = MoleculeMapper::new(grid, pbe).build_all(atoms).unwrap();
        let config = SolverConfigBuilder::new().tolerance(1e-9).build().unwrap();
        let initial = PotentialField::zeros(grid.topology());
        let potential = MultigridSolver::new(config)
            .solve(&maps, &initial, grid, pbe, atoms, None)
            .unwrap();
        (maps, potential)
    }

    #[test]
    fn self_energy_cancels_the_reaction_free_ion_energy() {
        let mut totals = Vec::new();
        for (n, h) in [(17, 1.0), (33, 0.5)] {
            let (grid, pbe, atoms) = single_ion(n, h);
            let (maps, potential) = solve(&grid, &pbe, &atoms);
            let energies = EnergyEvaluator::new(&grid, &pbe)
                .compute_energies(&potential, &maps, &atoms)
                .unwrap();
            assert!(energies.self_energy > 100.0);
            totals.push(energies.total);
        }
        assert!(totals[0].abs() < 0.5, "coarse total {}", totals[0]);
        assert!(totals[1].abs() < 0.25, "fine total {}", totals[1]);
        assert!(totals[1].abs() <= totals[0].abs() + 0.02);
    }

    #[test]
    fn repeated_evaluation_is_bit_identical() {
        let (grid, pbe, atoms) = single_ion(17, 1.0);
        let (maps, potential) = solve(&grid, &pbe, &atoms);
        let evaluator = EnergyEvaluator::new(&grid, &pbe);
        let first = evaluator.compute_energies(&potential, &maps, &atoms).unwrap();
        let second = evaluator.compute_energies(&potential, &maps, &atoms).unwrap();
        assert_eq!(first, second);
        let energies = evaluator.atom_energies(&potential, &atoms).unwrap();
        assert_eq!(energies.len(), 1);
        assert!((energies[0] - first.fixed_charge).abs() < 1e-12);
    }

    #[test]
    fn unconverged_potential_is_rejected() {
        let (grid, pbe, atoms) = single_ion(17, 1.0);
        let maps = MoleculeMapper::new(&grid, &pbe).build_all(&atoms).unwrap();
        let potential = PotentialField::zeros(grid.topology());
        let evaluator = EnergyEvaluator::new(&grid, &pbe);
        assert_eq!(
            evaluator.compute_energies(&potential, &maps, &atoms),
            Err(EvaluationError::IncompletePotential {
                status: PotentialStatus::Unsolved
            })
        );
        assert!(evaluator.atom_potentials(&potential, &atoms).is_err());
    }

    #[test]
    fn linear_energy_satisfies_the_discrete_green_identity() {
        // At the solution, ½ qf = dielectric + mobile-ion energy (zero boundary).
        let grid = GridParametersBuilder::new()
            .dims([33; 3])
            .uniform_spacing(0.5)
            .center([0.0; 3])
            .boundary(BoundaryCondition::Zero)
            .build()
            .unwrap();
        let pbe = PbeParametersBuilder::new()
            .temperature(298.15)
            .solute_dielectric(2.0)
            .solvent_dielectric(78.54)
            .ion(IonSpecies::new(1.0, 0.15, 2.0))
            .ion(IonSpecies::new(-1.0, 0.15, 2.0))
            .build()
            .unwrap();
        let atoms = vec![
            Atom::new(Point3::new(0.3, 0.1, 0.0), 1.0, 1.6),
            Atom::new(Point3::new(-1.9, 0.2, 0.4), -0.5, 1.8),
        ];
        let (maps, potential) = solve(&grid, &pbe, &atoms);
        let e = EnergyEvaluator::new(&grid, &pbe)
            .compute_energies(&potential, &maps, &atoms)
            .unwrap();
        let balance = e.dielectric + e.mobile_ion;
        assert!(
            (0.5 * e.fixed_charge - balance).abs() < 1e-4 * balance.abs(),
            "½qf = {}, diel + qm = {}",
            0.5 * e.fixed_charge,
            balance
        );
        assert!(e.mobile_ion > 0.0);
    }

    #[test]
    fn mismatched_potential_grid_is_a_configuration_error() {
        let (grid, pbe, atoms) = single_ion(17, 1.0);
        let maps = MoleculeMapper::new(&grid, &pbe).build_all(&atoms).unwrap();
        let other = GridField::new(GridTopology::centered([9; 3], [1.0; 3], [0.0; 3]));
        let potential = PotentialField::solved(other, PotentialStatus::Converged, 1, vec![0.0]);
        let result = EnergyEvaluator::new(&grid, &pbe).compute_energies(&potential, &maps, &atoms);
        assert!(matches!(
            result,
            Err(EvaluationError::Configuration {
                source: ConfigError::IncompatibleMap { map: "potential", .. }
            })
        ));
    }
}
