use crate::core::grid::{GridField, OutOfDomain};
use crate::core::models::atom::AtomForce;
use crate::core::models::molecule::{Molecule, MoleculeId};
use crate::engine::config::{
    BoundaryCondition, EnergyRequest, ForceRequest, GridParameters, PbeParameters, SolverConfig,
};
use crate::engine::energy::{EnergyEvaluator, EnergySummary};
use crate::engine::error::EngineError;
use crate::engine::force::ForceEvaluator;
use crate::engine::mapping::{FieldMaps, MoleculeMapper};
use crate::engine::potential::PotentialField;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::solver::MultigridSolver;
use nalgebra::Point3;
use tracing::{info, instrument};

/// One configured Poisson-Boltzmann run.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub name: Option<String>,
    pub molecule: MoleculeId,
    pub grid: GridParameters,
    pub pbe: PbeParameters,
    pub solver: SolverConfig,
    /// Index (0-based) of an earlier calculation providing focus boundary values.
    pub focus_parent: Option<usize>,
    /// Maps used instead of mapping the molecule.
    pub external_maps: Option<FieldMaps>,
    /// Keep the potential and maps in the result after evaluation.
    pub retain_grids: bool,
}

impl Calculation {
    pub fn new(
        molecule: MoleculeId,
        grid: GridParameters,
        pbe: PbeParameters,
        solver: SolverConfig,
    ) -> Self {
        Self {
            name: None,
            molecule,
            grid,
            pbe,
            solver,
            focus_parent: None,
            external_maps: None,
            retain_grids: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn focused_on(mut self, parent: usize) -> Self {
        self.focus_parent = Some(parent);
        self
    }

    pub fn with_external_maps(mut self, maps: FieldMaps) -> Self {
        self.external_maps = Some(maps);
        self
    }

    pub fn retaining_grids(mut self) -> Self {
        self.retain_grids = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalculationResult {
    pub molecule: MoleculeId,
    pub iterations: usize,
    pub relative_residual: f64,
    pub energies: Option<EnergySummary>,
    /// Potential (kT/e) at each atom.
    pub atom_potentials: Vec<f64>,
    /// `q_i u(x_i)` per atom, in kT.
    pub atom_energies: Vec<f64>,
    pub forces: Option<Vec<AtomForce>>,
    pub potential: Option<PotentialField>,
    pub maps: Option<FieldMaps>,
}

impl CalculationResult {
    pub fn total_energy(&self) -> Option<f64> {
        self.energies.map(|e| e.total)
    }

    pub(crate) fn release_grids(&mut self) {
        self.potential = None;
        self.maps = None;
    }
}

/// Runs `calculation` on its molecule. `parent` is the potential a focusing calculation
/// takes its boundary values from.
///
/// The returned result always carries the potential and maps; callers decide whether to
/// keep them.
#[instrument(skip_all, name = "calculation", fields(molecule = %calculation.molecule))]
pub fn run(
    calculation: &Calculation,
    molecules: &[Molecule],
    parent: Option<&GridField>,
    reporter: &ProgressReporter,
) -> Result<CalculationResult, EngineError> {
    let molecule = molecules
        .get(calculation.molecule.0)
        .ok_or(EngineError::MoleculeNotFound(calculation.molecule))?;
    let atoms = molecule.atoms();
    let grid = &calculation.grid;
    let pbe = &calculation.pbe;
    let topology = grid.topology();

    reporter.report(Progress::PhaseStart { name: "Mapping" });
    let maps = match &calculation.external_maps {
        Some(maps) => {
            maps.validate(&topology)?;
            info!("Using externally supplied maps.");
            maps.clone()
        }
        None => MoleculeMapper::new(grid, pbe).build_all(atoms)?,
    };
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart { name: "Solving" });
    let initial = match (grid.boundary, parent) {
        (BoundaryCondition::Focus, Some(parent)) => PotentialField::initial(GridField::from_fn(
            topology,
            |x, y, z| {
                parent
                    .value_at_with(&Point3::new(x, y, z), OutOfDomain::Clamp)
                    .unwrap_or_default()
            },
        )),
        _ => PotentialField::zeros(topology),
    };
    let mut solver = MultigridSolver::new(calculation.solver).with_reporter(reporter);
    let solved = solver.solve(&maps, &initial, grid, pbe, atoms, parent);
    reporter.report(Progress::PhaseFinish);
    let potential = solved?;

    let evaluator = EnergyEvaluator::new(grid, pbe);
    let energies = match pbe.energy {
        EnergyRequest::None => None,
        EnergyRequest::Total | EnergyRequest::Components => {
            reporter.report(Progress::PhaseStart { name: "Energies" });
            let energies = evaluator.compute_energies(&potential, &maps, atoms)?;
            reporter.report(Progress::PhaseFinish);
            Some(energies)
        }
    };
    let atom_potentials = evaluator.atom_potentials(&potential, atoms)?;
    let atom_energies = atoms
        .iter()
        .zip(&atom_potentials)
        .map(|(atom, u)| atom.charge * u)
        .collect();

    let forces = match pbe.forces {
        ForceRequest::None => None,
        ForceRequest::Total | ForceRequest::Components => {
            reporter.report(Progress::PhaseStart { name: "Forces" });
            let forces = ForceEvaluator::new(grid, pbe).compute_forces(&potential, &maps, atoms)?;
            reporter.report(Progress::PhaseFinish);
            Some(forces)
        }
    };

    info!(
        iterations = potential.iterations(),
        total_energy = energies.map(|e| e.total),
        "Calculation complete."
    );
    Ok(CalculationResult {
        molecule: calculation.molecule,
        iterations: potential.iterations(),
        relative_residual: potential.final_relative_residual().unwrap_or(0.0),
        energies,
        atom_potentials,
        atom_energies,
        forces,
        potential: Some(potential),
        maps: Some(maps),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::physics::ions::IonSpecies;
    use crate::engine::config::{
        BoundaryCondition, Equation, GridParametersBuilder, PbeParametersBuilder,
        SolverConfigBuilder,
    };
    use crate::engine::solver::SolverError;

    fn dipole() -> Molecule {
        Molecule::new(
            "dipole",
            vec![
                Atom::new(Point3::new(-1.0, 0.0, 0.0), 0.5, 1.6),
                Atom::new(Point3::new(1.0, 0.0, 0.0), -0.5, 1.6),
            ],
        )
    }

    fn calculation(equation: Equation) -> Calculation {
        let grid = GridParametersBuilder::new()
            .dims([17; 3])
            .uniform_spacing(0.75)
            .center([0.0; 3])
            .build()
            .unwrap();
        let pbe = PbeParametersBuilder::new()
            .temperature(298.15)
            .solute_dielectric(2.0)
            .solvent_dielectric(78.54)
            .ion(IonSpecies::new(1.0, 0.1, 2.0))
            .ion(IonSpecies::new(-1.0, 0.1, 2.0))
            .equation(equation)
            .energy(EnergyRequest::Total)
            .forces(ForceRequest::Components)
            .build()
            .unwrap();
        let solver = SolverConfigBuilder::new().tolerance(1e-8).build().unwrap();
        Calculation::new(MoleculeId(0), grid, pbe, solver)
    }

    #[test]
    fn linear_calculation_produces_energies_and_forces() {
        let result = run(
            &calculation(Equation::Linear),
            &[dipole()],
            None,
            &ProgressReporter::new(),
        )
        .unwrap();
        let energies = result.energies.unwrap();
        // Solvating a dipole is favourable.
        assert!(energies.total < 0.0);
        assert_eq!(result.atom_potentials.len(), 2);
        assert!(result.atom_potentials[0] > result.atom_potentials[1]);
        let forces = result.forces.unwrap();
        assert_eq!(forces.len(), 2);
        assert!(result.potential.is_some());
        assert!(result.relative_residual <= 1e-8);
    }

    #[test]
    fn nonlinear_and_linear_energies_agree_for_weak_fields() {
        let molecule = Molecule::new(
            "weak",
            vec![
                Atom::new(Point3::new(-1.0, 0.0, 0.0), 0.05, 1.6),
                Atom::new(Point3::new(1.0, 0.0, 0.0), -0.05, 1.6),
            ],
        );
        let reporter = ProgressReporter::new();
        let linear = run(&calculation(Equation::Linear), &[molecule.clone()], None, &reporter)
            .unwrap()
            .atom_potentials;
        let nonlinear = run(&calculation(Equation::Nonlinear), &[molecule], None, &reporter)
            .unwrap()
            .atom_potentials;
        for (l, n) in linear.iter().zip(&nonlinear) {
            assert!((l - n).abs() < 0.01 * l.abs().max(1e-3));
        }
    }

    #[test]
    fn unknown_molecule_is_a_configuration_error() {
        let mut calc = calculation(Equation::Linear);
        calc.molecule = MoleculeId(3);
        let error = run(&calc, &[dipole()], None, &ProgressReporter::new()).unwrap_err();
        assert!(matches!(error, EngineError::MoleculeNotFound(MoleculeId(3))));
        assert!(error.is_configuration());
    }

    #[test]
    fn exhausted_cycle_budget_fails_with_the_partial_potential() {
        let mut calc = calculation(Equation::Linear);
        calc.solver = SolverConfigBuilder::new()
            .tolerance(1e-12)
            .max_cycles(1)
            .build()
            .unwrap();
        let error = run(&calc, &[dipole()], None, &ProgressReporter::new()).unwrap_err();
        assert!(!error.is_configuration());
        match error {
            EngineError::Solver {
                source: SolverError::Convergence { iterations, potential, .. },
            } => {
                assert_eq!(iterations, 1);
                assert!(!potential.is_converged());
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn external_maps_must_match_the_grid() {
        let calc = calculation(Equation::Linear);
        let other_grid = GridParametersBuilder::new()
            .dims([9; 3])
            .uniform_spacing(0.75)
            .center([0.0; 3])
            .build()
            .unwrap();
        let maps = MoleculeMapper::new(&other_grid, &calc.pbe)
            .build_all(dipole().atoms())
            .unwrap();
        let calc = calc.with_external_maps(maps);
        let error = run(&calc, &[dipole()], None, &ProgressReporter::new()).unwrap_err();
        assert!(error.is_configuration());
    }

    #[test]
    fn progress_phases_are_reported_in_order() {
        use std::sync::Mutex;
        let phases = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::PhaseStart { name } = event {
                phases.lock().unwrap().push(name);
            }
        }));
        run(&calculation(Equation::Linear), &[dipole()], None, &reporter).unwrap();
        drop(reporter);
        assert_eq!(
            phases.into_inner().unwrap(),
            vec!["Mapping", "Solving", "Energies", "Forces"]
        );
    }

    #[test]
    fn zero_boundary_grid_is_supported() {
        let mut calc = calculation(Equation::Linear);
        calc.grid.boundary = BoundaryCondition::Zero;
        let result = run(&calc, &[dipole()], None, &ProgressReporter::new()).unwrap();
        assert!(result.energies.is_some());
    }
}
