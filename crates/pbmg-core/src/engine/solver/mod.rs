//! # Solver Module
//!
//! Multigrid solution of the discretized Poisson-Boltzmann equation.
//!
//! The finest grid carries the problem assembled from [`FieldMaps`]; coarser grids are
//! obtained by halving the node count per axis (`n_c = (n_f - 1) / 2 + 1`) with harmonic
//! averaging of the dielectric faces. Each iteration solves the correction equation
//! `A e = r` with zero boundary values:
//!
//! - **Linear equation** - one V or W cycle per iteration.
//! - **Nonlinear equation** - a Newton step whose linearized system is solved by inner
//!   cycles, followed by a backtracking line search on the nonlinear residual.
//!
//! Convergence is declared when `‖r_k‖ / ‖r_0‖` drops below the configured tolerance.

pub mod boundary;
mod level;
pub mod problem;

use self::level::Hierarchy;
use self::problem::{DiscreteProblem, norm};
use crate::core::grid::{GridField, GridTopology};
use crate::core::models::atom::Atom;
use crate::engine::config::{ConfigError, CycleType, GridParameters, PbeParameters, SolverConfig};
use crate::engine::mapping::FieldMaps;
use crate::engine::potential::{PotentialField, PotentialStatus};
use crate::engine::progress::{Progress, ProgressReporter};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Invalid solver setup: {source}")]
    Configuration {
        #[from]
        source: ConfigError,
    },

    #[error(
        "Multigrid did not converge after {iterations} iterations (relative residual {relative_residual:.3e})"
    )]
    Convergence {
        iterations: usize,
        relative_residual: f64,
        /// Last iterate, marked as failed.
        potential: Box<PotentialField>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Uninitialized,
    HierarchyBuilt,
    Cycling,
    Converged,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub values: Vec<f64>,
    pub iterations: usize,
    /// `‖r_k‖ / ‖r_0‖` after each iteration.
    pub residual_history: Vec<f64>,
    pub converged: bool,
}

pub struct MultigridSolver<'a> {
    config: SolverConfig,
    state: SolverState,
    reporter: Option<&'a ProgressReporter<'a>>,
}

impl<'a> MultigridSolver<'a> {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            state: SolverState::Uninitialized,
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a ProgressReporter<'a>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn report(&self, event: Progress) {
        if let Some(reporter) = self.reporter {
            reporter.report(event);
        }
    }

    /// Solves for the potential of `atoms` on the grid described by `grid`.
    ///
    /// `initial` seeds the interior; boundary values always come from `grid.boundary`.
    /// `parent` is the enclosing potential required by focusing boundaries.
    #[instrument(skip_all, name = "multigrid_solve")]
    pub fn solve(
        &mut self,
        maps: &FieldMaps,
        initial: &PotentialField,
        grid: &GridParameters,
        pbe: &PbeParameters,
        atoms: &[Atom],
        parent: Option<&GridField>,
    ) -> Result<PotentialField, SolverError> {
        self.state = SolverState::Uninitialized;
        let topology = grid.topology();
        maps.validate(&topology)?;
        check_initial_guess(initial.topology(), &topology)?;

        let boundary = boundary::boundary_values(&topology, grid.boundary, pbe, atoms, parent)?;
        let problem = DiscreteProblem::assemble(maps, pbe, boundary);
        let outcome =
            self.solve_discrete(&problem, grid.levels, grid.cycle, Some(initial.values()))?;

        let status = if outcome.converged {
            PotentialStatus::Converged
        } else {
            PotentialStatus::Failed
        };
        let relative_residual = outcome.residual_history.last().copied().unwrap_or(0.0);
        let potential = PotentialField::solved(
            GridField::from_sampled(topology, outcome.values),
            status,
            outcome.iterations,
            outcome.residual_history,
        );
        if outcome.converged {
            Ok(potential)
        } else {
            Err(SolverError::Convergence {
                iterations: potential.iterations(),
                relative_residual,
                potential: Box::new(potential),
            })
        }
    }

    /// Iterates on an assembled problem until convergence or `max_cycles` iterations.
    ///
    /// Non-convergence is reported through [`SolveOutcome::converged`] and the
    /// [`SolverState::Failed`] state, not as an error.
    pub fn solve_discrete(
        &mut self,
        problem: &DiscreteProblem,
        levels: usize,
        cycle: CycleType,
        initial: Option<&[f64]>,
    ) -> Result<SolveOutcome, SolverError> {
        self.state = SolverState::Uninitialized;
        problem.validate()?;
        GridParameters::check_levels(problem.topology.dims, levels)?;
        let n = problem.topology.len();

        let mut u = match initial {
            Some(values) if values.len() != n => {
                return Err(ConfigError::InvalidCombination(format!(
                    "initial guess holds {} values but the grid has {} nodes",
                    values.len(),
                    n
                ))
                .into());
            }
            Some(values) => values.to_vec(),
            None => vec![0.0; n],
        };
        problem.apply_boundary(&mut u);

        let mut hierarchy = Hierarchy::build(
            problem.topology.dims,
            problem.topology.spacing,
            &problem.dielectric,
            problem.reaction_coefficients(&u),
            levels,
        );
        self.state = SolverState::HierarchyBuilt;
        debug!(levels = hierarchy.len(), dims = ?problem.topology.dims, "Built multigrid hierarchy");

        let mut residual = vec![0.0; n];
        problem.residual(&u, &mut residual);
        let initial_norm = norm(&residual);
        let mut history = Vec::new();
        if initial_norm == 0.0 {
            self.state = SolverState::Converged;
            info!("Initial residual is zero; nothing to solve");
            return Ok(SolveOutcome {
                values: u,
                iterations: 0,
                residual_history: history,
                converged: true,
            });
        }

        self.state = SolverState::Cycling;
        let gamma = cycle.gamma();
        let nonlinear = problem.reaction.is_nonlinear();
        let mut iterations = 0;
        let mut converged = false;
        self.report(Progress::TaskStart {
            total_steps: self.config.max_cycles as u64,
        });
        for iteration in 1..=self.config.max_cycles {
            iterations = iteration;
            if nonlinear {
                self.newton_step(problem, &mut hierarchy, &mut u, &residual, gamma);
            } else {
                let correction =
                    hierarchy.solve_correction(&residual, 1, gamma, &self.config, None);
                u.iter_mut().zip(correction).for_each(|(ui, ei)| *ui += ei);
            }
            problem.residual(&u, &mut residual);
            let relative = norm(&residual) / initial_norm;
            history.push(relative);
            debug!(iteration, relative_residual = relative, "Multigrid iteration");
            self.report(Progress::TaskIncrement);

            if relative <= self.config.tolerance {
                converged = true;
                break;
            }
            if !relative.is_finite() {
                warn!(iteration, "Residual is no longer finite; stopping");
                break;
            }
        }
        self.report(Progress::TaskFinish);

        let final_residual = history.last().copied().unwrap_or(0.0);
        if converged {
            self.state = SolverState::Converged;
            info!(iterations, relative_residual = final_residual, "Multigrid converged");
        } else {
            self.state = SolverState::Failed;
            warn!(iterations, relative_residual = final_residual, "Multigrid failed to converge");
        }
        Ok(SolveOutcome {
            values: u,
            iterations,
            residual_history: history,
            converged,
        })
    }

    fn newton_step(
        &self,
        problem: &DiscreteProblem,
        hierarchy: &mut Hierarchy,
        u: &mut [f64],
        residual: &[f64],
        gamma: usize,
    ) {
        hierarchy.update_reaction(&problem.reaction_coefficients(u));
        let correction = hierarchy.solve_correction(
            residual,
            self.config.newton_inner_cycles,
            gamma,
            &self.config,
            Some(self.config.newton_inner_tolerance),
        );

        let current = norm(residual);
        let mut trial = vec![0.0; u.len()];
        let mut trial_residual = vec![0.0; u.len()];
        let mut step = 1.0;
        for attempt in 0..=self.config.line_search_steps {
            for ((t, ui), ei) in trial.iter_mut().zip(u.iter()).zip(correction) {
                *t = ui + step * ei;
            }
            problem.residual(&trial, &mut trial_residual);
            if norm(&trial_residual) < current {
                break;
            }
            if attempt == self.config.line_search_steps {
                warn!(step, "Line search found no decrease; taking the smallest step");
                break;
            }
            step *= 0.5;
        }
        u.copy_from_slice(&trial);
    }
}

fn check_initial_guess(found: &GridTopology, expected: &GridTopology) -> Result<(), ConfigError> {
    if found.dims != expected.dims {
        return Err(ConfigError::IncompatibleMap {
            map: "initial potential",
            expected: expected.dims,
            found: found.dims,
        });
    }
    if !found.is_compatible(expected) {
        return Err(ConfigError::MisplacedMap {
            map: "initial potential",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::problem::Reaction;
    use super::*;
    use crate::core::physics::ions::{IonSpecies, MobileIons};
    use crate::engine::config::{Smoother, SolverConfigBuilder};
    use std::f64::consts::PI;

    /// `-Δu + u = f` on the unit cube with `u = sin(πx) sin(πy) sin(πz)`.
    fn manufactured(n: usize) -> (DiscreteProblem, Vec<f64>) {
        let h = 1.0 / (n - 1) as f64;
        let topology = GridTopology::new([n; 3], [h; 3], [0.0; 3]);
        let len = topology.len();
        let mut exact = vec![0.0; len];
        let mut source = vec![0.0; len];
        for idx in 0..len {
            let (i, j, k) = topology.coords(idx);
            let [x, y, z] = topology.node_position(i, j, k);
            let u = (PI * x).sin() * (PI * y).sin() * (PI * z).sin();
            exact[idx] = u;
            source[idx] = (3.0 * PI * PI + 1.0) * u;
        }
        let problem = DiscreteProblem {
            topology,
            dielectric: [vec![1.0; len], vec![1.0; len], vec![1.0; len]],
            accessibility: vec![1.0; len],
            source,
            boundary: vec![0.0; len],
            reaction: Reaction::Linear { kappa2: 1.0 },
        };
        (problem, exact)
    }

    fn max_error(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
    }

    fn tight_config() -> SolverConfig {
        SolverConfigBuilder::new()
            .tolerance(1e-10)
            .max_cycles(60)
            .build()
            .unwrap()
    }

    #[test]
    fn v_cycles_converge_with_monotone_residuals() {
        let (problem, _) = manufactured(17);
        let mut solver = MultigridSolver::new(tight_config());
        assert_eq!(solver.state(), SolverState::Uninitialized);
        let outcome = solver.solve_discrete(&problem, 4, CycleType::V, None).unwrap();
        assert!(outcome.converged);
        assert_eq!(solver.state(), SolverState::Converged);
        assert!(outcome.iterations < 30);
        for pair in outcome.residual_history.windows(2) {
            assert!(pair[1] < pair[0]);
        }
    }

    #[test]
    fn discretization_error_is_second_order() {
        let mut errors = Vec::new();
        for (n, levels) in [(17, 4), (33, 5)] {
            let (problem, exact) = manufactured(n);
            let mut solver = MultigridSolver::new(tight_config());
            let outcome = solver.solve_discrete(&problem, levels, CycleType::V, None).unwrap();
            errors.push(max_error(&outcome.values, &exact));
        }
        assert!(errors[0] / errors[1] > 3.0, "errors {:?}", errors);
    }

    #[test]
    fn w_cycles_and_jacobi_smoothing_also_converge() {
        let (problem, exact) = manufactured(17);
        let mut w_solver = MultigridSolver::new(tight_config());
        let w = w_solver.solve_discrete(&problem, 4, CycleType::W, None).unwrap();
        assert!(w.converged);

        let config = SolverConfigBuilder::new()
            .tolerance(1e-8)
            .max_cycles(200)
            .smoother(Smoother::WeightedJacobi)
            .smoothing(3, 3)
            .build()
            .unwrap();
        let mut jacobi = MultigridSolver::new(config);
        let j = jacobi.solve_discrete(&problem, 4, CycleType::V, None).unwrap();
        assert!(j.converged);
        assert!(max_error(&w.values, &exact) < 0.01);
        assert!(max_error(&j.values, &w.values) < 1e-5);
    }

    #[test]
    fn nonlinear_problem_converges_with_newton_iterations() {
        let n = 17;
        let topology = GridTopology::new([n; 3], [0.5; 3], [0.0; 3]);
        let len = topology.len();
        let mut source = vec![0.0; len];
        source[topology.index(8, 8, 8)] = 200.0;
        source[topology.index(6, 8, 8)] = -80.0;
        let ions = MobileIons::new(
            &[IonSpecies::new(1.0, 0.15, 2.0), IonSpecies::new(-1.0, 0.15, 2.0)],
            298.15,
        );
        let problem = DiscreteProblem {
            topology,
            dielectric: [vec![80.0; len], vec![80.0; len], vec![80.0; len]],
            accessibility: vec![1.0; len],
            source,
            boundary: vec![0.0; len],
            reaction: Reaction::Nonlinear(ions),
        };
        let mut solver = MultigridSolver::new(SolverConfigBuilder::new().tolerance(1e-8).build().unwrap());
        let outcome = solver.solve_discrete(&problem, 4, CycleType::V, None).unwrap();
        assert!(outcome.converged);
        assert!(outcome.values[topology.index(8, 8, 8)] > 0.0);
        let mut residual = vec![0.0; len];
        problem.residual(&outcome.values, &mut residual);
        assert!(norm(&residual) <= 1e-8 * norm(&problem.source) * 1.01);
    }

    #[test]
    fn exhausting_the_cycle_budget_reports_failure() {
        let (problem, _) = manufactured(17);
        let config = SolverConfigBuilder::new()
            .tolerance(1e-12)
            .max_cycles(2)
            .build()
            .unwrap();
        let mut solver = MultigridSolver::new(config);
        let outcome = solver.solve_discrete(&problem, 4, CycleType::V, None).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(solver.state(), SolverState::Failed);
    }

    #[test]
    fn zero_right_hand_side_converges_without_iterating() {
        let (mut problem, _) = manufactured(9);
        problem.source.iter_mut().for_each(|v| *v = 0.0);
        let mut solver = MultigridSolver::new(SolverConfig::default());
        let outcome = solver.solve_discrete(&problem, 3, CycleType::V, None).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.residual_history.is_empty());
    }

    #[test]
    fn invalid_level_count_is_a_configuration_error() {
        let (problem, _) = manufactured(17);
        let mut solver = MultigridSolver::new(SolverConfig::default());
        let result = solver.solve_discrete(&problem, 5, CycleType::V, None);
        assert!(matches!(result, Err(SolverError::Configuration { .. })));
        let result = solver.solve_discrete(&problem, 4, CycleType::V, Some(&[0.0; 10][..]));
        assert!(matches!(result, Err(SolverError::Configuration { .. })));
    }
}
