use super::calculation::{self, Calculation, CalculationResult};
use crate::core::grid::GridField;
use crate::core::models::molecule::Molecule;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub type CalculationOutcome = Result<CalculationResult, EngineError>;

/// Outcomes of a sequence, in calculation order.
#[derive(Debug)]
pub struct SequenceResult {
    pub outcomes: Vec<CalculationOutcome>,
}

impl SequenceResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Total energy of each calculation, `None` where it failed or computed no energy.
    pub fn total_energies(&self) -> Vec<Option<f64>> {
        self.outcomes
            .iter()
            .map(|o| o.as_ref().ok().and_then(CalculationResult::total_energy))
            .collect()
    }
}

/// Runs `calculations` in order, isolating failures.
///
/// A calculation that fails is recorded and the sequence continues; calculations that focus
/// on it fail in turn. Without focusing dependencies the calculations are independent and,
/// with the `parallel` feature, run concurrently.
#[instrument(skip_all, name = "calculation_sequence")]
pub fn run_sequence(
    molecules: &[Molecule],
    calculations: &[Calculation],
    reporter: &ProgressReporter,
) -> SequenceResult {
    info!(
        calculations = calculations.len(),
        molecules = molecules.len(),
        "Starting calculation sequence."
    );
    let last_child = last_children(calculations);

    let outcomes = if last_child.is_empty() {
        run_independent(molecules, calculations, reporter)
    } else {
        run_in_order(molecules, calculations, &last_child, reporter)
    };

    let result = SequenceResult { outcomes };
    info!(
        succeeded = result.succeeded(),
        failed = result.failed(),
        "Calculation sequence finished."
    );
    result
}

fn run_independent(
    molecules: &[Molecule],
    calculations: &[Calculation],
    reporter: &ProgressReporter,
) -> Vec<CalculationOutcome> {
    reporter.report(Progress::TaskStart {
        total_steps: calculations.len() as u64,
    });

    #[cfg(feature = "parallel")]
    let iterator = calculations.par_iter().enumerate();
    #[cfg(not(feature = "parallel"))]
    let iterator = calculations.iter().enumerate();

    let outcomes = iterator
        .map(|(index, calc)| {
            let silent = ProgressReporter::new();
            let outcome = calculation::run(calc, molecules, None, &silent).map(|mut result| {
                if !calc.retain_grids {
                    result.release_grids();
                }
                result
            });
            log_outcome(index, &outcome);
            reporter.report(Progress::TaskIncrement);
            outcome
        })
        .collect();
    reporter.report(Progress::TaskFinish);
    outcomes
}

fn run_in_order(
    molecules: &[Molecule],
    calculations: &[Calculation],
    last_child: &HashMap<usize, usize>,
    reporter: &ProgressReporter,
) -> Vec<CalculationOutcome> {
    let mut outcomes: Vec<CalculationOutcome> = Vec::with_capacity(calculations.len());
    for (index, calc) in calculations.iter().enumerate() {
        reporter.report(Progress::Message(format!(
            "Calculation {} of {}",
            index + 1,
            calculations.len()
        )));
        let outcome = match calc.focus_parent {
            Some(parent) => match focus_field(&outcomes, index, parent) {
                Ok(field) => calculation::run(calc, molecules, Some(field), reporter),
                Err(error) => Err(error),
            },
            None => calculation::run(calc, molecules, None, reporter),
        };
        let awaited = last_child.get(&index).is_some_and(|&child| child > index);
        let outcome = outcome.map(|mut result| {
            if !calc.retain_grids && !awaited {
                result.release_grids();
            }
            result
        });
        log_outcome(index, &outcome);
        outcomes.push(outcome);

        for (&parent, &child) in last_child {
            if child != index || parent >= index || calculations[parent].retain_grids {
                continue;
            }
            if let Some(Ok(result)) = outcomes.get_mut(parent) {
                result.release_grids();
                debug!(calculation = parent + 1, "Released grids of focus parent.");
            }
        }
    }
    outcomes
}

/// Index of the last calculation focusing on each parent.
fn last_children(calculations: &[Calculation]) -> HashMap<usize, usize> {
    let mut last = HashMap::new();
    for (index, calc) in calculations.iter().enumerate() {
        if let Some(parent) = calc.focus_parent {
            last.insert(parent, index);
        }
    }
    last
}

fn focus_field(
    outcomes: &[CalculationOutcome],
    calculation: usize,
    parent: usize,
) -> Result<&GridField, EngineError> {
    let failure = |reason| EngineError::FocusParent {
        calculation: calculation + 1,
        parent: parent + 1,
        reason,
    };
    match outcomes.get(parent) {
        None => Err(failure("has not run yet")),
        Some(Err(_)) => Err(failure("failed")),
        Some(Ok(result)) => result
            .potential
            .as_ref()
            .map(|p| p.field())
            .ok_or_else(|| failure("did not keep its potential")),
    }
}

fn log_outcome(index: usize, outcome: &CalculationOutcome) {
    match outcome {
        Ok(result) => info!(
            calculation = index + 1,
            iterations = result.iterations,
            "Calculation succeeded."
        ),
        Err(e) if e.is_configuration() => {
            error!(calculation = index + 1, error = %e, "Calculation is misconfigured.")
        }
        Err(e) => warn!(calculation = index + 1, error = %e, "Calculation failed."),
    }
}
