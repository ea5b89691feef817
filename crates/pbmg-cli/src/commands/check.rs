use super::{PreparedDeck, describe, prepare};
use crate::cli::CheckArgs;
use crate::config::Overrides;
use crate::error::Result;
use pbmg::core::grid::GridTopology;
use tracing::info;

/// Bytes per grid value (f64).
const VALUE_BYTES: usize = 8;
/// Fine-grid arrays held by a calculation: three dielectric components, accessibility,
/// charge, potential and the solver work vectors.
const FINE_GRID_ARRAYS: usize = 10;

pub fn run(args: CheckArgs) -> Result<()> {
    let overrides = Overrides {
        set_values: args.set_values.clone(),
        ..Default::default()
    };
    let PreparedDeck { molecules, plan } = prepare(&args.deck, &overrides)?;

    for (index, planned) in plan.calculations.iter().enumerate() {
        print!("{}", describe(index, planned, &molecules));
        let topology = planned.calculation.grid.topology();
        println!(
            "  Estimated memory:       {:.1} MiB",
            estimated_bytes(&topology) as f64 / (1024.0 * 1024.0)
        );
        if let Some(molecule) = molecules.get(planned.calculation.molecule.0) {
            let outside = molecule
                .atoms()
                .iter()
                .filter(|atom| !topology.contains(&atom.coords(), 0.0))
                .count();
            if outside > 0 {
                println!(
                    "  Warning: {} atom(s) lie outside this grid ({:?} policy).",
                    outside, planned.calculation.grid.atom_policy.action
                );
            }
        }
    }
    for (text, _) in &plan.expressions {
        println!("Energy expression: {}", text);
    }
    info!(
        calculations = plan.calculations.len(),
        molecules = molecules.len(),
        "Input deck is valid."
    );
    Ok(())
}

/// Rough working-set size of one calculation: the fine-grid arrays plus the coarser levels,
/// which add at most one seventh of the fine grid.
fn estimated_bytes(topology: &GridTopology) -> usize {
    let fine = topology.len() * VALUE_BYTES * FINE_GRID_ARRAYS;
    fine + fine / 7
}
