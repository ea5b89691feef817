pub mod check;
pub mod run;

use crate::config::{Overrides, PartialDeck, PlannedCalculation, RunPlan};
use crate::error::{CliError, Result};
use crate::io::pqr::PqrFile;
use pbmg::core::models::molecule::Molecule;
use pbmg::engine::config::{ChargeMethod, SurfaceMethod};
use std::fmt::Write;
use std::path::Path;
use tracing::info;

/// Molecules and resolved calculations of one input deck.
pub struct PreparedDeck {
    pub molecules: Vec<Molecule>,
    pub plan: RunPlan,
}

pub fn prepare(deck_path: &Path, overrides: &Overrides) -> Result<PreparedDeck> {
    let deck = PartialDeck::from_file(deck_path)?;
    let base = deck_path.parent().unwrap_or_else(|| Path::new("."));

    let entries = deck.molecule_entries(base);
    if entries.is_empty() {
        return Err(CliError::Config(
            "The deck defines no [[molecules]].".to_string(),
        ));
    }
    let mut molecules = Vec::with_capacity(entries.len());
    for entry in entries {
        info!("Reading molecule from {:?}", &entry.path);
        let mut molecule =
            PqrFile::read_from_path(&entry.path).map_err(|e| CliError::FileParsing {
                path: entry.path.clone(),
                source: e.into(),
            })?;
        if let Some(name) = entry.name {
            molecule.name = name;
        }
        info!(
            atoms = molecule.len(),
            charge = molecule.total_charge(),
            "Loaded molecule '{}'.",
            molecule.name
        );
        molecules.push(molecule);
    }

    info!("Merging configuration from deck and CLI arguments...");
    let plan = deck.merge_with_cli(overrides, &molecules, base)?;
    Ok(PreparedDeck { molecules, plan })
}

/// Human-readable echo of the resolved grid and PBE parameters of one calculation.
pub fn describe(index: usize, planned: &PlannedCalculation, molecules: &[Molecule]) -> String {
    let calc = &planned.calculation;
    let grid = &calc.grid;
    let pbe = &calc.pbe;
    let solver = &calc.solver;
    let molecule = molecules
        .get(calc.molecule.0)
        .map(|m| m.name.as_str())
        .unwrap_or("?");
    let topology = grid.topology();
    let upper = topology.upper_corner();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Calculation {} '{}' on molecule {} '{}'",
        index + 1,
        planned.label,
        calc.molecule.0 + 1,
        molecule
    );
    let _ = writeln!(
        out,
        "  Grid dimensions:        {} x {} x {} ({} levels, {:?}-cycle)",
        grid.dims[0], grid.dims[1], grid.dims[2], grid.levels, grid.cycle
    );
    let _ = writeln!(
        out,
        "  Grid spacing:           {:.3} x {:.3} x {:.3} A",
        grid.spacing[0], grid.spacing[1], grid.spacing[2]
    );
    let _ = writeln!(
        out,
        "  Grid lengths:           {:.3} x {:.3} x {:.3} A",
        upper[0] - topology.origin[0],
        upper[1] - topology.origin[1],
        upper[2] - topology.origin[2]
    );
    let _ = writeln!(
        out,
        "  Grid center:            ({:.3}, {:.3}, {:.3})",
        grid.center[0], grid.center[1], grid.center[2]
    );
    let _ = writeln!(out, "  Boundary condition:     {:?}", grid.boundary);
    if let Some(parent) = calc.focus_parent {
        let _ = writeln!(out, "  Focusing on:            calculation {}", parent + 1);
    }
    let _ = writeln!(
        out,
        "  Charge discretization:  {}",
        match grid.charge_method {
            ChargeMethod::Trilinear => "trilinear",
            ChargeMethod::CubicBSpline => "cubic B-spline",
        }
    );
    let _ = writeln!(out, "  Equation:               {:?}", pbe.equation);
    let _ = writeln!(out, "  Temperature:            {:.2} K", pbe.temperature);
    let _ = writeln!(
        out,
        "  Dielectrics:            solute {:.3}, solvent {:.3}",
        pbe.solute_dielectric, pbe.solvent_dielectric
    );
    for ion in &pbe.ions {
        let _ = writeln!(
            out,
            "  Ion species:            charge {:+.1}, {:.4} M, radius {:.3} A",
            ion.charge, ion.concentration, ion.radius
        );
    }
    let surface = &pbe.surface;
    let _ = writeln!(
        out,
        "  Surface:                {} (probe {:.3} A, window {:.3} A, {:.1} pts/A^2)",
        match surface.method {
            SurfaceMethod::Molecular => "molecular",
            SurfaceMethod::SmoothedMolecular => "smoothed molecular",
            SurfaceMethod::Spline => "spline",
        },
        surface.solvent_radius,
        surface.smoothing_window,
        surface.sphere_density
    );
    if pbe.surface_tension != 0.0 {
        let _ = writeln!(
            out,
            "  Surface tension:        {:.5} kJ/mol/A^2",
            pbe.surface_tension
        );
    }
    let _ = writeln!(
        out,
        "  Solver:                 {:?}, {} + {} sweeps, tolerance {:.1e}, at most {} cycles",
        solver.smoother,
        solver.pre_smoothing,
        solver.post_smoothing,
        solver.tolerance,
        solver.max_cycles
    );
    let _ = writeln!(
        out,
        "  Requested output:       energy {:?}, forces {:?}",
        pbe.energy, pbe.forces
    );
    if let Some(maps) = &planned.external_maps {
        let _ = writeln!(out, "  External charge map:    {:?}", maps.charge);
    }
    out
}
