use super::{PreparedDeck, describe, prepare};
use crate::cli::RunArgs;
use crate::config::{ExternalMapPaths, GridOutput, Overrides, PlannedCalculation};
use crate::error::{CliError, Result};
use crate::io::dx::DxFile;
use crate::io::tables;
use crate::utils::progress::CliProgressHandler;
use pbmg::core::grid::GridField;
use pbmg::core::models::molecule::Molecule;
use pbmg::core::physics::constants::kt_to_kj_per_mol;
use pbmg::engine::config::{EnergyRequest, ForceRequest, GridParameters};
use pbmg::engine::mapping::{DielectricMap, FieldMaps};
use pbmg::engine::progress::ProgressReporter;
use pbmg::workflows::calculation::{Calculation, CalculationResult};
use pbmg::workflows::sequence::run_sequence;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Energy unit used in the printed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnergyUnit {
    KT,
    KjPerMol,
}

impl EnergyUnit {
    fn convert(self, energy_kt: f64, temperature: f64) -> f64 {
        match self {
            EnergyUnit::KT => energy_kt,
            EnergyUnit::KjPerMol => kt_to_kj_per_mol(energy_kt, temperature),
        }
    }

    fn label(self) -> &'static str {
        match self {
            EnergyUnit::KT => "kT",
            EnergyUnit::KjPerMol => "kJ/mol",
        }
    }
}

pub fn run(args: RunArgs, quiet: bool) -> Result<()> {
    let overrides = Overrides {
        max_cycles: args.max_cycles,
        tolerance: args.tolerance,
        set_values: args.set_values.clone(),
    };
    let PreparedDeck { molecules, plan } = prepare(&args.deck, &overrides)?;
    let unit = if args.kj {
        EnergyUnit::KjPerMol
    } else {
        EnergyUnit::KT
    };

    for (index, planned) in plan.calculations.iter().enumerate() {
        for line in describe(index, planned, &molecules).lines() {
            info!("{}", line);
        }
    }

    let calculations = plan
        .calculations
        .iter()
        .enumerate()
        .map(|(index, planned)| with_external_maps(index, planned))
        .collect::<Result<Vec<Calculation>>>()?;

    std::fs::create_dir_all(&args.output_dir)?;

    let progress_handler = if quiet {
        CliProgressHandler::hidden()
    } else {
        CliProgressHandler::new()
    };
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Running {} calculation(s)...", calculations.len());
    info!("Invoking the calculation sequence workflow...");
    let result = run_sequence(&molecules, &calculations, &reporter);
    progress_handler.finish();

    for (index, (planned, outcome)) in plan
        .calculations
        .iter()
        .zip(&result.outcomes)
        .enumerate()
    {
        match outcome {
            Ok(calc_result) => {
                print_result(index, planned, calc_result, unit);
                write_outputs(&args.output_dir, planned, calc_result, &molecules)?;
            }
            Err(e) => {
                println!("✗ Calculation {} ({}) failed: {}", index + 1, planned.label, e);
            }
        }
    }

    let totals: Vec<Option<f64>> = result
        .total_energies()
        .into_iter()
        .zip(&plan.calculations)
        .map(|(total, planned)| {
            total.map(|e| unit.convert(e, planned.calculation.pbe.temperature))
        })
        .collect();
    for (text, expression) in &plan.expressions {
        match expression.evaluate(&totals) {
            Some(energy) => println!("Energy [{}]: {:.6e} {}", text, energy, unit.label()),
            None => {
                warn!(
                    "Skipping energy expression '{}': a referenced calculation failed or computed no energy.",
                    text
                );
                println!("Energy [{}]: unavailable", text);
            }
        }
    }

    let failed = result.failed();
    if failed > 0 {
        return Err(CliError::CalculationsFailed {
            failed,
            total: result.outcomes.len(),
        });
    }
    Ok(())
}

fn with_external_maps(index: usize, planned: &PlannedCalculation) -> Result<Calculation> {
    let Some(paths) = &planned.external_maps else {
        return Ok(planned.calculation.clone());
    };
    info!(
        calculation = index + 1,
        "Loading externally supplied maps instead of mapping the molecule."
    );
    let maps = load_external_maps(paths, &planned.calculation.grid).map_err(|e| match e {
        CliError::Config(msg) => CliError::Config(format!("calculation {}: {}", index + 1, msg)),
        other => other,
    })?;
    Ok(planned.calculation.clone().with_external_maps(maps))
}

fn load_external_maps(paths: &ExternalMapPaths, grid: &GridParameters) -> Result<FieldMaps> {
    let read = |path: &PathBuf| -> Result<GridField> {
        DxFile::read_from_path(path).map_err(|e| CliError::FileParsing {
            path: path.clone(),
            source: e.into(),
        })
    };
    let dielectric = DielectricMap {
        x: read(&paths.dielectric_x)?,
        y: read(&paths.dielectric_y)?,
        z: read(&paths.dielectric_z)?,
    };
    let accessibility = read(&paths.accessibility)?;
    let charge = read(&paths.charge)?;
    FieldMaps::from_external(dielectric, accessibility, charge, grid)
        .map_err(|e| CliError::Config(e.to_string()))
}

fn print_result(
    index: usize,
    planned: &PlannedCalculation,
    result: &CalculationResult,
    unit: EnergyUnit,
) {
    let temperature = planned.calculation.pbe.temperature;
    println!(
        "✓ Calculation {} ({}) converged in {} cycle(s), relative residual {:.3e}",
        index + 1,
        planned.label,
        result.iterations,
        result.relative_residual
    );
    let Some(energies) = result.energies else {
        return;
    };
    let show = |name: &str, value: f64| {
        println!(
            "    {:<24}{:>16.6e} {}",
            name,
            unit.convert(value, temperature),
            unit.label()
        )
    };
    show("Total electrostatic", energies.total);
    if planned.calculation.pbe.energy == EnergyRequest::Components {
        show("Fixed charge", energies.fixed_charge);
        show("Mobile ion", energies.mobile_ion);
        show("Dielectric", energies.dielectric);
        show("Self energy", energies.self_energy);
    }
    if energies.nonpolar != 0.0 {
        show("Nonpolar", energies.nonpolar);
    }
}

fn write_outputs(
    dir: &Path,
    planned: &PlannedCalculation,
    result: &CalculationResult,
    molecules: &[Molecule],
) -> Result<()> {
    let atoms = molecules
        .get(result.molecule.0)
        .map(Molecule::atoms)
        .unwrap_or(&[]);

    if !result.atom_potentials.is_empty() {
        let path = dir.join(format!("{}-atoms.csv", planned.label));
        write_table(&path, |file| {
            tables::write_atom_table(
                file,
                atoms,
                &result.atom_potentials,
                &result.atom_energies,
            )
        })?;
    }

    if let Some(forces) = &result.forces {
        let components = planned.calculation.pbe.forces == ForceRequest::Components;
        let path = dir.join(format!("{}-forces.csv", planned.label));
        write_table(&path, |file| {
            tables::write_force_table(file, forces, components)
        })?;
        println!("    Forces written to {}", path.display());
    }

    for &output in &planned.writes {
        let Some(field) = grid_for(output, result) else {
            warn!(
                "Grid '{}' of calculation '{}' is not available; skipping.",
                output.tag(),
                planned.label
            );
            continue;
        };
        let path = dir.join(format!("{}-{}.dx", planned.label, output.tag()));
        let comment = format!("{} from calculation '{}'", output.description(), planned.label);
        DxFile::write_to_path(field, &comment, &path).map_err(|e| CliError::FileWriting {
            path: path.clone(),
            source: e.into(),
        })?;
        info!("Wrote {} to {:?}", output.description(), &path);
        println!("    {} written to {}", output.tag(), path.display());
    }
    Ok(())
}

fn grid_for(output: GridOutput, result: &CalculationResult) -> Option<&GridField> {
    match output {
        GridOutput::Potential => result.potential.as_ref().map(|p| p.field()),
        GridOutput::Charge => result.maps.as_ref().map(|m| &m.charge),
        GridOutput::Accessibility => result.maps.as_ref().map(|m| &m.accessibility),
        GridOutput::DielectricX => result.maps.as_ref().map(|m| &m.dielectric.x),
        GridOutput::DielectricY => result.maps.as_ref().map(|m| &m.dielectric.y),
        GridOutput::DielectricZ => result.maps.as_ref().map(|m| &m.dielectric.z),
    }
}

fn write_table<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(BufWriter<File>) -> csv::Result<()>,
{
    let to_error = |source: anyhow::Error| CliError::FileWriting {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|e| to_error(e.into()))?;
    write(BufWriter::new(file)).map_err(|e| to_error(e.into()))
}
