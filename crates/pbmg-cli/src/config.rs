mod defaults;

pub use defaults::DefaultsConfig;

use crate::error::{CliError, Result};
use pbmg::core::models::molecule::{Molecule, MoleculeId};
use pbmg::core::physics::ions::IonSpecies;
use pbmg::engine::config::{
    AtomDomainPolicy, BoundaryCondition, ChargeMethod, CycleType, EnergyRequest, Equation,
    ForceRequest, GridParameters, GridParametersBuilder, PbeParameters, PbeParametersBuilder,
    Smoother, SolverConfig, SolverConfigBuilder, SurfaceDefinition, SurfaceMethod,
};
use pbmg::workflows::calculation::Calculation;
use pbmg::workflows::expression::EnergyExpression;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IntoDeserializer};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct MoleculeEntry {
    pub path: PathBuf,
    pub name: Option<String>,
}

/// Grid written after a calculation.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GridOutput {
    #[serde(alias = "pot")]
    Potential,
    Charge,
    #[serde(alias = "kappa")]
    Accessibility,
    #[serde(alias = "dielx")]
    DielectricX,
    #[serde(alias = "diely")]
    DielectricY,
    #[serde(alias = "dielz")]
    DielectricZ,
}

impl GridOutput {
    pub fn tag(self) -> &'static str {
        match self {
            GridOutput::Potential => "pot",
            GridOutput::Charge => "charge",
            GridOutput::Accessibility => "kappa",
            GridOutput::DielectricX => "dielx",
            GridOutput::DielectricY => "diely",
            GridOutput::DielectricZ => "dielz",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GridOutput::Potential => "electrostatic potential (kT/e)",
            GridOutput::Charge => "charge density (e/A^3)",
            GridOutput::Accessibility => "ion accessibility",
            GridOutput::DielectricX => "x-shifted dielectric",
            GridOutput::DielectricY => "y-shifted dielectric",
            GridOutput::DielectricZ => "z-shifted dielectric",
        }
    }
}

/// OpenDX files replacing the mapped dielectric, accessibility and charge grids.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ExternalMapPaths {
    pub dielectric_x: PathBuf,
    pub dielectric_y: PathBuf,
    pub dielectric_z: PathBuf,
    pub accessibility: PathBuf,
    pub charge: PathBuf,
}

impl ExternalMapPaths {
    fn relative_to(self, base: &Path) -> Self {
        Self {
            dielectric_x: base.join(self.dielectric_x),
            dielectric_y: base.join(self.dielectric_y),
            dielectric_z: base.join(self.dielectric_z),
            accessibility: base.join(self.accessibility),
            charge: base.join(self.charge),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
enum PartialSpacing {
    Uniform(f64),
    PerAxis([f64; 3]),
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
enum PartialCenter {
    Point([f64; 3]),
    /// 1-based molecule id whose center is used.
    Molecule(usize),
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialGridConfig {
    dims: Option<[usize; 3]>,
    spacing: Option<PartialSpacing>,
    length: Option<[f64; 3]>,
    center: Option<PartialCenter>,
    levels: Option<usize>,
    boundary: Option<BoundaryCondition>,
    cycle: Option<CycleType>,
    charge_method: Option<ChargeMethod>,
    atom_policy: Option<AtomDomainPolicy>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPbeConfig {
    equation: Option<Equation>,
    temperature: Option<f64>,
    solute_dielectric: Option<f64>,
    solvent_dielectric: Option<f64>,
    ions: Option<Vec<IonSpecies>>,
    surface: Option<SurfaceMethod>,
    surface_window: Option<f64>,
    solvent_radius: Option<f64>,
    sphere_density: Option<f64>,
    surface_tension: Option<f64>,
    energy: Option<EnergyRequest>,
    forces: Option<ForceRequest>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSolverConfig {
    max_cycles: Option<usize>,
    tolerance: Option<f64>,
    pre_smoothing: Option<usize>,
    post_smoothing: Option<usize>,
    coarse_sweeps: Option<usize>,
    smoother: Option<Smoother>,
    jacobi_weight: Option<f64>,
    newton_inner_cycles: Option<usize>,
    newton_inner_tolerance: Option<f64>,
    line_search_steps: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialCalculation {
    name: Option<String>,
    /// 1-based molecule id.
    molecule: Option<usize>,
    /// 1-based id of an earlier calculation providing focusing boundary values.
    focus: Option<usize>,
    #[serde(default)]
    write: Vec<GridOutput>,
    #[serde(default)]
    grid: PartialGridConfig,
    #[serde(default)]
    pbe: PartialPbeConfig,
    #[serde(default)]
    solver: PartialSolverConfig,
    maps: Option<ExternalMapPaths>,
}

/// Command-line values that take precedence over the deck.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub max_cycles: Option<usize>,
    pub tolerance: Option<f64>,
    pub set_values: Vec<String>,
}

/// One calculation of the deck, resolved and ready to run.
#[derive(Debug, Clone)]
pub struct PlannedCalculation {
    pub label: String,
    pub calculation: Calculation,
    pub writes: Vec<GridOutput>,
    pub external_maps: Option<ExternalMapPaths>,
}

#[derive(Debug, Clone)]
pub struct RunPlan {
    pub calculations: Vec<PlannedCalculation>,
    pub expressions: Vec<(String, EnergyExpression)>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialDeck {
    /// Energy expressions over 1-based calculation ids, e.g. `"1 - 2 - 3"`.
    #[serde(default)]
    print: Vec<String>,
    #[serde(default)]
    molecules: Vec<MoleculeEntry>,
    #[serde(default)]
    calculations: Vec<PartialCalculation>,
}

impl FromStr for PartialDeck {
    type Err = toml::de::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        toml::from_str(content)
    }
}

impl PartialDeck {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading input deck from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        content.parse().map_err(|e: toml::de::Error| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Molecule entries with their paths resolved against `base`.
    pub fn molecule_entries(&self, base: &Path) -> Vec<MoleculeEntry> {
        self.molecules
            .iter()
            .map(|m| MoleculeEntry {
                path: base.join(&m.path),
                name: m.name.clone(),
            })
            .collect()
    }

    pub fn merge_with_cli(
        mut self,
        overrides: &Overrides,
        molecules: &[Molecule],
        base: &Path,
    ) -> Result<RunPlan> {
        if self.calculations.is_empty() {
            return Err(CliError::Config(
                "The deck defines no [[calculations]].".to_string(),
            ));
        }
        self.apply_set_values(&overrides.set_values)?;

        let defaults = DefaultsConfig::default();
        let count = self.calculations.len();
        let mut planned = Vec::with_capacity(count);
        for (index, partial) in self.calculations.into_iter().enumerate() {
            let plan = Self::resolve_calculation(
                partial, index, overrides, molecules, base, &defaults,
            )
            .map_err(|e| match e {
                CliError::Config(msg) => {
                    CliError::Config(format!("calculation {}: {}", index + 1, msg))
                }
                other => other,
            })?;
            planned.push(plan);
        }

        let mut expressions = Vec::with_capacity(self.print.len());
        for text in self.print {
            let expression: EnergyExpression = text
                .parse()
                .map_err(|e| CliError::Config(format!("print '{}': {}", text, e)))?;
            if let Some(bad) = expression.calculations().find(|&i| i >= count) {
                return Err(CliError::Config(format!(
                    "print '{}' references calculation {} but the deck defines {}",
                    text,
                    bad + 1,
                    count
                )));
            }
            expressions.push((text, expression));
        }

        Ok(RunPlan {
            calculations: planned,
            expressions,
        })
    }

    fn resolve_calculation(
        partial: PartialCalculation,
        index: usize,
        overrides: &Overrides,
        molecules: &[Molecule],
        base: &Path,
        defaults: &DefaultsConfig,
    ) -> Result<PlannedCalculation> {
        let molecule_id = partial.molecule.unwrap_or(1);
        let molecule = molecule_id
            .checked_sub(1)
            .and_then(|i| molecules.get(i))
            .ok_or_else(|| {
                CliError::Config(format!(
                    "molecule {} does not exist ({} loaded)",
                    molecule_id,
                    molecules.len()
                ))
            })?;

        let focus_parent = match partial.focus {
            Some(parent) if parent == 0 || parent > index => {
                return Err(CliError::Config(format!(
                    "focus must name an earlier calculation, got {}",
                    parent
                )));
            }
            Some(parent) => Some(parent - 1),
            None => None,
        };

        let grid = Self::resolve_grid(&partial.grid, molecule, molecules, focus_parent, defaults)?;
        let pbe = Self::resolve_pbe(&partial.pbe, defaults)?;
        let solver = Self::resolve_solver(&partial.solver, overrides, defaults)?;

        let label = partial
            .name
            .clone()
            .unwrap_or_else(|| format!("calc{}", index + 1));
        let mut calculation = Calculation::new(MoleculeId(molecule_id - 1), grid, pbe, solver);
        if let Some(name) = partial.name {
            calculation = calculation.with_name(name);
        }
        if let Some(parent) = focus_parent {
            calculation = calculation.focused_on(parent);
        }
        if !partial.write.is_empty() {
            calculation = calculation.retaining_grids();
        }

        Ok(PlannedCalculation {
            label,
            calculation,
            writes: partial.write,
            external_maps: partial.maps.map(|m| m.relative_to(base)),
        })
    }

    fn resolve_grid(
        partial: &PartialGridConfig,
        molecule: &Molecule,
        molecules: &[Molecule],
        focus_parent: Option<usize>,
        defaults: &DefaultsConfig,
    ) -> Result<GridParameters> {
        let dims = partial.dims.unwrap_or(defaults.dims);
        let spacing = match (partial.spacing, partial.length) {
            (Some(_), Some(_)) => {
                return Err(CliError::Config(
                    "grid takes either `spacing` or `length`, not both".to_string(),
                ));
            }
            (Some(PartialSpacing::Uniform(h)), None) => [h; 3],
            (Some(PartialSpacing::PerAxis(h)), None) => h,
            (None, Some(length)) => {
                if dims.iter().any(|&n| n < 2) {
                    return Err(CliError::Config(format!(
                        "grid dimensions {:?} cannot span a length",
                        dims
                    )));
                }
                std::array::from_fn(|d| length[d] / (dims[d] - 1) as f64)
            }
            (None, None) => {
                return Err(CliError::Config(
                    "grid requires `spacing` or `length`".to_string(),
                ));
            }
        };
        let center = match partial.center {
            Some(PartialCenter::Point(point)) => point,
            Some(PartialCenter::Molecule(id)) => {
                let m = id.checked_sub(1).and_then(|i| molecules.get(i)).ok_or_else(|| {
                    CliError::Config(format!("grid center refers to missing molecule {}", id))
                })?;
                center_of(m)
            }
            None => center_of(molecule),
        };
        let boundary = match (focus_parent, partial.boundary) {
            (Some(_), None) | (Some(_), Some(BoundaryCondition::Focus)) => BoundaryCondition::Focus,
            (Some(_), Some(other)) => {
                return Err(CliError::Config(format!(
                    "a focusing calculation needs the focus boundary, not {:?}",
                    other
                )));
            }
            (None, Some(BoundaryCondition::Focus)) => {
                return Err(CliError::Config(
                    "the focus boundary requires `focus` to name a parent calculation".to_string(),
                ));
            }
            (None, Some(other)) => other,
            (None, None) => defaults.boundary,
        };

        let mut builder = GridParametersBuilder::new()
            .dims(dims)
            .spacing(spacing)
            .center(center)
            .boundary(boundary)
            .cycle(partial.cycle.unwrap_or_default())
            .charge_method(partial.charge_method.unwrap_or(defaults.charge_method));
        if let Some(levels) = partial.levels {
            builder = builder.levels(levels);
        }
        if let Some(policy) = partial.atom_policy {
            builder = builder.atom_policy(policy);
        }
        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn resolve_pbe(partial: &PartialPbeConfig, defaults: &DefaultsConfig) -> Result<PbeParameters> {
        let surface = SurfaceDefinition {
            method: partial.surface.unwrap_or(defaults.surface),
            smoothing_window: partial.surface_window.unwrap_or(defaults.surface_window),
            solvent_radius: partial.solvent_radius.unwrap_or(defaults.solvent_radius),
            sphere_density: partial.sphere_density.unwrap_or(defaults.sphere_density),
        };
        PbeParametersBuilder::new()
            .equation(partial.equation.unwrap_or(defaults.equation))
            .temperature(partial.temperature.unwrap_or(defaults.temperature))
            .solute_dielectric(partial.solute_dielectric.unwrap_or(defaults.solute_dielectric))
            .solvent_dielectric(
                partial
                    .solvent_dielectric
                    .unwrap_or(defaults.solvent_dielectric),
            )
            .ions(partial.ions.clone().unwrap_or_default())
            .surface(surface)
            .surface_tension(partial.surface_tension.unwrap_or(defaults.surface_tension))
            .energy(partial.energy.unwrap_or_default())
            .forces(partial.forces.unwrap_or_default())
            .build()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    fn resolve_solver(
        partial: &PartialSolverConfig,
        overrides: &Overrides,
        defaults: &DefaultsConfig,
    ) -> Result<SolverConfig> {
        let base = SolverConfig::default();
        SolverConfigBuilder::new()
            .max_cycles(
                overrides
                    .max_cycles
                    .or(partial.max_cycles)
                    .unwrap_or(defaults.max_cycles),
            )
            .tolerance(
                overrides
                    .tolerance
                    .or(partial.tolerance)
                    .unwrap_or(defaults.tolerance),
            )
            .smoothing(
                partial.pre_smoothing.unwrap_or(base.pre_smoothing),
                partial.post_smoothing.unwrap_or(base.post_smoothing),
            )
            .coarse_sweeps(partial.coarse_sweeps.unwrap_or(base.coarse_sweeps))
            .smoother(partial.smoother.unwrap_or(base.smoother))
            .jacobi_weight(partial.jacobi_weight.unwrap_or(base.jacobi_weight))
            .newton(
                partial.newton_inner_cycles.unwrap_or(base.newton_inner_cycles),
                partial
                    .newton_inner_tolerance
                    .unwrap_or(base.newton_inner_tolerance),
            )
            .line_search_steps(partial.line_search_steps.unwrap_or(base.line_search_steps))
            .build()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;
            let (key, value) = (key.trim(), value.trim());
            for calc in &mut self.calculations {
                calc.apply_set(key, value)?;
            }
        }
        Ok(())
    }
}

impl PartialCalculation {
    fn apply_set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "grid.levels" => self.grid.levels = Some(parse_number(key, value)?),
            "grid.boundary" => self.grid.boundary = Some(parse_keyword(key, value)?),
            "grid.cycle" => self.grid.cycle = Some(parse_keyword(key, value)?),
            "grid.charge-method" => self.grid.charge_method = Some(parse_keyword(key, value)?),
            "pbe.equation" => self.pbe.equation = Some(parse_keyword(key, value)?),
            "pbe.temperature" => self.pbe.temperature = Some(parse_number(key, value)?),
            "pbe.solute-dielectric" => {
                self.pbe.solute_dielectric = Some(parse_number(key, value)?)
            }
            "pbe.solvent-dielectric" => {
                self.pbe.solvent_dielectric = Some(parse_number(key, value)?)
            }
            "pbe.surface" => self.pbe.surface = Some(parse_keyword(key, value)?),
            "pbe.surface-window" => self.pbe.surface_window = Some(parse_number(key, value)?),
            "pbe.surface-tension" => self.pbe.surface_tension = Some(parse_number(key, value)?),
            "pbe.energy" => self.pbe.energy = Some(parse_keyword(key, value)?),
            "pbe.forces" => self.pbe.forces = Some(parse_keyword(key, value)?),
            "solver.max-cycles" => self.solver.max_cycles = Some(parse_number(key, value)?),
            "solver.tolerance" => self.solver.tolerance = Some(parse_number(key, value)?),
            "solver.smoother" => self.solver.smoother = Some(parse_keyword(key, value)?),
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

fn center_of(molecule: &Molecule) -> [f64; 3] {
    let c = molecule.center();
    [c.x, c.y, c.z]
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid numeric value for {}: {}", key, value)))
}

fn parse_keyword<T: DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    let deserializer: serde::de::value::StrDeserializer<'_, serde::de::value::Error> =
        value.into_deserializer();
    T::deserialize(deserializer)
        .map_err(|e| CliError::Config(format!("Invalid value for {}: {}", key, e)))
}
