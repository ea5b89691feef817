use crate::core::grid::GridTopology;
use crate::core::physics::constants::{coulomb_length, kj_per_mol_to_kt};
use crate::core::physics::ions::{IonSpecies, MobileIons, max_ion_radius};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter combination: {0}")]
    InvalidCombination(String),

    #[error("The {map} map has dimensions {found:?} but the grid expects {expected:?}")]
    IncompatibleMap {
        map: &'static str,
        expected: [usize; 3],
        found: [usize; 3],
    },

    #[error("The {map} map does not share the grid spacing/origin of the calculation")]
    MisplacedMap { map: &'static str },
}

/// Values imposed on the boundary nodes of the finest grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryCondition {
    /// Homogeneous Dirichlet boundary.
    Zero,
    /// One Debye-Hückel sphere carrying the whole molecule charge.
    #[serde(alias = "sdh")]
    SingleDebyeHuckel,
    /// One Debye-Hückel sphere per atom.
    #[default]
    #[serde(alias = "mdh")]
    MultipleDebyeHuckel,
    /// Interpolated from a previously solved, enclosing potential.
    Focus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleType {
    #[default]
    V,
    W,
}

impl CycleType {
    /// Number of recursive coarse-grid visits per level.
    pub fn gamma(self) -> usize {
        match self {
            CycleType::V => 1,
            CycleType::W => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargeMethod {
    /// Trilinear assignment to the eight surrounding nodes.
    #[serde(alias = "spl0")]
    Trilinear,
    /// Cubic B-spline assignment to the surrounding 4x4x4 nodes.
    #[default]
    #[serde(alias = "spl2")]
    CubicBSpline,
}

impl ChargeMethod {
    /// Nodes covered per axis by one atom.
    pub fn support(self) -> usize {
        match self {
            ChargeMethod::Trilinear => 2,
            ChargeMethod::CubicBSpline => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AtomDomainAction {
    #[default]
    Fail,
    Clip,
}

/// How charge mapping treats atoms outside the grid bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AtomDomainPolicy {
    pub action: AtomDomainAction,
    /// Distance (Å) an atom may stray outside the box before the policy applies.
    pub margin: f64,
}

impl Default for AtomDomainPolicy {
    fn default() -> Self {
        Self {
            action: AtomDomainAction::Fail,
            margin: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridParameters {
    pub dims: [usize; 3],
    pub spacing: [f64; 3],
    pub center: [f64; 3],
    pub levels: usize,
    pub boundary: BoundaryCondition,
    pub cycle: CycleType,
    pub charge_method: ChargeMethod,
    pub atom_policy: AtomDomainPolicy,
}

impl GridParameters {
    pub fn topology(&self) -> GridTopology {
        GridTopology::centered(self.dims, self.spacing, self.center)
    }

    /// Largest number of levels the dimensions allow with a coarsest grid of at least 3 nodes.
    pub fn max_levels(dims: [usize; 3]) -> usize {
        let mut levels = 1;
        let mut current = dims;
        while current.iter().all(|&n| n >= 5 && (n - 1) % 2 == 0) {
            current = current.map(|n| (n - 1) / 2 + 1);
            levels += 1;
        }
        levels
    }

    /// Checks that the dimensions coarsen cleanly through `levels` levels.
    pub fn check_levels(dims: [usize; 3], levels: usize) -> Result<(), ConfigError> {
        if levels == 0 {
            return Err(ConfigError::InvalidCombination(
                "at least one multigrid level is required".to_string(),
            ));
        }
        let factor = 1usize << (levels - 1);
        for (axis, &n) in dims.iter().enumerate() {
            if n < 3 || (n - 1) % factor != 0 || (n - 1) / factor < 2 {
                return Err(ConfigError::InvalidCombination(format!(
                    "dimension {} along axis {} cannot be coarsened through {} levels \
                     (need n = c * 2^{} + 1 with c >= 2)",
                    n,
                    axis,
                    levels,
                    levels - 1
                )));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct GridParametersBuilder {
    dims: Option<[usize; 3]>,
    spacing: Option<[f64; 3]>,
    center: Option<[f64; 3]>,
    levels: Option<usize>,
    boundary: Option<BoundaryCondition>,
    cycle: Option<CycleType>,
    charge_method: Option<ChargeMethod>,
    atom_policy: Option<AtomDomainPolicy>,
}

impl GridParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dims(mut self, dims: [usize; 3]) -> Self {
        self.dims = Some(dims);
        self
    }
    pub fn spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = Some(spacing);
        self
    }
    pub fn uniform_spacing(self, h: f64) -> Self {
        self.spacing([h; 3])
    }
    pub fn center(mut self, center: [f64; 3]) -> Self {
        self.center = Some(center);
        self
    }
    pub fn levels(mut self, levels: usize) -> Self {
        self.levels = Some(levels);
        self
    }
    pub fn boundary(mut self, boundary: BoundaryCondition) -> Self {
        self.boundary = Some(boundary);
        self
    }
    pub fn cycle(mut self, cycle: CycleType) -> Self {
        self.cycle = Some(cycle);
        self
    }
    pub fn charge_method(mut self, method: ChargeMethod) -> Self {
        self.charge_method = Some(method);
        self
    }
    pub fn atom_policy(mut self, policy: AtomDomainPolicy) -> Self {
        self.atom_policy = Some(policy);
        self
    }

    /// Builds the parameters; `levels` defaults to the deepest hierarchy the dimensions allow.
    pub fn build(self) -> Result<GridParameters, ConfigError> {
        let dims = self.dims.ok_or(ConfigError::MissingParameter("dims"))?;
        let spacing = self.spacing.ok_or(ConfigError::MissingParameter("spacing"))?;
        let center = self.center.ok_or(ConfigError::MissingParameter("center"))?;
        if spacing.iter().any(|&h| !(h > 0.0)) {
            return Err(ConfigError::InvalidCombination(format!(
                "grid spacing must be positive, got {:?}",
                spacing
            )));
        }
        let levels = self
            .levels
            .unwrap_or_else(|| GridParameters::max_levels(dims));
        GridParameters::check_levels(dims, levels)?;
        Ok(GridParameters {
            dims,
            spacing,
            center,
            levels,
            boundary: self.boundary.unwrap_or_default(),
            cycle: self.cycle.unwrap_or_default(),
            charge_method: self.charge_method.unwrap_or_default(),
            atom_policy: self.atom_policy.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Equation {
    #[default]
    #[serde(alias = "lpbe")]
    Linear,
    #[serde(alias = "npbe")]
    Nonlinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SurfaceMethod {
    /// Sharp solvent-excluded surface.
    #[serde(alias = "mol")]
    Molecular,
    /// Solvent-excluded surface with harmonically averaged face dielectrics.
    #[serde(alias = "smol")]
    SmoothedMolecular,
    /// Cubic-spline smoothed van der Waals surface.
    #[default]
    #[serde(alias = "spl2")]
    Spline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDefinition {
    pub method: SurfaceMethod,
    /// Half-width (Å) of the spline transition region.
    pub smoothing_window: f64,
    /// Solvent probe radius (Å).
    pub solvent_radius: f64,
    /// Sphere points per Å² used for surface construction.
    pub sphere_density: f64,
}

impl Default for SurfaceDefinition {
    fn default() -> Self {
        Self {
            method: SurfaceMethod::Spline,
            smoothing_window: 0.3,
            solvent_radius: 1.4,
            sphere_density: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnergyRequest {
    #[default]
    #[serde(alias = "no")]
    None,
    Total,
    #[serde(alias = "comps")]
    Components,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForceRequest {
    #[default]
    #[serde(alias = "no")]
    None,
    Total,
    #[serde(alias = "comps")]
    Components,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PbeParameters {
    /// Temperature in K.
    pub temperature: f64,
    pub solute_dielectric: f64,
    pub solvent_dielectric: f64,
    pub ions: Vec<IonSpecies>,
    pub equation: Equation,
    pub surface: SurfaceDefinition,
    /// Apolar surface tension in kJ/(mol·Å²).
    pub surface_tension: f64,
    pub energy: EnergyRequest,
    pub forces: ForceRequest,
}

impl PbeParameters {
    pub fn coulomb_length(&self) -> f64 {
        coulomb_length(self.temperature)
    }

    pub fn mobile_ions(&self) -> MobileIons {
        MobileIons::new(&self.ions, self.temperature)
    }

    /// Thickness of the ion-exclusion layer added to every atomic radius.
    pub fn ion_exclusion_radius(&self) -> f64 {
        max_ion_radius(&self.ions)
    }

    /// Surface tension in kT/Å².
    pub fn surface_tension_kt(&self) -> f64 {
        kj_per_mol_to_kt(self.surface_tension, self.temperature)
    }
}

#[derive(Default)]
pub struct PbeParametersBuilder {
    temperature: Option<f64>,
    solute_dielectric: Option<f64>,
    solvent_dielectric: Option<f64>,
    ions: Vec<IonSpecies>,
    equation: Option<Equation>,
    surface: Option<SurfaceDefinition>,
    surface_tension: Option<f64>,
    energy: Option<EnergyRequest>,
    forces: Option<ForceRequest>,
}

impl PbeParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn solute_dielectric(mut self, eps: f64) -> Self {
        self.solute_dielectric = Some(eps);
        self
    }
    pub fn solvent_dielectric(mut self, eps: f64) -> Self {
        self.solvent_dielectric = Some(eps);
        self
    }
    pub fn ion(mut self, species: IonSpecies) -> Self {
        self.ions.push(species);
        self
    }
    pub fn ions(mut self, species: Vec<IonSpecies>) -> Self {
        self.ions = species;
        self
    }
    pub fn equation(mut self, equation: Equation) -> Self {
        self.equation = Some(equation);
        self
    }
    pub fn surface(mut self, surface: SurfaceDefinition) -> Self {
        self.surface = Some(surface);
        self
    }
    pub fn surface_tension(mut self, gamma: f64) -> Self {
        self.surface_tension = Some(gamma);
        self
    }
    pub fn energy(mut self, request: EnergyRequest) -> Self {
        self.energy = Some(request);
        self
    }
    pub fn forces(mut self, request: ForceRequest) -> Self {
        self.forces = Some(request);
        self
    }

    pub fn build(self) -> Result<PbeParameters, ConfigError> {
        let temperature = self
            .temperature
            .ok_or(ConfigError::MissingParameter("temperature"))?;
        if !(temperature > 0.0) {
            return Err(ConfigError::InvalidCombination(format!(
                "temperature must be positive, got {}",
                temperature
            )));
        }
        let surface = self.surface.unwrap_or_default();
        if surface.smoothing_window < 0.0 || surface.solvent_radius < 0.0 {
            return Err(ConfigError::InvalidCombination(
                "surface window and probe radius must be non-negative".to_string(),
            ));
        }
        Ok(PbeParameters {
            temperature,
            solute_dielectric: self
                .solute_dielectric
                .ok_or(ConfigError::MissingParameter("solute_dielectric"))?,
            solvent_dielectric: self
                .solvent_dielectric
                .ok_or(ConfigError::MissingParameter("solvent_dielectric"))?,
            ions: self.ions,
            equation: self.equation.unwrap_or_default(),
            surface,
            surface_tension: self.surface_tension.unwrap_or(0.0),
            energy: self.energy.unwrap_or_default(),
            forces: self.forces.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Smoother {
    #[default]
    #[serde(alias = "rbgs")]
    RedBlackGaussSeidel,
    #[serde(alias = "jacobi")]
    WeightedJacobi,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub max_cycles: usize,
    /// Target for `‖r_k‖ / ‖r_0‖`.
    pub tolerance: f64,
    pub pre_smoothing: usize,
    pub post_smoothing: usize,
    pub coarse_sweeps: usize,
    pub smoother: Smoother,
    pub jacobi_weight: f64,
    /// Upper bound on multigrid cycles per Newton step.
    pub newton_inner_cycles: usize,
    /// Relative reduction of the Newton correction residual that ends the inner cycles.
    pub newton_inner_tolerance: f64,
    pub line_search_steps: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_cycles: 200,
            tolerance: 1e-6,
            pre_smoothing: 2,
            post_smoothing: 2,
            coarse_sweeps: 64,
            smoother: Smoother::RedBlackGaussSeidel,
            jacobi_weight: 0.8,
            newton_inner_cycles: 10,
            newton_inner_tolerance: 0.1,
            line_search_steps: 8,
        }
    }
}

#[derive(Default)]
pub struct SolverConfigBuilder {
    config: SolverConfig,
}

impl SolverConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_cycles(mut self, cycles: usize) -> Self {
        self.config.max_cycles = cycles;
        self
    }
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }
    pub fn smoothing(mut self, pre: usize, post: usize) -> Self {
        self.config.pre_smoothing = pre;
        self.config.post_smoothing = post;
        self
    }
    pub fn coarse_sweeps(mut self, sweeps: usize) -> Self {
        self.config.coarse_sweeps = sweeps;
        self
    }
    pub fn smoother(mut self, smoother: Smoother) -> Self {
        self.config.smoother = smoother;
        self
    }
    pub fn jacobi_weight(mut self, weight: f64) -> Self {
        self.config.jacobi_weight = weight;
        self
    }
    pub fn newton(mut self, inner_cycles: usize, inner_tolerance: f64) -> Self {
        self.config.newton_inner_cycles = inner_cycles;
        self.config.newton_inner_tolerance = inner_tolerance;
        self
    }
    pub fn line_search_steps(mut self, steps: usize) -> Self {
        self.config.line_search_steps = steps;
        self
    }

    pub fn build(self) -> Result<SolverConfig, ConfigError> {
        let c = self.config;
        if c.max_cycles == 0 {
            return Err(ConfigError::InvalidCombination(
                "max_cycles must be at least 1".to_string(),
            ));
        }
        if !(c.tolerance > 0.0 && c.tolerance < 1.0) {
            return Err(ConfigError::InvalidCombination(format!(
                "tolerance must lie in (0, 1), got {}",
                c.tolerance
            )));
        }
        if c.pre_smoothing + c.post_smoothing == 0 {
            return Err(ConfigError::InvalidCombination(
                "at least one smoothing sweep per cycle is required".to_string(),
            ));
        }
        if !(c.jacobi_weight > 0.0 && c.jacobi_weight <= 1.0) {
            return Err(ConfigError::InvalidCombination(format!(
                "jacobi weight must lie in (0, 1], got {}",
                c.jacobi_weight
            )));
        }
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_builder_requires_dims_spacing_and_center() {
        let err = GridParametersBuilder::new()
            .spacing([0.5; 3])
            .center([0.0; 3])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("dims"));
    }

    #[test]
    fn grid_builder_defaults_to_deepest_hierarchy() {
        let params = GridParametersBuilder::new()
            .dims([65, 65, 33])
            .uniform_spacing(0.5)
            .center([0.0; 3])
            .build()
            .unwrap();
        assert_eq!(params.levels, 5);
        assert_eq!(params.boundary, BoundaryCondition::MultipleDebyeHuckel);
        assert_eq!(params.charge_method, ChargeMethod::CubicBSpline);
    }

    #[test]
    fn uncoarsenable_dimensions_are_rejected() {
        let err = GridParametersBuilder::new()
            .dims([64, 65, 65])
            .uniform_spacing(0.5)
            .center([0.0; 3])
            .levels(4)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCombination(_)));
        assert!(GridParameters::check_levels([65, 65, 65], 6).is_ok());
        assert!(GridParameters::check_levels([65, 65, 65], 7).is_err());
    }

    #[test]
    fn max_levels_stops_at_three_node_grid() {
        assert_eq!(GridParameters::max_levels([3, 3, 3]), 1);
        assert_eq!(GridParameters::max_levels([5, 5, 5]), 2);
        assert_eq!(GridParameters::max_levels([97, 97, 65]), 6);
        assert_eq!(GridParameters::max_levels([10, 9, 9]), 1);
    }

    #[test]
    fn pbe_builder_applies_defaults() {
        let pbe = PbeParametersBuilder::new()
            .temperature(298.15)
            .solute_dielectric(2.0)
            .solvent_dielectric(78.54)
            .build()
            .unwrap();
        assert_eq!(pbe.equation, Equation::Linear);
        assert_eq!(pbe.surface.method, SurfaceMethod::Spline);
        assert_eq!(pbe.surface.smoothing_window, 0.3);
        assert_eq!(pbe.ion_exclusion_radius(), 0.0);
    }

    #[test]
    fn pbe_builder_rejects_non_positive_temperature() {
        let err = PbeParametersBuilder::new()
            .temperature(0.0)
            .solute_dielectric(2.0)
            .solvent_dielectric(78.54)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCombination(_)));
    }

    #[test]
    fn solver_builder_validates_tolerance() {
        assert!(SolverConfigBuilder::new().tolerance(0.0).build().is_err());
        assert!(SolverConfigBuilder::new().tolerance(1e-8).build().is_ok());
    }

    #[test]
    fn enums_accept_short_keywords() {
        #[derive(Deserialize)]
        struct Probe {
            bc: BoundaryCondition,
            eq: Equation,
            srf: SurfaceMethod,
            chg: ChargeMethod,
        }
        let probe: Probe =
            toml::from_str("bc = \"sdh\"\neq = \"npbe\"\nsrf = \"smol\"\nchg = \"spl0\"").unwrap();
        assert_eq!(probe.bc, BoundaryCondition::SingleDebyeHuckel);
        assert_eq!(probe.eq, Equation::Nonlinear);
        assert_eq!(probe.srf, SurfaceMethod::SmoothedMolecular);
        assert_eq!(probe.chg, ChargeMethod::Trilinear);
    }
}
