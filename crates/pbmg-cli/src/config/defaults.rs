use pbmg::engine::config::{BoundaryCondition, ChargeMethod, Equation, SurfaceMethod};

/// Values applied when neither the deck nor the command line sets a parameter.
pub struct DefaultsConfig {
    pub dims: [usize; 3],
    pub boundary: BoundaryCondition,
    pub charge_method: ChargeMethod,
    pub equation: Equation,
    pub temperature: f64,
    pub solute_dielectric: f64,
    pub solvent_dielectric: f64,
    pub surface: SurfaceMethod,
    pub surface_window: f64,
    pub solvent_radius: f64,
    pub sphere_density: f64,
    pub surface_tension: f64,
    pub max_cycles: usize,
    pub tolerance: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            dims: [65, 65, 65],
            boundary: BoundaryCondition::MultipleDebyeHuckel,
            charge_method: ChargeMethod::CubicBSpline,
            equation: Equation::Linear,
            temperature: 298.15,
            solute_dielectric: 2.0,
            solvent_dielectric: 78.54,
            surface: SurfaceMethod::Spline,
            surface_window: 0.3,
            solvent_radius: 1.4,
            sphere_density: 10.0,
            surface_tension: 0.0,
            max_cycles: 200,
            tolerance: 1e-6,
        }
    }
}
