use crate::core::grid::GridTopology;
use crate::core::physics::ions::MobileIons;
use crate::engine::config::{ConfigError, Equation, PbeParameters};
use crate::engine::mapping::FieldMaps;
use std::f64::consts::PI;

/// Mobile-ion term `b(u)` of the equation, multiplied by the accessibility at each node.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    None,
    Linear { kappa2: f64 },
    Nonlinear(MobileIons),
}

impl Reaction {
    pub fn from_pbe(pbe: &PbeParameters) -> Self {
        let ions = pbe.mobile_ions();
        if ions.is_empty() {
            return Reaction::None;
        }
        match pbe.equation {
            Equation::Linear => Reaction::Linear {
                kappa2: ions.kappa2_bar(),
            },
            Equation::Nonlinear => Reaction::Nonlinear(ions),
        }
    }

    #[inline]
    pub fn value(&self, u: f64) -> f64 {
        match self {
            Reaction::None => 0.0,
            Reaction::Linear { kappa2 } => kappa2 * u,
            Reaction::Nonlinear(ions) => ions.charge_term(u),
        }
    }

    #[inline]
    pub fn derivative(&self, u: f64) -> f64 {
        match self {
            Reaction::None => 0.0,
            Reaction::Linear { kappa2 } => *kappa2,
            Reaction::Nonlinear(ions) => ions.charge_term_derivative(u),
        }
    }

    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Reaction::Nonlinear(_))
    }
}

/// The discretized boundary-value problem
///
/// `Σ_d [ε⁺(u_a - u⁺) + ε⁻(u_a - u⁻)] / h_d² + H_a b(u_a) = f_a` on interior nodes,
/// `u_a = g_a` on boundary nodes,
///
/// with staggered dielectric coefficients (component `d` at node `a` is the face towards
/// `a + e_d`).
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteProblem {
    pub topology: GridTopology,
    pub dielectric: [Vec<f64>; 3],
    pub accessibility: Vec<f64>,
    /// Right-hand side `4πλρ` per node.
    pub source: Vec<f64>,
    /// Dirichlet values; only boundary entries are read.
    pub boundary: Vec<f64>,
    pub reaction: Reaction,
}

impl DiscreteProblem {
    pub fn assemble(maps: &FieldMaps, pbe: &PbeParameters, boundary: Vec<f64>) -> Self {
        let topology = *maps.topology();
        let scale = 4.0 * PI * pbe.coulomb_length() / topology.cell_volume();
        Self {
            topology,
            dielectric: [
                maps.dielectric.x.values().to_vec(),
                maps.dielectric.y.values().to_vec(),
                maps.dielectric.z.values().to_vec(),
            ],
            accessibility: maps.accessibility.values().to_vec(),
            source: maps.charge.values().iter().map(|q| scale * q).collect(),
            boundary,
            reaction: Reaction::from_pbe(pbe),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.topology.len();
        let lengths = [
            ("dielectric-x", self.dielectric[0].len()),
            ("dielectric-y", self.dielectric[1].len()),
            ("dielectric-z", self.dielectric[2].len()),
            ("accessibility", self.accessibility.len()),
            ("source", self.source.len()),
            ("boundary", self.boundary.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(ConfigError::InvalidCombination(format!(
                    "{} holds {} values but the grid has {} nodes",
                    name, len, n
                )));
            }
        }
        if self.topology.dims.iter().any(|&d| d < 3) {
            return Err(ConfigError::InvalidCombination(format!(
                "grid {:?} has no interior nodes",
                self.topology.dims
            )));
        }
        Ok(())
    }

    pub fn apply_boundary(&self, u: &mut [f64]) {
        for_each_boundary(&self.topology, |idx| u[idx] = self.boundary[idx]);
    }

    /// Nonlinear residual `f - A(u)`; zero on boundary nodes.
    pub fn residual(&self, u: &[f64], out: &mut [f64]) {
        let [nx, ny, nz] = self.topology.dims;
        let strides = [1, nx, nx * ny];
        let inv_h2 = self.topology.spacing.map(|h| 1.0 / (h * h));
        out.fill(0.0);
        for k in 1..nz - 1 {
            for j in 1..ny - 1 {
                let row = nx * (j + ny * k);
                for i in 1..nx - 1 {
                    let a = row + i;
                    let ua = u[a];
                    let mut flux = 0.0;
                    for d in 0..3 {
                        let s = strides[d];
                        let eps = &self.dielectric[d];
                        flux += inv_h2[d] * (eps[a] * (ua - u[a + s]) + eps[a - s] * (ua - u[a - s]));
                    }
                    out[a] = self.source[a] - flux - self.accessibility[a] * self.reaction.value(ua);
                }
            }
        }
    }

    /// Diagonal reaction coefficients `H_a b'(u_a)` of the linearized operator.
    pub fn reaction_coefficients(&self, u: &[f64]) -> Vec<f64> {
        self.accessibility
            .iter()
            .zip(u)
            .map(|(h, &ua)| h * self.reaction.derivative(ua))
            .collect()
    }
}

pub(crate) fn for_each_boundary<F>(topology: &GridTopology, mut f: F)
where
    F: FnMut(usize),
{
    let [nx, ny, nz] = topology.dims;
    for k in 0..nz {
        for j in 0..ny {
            let row = nx * (j + ny * k);
            if k == 0 || k + 1 == nz || j == 0 || j + 1 == ny {
                (0..nx).for_each(|i| f(row + i));
            } else if nx > 0 {
                f(row);
                if nx > 1 {
                    f(row + nx - 1);
                }
            }
        }
    }
}

pub(crate) fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}
