use super::MappingError;
use crate::core::grid::GridTopology;
use crate::core::models::atom::Atom;
use crate::core::physics::splines::{
    cubic_bspline_derivatives, cubic_bspline_weights, linear_derivatives, linear_weights,
};
use crate::engine::config::{AtomDomainAction, ChargeMethod, GridParameters};
use nalgebra::Vector3;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct StencilNode {
    pub index: usize,
    pub ijk: [usize; 3],
    pub weight: f64,
    /// Derivative of `weight` with respect to the atom position.
    pub gradient: Vector3<f64>,
}

/// The grid nodes one point charge is spread over, with their assignment weights.
///
/// The same weights are used to read the potential back at the atom, so charge assignment
/// and potential interpolation are exact adjoints of each other.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeStencil {
    nodes: Vec<StencilNode>,
    shifted: bool,
}

struct AxisWeights {
    first: usize,
    weights: [f64; 4],
    derivatives: [f64; 4],
    len: usize,
    shifted: bool,
}

fn axis_weights(
    topology: &GridTopology,
    method: ChargeMethod,
    axis: usize,
    x: f64,
) -> Result<AxisWeights, MappingError> {
    let n = topology.dims[axis] as isize;
    // Lowest/highest base node keeping the whole support on interior nodes.
    let (lo, hi) = match method {
        ChargeMethod::Trilinear => (1, n - 3),
        ChargeMethod::CubicBSpline => (2, n - 4),
    };
    if hi < lo {
        return Err(MappingError::GridTooSmall {
            dims: topology.dims,
            support: method.support(),
        });
    }
    let s = topology.fractional(axis, x);
    let base = (s.floor() as isize).clamp(lo, hi);
    let raw = s - base as f64;
    let f = raw.clamp(0.0, 1.0);
    let h = topology.spacing[axis];
    let mut weights = [0.0; 4];
    let mut derivatives = [0.0; 4];
    let (first, len) = match method {
        ChargeMethod::Trilinear => {
            let w = linear_weights(f);
            let dw = linear_derivatives(f);
            weights[..2].copy_from_slice(&w);
            for m in 0..2 {
                derivatives[m] = dw[m] / h;
            }
            (base as usize, 2)
        }
        ChargeMethod::CubicBSpline => {
            weights = cubic_bspline_weights(f);
            let dw = cubic_bspline_derivatives(f);
            for m in 0..4 {
                derivatives[m] = dw[m] / h;
            }
            (base as usize - 1, 4)
        }
    };
    Ok(AxisWeights {
        first,
        weights,
        derivatives,
        len,
        shifted: s < lo as f64 || s > (hi + 1) as f64,
    })
}

impl ChargeStencil {
    /// Stencil of a point inside the grid. Points whose support would touch the boundary are
    /// moved inward until it fits.
    pub fn new(
        topology: &GridTopology,
        method: ChargeMethod,
        position: [f64; 3],
    ) -> Result<Self, MappingError> {
        let axes = [
            axis_weights(topology, method, 0, position[0])?,
            axis_weights(topology, method, 1, position[1])?,
            axis_weights(topology, method, 2, position[2])?,
        ];
        let shifted = axes.iter().any(|a| a.shifted);
        let [ax, ay, az] = &axes;
        let mut nodes = Vec::with_capacity(ax.len * ay.len * az.len);
        for c in 0..az.len {
            for b in 0..ay.len {
                for a in 0..ax.len {
                    let ijk = [ax.first + a, ay.first + b, az.first + c];
                    let (wx, wy, wz) = (ax.weights[a], ay.weights[b], az.weights[c]);
                    nodes.push(StencilNode {
                        index: topology.index(ijk[0], ijk[1], ijk[2]),
                        ijk,
                        weight: wx * wy * wz,
                        gradient: Vector3::new(
                            ax.derivatives[a] * wy * wz,
                            wx * ay.derivatives[b] * wz,
                            wx * wy * az.derivatives[c],
                        ),
                    });
                }
            }
        }
        Ok(Self { nodes, shifted })
    }

    pub fn nodes(&self) -> &[StencilNode] {
        &self.nodes
    }

    /// Whether the atom had to be moved inward to keep the support off the boundary.
    pub fn was_shifted(&self) -> bool {
        self.shifted
    }

    /// Stencil-weighted value of a nodal field at the atom.
    pub fn interpolate(&self, values: &[f64]) -> f64 {
        self.nodes.iter().map(|n| n.weight * values[n.index]).sum()
    }

    /// Derivative of [`ChargeStencil::interpolate`] with respect to the atom position.
    pub fn interpolate_gradient(&self, values: &[f64]) -> Vector3<f64> {
        self.nodes
            .iter()
            .fold(Vector3::zeros(), |acc, n| acc + n.gradient * values[n.index])
    }
}

/// Builds the stencil of every atom, applying the out-of-domain policy of `grid`.
pub fn atom_stencils(
    topology: &GridTopology,
    grid: &GridParameters,
    atoms: &[Atom],
) -> Result<Vec<ChargeStencil>, MappingError> {
    let policy = grid.atom_policy;
    let lower = topology.origin;
    let upper = topology.upper_corner();
    let mut clipped = 0usize;
    let mut shifted = 0usize;
    let mut stencils = Vec::with_capacity(atoms.len());
    for (index, atom) in atoms.iter().enumerate() {
        let mut position = atom.coords();
        if !topology.contains(&position, policy.margin) {
            match policy.action {
                AtomDomainAction::Fail => {
                    return Err(MappingError::AtomOutsideDomain {
                        index,
                        x: position[0],
                        y: position[1],
                        z: position[2],
                    });
                }
                AtomDomainAction::Clip => {
                    for d in 0..3 {
                        position[d] = position[d].clamp(lower[d], upper[d]);
                    }
                    debug!(atom = index, "Clipped atom position into the grid domain.");
                    clipped += 1;
                }
            }
        }
        let stencil = ChargeStencil::new(topology, grid.charge_method, position)?;
        if stencil.was_shifted() {
            shifted += 1;
        }
        stencils.push(stencil);
    }
    if clipped > 0 {
        warn!(clipped, "Atoms outside the grid domain were clipped onto it.");
    }
    if shifted > 0 {
        warn!(
            shifted,
            "Atoms too close to the grid boundary had their charge stencil moved inward."
        );
    }
    Ok(stencils)
}
