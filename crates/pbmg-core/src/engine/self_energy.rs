use crate::core::grid::GridTopology;
use crate::engine::config::{ConfigError, CycleType, SolverConfigBuilder};
use crate::engine::energy::EvaluationError;
use crate::engine::mapping::stencil::ChargeStencil;
use crate::engine::solver::problem::{DiscreteProblem, Reaction};
use crate::engine::solver::{MultigridSolver, SolverError};
use nalgebra::Vector3;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

/// Largest node offset tabulated per axis; covers any pair of nodes in one cubic stencil.
const MAX_OFFSET: usize = 3;
const TABLE_WIDTH: usize = 2 * MAX_OFFSET + 1;
const LATTICE_NODES: usize = 33;
const LATTICE_LEVELS: usize = 5;
const LATTICE_TOLERANCE: f64 = 1e-10;

/// Lattice Green's function `G_h` of the 7-point Laplacian near the origin, for one set of
/// grid spacings: `-Δ_h G = δ / V`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GreenKernel {
    spacing: [f64; 3],
    table: Vec<f64>,
}

impl GreenKernel {
    fn compute(spacing: [f64; 3]) -> Result<Self, EvaluationError> {
        let half = (LATTICE_NODES - 1) / 2;
        let origin = spacing.map(|h| -(half as f64) * h);
        let topology = GridTopology::new([LATTICE_NODES; 3], spacing, origin);
        let n = topology.len();

        let mut source = vec![0.0; n];
        source[topology.index(half, half, half)] = 1.0 / topology.cell_volume();
        let boundary = (0..n)
            .map(|idx| {
                let (i, j, k) = topology.coords(idx);
                if topology.is_boundary(i, j, k) {
                    let [x, y, z] = topology.node_position(i, j, k);
                    1.0 / (4.0 * PI * (x * x + y * y + z * z).sqrt())
                } else {
                    0.0
                }
            })
            .collect();
        let problem = DiscreteProblem {
            topology,
            dielectric: [vec![1.0; n], vec![1.0; n], vec![1.0; n]],
            accessibility: vec![0.0; n],
            source,
            boundary,
            reaction: Reaction::None,
        };

        let config = SolverConfigBuilder::new()
            .tolerance(LATTICE_TOLERANCE)
            .build()?;
        let mut solver = MultigridSolver::new(config);
        let outcome = solver
            .solve_discrete(&problem, LATTICE_LEVELS, CycleType::V, None)
            .map_err(|e| match e {
                SolverError::Configuration { source } => EvaluationError::Configuration { source },
                SolverError::Convergence { .. } => EvaluationError::KernelConvergence,
            })?;
        if !outcome.converged {
            return Err(EvaluationError::KernelConvergence);
        }

        let mut table = vec![0.0; TABLE_WIDTH * TABLE_WIDTH * TABLE_WIDTH];
        for k in 0..TABLE_WIDTH {
            for j in 0..TABLE_WIDTH {
                for i in 0..TABLE_WIDTH {
                    let node = topology.index(
                        half + i - MAX_OFFSET,
                        half + j - MAX_OFFSET,
                        half + k - MAX_OFFSET,
                    );
                    table[i + TABLE_WIDTH * (j + TABLE_WIDTH * k)] = outcome.values[node];
                }
            }
        }
        debug!(?spacing, iterations = outcome.iterations, "Tabulated lattice Green's function");
        Ok(Self { spacing, table })
    }

    /// `G_h` at a node offset; offsets beyond the table fall back to `1 / (4πr)`.
    pub fn value(&self, offset: [isize; 3]) -> f64 {
        if offset.iter().all(|o| o.unsigned_abs() <= MAX_OFFSET) {
            let [i, j, k] = offset.map(|o| (o + MAX_OFFSET as isize) as usize);
            return self.table[i + TABLE_WIDTH * (j + TABLE_WIDTH * k)];
        }
        let r2: f64 = (0..3)
            .map(|d| (offset[d] as f64 * self.spacing[d]).powi(2))
            .sum();
        1.0 / (4.0 * PI * r2.sqrt())
    }
}

type KernelCache = Mutex<HashMap<[u64; 3], Arc<GreenKernel>>>;

static KERNELS: OnceLock<KernelCache> = OnceLock::new();

/// Shared kernel for `spacing`, computed on first use.
pub(crate) fn kernel(spacing: [f64; 3]) -> Result<Arc<GreenKernel>, EvaluationError> {
    if spacing.iter().any(|h| !(*h > 0.0)) {
        return Err(ConfigError::InvalidCombination(format!(
            "grid spacing {:?} must be positive",
            spacing
        ))
        .into());
    }
    let key = spacing.map(f64::to_bits);
    let cache = KERNELS.get_or_init(|| Mutex::new(HashMap::new()));
    if let Some(found) = cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
        return Ok(Arc::clone(found));
    }
    let computed = Arc::new(GreenKernel::compute(spacing)?);
    let mut guard = cache.lock().unwrap_or_else(|e| e.into_inner());
    Ok(Arc::clone(guard.entry(key).or_insert(computed)))
}

fn offset(a: &[usize; 3], b: &[usize; 3]) -> [isize; 3] {
    [0, 1, 2].map(|d| a[d] as isize - b[d] as isize)
}

/// `½ q² (4πλ/ε_in) Σ_ab w_a w_b G_h(a - b)`: the energy of a charge interacting with its own
/// grid-spread image in a uniform dielectric.
pub(crate) fn self_energy(
    stencil: &ChargeStencil,
    charge: f64,
    kernel: &GreenKernel,
    coulomb_length: f64,
    solute_dielectric: f64,
) -> f64 {
    if charge == 0.0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for a in stencil.nodes() {
        for b in stencil.nodes() {
            sum += a.weight * b.weight * kernel.value(offset(&a.ijk, &b.ijk));
        }
    }
    0.5 * charge * charge * 4.0 * PI * coulomb_length / solute_dielectric * sum
}

/// Gradient of [`self_energy`] with respect to the atom position.
pub(crate) fn self_energy_gradient(
    stencil: &ChargeStencil,
    charge: f64,
    kernel: &GreenKernel,
    coulomb_length: f64,
    solute_dielectric: f64,
) -> Vector3<f64> {
    if charge == 0.0 {
        return Vector3::zeros();
    }
    let mut sum = Vector3::zeros();
    for a in stencil.nodes() {
        for b in stencil.nodes() {
            sum += a.gradient * (b.weight * kernel.value(offset(&a.ijk, &b.ijk)));
        }
    }
    sum * (charge * charge * 4.0 * PI * coulomb_length / solute_dielectric)
}
