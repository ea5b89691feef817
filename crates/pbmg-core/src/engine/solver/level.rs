use super::problem::norm;
use crate::engine::config::{Smoother, SolverConfig};

const FULL_WEIGHTS: [f64; 3] = [0.25, 0.5, 0.25];

/// One grid of the multigrid hierarchy: operator coefficients plus work vectors.
#[derive(Debug, Clone)]
pub(crate) struct Level {
    pub dims: [usize; 3],
    inv_h2: [f64; 3],
    eps: [Vec<f64>; 3],
    reaction: Vec<f64>,
    diag: Vec<f64>,
    pub rhs: Vec<f64>,
    pub x: Vec<f64>,
    pub res: Vec<f64>,
    scratch: Vec<f64>,
}

impl Level {
    fn new(dims: [usize; 3], spacing: [f64; 3], eps: [Vec<f64>; 3], reaction: Vec<f64>) -> Self {
        let n = dims[0] * dims[1] * dims[2];
        let mut level = Self {
            dims,
            inv_h2: spacing.map(|h| 1.0 / (h * h)),
            eps,
            reaction,
            diag: vec![0.0; n],
            rhs: vec![0.0; n],
            x: vec![0.0; n],
            res: vec![0.0; n],
            scratch: vec![0.0; n],
        };
        level.update_diagonal();
        level
    }

    #[inline]
    fn strides(&self) -> [usize; 3] {
        [1, self.dims[0], self.dims[0] * self.dims[1]]
    }

    fn update_diagonal(&mut self) {
        let strides = self.strides();
        let [nx, ny, nz] = self.dims;
        for k in 1..nz - 1 {
            for j in 1..ny - 1 {
                let row = nx * (j + ny * k);
                for a in row + 1..row + nx - 1 {
                    let mut d = self.reaction[a];
                    for axis in 0..3 {
                        d += self.inv_h2[axis]
                            * (self.eps[axis][a] + self.eps[axis][a - strides[axis]]);
                    }
                    self.diag[a] = d;
                }
            }
        }
    }

    /// Weighted sum of the six neighbours of interior node `a`.
    #[inline]
    fn neighbor_sum(&self, x: &[f64], a: usize, strides: &[usize; 3]) -> f64 {
        let mut sum = 0.0;
        for axis in 0..3 {
            let s = strides[axis];
            sum += self.inv_h2[axis] * (self.eps[axis][a] * x[a + s] + self.eps[axis][a - s] * x[a - s]);
        }
        sum
    }

    pub fn compute_residual(&mut self) {
        let strides = self.strides();
        let [nx, ny, nz] = self.dims;
        let mut res = std::mem::take(&mut self.res);
        res.fill(0.0);
        for k in 1..nz - 1 {
            for j in 1..ny - 1 {
                let row = nx * (j + ny * k);
                for a in row + 1..row + nx - 1 {
                    res[a] = self.rhs[a] - self.diag[a] * self.x[a]
                        + self.neighbor_sum(&self.x, a, &strides);
                }
            }
        }
        self.res = res;
    }

    pub fn residual_norm(&self) -> f64 {
        norm(&self.res)
    }

    pub fn smooth(&mut self, sweeps: usize, config: &SolverConfig) {
        match config.smoother {
            Smoother::RedBlackGaussSeidel => self.gauss_seidel(sweeps),
            Smoother::WeightedJacobi => self.jacobi(sweeps, config.jacobi_weight),
        }
    }

    pub fn gauss_seidel(&mut self, sweeps: usize) {
        let strides = self.strides();
        let [nx, ny, nz] = self.dims;
        let mut x = std::mem::take(&mut self.x);
        for _ in 0..sweeps {
            for color in 0..2 {
                for k in 1..nz - 1 {
                    for j in 1..ny - 1 {
                        let row = nx * (j + ny * k);
                        let first = if (1 + j + k) % 2 == color { 1 } else { 2 };
                        for i in (first..nx - 1).step_by(2) {
                            let a = row + i;
                            x[a] = (self.rhs[a] + self.neighbor_sum(&x, a, &strides)) / self.diag[a];
                        }
                    }
                }
            }
        }
        self.x = x;
    }

    fn jacobi(&mut self, sweeps: usize, weight: f64) {
        let strides = self.strides();
        let [nx, ny, nz] = self.dims;
        let mut next = std::mem::take(&mut self.scratch);
        for _ in 0..sweeps {
            next.copy_from_slice(&self.x);
            for k in 1..nz - 1 {
                for j in 1..ny - 1 {
                    let row = nx * (j + ny * k);
                    for a in row + 1..row + nx - 1 {
                        let update = (self.rhs[a] + self.neighbor_sum(&self.x, a, &strides)) / self.diag[a];
                        next[a] = (1.0 - weight) * self.x[a] + weight * update;
                    }
                }
            }
            std::mem::swap(&mut self.x, &mut next);
        }
        self.scratch = next;
    }
}

/// Grids from finest (index 0) to coarsest, each with its own rediscretized operator.
#[derive(Debug, Clone)]
pub(crate) struct Hierarchy {
    levels: Vec<Level>,
}

impl Hierarchy {
    pub fn build(
        dims: [usize; 3],
        spacing: [f64; 3],
        eps: &[Vec<f64>; 3],
        reaction: Vec<f64>,
        count: usize,
    ) -> Self {
        let mut levels = Vec::with_capacity(count);
        levels.push(Level::new(dims, spacing, eps.clone(), reaction));
        for _ in 1..count {
            let Some(fine) = levels.last() else { break };
            let coarse_dims = fine.dims.map(|n| (n - 1) / 2 + 1);
            let coarse_spacing = fine.inv_h2.map(|v| 2.0 / v.sqrt());
            let coarse_eps = std::array::from_fn(|axis| coarsen_dielectric(fine, coarse_dims, axis));
            let mut coarse_reaction = vec![0.0; coarse_dims.iter().product()];
            restrict(fine.dims, &fine.reaction, coarse_dims, &mut coarse_reaction, true);
            levels.push(Level::new(coarse_dims, coarse_spacing, coarse_eps, coarse_reaction));
        }
        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Replaces the reaction coefficients on every level, e.g. after a Newton relinearization.
    pub fn update_reaction(&mut self, fine_reaction: &[f64]) {
        self.levels[0].reaction.copy_from_slice(fine_reaction);
        self.levels[0].update_diagonal();
        for index in 1..self.levels.len() {
            let (finer, coarser) = self.levels.split_at_mut(index);
            let fine = &finer[index - 1];
            let coarse = &mut coarser[0];
            restrict(fine.dims, &fine.reaction, coarse.dims, &mut coarse.reaction, true);
            coarse.update_diagonal();
        }
    }

    /// Approximately solves `A e = rhs` with zero boundary values, starting from `e = 0`.
    ///
    /// Runs `max_cycles` cycles, or fewer when `stop_ratio` is given and the correction
    /// residual falls below `stop_ratio * ‖rhs‖`.
    pub fn solve_correction(
        &mut self,
        rhs: &[f64],
        max_cycles: usize,
        gamma: usize,
        config: &SolverConfig,
        stop_ratio: Option<f64>,
    ) -> &[f64] {
        let target = stop_ratio.map(|ratio| ratio * norm(rhs));
        {
            let fine = &mut self.levels[0];
            fine.rhs.copy_from_slice(rhs);
            fine.x.fill(0.0);
        }
        for _ in 0..max_cycles.max(1) {
            cycle(&mut self.levels, gamma, config);
            if let Some(target) = target {
                let fine = &mut self.levels[0];
                fine.compute_residual();
                if fine.residual_norm() <= target {
                    break;
                }
            }
        }
        &self.levels[0].x
    }
}

fn cycle(levels: &mut [Level], gamma: usize, config: &SolverConfig) {
    let Some((fine, coarser)) = levels.split_first_mut() else {
        return;
    };
    if coarser.is_empty() {
        fine.gauss_seidel(config.coarse_sweeps);
        return;
    }

    fine.smooth(config.pre_smoothing, config);
    fine.compute_residual();
    {
        let coarse = &mut coarser[0];
        restrict(fine.dims, &fine.res, coarse.dims, &mut coarse.rhs, false);
        coarse.x.fill(0.0);
    }
    for _ in 0..gamma {
        cycle(coarser, gamma, config);
    }
    prolongate_add(coarser[0].dims, &coarser[0].x, fine.dims, &mut fine.x);
    fine.smooth(config.post_smoothing, config);
}

/// 27-point full weighting onto coarse interior nodes. Coarse boundary nodes are injected
/// when `inject_boundary` is set and zeroed otherwise.
fn restrict(
    fine_dims: [usize; 3],
    fine: &[f64],
    coarse_dims: [usize; 3],
    coarse: &mut [f64],
    inject_boundary: bool,
) {
    let [fx, fy, _] = fine_dims;
    let [cx, cy, cz] = coarse_dims;
    for k in 0..cz {
        for j in 0..cy {
            for i in 0..cx {
                let c = i + cx * (j + cy * k);
                let f = 2 * i + fx * (2 * j + fy * 2 * k);
                let boundary = i == 0 || j == 0 || k == 0 || i + 1 == cx || j + 1 == cy || k + 1 == cz;
                if boundary {
                    coarse[c] = if inject_boundary { fine[f] } else { 0.0 };
                    continue;
                }
                let mut acc = 0.0;
                for (dk, wk) in FULL_WEIGHTS.iter().enumerate() {
                    for (dj, wj) in FULL_WEIGHTS.iter().enumerate() {
                        for (di, wi) in FULL_WEIGHTS.iter().enumerate() {
                            let idx = (2 * i + di - 1) + fx * ((2 * j + dj - 1) + fy * (2 * k + dk - 1));
                            acc += wi * wj * wk * fine[idx];
                        }
                    }
                }
                coarse[c] = acc;
            }
        }
    }
}

/// Coarse nodes contributing to fine index `i` along one axis, with their weights.
#[inline]
fn parents(i: usize) -> ([usize; 2], [f64; 2], usize) {
    if i % 2 == 0 {
        ([i / 2, 0], [1.0, 0.0], 1)
    } else {
        ([(i - 1) / 2, (i + 1) / 2], [0.5, 0.5], 2)
    }
}

/// Adds the trilinear interpolation of `coarse` to the interior nodes of `fine`.
fn prolongate_add(coarse_dims: [usize; 3], coarse: &[f64], fine_dims: [usize; 3], fine: &mut [f64]) {
    let [cx, cy, _] = coarse_dims;
    let [fx, fy, fz] = fine_dims;
    for k in 1..fz - 1 {
        let (pk, wk, nk) = parents(k);
        for j in 1..fy - 1 {
            let (pj, wj, nj) = parents(j);
            for i in 1..fx - 1 {
                let (pi, wi, ni) = parents(i);
                let mut value = 0.0;
                for c in 0..nk {
                    for b in 0..nj {
                        for a in 0..ni {
                            value += wi[a] * wj[b] * wk[c] * coarse[pi[a] + cx * (pj[b] + cy * pk[c])];
                        }
                    }
                }
                fine[i + fx * (j + fy * k)] += value;
            }
        }
    }
}

/// Face coefficients of a coarse level: harmonic mean of the two fine faces spanning each
/// coarse face, full-weighted across the transverse directions.
fn coarsen_dielectric(fine: &Level, coarse_dims: [usize; 3], axis: usize) -> Vec<f64> {
    let [fx, fy, _] = fine.dims;
    let [cx, cy, cz] = coarse_dims;
    let strides = fine.strides();
    let eps = &fine.eps[axis];
    let transverse = [(axis + 1) % 3, (axis + 2) % 3];
    let mut coarse = vec![0.0; cx * cy * cz];
    for k in 0..cz {
        for j in 0..cy {
            for i in 0..cx {
                let c = [i, j, k];
                let base = [2 * i, 2 * j, 2 * k];
                let f0 = base[0] + fx * (base[1] + fy * base[2]);
                let slot = i + cx * (j + cy * k);
                if c[axis] + 1 == coarse_dims[axis] {
                    coarse[slot] = eps[f0];
                    continue;
                }
                let mut acc = 0.0;
                let mut total = 0.0;
                for (t1, w1) in FULL_WEIGHTS.iter().enumerate() {
                    for (t2, w2) in FULL_WEIGHTS.iter().enumerate() {
                        let mut node = base;
                        let shifts = [t1 as isize - 1, t2 as isize - 1];
                        let mut inside = true;
                        for (&dir, &shift) in transverse.iter().zip(&shifts) {
                            let moved = node[dir] as isize + shift;
                            if moved < 0 || moved >= fine.dims[dir] as isize {
                                inside = false;
                                break;
                            }
                            node[dir] = moved as usize;
                        }
                        if !inside {
                            continue;
                        }
                        let f = node[0] + fx * (node[1] + fy * node[2]);
                        let (e1, e2) = (eps[f], eps[f + strides[axis]]);
                        let harmonic = if e1 + e2 > 0.0 { 2.0 * e1 * e2 / (e1 + e2) } else { 0.0 };
                        acc += w1 * w2 * harmonic;
                        total += w1 * w2;
                    }
                }
                coarse[slot] = acc / total;
            }
        }
    }
    coarse
}
