//! # Core Module
//!
//! Stateless building blocks shared by the engine and the workflows.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Atoms with charge and radius, molecules as
//!   ordered atom lists, and the per-atom force record produced by force evaluation
//! - **Structured Grids** ([`grid`]) - Grid topology (dimensions, spacing, origin) and the
//!   `GridField` container with trilinear interpolation and gradient estimation
//! - **Physics Kernels** ([`physics`]) - Unit constants, mobile ion species, Debye-Hückel
//!   boundary potentials, and the spline/B-spline weight functions used by mapping,
//!   energy and force evaluation
//! - **Geometry Utilities** ([`utils`]) - Quasi-uniform sphere point sets for surface
//!   construction
//!
//! ## Units
//!
//! Lengths are in Ångström, charges in elementary charges, the potential in kT/e and all
//! energies in kT unless a function name says otherwise (e.g. `kt_to_kj_per_mol`).

pub mod grid;
pub mod models;
pub mod physics;
pub mod utils;
