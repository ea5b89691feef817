//! # PBMG Core Library
//!
//! A multigrid engine for the Poisson-Boltzmann equation around biomolecules: it maps atoms
//! onto structured grids, solves the (linearized or full nonlinear) equation with geometric
//! multigrid, and extracts energies and per-atom forces from the converged potential.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Atom`, `Molecule`, `AtomForce`),
//!   the structured grid container (`GridField`) and the physical kernels (unit constants,
//!   Debye-Hückel potentials, spline and B-spline weights).
//!
//! - **[`engine`]: The Numerical Engine.** Configuration objects (`GridParameters`,
//!   `PbeParameters`, `SolverConfig`), the `MoleculeMapper` that produces dielectric,
//!   accessibility and charge maps, the `MultigridSolver` with its level hierarchy, and the
//!   `EnergyEvaluator` / `ForceEvaluator` that post-process a converged potential.
//!
//! - **[`workflows`]: The Public API.** Runs complete calculations (map, solve, evaluate),
//!   sequences of calculations with focusing and failure isolation, and energy expressions
//!   that combine the results of several calculations.

pub mod core;
pub mod engine;
pub mod workflows;
