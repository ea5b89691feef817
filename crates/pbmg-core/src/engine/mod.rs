//! # Engine Module
//!
//! This module implements the numerical engine of the Poisson-Boltzmann calculation: turning
//! atoms into coefficient maps, solving the discretized equation by multigrid, and reducing
//! the potential to energies and forces.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Grid, physical and solver parameters with builders
//! - **Mapping** ([`mapping`]) - Dielectric, ion-accessibility and charge maps from atoms
//! - **Solver** ([`solver`]) - Multigrid V/W cycles, Newton iteration for the nonlinear
//!   equation and boundary conditions
//! - **Potential** ([`potential`]) - Solved potentials with their convergence record
//! - **Energies** ([`energy`]) - Fixed-charge, mobile-ion, dielectric and self energies
//! - **Forces** ([`force`]) - Per-atom force components by differentiating the energy
//! - **Apolar terms** ([`nonpolar`]) - Smooth solvent-accessible surface area and its gradient
//! - **Progress Monitoring** ([`progress`]) - Callbacks for long-running phases
//! - **Error Handling** ([`error`]) - Engine-wide error aggregation
//!
//! ## Units
//!
//! Lengths are in Å, charges in e, potentials in kT/e and energies in kT unless stated
//! otherwise. Conversions to kJ/mol live in [`crate::core::physics::constants`].

pub mod config;
pub mod energy;
pub mod error;
pub mod force;
pub mod mapping;
pub mod nonpolar;
pub mod potential;
pub mod progress;
pub(crate) mod self_energy;
pub mod solver;
