//! # Workflows Module
//!
//! High-level entry points that run Poisson-Boltzmann calculations end to end.
//!
//! ## Architecture
//!
//! - **Single calculation** ([`calculation`]) - maps one molecule, solves for its potential
//!   and extracts the requested energies, per-atom potentials and forces.
//! - **Sequences** ([`sequence`]) - runs an ordered list of calculations. A calculation may
//!   focus on an earlier one, taking its boundary values from the parent potential; a failed
//!   calculation is reported and the sequence moves on.
//! - **Energy expressions** ([`expression`]) - combines the totals of several calculations,
//!   such as `1 - 2 - 3` for a binding energy.

pub mod calculation;
pub mod expression;
pub mod sequence;
