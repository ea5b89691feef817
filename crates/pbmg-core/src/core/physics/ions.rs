use super::constants::{MOLAR_TO_PER_CUBIC_ANGSTROM, coulomb_length, guarded_exp, guarded_exp_derivative};
use serde::Deserialize;
use std::f64::consts::PI;

/// A mobile ion species of the bulk solvent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct IonSpecies {
    /// Valence in elementary charges.
    pub charge: f64,
    /// Bulk concentration in mol/L.
    pub concentration: f64,
    /// Ion exclusion radius in Angstroms.
    pub radius: f64,
}

impl IonSpecies {
    pub fn new(charge: f64, concentration: f64, radius: f64) -> Self {
        Self {
            charge,
            concentration,
            radius,
        }
    }
}

/// Ionic strength `½ Σ c z²` in mol/L.
pub fn ionic_strength(species: &[IonSpecies]) -> f64 {
    0.5 * species
        .iter()
        .map(|s| s.concentration * s.charge * s.charge)
        .sum::<f64>()
}

/// Largest ion radius, which sets the ion-exclusion layer around the solute.
pub fn max_ion_radius(species: &[IonSpecies]) -> f64 {
    species.iter().map(|s| s.radius).fold(0.0, f64::max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct IonTerm {
    valence: f64,
    /// Number density in Å⁻³.
    density: f64,
    /// `4πλ c` in Å⁻².
    weight: f64,
}

/// The mobile-ion terms of the scaled Poisson-Boltzmann equation at a given temperature.
///
/// With `u` the potential in kT/e, the ionic charge term of the equation is
/// `b(u) = -4πλ Σ c_s z_s exp(-z_s u)` and its linearization is `κ̄² u`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MobileIons {
    terms: Vec<IonTerm>,
    kappa2: f64,
}

impl MobileIons {
    pub fn new(species: &[IonSpecies], temperature: f64) -> Self {
        let four_pi_lambda = 4.0 * PI * coulomb_length(temperature);
        let terms: Vec<IonTerm> = species
            .iter()
            .filter(|s| s.concentration > 0.0 && s.charge != 0.0)
            .map(|s| {
                let density = s.concentration * MOLAR_TO_PER_CUBIC_ANGSTROM;
                IonTerm {
                    valence: s.charge,
                    density,
                    weight: four_pi_lambda * density,
                }
            })
            .collect();
        let kappa2 = terms.iter().map(|t| t.weight * t.valence * t.valence).sum();
        Self { terms, kappa2 }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// `κ̄² = 4πλ Σ c z²` in Å⁻² (the vacuum-scaled squared inverse Debye length).
    #[inline]
    pub fn kappa2_bar(&self) -> f64 {
        self.kappa2
    }

    /// Bulk inverse Debye length `κ = sqrt(κ̄² / ε_s)` in Å⁻¹.
    pub fn debye_kappa(&self, solvent_dielectric: f64) -> f64 {
        (self.kappa2 / solvent_dielectric).sqrt()
    }

    /// Nonlinear ionic term `b(u)`.
    pub fn charge_term(&self, u: f64) -> f64 {
        -self
            .terms
            .iter()
            .map(|t| t.weight * t.valence * guarded_exp(-t.valence * u))
            .sum::<f64>()
    }

    /// `db/du`, always non-negative.
    pub fn charge_term_derivative(&self, u: f64) -> f64 {
        self.terms
            .iter()
            .map(|t| t.weight * t.valence * t.valence * guarded_exp_derivative(-t.valence * u))
            .sum()
    }

    /// Osmotic energy density `Σ c (e^{-z u} - 1)` in kT/Å³.
    pub fn osmotic_density(&self, u: f64) -> f64 {
        self.terms
            .iter()
            .map(|t| t.density * (guarded_exp(-t.valence * u) - 1.0))
            .sum()
    }
}
