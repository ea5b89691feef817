use super::constants::coulomb_length;

/// Potential (kT/e) at `distance` from a Debye-Hückel sphere of total `charge` and
/// ion-exclusion `radius` immersed in a dielectric continuum with inverse Debye length
/// `kappa`.
#[inline]
pub fn sphere_potential(
    charge: f64,
    radius: f64,
    distance: f64,
    kappa: f64,
    solvent_dielectric: f64,
    temperature: f64,
) -> f64 {
    let r = distance.max(f64::EPSILON);
    coulomb_length(temperature) * charge * (-kappa * (r - radius)).exp()
        / (solvent_dielectric * (1.0 + kappa * radius) * r)
}
