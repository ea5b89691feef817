/// `e² / (4π ε0 k_B)` in Å·K; divided by a temperature it gives the vacuum Bjerrum length.
pub const COULOMB_LENGTH_KELVIN: f64 = 167_100.946_898_287_37;
/// Number of particles per Å³ in a one-molar solution.
pub const MOLAR_TO_PER_CUBIC_ANGSTROM: f64 = 6.022_140_76e-4;
/// Molar gas constant in kJ/(mol·K).
pub const GAS_CONSTANT_KJ_PER_MOL_K: f64 = 0.008_314_462_618_153_24;
/// Beyond this argument the exponential continues along its tangent.
pub const EXP_ARGUMENT_LIMIT: f64 = 85.0;

/// Vacuum Bjerrum length `λ = e² / (4π ε0 k_B T)` in Å.
#[inline]
pub fn coulomb_length(temperature: f64) -> f64 {
    COULOMB_LENGTH_KELVIN / temperature
}

#[inline]
pub fn kt_in_kj_per_mol(temperature: f64) -> f64 {
    GAS_CONSTANT_KJ_PER_MOL_K * temperature
}

#[inline]
pub fn kt_to_kj_per_mol(energy_kt: f64, temperature: f64) -> f64 {
    energy_kt * kt_in_kj_per_mol(temperature)
}

#[inline]
pub fn kj_per_mol_to_kt(energy: f64, temperature: f64) -> f64 {
    energy / kt_in_kj_per_mol(temperature)
}

/// `e^x` that never overflows: above [`EXP_ARGUMENT_LIMIT`] it is extended by its first-order
/// Taylor polynomial about the limit.
#[inline]
pub fn guarded_exp(x: f64) -> f64 {
    if x > EXP_ARGUMENT_LIMIT {
        EXP_ARGUMENT_LIMIT.exp() * (1.0 + (x - EXP_ARGUMENT_LIMIT))
    } else {
        x.exp()
    }
}

/// Derivative of [`guarded_exp`].
#[inline]
pub fn guarded_exp_derivative(x: f64) -> f64 {
    if x > EXP_ARGUMENT_LIMIT {
        EXP_ARGUMENT_LIMIT.exp()
    } else {
        x.exp()
    }
}
