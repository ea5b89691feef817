use nalgebra::{Point3, Vector3};

/// Represents a point charge with an excluded-volume radius.
///
/// Atoms are immutable inputs to mapping and evaluation; the engine only ever borrows them.
/// Positions are in Ångström, charges in elementary charges and radii in Ångström.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The 3D coordinates of the atom center in Angstroms.
    pub position: Point3<f64>,
    /// The partial atomic charge in elementary charge units.
    pub charge: f64,
    /// The atomic (van der Waals) radius in Angstroms.
    pub radius: f64,
}

impl Atom {
    pub fn new(position: Point3<f64>, charge: f64, radius: f64) -> Self {
        Self {
            position,
            charge,
            radius,
        }
    }

    #[inline]
    pub fn coords(&self) -> [f64; 3] {
        [self.position.x, self.position.y, self.position.z]
    }
}

/// Per-atom decomposition of the solvation force, in kT/Å.
///
/// Each component is the negative gradient, with respect to the atom position, of the
/// corresponding part of the solvation energy.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AtomForce {
    /// Ionic-boundary force from the position dependence of the ion accessibility map.
    pub ib: Vector3<f64>,
    /// Fixed-charge force from the interaction of the atom charge with the potential.
    pub qf: Vector3<f64>,
    /// Dielectric-boundary force from the position dependence of the dielectric map.
    pub db: Vector3<f64>,
    /// Nonpolar force from the surface-area term.
    pub np: Vector3<f64>,
}

impl AtomForce {
    /// The sum of all four components.
    pub fn total(&self) -> Vector3<f64> {
        self.ib + self.qf + self.db + self.np
    }

    /// The electrostatic part (everything but the nonpolar term).
    pub fn electrostatic(&self) -> Vector3<f64> {
        self.ib + self.qf + self.db
    }
}
