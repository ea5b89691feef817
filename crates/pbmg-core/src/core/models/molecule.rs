use super::atom::Atom;
use nalgebra::Point3;
use std::fmt;

/// Index of a molecule in the list handed to the workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MoleculeId(pub usize);

impl fmt::Display for MoleculeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "molecule #{}", self.0 + 1)
    }
}

/// An ordered list of atoms treated as one solute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Molecule {
    pub name: String,
    atoms: Vec<Atom>,
}

impl Molecule {
    pub fn new(name: impl Into<String>, atoms: Vec<Atom>) -> Self {
        Self {
            name: name.into(),
            atoms,
        }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn total_charge(&self) -> f64 {
        self.atoms.iter().map(|a| a.charge).sum()
    }

    /// Geometric center of the atom positions (the origin for an empty molecule).
    pub fn center(&self) -> Point3<f64> {
        if self.atoms.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .atoms
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, a| acc + a.position.coords);
        Point3::from(sum / self.atoms.len() as f64)
    }

    /// Radius of the smallest sphere about [`Molecule::center`] enclosing every atom sphere.
    pub fn radius(&self) -> f64 {
        let center = self.center();
        self.atoms
            .iter()
            .map(|a| (a.position - center).norm() + a.radius)
            .fold(0.0, f64::max)
    }

    /// Axis-aligned bounds of the atom spheres as `(min, max)` corners.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        if self.atoms.is_empty() {
            return None;
        }
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for atom in &self.atoms {
            let c = atom.coords();
            for d in 0..3 {
                lo[d] = lo[d].min(c[d] - atom.radius);
                hi[d] = hi[d].max(c[d] + atom.radius);
            }
        }
        Some((lo, hi))
    }
}
