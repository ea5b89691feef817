//! # Mapping Module
//!
//! Turns an atom list into the coefficient maps of the discretized Poisson-Boltzmann
//! equation:
//!
//! - **Dielectric map** - three staggered components; component `x` at node `(i, j, k)` holds
//!   the dielectric constant on the face between nodes `(i, j, k)` and `(i + 1, j, k)`, and
//!   likewise for `y` and `z`. All three share the node topology of the calculation.
//! - **Accessibility map** - values in `[0, 1]` giving how accessible each node is to mobile
//!   ions (zero inside the ion-inflated atom spheres, one in bulk).
//! - **Charge map** - atomic point charges (in e) spread over nodes with trilinear or cubic
//!   B-spline weights; the node values sum to the total charge.
//!
//! Maps may also be supplied externally through [`FieldMaps::from_external`], which only
//! checks that they agree with the grid.

pub mod neighbors;
pub mod stencil;
pub mod surface;

use crate::core::grid::{GridField, GridTopology};
use crate::core::models::atom::Atom;
use crate::engine::config::{ConfigError, GridParameters, PbeParameters, SurfaceMethod};
use stencil::atom_stencils;
use surface::{MolecularSurface, SplineSurface, face_offset, sample_grid};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingError {
    #[error("Atom {index} at ({x:.3}, {y:.3}, {z:.3}) lies outside the grid domain")]
    AtomOutsideDomain { index: usize, x: f64, y: f64, z: f64 },

    #[error("Grid of dimensions {dims:?} is too small for charge stencils spanning {support} nodes")]
    GridTooSmall { dims: [usize; 3], support: usize },
}

/// Staggered dielectric coefficients, one component per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct DielectricMap {
    pub x: GridField,
    pub y: GridField,
    pub z: GridField,
}

impl DielectricMap {
    pub fn uniform(topology: GridTopology, dielectric: f64) -> Self {
        Self {
            x: GridField::filled(topology, dielectric),
            y: GridField::filled(topology, dielectric),
            z: GridField::filled(topology, dielectric),
        }
    }

    pub fn component(&self, axis: usize) -> &GridField {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }

    pub fn components(&self) -> [&GridField; 3] {
        [&self.x, &self.y, &self.z]
    }
}

/// The complete coefficient set of one calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMaps {
    pub dielectric: DielectricMap,
    pub accessibility: GridField,
    pub charge: GridField,
}

impl FieldMaps {
    /// Wraps externally supplied maps after checking them against the grid.
    pub fn from_external(
        dielectric: DielectricMap,
        accessibility: GridField,
        charge: GridField,
        grid: &GridParameters,
    ) -> Result<Self, ConfigError> {
        let maps = Self {
            dielectric,
            accessibility,
            charge,
        };
        maps.validate(&grid.topology())?;
        Ok(maps)
    }

    pub fn topology(&self) -> &GridTopology {
        self.charge.topology()
    }

    /// Every map must share the exact topology of the calculation.
    pub fn validate(&self, topology: &GridTopology) -> Result<(), ConfigError> {
        let named = [
            ("dielectric-x", &self.dielectric.x),
            ("dielectric-y", &self.dielectric.y),
            ("dielectric-z", &self.dielectric.z),
            ("accessibility", &self.accessibility),
            ("charge", &self.charge),
        ];
        for (map, field) in named {
            if field.dims() != topology.dims {
                return Err(ConfigError::IncompatibleMap {
                    map,
                    expected: topology.dims,
                    found: field.dims(),
                });
            }
            if !field.topology().is_compatible(topology) {
                return Err(ConfigError::MisplacedMap { map });
            }
        }
        Ok(())
    }

    pub fn total_charge(&self) -> f64 {
        self.charge.sum()
    }
}

/// Builds [`FieldMaps`] from atoms for one grid and one set of PBE parameters.
pub struct MoleculeMapper<'a> {
    grid: &'a GridParameters,
    pbe: &'a PbeParameters,
    topology: GridTopology,
}

impl<'a> MoleculeMapper<'a> {
    pub fn new(grid: &'a GridParameters, pbe: &'a PbeParameters) -> Self {
        Self {
            grid,
            pbe,
            topology: grid.topology(),
        }
    }

    pub fn topology(&self) -> &GridTopology {
        &self.topology
    }

    #[instrument(skip_all, name = "map_molecule")]
    pub fn build_all(&self, atoms: &[Atom]) -> Result<FieldMaps, MappingError> {
        info!(
            atoms = atoms.len(),
            dims = ?self.topology.dims,
            surface = ?self.pbe.surface.method,
            "Mapping molecule onto grid."
        );
        let charge = self.build_charge_map(atoms)?;
        let dielectric = self.build_dielectric_map(atoms);
        let accessibility = self.build_accessibility_map(atoms);
        Ok(FieldMaps {
            dielectric,
            accessibility,
            charge,
        })
    }

    pub fn build_dielectric_map(&self, atoms: &[Atom]) -> DielectricMap {
        let eps_in = self.pbe.solute_dielectric;
        let eps_out = self.pbe.solvent_dielectric;
        let surface = &self.pbe.surface;
        let topo = self.topology;

        let fields: [GridField; 3] = match surface.method {
            SurfaceMethod::Spline => {
                let sampler = SplineSurface::new(atoms, surface.smoothing_window);
                std::array::from_fn(|axis| {
                    let values = sample_grid(&topo, face_offset(&topo, axis), |p| {
                        eps_in + (eps_out - eps_in) * sampler.solvent_fraction(&p, 0.0)
                    });
                    GridField::from_sampled(topo, values)
                })
            }
            SurfaceMethod::Molecular => {
                let sampler = MolecularSurface::new(
                    atoms,
                    surface.solvent_radius,
                    surface.sphere_density,
                );
                debug!(probes = sampler.probe_count(), "Built solvent probe set.");
                std::array::from_fn(|axis| {
                    let values = sample_grid(&topo, face_offset(&topo, axis), |p| {
                        if sampler.is_solvent(&p) { eps_out } else { eps_in }
                    });
                    GridField::from_sampled(topo, values)
                })
            }
            SurfaceMethod::SmoothedMolecular => {
                let sampler = MolecularSurface::new(
                    atoms,
                    surface.solvent_radius,
                    surface.sphere_density,
                );
                debug!(probes = sampler.probe_count(), "Built solvent probe set.");
                let nodal = sample_grid(&topo, [0.0; 3], |p| {
                    if sampler.is_solvent(&p) { eps_out } else { eps_in }
                });
                std::array::from_fn(|axis| {
                    GridField::from_sampled(topo, harmonic_faces(&topo, &nodal, axis))
                })
            }
        };
        let [x, y, z] = fields;
        DielectricMap { x, y, z }
    }

    pub fn build_accessibility_map(&self, atoms: &[Atom]) -> GridField {
        let topo = self.topology;
        let inflation = self.pbe.ion_exclusion_radius();
        let window = match self.pbe.surface.method {
            SurfaceMethod::Spline => self.pbe.surface.smoothing_window,
            SurfaceMethod::Molecular | SurfaceMethod::SmoothedMolecular => 0.0,
        };
        let sampler = SplineSurface::new(atoms, window);
        let values = sample_grid(&topo, [0.0; 3], |p| sampler.solvent_fraction(&p, inflation));
        GridField::from_sampled(topo, values)
    }

    pub fn build_charge_map(&self, atoms: &[Atom]) -> Result<GridField, MappingError> {
        let stencils = atom_stencils(&self.topology, self.grid, atoms)?;
        let mut charge = GridField::new(self.topology);
        let values = charge.values_mut();
        for (atom, stencil) in atoms.iter().zip(&stencils) {
            for node in stencil.nodes() {
                values[node.index] += atom.charge * node.weight;
            }
        }
        debug!(total = charge.sum(), "Assigned atomic charges to grid.");
        Ok(charge)
    }
}

/// Face values as the harmonic mean of the two nodal values they join.
fn harmonic_faces(topology: &GridTopology, nodal: &[f64], axis: usize) -> Vec<f64> {
    let dims = topology.dims;
    (0..topology.len())
        .map(|idx| {
            let (i, j, k) = topology.coords(idx);
            let mut next = [i, j, k];
            next[axis] += 1;
            if next[axis] >= dims[axis] {
                return nodal[idx];
            }
            let a = nodal[idx];
            let b = nodal[topology.index(next[0], next[1], next[2])];
            2.0 * a * b / (a + b)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::physics::ions::IonSpecies;
    use crate::engine::config::{
        AtomDomainAction, AtomDomainPolicy, ChargeMethod, GridParametersBuilder,
        PbeParametersBuilder, SurfaceDefinition,
    };
    use nalgebra::Point3;

    fn grid(method: ChargeMethod) -> GridParameters {
        GridParametersBuilder::new()
            .dims([33, 33, 33])
            .uniform_spacing(0.5)
            .center([0.0; 3])
            .charge_method(method)
            .build()
            .unwrap()
    }

    fn pbe(method: SurfaceMethod) -> PbeParameters {
        PbeParametersBuilder::new()
            .temperature(298.15)
            .solute_dielectric(2.0)
            .solvent_dielectric(78.54)
            .ion(IonSpecies::new(1.0, 0.15, 2.0))
            .ion(IonSpecies::new(-1.0, 0.15, 2.0))
            .surface(SurfaceDefinition {
                method,
                ..SurfaceDefinition::default()
            })
            .build()
            .unwrap()
    }

    fn scattered_atoms() -> Vec<Atom> {
        (0..25)
            .map(|n| {
                let t = n as f64;
                Atom::new(
                    Point3::new(
                        5.0 * (0.7 * t).sin(),
                        4.5 * (1.3 * t + 0.4).cos(),
                        3.9 * (0.37 * t).sin() * (t * 2.1).cos(),
                    ),
                    if n % 3 == 0 { -0.8 } else { 0.45 + 0.01 * t },
                    1.2 + 0.02 * t,
                )
            })
            .collect()
    }

    #[test]
    fn charge_map_conserves_total_charge() {
        let atoms = scattered_atoms();
        let expected: f64 = atoms.iter().map(|a| a.charge).sum();
        for method in [ChargeMethod::Trilinear, ChargeMethod::CubicBSpline] {
            let grid = grid(method);
            let pbe = pbe(SurfaceMethod::Spline);
            let charge = MoleculeMapper::new(&grid, &pbe)
                .build_charge_map(&atoms)
                .unwrap();
            assert!(
                (charge.sum() - expected).abs() < 1e-12,
                "{:?}: {} vs {}",
                method,
                charge.sum(),
                expected
            );
        }
    }

    #[test]
    fn atom_outside_domain_fails_or_clips_per_policy() {
        let atoms = vec![Atom::new(Point3::new(9.0, 0.0, 0.0), 1.0, 1.5)];
        let mut grid = grid(ChargeMethod::CubicBSpline);
        let pbe = pbe(SurfaceMethod::Spline);
        let result = MoleculeMapper::new(&grid, &pbe).build_charge_map(&atoms);
        assert!(matches!(
            result,
            Err(MappingError::AtomOutsideDomain { index: 0, .. })
        ));

        grid.atom_policy = AtomDomainPolicy {
            action: AtomDomainAction::Fail,
            margin: 1.5,
        };
        assert!(MoleculeMapper::new(&grid, &pbe).build_charge_map(&atoms).is_ok());

        grid.atom_policy = AtomDomainPolicy {
            action: AtomDomainAction::Clip,
            margin: 0.0,
        };
        let charge = MoleculeMapper::new(&grid, &pbe)
            .build_charge_map(&atoms)
            .unwrap();
        assert!((charge.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn spline_maps_span_solute_to_solvent() {
        let atoms = vec![Atom::new(Point3::new(0.0, 0.0, 0.0), 1.0, 2.0)];
        let grid = grid(ChargeMethod::CubicBSpline);
        let pbe = pbe(SurfaceMethod::Spline);
        let mapper = MoleculeMapper::new(&grid, &pbe);
        let maps = mapper.build_all(&atoms).unwrap();
        let topo = *mapper.topology();

        // Node (16,16,16) is the atom centre; the x face at (16,16,16) sits 0.25 Å away.
        assert_eq!(maps.dielectric.x.get(16, 16, 16).unwrap(), 2.0);
        assert!((maps.dielectric.x.get(31, 16, 16).unwrap() - 78.54).abs() < 1e-12);
        assert_eq!(maps.accessibility.get(16, 16, 16).unwrap(), 0.0);
        assert_eq!(maps.accessibility.get(0, 0, 0).unwrap(), 1.0);
        // Inside the ion-exclusion layer (2 Å + 2 Å ion radius) but outside the atom.
        assert_eq!(maps.accessibility.get(16 + 7, 16, 16).unwrap(), 0.0);
        assert!((maps.dielectric.x.get(16 + 7, 16, 16).unwrap() - 78.54).abs() < 1e-12);
        assert!(maps.validate(&topo).is_ok());
        for &v in maps.accessibility.values() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn molecular_surface_of_single_atom_matches_its_sphere() {
        let atoms = vec![Atom::new(Point3::new(0.0, 0.0, 0.0), 1.0, 2.0)];
        let grid = grid(ChargeMethod::CubicBSpline);
        let pbe = pbe(SurfaceMethod::Molecular);
        let dielectric = MoleculeMapper::new(&grid, &pbe).build_dielectric_map(&atoms);
        // y faces of node (16, 16, 16 + m) lie at distance sqrt((0.5m)^2 + 0.25^2) from the centre.
        assert_eq!(dielectric.y.get(16, 16, 16 + 3).unwrap(), 2.0);
        assert_eq!(dielectric.y.get(16, 16, 16 + 5).unwrap(), 78.54);
    }

    #[test]
    fn molecular_surface_fills_crevice_between_touching_atoms() {
        let atoms = vec![
            Atom::new(Point3::new(-1.9, 0.0, 0.0), 0.0, 2.0),
            Atom::new(Point3::new(1.9, 0.0, 0.0), 0.0, 2.0),
        ];
        let surface = MolecularSurface::new(&atoms, 1.4, 10.0);
        assert!(surface.probe_count() > 0);
        // Just outside both spheres near the contact ring: excluded from the probe.
        assert!(!surface.is_solvent(&[0.0, 0.9, 0.0]));
        // Far away from the molecule.
        assert!(surface.is_solvent(&[0.0, 6.0, 0.0]));
        // On the outer side of one atom, reachable by a probe.
        assert!(surface.is_solvent(&[-4.2, 0.0, 0.0]));
    }

    #[test]
    fn smoothed_molecular_faces_are_harmonic_means() {
        let atoms = vec![Atom::new(Point3::new(0.0, 0.0, 0.0), 1.0, 2.0)];
        let grid = grid(ChargeMethod::CubicBSpline);
        let pbe = pbe(SurfaceMethod::SmoothedMolecular);
        let dielectric = MoleculeMapper::new(&grid, &pbe).build_dielectric_map(&atoms);
        // Node 16+4 (2.0 Å, on the sphere) is solute, node 16+5 (2.5 Å) is solvent.
        let expected = 2.0 * 2.0 * 78.54 / (2.0 + 78.54);
        assert!((dielectric.x.get(16 + 4, 16, 16).unwrap() - expected).abs() < 1e-12);
        assert_eq!(dielectric.x.get(16 + 2, 16, 16).unwrap(), 2.0);
    }

    #[test]
    fn collinear_chain_maps_on_every_surface() {
        let chain: Vec<Atom> = (0..40)
            .map(|n| {
                let z = -6.8 + 0.35 * n as f64;
                Atom::new(Point3::new(0.0, 0.0, z), if n % 2 == 0 { 0.5 } else { -0.5 }, 1.0)
            })
            .collect();
        let grid = grid(ChargeMethod::CubicBSpline);
        for method in [SurfaceMethod::Spline, SurfaceMethod::Molecular] {
            let pbe = pbe(method);
            let maps = MoleculeMapper::new(&grid, &pbe).build_all(&chain).unwrap();
            let topology = grid.topology();
            let on_axis = topology.index(16, 16, 16);
            assert_eq!(maps.accessibility.values()[on_axis], 0.0);
            assert!(maps.total_charge().abs() < 1e-12);
        }
    }

    #[test]
    fn external_maps_with_wrong_dimensions_are_a_configuration_error() {
        let grid = grid(ChargeMethod::CubicBSpline);
        let topo = grid.topology();
        let wrong = GridTopology::centered([17, 17, 17], [0.5; 3], [0.0; 3]);
        let result = FieldMaps::from_external(
            DielectricMap::uniform(topo, 2.0),
            GridField::filled(wrong, 1.0),
            GridField::new(topo),
            &grid,
        );
        assert!(matches!(
            result,
            Err(ConfigError::IncompatibleMap {
                map: "accessibility",
                ..
            })
        ));
    }

    #[test]
    fn external_maps_on_shifted_grid_are_rejected() {
        let grid = grid(ChargeMethod::CubicBSpline);
        let topo = grid.topology();
        let shifted = GridTopology::centered(topo.dims, topo.spacing, [1.0, 0.0, 0.0]);
        let result = FieldMaps::from_external(
            DielectricMap::uniform(topo, 2.0),
            GridField::filled(topo, 1.0),
            GridField::new(shifted),
            &grid,
        );
        assert!(matches!(
            result,
            Err(ConfigError::MisplacedMap { map: "charge" })
        ));
    }
}
