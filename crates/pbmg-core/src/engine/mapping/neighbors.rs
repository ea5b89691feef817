use crate::core::models::atom::Atom;
use kiddo::{ImmutableKdTree, SquaredEuclidean};

/// Spatial index answering "which atom spheres, inflated by `reach`, contain this point".
pub struct AtomNeighborhood<'a> {
    atoms: &'a [Atom],
    tree: Option<ImmutableKdTree<f64, 3>>,
    max_radius: f64,
}

impl<'a> AtomNeighborhood<'a> {
    pub fn new(atoms: &'a [Atom]) -> Self {
        let positions: Vec<[f64; 3]> = atoms.iter().map(Atom::coords).collect();
        let tree = if positions.is_empty() {
            None
        } else {
            Some(ImmutableKdTree::new_from_slice(&positions))
        };
        let max_radius = atoms.iter().map(|a| a.radius).fold(0.0, f64::max);
        Self {
            atoms,
            tree,
            max_radius,
        }
    }

    pub fn atoms(&self) -> &'a [Atom] {
        self.atoms
    }

    /// Calls `visit(index, distance)` for every atom with `distance < radius + reach`.
    pub fn for_each_within<F>(&self, point: &[f64; 3], reach: f64, mut visit: F)
    where
        F: FnMut(usize, f64),
    {
        let Some(tree) = &self.tree else {
            return;
        };
        let cutoff = self.max_radius + reach;
        if cutoff <= 0.0 {
            return;
        }
        for neighbour in tree.within_unsorted::<SquaredEuclidean>(point, cutoff * cutoff) {
            let index = neighbour.item as usize;
            let distance = neighbour.distance.sqrt();
            if distance < self.atoms[index].radius + reach {
                visit(index, distance);
            }
        }
    }

    /// Whether any atom sphere inflated by `reach` contains `point`.
    pub fn any_within(&self, point: &[f64; 3], reach: f64) -> bool {
        let mut found = false;
        self.for_each_within(point, reach, |_, _| found = true);
        found
    }
}

/// Spatial index over bare points (e.g. solvent probe centres).
pub struct PointCloud {
    tree: Option<ImmutableKdTree<f64, 3>>,
}

impl PointCloud {
    pub fn new(points: &[[f64; 3]]) -> Self {
        let tree = if points.is_empty() {
            None
        } else {
            Some(ImmutableKdTree::new_from_slice(points))
        };
        Self { tree }
    }

    pub fn any_within(&self, point: &[f64; 3], radius: f64) -> bool {
        match &self.tree {
            Some(tree) => {
                tree.nearest_one::<SquaredEuclidean>(point).distance < radius * radius
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn atoms() -> Vec<Atom> {
        vec![
            Atom::new(Point3::new(0.0, 0.0, 0.0), 1.0, 1.5),
            Atom::new(Point3::new(4.0, 0.0, 0.0), -1.0, 2.0),
        ]
    }

    #[test]
    fn finds_atoms_by_their_own_radius() {
        let atoms = atoms();
        let neighborhood = AtomNeighborhood::new(&atoms);
        let mut hits = Vec::new();
        neighborhood.for_each_within(&[1.6, 0.0, 0.0], 0.0, |i, _| hits.push(i));
        assert!(hits.is_empty());
        neighborhood.for_each_within(&[1.6, 0.0, 0.0], 0.2, |i, _| hits.push(i));
        assert_eq!(hits, vec![0]);
        hits.clear();
        neighborhood.for_each_within(&[1.8, 0.0, 0.0], 0.5, |i, _| hits.push(i));
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
        assert!(neighborhood.any_within(&[2.1, 0.0, 0.0], 0.0));
    }

    #[test]
    fn empty_inputs_have_no_neighbours() {
        let neighborhood = AtomNeighborhood::new(&[]);
        assert!(!neighborhood.any_within(&[0.0; 3], 10.0));
        assert!(!PointCloud::new(&[]).any_within(&[0.0; 3], 10.0));
    }

    #[test]
    fn point_cloud_detects_points_inside_radius() {
        let cloud = PointCloud::new(&[[1.0, 1.0, 1.0], [5.0, 5.0, 5.0]]);
        assert!(cloud.any_within(&[1.5, 1.0, 1.0], 0.6));
        assert!(!cloud.any_within(&[3.0, 3.0, 3.0], 1.0));
    }

    #[test]
    fn collinear_chain_longer_than_a_bucket_is_indexed() {
        let chain: Vec<Atom> = (0..80)
            .map(|n| Atom::new(Point3::new(0.0, 0.0, 1.5 * n as f64), 0.0, 1.0))
            .collect();
        let neighborhood = AtomNeighborhood::new(&chain);
        let mut hits = Vec::new();
        neighborhood.for_each_within(&[0.0, 0.0, 30.0], 0.6, |i, _| hits.push(i));
        hits.sort_unstable();
        assert_eq!(hits, vec![19, 20, 21]);
        assert!(!neighborhood.any_within(&[3.0, 0.0, 30.0], 0.5));
    }

    #[test]
    fn planar_point_cloud_with_shared_coordinates_is_indexed() {
        let sheet: Vec<[f64; 3]> = (0..100)
            .map(|n| [0.0, (n % 10) as f64, (n / 10) as f64])
            .collect();
        let cloud = PointCloud::new(&sheet);
        assert!(cloud.any_within(&[0.2, 4.0, 7.0], 0.3));
        assert!(!cloud.any_within(&[1.0, 4.5, 7.5], 0.5));
    }
}
