use nalgebra::Vector3;
use std::f64::consts::PI;

/// `n` quasi-uniform unit vectors on a golden-angle spiral.
pub fn fibonacci_sphere(n: usize) -> Vec<Vector3<f64>> {
    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
    (0..n)
        .map(|i| {
            let z = 1.0 - (2.0 * i as f64 + 1.0) / n as f64;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let phi = golden_angle * i as f64;
            Vector3::new(r * phi.cos(), r * phi.sin(), z)
        })
        .collect()
}

/// Number of points giving `density` points per Å² on a sphere of `radius`.
pub fn sphere_point_count(radius: f64, density: f64) -> usize {
    ((4.0 * PI * radius * radius * density).ceil() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fibonacci_points_are_unit_vectors() {
        for p in fibonacci_sphere(100) {
            assert!((p.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn fibonacci_points_are_balanced() {
        let centroid: Vector3<f64> = fibonacci_sphere(500).iter().sum::<Vector3<f64>>() / 500.0;
        assert!(centroid.norm() < 1e-2);
    }

    #[test]
    fn point_count_scales_with_area() {
        assert_eq!(sphere_point_count(1.0, 1.0), 13);
        assert_eq!(sphere_point_count(0.0, 10.0), 1);
    }
}
