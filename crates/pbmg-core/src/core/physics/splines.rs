//! Piecewise-polynomial kernels used for surface smoothing and charge assignment.

/// Cubic smooth step describing how "outside" a point at distance `d` is from a sphere of
/// `radius`: 0 for `d <= radius - window`, 1 for `d >= radius + window`, and
/// `3t² - 2t³` in between with `t = (d - radius + window) / (2 window)`.
///
/// A zero window gives the sharp characteristic function.
#[inline]
pub fn smooth_step(d: f64, radius: f64, window: f64) -> f64 {
    if window <= 0.0 {
        return if d < radius { 0.0 } else { 1.0 };
    }
    if d <= radius - window {
        0.0
    } else if d >= radius + window {
        1.0
    } else {
        let t = (d - radius + window) / (2.0 * window);
        t * t * (3.0 - 2.0 * t)
    }
}

/// Derivative of [`smooth_step`] with respect to `d`.
#[inline]
pub fn smooth_step_derivative(d: f64, radius: f64, window: f64) -> f64 {
    if window <= 0.0 || d <= radius - window || d >= radius + window {
        return 0.0;
    }
    let t = (d - radius + window) / (2.0 * window);
    6.0 * t * (1.0 - t) / (2.0 * window)
}

/// Cubic B-spline weights for the four nodes `i0 - 1 ..= i0 + 2` of a point at fractional
/// offset `f` in `[0, 1)` from node `i0`.
#[inline]
pub fn cubic_bspline_weights(f: f64) -> [f64; 4] {
    let g = 1.0 - f;
    let f2 = f * f;
    let f3 = f2 * f;
    [
        g * g * g / 6.0,
        (3.0 * f3 - 6.0 * f2 + 4.0) / 6.0,
        (-3.0 * f3 + 3.0 * f2 + 3.0 * f + 1.0) / 6.0,
        f3 / 6.0,
    ]
}

/// Derivatives of [`cubic_bspline_weights`] with respect to `f`.
#[inline]
pub fn cubic_bspline_derivatives(f: f64) -> [f64; 4] {
    let g = 1.0 - f;
    [
        -0.5 * g * g,
        0.5 * (3.0 * f * f - 4.0 * f),
        0.5 * (-3.0 * f * f + 2.0 * f + 1.0),
        0.5 * f * f,
    ]
}

/// Linear (cloud-in-cell) weights for nodes `i0` and `i0 + 1`.
#[inline]
pub fn linear_weights(f: f64) -> [f64; 2] {
    [1.0 - f, f]
}

#[inline]
pub fn linear_derivatives(_f: f64) -> [f64; 2] {
    [-1.0, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn smooth_step_is_continuous_at_window_edges() {
        assert_eq!(smooth_step(1.7, 2.0, 0.3), 0.0);
        assert_eq!(smooth_step(2.3, 2.0, 0.3), 1.0);
        assert!(f64_approx_equal(smooth_step(2.0, 2.0, 0.3), 0.5));
        assert!(smooth_step(1.7 + 1e-9, 2.0, 0.3) < 1e-15);
    }

    #[test]
    fn smooth_step_derivative_matches_finite_difference() {
        let eps = 1e-6;
        for d in [1.75, 1.9, 2.0, 2.21] {
            let fd = (smooth_step(d + eps, 2.0, 0.3) - smooth_step(d - eps, 2.0, 0.3)) / (2.0 * eps);
            assert!((fd - smooth_step_derivative(d, 2.0, 0.3)).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_window_gives_sharp_step() {
        assert_eq!(smooth_step(1.999, 2.0, 0.0), 0.0);
        assert_eq!(smooth_step(2.0, 2.0, 0.0), 1.0);
        assert_eq!(smooth_step_derivative(2.0, 2.0, 0.0), 0.0);
    }

    #[test]
    fn bspline_weights_form_partition_of_unity() {
        for f in [0.0, 0.13, 0.5, 0.77, 0.999] {
            let w = cubic_bspline_weights(f);
            let dw = cubic_bspline_derivatives(f);
            assert!(f64_approx_equal(w.iter().sum(), 1.0));
            assert!(f64_approx_equal(dw.iter().sum(), 0.0));
            // First moment reproduces the position.
            let moment: f64 = w.iter().enumerate().map(|(n, w)| (n as f64 - 1.0) * w).sum();
            assert!(f64_approx_equal(moment, f));
        }
    }

    #[test]
    fn bspline_derivatives_match_finite_difference() {
        let eps = 1e-6;
        let f = 0.37;
        let plus = cubic_bspline_weights(f + eps);
        let minus = cubic_bspline_weights(f - eps);
        let dw = cubic_bspline_derivatives(f);
        for n in 0..4 {
            assert!(((plus[n] - minus[n]) / (2.0 * eps) - dw[n]).abs() < 1e-8);
        }
    }
}
