use nalgebra::{Point2, Point3, Vector3};

/// The point value used to signal "no mode" for an input point.
///
/// Rejected candidates, out-of-extent raster lookups and first-iteration
/// degeneracies all collapse into this sentinel, preserving the 1:1
/// alignment between inputs and results.
#[inline]
pub fn nan_point() -> Point3<f64> {
    Point3::new(f64::NAN, f64::NAN, f64::NAN)
}

/// Checks that all three coordinates are finite (neither NaN nor infinite).
#[inline]
pub fn is_finite_point(p: &Point3<f64>) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}

/// Projects a 3d point onto the horizontal plane.
#[inline]
pub fn xy_of(p: &Point3<f64>) -> Point2<f64> {
    Point2::new(p.x, p.y)
}

/// Euclidean distance between two points.
#[inline]
pub fn euclidean_distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    nalgebra::distance(a, b)
}

/// Squared euclidean distance.
///
/// Orders the same as [euclidean_distance] while being cheaper to compute,
/// so it is used wherever distances are only compared against each other
/// or against a squared threshold.
#[inline]
pub fn comparable_distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    nalgebra::distance_squared(a, b)
}

/// Squared horizontal distance between a 2d center and a 3d point.
#[inline]
pub fn horizontal_distance_sq(center: &Point2<f64>, p: &Point3<f64>) -> f64 {
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    dx * dx + dy * dy
}

/// Componentwise weighted mean `Σ wᵢ·pᵢ / Σ wᵢ` of the given points.
///
/// Returns `None` if the weights sum to zero, in which case the mean is
/// undefined.
pub fn weighted_mean(points: &[Point3<f64>], weights: &[f64]) -> Option<Point3<f64>> {
    debug_assert_eq!(points.len(), weights.len());
    let mut weighted_sum = Vector3::zeros();
    let mut weight_sum = 0.0;
    for (point, weight) in points.iter().zip(weights) {
        weighted_sum += point.coords * *weight;
        weight_sum += *weight;
    }
    if weight_sum == 0.0 {
        None
    } else {
        Some(Point3::from(weighted_sum / weight_sum))
    }
}
