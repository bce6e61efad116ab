use crate::geometry::{horizontal_distance_sq, weighted_mean, xy_of};
use crate::index::PointCloudIndex;
use nalgebra::{Point2, Point3};

/// Coefficient of the Gaussian vertical kernel profile.
pub const GAUSSIAN_GAMMA: f64 = -5.0;

/// The mean shift kernel: an asymmetric truncated vertical cylinder.
///
/// The cylinder always spans its full height, one quarter below the
/// candidate elevation and three quarters above it. When that would reach
/// below the ground, the bottom is clamped to the ground and the cylinder
/// keeps its height by extending further up. The asymmetry is what makes
/// the iteration climb towards the crown apex instead of settling in the
/// middle of the crown.
///
/// Radius and height are fixed for a whole per-point iteration (they
/// derive from the original candidate, see
/// [crate::meanshift]); only the center is relocated between iterations.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Kernel {
    xy_center: Point2<f64>,
    center_z: f64,
    radius: f64,
    height: f64,
    radius_sq: f64,
    half_height: f64,
    half_height_sq: f64,
}

impl Kernel {
    /// Places a kernel of the given dimensions around `center`.
    ///
    /// `ground_elevation` is the ground under the original candidate; in
    /// clouds of normalized heights it is simply 0.
    pub fn new(center: &Point3<f64>, ground_elevation: f64, radius: f64, height: f64) -> Self {
        let bottom_above_ground = (center.z - ground_elevation - height / 4.0).max(0.0);
        let bottom_z = ground_elevation + bottom_above_ground;
        let half_height = height / 2.0;
        Kernel {
            xy_center: xy_of(center),
            center_z: bottom_z + half_height,
            radius,
            height,
            radius_sq: radius * radius,
            half_height,
            half_height_sq: half_height * half_height,
        }
    }

    #[inline]
    pub fn xy_center(&self) -> Point2<f64> {
        self.xy_center
    }

    #[inline]
    pub fn center_z(&self) -> f64 {
        self.center_z
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }

    #[inline]
    pub fn bottom_z(&self) -> f64 {
        self.center_z - self.half_height
    }

    #[inline]
    pub fn top_z(&self) -> f64 {
        self.center_z + self.half_height
    }

    /// Weight of a point inside the kernel: an Epanechnikov profile over
    /// the squared relative horizontal distance times a Gaussian profile
    /// over the squared relative vertical distance.
    ///
    /// The published formulation applies both profiles to distances and
    /// squares them inside; passing the squared relative distances and
    /// omitting the inner squaring yields the identical value. For the
    /// same reason the vertical distance is taken to the cylinder center
    /// directly rather than to the boundary.
    #[inline]
    pub fn weight_at(&self, p: &Point3<f64>) -> f64 {
        let rel_horizontal_sq = horizontal_distance_sq(&self.xy_center, p) / self.radius_sq;
        let dz = p.z - self.center_z;
        let rel_vertical_sq = dz * dz / self.half_height_sq;
        (1.0 - rel_horizontal_sq) * (GAUSSIAN_GAMMA * rel_vertical_sq).exp()
    }

    /// The weighted centroid of all indexed points inside the kernel.
    ///
    /// Returns `None` when no point lies inside the kernel or the weights
    /// sum to zero; the caller decides how to terminate in that case.
    pub fn centroid(
        &self,
        index: &PointCloudIndex,
        scratch: &mut QueryScratch,
    ) -> Option<Point3<f64>> {
        scratch.points.clear();
        scratch.weights.clear();
        for p in
            index.vertical_cylinder_query(self.xy_center, self.radius, self.bottom_z(), self.top_z())
        {
            scratch.points.push(*p);
            scratch.weights.push(self.weight_at(p));
        }
        weighted_mean(&scratch.points, &scratch.weights)
    }
}

/// Reusable buffers for kernel queries.
///
/// Owned by one driver invocation at a time, so repeated iterations (and
/// repeated points on the same worker) do not reallocate.
#[derive(Debug, Default)]
pub struct QueryScratch {
    points: Vec<Point3<f64>>,
    weights: Vec<f64>,
}
