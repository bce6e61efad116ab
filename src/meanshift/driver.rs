use crate::geometry::{euclidean_distance, is_finite_point, nan_point, xy_of};
use crate::index::PointCloudIndex;
use crate::kernel::{Kernel, QueryScratch};
use crate::raster::Raster;
use nalgebra::Point3;

/// Per-point mean shift over a prebuilt index.
///
/// All fields are shared, read-only state of one extraction run; the
/// driver itself carries no per-point state and can be used from several
/// workers at once.
pub(crate) struct MeanShiftDriver<'a> {
    pub index: &'a PointCloudIndex,
    pub ground: &'a dyn Raster<f64>,
    pub crown_diameter_to_tree_height: &'a dyn Raster<f64>,
    pub crown_height_to_tree_height: &'a dyn Raster<f64>,
    pub min_height_above_ground: &'a dyn Raster<f64>,
    pub centroid_convergence_distance: f64,
    pub max_num_centroids_per_mode: usize,
}

impl MeanShiftDriver<'_> {
    /// Computes the mode of one candidate point.
    ///
    /// Rejected candidates yield the NaN sentinel with an untouched trace.
    /// `trace`, when present, receives the successive centroids s₁, s₂, …
    /// (the candidate itself is never recorded), at most
    /// [Self::max_num_centroids_per_mode] of them.
    ///
    /// The canopy ratios and the ground elevation are read once, at the
    /// candidate's location; the kernel dimensions they determine stay
    /// fixed while the kernel center moves.
    pub fn mode_of(
        &self,
        candidate: &Point3<f64>,
        scratch: &mut QueryScratch,
        mut trace: Option<&mut Vec<Point3<f64>>>,
    ) -> Point3<f64> {
        if !is_finite_point(candidate) {
            return nan_point();
        }
        let xy = xy_of(candidate);
        let Ok(ground_elevation) = self.ground.value_at(xy) else {
            return nan_point();
        };
        let height_above_ground = candidate.z - ground_elevation;
        if !height_above_ground.is_finite() {
            return nan_point();
        }
        let Ok(min_height) = self.min_height_above_ground.value_at(xy) else {
            return nan_point();
        };
        if !min_height.is_finite() || height_above_ground < min_height {
            return nan_point();
        }
        let Ok(diameter_ratio) = self.crown_diameter_to_tree_height.value_at(xy) else {
            return nan_point();
        };
        let Ok(height_ratio) = self.crown_height_to_tree_height.value_at(xy) else {
            return nan_point();
        };
        if !diameter_ratio.is_finite() || !height_ratio.is_finite() {
            return nan_point();
        }
        let kernel_radius = height_above_ground * diameter_ratio / 2.0;
        let kernel_height = height_above_ground * height_ratio;
        // zero-sized kernels cannot weight any point
        if kernel_radius <= 0.0 || kernel_height <= 0.0 {
            return nan_point();
        }

        let mut current = *candidate;
        for iteration in 0..self.max_num_centroids_per_mode {
            let kernel = Kernel::new(&current, ground_elevation, kernel_radius, kernel_height);
            let Some(next) = kernel.centroid(self.index, scratch) else {
                // degenerate step: the previous center is the mode
                if iteration == 0 {
                    return nan_point();
                }
                return current;
            };
            if let Some(trace) = trace.as_mut() {
                trace.push(next);
            }
            let step = euclidean_distance(&current, &next);
            current = next;
            if step <= self.centroid_convergence_distance {
                break;
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{ConstantRaster, GridRaster};
    use nalgebra::point;

    fn constant_driver<'a>(
        index: &'a PointCloudIndex,
        rasters: &'a (
            ConstantRaster<f64>,
            ConstantRaster<f64>,
            ConstantRaster<f64>,
            ConstantRaster<f64>,
        ),
        epsilon: f64,
        max_num_centroids: usize,
    ) -> MeanShiftDriver<'a> {
        MeanShiftDriver {
            index,
            ground: &rasters.0,
            crown_diameter_to_tree_height: &rasters.1,
            crown_height_to_tree_height: &rasters.2,
            min_height_above_ground: &rasters.3,
            centroid_convergence_distance: epsilon,
            max_num_centroids_per_mode: max_num_centroids,
        }
    }

    fn default_rasters() -> (
        ConstantRaster<f64>,
        ConstantRaster<f64>,
        ConstantRaster<f64>,
        ConstantRaster<f64>,
    ) {
        (
            ConstantRaster::new(0.0), // ground
            ConstantRaster::new(0.2), // crown diameter / tree height
            ConstantRaster::new(0.5), // crown height / tree height
            ConstantRaster::new(1.0), // min height above ground
        )
    }

    #[test]
    fn non_finite_candidates_are_rejected() {
        let index = PointCloudIndex::build([point![0.0, 0.0, 10.0]].iter());
        let rasters = default_rasters();
        let driver = constant_driver(&index, &rasters, 0.01, 50);
        let mut scratch = QueryScratch::default();
        let mut trace = Vec::new();
        let mode = driver.mode_of(
            &point![f64::NAN, 0.0, 10.0],
            &mut scratch,
            Some(&mut trace),
        );
        assert!(mode.x.is_nan() && mode.y.is_nan() && mode.z.is_nan());
        assert!(trace.is_empty());
    }

    #[test]
    fn candidates_below_the_minimum_height_are_rejected() {
        let index = PointCloudIndex::build([point![0.0, 0.0, 0.5]].iter());
        let rasters = default_rasters();
        let driver = constant_driver(&index, &rasters, 0.01, 50);
        let mut scratch = QueryScratch::default();
        let mut trace = Vec::new();
        let mode = driver.mode_of(&point![0.0, 0.0, 0.5], &mut scratch, Some(&mut trace));
        assert!(mode.x.is_nan());
        assert!(trace.is_empty());
    }

    #[test]
    fn candidates_outside_the_ground_raster_are_rejected() {
        let ground = GridRaster::new(vec![0.0], 1, 1, 0.0, 10.0, 0.0, 10.0).unwrap();
        let ratio = ConstantRaster::new(0.2);
        let min = ConstantRaster::new(1.0);
        let index = PointCloudIndex::build([point![50.0, 50.0, 10.0]].iter());
        let driver = MeanShiftDriver {
            index: &index,
            ground: &ground,
            crown_diameter_to_tree_height: &ratio,
            crown_height_to_tree_height: &ratio,
            min_height_above_ground: &min,
            centroid_convergence_distance: 0.01,
            max_num_centroids_per_mode: 50,
        };
        let mut scratch = QueryScratch::default();
        let mode = driver.mode_of(&point![50.0, 50.0, 10.0], &mut scratch, None);
        assert!(mode.x.is_nan());
    }

    #[test]
    fn nan_ground_cells_are_rejected() {
        let ground = GridRaster::new(vec![f64::NAN], 1, 1, 0.0, 10.0, 0.0, 10.0).unwrap();
        let ratio = ConstantRaster::new(0.2);
        let min = ConstantRaster::new(1.0);
        let index = PointCloudIndex::build([point![5.0, 5.0, 10.0]].iter());
        let driver = MeanShiftDriver {
            index: &index,
            ground: &ground,
            crown_diameter_to_tree_height: &ratio,
            crown_height_to_tree_height: &ratio,
            min_height_above_ground: &min,
            centroid_convergence_distance: 0.01,
            max_num_centroids_per_mode: 50,
        };
        let mut scratch = QueryScratch::default();
        assert!(driver
            .mode_of(&point![5.0, 5.0, 10.0], &mut scratch, None)
            .x
            .is_nan());
    }

    #[test]
    fn degenerate_first_iteration_yields_the_sentinel() {
        // all indexed points sit on the cylinder boundary, weighting to zero
        let index =
            PointCloudIndex::build([point![1.0, 0.0, 11.25], point![-1.0, 0.0, 11.25]].iter());
        let rasters = default_rasters();
        let driver = constant_driver(&index, &rasters, 0.01, 50);
        let mut scratch = QueryScratch::default();
        let mut trace = Vec::new();
        // h_ag = 10 -> radius 1, height 5, kernel center_z 11.25
        let mode = driver.mode_of(&point![0.0, 0.0, 10.0], &mut scratch, Some(&mut trace));
        assert!(mode.x.is_nan());
        assert!(trace.is_empty());
    }

    #[test]
    fn isolated_point_converges_onto_itself() {
        let candidate = point![3.0, 4.0, 10.0];
        let index = PointCloudIndex::build([candidate].iter());
        let rasters = default_rasters();
        let driver = constant_driver(&index, &rasters, 0.01, 50);
        let mut scratch = QueryScratch::default();
        let mut trace = Vec::new();
        let mode = driver.mode_of(&candidate, &mut scratch, Some(&mut trace));
        // the centroid of a single point is the point itself, up to the
        // rounding of the weight multiplication and division
        assert!(euclidean_distance(&mode, &candidate) < 1e-9);
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0], mode);
    }

    #[test]
    fn iteration_stops_at_the_cap() {
        // a vertical stack the kernel keeps climbing; three iterations are
        // not enough to converge
        let points: Vec<_> = (0..=40).map(|i| point![0.0, 0.0, 0.5 * i as f64]).collect();
        let index = PointCloudIndex::build(points.iter());
        let rasters = default_rasters();
        let driver = constant_driver(&index, &rasters, 0.01, 3);
        let mut scratch = QueryScratch::default();
        let mut trace = Vec::new();
        let mode = driver.mode_of(&point![0.0, 0.0, 5.0], &mut scratch, Some(&mut trace));
        assert!(is_finite_point(&mode));
        assert_eq!(trace.len(), 3);
        assert_eq!(mode, *trace.last().unwrap());
    }

    #[test]
    fn zero_convergence_distance_still_hits_the_cap() {
        let points: Vec<_> = (0..=40).map(|i| point![0.0, 0.0, 0.5 * i as f64]).collect();
        let index = PointCloudIndex::build(points.iter());
        let rasters = default_rasters();
        let driver = constant_driver(&index, &rasters, 0.0, 3);
        let mut scratch = QueryScratch::default();
        let mut trace = Vec::new();
        let mode = driver.mode_of(&point![0.0, 0.0, 5.0], &mut scratch, Some(&mut trace));
        assert!(is_finite_point(&mode));
        assert_eq!(trace.len(), 3);
    }
}
