//! Mean shift mode extraction over a point cloud.
//!
//! Every input point is iterated towards the local density mode of the
//! cloud under an adaptive, asymmetric cylindrical kernel. Points of one
//! tree crown converge to nearly identical modes just below the crown
//! apex, so the modes are the input for crown clustering downstream.

mod driver;
mod progress;

pub use progress::{LogProgress, ProgressHook, PROGRESS_TICK};

use crate::geometry::nan_point;
use crate::index::filter::{FiniteAboveGround, FiniteAboveGroundGrid, FiniteAboveHeight};
use crate::index::PointCloudIndex;
use crate::kernel::QueryScratch;
use crate::raster::{ConstantRaster, GridRaster, Raster};
use driver::MeanShiftDriver;
use nalgebra::Point3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Parameters of the mean shift iteration.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanShiftParams {
    /// Step length at or below which the iteration counts as converged.
    pub centroid_convergence_distance: f64,
    /// Upper bound on the number of centroids computed per input point.
    /// Hitting it yields a truncated, still valid mode.
    pub max_num_centroids_per_mode: usize,
    /// Also collect the visited centroids of every input point.
    pub also_return_centroids: bool,
}

/// Result of a mode extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeOutput {
    /// One mode per input point, in input order. Rejected inputs and
    /// points skipped after a cancellation carry the NaN sentinel.
    pub modes: Vec<Point3<f64>>,
    /// The centroid traces, present when
    /// [MeanShiftParams::also_return_centroids] was set.
    pub centroids: Option<CentroidTrace>,
}

/// All centroids visited by the mean shift, flattened in input point
/// order.
///
/// A trace holds s₁, s₂, … of the iteration; the input point itself is
/// not part of it. Callers can distinguish a converged mode from a
/// truncated one by comparing its trace length against
/// [MeanShiftParams::max_num_centroids_per_mode].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidTrace {
    /// The visited centroids.
    pub centroids: Vec<Point3<f64>>,
    /// Index of the input point each centroid belongs to, aligned with
    /// [CentroidTrace::centroids].
    pub point_indices: Vec<usize>,
}

impl CentroidTrace {
    /// Groups the flat trace back into one centroid slice per input
    /// point. Points without centroids (rejected inputs) get an empty
    /// slice.
    pub fn per_point(&self, num_points: usize) -> Vec<&[Point3<f64>]> {
        let mut per_point = vec![&self.centroids[0..0]; num_points];
        let mut start = 0;
        while start < self.point_indices.len() {
            let point_index = self.point_indices[start];
            let mut end = start + 1;
            while end < self.point_indices.len() && self.point_indices[end] == point_index {
                end += 1;
            }
            per_point[point_index] = &self.centroids[start..end];
            start = end;
        }
        per_point
    }
}

/// Extracts crown modes from a cloud whose z coordinate already measures
/// height above ground.
pub fn modes_from_normalized_heights(
    points: &[Point3<f64>],
    crown_diameter_to_tree_height: f64,
    crown_height_to_tree_height: f64,
    min_point_height: f64,
    params: &MeanShiftParams,
    progress: Option<&dyn ProgressHook>,
) -> ModeOutput {
    let index = PointCloudIndex::build(FiniteAboveHeight::new(points, min_point_height));
    let ground = ConstantRaster::new(0.0);
    let diameter_ratio = ConstantRaster::new(crown_diameter_to_tree_height);
    let height_ratio = ConstantRaster::new(crown_height_to_tree_height);
    let min_height = ConstantRaster::new(min_point_height);
    run(
        points,
        &index,
        &ground,
        &diameter_ratio,
        &height_ratio,
        &min_height,
        params,
        progress,
    )
}

/// Extracts crown modes from a cloud with absolute elevations; the ground
/// raster supplies the local ground elevation for height normalization.
pub fn modes_from_terraneous_heights(
    points: &[Point3<f64>],
    ground: &GridRaster<f64>,
    crown_diameter_to_tree_height: f64,
    crown_height_to_tree_height: f64,
    min_point_height_above_ground: f64,
    params: &MeanShiftParams,
    progress: Option<&dyn ProgressHook>,
) -> ModeOutput {
    let index = PointCloudIndex::build(FiniteAboveGround::new(
        points,
        min_point_height_above_ground,
        ground,
    ));
    let diameter_ratio = ConstantRaster::new(crown_diameter_to_tree_height);
    let height_ratio = ConstantRaster::new(crown_height_to_tree_height);
    let min_height = ConstantRaster::new(min_point_height_above_ground);
    run(
        points,
        &index,
        ground,
        &diameter_ratio,
        &height_ratio,
        &min_height,
        params,
        progress,
    )
}

/// Extracts crown modes with every per-location input supplied as a
/// raster.
///
/// Scalar inputs are passed as [ConstantRaster]s, so canopy shape, ground
/// elevation and the minimum height can each vary over the area or stay
/// fixed, in any combination.
pub fn modes_flexible(
    points: &[Point3<f64>],
    ground: &dyn Raster<f64>,
    crown_diameter_to_tree_height: &dyn Raster<f64>,
    crown_height_to_tree_height: &dyn Raster<f64>,
    min_height_above_ground: &dyn Raster<f64>,
    params: &MeanShiftParams,
    progress: Option<&dyn ProgressHook>,
) -> ModeOutput {
    let index = PointCloudIndex::build(FiniteAboveGroundGrid::new(
        points,
        min_height_above_ground,
        ground,
    ));
    run(
        points,
        &index,
        ground,
        crown_diameter_to_tree_height,
        crown_height_to_tree_height,
        min_height_above_ground,
        params,
        progress,
    )
}

/// Maps the per-point driver over the input.
///
/// Points are independent, so the map runs on the rayon pool; collecting
/// keeps input order and every point's result is a pure function of the
/// shared read-only state, so the output does not depend on scheduling.
#[allow(clippy::too_many_arguments)]
fn run(
    points: &[Point3<f64>],
    index: &PointCloudIndex,
    ground: &dyn Raster<f64>,
    crown_diameter_to_tree_height: &dyn Raster<f64>,
    crown_height_to_tree_height: &dyn Raster<f64>,
    min_height_above_ground: &dyn Raster<f64>,
    params: &MeanShiftParams,
    progress: Option<&dyn ProgressHook>,
) -> ModeOutput {
    let driver = MeanShiftDriver {
        index,
        ground,
        crown_diameter_to_tree_height,
        crown_height_to_tree_height,
        min_height_above_ground,
        centroid_convergence_distance: params.centroid_convergence_distance,
        max_num_centroids_per_mode: params.max_num_centroids_per_mode,
    };
    let total = points.len();
    let completed = AtomicUsize::new(0);
    let cancelled = AtomicBool::new(false);
    let with_trace = params.also_return_centroids;

    let results: Vec<(Point3<f64>, Vec<Point3<f64>>)> = points
        .par_iter()
        .map_init(QueryScratch::default, |scratch, point| {
            if cancelled.load(Ordering::Relaxed) {
                return (nan_point(), Vec::new());
            }
            let mut trace = Vec::new();
            let mode = driver.mode_of(point, scratch, with_trace.then_some(&mut trace));
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % PROGRESS_TICK == 0 || done == total {
                if let Some(hook) = progress {
                    if hook.on_progress(done, total).is_break() {
                        cancelled.store(true, Ordering::Relaxed);
                    }
                }
            }
            (mode, trace)
        })
        .collect();

    let mut modes = Vec::with_capacity(total);
    let mut collected = with_trace.then(|| CentroidTrace {
        centroids: Vec::new(),
        point_indices: Vec::new(),
    });
    for (point_index, (mode, trace)) in results.into_iter().enumerate() {
        modes.push(mode);
        if let Some(collected) = collected.as_mut() {
            for centroid in trace {
                collected.centroids.push(centroid);
                collected.point_indices.push(point_index);
            }
        }
    }
    ModeOutput {
        modes,
        centroids: collected,
    }
}
