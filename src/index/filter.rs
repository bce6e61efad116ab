//! Lazy, forward-only iterators that skip the points the spatial index
//! must not contain: non-finite coordinates and points below the
//! applicable minimum height. They feed [super::PointCloudIndex::build]
//! directly, so filtering and bulk loading happen in one pass over the
//! input.

use crate::geometry::{is_finite_point, xy_of};
use crate::raster::Raster;
use nalgebra::Point3;
use std::slice;

/// Skips points with a non-finite coordinate or with z below a fixed
/// minimum. Used when z already measures height above ground.
pub struct FiniteAboveHeight<'a> {
    points: slice::Iter<'a, Point3<f64>>,
    min_height: f64,
}

impl<'a> FiniteAboveHeight<'a> {
    pub fn new(points: &'a [Point3<f64>], min_height: f64) -> Self {
        FiniteAboveHeight {
            points: points.iter(),
            min_height,
        }
    }
}

impl<'a> Iterator for FiniteAboveHeight<'a> {
    type Item = &'a Point3<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        let min_height = self.min_height;
        self.points
            .find(|p| is_finite_point(p) && p.z >= min_height)
    }
}

/// Skips points with a non-finite coordinate or with a height above the
/// local ground below a fixed minimum.
///
/// The ground elevation is sampled per point without extent validation;
/// points whose sampled height comes out non-finite are skipped as well.
pub struct FiniteAboveGround<'a, G: ?Sized> {
    points: slice::Iter<'a, Point3<f64>>,
    min_height_above_ground: f64,
    ground: &'a G,
}

impl<'a, G: Raster<f64> + ?Sized> FiniteAboveGround<'a, G> {
    pub fn new(points: &'a [Point3<f64>], min_height_above_ground: f64, ground: &'a G) -> Self {
        FiniteAboveGround {
            points: points.iter(),
            min_height_above_ground,
            ground,
        }
    }
}

impl<'a, G: Raster<f64> + ?Sized> Iterator for FiniteAboveGround<'a, G> {
    type Item = &'a Point3<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        let min_height = self.min_height_above_ground;
        let ground = self.ground;
        self.points.find(|p| {
            if !is_finite_point(p) {
                return false;
            }
            let height = p.z - ground.value_at_unchecked(xy_of(p));
            height.is_finite() && height >= min_height
        })
    }
}

/// Like [FiniteAboveGround], with the minimum height itself raster-valued.
///
/// A point is skipped when either raster yields a non-finite value at its
/// location, or its height above ground is below that cell's minimum.
pub struct FiniteAboveGroundGrid<'a, M: ?Sized, G: ?Sized> {
    points: slice::Iter<'a, Point3<f64>>,
    min_height_above_ground: &'a M,
    ground: &'a G,
}

impl<'a, M, G> FiniteAboveGroundGrid<'a, M, G>
where
    M: Raster<f64> + ?Sized,
    G: Raster<f64> + ?Sized,
{
    pub fn new(
        points: &'a [Point3<f64>],
        min_height_above_ground: &'a M,
        ground: &'a G,
    ) -> Self {
        FiniteAboveGroundGrid {
            points: points.iter(),
            min_height_above_ground,
            ground,
        }
    }
}

impl<'a, M, G> Iterator for FiniteAboveGroundGrid<'a, M, G>
where
    M: Raster<f64> + ?Sized,
    G: Raster<f64> + ?Sized,
{
    type Item = &'a Point3<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        let min_raster = self.min_height_above_ground;
        let ground = self.ground;
        self.points.find(|p| {
            if !is_finite_point(p) {
                return false;
            }
            let xy = xy_of(p);
            let ground_elevation = ground.value_at_unchecked(xy);
            let min_height = min_raster.value_at_unchecked(xy);
            if !ground_elevation.is_finite() || !min_height.is_finite() {
                return false;
            }
            let height = p.z - ground_elevation;
            height >= min_height
        })
    }
}
