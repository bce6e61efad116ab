pub mod filter;

use crate::geometry::horizontal_distance_sq;
use log::debug;
use nalgebra::{Point2, Point3};
use rstar::{RStarInsertionStrategy, RTree, RTreeParams, AABB};

/// R*-tree parameters used for the point cloud index: node fan-out of 8
/// with the R* insertion heuristics.
pub struct CrownIndexParams;

impl RTreeParams for CrownIndexParams {
    const MIN_SIZE: usize = 4;
    const MAX_SIZE: usize = 8;
    const REINSERTION_COUNT: usize = 2;
    type DefaultInsertionStrategy = RStarInsertionStrategy;
}

/// A point of the indexed cloud.
///
/// Newtype around [Point3], since the tree's point trait cannot be
/// implemented for the nalgebra type directly.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IndexedPoint(Point3<f64>);

impl IndexedPoint {
    #[inline]
    pub fn as_point(&self) -> &Point3<f64> {
        &self.0
    }
}

impl From<Point3<f64>> for IndexedPoint {
    fn from(p: Point3<f64>) -> Self {
        IndexedPoint(p)
    }
}

impl rstar::Point for IndexedPoint {
    type Scalar = f64;
    const DIMENSIONS: usize = 3;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        IndexedPoint(Point3::new(generator(0), generator(1), generator(2)))
    }

    #[inline]
    fn nth(&self, index: usize) -> Self::Scalar {
        self.0[index]
    }

    #[inline]
    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.0[index]
    }
}

/// Spatial index over the filtered point cloud, answering vertical
/// cylinder queries for the mean shift kernel.
///
/// The index is bulk loaded once from a filtered point sequence and
/// immutable afterwards; queries borrow it shared, so workers can read it
/// concurrently without synchronization.
pub struct PointCloudIndex {
    rtree: RTree<IndexedPoint, CrownIndexParams>,
}

impl PointCloudIndex {
    /// Bulk loads the index from the given point sequence.
    ///
    /// The sequence is typically one of the [filter] iterators, so that
    /// non-finite and below-minimum points never enter the tree. Bulk
    /// loading (rather than point-by-point insertion) yields the
    /// well-balanced tree the per-point queries rely on.
    pub fn build<'a, I>(points: I) -> Self
    where
        I: Iterator<Item = &'a Point3<f64>>,
    {
        let entries: Vec<IndexedPoint> = points.copied().map(IndexedPoint::from).collect();
        debug!("bulk loading point cloud index with {} points", entries.len());
        PointCloudIndex {
            rtree: RTree::bulk_load_with_params(entries),
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    /// All indexed points whose xy lies within `radius` of `center` and
    /// whose z lies in `[z_bottom, z_top]`, in arbitrary order.
    ///
    /// Both z bounds are inclusive, as is the cylinder boundary itself.
    /// Implemented as an inclusive bounding box query refined by the exact
    /// squared horizontal distance.
    pub fn vertical_cylinder_query<'a>(
        &'a self,
        center: Point2<f64>,
        radius: f64,
        z_bottom: f64,
        z_top: f64,
    ) -> impl Iterator<Item = &'a Point3<f64>> + 'a {
        let envelope = AABB::from_corners(
            IndexedPoint(Point3::new(center.x - radius, center.y - radius, z_bottom)),
            IndexedPoint(Point3::new(center.x + radius, center.y + radius, z_top)),
        );
        let radius_sq = radius * radius;
        self.rtree
            .locate_in_envelope(&envelope)
            .filter(move |entry| horizontal_distance_sq(&center, entry.as_point()) <= radius_sq)
            .map(IndexedPoint::as_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::point;

    fn collect_query(
        index: &PointCloudIndex,
        center: Point2<f64>,
        radius: f64,
        z_bottom: f64,
        z_top: f64,
    ) -> Vec<Point3<f64>> {
        let mut points: Vec<Point3<f64>> = index
            .vertical_cylinder_query(center, radius, z_bottom, z_top)
            .copied()
            .collect();
        points.sort_by(|a, b| (a.x, a.y, a.z).partial_cmp(&(b.x, b.y, b.z)).unwrap());
        points
    }

    #[test]
    fn build_and_len() {
        let points = vec![
            point![0.0, 0.0, 0.0],
            point![1.0, 1.0, 1.0],
            point![2.0, 2.0, 2.0],
        ];
        let index = PointCloudIndex::build(points.iter());
        assert_eq!(index.len(), 3);
        assert!(!index.is_empty());
        assert!(PointCloudIndex::build(std::iter::empty::<&Point3<f64>>()).is_empty());
    }

    #[test]
    fn cylinder_query_is_inclusive_in_z() {
        let points = vec![
            point![0.0, 0.0, 1.0],
            point![0.0, 0.0, 2.0],
            point![0.0, 0.0, 3.0],
            point![0.0, 0.0, 4.0],
        ];
        let index = PointCloudIndex::build(points.iter());
        assert_eq!(
            collect_query(&index, point![0.0, 0.0], 1.0, 2.0, 3.0),
            vec![point![0.0, 0.0, 2.0], point![0.0, 0.0, 3.0]]
        );
    }

    #[test]
    fn cylinder_query_refines_the_bounding_box() {
        // the box corner is inside the envelope but outside the cylinder
        let points = vec![
            point![1.0, 1.0, 0.0],
            point![1.0, 0.0, 0.0],
            point![0.0, 1.0, 0.0],
        ];
        let index = PointCloudIndex::build(points.iter());
        assert_eq!(
            collect_query(&index, point![0.0, 0.0], 1.0, -1.0, 1.0),
            vec![point![0.0, 1.0, 0.0], point![1.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn cylinder_boundary_is_inclusive() {
        let points = vec![point![2.0, 0.0, 0.0], point![2.0000001, 0.0, 0.0]];
        let index = PointCloudIndex::build(points.iter());
        assert_eq!(
            collect_query(&index, point![0.0, 0.0], 2.0, 0.0, 0.0),
            vec![point![2.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn filtered_points_never_enter_the_index() {
        let points = vec![
            point![0.0, 0.0, 5.0],
            point![f64::NAN, 0.0, 10.0],
            point![1.0, 1.0, 5.0],
            point![2.0, 2.0, 0.1],
        ];
        let index =
            PointCloudIndex::build(crate::index::filter::FiniteAboveHeight::new(&points, 1.0));
        assert_eq!(index.len(), points.len() - 2);
    }

    #[test]
    fn duplicate_points_are_kept() {
        let points = vec![point![5.0, 5.0, 5.0]; 20];
        let index = PointCloudIndex::build(points.iter());
        assert_eq!(index.len(), 20);
        assert_eq!(
            index
                .vertical_cylinder_query(point![5.0, 5.0], 0.5, 4.5, 5.5)
                .count(),
            20
        );
    }
}
