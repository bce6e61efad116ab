use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for raster construction and checked lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RasterError {
    #[error("raster lookup with a NaN coordinate")]
    InvalidCoordinate,
    #[error("coordinate is outside of the raster extent")]
    OutOfExtent,
    #[error("expected {expected} cell values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("raster extent is empty or inverted")]
    InvalidExtent,
}

/// A read-only rectangular grid of values addressed by world (x, y)
/// coordinates.
///
/// Implementations are shared by reference between the spatial index and
/// the mean shift workers, so they must be [Sync]. The trait is object
/// safe; operations that return `Self` (like
/// [GridRaster::copy_with_values]) are inherent methods of the
/// implementations instead.
pub trait Raster<T: Copy>: Sync {
    /// The underlying cell values.
    fn values(&self) -> &[T];

    /// Checks whether (x, y) lies within the closed extent rectangle.
    fn has_value_at(&self, p: Point2<f64>) -> bool;

    /// Returns the value at (x, y) after validating the coordinate.
    fn value_at(&self, p: Point2<f64>) -> Result<T, RasterError>;

    /// Returns the value at (x, y) without validating the coordinate.
    ///
    /// Only meaningful within the extent (typically after an earlier
    /// [Raster::has_value_at] check, or when the caller accepts whatever a
    /// stale lookup produces). Outside the extent the result is
    /// unspecified.
    fn value_at_unchecked(&self, p: Point2<f64>) -> T;
}

/// A rectangular raster with one value per grid cell.
///
/// Values are stored row-major from the top-left cell (maximum y, minimum
/// x) to the bottom-right cell. Lookups on the closed boundary are counted
/// into the adjacent cell, so y = y_min maps to the last row and x = x_max
/// to the last column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRaster<T> {
    values: Vec<T>,
    num_rows: usize,
    num_cols: usize,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    row_height: f64,
    col_width: f64,
}

impl<T: Copy> GridRaster<T> {
    /// Constructs a raster from row-major cell values and its world extent.
    pub fn new(
        values: Vec<T>,
        num_rows: usize,
        num_cols: usize,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    ) -> Result<Self, RasterError> {
        if num_rows == 0 || num_cols == 0 || !(x_max > x_min) || !(y_max > y_min) {
            return Err(RasterError::InvalidExtent);
        }
        if values.len() != num_rows * num_cols {
            return Err(RasterError::ShapeMismatch {
                expected: num_rows * num_cols,
                actual: values.len(),
            });
        }
        let row_height = (y_max - y_min) / num_rows as f64;
        let col_width = (x_max - x_min) / num_cols as f64;
        Ok(GridRaster {
            values,
            num_rows,
            num_cols,
            x_min,
            x_max,
            y_min,
            y_max,
            row_height,
            col_width,
        })
    }

    /// An identical raster carrying different cell values.
    pub fn copy_with_values(&self, values: Vec<T>) -> Result<Self, RasterError> {
        if values.len() != self.values.len() {
            return Err(RasterError::ShapeMismatch {
                expected: self.values.len(),
                actual: values.len(),
            });
        }
        let mut copy = self.clone();
        copy.values = values;
        Ok(copy)
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    #[inline]
    pub fn row_height(&self) -> f64 {
        self.row_height
    }

    #[inline]
    pub fn col_width(&self) -> f64 {
        self.col_width
    }

    /// Index into the value vector of the cell containing (x, y).
    ///
    /// The computed row and column are clamped into the grid, which maps
    /// the closed boundary at y_min / x_max into the last row / column.
    fn cell_index(&self, p: Point2<f64>) -> usize {
        let row = ((self.y_max - p.y) / self.row_height).floor() as isize;
        let col = ((p.x - self.x_min) / self.col_width).floor() as isize;
        let row = row.clamp(0, self.num_rows as isize - 1) as usize;
        let col = col.clamp(0, self.num_cols as isize - 1) as usize;
        row * self.num_cols + col
    }
}

impl<T: Copy + Sync> Raster<T> for GridRaster<T> {
    fn values(&self) -> &[T] {
        &self.values
    }

    fn has_value_at(&self, p: Point2<f64>) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    fn value_at(&self, p: Point2<f64>) -> Result<T, RasterError> {
        if p.x.is_nan() || p.y.is_nan() {
            return Err(RasterError::InvalidCoordinate);
        }
        if !self.has_value_at(p) {
            return Err(RasterError::OutOfExtent);
        }
        Ok(self.values[self.cell_index(p)])
    }

    fn value_at_unchecked(&self, p: Point2<f64>) -> T {
        self.values[self.cell_index(p)]
    }
}

/// The degenerate raster: one value, everywhere.
///
/// Lets scalar parameters flow through code written against [Raster]
/// without a separate code path.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantRaster<T> {
    values: [T; 1],
}

impl<T: Copy> ConstantRaster<T> {
    pub fn new(value: T) -> Self {
        ConstantRaster { values: [value] }
    }

    #[inline]
    pub fn value(&self) -> T {
        self.values[0]
    }

    /// An identical raster carrying a different value; the vector must
    /// hold exactly one entry.
    pub fn copy_with_values(&self, values: Vec<T>) -> Result<Self, RasterError> {
        if values.len() != 1 {
            return Err(RasterError::ShapeMismatch {
                expected: 1,
                actual: values.len(),
            });
        }
        Ok(ConstantRaster::new(values[0]))
    }
}

impl<T: Copy + Sync> Raster<T> for ConstantRaster<T> {
    fn values(&self) -> &[T] {
        &self.values
    }

    fn has_value_at(&self, _p: Point2<f64>) -> bool {
        true
    }

    fn value_at(&self, _p: Point2<f64>) -> Result<T, RasterError> {
        Ok(self.value())
    }

    fn value_at_unchecked(&self, _p: Point2<f64>) -> T {
        self.value()
    }
}
