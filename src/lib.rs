#![deny(unused_must_use)]

pub mod geometry;
pub mod index;
pub mod kernel;
pub mod meanshift;
pub mod raster;

pub use nalgebra;
