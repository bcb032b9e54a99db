//! I/O layer: product discovery and resolution, GDAL raster access, GeoJSON
//! polygon collections, band resolution, product validation, tile
//! partitioning, and the output writers.
pub mod bands;
pub mod locator;
pub mod partition;
pub mod raster;
pub mod validate;
pub mod vector;
pub mod writers;

pub use locator::LocatorError;
pub use raster::RasterError;
pub use vector::VectorError;
