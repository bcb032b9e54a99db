//! GDAL-backed raster access: open datasets, read bands at a chosen target
//! shape with a named resampling algorithm, and create cropped GeoTIFF
//! outputs. All heavy decode/warp work is delegated to GDAL.
use std::path::Path;

use gdal::errors::GdalError as GdalCrateError;
use gdal::raster::{Buffer, ResampleAlg};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use thiserror::Error;

use crate::core::grid::PixelGrid;

/// Errors encountered reading or writing GDAL datasets
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported raster: {0}")]
    Unsupported(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("Grid mismatch: {0}")]
    GridMismatch(String),
}

// Helper to extract an EPSG code from a WKT authority tag
fn parse_epsg(wkt: &str) -> Option<u32> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            return wkt[start..start + end].parse().ok();
        }
    }
    None
}

/// Reader over one GDAL-supported raster file (GeoTIFF, JP2, etc.)
pub struct RasterSource {
    dataset: Dataset,
    pub grid: PixelGrid,
}

impl RasterSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RasterError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        if dataset.raster_count() == 0 {
            return Err(RasterError::Unsupported(format!(
                "no raster bands in {:?}",
                path.as_ref()
            )));
        }
        let geotransform = dataset.geo_transform().unwrap_or([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let projection = dataset.projection();
        let epsg = if let Some(code) = projection.strip_prefix("EPSG:") {
            code.parse().unwrap_or(0)
        } else {
            parse_epsg(&projection).unwrap_or(0)
        };
        let grid = PixelGrid::new(geotransform, size_x as usize, size_y as usize, epsg);
        Ok(RasterSource { dataset, grid })
    }

    pub fn band_count(&self) -> usize {
        self.dataset.raster_count() as usize
    }

    /// Scalar metadata entry from the default domain, if present.
    pub fn metadata_item(&self, key: &str) -> Option<String> {
        self.dataset.metadata_item(key, "")
    }

    /// Read a band (1-based) at its native shape.
    pub fn read_band(&self, index: usize) -> Result<Array2<f64>, RasterError> {
        self.read_band_shaped(index, (self.grid.width, self.grid.height), None)
    }

    /// Read a band (1-based) into an arbitrary target shape `(cols, rows)`,
    /// letting GDAL resample with the given algorithm.
    pub fn read_band_shaped(
        &self,
        index: usize,
        shape: (usize, usize),
        resample: Option<ResampleAlg>,
    ) -> Result<Array2<f64>, RasterError> {
        if index == 0 || index > self.band_count() {
            return Err(RasterError::Unsupported(format!(
                "band index {} out of range",
                index
            )));
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.grid.width, self.grid.height);
        let buf = band.read_as::<f64>((0, 0), window, shape, resample)?;
        let data = buf.data().to_vec();
        Array2::from_shape_vec((shape.1, shape.0), data)
            .map_err(|_| RasterError::DimensionMismatch(shape.0, shape.1, window.0, window.1))
    }

    /// Read a sub-window of a band at its native resolution.
    pub fn read_window(
        &self,
        index: usize,
        offset: (usize, usize),
        window: (usize, usize),
    ) -> Result<Array2<f64>, RasterError> {
        let band = self.dataset.rasterband(index)?;
        let buf = band.read_as::<f64>(
            (offset.0 as isize, offset.1 as isize),
            window,
            window,
            None,
        )?;
        let data = buf.data().to_vec();
        Array2::from_shape_vec((window.1, window.0), data)
            .map_err(|_| RasterError::DimensionMismatch(window.0, window.1, window.0, window.1))
    }

    /// The grid this source produces when read at `pixel_size`, assuming an
    /// integer or rational scale of the native grid.
    pub fn grid_at(&self, pixel_size: f64) -> PixelGrid {
        let scale = self.grid.pixel_size / pixel_size;
        let gt = self.grid.geotransform;
        let scaled = [gt[0], gt[1] / scale, gt[2], gt[3], gt[4], gt[5] / scale];
        PixelGrid::new(
            scaled,
            (self.grid.width as f64 * scale).round() as usize,
            (self.grid.height as f64 * scale).round() as usize,
            self.grid.epsg,
        )
    }
}

/// Write a single-band float GeoTIFF with the given geotransform and CRS.
/// NaN is recorded as the no-data value.
pub fn write_geotiff(
    path: &Path,
    data: &Array2<f64>,
    geotransform: [f64; 6],
    epsg: u32,
) -> Result<(), RasterError> {
    let (rows, cols) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<f64, _>(path, cols, rows, 1)?;
    dataset.set_geo_transform(&geotransform)?;
    if epsg != 0 {
        dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;
    }
    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(Some(f64::NAN))?;
    let mut buffer = Buffer::new((cols, rows), data.iter().cloned().collect());
    band.write((0, 0), (cols, rows), &mut buffer)?;
    Ok(())
}
