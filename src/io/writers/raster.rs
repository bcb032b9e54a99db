//! Raster format: one cropped single-band GeoTIFF per polygon, carrying the
//! window's own geotransform and the product CRS. No-data is NaN.
use std::path::{Path, PathBuf};

use crate::core::zonal::PolygonArray;
use crate::error::{Error, Result};
use crate::io::raster::write_geotiff;
use crate::io::writers::ExtractionContext;

pub fn raster_path(dir: &Path, ctx: &ExtractionContext, polygon_id: &str) -> PathBuf {
    dir.join(format!("{}_{}.tif", ctx.stem(), polygon_id))
}

pub fn write_rasters(
    dir: &Path,
    ctx: &ExtractionContext,
    arrays: &[PolygonArray],
    epsg: u32,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(arrays.len());
    for array in arrays {
        let path = raster_path(dir, ctx, &array.id);
        write_geotiff(&path, &array.data, array.geotransform, epsg).map_err(Error::Raster)?;
        written.push(path);
    }
    Ok(written)
}
