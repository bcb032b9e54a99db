//! Band Resolver & Resampler: locate a band role at its best native
//! resolution, read it resampled to the common pixel grid, and convert
//! digital numbers to physical reflectance. Resolved arrays are cached for
//! the lifetime of one product's processing and shared across indices.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use tracing::debug;
use walkdir::WalkDir;

use crate::core::config::{BandSource, DnScale, PlatformSpec};
use crate::core::grid::PixelGrid;
use crate::error::{Error, Result};
use crate::io::locator::RasterProductRef;
use crate::io::raster::RasterSource;
use crate::types::{BandRole, ResamplingMethod};

const IMAGERY_EXTENSIONS: &[&str] = &["jp2", "tif", "tiff"];

fn is_imagery(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGERY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// All band imagery files under a product root. Used by the structural
/// integrity check and by band resolution.
pub fn band_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return if is_imagery(root) { vec![root.to_path_buf()] } else { Vec::new() };
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_imagery(p))
        .collect()
}

/// Native pixel size to read a role from: the target size when offered
/// directly, otherwise the smallest available size as resampling source.
pub fn select_native_size(sizes: &[f64], target: f64) -> Option<f64> {
    if sizes.iter().any(|&s| (s - target).abs() < 1e-9) {
        return Some(target);
    }
    sizes.iter().cloned().fold(None, |best, s| match best {
        Some(b) if b <= s => Some(b),
        _ => Some(s),
    })
}

fn render_template(template: &str, token: &str, res: f64) -> String {
    template
        .replace("{band}", token)
        .replace("{res}", &format!("{}", res as i64))
}

/// A band role resolved to a concrete file (or band index) at a native size.
#[derive(Debug, Clone)]
pub struct BandHandle {
    pub role: BandRole,
    pub path: PathBuf,
    pub band_index: usize,
    pub native_pixel_size: f64,
}

/// Per-product band access with caching of resolved arrays.
pub struct BandResolver<'a> {
    product: &'a RasterProductRef,
    spec: &'a PlatformSpec,
    target_pixel_size: f64,
    resampling: ResamplingMethod,
    files: Vec<PathBuf>,
    cache: Mutex<HashMap<BandRole, Arc<Array2<f64>>>>,
    grid: Mutex<Option<PixelGrid>>,
}

impl<'a> BandResolver<'a> {
    pub fn new(
        product: &'a RasterProductRef,
        spec: &'a PlatformSpec,
        target_pixel_size: f64,
        resampling: ResamplingMethod,
    ) -> Self {
        BandResolver {
            product,
            spec,
            target_pixel_size,
            resampling,
            files: band_files(&product.root),
            cache: Mutex::new(HashMap::new()),
            grid: Mutex::new(None),
        }
    }

    /// Resolve a role to a concrete file and native pixel size without
    /// reading any pixels.
    pub fn resolve(&self, role: BandRole) -> Result<BandHandle> {
        match &self.spec.band_source {
            BandSource::Multiband { order } => {
                let band_index = order
                    .iter()
                    .position(|r| *r == role)
                    .map(|p| p + 1)
                    .ok_or_else(|| {
                        Error::Processing(format!(
                            "band `{}` not present in multiband layout of {}",
                            role,
                            self.product.key()
                        ))
                    })?;
                Ok(BandHandle {
                    role,
                    path: self.product.root.clone(),
                    band_index,
                    native_pixel_size: self.target_pixel_size,
                })
            }
            BandSource::FilePerBand { template } => {
                let token = self.spec.token_for(role).ok_or_else(|| {
                    Error::Processing(format!(
                        "platform has no band token for role `{}`",
                        role
                    ))
                })?;
                let native = select_native_size(self.spec.sizes_for(role), self.target_pixel_size)
                    .ok_or_else(|| {
                        Error::Processing(format!("no native sizes configured for `{}`", role))
                    })?;
                let needle = render_template(template, token, native).to_ascii_lowercase();
                let path = self
                    .files
                    .iter()
                    .find(|p| {
                        p.file_name()
                            .map(|n| n.to_string_lossy().to_ascii_lowercase().contains(&needle))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .ok_or_else(|| {
                        Error::Processing(format!(
                            "band file for `{}` (pattern `{}`) not found in {}",
                            role,
                            needle,
                            self.product.key()
                        ))
                    })?;
                Ok(BandHandle {
                    role,
                    path,
                    band_index: 1,
                    native_pixel_size: native,
                })
            }
        }
    }

    /// The common pixel grid, established by the first band read.
    pub fn grid(&self) -> Result<PixelGrid> {
        self.grid
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Processing("no band read yet; grid undefined".to_string()))
    }

    /// Read a role at the common grid, resampling from its native size and
    /// converting digital numbers to reflectance. Cached per product.
    pub fn get_band(&self, role: BandRole) -> Result<Arc<Array2<f64>>> {
        if let Some(cached) = self.cache.lock().unwrap().get(&role) {
            return Ok(Arc::clone(cached));
        }

        let handle = self.resolve(role)?;
        let source = RasterSource::open(&handle.path).map_err(Error::Raster)?;
        let target_grid = source.grid_at(self.target_pixel_size);
        let shape = (target_grid.width, target_grid.height);

        {
            let mut grid = self.grid.lock().unwrap();
            match grid.as_ref() {
                None => *grid = Some(target_grid.clone()),
                Some(existing) if !existing.aligns_with(&target_grid) => {
                    return Err(Error::Processing(format!(
                        "band `{}` grid does not align with the product grid",
                        role
                    )));
                }
                Some(_) => {}
            }
        }

        debug!(
            role = %role,
            native = handle.native_pixel_size,
            target = self.target_pixel_size,
            "reading band"
        );
        let raw = source
            .read_band_shaped(handle.band_index, shape, Some(self.resampling.to_gdal()))
            .map_err(Error::Raster)?;
        let reflectance =
            dn_to_reflectance(&raw, self.spec.quantification, self.spec.reflectance_bounds);

        let array = Arc::new(reflectance);
        self.cache
            .lock()
            .unwrap()
            .insert(role, Arc::clone(&array));
        Ok(array)
    }

    /// Read the quality band at its native resolution, without reflectance
    /// conversion. Returns the raw array and its native pixel size.
    pub fn get_quality_native(&self) -> Result<(Array2<f64>, f64)> {
        let handle = self.resolve(BandRole::Quality)?;
        let source = RasterSource::open(&handle.path).map_err(Error::Raster)?;
        let raw = source.read_band(handle.band_index).map_err(Error::Raster)?;
        Ok((raw, source.grid.pixel_size))
    }
}

/// Apply the platform DN→reflectance affine; results outside the inclusive
/// bounds are replaced with no-data (NaN).
pub fn dn_to_reflectance(dn: &Array2<f64>, scale: DnScale, bounds: (f64, f64)) -> Array2<f64> {
    dn.mapv(|v| {
        let r = v * scale.scale + scale.offset;
        if r.is_finite() && r >= bounds.0 && r <= bounds.1 {
            r
        } else {
            f64::NAN
        }
    })
}
