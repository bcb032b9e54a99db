//! Cloud mask derivation from a categorical or bit-coded quality band.
//! The mask is built once per product and shared read-only across every
//! index computed for that product.
use ndarray::Array2;
use tracing::debug;

use crate::core::grid::PixelGrid;
use crate::error::{Error, Result};

/// Boolean exclusion mask at the target pixel grid; `true` = exclude pixel.
#[derive(Debug, Clone)]
pub struct CloudMask {
    data: Array2<bool>,
}

impl CloudMask {
    pub fn new(data: Array2<bool>) -> Self {
        CloudMask { data }
    }

    /// A mask that excludes nothing, used when cloud masking is disabled.
    pub fn clear(rows: usize, cols: usize) -> Self {
        CloudMask {
            data: Array2::from_elem((rows, cols), false),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.data[[row, col]]
    }

    pub fn fraction_masked(&self) -> f64 {
        let total = self.data.len();
        if total == 0 {
            return 0.0;
        }
        let masked = self.data.iter().filter(|&&m| m).count();
        masked as f64 / total as f64
    }

    /// Apply the mask to an index array, producing a new array with NaN at
    /// excluded pixels. The input is not mutated.
    pub fn apply(&self, index: &Array2<f64>) -> Result<Array2<f64>> {
        if index.dim() != self.data.dim() {
            return Err(Error::Processing(format!(
                "mask dimension {:?} does not match index dimension {:?}",
                self.data.dim(),
                index.dim()
            )));
        }
        let mut out = index.clone();
        ndarray::Zip::from(&mut out).and(&self.data).for_each(|v, &m| {
            if m {
                *v = f64::NAN;
            }
        });
        Ok(out)
    }
}

/// Binarize a quality band by value membership: a pixel is excluded when its
/// value appears in `to_mask`.
pub fn binarize_values(band: &Array2<f64>, to_mask: &[u32]) -> Array2<bool> {
    band.mapv(|v| {
        if !v.is_finite() {
            return true;
        }
        to_mask.contains(&(v as u32))
    })
}

/// Binarize a bit-coded quality band: a pixel is excluded when any bit in
/// `bits` is set in its integer value.
pub fn binarize_bits(band: &Array2<f64>, bits: &[u32]) -> Array2<bool> {
    band.mapv(|v| {
        if !v.is_finite() {
            return true;
        }
        let value = v as u64;
        bits.iter().any(|&b| value & (1u64 << b) != 0)
    })
}

/// Upscale a boolean mask by an integer factor using nearest-duplication:
/// every source cell becomes a `factor`x`factor` block of identical values.
/// Cloud pixels are over- rather than under-estimated on upscaling.
pub fn upscale_nearest(mask: &Array2<bool>, factor: usize) -> Array2<bool> {
    if factor <= 1 {
        return mask.clone();
    }
    let (rows, cols) = mask.dim();
    let mut out = Array2::from_elem((rows * factor, cols * factor), false);
    for ((r, c), &m) in mask.indexed_iter() {
        if m {
            for dr in 0..factor {
                for dc in 0..factor {
                    out[[r * factor + dr, c * factor + dc]] = true;
                }
            }
        }
    }
    out
}

/// Build the exclusion mask from a quality band read at its native resolution.
///
/// `bitmask` selects bit-position testing over value membership. The binarized
/// mask is brought to the target grid by nearest-duplication; the quality
/// band's resolution must be an integer multiple of the target pixel size.
pub fn build_mask(
    quality: &Array2<f64>,
    quality_pixel_size: f64,
    grid: &PixelGrid,
    bitmask: bool,
    to_mask: &[u32],
) -> Result<CloudMask> {
    let binary = if bitmask {
        binarize_bits(quality, to_mask)
    } else {
        binarize_values(quality, to_mask)
    };

    let ratio = quality_pixel_size / grid.pixel_size;
    let factor = ratio.round() as usize;
    if factor == 0 || (ratio - factor as f64).abs() > 1e-9 {
        return Err(Error::Processing(format!(
            "quality band resolution {} is not an integer multiple of target {}",
            quality_pixel_size, grid.pixel_size
        )));
    }

    let scaled = upscale_nearest(&binary, factor);
    if scaled.dim() != (grid.height, grid.width) {
        return Err(Error::Processing(format!(
            "scaled mask {:?} does not cover target grid {}x{}",
            scaled.dim(),
            grid.height,
            grid.width
        )));
    }

    let mask = CloudMask::new(scaled);
    debug!(
        fraction = format!("{:.3}", mask.fraction_masked()),
        "cloud mask built"
    );
    Ok(mask)
}

/// Substitute an externally supplied mask raster (1 = exclude, 0 = keep).
/// The raster must already align exactly with the target grid.
pub fn external_mask(values: &Array2<f64>, grid: &PixelGrid) -> Result<CloudMask> {
    if values.dim() != (grid.height, grid.width) {
        return Err(Error::Processing(format!(
            "external mask {:?} does not align with target grid {}x{}",
            values.dim(),
            grid.height,
            grid.width
        )));
    }
    Ok(CloudMask::new(values.mapv(|v| v >= 0.5)))
}
