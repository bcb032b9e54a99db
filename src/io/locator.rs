//! Product Locator: resolve tile id, acquisition date, and orbit from a
//! raster product reference using configurable extraction patterns, and
//! discover product references under a root directory. Pure path resolution,
//! no side effects.
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::config::PlatformSpec;
use crate::types::Platform;

/// Errors encountered resolving product references
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid {what} pattern: {message}")]
    Pattern { what: &'static str, message: String },
    #[error("Unresolved product {product:?}: {reason}")]
    Unresolved { product: PathBuf, reason: String },
}

/// Immutable reference to one raster product, fully resolved by the locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterProductRef {
    pub platform: Platform,
    pub root: PathBuf,
    pub tile_id: String,
    pub date: NaiveDate,
    pub orbit: Option<u32>,
}

impl RasterProductRef {
    /// Stable identity used for logs, caches, and output naming.
    pub fn key(&self) -> String {
        format!("{}_{}", self.tile_id, self.date.format("%Y%m%d"))
    }
}

pub struct ProductLocator {
    platform: Platform,
    tile_re: Regex,
    date_re: Regex,
    orbit_re: Option<Regex>,
}

impl ProductLocator {
    /// Compile the extraction patterns. A malformed pattern is a
    /// configuration error, fatal at startup rather than per product.
    pub fn new(platform: Platform, spec: &PlatformSpec) -> Result<Self, LocatorError> {
        let tile_re = Regex::new(&spec.tile_pattern).map_err(|e| LocatorError::Pattern {
            what: "tile",
            message: e.to_string(),
        })?;
        let date_re = Regex::new(&spec.date_pattern).map_err(|e| LocatorError::Pattern {
            what: "date",
            message: e.to_string(),
        })?;
        let orbit_re = spec
            .orbit_pattern
            .as_ref()
            .map(|p| {
                Regex::new(p).map_err(|e| LocatorError::Pattern {
                    what: "orbit",
                    message: e.to_string(),
                })
            })
            .transpose()?;
        Ok(ProductLocator {
            platform,
            tile_re,
            date_re,
            orbit_re,
        })
    }

    /// Resolve one product reference from its root path name.
    pub fn resolve(&self, root: &Path) -> Result<RasterProductRef, LocatorError> {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = root
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());

        let tile_id = self
            .tile_re
            .captures(&stem)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| LocatorError::Unresolved {
                product: root.to_path_buf(),
                reason: "tile pattern did not match".to_string(),
            })?;

        let date_token = self
            .date_re
            .captures(&name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| LocatorError::Unresolved {
                product: root.to_path_buf(),
                reason: "date pattern did not match".to_string(),
            })?;
        let date = NaiveDate::parse_from_str(&date_token, "%Y%m%d").map_err(|e| {
            LocatorError::Unresolved {
                product: root.to_path_buf(),
                reason: format!("unparseable date `{}`: {}", date_token, e),
            }
        })?;

        let orbit = self
            .orbit_re
            .as_ref()
            .and_then(|re| re.captures(&name))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());

        Ok(RasterProductRef {
            platform: self.platform,
            root: root.to_path_buf(),
            tile_id,
            date,
            orbit,
        })
    }

    fn is_candidate(&self, path: &Path) -> bool {
        match self.platform {
            Platform::S2 | Platform::Ls8 => path.is_dir(),
            Platform::Tif => {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "tif" | "tiff"))
                        .unwrap_or(false)
            }
        }
    }

    /// Discover product references under `root`, applying the date-range
    /// filter and tile allowlist. `root` may itself be a single product.
    pub fn discover(
        &self,
        root: &Path,
        date_range: Option<(NaiveDate, NaiveDate)>,
        tile_allowlist: Option<&[String]>,
    ) -> Result<Vec<RasterProductRef>, LocatorError> {
        let mut products = Vec::new();

        let root_product = if self.is_candidate(root) {
            match self.resolve(root) {
                Ok(product) => Some(product),
                Err(e) => {
                    debug!("Root is not itself a product, walking children: {}", e);
                    None
                }
            }
        } else {
            None
        };
        if let Some(product) = root_product {
            products.push(product);
        } else {
            for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
                let entry = entry.map_err(|e| LocatorError::Unresolved {
                    product: root.to_path_buf(),
                    reason: e.to_string(),
                })?;
                let path = entry.path();
                if !self.is_candidate(path) {
                    continue;
                }
                match self.resolve(path) {
                    Ok(product) => products.push(product),
                    Err(e) => debug!("Skipping non-product entry: {}", e),
                }
            }
        }

        let before = products.len();
        if let Some((start, end)) = date_range {
            products.retain(|p| p.date >= start && p.date <= end);
        }
        if let Some(allow) = tile_allowlist {
            products.retain(|p| allow.iter().any(|t| t == &p.tile_id));
        }
        if products.len() < before {
            warn!(
                "Filtered {} of {} discovered products by date range / tile allowlist",
                before - products.len(),
                before
            );
        }

        products.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(products)
    }
}
