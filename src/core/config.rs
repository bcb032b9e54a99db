//! Immutable run configuration, constructed once at startup and passed by
//! reference into every component. Serde-derived so presets can be stored as
//! JSON. No component mutates it after construction.
use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{
    BandRole, InclusionPolicy, OutputFormat, Platform, ResamplingMethod, SpectralIndex, Statistic,
};

/// Digital-number to physical-reflectance affine: `reflectance = dn * scale + offset`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DnScale {
    pub scale: f64,
    pub offset: f64,
}

/// How band roles map onto files for a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BandSource {
    /// One file per band; `template` is rendered with `{band}` and `{res}`
    /// placeholders and matched against file names under the product root.
    FilePerBand { template: String },
    /// Single multiband file; 1-based band index is the position in `order`.
    Multiband { order: Vec<BandRole> },
}

/// Per-platform band layout, scaling, masking, and naming patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSpec {
    pub band_source: BandSource,
    /// Raw band token per role (e.g. red -> "B04")
    pub band_tokens: HashMap<BandRole, String>,
    /// Native pixel sizes offered per role, ascending
    pub native_sizes: HashMap<BandRole, Vec<f64>>,
    /// Pattern recognizing raw band tokens (as opposed to symbolic role names)
    pub band_designation: String,
    pub quantification: DnScale,
    /// Reflectance values outside these inclusive bounds become no-data
    pub reflectance_bounds: (f64, f64),
    /// Bit-position masking instead of value membership
    pub bitmask: bool,
    /// Values or bit positions marking a pixel excluded
    pub to_be_masked: Vec<u32>,
    pub quality_pixel_size: f64,
    pub tile_pattern: String,
    pub date_pattern: String,
    pub orbit_pattern: Option<String>,
    /// Minimum band-file count for the structural integrity check
    pub expected_min_bands: usize,
}

impl PlatformSpec {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::S2 => s2_spec(),
            Platform::Ls8 => ls8_spec(),
            Platform::Tif => tif_spec(),
        }
    }

    /// Resolve a band designation, either a raw token ("B04") or a symbolic
    /// role name ("red"), to its role.
    pub fn designation_role(&self, name: &str) -> Option<BandRole> {
        let raw = Regex::new(&self.band_designation).ok()?;
        if raw.is_match(name) {
            return self
                .band_tokens
                .iter()
                .find(|(_, token)| token.eq_ignore_ascii_case(name))
                .map(|(role, _)| *role);
        }
        ROLE_NAMES
            .iter()
            .find(|(symbolic, _)| symbolic.eq_ignore_ascii_case(name))
            .map(|(_, role)| *role)
    }

    /// Native pixel sizes for a role; empty means "whatever the file carries".
    pub fn sizes_for(&self, role: BandRole) -> &[f64] {
        self.native_sizes.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn token_for(&self, role: BandRole) -> Option<&str> {
        self.band_tokens.get(&role).map(String::as_str)
    }
}

const ROLE_NAMES: &[(&str, BandRole)] = &[
    ("blue", BandRole::Blue),
    ("green", BandRole::Green),
    ("red", BandRole::Red),
    ("rededge1", BandRole::RedEdge1),
    ("rededge2", BandRole::RedEdge2),
    ("rededge3", BandRole::RedEdge3),
    ("nir", BandRole::Nir),
    ("narrownir", BandRole::NarrowNir),
    ("swir1", BandRole::Swir1),
    ("swir2", BandRole::Swir2),
    ("quality", BandRole::Quality),
];

fn s2_spec() -> PlatformSpec {
    let tokens: HashMap<BandRole, String> = [
        (BandRole::Blue, "B02"),
        (BandRole::Green, "B03"),
        (BandRole::Red, "B04"),
        (BandRole::RedEdge1, "B05"),
        (BandRole::RedEdge2, "B06"),
        (BandRole::RedEdge3, "B07"),
        (BandRole::Nir, "B08"),
        (BandRole::NarrowNir, "B8A"),
        (BandRole::Swir1, "B11"),
        (BandRole::Swir2, "B12"),
        (BandRole::Quality, "SCL"),
    ]
    .into_iter()
    .map(|(r, t)| (r, t.to_string()))
    .collect();

    let ten = vec![10.0, 20.0, 60.0];
    let twenty = vec![20.0, 60.0];
    let sizes: HashMap<BandRole, Vec<f64>> = [
        (BandRole::Blue, ten.clone()),
        (BandRole::Green, ten.clone()),
        (BandRole::Red, ten.clone()),
        (BandRole::Nir, ten),
        (BandRole::RedEdge1, twenty.clone()),
        (BandRole::RedEdge2, twenty.clone()),
        (BandRole::RedEdge3, twenty.clone()),
        (BandRole::NarrowNir, twenty.clone()),
        (BandRole::Swir1, twenty.clone()),
        (BandRole::Swir2, twenty.clone()),
        (BandRole::Quality, twenty),
    ]
    .into_iter()
    .collect();

    PlatformSpec {
        band_source: BandSource::FilePerBand {
            template: "_{band}_{res}m.".to_string(),
        },
        band_tokens: tokens,
        native_sizes: sizes,
        band_designation: r"^(B\d{2}A?|B8A|SCL)$".to_string(),
        quantification: DnScale {
            scale: 1.0 / 10_000.0,
            offset: 0.0,
        },
        reflectance_bounds: (0.0, 1.0),
        bitmask: false,
        // SCL classes: no-data, saturated, cloud shadow, medium/high cloud
        // probability, cirrus, snow
        to_be_masked: vec![0, 1, 3, 8, 9, 10, 11],
        quality_pixel_size: 20.0,
        tile_pattern: r"_T(\d{2}[A-Z]{3})_".to_string(),
        date_pattern: r"_(\d{8})T\d{6}_".to_string(),
        orbit_pattern: Some(r"_R(\d{3})_".to_string()),
        expected_min_bands: 10,
    }
}

fn ls8_spec() -> PlatformSpec {
    let tokens: HashMap<BandRole, String> = [
        (BandRole::Blue, "B2"),
        (BandRole::Green, "B3"),
        (BandRole::Red, "B4"),
        (BandRole::Nir, "B5"),
        (BandRole::Swir1, "B6"),
        (BandRole::Swir2, "B7"),
        (BandRole::Quality, "QA_PIXEL"),
    ]
    .into_iter()
    .map(|(r, t)| (r, t.to_string()))
    .collect();

    let thirty = vec![30.0];
    let sizes: HashMap<BandRole, Vec<f64>> =
        tokens.keys().map(|role| (*role, thirty.clone())).collect();

    PlatformSpec {
        band_source: BandSource::FilePerBand {
            template: "_{band}.".to_string(),
        },
        band_tokens: tokens,
        native_sizes: sizes,
        band_designation: r"^(B\d|QA_PIXEL)$".to_string(),
        // Collection 2 Level-2 surface reflectance scaling
        quantification: DnScale {
            scale: 2.75e-5,
            offset: -0.2,
        },
        reflectance_bounds: (0.0, 1.0),
        bitmask: true,
        // QA_PIXEL bits: dilated cloud, cirrus, cloud, cloud shadow
        to_be_masked: vec![1, 2, 3, 4],
        quality_pixel_size: 30.0,
        tile_pattern: r"_(\d{6})_".to_string(),
        date_pattern: r"_(\d{8})_".to_string(),
        orbit_pattern: None,
        expected_min_bands: 7,
    }
}

fn tif_spec() -> PlatformSpec {
    PlatformSpec {
        band_source: BandSource::Multiband {
            order: vec![BandRole::Red, BandRole::Green, BandRole::Blue, BandRole::Nir],
        },
        band_tokens: HashMap::new(),
        native_sizes: HashMap::new(),
        band_designation: r"^\d+$".to_string(),
        quantification: DnScale {
            scale: 1.0,
            offset: 0.0,
        },
        reflectance_bounds: (0.0, 1.0),
        bitmask: false,
        to_be_masked: Vec::new(),
        quality_pixel_size: 0.0,
        tile_pattern: r"^([A-Za-z0-9\-]+)".to_string(),
        date_pattern: r"(\d{8})".to_string(),
        orbit_pattern: None,
        expected_min_bands: 1,
    }
}

/// Immutable configuration for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub platform: Platform,
    pub raster_root: PathBuf,
    pub polygon_source: PathBuf,
    pub tile_grid: PathBuf,
    pub output_dir: PathBuf,
    pub id_field: String,
    pub tile_field: String,
    /// Target grid resolution in CRS units
    pub pixel_size: f64,
    pub resampling: ResamplingMethod,
    pub indices: Vec<SpectralIndex>,
    pub statistics: Vec<Statistic>,
    /// Immutable per-task output-format set, computed once before fan-out
    pub formats: Vec<OutputFormat>,
    pub inclusion: InclusionPolicy,
    pub max_cloud_cover: f64,
    /// Disable cloud masking entirely
    pub no_cloud_mask: bool,
    /// Pre-built mask raster (1 = exclude, 0 = keep) substituting the builder
    pub external_mask: Option<PathBuf>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub tile_allowlist: Option<Vec<String>>,
    /// Worker threads; 0 selects `cores - reserve` with a floor of one
    pub workers: usize,
    pub platform_spec: PlatformSpec,
}

impl RunConfig {
    /// Validate configuration-class invariants eagerly, before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if self.indices.is_empty() {
            return Err(Error::MissingArgument {
                arg: "--indices".to_string(),
            });
        }
        if self.formats.is_empty() {
            return Err(Error::MissingArgument {
                arg: "--formats".to_string(),
            });
        }
        if self.formats.iter().any(|f| {
            matches!(f, OutputFormat::Stats | OutputFormat::Table)
        }) && self.statistics.is_empty()
        {
            return Err(Error::MissingArgument {
                arg: "--statistics".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            return Err(Error::InvalidArgument {
                arg: "max-cloud-cover",
                value: self.max_cloud_cover.to_string(),
            });
        }
        if self.pixel_size <= 0.0 {
            return Err(Error::InvalidArgument {
                arg: "pixel-size",
                value: self.pixel_size.to_string(),
            });
        }
        for (arg, pattern) in [
            ("tilepattern", Some(&self.platform_spec.tile_pattern)),
            ("datepattern", Some(&self.platform_spec.date_pattern)),
            ("orbitpattern", self.platform_spec.orbit_pattern.as_ref()),
        ] {
            if let Some(pattern) = pattern {
                Regex::new(pattern).map_err(|e| Error::InvalidPattern {
                    arg,
                    message: e.to_string(),
                })?;
            }
        }
        if let Some((start, end)) = self.date_range {
            if start > end {
                return Err(Error::InvalidArgument {
                    arg: "date-range",
                    value: format!("{}..{}", start, end),
                });
            }
        }
        Ok(())
    }

    /// Effective worker count: explicit value, or `cores - reserve` floored at one.
    pub fn effective_workers(&self) -> usize {
        const RESERVE: usize = 1;
        if self.workers > 0 {
            self.workers
        } else {
            num_cpus::get().saturating_sub(RESERVE).max(1)
        }
    }
}
