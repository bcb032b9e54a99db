//! Shared types and enums used across ZONEX.
//! Includes `Platform`, `BandRole`, `SpectralIndex`, `Statistic`,
//! `ResamplingMethod`, `InclusionPolicy`, and `OutputFormat`.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported satellite platforms / product layouts.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum Platform {
    /// Sentinel-2 L2A SAFE products
    S2,
    /// Landsat-8 Collection 2 scenes
    Ls8,
    /// Generic single-file multiband raster
    Tif,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::S2 => "s2",
            Platform::Ls8 => "ls8",
            Platform::Tif => "tif",
        };
        write!(f, "{}", s)
    }
}

/// Symbolic band roles, resolved per platform to concrete files or band indices.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum BandRole {
    Blue,
    Green,
    Red,
    RedEdge1,
    RedEdge2,
    RedEdge3,
    Nir,
    NarrowNir,
    Swir1,
    Swir2,
    /// Categorical/bit-coded quality band used for cloud masking
    Quality,
}

impl std::fmt::Display for BandRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BandRole::Blue => "blue",
            BandRole::Green => "green",
            BandRole::Red => "red",
            BandRole::RedEdge1 => "rededge1",
            BandRole::RedEdge2 => "rededge2",
            BandRole::RedEdge3 => "rededge3",
            BandRole::Nir => "nir",
            BandRole::NarrowNir => "narrownir",
            BandRole::Swir1 => "swir1",
            BandRole::Swir2 => "swir2",
            BandRole::Quality => "quality",
        };
        write!(f, "{}", s)
    }
}

/// Closed registry of spectral index formulas.
///
/// Dispatch is by enum variant, resolved at argument-parse time; an
/// unrecognized name is a fatal configuration error, never a silent fallback.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize,
)]
pub enum SpectralIndex {
    Ndvi,
    Ndwi,
    Ndmi,
    Evi,
    Savi,
    Rvi,
    TcBrightness,
    TcGreenness,
    TcWetness,
}

impl std::str::FromStr for SpectralIndex {
    type Err = crate::error::Error;

    /// Name-based lookup for JSON presets and library callers; an unknown
    /// name is a fatal configuration error, never a silent fallback.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::value_variants()
            .iter()
            .copied()
            .find(|v| v.to_string() == s)
            .ok_or_else(|| crate::error::Error::UnsupportedIndex {
                name: s.to_string(),
            })
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpectralIndex::Ndvi => "ndvi",
            SpectralIndex::Ndwi => "ndwi",
            SpectralIndex::Ndmi => "ndmi",
            SpectralIndex::Evi => "evi",
            SpectralIndex::Savi => "savi",
            SpectralIndex::Rvi => "rvi",
            SpectralIndex::TcBrightness => "tc-brightness",
            SpectralIndex::TcGreenness => "tc-greenness",
            SpectralIndex::TcWetness => "tc-wetness",
        };
        write!(f, "{}", s)
    }
}

/// Per-polygon aggregate statistics.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum Statistic {
    Count,
    Mean,
    Median,
    Std,
    Min,
    Max,
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Statistic::Count => "count",
            Statistic::Mean => "mean",
            Statistic::Median => "median",
            Statistic::Std => "std",
            Statistic::Min => "min",
            Statistic::Max => "max",
        };
        write!(f, "{}", s)
    }
}

/// Named resampling strategies; identical contract, different kernels.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum ResamplingMethod {
    Nearest,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
}

impl ResamplingMethod {
    pub fn to_gdal(self) -> gdal::raster::ResampleAlg {
        use gdal::raster::ResampleAlg;
        match self {
            ResamplingMethod::Nearest => ResampleAlg::NearestNeighbour,
            ResamplingMethod::Bilinear => ResampleAlg::Bilinear,
            ResamplingMethod::Cubic => ResampleAlg::Cubic,
            ResamplingMethod::CubicSpline => ResampleAlg::CubicSpline,
            ResamplingMethod::Lanczos => ResampleAlg::Lanczos,
            ResamplingMethod::Average => ResampleAlg::Average,
        }
    }
}

impl std::str::FromStr for ResamplingMethod {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::value_variants()
            .iter()
            .copied()
            .find(|v| v.to_string() == s)
            .ok_or_else(|| crate::error::Error::UnsupportedResampling {
                name: s.to_string(),
            })
    }
}

impl std::fmt::Display for ResamplingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResamplingMethod::Nearest => "nearest",
            ResamplingMethod::Bilinear => "bilinear",
            ResamplingMethod::Cubic => "cubic",
            ResamplingMethod::CubicSpline => "cubicspline",
            ResamplingMethod::Lanczos => "lanczos",
            ResamplingMethod::Average => "average",
        };
        write!(f, "{}", s)
    }
}

/// Whether a boundary-straddling pixel counts as inside a polygon.
///
/// `AllTouched` is the default: any pixel the geometry touches is included.
/// `CenterOnly` requires the pixel center to fall inside the polygon and is
/// selected with `--exclude-border`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum InclusionPolicy {
    AllTouched,
    CenterOnly,
}

impl std::fmt::Display for InclusionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InclusionPolicy::AllTouched => "all-touched",
            InclusionPolicy::CenterOnly => "center-only",
        };
        write!(f, "{}", s)
    }
}

/// Output encodings; any subset may be requested for one run.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize,
)]
pub enum OutputFormat {
    /// Delimited text, one file per (index, tile, date)
    Stats,
    /// Per-polygon pixel sub-arrays with affine offsets, JSON-encoded
    Arrays,
    /// One cropped GeoTIFF per polygon id
    Raster,
    /// One relational table per index, rows appended per extraction
    Table,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutputFormat::Stats => "stats",
            OutputFormat::Arrays => "arrays",
            OutputFormat::Raster => "raster",
            OutputFormat::Table => "table",
        };
        write!(f, "{}", s)
    }
}
