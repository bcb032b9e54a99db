#![doc = r#"
ZONEX — tile-partitioned zonal spectral-index extraction for satellite rasters.

This crate turns a directory of satellite products (Sentinel-2 L2A SAFE,
Landsat-8 Collection 2, or generic multiband GeoTIFFs) plus a GeoJSON polygon
collection into per-polygon spectral-index outputs: aggregate statistics,
cropped pixel arrays, per-polygon GeoTIFFs, or relational tables. It powers
the ZONEX CLI and can be embedded in your own Rust applications.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start: run a batch programmatically
-----------------------------------------
```rust,no_run
use std::path::PathBuf;
use zonex::{
    core::config::{PlatformSpec, RunConfig},
    core::orchestrator,
    InclusionPolicy, OutputFormat, Platform, ResamplingMethod, SpectralIndex, Statistic,
};

fn main() -> zonex::Result<()> {
    let config = RunConfig {
        platform: Platform::S2,
        raster_root: PathBuf::from("/data/s2"),
        polygon_source: PathBuf::from("/data/parcels.geojson"),
        tile_grid: PathBuf::from("/data/s2_tiles.geojson"),
        output_dir: PathBuf::from("/out"),
        id_field: "id".to_string(),
        tile_field: "Name".to_string(),
        pixel_size: 10.0,
        resampling: ResamplingMethod::Nearest,
        indices: vec![SpectralIndex::Ndvi, SpectralIndex::Evi],
        statistics: vec![Statistic::Count, Statistic::Mean, Statistic::Std],
        formats: vec![OutputFormat::Stats, OutputFormat::Table],
        inclusion: InclusionPolicy::AllTouched,
        max_cloud_cover: 60.0,
        no_cloud_mask: false,
        external_mask: None,
        date_range: None,
        tile_allowlist: None,
        workers: 0,
        platform_spec: PlatformSpec::for_platform(Platform::S2),
    };

    let report = orchestrator::run(&config)?;
    println!("{}", report);
    Ok(())
}
```

The pipeline runs in stages: polygon partitioning by the tiling grid, product
validation (structure, reported cloud cover, data coverage), cloud-mask
construction, and parallel per-(product, index) extraction. A failing product
is skipped with a warning; only configuration errors abort the batch.
"#]

pub mod core;
pub mod error;
pub mod io;
pub mod types;

pub use error::{Error, Result};

pub use crate::core::config::{PlatformSpec, RunConfig};
pub use crate::core::orchestrator::{run, BatchReport, Stage};
pub use types::{
    BandRole, InclusionPolicy, OutputFormat, Platform, ResamplingMethod, SpectralIndex, Statistic,
};
