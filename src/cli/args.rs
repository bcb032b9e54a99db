use clap::Parser;
use std::path::PathBuf;

use zonex::types::{OutputFormat, Platform, ResamplingMethod, SpectralIndex, Statistic};

#[derive(Parser)]
#[command(name = "zonex", version, about = "ZONEX zonal index extraction CLI")]
pub struct CliArgs {
    /// Root directory of raster products, or a single product
    #[arg(short, long)]
    pub input: PathBuf,

    /// Polygon collection (GeoJSON FeatureCollection)
    #[arg(short, long)]
    pub polygons: PathBuf,

    /// Tiling-grid polygon collection (GeoJSON FeatureCollection)
    #[arg(long)]
    pub tile_grid: PathBuf,

    /// Output directory (created if missing)
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Satellite platform / product layout
    #[arg(long, value_enum, default_value_t = Platform::S2)]
    pub platform: Platform,

    /// Feature property carrying the polygon id
    #[arg(long, default_value = "id")]
    pub id_field: String,

    /// Feature property carrying the tile id in the tiling grid
    #[arg(long, default_value = "Name")]
    pub tile_field: String,

    /// Spectral indices to compute
    #[arg(long, value_enum, value_delimiter = ',', required = true)]
    pub indices: Vec<SpectralIndex>,

    /// Statistics to aggregate per polygon (stats/table formats)
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Statistic::Count, Statistic::Mean, Statistic::Std])]
    pub statistics: Vec<Statistic>,

    /// Output formats to emit
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [OutputFormat::Stats])]
    pub formats: Vec<OutputFormat>,

    /// Target pixel size in CRS units
    #[arg(long, default_value_t = 10.0)]
    pub pixel_size: f64,

    /// Resampling kernel for bands not offered at the target size
    #[arg(long, value_enum, default_value_t = ResamplingMethod::Nearest)]
    pub resampling: ResamplingMethod,

    /// Band order of generic multiband rasters, as band designations
    /// (role names like "red" or platform tokens); tif platform only
    #[arg(long, value_delimiter = ',')]
    pub bands: Option<Vec<String>>,

    /// Count only pixels whose center falls inside a polygon
    #[arg(long, default_value_t = false)]
    pub exclude_border: bool,

    /// Skip products whose reported cloud cover exceeds this percentage
    #[arg(long, default_value_t = 100.0)]
    pub max_cloud_cover: f64,

    /// Disable cloud masking entirely
    #[arg(long, default_value_t = false)]
    pub no_cloud_mask: bool,

    /// Externally supplied mask raster (1 = exclude), replaces the built mask
    #[arg(long)]
    pub external_mask: Option<PathBuf>,

    /// Only process acquisitions on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Only process acquisitions on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Restrict processing to these tile ids
    #[arg(long, value_delimiter = ',')]
    pub tiles: Option<Vec<String>>,

    /// Worker threads (0 = all cores minus one)
    #[arg(long, default_value_t = 0)]
    pub workers: usize,

    /// Enable logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}
