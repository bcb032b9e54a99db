use chrono::NaiveDate;
use tracing::{info, warn};

use zonex::core::config::{BandSource, PlatformSpec, RunConfig};
use zonex::core::orchestrator;
use zonex::types::{InclusionPolicy, Platform};

use super::args::CliArgs;
use super::errors::AppError;

fn parse_date(arg: &'static str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| AppError::InvalidDate {
        arg,
        value: value.to_string(),
    })
}

/// Translate parsed arguments into the immutable run configuration.
pub fn config_from_args(args: &CliArgs) -> Result<RunConfig, AppError> {
    let date_range = match (&args.start_date, &args.end_date) {
        (None, None) => None,
        (start, end) => {
            let start = match start {
                Some(s) => parse_date("--start-date", s)?,
                None => NaiveDate::MIN,
            };
            let end = match end {
                Some(e) => parse_date("--end-date", e)?,
                None => NaiveDate::MAX,
            };
            if start > end {
                return Err(AppError::DateRangeOrder {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }
            Some((start, end))
        }
    };

    let inclusion = if args.exclude_border {
        InclusionPolicy::CenterOnly
    } else {
        InclusionPolicy::AllTouched
    };

    let mut platform_spec = PlatformSpec::for_platform(args.platform);
    if let Some(bands) = &args.bands {
        if args.platform != Platform::Tif {
            return Err(AppError::BandOrderPlatform {
                platform: args.platform.to_string(),
            });
        }
        let order = bands
            .iter()
            .map(|name| {
                platform_spec
                    .designation_role(name)
                    .ok_or_else(|| AppError::UnknownBand { name: name.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        platform_spec.band_source = BandSource::Multiband { order };
    }

    Ok(RunConfig {
        platform: args.platform,
        raster_root: args.input.clone(),
        polygon_source: args.polygons.clone(),
        tile_grid: args.tile_grid.clone(),
        output_dir: args.output_dir.clone(),
        id_field: args.id_field.clone(),
        tile_field: args.tile_field.clone(),
        pixel_size: args.pixel_size,
        resampling: args.resampling,
        indices: args.indices.clone(),
        statistics: args.statistics.clone(),
        formats: args.formats.clone(),
        inclusion,
        max_cloud_cover: args.max_cloud_cover,
        no_cloud_mask: args.no_cloud_mask,
        external_mask: args.external_mask.clone(),
        date_range,
        tile_allowlist: args.tiles.clone(),
        workers: args.workers,
        platform_spec,
    })
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let config = config_from_args(&args)?;
    config.validate().map_err(AppError::Pipeline)?;

    let report = orchestrator::run(&config).map_err(AppError::Pipeline)?;
    if report.produced_nothing() {
        warn!("Run completed without producing any output");
    } else {
        info!("Run completed: {}", report);
    }
    Ok(())
}
