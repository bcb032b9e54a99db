//! Staged batch orchestrator: partition, validate, mask, extract.
//! Partitioning and validation are global barriers; the cloud mask is built
//! once per product, before that product's first extraction, and is immutable
//! afterwards. Within a stage, work fans out over a bounded rayon pool. A
//! product failure is a warning and a skip, never a batch abort. Only
//! configuration-class errors abort before the first stage runs.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use geo::MultiPolygon;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::core::config::RunConfig;
use crate::core::grid::PixelGrid;
use crate::core::indices::BandSet;
use crate::core::mask::{build_mask, external_mask, CloudMask};
use crate::core::zonal::{extract_arrays, extract_stats};
use crate::error::{Error, Result};
use crate::io::bands::BandResolver;
use crate::io::locator::{ProductLocator, RasterProductRef};
use crate::io::partition::{partition, PartitionCache};
use crate::io::raster::RasterSource;
use crate::io::validate::validate_product;
use crate::io::vector::PolygonCollection;
use crate::io::writers::table::TableWriter;
use crate::io::writers::{arrays, raster, stats_csv, ExtractionContext};
use crate::types::{OutputFormat, Platform, SpectralIndex};

/// Pipeline stages in execution order. Logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Partitioning,
    Validating,
    Masking,
    Extracting,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "INIT",
            Stage::Partitioning => "PARTITIONING",
            Stage::Validating => "VALIDATING",
            Stage::Masking => "MASKING",
            Stage::Extracting => "EXTRACTING",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Counters summarizing one batch run.
#[derive(Debug, Default, Clone)]
pub struct BatchReport {
    pub products_discovered: usize,
    pub products_validated: usize,
    pub products_skipped: usize,
    pub partitions: usize,
    pub extractions_completed: usize,
    pub extractions_failed: usize,
}

impl BatchReport {
    /// A batch that ran to completion without producing any output. Not an
    /// error; the caller decides how loudly to report it.
    pub fn produced_nothing(&self) -> bool {
        self.extractions_completed == 0
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} products discovered, {} validated, {} skipped; {} partitions; {} extractions completed, {} failed",
            self.products_discovered,
            self.products_validated,
            self.products_skipped,
            self.partitions,
            self.extractions_completed,
            self.extractions_failed
        )
    }
}

struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Run one batch end to end.
pub fn run(config: &RunConfig) -> Result<BatchReport> {
    if let Err(e) = config.validate() {
        error!(stage = %Stage::Failed, "configuration rejected: {}", e);
        return Err(e);
    }
    info!(stage = %Stage::Init, "starting batch run");
    std::fs::create_dir_all(&config.output_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.effective_workers())
        .build()
        .map_err(|e| Error::Processing(e.to_string()))?;
    info!("Worker pool sized to {} threads", config.effective_workers());

    let polygons = PolygonCollection::read_geojson(&config.polygon_source, &config.id_field)
        .map_err(Error::Vector)?;
    let tile_grid = PolygonCollection::read_geojson(&config.tile_grid, &config.tile_field)
        .map_err(Error::Vector)?;

    info!(stage = %Stage::Partitioning, "partitioning {} polygons", polygons.len());
    let cache = PartitionCache::new(config.output_dir.join("partitions"))?;
    let partitions = pool.install(|| {
        partition(&polygons, &tile_grid, &config.polygon_source, &cache)
    })?;
    if partitions.is_empty() {
        warn!("No tile intersects the polygon collection; nothing to do");
        return Ok(BatchReport::default());
    }

    let locator = ProductLocator::new(config.platform, &config.platform_spec)?;
    let discovered = locator.discover(
        &config.raster_root,
        config.date_range,
        config.tile_allowlist.as_deref(),
    )?;
    let mut report = BatchReport {
        products_discovered: discovered.len(),
        partitions: partitions.len(),
        ..BatchReport::default()
    };

    let mut products = discovered;
    products.retain(|p| partitions.contains_key(&p.tile_id));

    let mut partition_polygons: HashMap<String, PolygonCollection> = HashMap::new();
    for (tile, path) in &partitions {
        let collection =
            PolygonCollection::read_geojson(path, &config.id_field).map_err(Error::Vector)?;
        partition_polygons.insert(tile.clone(), collection);
    }

    info!(stage = %Stage::Validating, "validating {} candidate products", products.len());
    let validated: Vec<RasterProductRef> = pool.install(|| {
        products
            .par_iter()
            .filter(|product| {
                match validate_product(product, config, &partition_polygons[&product.tile_id]) {
                    Ok(()) => true,
                    Err(failure) => {
                        warn!("Skipping product {}: {}", product.key(), failure);
                        false
                    }
                }
            })
            .cloned()
            .collect()
    });
    report.products_validated = validated.len();
    report.products_skipped = report.products_discovered - validated.len();
    info!(
        "{} of {} products will be processed",
        validated.len(),
        report.products_discovered
    );

    let table_writer = if config.formats.contains(&OutputFormat::Table) {
        Some(TableWriter::new(&config.output_dir, &config.statistics))
    } else {
        None
    };
    let counters = Counters {
        completed: AtomicUsize::new(0),
        failed: AtomicUsize::new(0),
    };

    info!(stage = %Stage::Extracting, "extracting {} indices x {} products",
        config.indices.len(), validated.len());
    pool.install(|| {
        validated.par_iter().for_each(|product| {
            let polygons = &partition_polygons[&product.tile_id];
            process_product(config, product, polygons, table_writer.as_ref(), &counters);
        });
    });

    report.extractions_completed = counters.completed.load(Ordering::Relaxed);
    report.extractions_failed = counters.failed.load(Ordering::Relaxed);
    if report.produced_nothing() {
        warn!(stage = %Stage::Done, "batch completed without any output: {}", report);
    } else {
        info!(stage = %Stage::Done, "{}", report);
    }
    Ok(report)
}

/// Build the exclusion mask for one product at the target grid.
fn product_mask(
    config: &RunConfig,
    resolver: &BandResolver<'_>,
    grid: &PixelGrid,
) -> Result<CloudMask> {
    if config.no_cloud_mask {
        return Ok(CloudMask::clear(grid.height, grid.width));
    }
    if let Some(path) = &config.external_mask {
        let source = RasterSource::open(path).map_err(Error::Raster)?;
        let values = source.read_band(1).map_err(Error::Raster)?;
        return external_mask(&values, grid);
    }
    if config.platform == Platform::Tif {
        // generic rasters carry no quality band
        return Ok(CloudMask::clear(grid.height, grid.width));
    }
    let (quality, quality_pixel_size) = resolver.get_quality_native()?;
    build_mask(
        &quality,
        quality_pixel_size,
        grid,
        config.platform_spec.bitmask,
        &config.platform_spec.to_be_masked,
    )
}

/// Per-product state shared by every index extraction: the common grid, the
/// exclusion mask, and the partition polygons reprojected into the grid CRS.
/// Built exactly once, by whichever index task gets there first, and
/// immutable afterwards.
struct SceneContext {
    grid: PixelGrid,
    mask: CloudMask,
    polygons: Vec<(String, MultiPolygon<f64>)>,
}

fn scene_context(
    config: &RunConfig,
    product: &RasterProductRef,
    resolver: &BandResolver<'_>,
    partition: &PolygonCollection,
    cell: &Mutex<Option<Arc<SceneContext>>>,
) -> Result<Arc<SceneContext>> {
    let mut cell = cell.lock().unwrap();
    if let Some(scene) = cell.as_ref() {
        return Ok(Arc::clone(scene));
    }
    let grid = resolver.grid()?;
    debug!(stage = %Stage::Masking, "building mask for {}", product.key());
    let mask = product_mask(config, resolver, &grid)?;
    let local = partition.reprojected(grid.epsg).map_err(Error::Vector)?;
    let polygons = local
        .features
        .iter()
        .map(|f| (f.id.clone(), f.geometry.clone()))
        .collect();
    let scene = Arc::new(SceneContext {
        grid,
        mask,
        polygons,
    });
    *cell = Some(Arc::clone(&scene));
    Ok(scene)
}

fn process_product(
    config: &RunConfig,
    product: &RasterProductRef,
    partition: &PolygonCollection,
    table: Option<&TableWriter>,
    counters: &Counters,
) {
    let resolver = BandResolver::new(
        product,
        &config.platform_spec,
        config.pixel_size,
        config.resampling,
    );
    let scene: Mutex<Option<Arc<SceneContext>>> = Mutex::new(None);

    config.indices.par_iter().for_each(|&index| {
        match extract_index(config, product, index, &resolver, partition, &scene, table) {
            Ok(failed_formats) => {
                if failed_formats == 0 {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                warn!(
                    "Extraction of {} for {} failed: {}",
                    index,
                    product.key(),
                    e
                );
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
}

/// Compute one index for one product and emit every requested format.
///
/// Bands are resolved here, per index, so a missing band file fails only the
/// indices that consume it; siblings proceed off the resolver's shared cache.
/// Format failures are isolated per (product, index, format); the count of
/// failed formats is returned so the caller can attribute the extraction.
fn extract_index(
    config: &RunConfig,
    product: &RasterProductRef,
    index: SpectralIndex,
    resolver: &BandResolver<'_>,
    partition: &PolygonCollection,
    scene_cell: &Mutex<Option<Arc<SceneContext>>>,
    table: Option<&TableWriter>,
) -> Result<usize> {
    let mut bands = BandSet::new();
    for role in index.required_roles() {
        bands.insert(*role, resolver.get_band(*role)?.as_ref().clone());
    }
    let scene = scene_context(config, product, resolver, partition, scene_cell)?;

    let raw = index.compute(&bands)?;
    let masked = scene.mask.apply(&raw)?;
    let ctx = ExtractionContext {
        index,
        tile_id: product.tile_id.clone(),
        date: product.date,
        orbit: product.orbit,
    };

    let grid = &scene.grid;
    let polygons = scene.polygons.as_slice();
    let mut failed = 0usize;
    for format in &config.formats {
        let outcome = match format {
            OutputFormat::Stats => {
                let rows = extract_stats(&masked, grid, polygons, config.inclusion, &config.statistics);
                stats_csv::write_stats(&config.output_dir, &ctx, &config.statistics, &rows)
                    .map(|_| ())
            }
            OutputFormat::Arrays => {
                let cropped = extract_arrays(&masked, grid, polygons);
                arrays::write_arrays(&config.output_dir, &ctx, &cropped).map(|_| ())
            }
            OutputFormat::Raster => {
                let cropped = extract_arrays(&masked, grid, polygons);
                raster::write_rasters(&config.output_dir, &ctx, &cropped, grid.epsg).map(|_| ())
            }
            OutputFormat::Table => {
                let rows = extract_stats(&masked, grid, polygons, config.inclusion, &config.statistics);
                match table {
                    Some(table) => table.append(&ctx, &rows),
                    None => Err(Error::Processing("table writer not initialized".to_string())),
                }
            }
        };
        if let Err(e) = outcome {
            warn!(
                "Writing {} output of {} for {} failed: {}",
                format,
                index,
                product.key(),
                e
            );
            failed += 1;
        }
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PlatformSpec;
    use crate::io::raster::write_geotiff;
    use crate::io::vector::PolygonFeature;
    use crate::types::{InclusionPolicy, ResamplingMethod, Statistic};
    use chrono::NaiveDate;
    use geo::polygon;
    use ndarray::Array2;
    use std::fs;
    use std::path::Path;

    fn scene_config(dir: &Path) -> RunConfig {
        RunConfig {
            platform: Platform::S2,
            raster_root: dir.to_path_buf(),
            polygon_source: dir.join("polys.geojson"),
            tile_grid: dir.join("tiles.geojson"),
            output_dir: dir.join("out"),
            id_field: "id".to_string(),
            tile_field: "Name".to_string(),
            pixel_size: 10.0,
            resampling: ResamplingMethod::Nearest,
            indices: vec![SpectralIndex::Ndvi, SpectralIndex::Ndmi],
            statistics: vec![Statistic::Count, Statistic::Mean],
            formats: vec![OutputFormat::Stats],
            inclusion: InclusionPolicy::AllTouched,
            max_cloud_cover: 100.0,
            no_cloud_mask: true,
            external_mask: None,
            date_range: None,
            tile_allowlist: None,
            workers: 2,
            platform_spec: PlatformSpec::for_platform(Platform::S2),
        }
    }

    #[test]
    fn missing_band_fails_only_indices_that_need_it() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir
            .path()
            .join("S2A_MSIL2A_20200601T100031_N0214_R122_T33UUP_20200601T120000.SAFE");
        fs::create_dir_all(&root).unwrap();
        let gt = [500_000.0, 10.0, 0.0, 5_300_000.0, 0.0, -10.0];
        let dn = Array2::from_elem((4, 4), 5000.0);
        // red and nir only; ndmi cannot resolve its swir1 input
        for band in ["B04_10m", "B08_10m"] {
            write_geotiff(
                &root.join(format!("T33UUP_20200601T100031_{}.tif", band)),
                &dn,
                gt,
                32633,
            )
            .unwrap();
        }

        let config = scene_config(dir.path());
        fs::create_dir_all(&config.output_dir).unwrap();
        let product = RasterProductRef {
            platform: Platform::S2,
            root,
            tile_id: "33UUP".to_string(),
            date: NaiveDate::from_ymd_opt(2020, 6, 1).unwrap(),
            orbit: Some(122),
        };
        let square = polygon![
            (x: 500_005.0, y: 5_299_995.0),
            (x: 500_025.0, y: 5_299_995.0),
            (x: 500_025.0, y: 5_299_975.0),
            (x: 500_005.0, y: 5_299_975.0),
        ];
        let partition = PolygonCollection {
            features: vec![PolygonFeature {
                id: "A1".to_string(),
                geometry: MultiPolygon(vec![square]),
                properties: Default::default(),
            }],
            epsg: 32633,
        };
        let counters = Counters {
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        };

        process_product(&config, &product, &partition, None, &counters);

        assert_eq!(counters.completed.load(Ordering::Relaxed), 1);
        assert_eq!(counters.failed.load(Ordering::Relaxed), 1);
        assert!(config.output_dir.join("ndvi_33UUP_20200601.csv").exists());
        assert!(!config.output_dir.join("ndmi_33UUP_20200601.csv").exists());
    }

    #[test]
    fn stages_render_in_upper_case() {
        assert_eq!(Stage::Partitioning.to_string(), "PARTITIONING");
        assert_eq!(Stage::Done.to_string(), "DONE");
    }

    #[test]
    fn empty_report_counts_as_no_output() {
        let report = BatchReport::default();
        assert!(report.produced_nothing());

        let report = BatchReport {
            extractions_completed: 3,
            ..BatchReport::default()
        };
        assert!(!report.produced_nothing());
    }
}
