//! Product validation: cheap short-circuit checks run per product before any
//! band is resampled. Structural integrity first, then reported cloud cover
//! from product metadata, then actual data coverage under the area of
//! interest. Every failure is a skip for that product, never a batch abort.
use std::path::{Path, PathBuf};

use geo::MultiPolygon;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::config::RunConfig;
use crate::core::zonal::pixels_under;
use crate::io::bands::{band_files, BandResolver};
use crate::io::locator::RasterProductRef;
use crate::io::raster::RasterSource;
use crate::io::vector::PolygonCollection;
use crate::types::{BandRole, InclusionPolicy, Platform};

/// Why a product was rejected. Each variant is a per-product skip reason
/// surfaced as a warning, not a batch-fatal error.
#[derive(Debug, Error)]
pub enum ValidationFailure {
    #[error("structural check failed: {found} band files, expected at least {expected}")]
    Structure { found: usize, expected: usize },
    #[error("reported cloud cover {cover:.1}% exceeds limit {limit:.1}%")]
    CloudCover { cover: f64, limit: f64 },
    #[error("no valid data under the area of interest")]
    NoCoverage,
    #[error("product unreadable: {0}")]
    Unreadable(String),
}

/// Reported whole-product cloud cover against the configured ceiling.
/// Unknown cover passes; the gate only acts on what the metadata states.
pub fn cloud_cover_ok(cover: Option<f64>, limit: f64) -> bool {
    cover.map(|c| c <= limit).unwrap_or(true)
}

fn find_metadata_file(root: &Path, matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    WalkDir::new(root)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .find(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(&matches)
                    .unwrap_or(false)
        })
}

/// Cloud cover from a Sentinel-2 product metadata XML
/// (`Cloud_Coverage_Assessment` element).
pub fn parse_s2_cloud_cover(xml: &str) -> Option<f64> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut inside = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"Cloud_Coverage_Assessment" => {
                inside = true;
            }
            Ok(Event::Text(t)) if inside => {
                return t.unescape().ok()?.trim().parse().ok();
            }
            Ok(Event::End(_)) => inside = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// Cloud cover from a Landsat MTL text file (`CLOUD_COVER = <value>` line).
pub fn parse_mtl_cloud_cover(text: &str) -> Option<f64> {
    text.lines()
        .map(str::trim)
        .find(|l| l.starts_with("CLOUD_COVER ") || l.starts_with("CLOUD_COVER="))
        .and_then(|l| l.split('=').nth(1))
        .and_then(|v| v.trim().parse().ok())
}

/// Reported cloud cover for a product, if its metadata carries one.
pub fn reported_cloud_cover(product: &RasterProductRef) -> Option<f64> {
    match product.platform {
        Platform::S2 => {
            let path = find_metadata_file(&product.root, |n| {
                n.starts_with("MTD_MSIL") && n.ends_with(".xml")
            })?;
            let xml = std::fs::read_to_string(path).ok()?;
            parse_s2_cloud_cover(&xml)
        }
        Platform::Ls8 => {
            let path = find_metadata_file(&product.root, |n| n.ends_with("_MTL.txt"))?;
            let text = std::fs::read_to_string(path).ok()?;
            parse_mtl_cloud_cover(&text)
        }
        Platform::Tif => None,
    }
}

/// Mean of finite pixels under the area-of-interest footprint. `None` when
/// no pixel under the footprint carries a finite value.
pub fn aoi_mean(
    array: &ndarray::Array2<f64>,
    grid: &crate::core::grid::PixelGrid,
    footprint: &MultiPolygon<f64>,
) -> Option<f64> {
    let values: Vec<f64> = pixels_under(grid, footprint, InclusionPolicy::AllTouched)
        .into_iter()
        .map(|(r, c)| array[[r, c]])
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

// Red is present in every supported platform layout and is representative
// enough for a presence/absence check.
const COVERAGE_ROLE: BandRole = BandRole::Red;

/// Data-coverage check: read one representative band at its coarsest offered
/// resolution and require a nonzero mean under the polygon footprint. Catches
/// products whose tile footprint only grazes the area of interest.
fn check_coverage(
    product: &RasterProductRef,
    config: &RunConfig,
    partition: &PolygonCollection,
) -> Result<(), ValidationFailure> {
    let resolver = BandResolver::new(
        product,
        &config.platform_spec,
        config.pixel_size,
        config.resampling,
    );
    let role = COVERAGE_ROLE;
    let handle = resolver
        .resolve(role)
        .map_err(|e| ValidationFailure::Unreadable(e.to_string()))?;
    let source = RasterSource::open(&handle.path)
        .map_err(|e| ValidationFailure::Unreadable(e.to_string()))?;

    // Coarsest offered size keeps this check cheap; the exact values do not
    // matter, only whether anything valid sits under the footprint.
    let coarse = config
        .platform_spec
        .sizes_for(role)
        .iter()
        .cloned()
        .fold(source.grid.pixel_size, f64::max);
    let grid = source.grid_at(coarse);
    let array = source
        .read_band_shaped(handle.band_index, (grid.width, grid.height), None)
        .map_err(|e| ValidationFailure::Unreadable(e.to_string()))?;

    let footprint = partition
        .reprojected(grid.epsg)
        .ok()
        .and_then(|p| p.convex_hull())
        .map(|hull| MultiPolygon(vec![hull]))
        .ok_or(ValidationFailure::NoCoverage)?;

    match aoi_mean(&array, &grid, &footprint) {
        Some(mean) if mean != 0.0 => {
            debug!("Coverage check passed for {} (mean {:.4})", product.key(), mean);
            Ok(())
        }
        _ => Err(ValidationFailure::NoCoverage),
    }
}

/// Run all checks for one product in short-circuit order.
pub fn validate_product(
    product: &RasterProductRef,
    config: &RunConfig,
    partition: &PolygonCollection,
) -> Result<(), ValidationFailure> {
    let found = band_files(&product.root).len();
    let expected = config.platform_spec.expected_min_bands;
    if found < expected {
        return Err(ValidationFailure::Structure { found, expected });
    }

    let cover = reported_cloud_cover(product);
    if let Some(cover) = cover {
        if !cloud_cover_ok(Some(cover), config.max_cloud_cover) {
            return Err(ValidationFailure::CloudCover {
                cover,
                limit: config.max_cloud_cover,
            });
        }
    } else if product.platform != Platform::Tif {
        warn!(
            "No cloud-cover metadata found for {}; passing the gate",
            product.key()
        );
    }

    check_coverage(product, config, partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::PixelGrid;
    use geo::polygon;
    use ndarray::array;

    #[test]
    fn cloud_gate_is_inclusive_at_the_limit() {
        assert!(cloud_cover_ok(Some(50.0), 50.0));
        assert!(!cloud_cover_ok(Some(51.2), 50.0));
        assert!(cloud_cover_ok(None, 0.0));
    }

    #[test]
    fn s2_metadata_cloud_cover_is_parsed() {
        let xml = r#"<?xml version="1.0"?>
            <n1:Level-2A_User_Product xmlns:n1="https://psd-14.sentinel2.eo.esa.int">
              <n1:Quality_Indicators_Info>
                <Cloud_Coverage_Assessment>51.2</Cloud_Coverage_Assessment>
              </n1:Quality_Indicators_Info>
            </n1:Level-2A_User_Product>"#;
        assert_eq!(parse_s2_cloud_cover(xml), Some(51.2));
        assert_eq!(parse_s2_cloud_cover("<a>no assessment</a>"), None);
    }

    #[test]
    fn mtl_cloud_cover_is_parsed() {
        let text = "GROUP = LANDSAT_METADATA_FILE\n  CLOUD_COVER = 12.34\n  CLOUD_COVER_LAND = 10.0\nEND_GROUP";
        assert_eq!(parse_mtl_cloud_cover(text), Some(12.34));
        assert_eq!(parse_mtl_cloud_cover("SUN_AZIMUTH = 150.0"), None);
    }

    fn s2_config(max_cloud_cover: f64) -> RunConfig {
        use crate::types::{OutputFormat, ResamplingMethod, SpectralIndex, Statistic};
        RunConfig {
            platform: Platform::S2,
            raster_root: std::path::PathBuf::from("/data"),
            polygon_source: std::path::PathBuf::from("/polys.geojson"),
            tile_grid: std::path::PathBuf::from("/tiles.geojson"),
            output_dir: std::path::PathBuf::from("/out"),
            id_field: "id".to_string(),
            tile_field: "Name".to_string(),
            pixel_size: 10.0,
            resampling: ResamplingMethod::Nearest,
            indices: vec![SpectralIndex::Ndvi],
            statistics: vec![Statistic::Count],
            formats: vec![OutputFormat::Stats],
            inclusion: InclusionPolicy::AllTouched,
            max_cloud_cover,
            no_cloud_mask: false,
            external_mask: None,
            date_range: None,
            tile_allowlist: None,
            workers: 1,
            platform_spec: crate::core::config::PlatformSpec::for_platform(Platform::S2),
        }
    }

    fn product(root: &Path) -> RasterProductRef {
        RasterProductRef {
            platform: Platform::S2,
            root: root.to_path_buf(),
            tile_id: "33UUP".to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2020, 6, 1).unwrap(),
            orbit: Some(122),
        }
    }

    fn empty_partition() -> PolygonCollection {
        PolygonCollection {
            features: Vec::new(),
            epsg: 4326,
        }
    }

    fn write_mtd(root: &Path, cover: f64) {
        let xml = format!(
            "<Level-2A><Cloud_Coverage_Assessment>{}</Cloud_Coverage_Assessment></Level-2A>",
            cover
        );
        std::fs::write(root.join("MTD_MSIL2A.xml"), xml).unwrap();
    }

    #[test]
    fn structural_failure_short_circuits_the_cloud_gate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("T33UUP_B04_10m.jp2"), b"").unwrap();
        write_mtd(dir.path(), 99.0);

        // limit 0 would also fail the cloud gate, but structure fires first
        let err = validate_product(&product(dir.path()), &s2_config(0.0), &empty_partition())
            .unwrap_err();
        assert!(matches!(err, ValidationFailure::Structure { found: 1, expected: 10 }));
    }

    #[test]
    fn cloud_gate_fires_before_the_coverage_check() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            std::fs::write(dir.path().join(format!("T33UUP_B{:02}_10m.jp2", i)), b"").unwrap();
        }
        write_mtd(dir.path(), 51.2);

        // band files are unreadable stubs; reaching the coverage check would
        // report Unreadable, so CloudCover proves the short-circuit
        let err = validate_product(&product(dir.path()), &s2_config(50.0), &empty_partition())
            .unwrap_err();
        assert!(matches!(err, ValidationFailure::CloudCover { .. }));
    }

    #[test]
    fn aoi_mean_requires_finite_pixels() {
        let grid = PixelGrid::new([0.0, 1.0, 0.0, 2.0, 0.0, -1.0], 2, 2, 0);
        let footprint = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ]]);

        let data = array![[0.2, 0.4], [f64::NAN, 0.6]];
        let mean = aoi_mean(&data, &grid, &footprint).unwrap();
        assert!((mean - 0.4).abs() < 1e-12);

        let empty = array![[f64::NAN, f64::NAN], [f64::NAN, f64::NAN]];
        assert_eq!(aoi_mean(&empty, &grid, &footprint), None);
    }
}
