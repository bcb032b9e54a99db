//! Tile Partitioner: split a polygon collection by the raster tiling grid,
//! one partition per tile, cached on disk under a deterministic key and
//! reused across all dates of a tile. Per-tile work is independent and
//! fanned out across the worker pool.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Intersects};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::io::vector::PolygonCollection;

/// Key-addressed on-disk cache of per-tile polygon partitions.
///
/// The key is derived from the polygon-source file stem and the tile id, so
/// repeated batch runs against the same polygon set skip the geometric work
/// entirely. Cache hits require a non-empty file; empty partitions are never
/// written.
pub struct PartitionCache {
    dir: PathBuf,
}

impl PartitionCache {
    pub fn new(dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(PartitionCache { dir })
    }

    pub fn key(source: &Path, tile_id: &str) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "polygons".to_string());
        format!("{}_tile_{}.geojson", stem, tile_id)
    }

    pub fn path_for(&self, source: &Path, tile_id: &str) -> PathBuf {
        self.dir.join(Self::key(source, tile_id))
    }

    /// Existing non-empty partition for this (source, tile) pair, if any.
    pub fn hit(&self, source: &Path, tile_id: &str) -> Option<PathBuf> {
        let path = self.path_for(source, tile_id);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => Some(path),
            _ => None,
        }
    }
}

/// Split `polygons` by the tiles of `tile_grid`, returning one partition path
/// per tile that intersects at least one polygon.
///
/// Both collections are brought to EPSG:4326 before the intersection test
/// (a no-op when already there). Tiles are prefiltered by bounding-box
/// overlap with the whole collection; final inclusion is always the true
/// geometric intersection. A polygon overlapping several tiles lands in each
/// of their partitions.
pub fn partition(
    polygons: &PolygonCollection,
    tile_grid: &PolygonCollection,
    source: &Path,
    cache: &PartitionCache,
) -> Result<BTreeMap<String, PathBuf>> {
    let polygons = polygons.reprojected(4326).map_err(Error::Vector)?;
    let tile_grid = tile_grid.reprojected(4326).map_err(Error::Vector)?;

    let Some(collection_bbox) = polygons.bounding_rect() else {
        return Ok(BTreeMap::new());
    };

    let candidates: Vec<_> = tile_grid
        .features
        .iter()
        .filter(|tile| {
            tile.geometry
                .bounding_rect()
                .map(|b| b.intersects(&collection_bbox))
                .unwrap_or(false)
        })
        .collect();
    debug!(
        "{} of {} tiles pass the bounding-box prefilter",
        candidates.len(),
        tile_grid.len()
    );

    let partitions: Vec<Option<(String, PathBuf)>> = candidates
        .par_iter()
        .map(|tile| -> Result<Option<(String, PathBuf)>> {
            let tile_id = tile.id.clone();
            if let Some(path) = cache.hit(source, &tile_id) {
                debug!("Partition cache hit for tile {}", tile_id);
                return Ok(Some((tile_id, path)));
            }

            let subset: Vec<_> = polygons
                .features
                .iter()
                .filter(|f| f.geometry.intersects(&tile.geometry))
                .cloned()
                .collect();
            if subset.is_empty() {
                return Ok(None);
            }

            let path = cache.path_for(source, &tile_id);
            let collection = PolygonCollection {
                features: subset,
                epsg: 4326,
            };
            collection.write_geojson(&path).map_err(Error::Vector)?;
            Ok(Some((tile_id, path)))
        })
        .collect::<Result<Vec<_>>>()?;

    let map: BTreeMap<String, PathBuf> = partitions.into_iter().flatten().collect();
    info!("Partitioned {} polygons into {} tile partitions", polygons.len(), map.len());
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::vector::PolygonFeature;
    use geo::{polygon, MultiPolygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ]])
    }

    fn feature(id: &str, geometry: MultiPolygon<f64>) -> PolygonFeature {
        let mut properties = geojson::JsonObject::new();
        properties.insert("id".to_string(), serde_json::Value::String(id.to_string()));
        PolygonFeature {
            id: id.to_string(),
            geometry,
            properties,
        }
    }

    fn tile_grid() -> PolygonCollection {
        PolygonCollection {
            features: vec![
                feature("T1", square(0.0, 0.0, 10.0, 10.0)),
                feature("T2", square(10.0, 0.0, 20.0, 10.0)),
                feature("T3", square(40.0, 40.0, 50.0, 50.0)),
            ],
            epsg: 4326,
        }
    }

    fn setup() -> (tempfile::TempDir, PartitionCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = PartitionCache::new(dir.path().join("partitions")).unwrap();
        (dir, cache)
    }

    #[test]
    fn polygons_land_in_every_intersecting_tile() {
        let polygons = PolygonCollection {
            features: vec![
                feature("a", square(1.0, 1.0, 3.0, 3.0)),
                feature("b", square(8.0, 4.0, 12.0, 6.0)), // straddles T1/T2
            ],
            epsg: 4326,
        };
        let (_dir, cache) = setup();
        let source = Path::new("parcels.geojson");
        let map = partition(&polygons, &tile_grid(), source, &cache).unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["T1", "T2"]);
        let t1 = PolygonCollection::read_geojson(&map["T1"], "id").unwrap();
        let t2 = PolygonCollection::read_geojson(&map["T2"], "id").unwrap();
        assert_eq!(t1.len(), 2);
        assert_eq!(t2.len(), 1);
    }

    #[test]
    fn empty_tiles_produce_no_partition() {
        let polygons = PolygonCollection {
            features: vec![feature("a", square(1.0, 1.0, 2.0, 2.0))],
            epsg: 4326,
        };
        let (_dir, cache) = setup();
        let map = partition(&polygons, &tile_grid(), Path::new("p.geojson"), &cache).unwrap();
        assert!(map.contains_key("T1"));
        assert!(!map.contains_key("T2"));
        assert!(!map.contains_key("T3"));
        assert!(!cache.path_for(Path::new("p.geojson"), "T2").exists());
    }

    #[test]
    fn bbox_overlap_alone_does_not_include_a_polygon() {
        // Triangle below x + y = 12: its bbox reaches into T2' (10..20) but
        // the geometry itself does not.
        let triangle = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 12.0, y: 0.0),
            (x: 0.0, y: 12.0),
        ]]);
        let grid = PolygonCollection {
            features: vec![feature("T2", square(10.0, 10.0, 20.0, 20.0))],
            epsg: 4326,
        };
        let polygons = PolygonCollection {
            features: vec![feature("tri", triangle)],
            epsg: 4326,
        };
        let (_dir, cache) = setup();
        let map = partition(&polygons, &grid, Path::new("p.geojson"), &cache).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn partitioning_is_idempotent_and_cache_backed() {
        let polygons = PolygonCollection {
            features: vec![
                feature("a", square(1.0, 1.0, 3.0, 3.0)),
                feature("b", square(11.0, 1.0, 13.0, 3.0)),
            ],
            epsg: 4326,
        };
        let (_dir, cache) = setup();
        let source = Path::new("parcels.geojson");

        let first = partition(&polygons, &tile_grid(), source, &cache).unwrap();
        let second = partition(&polygons, &tile_grid(), source, &cache).unwrap();
        assert_eq!(first, second);

        let ids = |path: &Path| -> Vec<String> {
            PolygonCollection::read_geojson(path, "id")
                .unwrap()
                .features
                .iter()
                .map(|f| f.id.clone())
                .collect()
        };
        assert_eq!(ids(&first["T1"]), ids(&second["T1"]));
        assert_eq!(ids(&first["T2"]), vec!["b"]);
    }

    #[test]
    fn cache_key_is_deterministic() {
        assert_eq!(
            PartitionCache::key(Path::new("/in/parcels.geojson"), "33UUP"),
            "parcels_tile_33UUP.geojson"
        );
    }
}
