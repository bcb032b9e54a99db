//! Canonical polygon collection: GeoJSON-backed features with preserved
//! properties, geometric predicates via `geo`, and CRS reprojection delegated
//! to GDAL. Conversion of arbitrary vector formats into GeoJSON is an
//! external concern.
use std::fs;
use std::path::Path;

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use geo::{BoundingRect, ConvexHull, Coord, LineString, MultiPolygon, Polygon, Rect};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use thiserror::Error;
use tracing::warn;

/// Errors encountered reading, writing, or reprojecting polygon collections
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("GeoJSON error: {0}")]
    Json(#[from] geojson::Error),
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
    #[error("Polygon source is not a FeatureCollection: {0}")]
    NotACollection(String),
    #[error("Missing field `{field}` on feature {index}")]
    MissingField { field: String, index: usize },
}

/// One polygon feature: stable id, geometry, and original properties.
#[derive(Debug, Clone)]
pub struct PolygonFeature {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub properties: JsonObject,
}

/// A polygon collection tagged with its CRS (EPSG code).
#[derive(Debug, Clone)]
pub struct PolygonCollection {
    pub features: Vec<PolygonFeature>,
    pub epsg: u32,
}

fn property_string(properties: &JsonObject, field: &str) -> Option<String> {
    match properties.get(field)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_multipolygon(value: &geojson::Value) -> Option<MultiPolygon<f64>> {
    match geo::Geometry::<f64>::try_from(value.clone()).ok()? {
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        _ => None,
    }
}

impl PolygonCollection {
    /// Read a GeoJSON FeatureCollection. GeoJSON is EPSG:4326 by definition.
    /// Features with a missing id field or a degenerate/non-polygon geometry
    /// are dropped with a warning, not fatal.
    pub fn read_geojson(path: &Path, id_field: &str) -> Result<Self, VectorError> {
        let raw = fs::read_to_string(path)?;
        let geojson: GeoJson = raw.parse()?;
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            GeoJson::Feature(_) => {
                return Err(VectorError::NotACollection("Feature".to_string()));
            }
            GeoJson::Geometry(_) => {
                return Err(VectorError::NotACollection("Geometry".to_string()));
            }
        };

        let mut features = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.into_iter().enumerate() {
            let properties = feature.properties.unwrap_or_default();
            let Some(id) = property_string(&properties, id_field) else {
                warn!("Dropping feature {} without id field `{}`", index, id_field);
                continue;
            };
            let geometry = feature
                .geometry
                .as_ref()
                .and_then(|g| to_multipolygon(&g.value));
            match geometry {
                Some(geometry) if geometry.bounding_rect().is_some() => {
                    features.push(PolygonFeature {
                        id,
                        geometry,
                        properties,
                    });
                }
                _ => {
                    warn!("Dropping feature `{}` with degenerate or non-polygon geometry", id);
                }
            }
        }

        Ok(PolygonCollection { features, epsg: 4326 })
    }

    pub fn write_geojson(&self, path: &Path) -> Result<(), VectorError> {
        let features = self
            .features
            .iter()
            .map(|f| Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
                id: None,
                properties: Some(f.properties.clone()),
                foreign_members: None,
            })
            .collect();
        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };
        fs::write(path, GeoJson::from(collection).to_string())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bounding box of the whole collection.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let polygons: Vec<Polygon<f64>> = self
            .features
            .iter()
            .flat_map(|f| f.geometry.0.iter().cloned())
            .collect();
        MultiPolygon(polygons).bounding_rect()
    }

    /// Convex hull over every polygon in the collection, used as the
    /// area-of-interest footprint for the data-coverage check.
    pub fn convex_hull(&self) -> Option<Polygon<f64>> {
        if self.is_empty() {
            return None;
        }
        let polygons: Vec<Polygon<f64>> = self
            .features
            .iter()
            .flat_map(|f| f.geometry.0.iter().cloned())
            .collect();
        Some(MultiPolygon(polygons).convex_hull())
    }

    /// Reproject every feature to `to_epsg` via GDAL. A no-op when the
    /// collection is already in the target CRS.
    pub fn reprojected(&self, to_epsg: u32) -> Result<Self, VectorError> {
        if self.epsg == to_epsg {
            return Ok(self.clone());
        }
        let mut source = SpatialRef::from_epsg(self.epsg)?;
        let mut target = SpatialRef::from_epsg(to_epsg)?;
        source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        let transform = CoordTransform::new(&source, &target)?;

        let mut features = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            let polygons = feature
                .geometry
                .0
                .iter()
                .map(|p| transform_polygon(p, &transform))
                .collect::<Result<Vec<_>, VectorError>>()?;
            features.push(PolygonFeature {
                id: feature.id.clone(),
                geometry: MultiPolygon(polygons),
                properties: feature.properties.clone(),
            });
        }
        Ok(PolygonCollection {
            features,
            epsg: to_epsg,
        })
    }
}

fn transform_ring(ring: &LineString<f64>, transform: &CoordTransform) -> Result<LineString<f64>, VectorError> {
    let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
    let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
    let mut zs = vec![0.0; xs.len()];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
    Ok(LineString(
        xs.into_iter()
            .zip(ys)
            .map(|(x, y)| Coord { x, y })
            .collect(),
    ))
}

fn transform_polygon(polygon: &Polygon<f64>, transform: &CoordTransform) -> Result<Polygon<f64>, VectorError> {
    let exterior = transform_ring(polygon.exterior(), transform)?;
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| transform_ring(ring, transform))
        .collect::<Result<Vec<_>, VectorError>>()?;
    Ok(Polygon::new(exterior, interiors))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"parcel": "A1", "crop": "wheat"},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
            },
            {
                "type": "Feature",
                "properties": {"parcel": 42},
                "geometry": {"type": "Polygon", "coordinates": [[[2,2],[3,2],[3,3],[2,3],[2,2]]]}
            },
            {
                "type": "Feature",
                "properties": {"parcel": "noid-geom"},
                "geometry": {"type": "Point", "coordinates": [0, 0]}
            },
            {
                "type": "Feature",
                "properties": {"other": "missing-id"},
                "geometry": {"type": "Polygon", "coordinates": [[[4,4],[5,4],[5,5],[4,5],[4,4]]]}
            }
        ]
    }"#;

    fn sample_collection() -> PolygonCollection {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polys.geojson");
        std::fs::write(&path, SAMPLE).unwrap();
        PolygonCollection::read_geojson(&path, "parcel").unwrap()
    }

    #[test]
    fn reads_polygons_and_drops_invalid_features() {
        let collection = sample_collection();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.features[0].id, "A1");
        assert_eq!(collection.features[1].id, "42");
        assert_eq!(collection.epsg, 4326);
    }

    #[test]
    fn properties_are_preserved() {
        let collection = sample_collection();
        assert_eq!(
            collection.features[0].properties.get("crop"),
            Some(&JsonValue::String("wheat".to_string()))
        );
    }

    #[test]
    fn write_then_read_round_trips_ids() {
        let collection = sample_collection();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        collection.write_geojson(&path).unwrap();
        let back = PolygonCollection::read_geojson(&path, "parcel").unwrap();
        assert_eq!(back.len(), collection.len());
        assert_eq!(back.features[0].id, "A1");
    }

    #[test]
    fn bounding_rect_spans_all_features() {
        let collection = sample_collection();
        let rect = collection.bounding_rect().unwrap();
        assert_eq!(rect.min(), Coord { x: 0.0, y: 0.0 });
        assert_eq!(rect.max(), Coord { x: 3.0, y: 3.0 });
    }

    #[test]
    fn convex_hull_covers_both_squares() {
        use geo::Contains;
        let collection = sample_collection();
        let hull = collection.convex_hull().unwrap();
        assert!(hull.contains(&geo::Point::new(1.5, 1.5)));
    }

    #[test]
    fn reprojection_to_same_epsg_is_identity() {
        let collection = sample_collection();
        let same = collection.reprojected(4326).unwrap();
        assert_eq!(same.len(), collection.len());
        assert_eq!(
            same.features[0].geometry.bounding_rect(),
            collection.features[0].geometry.bounding_rect()
        );
    }
}
