//! Zonal Extractor: aggregate masked pixel values per polygon, or crop the
//! minimal raster window per polygon for full-resolution export.
use geo::{BoundingRect, Contains, Intersects, MultiPolygon, Point};
use ndarray::Array2;

use crate::core::grid::PixelGrid;
use crate::types::{InclusionPolicy, Statistic};

/// Decimal places kept in textual statistic output, for reproducibility.
pub const STAT_DECIMALS: i32 = 4;

/// A single computed statistic value. `Count` is always an integer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatValue {
    Count(u64),
    Value(f64),
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatValue::Count(n) => write!(f, "{}", n),
            StatValue::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Ordered statistic values for one polygon. `None` marks a statistic that is
/// undefined because the polygon had zero valid pixels.
#[derive(Debug, Clone)]
pub struct PolygonStats {
    pub id: String,
    pub values: Vec<Option<StatValue>>,
}

/// Cropped per-polygon sub-array with its own affine offset.
#[derive(Debug, Clone)]
pub struct PolygonArray {
    pub id: String,
    pub geotransform: [f64; 6],
    pub data: Array2<f64>,
}

fn round_stat(v: f64) -> f64 {
    let scale = 10f64.powi(STAT_DECIMALS);
    (v * scale).round() / scale
}

/// Pixel (row, col) positions under a polygon according to the inclusion policy.
pub fn pixels_under(
    grid: &PixelGrid,
    geometry: &MultiPolygon<f64>,
    policy: InclusionPolicy,
) -> Vec<(usize, usize)> {
    let Some(bbox) = geometry.bounding_rect() else {
        return Vec::new();
    };
    let (row0, col0, rows, cols) = grid.window_for(&bbox);
    let mut out = Vec::new();
    for row in row0..row0 + rows {
        for col in col0..col0 + cols {
            let inside = match policy {
                InclusionPolicy::CenterOnly => {
                    let (x, y) = grid.pixel_center(row, col);
                    geometry.contains(&Point::new(x, y))
                }
                InclusionPolicy::AllTouched => {
                    let cell = grid.pixel_rect(row, col).to_polygon();
                    geometry.intersects(&cell)
                }
            };
            if inside {
                out.push((row, col));
            }
        }
    }
    out
}

fn aggregate(stat: Statistic, valid: &[f64]) -> Option<StatValue> {
    if stat == Statistic::Count {
        return Some(StatValue::Count(valid.len() as u64));
    }
    if valid.is_empty() {
        return None;
    }
    let n = valid.len() as f64;
    let value = match stat {
        Statistic::Count => unreachable!(),
        Statistic::Mean => valid.iter().sum::<f64>() / n,
        Statistic::Median => {
            let mut sorted = valid.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
        Statistic::Std => {
            let mean = valid.iter().sum::<f64>() / n;
            let var = valid.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            var.sqrt()
        }
        Statistic::Min => valid.iter().cloned().fold(f64::INFINITY, f64::min),
        Statistic::Max => valid.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    };
    Some(StatValue::Value(round_stat(value)))
}

/// Statistics mode: requested aggregates per polygon over valid (finite,
/// unmasked) pixels. A polygon with zero valid pixels yields `None` for every
/// statistic except `count`, which is 0.
pub fn extract_stats(
    array: &Array2<f64>,
    grid: &PixelGrid,
    polygons: &[(String, MultiPolygon<f64>)],
    policy: InclusionPolicy,
    statistics: &[Statistic],
) -> Vec<PolygonStats> {
    polygons
        .iter()
        .map(|(id, geometry)| {
            let valid: Vec<f64> = pixels_under(grid, geometry, policy)
                .into_iter()
                .map(|(r, c)| array[[r, c]])
                .filter(|v| v.is_finite())
                .collect();
            PolygonStats {
                id: id.clone(),
                values: statistics.iter().map(|s| aggregate(*s, &valid)).collect(),
            }
        })
        .collect()
}

/// Array mode: crop the minimal bounding window covering each polygon and
/// return it with its own affine offset. Pixels outside the grid window are
/// simply absent; polygons entirely off-grid produce no entry.
pub fn extract_arrays(
    array: &Array2<f64>,
    grid: &PixelGrid,
    polygons: &[(String, MultiPolygon<f64>)],
) -> Vec<PolygonArray> {
    polygons
        .iter()
        .filter_map(|(id, geometry)| {
            let bbox = geometry.bounding_rect()?;
            let (row0, col0, rows, cols) = grid.window_for(&bbox);
            if rows == 0 || cols == 0 {
                return None;
            }
            let window = array
                .slice(ndarray::s![row0..row0 + rows, col0..col0 + cols])
                .to_owned();
            Some(PolygonArray {
                id: id.clone(),
                geotransform: grid.window_geotransform(row0, col0),
                data: window,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use ndarray::array;

    fn grid_2x2() -> PixelGrid {
        // 10 m pixels, 2x2, origin (0, 20)
        PixelGrid::new([0.0, 10.0, 0.0, 20.0, 0.0, -10.0], 2, 2, 32633)
    }

    fn covering_polygon() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: -1.0, y: -1.0),
            (x: 21.0, y: -1.0),
            (x: 21.0, y: 21.0),
            (x: -1.0, y: 21.0),
        ]])
    }

    #[test]
    fn masked_and_nan_pixels_are_excluded_from_aggregates() {
        // Index [[0.2, 0.4], [NaN, 0.6]] with the 0.4 pixel masked out:
        // two valid pixels remain, mean 0.4.
        let masked = array![[0.2, f64::NAN], [f64::NAN, 0.6]];
        let grid = grid_2x2();
        let polys = vec![("p1".to_string(), covering_polygon())];
        let stats = extract_stats(
            &masked,
            &grid,
            &polys,
            InclusionPolicy::AllTouched,
            &[Statistic::Count, Statistic::Mean],
        );
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].values[0], Some(StatValue::Count(2)));
        assert_eq!(stats[0].values[1], Some(StatValue::Value(0.4)));
    }

    #[test]
    fn all_touched_count_is_at_least_center_only_count() {
        let grid = grid_2x2();
        // Small polygon straddling the boundary of all four cells around (10, 10)
        let poly = MultiPolygon(vec![polygon![
            (x: 8.0, y: 8.0),
            (x: 12.0, y: 8.0),
            (x: 12.0, y: 12.0),
            (x: 8.0, y: 12.0),
        ]]);
        let touched = pixels_under(&grid, &poly, InclusionPolicy::AllTouched);
        let centered = pixels_under(&grid, &poly, InclusionPolicy::CenterOnly);
        assert!(touched.len() >= centered.len());
        assert_eq!(touched.len(), 4);
        assert_eq!(centered.len(), 0);
    }

    #[test]
    fn zero_valid_pixels_yield_empty_statistics_not_error() {
        let all_nan = array![[f64::NAN, f64::NAN], [f64::NAN, f64::NAN]];
        let grid = grid_2x2();
        let polys = vec![("empty".to_string(), covering_polygon())];
        let stats = extract_stats(
            &all_nan,
            &grid,
            &polys,
            InclusionPolicy::AllTouched,
            &[Statistic::Count, Statistic::Mean, Statistic::Std],
        );
        assert_eq!(stats[0].values[0], Some(StatValue::Count(0)));
        assert_eq!(stats[0].values[1], None);
        assert_eq!(stats[0].values[2], None);
    }

    #[test]
    fn statistics_are_rounded_to_fixed_precision() {
        let data = array![[0.123456, 0.2], [0.3, 0.4]];
        let grid = grid_2x2();
        let polys = vec![("p".to_string(), covering_polygon())];
        let stats = extract_stats(
            &data,
            &grid,
            &polys,
            InclusionPolicy::AllTouched,
            &[Statistic::Min],
        );
        assert_eq!(stats[0].values[0], Some(StatValue::Value(0.1235)));
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let data = array![[1.0, 2.0], [3.0, 10.0]];
        let grid = grid_2x2();
        let polys = vec![("p".to_string(), covering_polygon())];
        let stats = extract_stats(
            &data,
            &grid,
            &polys,
            InclusionPolicy::AllTouched,
            &[Statistic::Median],
        );
        assert_eq!(stats[0].values[0], Some(StatValue::Value(2.5)));
    }

    #[test]
    fn array_mode_crops_minimal_window_with_offset() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let grid = grid_2x2();
        // Polygon only over the lower-right cell
        let poly = MultiPolygon(vec![polygon![
            (x: 11.0, y: 1.0),
            (x: 19.0, y: 1.0),
            (x: 19.0, y: 9.0),
            (x: 11.0, y: 9.0),
        ]]);
        let arrays = extract_arrays(&data, &grid, &[("p".to_string(), poly)]);
        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].data.dim(), (1, 1));
        assert_eq!(arrays[0].data[[0, 0]], 4.0);
        assert_eq!(arrays[0].geotransform[0], 10.0);
        assert_eq!(arrays[0].geotransform[3], 10.0);
    }

    #[test]
    fn off_grid_polygon_produces_no_array_entry() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let grid = grid_2x2();
        let poly = MultiPolygon(vec![polygon![
            (x: 100.0, y: 100.0),
            (x: 110.0, y: 100.0),
            (x: 110.0, y: 110.0),
            (x: 100.0, y: 110.0),
        ]]);
        let arrays = extract_arrays(&data, &grid, &[("far".to_string(), poly)]);
        assert!(arrays.is_empty());
    }
}
