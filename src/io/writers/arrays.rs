//! Arrays format: per-polygon cropped sub-arrays with their affine offsets,
//! JSON-encoded as one document per (index, tile, date). No-data pixels are
//! encoded as `null` since JSON has no NaN.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::zonal::PolygonArray;
use crate::error::Result;
use crate::io::writers::ExtractionContext;

/// JSON shape of one polygon's cropped window: row-major values plus the
/// window's own geotransform.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArrayRecord {
    pub id: String,
    pub geotransform: [f64; 6],
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<Option<f64>>,
}

impl From<&PolygonArray> for ArrayRecord {
    fn from(array: &PolygonArray) -> Self {
        let (rows, cols) = array.data.dim();
        ArrayRecord {
            id: array.id.clone(),
            geotransform: array.geotransform,
            rows,
            cols,
            values: array
                .data
                .iter()
                .map(|v| if v.is_finite() { Some(*v) } else { None })
                .collect(),
        }
    }
}

pub fn arrays_path(dir: &Path, ctx: &ExtractionContext) -> PathBuf {
    dir.join(format!("{}_arrays.json", ctx.stem()))
}

pub fn write_arrays(
    dir: &Path,
    ctx: &ExtractionContext,
    arrays: &[PolygonArray],
) -> Result<PathBuf> {
    let path = arrays_path(dir, ctx);
    let records: Vec<ArrayRecord> = arrays.iter().map(ArrayRecord::from).collect();
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), &records)?;
    Ok(path)
}
