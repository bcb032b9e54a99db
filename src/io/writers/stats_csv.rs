//! Stats format: one delimited text file per (index, tile, date) with a
//! header of `id, orbit` plus the requested statistics in request order.
//! Undefined statistics (zero valid pixels) are written as empty fields.
use std::path::{Path, PathBuf};

use crate::core::zonal::PolygonStats;
use crate::error::Result;
use crate::io::writers::ExtractionContext;
use crate::types::Statistic;

pub fn stats_path(dir: &Path, ctx: &ExtractionContext) -> PathBuf {
    dir.join(format!("{}.csv", ctx.stem()))
}

pub fn write_stats(
    dir: &Path,
    ctx: &ExtractionContext,
    statistics: &[Statistic],
    rows: &[PolygonStats],
) -> Result<PathBuf> {
    let path = stats_path(dir, ctx);
    let mut writer = csv::Writer::from_path(&path)?;

    let mut header = vec!["id".to_string(), "orbit".to_string()];
    header.extend(statistics.iter().map(|s| s.to_string()));
    writer.write_record(&header)?;

    let orbit = ctx.orbit.map(|o| o.to_string()).unwrap_or_default();
    for row in rows {
        let mut record = vec![row.id.clone(), orbit.clone()];
        record.extend(
            row.values
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(path)
}
