//! Output writers, one per requested format. Stats, arrays, and raster
//! writers emit per-(index, tile, date) files and need no synchronization;
//! the table writer appends rows to shared per-index files behind a lock.
pub mod arrays;
pub mod raster;
pub mod stats_csv;
pub mod table;

use chrono::NaiveDate;

use crate::types::SpectralIndex;

/// Identity of one extraction: which index, over which tile, on which date.
/// Drives output file naming for every format.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub index: SpectralIndex,
    pub tile_id: String,
    pub date: NaiveDate,
    pub orbit: Option<u32>,
}

impl ExtractionContext {
    /// File-name stem shared by the per-extraction output formats.
    pub fn stem(&self) -> String {
        format!("{}_{}_{}", self.index, self.tile_id, self.date.format("%Y%m%d"))
    }
}
