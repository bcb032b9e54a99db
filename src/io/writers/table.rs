//! Table format: one relational CSV per index, rows appended across every
//! extraction of the batch, plus a lookup file mapping each tile to the
//! polygon ids it contributed, appended once per newly seen tile.
//!
//! One `TableWriter` lives for the whole batch. Extraction tasks run in
//! parallel, so every append goes through a single lock; per-row work is
//! trivial compared to the extraction itself.
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::zonal::PolygonStats;
use crate::error::Result;
use crate::io::writers::ExtractionContext;
use crate::types::{SpectralIndex, Statistic};

pub const TILES_LOOKUP: &str = "tiles_lookup.csv";

struct TableState {
    tables: HashMap<SpectralIndex, csv::Writer<File>>,
    lookup: Option<csv::Writer<File>>,
    seen_tiles: HashSet<String>,
}

pub struct TableWriter {
    dir: PathBuf,
    statistics: Vec<Statistic>,
    state: Mutex<TableState>,
}

impl TableWriter {
    pub fn new(dir: &Path, statistics: &[Statistic]) -> Self {
        TableWriter {
            dir: dir.to_path_buf(),
            statistics: statistics.to_vec(),
            state: Mutex::new(TableState {
                tables: HashMap::new(),
                lookup: None,
                seen_tiles: HashSet::new(),
            }),
        }
    }

    pub fn table_path(&self, index: SpectralIndex) -> PathBuf {
        self.dir.join(format!("{}_table.csv", index))
    }

    /// Append one extraction's rows to the index table and register the tile
    /// in the lookup if not yet seen.
    pub fn append(&self, ctx: &ExtractionContext, rows: &[PolygonStats]) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if !state.tables.contains_key(&ctx.index) {
            let mut writer = csv::Writer::from_path(self.table_path(ctx.index))?;
            let mut header = vec![
                "id".to_string(),
                "date".to_string(),
                "tile".to_string(),
                "orbit".to_string(),
            ];
            header.extend(self.statistics.iter().map(|s| s.to_string()));
            writer.write_record(&header)?;
            state.tables.insert(ctx.index, writer);
        }

        let date = ctx.date.format("%Y-%m-%d").to_string();
        let orbit = ctx.orbit.map(|o| o.to_string()).unwrap_or_default();
        let table = state.tables.get_mut(&ctx.index).unwrap();
        for row in rows {
            let mut record = vec![row.id.clone(), date.clone(), ctx.tile_id.clone(), orbit.clone()];
            record.extend(
                row.values
                    .iter()
                    .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
            );
            table.write_record(&record)?;
        }
        table.flush()?;

        if state.seen_tiles.insert(ctx.tile_id.clone()) {
            if state.lookup.is_none() {
                let mut writer = csv::Writer::from_path(self.dir.join(TILES_LOOKUP))?;
                writer.write_record(["tile", "polygon_ids"])?;
                state.lookup = Some(writer);
            }
            let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
            let lookup = state.lookup.as_mut().unwrap();
            lookup.write_record([ctx.tile_id.as_str(), &ids.join(";")])?;
            lookup.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::zonal::StatValue;
    use chrono::NaiveDate;

    fn ctx(index: SpectralIndex, date: (i32, u32, u32)) -> ExtractionContext {
        ExtractionContext {
            index,
            tile_id: "33UUP".to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            orbit: Some(122),
        }
    }

    fn row(id: &str, count: u64, mean: f64) -> PolygonStats {
        PolygonStats {
            id: id.to_string(),
            values: vec![
                Some(StatValue::Count(count)),
                Some(StatValue::Value(mean)),
            ],
        }
    }

    fn read_all(path: &Path) -> Vec<Vec<String>> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[test]
    fn rows_accumulate_per_index_and_tiles_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        let stats = [Statistic::Count, Statistic::Mean];
        let writer = TableWriter::new(dir.path(), &stats);

        writer
            .append(
                &ctx(SpectralIndex::Ndvi, (2020, 6, 1)),
                &[row("A1", 10, 0.5), row("B7", 4, 0.2)],
            )
            .unwrap();
        writer
            .append(&ctx(SpectralIndex::Ndvi, (2020, 6, 11)), &[row("A1", 9, 0.6)])
            .unwrap();
        writer
            .append(&ctx(SpectralIndex::Evi, (2020, 6, 1)), &[row("A1", 10, 0.3)])
            .unwrap();

        let ndvi = read_all(&writer.table_path(SpectralIndex::Ndvi));
        assert_eq!(ndvi.len(), 3);
        assert_eq!(ndvi[0], vec!["A1", "2020-06-01", "33UUP", "122", "10", "0.5"]);
        assert_eq!(ndvi[2][1], "2020-06-11");

        let evi = read_all(&writer.table_path(SpectralIndex::Evi));
        assert_eq!(evi.len(), 1);

        // three appends, one distinct tile: repeat dates must not re-register
        let lookup = read_all(&dir.path().join(TILES_LOOKUP));
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup[0], vec!["33UUP", "A1;B7"]);
    }

    #[test]
    fn undefined_statistics_write_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let stats = [Statistic::Count, Statistic::Mean];
        let writer = TableWriter::new(dir.path(), &stats);
        let rows = vec![PolygonStats {
            id: "empty".to_string(),
            values: vec![Some(StatValue::Count(0)), None],
        }];
        writer.append(&ctx(SpectralIndex::Ndvi, (2020, 6, 1)), &rows).unwrap();

        let table = read_all(&writer.table_path(SpectralIndex::Ndvi));
        assert_eq!(table[0][4], "0");
        assert_eq!(table[0][5], "");
    }
}
