//! Export a harvested table as CSV.
//!
//! Writes a header row followed by every row in insertion order. NULL
//! values become empty fields. The default destination is
//! `<output.dir>/<table>.csv`.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db;
use crate::sink::SqliteSink;

/// Export `table`. If `output` is `None`, writes to `<output.dir>/<table>.csv`.
pub async fn run_export(config: &Config, table: &str, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    let sink = SqliteSink::new(pool);

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_path(config, table));
    let rows = export_table(&sink, table, &path).await?;

    eprintln!("Exported {} rows from {} to {}", rows, table, path.display());

    sink.pool().close().await;
    Ok(())
}

pub fn default_path(config: &Config, table: &str) -> PathBuf {
    config.output.dir.join(format!("{}.csv", table))
}

/// Write `table` to `path` as CSV, returning the number of data rows.
pub async fn export_table(sink: &SqliteSink, table: &str, path: &Path) -> Result<usize> {
    if !sink.table_exists(table).await? {
        bail!("table not found: {}", table);
    }
    let (columns, rows) = sink.read_rows(table).await?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;
    for row in &rows {
        writer.write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))?;
    }
    writer.flush()?;

    Ok(rows.len())
}
