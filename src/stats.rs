//! Database overview.
//!
//! Lists every harvested table with its row and column counts. Used by
//! `harvest tables` to check what a run produced and how far the schemas
//! have grown.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::sink::SqliteSink;

/// Row and column counts of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub name: String,
    pub rows: i64,
    pub columns: usize,
}

pub async fn collect_stats(sink: &SqliteSink) -> Result<Vec<TableStats>> {
    let mut stats = Vec::new();
    for name in sink.list_tables().await? {
        let rows = sink.row_count(&name).await?;
        let columns = sink.table_columns(&name).await?.len();
        stats.push(TableStats {
            name,
            rows,
            columns,
        });
    }
    Ok(stats)
}

/// Run the tables command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let sink = SqliteSink::new(pool);
    let stats = collect_stats(&sink).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();

    if stats.is_empty() {
        println!("  No tables yet.");
    } else {
        println!("  {:<24} {:>10} {:>8}", "TABLE", "ROWS", "COLUMNS");
        println!("  {}", "-".repeat(44));
        for s in &stats {
            println!("  {:<24} {:>10} {:>8}", s.name, s.rows, s.columns);
        }
    }
    println!();

    sink.pool().close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
