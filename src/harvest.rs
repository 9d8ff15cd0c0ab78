//! Harvest orchestration.
//!
//! Coordinates the full flow: reference taxonomies → collections per
//! catalogue code → details, citations and context per document. Every
//! batch is stamped, normalized and written through a [`RecordSink`].
//!
//! | Table | Mode | Link field |
//! |-------|------|------------|
//! | `categories`, `types`, `catalogue` | replace | |
//! | `collection` | append | `catalogueCode` |
//! | `details`, `citations`, `context` | append | `parentStaleUrl` |
//!
//! All work is sequential: one request in flight, one writer.

use anyhow::Result;
use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::CatalogueApi;
use crate::config::Config;
use crate::db;
use crate::errors::HarvestError;
use crate::fetch::{Fetcher, HttpTransport, Transport};
use crate::flatten::flatten;
use crate::models::{
    Citation, ContextRecord, DocumentSummary, FlatTaxonomyRecord, RawRecord,
};
use crate::normalize::{normalize, stamp};
use crate::paginate::Paginator;
use crate::sink::{RecordSink, SqliteSink, WriteMode};

pub const COLLECTION_TABLE: &str = "collection";
pub const DETAILS_TABLE: &str = "details";
pub const CITATIONS_TABLE: &str = "citations";
pub const CONTEXT_TABLE: &str = "context";

/// Flattened reference taxonomies and the rows written per table.
#[derive(Debug, Clone)]
pub struct References {
    pub written: Vec<(String, u64)>,
    pub catalogue: Vec<FlatTaxonomyRecord>,
}

/// Rows written for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentCounts {
    pub details: u64,
    pub citations: u64,
    pub context: u64,
}

/// Options for a full run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict to these catalogue codes; empty means every catalogue code.
    pub codes: Vec<String>,
    pub max_codes: Option<usize>,
    /// Documents harvested per code.
    pub max_documents: Option<usize>,
    /// Log and skip failing documents instead of aborting the run.
    pub keep_going: bool,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    pub codes: usize,
    pub documents: usize,
    /// Rows written per table, in first-write order.
    pub rows: IndexMap<String, u64>,
    /// `(staleUrl, error)` of documents skipped under `keep_going`.
    pub failures: Vec<(String, String)>,
}

impl HarvestReport {
    fn add(&mut self, table: &str, rows: u64) {
        *self.rows.entry(table.to_string()).or_insert(0) += rows;
    }
}

pub struct Harvester {
    paginator: Paginator,
    sink: Box<dyn RecordSink>,
    seed_key: String,
    collection_limit: usize,
}

impl Harvester {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, sink: Box<dyn RecordSink>) -> Self {
        let fetcher = Fetcher::new(transport, config.retry.policy());
        Self {
            paginator: Paginator::new(CatalogueApi::new(&config.api), fetcher)
                .with_max_pages(config.api.max_pages),
            sink,
            seed_key: config.api.seed_key.clone(),
            collection_limit: config.api.collection_limit,
        }
    }

    /// HTTP transport and the configured SQLite database.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_secs(config.api.timeout_secs))?;
        let pool = db::connect(config).await?;
        Ok(Self::new(
            config,
            Arc::new(transport),
            Box::new(SqliteSink::new(pool)),
        ))
    }

    /// Fetch, flatten and replace the reference taxonomy tables.
    pub async fn harvest_references(&self) -> Result<References, HarvestError> {
        let forests = self
            .paginator
            .fetch_reference_taxonomies(&self.seed_key)
            .await?;

        let mut written = Vec::new();
        let mut catalogue = Vec::new();
        for (table, forest) in forests {
            let records = flatten(forest);
            let raw = records.iter().map(FlatTaxonomyRecord::to_raw).collect();
            let rows = self.persist(&table, raw, WriteMode::Replace).await?;
            info!(table = table.as_str(), rows, "stored reference taxonomy");
            if table == "catalogue" {
                catalogue = records;
            }
            written.push((table, rows));
        }

        Ok(References { written, catalogue })
    }

    /// Fetch one collection and append it to `collection`.
    pub async fn harvest_collection(&self, code: &str) -> Result<Vec<DocumentSummary>, HarvestError> {
        let summaries = self
            .paginator
            .fetch_collection(code, self.collection_limit)
            .await?;

        let mut raw: Vec<RawRecord> = summaries.iter().map(DocumentSummary::to_raw).collect();
        stamp(&mut raw, "catalogueCode", &Value::String(code.to_string()));
        self.persist(COLLECTION_TABLE, raw, WriteMode::Append).await?;
        info!(code, documents = summaries.len(), "stored collection");
        Ok(summaries)
    }

    /// Fetch details, citations and context of one document and append them.
    ///
    /// Every fetch completes before the first write, so a document whose
    /// fetches fail leaves no rows behind.
    pub async fn harvest_document(&self, stale_url: &str) -> Result<DocumentCounts, HarvestError> {
        let detail = self.paginator.fetch_details(stale_url).await?;
        let context_records = self.paginator.fetch_context(stale_url).await?;

        let link = Value::String(stale_url.to_string());
        let mut content = vec![detail.content];
        let mut citations_raw: Vec<RawRecord> =
            detail.citations.iter().map(Citation::to_raw).collect();
        let mut context_raw: Vec<RawRecord> =
            context_records.iter().map(ContextRecord::to_raw).collect();
        stamp(&mut content, "parentStaleUrl", &link);
        stamp(&mut citations_raw, "parentStaleUrl", &link);
        stamp(&mut context_raw, "parentStaleUrl", &link);

        let details = self.persist(DETAILS_TABLE, content, WriteMode::Append).await?;
        let citations = self
            .persist(CITATIONS_TABLE, citations_raw, WriteMode::Append)
            .await?;
        let context = self
            .persist(CONTEXT_TABLE, context_raw, WriteMode::Append)
            .await?;

        Ok(DocumentCounts {
            details,
            citations,
            context,
        })
    }

    /// References, then every selected catalogue code and its documents.
    pub async fn run(&self, options: &RunOptions) -> Result<HarvestReport, HarvestError> {
        let mut report = HarvestReport::default();

        let references = self.harvest_references().await?;
        for (table, rows) in &references.written {
            report.add(table, *rows);
        }

        let mut codes: Vec<String> = if options.codes.is_empty() {
            references
                .catalogue
                .iter()
                .map(|r| r.code.clone())
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect()
        } else {
            options.codes.clone()
        };
        if let Some(max) = options.max_codes {
            codes.truncate(max);
        }

        for code in &codes {
            info!(code = code.as_str(), "harvesting catalogue code");
            let summaries = self.harvest_collection(code).await?;
            report.codes += 1;
            report.add(COLLECTION_TABLE, summaries.len() as u64);

            let take = options.max_documents.unwrap_or(summaries.len());
            for summary in summaries.iter().take(take) {
                match self.harvest_document(&summary.stale_url).await {
                    Ok(counts) => {
                        report.documents += 1;
                        report.add(DETAILS_TABLE, counts.details);
                        report.add(CITATIONS_TABLE, counts.citations);
                        report.add(CONTEXT_TABLE, counts.context);
                    }
                    Err(e) if options.keep_going => {
                        warn!(stale_url = summary.stale_url.as_str(), error = %e, "skipping document");
                        report.failures.push((summary.stale_url.clone(), e.to_string()));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(report)
    }

    /// Stamp `timestamp`, normalize and write. Empty batches are skipped.
    async fn persist(
        &self,
        table: &str,
        mut raw: Vec<RawRecord>,
        mode: WriteMode,
    ) -> Result<u64, HarvestError> {
        if raw.is_empty() {
            return Ok(0);
        }
        stamp(&mut raw, "timestamp", &Value::String(Utc::now().to_rfc3339()));
        let records = normalize(raw);
        Ok(self.sink.write(table, &records, mode).await?)
    }
}

pub async fn run_refs(config: &Config) -> Result<()> {
    let harvester = Harvester::from_config(config).await?;
    let references = harvester.harvest_references().await?;

    println!("refs");
    for (table, rows) in &references.written {
        println!("  {}: {} rows", table, rows);
    }
    println!("ok");
    Ok(())
}

pub async fn run_collection(config: &Config, code: &str) -> Result<()> {
    let harvester = Harvester::from_config(config).await?;
    let summaries = harvester.harvest_collection(code).await?;

    println!("collection {}", code);
    println!("  documents: {}", summaries.len());
    println!("ok");
    Ok(())
}

pub async fn run_document(config: &Config, stale_url: &str) -> Result<()> {
    let harvester = Harvester::from_config(config).await?;
    let counts = harvester.harvest_document(stale_url).await?;

    println!("document {}", stale_url);
    println!("  details: {}", counts.details);
    println!("  citations: {}", counts.citations);
    println!("  context: {}", counts.context);
    println!("ok");
    Ok(())
}

pub async fn run_harvest(config: &Config, options: &RunOptions) -> Result<()> {
    let harvester = Harvester::from_config(config).await?;
    let report = harvester.run(options).await?;

    println!("harvest");
    println!("  catalogue codes: {}", report.codes);
    println!("  documents: {}", report.documents);
    for (table, rows) in &report.rows {
        println!("  {}: {} rows", table, rows);
    }
    if !report.failures.is_empty() {
        println!("  failed documents: {}", report.failures.len());
        for (stale_url, error) in &report.failures {
            println!("    {}: {}", stale_url, error);
        }
    }
    println!("ok");
    Ok(())
}
