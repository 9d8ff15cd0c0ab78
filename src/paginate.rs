//! Multi-call resource assembly.
//!
//! The [`Paginator`] turns sequences of [`Fetcher`] calls into whole
//! resources:
//!
//! | Operation | Calls |
//! |-----------|-------|
//! | [`fetch_collection`](Paginator::fetch_collection) | one listing |
//! | [`fetch_details`](Paginator::fetch_details) | metadata + every fragment page |
//! | [`fetch_context`](Paginator::fetch_context) | one relations listing |
//! | [`fetch_reference_taxonomies`](Paginator::fetch_reference_taxonomies) | one listing (facets only) |
//!
//! # Fragment pages
//!
//! Fragment pages are zero-indexed. Page 0 reports the page count `pages`;
//! pages `1..=pages-1` are then fetched in ascending order, so every page
//! contributes to `fullHtml`. A response without a page count is treated
//! as a single page. A page count above the paginator's cap is logged and
//! clamped to the cap.
//!
//! A detail fetch is one retry unit: a failure on any call discards what
//! was fetched so far and restarts from the metadata call.

use tracing::{debug, warn};

use crate::api::{self, CatalogueApi};
use crate::errors::{FetchError, HarvestError};
use crate::fetch::Fetcher;
use crate::models::{ContextRecord, DocumentDetail, DocumentSummary, TaxonomyNode};

/// Page cap used unless overridden with [`Paginator::with_max_pages`].
pub const DEFAULT_MAX_PAGES: u32 = 10_000;

#[derive(Clone)]
pub struct Paginator {
    api: CatalogueApi,
    fetcher: Fetcher,
    max_pages: u32,
}

impl Paginator {
    pub fn new(api: CatalogueApi, fetcher: Fetcher) -> Self {
        Self {
            api,
            fetcher,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Fetch at most `max_pages` fragment pages per document.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Documents associated with a taxonomy key, at most `limit` of them.
    ///
    /// An empty listing is logged as a warning and returned as an empty vec.
    pub async fn fetch_collection(
        &self,
        key: &str,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>, HarvestError> {
        let request = self.api.listing_request(key, limit);
        let mut listing = self
            .fetcher
            .fetch_listing(&request, api::LISTING_ITEMS)
            .await?;

        if listing.items.is_empty() {
            warn!(key, "no documents found for taxonomy key");
            return Ok(Vec::new());
        }

        if listing.items.len() > limit {
            debug!(key, returned = listing.items.len(), limit, "truncating listing");
            listing.items.truncate(limit);
        }

        listing
            .items
            .into_iter()
            .map(|item| self.api.parse_summary(item))
            .collect()
    }

    /// Metadata plus all fragment pages of one document.
    pub async fn fetch_details(&self, stale_url: &str) -> Result<DocumentDetail, HarvestError> {
        let what = format!("detail fetch of {}", stale_url);
        let detail = self
            .fetcher
            .policy()
            .run(&what, || self.attempt_details(stale_url))
            .await?;
        Ok(detail)
    }

    async fn attempt_details(&self, stale_url: &str) -> Result<DocumentDetail, FetchError> {
        let metadata = self
            .fetcher
            .attempt_object(&self.api.document_request(stale_url))
            .await?;

        let first = self
            .fetcher
            .attempt_object(&self.api.fragments_request(stale_url, 0))
            .await?;
        let pages = api::page_count(&first).unwrap_or_else(|| {
            debug!(stale_url, "fragment response has no page count, assuming one page");
            1
        });
        let pages = if pages > self.max_pages {
            warn!(
                stale_url,
                reported = pages,
                max_pages = self.max_pages,
                "page count exceeds cap, truncating document"
            );
            self.max_pages
        } else {
            pages
        };

        let mut citations = api::parse_citations(&first);
        for page in 1..pages {
            let body = self
                .fetcher
                .attempt_object(&self.api.fragments_request(stale_url, page))
                .await?;
            citations.extend(api::parse_citations(&body));
        }
        debug!(stale_url, pages, fragments = citations.len(), "assembled document");

        Ok(DocumentDetail::new(metadata, citations))
    }

    /// Related-document edges of one document.
    pub async fn fetch_context(&self, stale_url: &str) -> Result<Vec<ContextRecord>, HarvestError> {
        let listing = self
            .fetcher
            .fetch_listing(&self.api.relations_request(stale_url), api::RELATION_GROUPS)
            .await?;
        Ok(api::parse_relations(&listing.items))
    }

    /// Reference taxonomies (`categories`, `types`, `catalogue`) carried by
    /// the facets of the listing for `seed_key`.
    pub async fn fetch_reference_taxonomies(
        &self,
        seed_key: &str,
    ) -> Result<Vec<(String, Vec<TaxonomyNode>)>, HarvestError> {
        let request = self.api.listing_request(seed_key, 1);
        let listing = self
            .fetcher
            .fetch_listing(&request, api::LISTING_ITEMS)
            .await?;
        Ok(api::parse_reference_facets(&listing.envelope)?)
    }
}
