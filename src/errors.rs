//! Error taxonomy for the harvesting pipeline.
//!
//! Each stage owns a typed error:
//! - [`FetchError`]: the HTTP client could not be built, one network call
//!   failed (transport, status, body shape),
//!   or the retry policy gave up.
//! - [`SinkError`]: a schema alteration or insert was rejected by the store.
//! - [`TaxonomyError`]: a taxonomy node is missing its identity.
//!
//! [`HarvestError`] unifies them for the paginator and driver. An empty
//! listing is not an error; it is logged and yields an empty
//! result.

use thiserror::Error;

/// Failure of a single logical fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed (TLS backend, resolver).
    #[error("HTTP client could not be built: {message}")]
    Client { message: String },

    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body could not be decoded as JSON.
    #[error("response from {url} is not valid JSON: {message}")]
    Parse { url: String, message: String },

    /// The body was JSON but not of the expected shape.
    #[error("response from {url} has unexpected shape: expected {expected}")]
    Shape { url: String, expected: String },

    /// The retry policy was exhausted.
    #[error("{what} failed after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        what: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

/// Failure while persisting a batch of records.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid identifier {name:?} for table {table}")]
    InvalidIdentifier { table: String, name: String },

    /// Creating, dropping or altering the table failed.
    #[error("schema change on table {table} failed: {source}")]
    Schema {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Inserting the record at `row` (zero-based, within the batch) failed.
    #[error("insert of row {row} into table {table} failed: {source}")]
    Insert {
        table: String,
        row: usize,
        #[source]
        source: sqlx::Error,
    },

    /// Reading schema metadata or opening a transaction failed.
    #[error("query against table {table} failed: {source}")]
    Query {
        table: String,
        #[source]
        source: sqlx::Error,
    },
}

/// A taxonomy node that cannot be flattened safely.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaxonomyError {
    /// `path` is the slash-separated index path from the tree roots.
    #[error("taxonomy node at {path} is missing field {field:?}")]
    MalformedNode { path: String, field: String },

    /// A flat record at `index` does not attach to the preceding records.
    #[error("flat taxonomy record {index} (code {code}) has no parent at the previous level")]
    BrokenLinkage { index: usize, code: String },
}

/// Top-level error for paginator and driver operations.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),

    #[error("malformed {what}: {reason}")]
    MalformedRecord { what: String, reason: String },
}

impl FetchError {
    /// Whether this is the terminal "gave up retrying" error.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, FetchError::MaxRetriesExceeded { .. })
    }
}
