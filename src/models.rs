//! Core data models used throughout the harvester.
//!
//! Remote responses are schema-less, so rows are modelled as ordered maps
//! from field name to a small scalar union ([`FieldValue`]). Typed structs
//! exist only where the pipeline relies on specific fields: taxonomy trees,
//! document summaries, fragment citations and relation edges.

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A JSON object as received from the API, before normalization.
pub type RawRecord = Map<String, Value>;

/// A normalized row: field name → scalar value, in first-seen order.
pub type Record = IndexMap<String, FieldValue>;

/// Scalar value stored in one column of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// A node of a nested taxonomy tree, built wholesale from one response and
/// consumed by [`crate::flatten::flatten`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyNode {
    pub label: String,
    pub code: String,
    pub children: Vec<TaxonomyNode>,
}

impl TaxonomyNode {
    pub fn leaf(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(
        label: impl Into<String>,
        code: impl Into<String>,
        children: Vec<TaxonomyNode>,
    ) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
            children,
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TaxonomyNode::size).sum::<usize>()
    }
}

/// One flattened taxonomy node with explicit parent linkage.
///
/// `parent_name`/`parent_code` are `None` only for roots (`level == 0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatTaxonomyRecord {
    pub name: String,
    pub code: String,
    pub level: u32,
    pub parent_name: Option<String>,
    pub parent_code: Option<String>,
}

impl FlatTaxonomyRecord {
    /// Raw row with word-separated field names (camel-cased by the normalizer).
    pub fn to_raw(&self) -> RawRecord {
        let mut raw = Map::new();
        raw.insert("name".into(), Value::String(self.name.clone()));
        raw.insert("code".into(), Value::String(self.code.clone()));
        raw.insert("level".into(), Value::from(self.level));
        raw.insert("parent_name".into(), opt_string(&self.parent_name));
        raw.insert("parent_code".into(), opt_string(&self.parent_code));
        raw
    }
}

/// One document from a collection listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    /// Stable document path, e.g. `/sb/2004/500/2024-01-01`.
    pub stale_url: String,
    /// `base_url + stale_url`.
    pub fresh_url: String,
    /// Every field the API returned for this item, `staleUrl` included.
    pub fields: RawRecord,
}

impl DocumentSummary {
    pub fn to_raw(&self) -> RawRecord {
        let mut raw = self.fields.clone();
        raw.insert("freshUrl".into(), Value::String(self.fresh_url.clone()));
        raw
    }
}

/// One fragment row of a document body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Citation {
    pub partial_citation: String,
    pub full_citation: String,
    pub html_content: String,
}

impl Citation {
    pub fn to_raw(&self) -> RawRecord {
        let mut raw = Map::new();
        raw.insert(
            "partialCitation".into(),
            Value::String(self.partial_citation.clone()),
        );
        raw.insert(
            "fullCitation".into(),
            Value::String(self.full_citation.clone()),
        );
        raw.insert(
            "htmlContent".into(),
            Value::String(self.html_content.clone()),
        );
        raw
    }
}

/// Separator placed between fragment bodies in `fullHtml`.
pub const FRAGMENT_SEPARATOR: &str = "<br>";

/// Typographic quotes removed from the assembled body.
pub const STRIPPED_QUOTES: [char; 5] = ['\u{201C}', '\u{201D}', '\u{201E}', '\u{275D}', '\u{275E}'];

/// Document metadata plus its fragment citations.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDetail {
    /// Metadata row; always carries `fullHtml`.
    pub content: RawRecord,
    /// One entry per fragment row, in page order.
    pub citations: Vec<Citation>,
}

impl DocumentDetail {
    /// Build the detail, deriving `fullHtml` from the citations.
    pub fn new(mut content: RawRecord, citations: Vec<Citation>) -> Self {
        let full_html = assemble_full_html(&citations);
        content.insert("fullHtml".into(), Value::String(full_html));
        Self { content, citations }
    }

    pub fn full_html(&self) -> &str {
        self.content
            .get("fullHtml")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Join fragment bodies in order and strip typographic quotes.
pub fn assemble_full_html(citations: &[Citation]) -> String {
    let joined = citations
        .iter()
        .map(|c| c.html_content.as_str())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR);
    joined.replace(&STRIPPED_QUOTES[..], "")
}

/// One related-document edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRecord {
    /// Relation kind as reported by the API.
    pub kind: Option<String>,
    pub name: Option<String>,
    pub stale_url: Option<String>,
}

impl ContextRecord {
    pub fn to_raw(&self) -> RawRecord {
        let mut raw = Map::new();
        raw.insert("type".into(), opt_string(&self.kind));
        raw.insert("name".into(), opt_string(&self.name));
        raw.insert("staleUrl".into(), opt_string(&self.stale_url));
        raw
    }
}

fn opt_string(v: &Option<String>) -> Value {
    v.clone().map(Value::String).unwrap_or(Value::Null)
}
