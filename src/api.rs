//! Adapter for the remote catalogue API.
//!
//! Knows the endpoint layout and the JSON field names of the e-Sbírka
//! cache API and converts responses into the crate's models. Nothing
//! outside this module refers to API-specific field names.
//!
//! | Logical call | Endpoint |
//! |--------------|----------|
//! | listing | `POST {prefix}/vecne-rejstriky/asociovane-dokumenty-sbirky` |
//! | resource | `GET {prefix}/dokumenty-sbirky/{id}` |
//! | fragment page | `GET {prefix}/dokumenty-sbirky/{id}/fragmenty?cisloStranky={n}` |
//! | relations | `GET {prefix}/dokumenty-sbirky/{id}/souvislosti` |

use serde_json::{json, Value};

use crate::config::ApiConfig;
use crate::errors::{HarvestError, TaxonomyError};
use crate::fetch::Request;
use crate::models::{Citation, ContextRecord, DocumentSummary, RawRecord, TaxonomyNode};

/// Array field of a listing envelope.
pub const LISTING_ITEMS: &str = "seznam";
/// Array field of a relations response.
pub const RELATION_GROUPS: &str = "souvislosti";

const LISTING_KEY: &str = "klicKonceptuCzechVoc";
const LISTING_LIMIT: &str = "pocet";
const FACETS: &str = "fazetovyFiltr";
const PAGE_COUNT: &str = "pocetStranek";
const STALE_URL: &str = "staleUrl";

const NODE_LABEL: &str = "text";
const NODE_CODE: &str = "kod";
const NODE_CHILDREN: &str = "potomci";

/// Reference facets harvested from the seed listing, with their table names.
pub const REFERENCE_FACETS: [(&str, &str); 3] = [
    ("categories", "sbirka"),
    ("types", "typPravnihoAktu"),
    ("catalogue", "vecnyRejstrik"),
];

/// Endpoint builder and response decoder.
#[derive(Debug, Clone)]
pub struct CatalogueApi {
    base_url: String,
    api_root: String,
}

impl CatalogueApi {
    pub fn new(config: &ApiConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let api_root = format!("{}{}", base_url, config.api_prefix.trim_end_matches('/'));
        Self { base_url, api_root }
    }

    /// Listing of documents associated with a taxonomy key.
    pub fn listing_request(&self, key: &str, limit: usize) -> Request {
        let mut payload = serde_json::Map::new();
        payload.insert(LISTING_KEY.into(), key_value(key));
        payload.insert(LISTING_LIMIT.into(), json!(limit));
        Request::post(
            format!("{}/vecne-rejstriky/asociovane-dokumenty-sbirky", self.api_root),
            Value::Object(payload),
        )
    }

    pub fn document_request(&self, stale_url: &str) -> Request {
        Request::get(self.document_url(stale_url))
    }

    pub fn fragments_request(&self, stale_url: &str, page: u32) -> Request {
        Request::get(format!(
            "{}/fragmenty?cisloStranky={}",
            self.document_url(stale_url),
            page
        ))
    }

    pub fn relations_request(&self, stale_url: &str) -> Request {
        Request::get(format!("{}/souvislosti", self.document_url(stale_url)))
    }

    fn document_url(&self, stale_url: &str) -> String {
        format!(
            "{}/dokumenty-sbirky/{}",
            self.api_root,
            encode_stale_url(stale_url)
        )
    }

    /// Convert one listing item into a summary. `staleUrl` is required.
    pub fn parse_summary(&self, item: Value) -> Result<DocumentSummary, HarvestError> {
        let fields = match item {
            Value::Object(map) => map,
            other => {
                return Err(HarvestError::MalformedRecord {
                    what: "listing item".to_string(),
                    reason: format!("expected an object, got {}", other),
                })
            }
        };
        let stale_url = fields
            .get(STALE_URL)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HarvestError::MalformedRecord {
                what: "listing item".to_string(),
                reason: format!("missing '{}'", STALE_URL),
            })?
            .to_string();

        Ok(DocumentSummary {
            fresh_url: format!("{}{}", self.base_url, stale_url),
            stale_url,
            fields,
        })
    }
}

/// Total page count of a fragment response; `None` when absent or invalid.
pub fn page_count(page: &RawRecord) -> Option<u32> {
    match page.get(PAGE_COUNT)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Citation rows of one fragment page, in response order.
pub fn parse_citations(page: &RawRecord) -> Vec<Citation> {
    let Some(Value::Array(rows)) = page.get(LISTING_ITEMS) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| Citation {
            partial_citation: text_field(row, "zkracenaCitace"),
            full_citation: text_field(row, "uplnaCitace"),
            html_content: text_field(row, "xhtml"),
        })
        .collect()
}

/// Relation edges: each document of each relation group, primary documents
/// before "other" documents.
pub fn parse_relations(groups: &[Value]) -> Vec<ContextRecord> {
    let mut records = Vec::new();
    for group in groups {
        let kind = group.get("typ").and_then(scalar_string);
        for list in ["dokumentySbirky", "ostatniDokumentySbirky"] {
            let Some(Value::Array(docs)) = group.get(list) else {
                continue;
            };
            for doc in docs {
                records.push(ContextRecord {
                    kind: kind.clone(),
                    name: doc.get("nazev").and_then(scalar_string),
                    stale_url: doc.get(STALE_URL).and_then(scalar_string),
                });
            }
        }
    }
    records
}

/// Reference taxonomies from a listing envelope, keyed by table name.
/// A missing facet yields an empty forest.
pub fn parse_reference_facets(
    envelope: &RawRecord,
) -> Result<Vec<(String, Vec<TaxonomyNode>)>, TaxonomyError> {
    let facets = envelope.get(FACETS);
    REFERENCE_FACETS
        .iter()
        .map(|(table, facet)| {
            let nodes = facets.and_then(|f| f.get(*facet));
            let forest = parse_forest(nodes, facet)?;
            Ok((table.to_string(), forest))
        })
        .collect()
}

/// Parse a JSON array of taxonomy nodes. `path` prefixes error locations.
pub fn parse_forest(nodes: Option<&Value>, path: &str) -> Result<Vec<TaxonomyNode>, TaxonomyError> {
    let Some(Value::Array(nodes)) = nodes else {
        return Ok(Vec::new());
    };
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| parse_node(node, &format!("{}/{}", path, i)))
        .collect()
}

fn parse_node(node: &Value, path: &str) -> Result<TaxonomyNode, TaxonomyError> {
    let missing = |field: &str| TaxonomyError::MalformedNode {
        path: path.to_string(),
        field: field.to_string(),
    };
    let label = node
        .get(NODE_LABEL)
        .and_then(scalar_string)
        .ok_or_else(|| missing(NODE_LABEL))?;
    let code = node
        .get(NODE_CODE)
        .and_then(scalar_string)
        .ok_or_else(|| missing(NODE_CODE))?;
    let children = parse_forest(node.get(NODE_CHILDREN), path)?;
    Ok(TaxonomyNode {
        label,
        code,
        children,
    })
}

/// The resource path segment: the stale URL with `/` percent-encoded.
pub fn encode_stale_url(stale_url: &str) -> String {
    stale_url.replace('/', "%2F")
}

fn key_value(key: &str) -> Value {
    key.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(key.to_string()))
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_field(row: &Value, field: &str) -> String {
    row.get(field).and_then(scalar_string).unwrap_or_default()
}
