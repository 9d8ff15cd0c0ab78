#![allow(dead_code)]

use async_trait::async_trait;
use catalogue_harvester::api::CatalogueApi;
use catalogue_harvester::config::Config;
use catalogue_harvester::errors::FetchError;
use catalogue_harvester::fetch::{Method, Request, Transport};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

pub const BASE_URL: &str = "http://catalogue.test";
pub const SEED_KEY: &str = "100";
pub const COLLECTION_LIMIT: usize = 50;

/// Test configuration: fake origin, no retry delay, two retries.
pub fn test_config(db_path: &Path) -> Config {
    let mut config = Config::with_db_path(db_path);
    config.api.base_url = BASE_URL.to_string();
    config.api.seed_key = SEED_KEY.to_string();
    config.api.collection_limit = COLLECTION_LIMIT;
    config.retry.max_retries = 2;
    config.retry.delay_secs = 0;
    config
}

/// Endpoint builder matching [`test_config`].
pub fn api() -> CatalogueApi {
    CatalogueApi::new(&test_config(Path::new("unused.sqlite")).api)
}

fn route_key(request: &Request) -> String {
    match &request.method {
        Method::Get => format!("GET {}", request.url),
        Method::Post(body) => format!("POST {} {}", request.url, body),
    }
}

/// Transport that answers from a route table.
///
/// Each route has a standing response plus an optional queue of one-shot
/// responses served first. Unknown routes answer HTTP 404.
#[derive(Default)]
pub struct Routes {
    standing: Mutex<HashMap<String, Value>>,
    queued: Mutex<HashMap<String, VecDeque<Result<Value, FetchError>>>>,
    calls: Mutex<Vec<String>>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, request: &Request, body: Value) -> &Self {
        self.standing
            .lock()
            .unwrap()
            .insert(route_key(request), body);
        self
    }

    /// Fail the next call to `request` once with HTTP 503.
    pub fn fail_once(&self, request: &Request) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(route_key(request))
            .or_default()
            .push_back(Err(FetchError::Status {
                url: request.url.clone(),
                status: 503,
            }));
        self
    }

    pub fn calls_to(&self, request: &Request) -> usize {
        let key = route_key(request);
        self.calls.lock().unwrap().iter().filter(|c| **c == key).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for Routes {
    async fn send(&self, request: &Request) -> Result<Value, FetchError> {
        let key = route_key(request);
        self.calls.lock().unwrap().push(key.clone());

        if let Some(next) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }

        self.standing
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: request.url.clone(),
                status: 404,
            })
    }
}

/// Fragment page body with the given `xhtml` rows.
pub fn fragment_page(pages: Option<u32>, bodies: &[&str]) -> Value {
    let rows: Vec<Value> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            json!({
                "zkracenaCitace": format!("§ {}", i + 1),
                "uplnaCitace": format!("full § {}", i + 1),
                "xhtml": body,
            })
        })
        .collect();
    let mut page = json!({ "seznam": rows });
    if let Some(pages) = pages {
        page["pocetStranek"] = json!(pages);
    }
    page
}

/// Register metadata and fragment pages of one document.
pub fn route_document(routes: &Routes, stale_url: &str, metadata: Value, pages: &[&[&str]]) {
    let api = api();
    routes.on(&api.document_request(stale_url), metadata);
    for (i, bodies) in pages.iter().enumerate() {
        let count = if i == 0 { Some(pages.len() as u32) } else { None };
        routes.on(
            &api.fragments_request(stale_url, i as u32),
            fragment_page(count, bodies),
        );
    }
}

/// Listing response whose facets carry the three reference taxonomies.
pub fn seed_listing() -> Value {
    json!({
        "seznam": [],
        "fazetovyFiltr": {
            "sbirka": [
                { "text": "Collection of Laws", "kod": "SB" },
                { "text": "Collection of Treaties", "kod": "SMS" }
            ],
            "typPravnihoAktu": [
                { "text": "Act", "kod": "ZAKON" }
            ],
            "vecnyRejstrik": [
                {
                    "text": "Finance",
                    "kod": "200",
                    "potomci": [
                        { "text": "Taxes", "kod": "201" }
                    ]
                },
                { "text": "Health", "kod": "300" }
            ]
        }
    })
}
