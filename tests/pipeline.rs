mod common;

use catalogue_harvester::db;
use catalogue_harvester::harvest::{Harvester, RunOptions};
use catalogue_harvester::sink::SqliteSink;
use common::{api, route_document, seed_listing, test_config, Routes, BASE_URL, COLLECTION_LIMIT, SEED_KEY};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

struct Env {
    _tmp: TempDir,
    routes: Arc<Routes>,
    harvester: Harvester,
    reader: SqliteSink,
}

async fn setup() -> Env {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp.path().join("data/harvest.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    let routes = Arc::new(Routes::new());
    let harvester = Harvester::new(
        &config,
        routes.clone(),
        Box::new(SqliteSink::new(pool.clone())),
    );
    Env {
        _tmp: tmp,
        routes,
        harvester,
        reader: SqliteSink::new(pool),
    }
}

/// Rows of `table` as column → value maps.
async fn rows(sink: &SqliteSink, table: &str) -> Vec<HashMap<String, Option<String>>> {
    let (columns, rows) = sink.read_rows(table).await.unwrap();
    rows.into_iter()
        .map(|values| columns.iter().cloned().zip(values).collect())
        .collect()
}

fn text(row: &HashMap<String, Option<String>>, column: &str) -> Option<String> {
    row.get(column).cloned().flatten()
}

fn route_collection(routes: &Routes, code: &str, items: Value) {
    routes.on(
        &api().listing_request(code, COLLECTION_LIMIT),
        json!({ "seznam": items }),
    );
}

fn route_relations(routes: &Routes, stale_url: &str, groups: Value) {
    routes.on(
        &api().relations_request(stale_url),
        json!({ "souvislosti": groups }),
    );
}

#[tokio::test]
async fn references_replace_their_tables() {
    let env = setup().await;
    env.routes.on(&api().listing_request(SEED_KEY, 1), seed_listing());

    let first = env.harvester.harvest_references().await.unwrap();
    let second = env.harvester.harvest_references().await.unwrap();

    let expected = vec![
        ("categories".to_string(), 2),
        ("types".to_string(), 1),
        ("catalogue".to_string(), 3),
    ];
    assert_eq!(first.written, expected);
    assert_eq!(second.written, expected);
    assert_eq!(env.reader.row_count("catalogue").await.unwrap(), 3);

    let columns = env.reader.table_columns("catalogue").await.unwrap();
    assert_eq!(
        columns,
        vec!["name", "code", "level", "parentName", "parentCode", "timestamp"]
    );

    let catalogue = rows(&env.reader, "catalogue").await;
    assert_eq!(text(&catalogue[1], "name").as_deref(), Some("Taxes"));
    assert_eq!(text(&catalogue[1], "level").as_deref(), Some("1"));
    assert_eq!(text(&catalogue[1], "parentCode").as_deref(), Some("200"));
    assert_eq!(text(&catalogue[0], "parentCode"), None);
}

#[tokio::test]
async fn every_row_is_timestamped() {
    let env = setup().await;
    env.routes.on(&api().listing_request(SEED_KEY, 1), seed_listing());
    env.harvester.harvest_references().await.unwrap();

    for row in rows(&env.reader, "types").await {
        let stamp = text(&row, "timestamp").expect("timestamp column");
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok(), "{stamp}");
    }
}

#[tokio::test]
async fn collection_append_is_repeatable() {
    let env = setup().await;
    route_collection(
        &env.routes,
        "200",
        json!([
            { "staleUrl": "/sb/2020/1/2020-01-01", "nazev": "One" },
            { "staleUrl": "/sb/2020/2/2020-01-01", "nazev": "Two" }
        ]),
    );

    env.harvester.harvest_collection("200").await.unwrap();
    let columns_once = env.reader.table_columns("collection").await.unwrap();
    env.harvester.harvest_collection("200").await.unwrap();
    let columns_twice = env.reader.table_columns("collection").await.unwrap();

    assert_eq!(columns_once, columns_twice);
    assert_eq!(
        columns_twice,
        vec!["staleUrl", "nazev", "freshUrl", "catalogueCode", "timestamp"]
    );
    assert_eq!(env.reader.row_count("collection").await.unwrap(), 4);

    let collection = rows(&env.reader, "collection").await;
    assert_eq!(
        text(&collection[0], "freshUrl"),
        Some(format!("{BASE_URL}/sb/2020/1/2020-01-01"))
    );
    assert_eq!(text(&collection[3], "catalogueCode").as_deref(), Some("200"));
}

#[tokio::test]
async fn new_fields_add_columns_and_backfill_nulls() {
    let env = setup().await;
    route_collection(
        &env.routes,
        "200",
        json!([{ "staleUrl": "/sb/1/1", "nazev": "Old" }]),
    );
    route_collection(
        &env.routes,
        "300",
        json!([{
            "staleUrl": "/sb/2/2",
            "nazev": "New",
            "datum_ucinnosti": "2024-01-01",
            "typ": { "kod": "ZAKON", "verze": [1, 2] }
        }]),
    );

    env.harvester.harvest_collection("200").await.unwrap();
    env.harvester.harvest_collection("300").await.unwrap();

    let columns = env.reader.table_columns("collection").await.unwrap();
    assert!(columns.contains(&"datumUcinnosti".to_string()));
    assert!(columns.contains(&"typ".to_string()));
    let unique: std::collections::HashSet<_> =
        columns.iter().map(|c| c.to_ascii_lowercase()).collect();
    assert_eq!(unique.len(), columns.len());

    let collection = rows(&env.reader, "collection").await;
    assert_eq!(text(&collection[0], "nazev").as_deref(), Some("Old"));
    assert_eq!(text(&collection[0], "datumUcinnosti"), None);
    assert_eq!(text(&collection[0], "typ"), None);
    assert_eq!(text(&collection[0], "catalogueCode").as_deref(), Some("200"));

    let nested: Value = serde_json::from_str(&text(&collection[1], "typ").unwrap()).unwrap();
    assert_eq!(nested, json!({ "kod": "ZAKON", "verze": [1, 2] }));
}

#[tokio::test]
async fn document_writes_details_citations_and_context() {
    let env = setup().await;
    let doc = "/sb/2009/40/2024-01-01";
    route_document(
        &env.routes,
        doc,
        json!({ "nazev": "Criminal Code", "cislo_predpisu": 40 }),
        &[&["\u{201C}A\u{201D}"], &["B"]],
    );
    route_relations(
        &env.routes,
        doc,
        json!([{ "typ": "AMENDS", "dokumentySbirky": [
            { "nazev": "Amendment", "staleUrl": "/sb/2010/1/2010-01-01" }
        ] }]),
    );

    let counts = env.harvester.harvest_document(doc).await.unwrap();
    assert_eq!((counts.details, counts.citations, counts.context), (1, 2, 1));

    let details = rows(&env.reader, "details").await;
    assert_eq!(text(&details[0], "fullHtml").as_deref(), Some("A<br>B"));
    assert_eq!(text(&details[0], "cisloPredpisu").as_deref(), Some("40"));
    assert_eq!(text(&details[0], "parentStaleUrl").as_deref(), Some(doc));

    let citations = rows(&env.reader, "citations").await;
    assert_eq!(text(&citations[0], "htmlContent").as_deref(), Some("\u{201C}A\u{201D}"));
    assert_eq!(text(&citations[1], "fullCitation").as_deref(), Some("full § 1"));
    assert_eq!(text(&citations[1], "parentStaleUrl").as_deref(), Some(doc));

    let context = rows(&env.reader, "context").await;
    assert_eq!(text(&context[0], "type").as_deref(), Some("AMENDS"));
    assert_eq!(text(&context[0], "staleUrl").as_deref(), Some("/sb/2010/1/2010-01-01"));
}

#[tokio::test]
async fn document_without_relations_skips_context_table() {
    let env = setup().await;
    let doc = "/sb/2001/1/2001-01-01";
    route_document(&env.routes, doc, json!({}), &[&["x"]]);
    route_relations(&env.routes, doc, json!([]));

    let counts = env.harvester.harvest_document(doc).await.unwrap();

    assert_eq!(counts.context, 0);
    assert!(!env.reader.table_exists("context").await.unwrap());
}

#[tokio::test]
async fn run_walks_catalogue_codes_in_order() {
    let env = setup().await;
    env.routes.on(&api().listing_request(SEED_KEY, 1), seed_listing());
    route_collection(
        &env.routes,
        "200",
        json!([
            { "staleUrl": "/sb/1/1" },
            { "staleUrl": "/sb/1/2" }
        ]),
    );
    route_collection(&env.routes, "201", json!([]));
    route_document(&env.routes, "/sb/1/1", json!({}), &[&["one"]]);
    route_relations(&env.routes, "/sb/1/1", json!([]));

    let options = RunOptions {
        max_codes: Some(2),
        max_documents: Some(1),
        ..RunOptions::default()
    };
    let report = env.harvester.run(&options).await.unwrap();

    assert_eq!(report.codes, 2);
    assert_eq!(report.documents, 1);
    assert_eq!(report.rows["catalogue"], 3);
    assert_eq!(report.rows["collection"], 2);
    assert_eq!(report.rows["details"], 1);
    assert!(report.failures.is_empty());
    assert_eq!(env.routes.calls_to(&api().listing_request("300", COLLECTION_LIMIT)), 0);
    assert_eq!(env.routes.calls_to(&api().document_request("/sb/1/2")), 0);
}

#[tokio::test]
async fn keep_going_records_failed_documents() {
    let env = setup().await;
    env.routes.on(&api().listing_request(SEED_KEY, 1), seed_listing());
    route_collection(
        &env.routes,
        "300",
        json!([{ "staleUrl": "/sb/9/9" }, { "staleUrl": "/sb/1/1" }]),
    );
    route_document(&env.routes, "/sb/1/1", json!({}), &[&["ok"]]);
    route_relations(&env.routes, "/sb/1/1", json!([]));

    let mut options = RunOptions {
        codes: vec!["300".to_string()],
        keep_going: true,
        ..RunOptions::default()
    };
    let report = env.harvester.run(&options).await.unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "/sb/9/9");
    assert!(report.failures[0].1.contains("3 attempts"));

    options.keep_going = false;
    assert!(env.harvester.run(&options).await.is_err());
}

#[tokio::test]
async fn failed_context_fetch_writes_nothing() {
    let env = setup().await;
    let doc = "/sb/1/1";
    route_document(&env.routes, doc, json!({ "nazev": "Orphan" }), &[&["body"]]);

    let err = env.harvester.harvest_document(doc).await.unwrap_err();

    assert!(err.to_string().contains("3 attempts"), "{err}");
    assert!(!env.reader.table_exists("details").await.unwrap());
    assert!(!env.reader.table_exists("citations").await.unwrap());
    assert!(!env.reader.table_exists("context").await.unwrap());
}

#[tokio::test]
async fn retrying_a_failed_document_does_not_duplicate_rows() {
    let env = setup().await;
    let doc = "/sb/1/1";
    route_document(&env.routes, doc, json!({}), &[&["a"], &["b"]]);

    assert!(env.harvester.harvest_document(doc).await.is_err());

    route_relations(&env.routes, doc, json!([]));
    env.harvester.harvest_document(doc).await.unwrap();

    assert_eq!(env.reader.row_count("details").await.unwrap(), 1);
    assert_eq!(env.reader.row_count("citations").await.unwrap(), 2);
}
