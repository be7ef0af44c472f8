use std::fs;

use paging_core::{
    fetch_fn, FetchError, IncrementalCollection, Loader, PageDescriptor, PagingConfig, Query,
    RequestOutcome,
};
use paging_fhir::{decode_results_page, decode_searchset_str, display_label, record_id, resource_key};
use serde_json::Value;

const FIRST_PAGE_URL: &str = "https://fhir.example/AllergyIntolerance?patient=p1&_count=2";
const SECOND_PAGE_URL: &str = "https://fhir.example/AllergyIntolerance?patient=p1&_count=2&_page=2";

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("Không đọc được fixture")
}

#[tokio::test]
async fn allergy_searchset_pages_merge_in_place() {
    let fetcher = fetch_fn(|descriptor: PageDescriptor, _query: Query| async move {
        let fixture = match descriptor.as_cursor() {
            Some(FIRST_PAGE_URL) => "allergy_searchset_page1.json",
            Some(SECOND_PAGE_URL) => "allergy_searchset_page2.json",
            other => {
                return Err(FetchError::Status {
                    status: 404,
                    message: format!("unexpected page {other:?}"),
                })
            }
        };
        decode_searchset_str(&read_fixture(fixture))
    });

    let collection = IncrementalCollection::new(
        &PagingConfig::default(),
        PageDescriptor::Cursor(FIRST_PAGE_URL.into()),
        |resource: &Value| resource_key(resource).unwrap_or_default(),
    );
    let loader = Loader::new(collection, fetcher);

    loader.request_next_page().await.expect("Không tải được trang 1");
    let snapshot = loader.snapshot();
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.total_count, Some(3));
    assert!(snapshot.has_more);

    loader.request_next_page().await.expect("Không tải được trang 2");
    let snapshot = loader.snapshot();
    let keys: Vec<String> = snapshot.items.iter().filter_map(resource_key).collect();
    assert_eq!(
        keys,
        vec![
            "AllergyIntolerance/a1",
            "AllergyIntolerance/a2",
            "AllergyIntolerance/a3",
        ]
    );
    assert_eq!(
        snapshot.items[1]["meta"]["versionId"],
        Value::String("2".into())
    );
    assert!(!snapshot.has_more);

    let labels: Vec<String> = snapshot.items.iter().map(display_label).collect();
    assert_eq!(labels, vec!["Cashew nuts", "Penicillin", "Peanuts"]);

    let outcome = loader.request_next_page().await.expect("Không gọi được");
    assert_eq!(outcome, RequestOutcome::Exhausted);
}

#[test]
fn medication_results_page_is_terminal() {
    let body: Value =
        serde_json::from_str(&read_fixture("medication_results_page.json")).expect("JSON hỏng");

    let page = decode_results_page(&body, 0, 14).expect("Không đọc được trang");
    let ids: Vec<String> = page.items.iter().filter_map(record_id).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
    assert_eq!(page.total_count, 3);
    assert!(page.is_last());
}

#[tokio::test]
async fn records_without_id_never_collapse_into_one_row() {
    let fetcher = fetch_fn(|descriptor: PageDescriptor, _query: Query| async move {
        let body = serde_json::json!({
            "count": 4,
            "results": [{ "name": "x" }, { "id": "v1", "name": "y" }, { "name": "z" }, { "id": "v2" }]
        });
        decode_results_page(&body, descriptor.as_offset().unwrap_or_default(), 14)
    });

    let collection = IncrementalCollection::new(
        &PagingConfig::default(),
        PageDescriptor::first_offset(),
        |record: &Value| record_id(record).unwrap_or_default(),
    );
    let loader = Loader::new(collection, fetcher);

    loader.request_next_page().await.expect("Không tải được trang");
    let snapshot = loader.snapshot();
    let ids: Vec<String> = snapshot.items.iter().filter_map(record_id).collect();
    assert_eq!(ids, vec!["v1", "v2"]);
    assert_eq!(snapshot.items.len(), 2);
    assert!(!snapshot.has_more);
}
