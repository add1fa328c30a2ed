use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use vdisc_catalogue::{
    fetch_entities, find_job_record_id, try_fetch_entities, Catalogue, CatalogueConfig,
    CatalogueError, ServiceCatalogue,
};

const PER_PAGE: u64 = 3;

#[derive(Default)]
struct MockCatalogue {
    page_count: u64,
    fail_page: Option<u64>,
    requested_pages: Mutex<Vec<u64>>,
    updates: Mutex<Vec<(String, Value)>>,
    jobs: Vec<Value>,
}

async fn list_components(
    State(state): State<Arc<MockCatalogue>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let page: u64 = params
        .get("pagination[page]")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    state.requested_pages.lock().unwrap().push(page);
    if state.fail_page == Some(page) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let data: Vec<Value> = if state.page_count == 0 {
        vec![]
    } else {
        (0..PER_PAGE)
            .map(|i| {
                let n = (page - 1) * PER_PAGE + i;
                json!({"documentId": format!("doc-{n}"), "name": format!("component-{n}")})
            })
            .collect()
    };
    Ok(Json(json!({
        "data": data,
        "meta": {"pagination": {"page": page, "pageSize": PER_PAGE, "pageCount": state.page_count}}
    })))
}

async fn list_jobs(State(state): State<Arc<MockCatalogue>>) -> Json<Value> {
    Json(json!({
        "data": state.jobs,
        "meta": {"pagination": {"page": 1, "pageCount": 1}}
    }))
}

async fn update_record(
    State(state): State<Arc<MockCatalogue>>,
    Path((table, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    if id == "locked" {
        return StatusCode::FORBIDDEN;
    }
    state
        .updates
        .lock()
        .unwrap()
        .push((format!("{table}/{id}"), body));
    StatusCode::OK
}

async fn spawn(state: Arc<MockCatalogue>) -> ServiceCatalogue {
    let app = Router::new()
        .route("/", get(|| async { StatusCode::NO_CONTENT }))
        .route("/v1/components", get(list_components))
        .route("/v1/scheduled-jobs", get(list_jobs))
        .route("/v1/{table}/{id}", put(update_record))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    ServiceCatalogue::new(&CatalogueConfig {
        url: format!("http://{addr}"),
        key: "test-key".into(),
        ..Default::default()
    })
    .unwrap()
}

fn endpoint() -> String {
    CatalogueConfig::default().components_endpoint()
}

#[tokio::test]
async fn reads_exact_union_of_all_pages() {
    for page_count in [1u64, 2, 5] {
        let state = Arc::new(MockCatalogue {
            page_count,
            ..Default::default()
        });
        let catalogue = spawn(state.clone()).await;

        let entities = try_fetch_entities(&catalogue, &endpoint()).await.unwrap();
        let ids: BTreeSet<String> = entities.iter().map(|e| e.id.clone()).collect();
        let expected: BTreeSet<String> = (0..page_count * PER_PAGE)
            .map(|n| format!("doc-{n}"))
            .collect();

        assert_eq!(entities.len() as u64, page_count * PER_PAGE);
        assert_eq!(ids, expected);
        let pages = state.requested_pages.lock().unwrap().clone();
        assert_eq!(pages, (1..=page_count).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn zero_pages_yields_empty_set() {
    let catalogue = spawn(Arc::new(MockCatalogue::default())).await;
    let entities = try_fetch_entities(&catalogue, &endpoint()).await.unwrap();
    assert!(entities.is_empty());
}

#[tokio::test]
async fn failed_page_discards_everything_read_so_far() {
    let state = Arc::new(MockCatalogue {
        page_count: 4,
        fail_page: Some(3),
        ..Default::default()
    });
    let catalogue = spawn(state).await;

    let err = try_fetch_entities(&catalogue, &endpoint()).await.unwrap_err();
    assert!(matches!(err, CatalogueError::HttpStatus { status: 500, .. }));
    assert!(fetch_entities(&catalogue, &endpoint()).await.is_empty());
}

#[tokio::test]
async fn update_wraps_body_in_data() {
    let state = Arc::new(MockCatalogue::default());
    let catalogue = spawn(state.clone()).await;

    catalogue
        .update("components", "doc-1", &json!({"veracode_exempt": false}))
        .await
        .unwrap();
    let err = catalogue
        .update("components", "locked", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogueError::HttpStatus { status: 403, .. }));

    let updates = state.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "components/doc-1");
    assert_eq!(updates[0].1, json!({"data": {"veracode_exempt": false}}));
}

#[tokio::test]
async fn job_record_is_matched_by_exact_name() {
    let state = Arc::new(MockCatalogue {
        jobs: vec![
            json!({"id": 3, "attributes": {"name": "hmpps-veracode-discovery-dev"}}),
            json!({"id": 9, "attributes": {"name": "hmpps-veracode-discovery"}}),
        ],
        ..Default::default()
    });
    let catalogue = spawn(state).await;

    let id = find_job_record_id(&catalogue, "hmpps-veracode-discovery")
        .await
        .unwrap();
    assert_eq!(id.as_deref(), Some("9"));
    let missing = find_job_record_id(&catalogue, "other-job").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn connection_test_accepts_any_status_but_not_transport_failure() {
    let catalogue = spawn(Arc::new(MockCatalogue::default())).await;
    catalogue.test_connection().await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let dead = ServiceCatalogue::new(&CatalogueConfig {
        url: format!("http://{addr}"),
        ..Default::default()
    })
    .unwrap();
    assert!(matches!(
        dead.test_connection().await,
        Err(CatalogueError::Request(_))
    ));
}
