//! Runs the workflow over real HTTP against an in-memory profile API.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use profload::{
    ProfileWorkflow,
    client::{Method, ReqwestClient},
    config::{LoadConfig, LoadModel},
    executor::StopSignal,
    report::WorkflowReport,
};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Store {
    profiles: Arc<Mutex<HashMap<String, Value>>>,
    next_id: Arc<AtomicU64>,
    /// Answer deletes with 200 and keep the profile
    broken_delete: bool,
}

impl Store {
    fn len(&self) -> usize {
        self.profiles.lock().unwrap().len()
    }
}

async fn create(State(store): State<Store>, Json(mut profile): Json<Value>) -> Response {
    if profile.pointer("/name/first").is_none() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let id = store.next_id.fetch_add(1, Ordering::Relaxed).to_string();
    profile["id"] = json!(id);
    profile["_creationTs"] = json!(1_700_000_000);
    store
        .profiles
        .lock()
        .unwrap()
        .insert(id, profile.clone());
    (StatusCode::CREATED, Json(profile)).into_response()
}

async fn page(State(store): State<Store>) -> Response {
    let profiles: Vec<Value> = store.profiles.lock().unwrap().values().cloned().collect();
    Json(json!({"offset": 0, "total": profiles.len(), "profiles": profiles})).into_response()
}

async fn read(State(store): State<Store>, Path(id): Path<String>) -> Response {
    match store.profiles.lock().unwrap().get(&id) {
        Some(profile) => Json(profile.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete(State(store): State<Store>, Path(id): Path<String>) -> Response {
    if store.broken_delete {
        return StatusCode::OK.into_response();
    }
    match store.profiles.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve(store: Store) -> String {
    let app = Router::new()
        .route("/profiles", get(page).post(create))
        .route("/profiles/:id", get(read).delete(delete))
        .with_state(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(host: &str) -> ReqwestClient {
    ReqwestClient::new(host, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn one_cycle_against_a_working_api() {
    let store = Store::default();
    let host = serve(store.clone()).await;

    let cycle = ProfileWorkflow::default().run_cycle(&client(&host)).await;

    assert!(cycle.is_clean(), "{cycle:?}");
    let steps: Vec<(Method, u16)> = cycle.requests.iter().map(|r| (r.method, r.status)).collect();
    assert_eq!(
        steps,
        vec![
            (Method::Post, 201),
            (Method::Get, 200),
            (Method::Delete, 204),
            (Method::Get, 404),
        ]
    );
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn page_check_against_a_working_api() {
    let host = serve(Store::default()).await;

    let cycle = ProfileWorkflow::default()
        .with_page_check(true)
        .run_cycle(&client(&host))
        .await;

    assert!(cycle.is_clean(), "{cycle:?}");
    assert_eq!(cycle.requests.len(), 5);
}

#[tokio::test]
async fn broken_delete_is_reported() {
    let store = Store {
        broken_delete: true,
        ..Default::default()
    };
    let host = serve(store.clone()).await;

    let cycle = ProfileWorkflow::default().run_cycle(&client(&host)).await;

    assert_eq!(
        cycle.failures(),
        vec!["Profile not deleted", "Found deleted profile"]
    );
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn rejected_create_aborts_the_cycle() {
    let host = serve(Store::default()).await;

    let cycle = ProfileWorkflow::new(json!({"name": {}}))
        .run_cycle(&client(&host))
        .await;

    assert_eq!(cycle.failures(), vec!["Profile not created"]);
    assert_eq!(cycle.requests[0].status, 400);
    assert!(cycle.error.is_some());
}

#[tokio::test]
async fn unreachable_host_fails_create_with_status_zero() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let cycle = ProfileWorkflow::default()
        .run_cycle(&client(&format!("http://{addr}")))
        .await;

    assert_eq!(cycle.requests[0].status, 0);
    let failures = cycle.failures();
    assert_eq!(failures.len(), 1);
    // The transport error is kept next to the step message
    assert!(failures[0].starts_with("Profile not created: http error"), "{failures:?}");
    assert!(cycle.error.is_some());
}

#[tokio::test]
async fn simulated_users_run_against_a_working_api() {
    let store = Store::default();
    let host = serve(store.clone()).await;
    let config = LoadConfig {
        host,
        timeout: Duration::from_secs(5),
        model: LoadModel::Users {
            users: 3,
            spawn_rate: 10.0,
            run_time: Duration::from_millis(500),
            wait_time: Duration::ZERO,
        },
        page_check: false,
        payload: json!({"name": {"first": "Test"}}),
        json_report: None,
    };

    let results = profload::runner::run(&config, StopSignal::new())
        .await
        .unwrap();

    assert!(results.iterations > 0);
    assert_eq!(results.aborted, 0);
    assert_eq!(results.total_failures(), 0);
    assert_eq!(results.total_requests(), results.iterations * 4);
    // Shutdown lets every started cycle clean up after itself
    assert_eq!(store.len(), 0);

    let report = WorkflowReport::from(results);
    assert_eq!(report.endpoints.len(), 3);
    assert!(report.endpoints.iter().all(|e| e.name == "/profiles"));
}

#[tokio::test]
async fn stopping_early_still_cleans_up_created_profiles() {
    let store = Store::default();
    let host = serve(store.clone()).await;
    let config = LoadConfig {
        host,
        timeout: Duration::from_secs(5),
        model: LoadModel::Users {
            users: 4,
            spawn_rate: 100.0,
            run_time: Duration::from_secs(600),
            wait_time: Duration::ZERO,
        },
        page_check: false,
        payload: json!({"name": {"first": "Test"}}),
        json_report: None,
    };
    let stop = StopSignal::new();
    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.trigger();
    });

    let results = tokio::time::timeout(
        Duration::from_secs(30),
        profload::runner::run(&config, stop),
    )
    .await
    .expect("run should end soon after the stop")
    .unwrap();

    assert!(results.iterations > 0);
    assert_eq!(results.total_failures(), 0);
    assert_eq!(results.total_requests(), results.iterations * 4);
    assert_eq!(store.len(), 0);
}
