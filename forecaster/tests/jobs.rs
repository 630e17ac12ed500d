use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::DateTime;
use forecaster::errors::Error;
use forecaster::forecast::ForecastEngine;
use forecaster::insight::InsightClient;
use forecaster::jobs::{run_forecast, run_insight};
use forecaster::model::{ForecastRow, StoredRow};
use forecaster::store::StoreClient;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TEMPERATURES: [f64; 10] = [20.0, 21.0, 22.0, 21.0, 20.0, 19.0, 20.0, 21.0, 22.0, 23.0];

#[derive(Clone, Default)]
struct StoreState {
    rows: Arc<Mutex<Vec<StoredRow>>>,
    forecast_puts: Arc<Mutex<Vec<Vec<ForecastRow>>>>,
    insights: Arc<Mutex<Vec<String>>>,
}

async fn rows(State(state): State<StoreState>) -> Json<Vec<StoredRow>> {
    Json(state.rows.lock().unwrap().clone())
}

async fn replace_forecast(State(state): State<StoreState>, Json(rows): Json<Vec<ForecastRow>>) -> StatusCode {
    state.forecast_puts.lock().unwrap().push(rows);
    StatusCode::NO_CONTENT
}

async fn store_insight(State(state): State<StoreState>, text: String) -> StatusCode {
    state.insights.lock().unwrap().push(text);
    StatusCode::NO_CONTENT
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Remote store stand-in holding `stored` as its append-only log.
async fn spawn_store(stored: Vec<StoredRow>) -> (StoreClient, StoreState) {
    let state = StoreState::default();
    *state.rows.lock().unwrap() = stored;

    let app = Router::new()
        .route("/api/rows", get(rows))
        .route("/api/forecast", put(replace_forecast))
        .route("/api/insight", put(store_insight))
        .with_state(state.clone());
    let addr = serve(app).await;

    let client = StoreClient::new(&format!("http://{}/api", addr), Duration::from_secs(5)).unwrap();
    (client, state)
}

/// Text-generation stand-in answering with a fixed status and body.
async fn spawn_generator(status: StatusCode, body: &'static str) -> String {
    let app = Router::new().route("/generate", post(move |Json(_): Json<Value>| async move { (status, body) }));
    let addr = serve(app).await;
    format!("http://{}/generate", addr)
}

fn hourly_rows(count: usize) -> Vec<StoredRow> {
    (0..count)
        .map(|i| StoredRow {
            timestamp: DateTime::from_timestamp(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
            distance: Some(150.0 - i as f64),
            temperature: Some(TEMPERATURES[i % TEMPERATURES.len()]),
            humidity: Some(40.0 + i as f64 * 0.5),
            pressure: Some(1013.0),
        })
        .collect()
}

#[tokio::test]
async fn test_forecast_replaces_table_with_full_horizon() {
    let stored = hourly_rows(10);
    let newest = stored[9].timestamp;
    let (store, state) = spawn_store(stored).await;

    let forecast = run_forecast(&store, &ForecastEngine::default()).await.unwrap();

    let puts = state.forecast_puts.lock().unwrap();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0], forecast);
    assert_eq!(forecast.len(), 24);
    assert_eq!(forecast[0].timestamp.timestamp(), newest.timestamp() + 3600);
    assert_eq!(forecast[23].timestamp.timestamp(), newest.timestamp() + 24 * 3600);
    for row in forecast.iter() {
        for band in [row.distance, row.temperature, row.humidity, row.pressure] {
            assert!(band.lower <= band.point && band.point <= band.upper);
        }
    }
    // Constant pressure forecasts flat with no spread.
    assert_eq!(forecast[5].pressure.point, 1013.0);
    assert_eq!(forecast[5].pressure.upper, 1013.0);
}

#[tokio::test]
async fn test_forecast_with_nine_rows_writes_nothing() {
    let (store, state) = spawn_store(hourly_rows(9)).await;

    let result = run_forecast(&store, &ForecastEngine::default()).await;

    assert!(matches!(
        result,
        Err(Error::InsufficientData {
            available: 9,
            required: 10,
            ..
        })
    ));
    assert!(state.forecast_puts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_one_sparse_metric_aborts_whole_run() {
    let mut stored = hourly_rows(20);
    for row in stored.iter_mut().skip(5) {
        row.humidity = Some(250.0);
    }
    let (store, state) = spawn_store(stored).await;

    let result = run_forecast(&store, &ForecastEngine::default()).await;

    assert!(matches!(result, Err(Error::InsufficientData { available: 5, .. })));
    assert!(state.forecast_puts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rows_out_of_order_give_same_forecast() {
    let ordered = hourly_rows(15);
    let mut shuffled = ordered.clone();
    shuffled.reverse();

    let (first, _) = spawn_store(ordered).await;
    let (second, _) = spawn_store(shuffled).await;
    let engine = ForecastEngine::default();

    assert_eq!(
        run_forecast(&first, &engine).await.unwrap(),
        run_forecast(&second, &engine).await.unwrap()
    );
}

#[tokio::test]
async fn test_store_error_is_reported() {
    let app = Router::new().route("/rows", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }));
    let addr = serve(app).await;
    let store = StoreClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();

    let result = run_forecast(&store, &ForecastEngine::default()).await;

    match result {
        Err(Error::Store { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected store error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_insight_text_stored_verbatim() {
    let generator = spawn_generator(
        StatusCode::OK,
        r#"{"candidates":[{"content":{"parts":[{"text":"Levels are steady."}]}}]}"#,
    )
    .await;
    let (store, state) = spawn_store(hourly_rows(12)).await;
    let client = InsightClient::new(&generator, "key", Duration::from_secs(5));

    let text = run_insight(&store, &client, 6).await.unwrap();

    assert_eq!(text, "Levels are steady.");
    assert_eq!(*state.insights.lock().unwrap(), vec!["Levels are steady.".to_string()]);
}

#[tokio::test]
async fn test_insight_degrades_on_failed_generation() {
    let cases = [
        (StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#, "service returned 500"),
        (StatusCode::OK, "not json", "malformed response"),
        (StatusCode::OK, r#"{"candidates":[]}"#, "empty response"),
    ];

    for (status, body, reason) in cases {
        let generator = spawn_generator(status, body).await;
        let (store, state) = spawn_store(hourly_rows(3)).await;
        let client = InsightClient::new(&generator, "key", Duration::from_secs(5));

        let text = run_insight(&store, &client, 6).await.unwrap();

        assert!(text.starts_with("Insight unavailable"), "{}", text);
        assert!(text.contains(reason), "{}", text);
        assert_eq!(*state.insights.lock().unwrap(), vec![text.clone()]);
    }
}

#[tokio::test]
async fn test_generator_receives_prompt() {
    let seen: Arc<Mutex<Option<Value>>> = Arc::default();
    let recorded = Arc::clone(&seen);
    let app = Router::new().route(
        "/generate",
        post(move |Json(body): Json<Value>| {
            let recorded = Arc::clone(&recorded);
            async move {
                *recorded.lock().unwrap() = Some(body);
                Json(json!({"candidates": [{"content": {"parts": [{"text": "ok"}]}}]}))
            }
        }),
    );
    let addr = serve(app).await;
    let client = InsightClient::new(&format!("http://{}/generate", addr), "key", Duration::from_secs(5));

    assert_eq!(client.generate("Summarise this").await, "ok");
    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["contents"][0]["parts"][0]["text"], "Summarise this");
}
