//! API route definitions
//!
//! - /api/v1/serial_ports - Available serial port names
//! - /api/v1/connect - (Re)connect the serial link
//! - /api/v1/tare - Get or set the tare offset
//! - /api/v1/historical_data - Stored cycle records by time range
//! - /api/v1/status - Link state and pipeline counters

use axum::{routing::{get, post}, Router};

use super::handlers::{self, DashboardState};
use super::ws;

/// Create all API routes
pub fn api_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/serial_ports", get(handlers::list_serial_ports))
        .route("/connect", post(handlers::connect))
        .route("/tare", get(handlers::get_tare).post(handlers::set_tare))
        .route("/historical_data", get(handlers::get_historical_data))
        .route("/status", get(handlers::get_status))
        .with_state(state)
}

/// Root-level live stream and health endpoints
pub fn legacy_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(handlers::legacy_health_check))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{ManualClock, ScriptedOpener};
    use crate::config::ReceiverConfig;
    use crate::pipeline::Pipeline;
    use crate::storage::{CycleStore, InMemoryCycleStore};
    use crate::types::{CycleRecord, EnvironmentSnapshot};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn create_test_state(opener: ScriptedOpener, store: InMemoryCycleStore) -> DashboardState {
        // The coordinator is dropped, so link status sends fail fast
        let pipeline = Pipeline::build(
            &ReceiverConfig::default(),
            Arc::new(opener),
            Arc::new(ManualClock::new(0)),
            Arc::new(store),
            CancellationToken::new(),
        );
        DashboardState::new(pipeline.handle)
    }

    fn empty_state() -> DashboardState {
        create_test_state(ScriptedOpener::new(), InMemoryCycleStore::new())
    }

    fn record(total_micros: u64) -> CycleRecord {
        CycleRecord {
            total_micros,
            timestamp_drift: 0,
            amplitude: 120.0,
            period: 2.0,
            environment: EnvironmentSnapshot::default(),
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_serial_ports_lists_opener_ports() {
        let opener = ScriptedOpener::new();
        opener.push("ttyUSB0", Vec::new());
        let app = api_routes(create_test_state(opener, InMemoryCycleStore::new()));

        let response = app.oneshot(get("/serial_ports")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!(["ttyUSB0"]));
    }

    #[tokio::test]
    async fn test_connect_unknown_port_is_server_error() {
        let app = api_routes(empty_state());

        let response = app
            .oneshot(post_json("/connect", r#"{"port_name":"ttyNope","baud_rate":115200}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_connect_known_port_returns_generation() {
        let opener = ScriptedOpener::new();
        opener.push("ttyUSB0", Vec::new());
        let app = api_routes(create_test_state(opener, InMemoryCycleStore::new()));

        let response = app
            .oneshot(post_json("/connect", r#"{"port_name":"ttyUSB0","baud_rate":9600}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["generation"], 1);
        assert_eq!(json["baud_rate"], 9600);
    }

    #[tokio::test]
    async fn test_tare_set_then_get() {
        let state = empty_state();

        let response = api_routes(state.clone())
            .oneshot(post_json("/tare", r#"{"value":-7}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.pipeline.control.tare(), -7);

        let response = api_routes(state).oneshot(get("/tare")).await.unwrap();
        assert_eq!(body_json(response).await, serde_json::json!({"value": -7}));
    }

    #[tokio::test]
    async fn test_out_of_range_tare_is_rejected() {
        let state = empty_state();
        state.pipeline.control.set_tare(3);

        let response = api_routes(state.clone())
            .oneshot(post_json("/tare", r#"{"value":-9223372036854775808}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.pipeline.control.tare(), 3);

        let response = api_routes(state.clone())
            .oneshot(post_json("/tare", r#"{"value":4294967295}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.pipeline.control.tare(), 4_294_967_295);
    }

    #[tokio::test]
    async fn test_historical_data_range_is_inclusive() {
        let store = InMemoryCycleStore::new();
        for t in [1_000, 2_000, 3_000, 4_000] {
            store.append(&record(t)).unwrap();
        }
        let app = api_routes(create_test_state(ScriptedOpener::new(), store));

        let response = app.oneshot(get("/historical_data?start=2000&end=3000")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let times: Vec<u64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["total_micros"].as_u64().unwrap())
            .collect();
        assert_eq!(times, vec![2_000, 3_000]);
    }

    #[tokio::test]
    async fn test_historical_data_rejects_bad_range() {
        let state = empty_state();

        let response = api_routes(state.clone())
            .oneshot(get("/historical_data?start=abc&end=10"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = api_routes(state).oneshot(get("/historical_data?start=10&end=5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_reports_disconnected_link() {
        let app = api_routes(empty_state());

        let response = app.oneshot(get("/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["device"], "serial");
        assert_eq!(json["status"], "disconnected");
        assert_eq!(json["generation"], 0);
        assert_eq!(json["stats"]["readings"], 0);
    }

    #[tokio::test]
    async fn test_legacy_health() {
        let app = legacy_routes(empty_state());

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }
}
