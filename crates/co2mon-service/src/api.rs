//! HTTP endpoints for the co2mon-service.
//!
//! Handlers copy the latest readings out of the shared store and never wait
//! on the device. A missing reading is reported as `null`, not as an error.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use co2mon_core::{PollMetrics, ReadingStore};
//! use co2mon_service::{AppState, api};
//!
//! let state = AppState::new(Arc::new(ReadingStore::new()), Arc::new(PollMetrics::new()));
//! let app = api::app(state);
//! # let _ = app;
//! ```

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use co2mon_core::{Co2Reading, PollMetricsSnapshot, TemperatureReading};

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/data", get(get_data))
        .route("/status", get(get_status))
}

/// The router with tracing and CORS layers applied, bound to `state`.
///
/// Every response carries `Access-Control-Allow-Origin: *`, so browser
/// dashboards on other origins can read `/data`.
pub fn app(state: Arc<AppState>) -> Router {
    router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Latest temperature as served by `/data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureData {
    /// Capture time in Unix seconds.
    pub time: Option<i64>,
    /// Degrees Celsius formatted with two decimals.
    pub value: Option<String>,
}

impl From<Option<TemperatureReading>> for TemperatureData {
    fn from(reading: Option<TemperatureReading>) -> Self {
        Self {
            time: reading.map(|r| r.unix_timestamp()),
            value: reading.map(|r| format!("{:.2}", r.value)),
        }
    }
}

/// Latest CO2 concentration as served by `/data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Co2Data {
    /// Capture time in Unix seconds.
    pub time: Option<i64>,
    /// Parts per million.
    pub value: Option<u16>,
}

impl From<Option<Co2Reading>> for Co2Data {
    fn from(reading: Option<Co2Reading>) -> Self {
        Self {
            time: reading.map(|r| r.unix_timestamp()),
            value: reading.map(|r| r.value),
        }
    }
}

/// Response body of `GET /data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub temperature: TemperatureData,
    pub co2: Co2Data,
}

async fn get_data(State(state): State<Arc<AppState>>) -> Json<DataResponse> {
    let (temperature, co2) = state.store.snapshot();
    Json(DataResponse {
        temperature: temperature.into(),
        co2: co2.into(),
    })
}

/// Response body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Whether background acquisition is running.
    pub monitoring: bool,
    pub metrics: PollMetricsSnapshot,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        monitoring: state.is_monitoring(),
        metrics: state.metrics.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use co2mon_core::{PollMetrics, Reading, ReadingStore};

    fn create_test_state() -> Arc<AppState> {
        AppState::new(Arc::new(ReadingStore::new()), Arc::new(PollMetrics::new()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_data_endpoint_empty() {
        let (status, json) = get_json(app(create_test_state()), "/data").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({
                "temperature": { "time": null, "value": null },
                "co2": { "time": null, "value": null },
            })
        );
    }

    #[tokio::test]
    async fn test_data_endpoint_with_readings() {
        let state = create_test_state();
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        state.store.set_temperature(Reading::new(23.4567, at));
        state.store.set_co2(Reading::new(812, at));

        let (status, json) = get_json(app(state), "/data").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["temperature"]["time"], 1_700_000_000);
        assert_eq!(json["temperature"]["value"], "23.46");
        assert_eq!(json["co2"]["time"], 1_700_000_000);
        assert_eq!(json["co2"]["value"], 812);
    }

    #[tokio::test]
    async fn test_data_endpoint_partial() {
        let state = create_test_state();
        state.store.set_co2(Reading::now(455));

        let (_, json) = get_json(app(state), "/data").await;

        assert!(json["temperature"]["value"].is_null());
        assert!(json["temperature"]["time"].is_null());
        assert_eq!(json["co2"]["value"], 455);
        assert!(json["co2"]["time"].is_i64());
    }

    #[tokio::test]
    async fn test_data_endpoint_allows_any_origin() {
        let response = app(create_test_state())
            .oneshot(
                Request::builder()
                    .uri("/data")
                    .header(header::ORIGIN, "http://dashboard.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let state = create_test_state();
        state.set_monitoring(true);

        let (status, json) = get_json(app(state), "/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["monitoring"], true);
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
        assert_eq!(json["metrics"]["cycles"], 0);
        assert!(json["metrics"]["last_error"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = app(create_test_state())
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_temperature_formatting() {
        let at = OffsetDateTime::UNIX_EPOCH;
        let data = TemperatureData::from(Some(Reading::new(-3.0, at)));
        assert_eq!(data.value.as_deref(), Some("-3.00"));
        assert_eq!(data.time, Some(0));
    }
}
