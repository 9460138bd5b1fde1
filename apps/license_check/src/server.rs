use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use grdlic::Gateway;
use license_inspector::Summary;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::check::{self, CheckReport, Outcome, Settings};

pub const APP_NAME: &str = "license_check";

struct ServerError(anyhow::Error);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let e = self.0;
        error!("Internal server error: {e:?}");
        if cfg!(debug_assertions) {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:?}")).into_response()
        } else {
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

impl ServerError {
    pub fn from_anyhow<E: Into<anyhow::Error>>(e: E) -> Self {
        Self(e.into())
    }
}

fn default_port() -> u16 {
    2001
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Exit after the startup check instead of serving.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            enabled: default_enabled(),
        }
    }
}

pub struct AppState<G> {
    gateway: Arc<Mutex<G>>,
    settings: Settings,
}

// Derive would require `G: Clone`.
impl<G> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            settings: self.settings,
        }
    }
}

impl<G> AppState<G> {
    pub fn new(gateway: G, settings: Settings) -> Self {
        Self {
            gateway: Arc::new(Mutex::new(gateway)),
            settings,
        }
    }
}

async fn hello() -> &'static str {
    // The trailing newline is important for tools that assume POSIX lines, such as `curl`.
    "Hello from license_check\n"
}

async fn licenses<G: Gateway>(State(state): State<AppState<G>>) -> Result<Json<Value>, ServerError> {
    let payload = {
        let gateway = state.gateway.lock().unwrap_or_else(PoisonError::into_inner);
        gateway
            .license_info(&state.settings.visibility, None)
            .map_err(ServerError::from_anyhow)?
    };
    let summary = license_inspector::summarize_enumeration(Some(&payload))
        .map_err(ServerError::from_anyhow)?;
    Ok(Json(json!({
        "firstFeatureNumber": summary.first_feature_number,
        "records": lines(&summary),
    })))
}

async fn run_check<G>(State(state): State<AppState<G>>) -> Result<Json<Value>, ServerError>
where
    G: Gateway + Send + 'static,
{
    // A check makes many backend calls; keep them off the async workers.
    let outcome = tokio::task::spawn_blocking(move || {
        let gateway = state.gateway.lock().unwrap_or_else(PoisonError::into_inner);
        check::check_license(&*gateway, &state.settings)
    })
    .await
    .map_err(ServerError::from_anyhow)?;
    match outcome {
        Outcome::Passed(report) => Ok(Json(report_json(&report))),
        Outcome::Failed(e) => Ok(Json(json!({ "passed": false, "error": e.to_string() }))),
        Outcome::Fatal(e) => Err(ServerError::from_anyhow(e)),
    }
}

fn lines(summary: &Summary) -> Vec<String> {
    summary.records.iter().map(ToString::to_string).collect()
}

fn report_json(report: &CheckReport) -> Value {
    json!({
        "passed": true,
        "apiVersion": report.api_version.to_string(),
        "licenses": lines(&report.licenses),
        "featureNumber": report.feature_number,
        "featureInfo": lines(&report.feature_info),
        "signature": report.signature,
        "remainingTime": report.remaining_time,
        "runCounter": report.run_counter,
        "realTime": report.real_time,
        "maxConcurrentResource": report.max_concurrent_resource,
    })
}

pub fn new_app<G>(state: AppState<G>) -> Router
where
    G: Gateway + Send + 'static,
{
    Router::new()
        .route(&format!("/local/{APP_NAME}/api/v0/hello"), get(hello))
        .route(
            &format!("/local/{APP_NAME}/api/v0/licenses"),
            get(licenses::<G>),
        )
        .route(
            &format!("/local/{APP_NAME}/api/v0/check"),
            post(run_check::<G>),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().include_headers(true)),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    debug!("Stopping app");
}

pub async fn serve<G>(config: &Config, state: AppState<G>) -> anyhow::Result<()>
where
    G: Gateway + Send + 'static,
{
    debug!("Starting server on port {}", config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, new_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    debug!("App stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use grdlic::{sim::SimulatedGateway, VendorCodes, Visibility};
    use tower::ServiceExt;

    use super::*;

    fn settings() -> Settings {
        Settings {
            visibility: Visibility::default(),
            vendor_codes: VendorCodes::new(0x5191_75b7, 0x5191_7645),
            feature_number: None,
        }
    }

    async fn send(settings: Settings, method: Method, route: &str) -> (StatusCode, Vec<u8>) {
        app_logging::init_test_logger();
        let app = new_app(AppState::new(SimulatedGateway::default(), settings));
        let request = Request::builder()
            .method(method)
            .uri(format!("/local/{APP_NAME}/api/v0/{route}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn hello_responds() {
        let (status, body) = send(settings(), Method::GET, "hello").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ends_with(b"\n"));
    }

    #[tokio::test]
    async fn licenses_are_summarized() {
        let (status, body) = send(settings(), Method::GET, "licenses").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["firstFeatureNumber"], json!(1));
        let records = body["records"].as_array().unwrap();
        assert!(records[0]
            .as_str()
            .unwrap()
            .starts_with("Hardware dongle without license"));
        assert_eq!(records.len(), 5);
    }

    #[tokio::test]
    async fn check_passes_on_simulated_backend() {
        let (status, body) = send(settings(), Method::POST, "check").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["passed"], json!(true));
        assert_eq!(body["featureNumber"], json!(1));
        assert_eq!(body["runCounter"], json!(98));
        assert_eq!(body["remainingTime"], Value::Null);
        assert_eq!(body["apiVersion"], json!("7.2"));
        assert_eq!(body["featureInfo"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn check_reports_failure() {
        let settings = Settings {
            visibility: Visibility {
                dongle_model: 0x80,
                ..Visibility::default()
            },
            ..settings()
        };
        let (status, body) = send(settings, Method::POST, "check").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["passed"], json!(false));
        assert_eq!(body["error"], json!("no feature found to log in to"));
    }

    #[tokio::test]
    async fn gateway_errors_are_server_errors() {
        let settings = Settings {
            vendor_codes: VendorCodes::new(0, 0),
            ..settings()
        };
        let (status, _) = send(settings, Method::POST, "check").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn check_requires_post() {
        let (status, _) = send(settings(), Method::GET, "check").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
