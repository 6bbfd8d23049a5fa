//! HTTP surface — run, health, tool listing and artifact download

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::engine::{Engine, ExecutionRequest, ExecutionResult};
use crate::error::EngineError;
use crate::health::{HealthReport, HealthReporter, ToolsPayload};
use crate::registry::Mode;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub health: HealthReporter,
}

/// Error body shared by every endpoint: `{ok: false, error: {code, message}}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorResponse {
    pub ok: bool,
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorResponse {
                ok: false,
                error: ApiErrorBody {
                    code: code.into(),
                    message: message.into(),
                },
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::NotFound(_) => Self::not_found(message),
            EngineError::ModeUnavailable { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "mode_unavailable", message)
            }
            EngineError::Artifact(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "artifact_error", message)
            }
            EngineError::Config(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    pub mode: Option<String>,
    pub deadline_secs: Option<u64>,
    pub format: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseFormat {
    Text,
    Json,
}

impl RunQuery {
    fn request(&self, tool_id: String) -> Result<ExecutionRequest, ApiError> {
        let mode = match self.mode.as_deref() {
            None | Some("") => Mode::Auto,
            Some(raw) => Mode::from_str(raw).map_err(ApiError::bad_request)?,
        };
        Ok(ExecutionRequest::new(tool_id)
            .with_mode(mode)
            .with_deadline(Duration::from_secs(self.deadline_secs.unwrap_or(0))))
    }

    fn response_format(&self) -> Result<ResponseFormat, ApiError> {
        match self.format.as_deref() {
            None | Some("") | Some("text") => Ok(ResponseFormat::Text),
            Some("json") => Ok(ResponseFormat::Json),
            Some(other) => Err(ApiError::bad_request(format!(
                "Invalid format '{other}' (expected text or json)"
            ))),
        }
    }
}

/// Plain-text status block shown above the output
pub fn status_header(result: &ExecutionResult) -> String {
    let mut header = format!(
        "Tool: {}\nMode: {}\nStatus: {}\nExit code: {}\nDuration: {:.2}s\n",
        result.tool_id,
        result.mode_used.describe(),
        result.exit_status.as_str(),
        result
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into()),
        result.duration_ms as f64 / 1000.0
    );
    if let Some(message) = &result.message {
        header.push_str(&format!("Message: {message}\n"));
    }
    header
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run/:tool_id", get(run_tool))
        .route("/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/download/:tool_id", get(download))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!("DiagnOStiX listening on http://{addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}

async fn run_tool(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
    Query(query): Query<RunQuery>,
) -> Result<Response, ApiError> {
    let format = query.response_format()?;
    let request = query.request(tool_id)?;
    let prepared = state.engine.prepare(&request)?;

    if query.stream {
        return Ok(stream_run(state.engine, prepared));
    }

    let result = state.engine.run(prepared, None).await?;
    Ok(match format {
        ResponseFormat::Json => Json(result).into_response(),
        ResponseFormat::Text => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n{}", status_header(&result), result.output),
        )
            .into_response(),
    })
}

/// Chunked text/plain: output lines as produced, then a status trailer
fn stream_run(engine: Arc<Engine>, prepared: crate::engine::PreparedRun) -> Response {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let tool_id = prepared.tool_id().to_string();
        let trailer = match engine.run(prepared, Some(tx.clone())).await {
            Ok(result) => format!("\n--- Run Complete ---\n{}", status_header(&result)),
            Err(e) => {
                warn!("Streaming run of {tool_id} failed: {e}");
                format!("\n--- Run Failed ---\n{e}\n")
            }
        };
        let _ = tx.send(trailer);
    });

    let body = Body::from_stream(UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>));
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.health())
}

async fn list_tools(State(state): State<AppState>) -> Json<ToolsPayload> {
    Json(state.health.tools())
}

/// Hand out the latest output for a tool. The artifact is consumed.
async fn download(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
) -> Result<Response, ApiError> {
    if !state.engine.registry().contains(&tool_id) {
        return Err(EngineError::NotFound(tool_id).into());
    }
    let no_output = || ApiError::not_found(format!("No output available for {tool_id}"));

    let lease = state.engine.artifacts().take_latest(&tool_id).ok_or_else(no_output)?;
    let content = lease.read_output().await.map_err(|e| {
        warn!("Failed to read artifact {}: {e}", lease.id());
        no_output()
    })?;
    info!("Serving artifact {} for {tool_id}", lease.id());
    drop(lease);

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{tool_id}_output.txt\""),
            ),
        ],
        content,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExitStatus;
    use crate::registry::ExecutionMode;
    use chrono::Utc;

    fn result(message: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            tool_id: "disk_diagnostics".into(),
            mode_used: ExecutionMode::External,
            exit_status: ExitStatus::Timeout,
            exit_code: Some(124),
            output: "50%\n".into(),
            message: message.map(String::from),
            started_at: Utc::now(),
            duration_ms: 2015,
            artifact_id: None,
        }
    }

    #[test]
    fn test_status_header() {
        let header = status_header(&result(Some("Timed out after 2s")));
        assert_eq!(
            header,
            "Tool: disk_diagnostics\nMode: External script\nStatus: timeout\nExit code: 124\nDuration: 2.02s\nMessage: Timed out after 2s\n"
        );
        assert!(!status_header(&result(None)).contains("Message:"));
    }

    #[test]
    fn test_query_parsing() {
        let query = RunQuery {
            mode: Some("bash".into()),
            deadline_secs: Some(5),
            ..RunQuery::default()
        };
        let request = query.request("x".into()).unwrap();
        assert_eq!(request.requested_mode, Mode::External);
        assert_eq!(request.deadline, Duration::from_secs(5));

        let bad = RunQuery {
            mode: Some("turbo".into()),
            ..RunQuery::default()
        };
        assert_eq!(bad.request("x".into()).unwrap_err().status, StatusCode::BAD_REQUEST);

        let bad_format = RunQuery {
            format: Some("xml".into()),
            ..RunQuery::default()
        };
        assert!(bad_format.response_format().is_err());
    }

    #[test]
    fn test_engine_error_mapping() {
        let err: ApiError = EngineError::NotFound("nope".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.error.code, "not_found");
        assert!(!err.body.ok);

        let err: ApiError = EngineError::ModeUnavailable {
            tool_id: "t".into(),
            mode: Mode::Native,
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = EngineError::artifact("create", "disk full").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.error.code, "artifact_error");
    }
}
