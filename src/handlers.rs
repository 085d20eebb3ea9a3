use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::CONTENT_TYPE,
    response::Json,
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use multer::Multipart;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::analysis::AnalysisRequest;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalyzeResponse, AppState, HealthResponse};

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.analyzer.agent().model_id().to_string(),
        model_configured: state.model_configured(),
        search_enabled: state.analyzer.agent().has_search(),
    })
}

const QUERY_LIMIT: u64 = 64 * 1024;

/// Pulls the `file` and `query` fields out of a multipart body.
///
/// The body is streamed through multer; the whole request is capped at the
/// file limit plus room for the query and the multipart framing.
async fn read_form(
    content_type: &str,
    body: Body,
    max_file_size: u64,
) -> AnalysisResult<(Option<(String, Bytes)>, String)> {
    let boundary = multer::parse_boundary(content_type).map_err(|e| {
        AnalysisError::validation(format!("Invalid multipart request: {}", e))
    })?;

    let body_limit = usize::try_from(max_file_size.saturating_add(2 * QUERY_LIMIT)).unwrap_or(usize::MAX);
    let stream = Limited::new(body, body_limit).into_data_stream();
    let mut multipart = Multipart::with_constraints(
        stream,
        boundary,
        multer::Constraints::new().size_limit(
            multer::SizeLimit::new()
                .per_field(max_file_size)
                .for_field("query", QUERY_LIMIT),
        ),
    );

    let mut file = None;
    let mut query = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .filter(|n| !n.trim().is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AnalysisError::validation(
                            "The uploaded file has no name. Supported formats: MP4, AVI, MOV",
                        )
                    })?;
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, data));
            }
            Some("query") => {
                query = field.text().await.map_err(multipart_error)?;
            }
            _ => {}
        }
    }

    Ok((file, query))
}

fn multipart_error(e: multer::Error) -> AnalysisError {
    match e {
        multer::Error::FieldSizeExceeded { field_name, limit } => AnalysisError::validation(format!(
            "Field '{}' is too large. Maximum size is {}MB.",
            field_name.unwrap_or_default(),
            limit / 1024 / 1024
        )),
        multer::Error::StreamReadFailed(source) if source.is::<LengthLimitError>() => {
            AnalysisError::validation("Request is larger than the maximum upload size.")
        }
        other => AnalysisError::validation(format!("Error parsing multipart request: {}", other)),
    }
}

/// Upload a video with a question and return the model's analysis
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> AnalysisResult<Json<AnalyzeResponse>> {
    let start_time = SystemTime::now();

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AnalysisError::validation("Missing Content-Type header"))?;

    let (file, query) =
        read_form(&content_type, request.into_body(), state.config.max_file_size).await?;
    let (file_name, bytes) =
        file.ok_or_else(|| AnalysisError::validation("Upload a video file to begin analysis."))?;

    info!("[POST /analyze] ⏱️  START - {:?}", start_time);
    info!(
        "[POST /analyze] 📁 File: {} ({:.2} MB)",
        file_name,
        bytes.len() as f64 / 1024.0 / 1024.0
    );

    // Dropping the handler (client went away) trips the token; the spawned
    // task then stops waiting and still removes its scratch file.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let analyzer = state.analyzer.clone();
    let analysis = AnalysisRequest {
        file_name: file_name.clone(),
        bytes,
        query,
    };
    let task = tokio::spawn(async move { analyzer.analyze(analysis, &cancel).await });

    let outcome = task
        .await
        .map_err(|e| AnalysisError::remote(format!("analysis task failed: {}", e)))??;

    info!(
        "[POST /analyze] ✅ SUCCESS - {} in {:.2}s",
        file_name,
        outcome.elapsed.as_secs_f64()
    );

    Ok(Json(AnalyzeResponse::new(file_name, outcome)))
}
