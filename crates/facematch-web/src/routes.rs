use crate::engine::{EngineError, EngineHandle};
use crate::page::{self, Banner, Figure, ResultView};
use crate::upload::{self, Upload, UploadError};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facematch_core::{DatabaseMatch, MatchScore, ScanError, ScanReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

const MISSING_INPUT: &str = "Please upload an input image and provide a database folder path.";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    engine: EngineHandle,
    default_database: PathBuf,
    metric: String,
    threshold: f32,
}

impl AppState {
    pub fn new(engine: EngineHandle, config: &facematch_core::Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                default_database: config.database_dir.clone(),
                metric: config.metric.to_string(),
                threshold: config.effective_threshold(),
            }),
        }
    }

    fn default_database(&self) -> String {
        self.inner.default_database.display().to_string()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/match", post(match_faces))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Response {
    html(page::render(&state.default_database(), None))
}

fn html(rendered: Result<String, tera::Error>) -> Response {
    match rendered {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            tracing::error!(error = ?e, "failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page").into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        // The engine is only spawned once both models have loaded.
        "models_loaded": true,
        "metric": state.inner.metric,
        "threshold": state.inner.threshold,
        "database_default": state.default_database(),
    }))
}

/// Form fields of a match submission.
#[derive(Default)]
struct Submission {
    image: Option<(String, Vec<u8>)>,
    database: String,
}

async fn read_submission(multipart: &mut Multipart) -> Result<Submission, String> {
    let mut submission = Submission::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("invalid form submission: {e}"))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| format!("failed to read upload: {e}"))?;
                // Browsers send an empty part when no file was chosen.
                if !file_name.is_empty() && !bytes.is_empty() {
                    submission.image = Some((file_name, bytes.to_vec()));
                }
            }
            Some("database") => {
                submission.database = field
                    .text()
                    .await
                    .map_err(|e| format!("invalid database field: {e}"))?
                    .trim()
                    .to_string();
            }
            _ => {}
        }
    }
    Ok(submission)
}

async fn match_faces(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("match", %request_id);

    async move {
        let (database, view) = match read_submission(&mut multipart).await {
            Ok(submission) => {
                let database = submission.database.clone();
                (database, run_match(&state, submission).await)
            }
            Err(e) => {
                tracing::warn!(error = %e, "rejected submission");
                (state.default_database(), ResultView::error(e))
            }
        };
        html(page::render(&database, Some(&view)))
    }
    .instrument(span)
    .await
}

async fn run_match(state: &AppState, submission: Submission) -> ResultView {
    let Some((file_name, bytes)) = submission.image else {
        return ResultView::error(MISSING_INPUT);
    };
    if submission.database.is_empty() {
        return ResultView::error(MISSING_INPUT);
    }

    let upload = match Upload::validate(&file_name, bytes) {
        Ok(u) => u,
        Err(e) => return ResultView::error(e.to_string()),
    };
    tracing::info!(file = %upload.file_name, database = %submission.database, "match requested");

    // The temp file lives until this function returns, then is deleted.
    let (upload, temp) = match persist(upload).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!(error = %e, "failed to store upload");
            return ResultView::error(e.to_string());
        }
    };

    let result = state
        .inner
        .engine
        .scan(PathBuf::from(&submission.database), temp.path().to_path_buf())
        .await;

    let input_figure = Figure {
        src: upload::data_uri(&upload.bytes),
        caption: "Input Image".to_string(),
    };

    match result {
        Ok(report) => report_view(report, input_figure).await,
        Err(EngineError::Scan(ScanError::DatabaseNotFound(_))) => {
            ResultView::error("Database folder not found!")
        }
        Err(e) => {
            tracing::error!(error = %e, "scan failed");
            ResultView::error(e.to_string())
        }
    }
}

/// Write the upload to disk off the async runtime.
async fn persist(upload: Upload) -> Result<(Upload, tempfile::NamedTempFile), UploadError> {
    tokio::task::spawn_blocking(move || {
        let file = upload.persist()?;
        Ok::<_, UploadError>((upload, file))
    })
    .await
    .map_err(|e| UploadError::Io(std::io::Error::other(e)))?
}

async fn report_view(report: ScanReport, input_figure: Figure) -> ResultView {
    let mut view = ResultView {
        banners: report
            .skipped
            .iter()
            .map(|s| Banner::warning(format!("Error processing {}: {}", s.name, s.reason)))
            .collect(),
        ..ResultView::default()
    };

    let Some(DatabaseMatch { path, name, verification }) = report.matched else {
        view.banners.push(Banner::error("No match found."));
        return view;
    };

    let score = MatchScore::from_distance(verification.distance);
    view.banners.push(Banner::success(format!(
        "Match Found! Overall Match Percentage: {:.2}%",
        score.overall
    )));
    view.score = Some(score);
    view.figures.push(input_figure);

    match tokio::fs::read(&path).await {
        Ok(bytes) => view.figures.push(Figure {
            src: upload::data_uri(&bytes),
            caption: format!("Matched Image ({name})"),
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read matched image");
            view.banners.push(Banner::warning(format!("Cannot display {name}: {e}")));
        }
    }
    view
}
