use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use utoipa::{OpenApi, ToSchema};

use crate::db::{ReportSummary, StoredReport, WorksheetPayload};
use crate::editor::{DraftEditor, ValidationSummary};
use crate::ingest::{
    parse_workbook, CanonicalColumn, DataRow, HeaderBlock, IntakeError, MergeRange, MetaPair,
    WorksheetDraft,
};
use crate::services::report_service::{
    CreateReportBody, CreateReportResponse, ReportBundleInput, WorksheetInput,
};
use crate::services::{ReportService, ReportServiceError};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

// Multipart framing adds a little on top of the file itself
const UPLOAD_BODY_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub report_service: ReportService,
    pub max_upload_bytes: usize,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub service: String,
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

/// Parsed draft returned by the upload endpoint: every usable worksheet
/// plus its validation summary, ready for the preview editor.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_name: String,
    pub worksheet_count: usize,
    pub active_worksheet: usize,
    pub worksheets: Vec<UploadWorksheet>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadWorksheet {
    #[serde(flatten)]
    pub draft: WorksheetDraft,
    pub validation: ValidationSummary,
}

/// Multipart form schema for the upload endpoint.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: String,
}

/// Error types returned by API handlers, serialized as `{ "message": … }`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Service(#[from] ReportServiceError),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Intake(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(e) => match e {
                ReportServiceError::MissingMetadata
                | ReportServiceError::MissingFacility
                | ReportServiceError::NoUsableWorksheets => StatusCode::BAD_REQUEST,
                ReportServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ReportServiceError::Database(_)
                | ReportServiceError::Generation(_)
                | ReportServiceError::Io(_)
                | ReportServiceError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + UPLOAD_BODY_OVERHEAD;
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/uploads", post(upload_workbook))
        .route("/reports", post(create_report).get(list_reports))
        .route("/reports/{id}", get(get_report))
        .route("/reports/{id}/download", get(download_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        service: "lansia-report-service".to_string(),
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Parsed workbook draft", body = UploadResponse),
        (status = 400, description = "Oversize, unreadable, or empty workbook", body = ErrorBody)
    )
)]
#[instrument(skip(state, multipart))]
async fn upload_workbook(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (file_name, bytes) = read_upload_field(&mut multipart).await?;
    debug!("Received upload {} ({} bytes)", file_name, bytes.len());

    if bytes.len() > state.max_upload_bytes {
        return Err(ApiError::BadRequest(format!(
            "File terlalu besar, maksimal {} MB",
            state.max_upload_bytes / (1024 * 1024)
        )));
    }

    // Workbook decoding is CPU-bound; keep it off the async worker
    let draft = tokio::task::spawn_blocking(move || parse_workbook(&file_name, &bytes)).await??;

    let worksheets: Vec<UploadWorksheet> = draft
        .worksheets
        .into_iter()
        .map(|ws| {
            let validation = DraftEditor::new(ws.columns.clone(), ws.rows.clone())
                .validate()
                .summary;
            UploadWorksheet {
                draft: ws,
                validation,
            }
        })
        .collect();

    info!(
        "Upload {} parsed into {} worksheets",
        draft.file_name,
        worksheets.len()
    );

    Ok(Json(UploadResponse {
        file_name: draft.file_name,
        worksheet_count: worksheets.len(),
        active_worksheet: draft.active_worksheet,
        worksheets,
    }))
}

async fn read_upload_field(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Gagal membaca unggahan: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("workbook.xlsx").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Gagal membaca unggahan: {}", e)))?;
        return Ok((file_name, bytes));
    }

    Err(ApiError::BadRequest(
        "File tidak ditemukan pada permintaan upload".to_string(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    request_body = CreateReportBody,
    responses(
        (status = 201, description = "Bundle stored", body = CreateReportResponse),
        (status = 400, description = "Missing metadata or no usable worksheet", body = ErrorBody)
    )
)]
#[instrument(skip(state, body))]
async fn create_report(
    State(state): State<AppState>,
    Json(body): Json<CreateReportBody>,
) -> Result<(StatusCode, Json<CreateReportResponse>), ApiError> {
    debug!("Create report bundle requested");
    let response = state.report_service.create_report(body).await?;

    info!(
        "Stored report bundle {} with {} worksheets",
        response.report_id, response.worksheet_count
    );

    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    responses((status = 200, description = "Most recent bundles, newest first", body = [ReportSummary]))
)]
#[instrument(skip(state))]
async fn list_reports(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReportSummary>>, ApiError> {
    debug!("Listing recent report bundles");
    let summaries = state.report_service.list_reports().await?;

    info!("Retrieved {} report bundles", summaries.len());
    Ok(Json(summaries))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}",
    params(("id" = i64, Path, description = "Report bundle id")),
    responses(
        (status = 200, description = "Full stored bundle", body = StoredReport),
        (status = 404, description = "No bundle with that id", body = ErrorBody)
    )
)]
#[instrument(skip(state), fields(id = %id))]
async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StoredReport>, ApiError> {
    debug!("Fetching report bundle {}", id);
    let report = state.report_service.get_report(id).await?;

    info!(
        "Retrieved report bundle {} with {} worksheets",
        id, report.worksheet_count
    );
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}/download",
    params(("id" = i64, Path, description = "Report bundle id")),
    responses(
        (status = 200, description = "Regenerated recap workbook", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 404, description = "No bundle with that id", body = ErrorBody)
    )
)]
#[instrument(skip(state), fields(id = %id))]
async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    debug!("Download requested for report bundle {}", id);
    let download = state.report_service.download_report(id).await?;

    info!(
        "Streaming {} ({} bytes) for bundle {}",
        download.file_name,
        download.bytes.len(),
        id
    );

    let headers = [
        (header::CONTENT_TYPE, XLSX_MIME.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.file_name),
        ),
    ];
    Ok((headers, download.bytes).into_response())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        upload_workbook,
        create_report,
        list_reports,
        get_report,
        download_report
    ),
    components(schemas(
        HealthResponse,
        ErrorBody,
        UploadResponse,
        UploadWorksheet,
        UploadForm,
        WorksheetDraft,
        CanonicalColumn,
        DataRow,
        MetaPair,
        HeaderBlock,
        MergeRange,
        ValidationSummary,
        CreateReportBody,
        ReportBundleInput,
        WorksheetInput,
        CreateReportResponse,
        ReportSummary,
        StoredReport,
        WorksheetPayload
    )),
    tags(
        (name = "lansia-report-service", description = "Elderly health report pipeline API")
    )
)]
struct ApiDoc;

/// OpenAPI description of the HTTP surface, written out by the
/// `generate-openapi` binary.
pub fn generate_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
