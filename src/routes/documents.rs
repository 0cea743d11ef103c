use axum::extract::{rejection::JsonRejection, Json, State};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ApiResponse;
use crate::error::{AppError, AppResult};
use crate::indexing::IngestionJob;
use crate::locator::S3Uri;
use crate::reconcile::{self, DocumentRecord, STATUS_INDEXED, STATUS_PARTIALLY_INDEXED};
use crate::state::AppState;
use crate::storage::DownloadOverrides;
use crate::uploads::{issue_upload_links, UploadFileRequest, UploadOutcome};

const DEFAULT_VIEW_CONTENT_TYPE: &str = "application/pdf";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListResponse {
    pub document_details: Vec<DocumentRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub ingestion_job_id: String,
    pub status: String,
    pub started_at: Option<String>,
}

impl From<IngestionJob> for SyncResponse {
    fn from(job: IngestionJob) -> Self {
        Self {
            ingestion_job_id: job.ingestion_job_id,
            status: job.status,
            started_at: job
                .started_at
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentToDelete {
    pub s3_key: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteDocumentsRequest {
    pub documents: Vec<DocumentToDelete>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDocumentsResponse {
    pub success: bool,
    pub deleted_count: usize,
    pub failed_ids: Vec<String>,
    pub sync_triggered: bool,
}

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum DownloadAction {
    #[default]
    Download,
    View,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLinkRequest {
    pub s3_key: String,
    #[serde(default)]
    pub action: DownloadAction,
}

#[derive(Serialize)]
pub struct DownloadLinkResponse {
    pub url: String,
}

#[derive(Deserialize)]
pub struct UploadLinksRequest {
    pub files: Vec<UploadFileRequest>,
}

#[derive(Serialize)]
pub struct UploadLinksResponse {
    pub results: Vec<UploadOutcome>,
}

/// Parses a locator from a request and checks it points into our bucket.
fn locate_in_bucket(raw: &str, bucket: &str) -> AppResult<S3Uri> {
    let uri = S3Uri::parse(raw)?;
    if uri.bucket() != bucket {
        return Err(AppError::bad_request(format!(
            "document '{raw}' is not stored in bucket '{bucket}'"
        )));
    }
    Ok(uri)
}

/// Keys to delete, and whether removing them leaves the index stale.
fn plan_deletion(
    documents: &[DocumentToDelete],
    bucket: &str,
) -> AppResult<(Vec<String>, bool)> {
    let mut keys = Vec::with_capacity(documents.len());
    let mut sync_required = false;

    for document in documents {
        let uri = locate_in_bucket(&document.s3_key, bucket)?;
        if matches!(
            document.status.as_deref(),
            Some(STATUS_INDEXED) | Some(STATUS_PARTIALLY_INDEXED)
        ) {
            sync_required = true;
        }
        keys.push(uri.key().to_string());
    }

    Ok((keys, sync_required))
}

fn download_overrides(uri: &S3Uri, action: DownloadAction) -> DownloadOverrides {
    match action {
        DownloadAction::Download => DownloadOverrides {
            content_disposition: Some("attachment".to_string()),
            content_type: None,
        },
        DownloadAction::View => DownloadOverrides {
            content_disposition: Some(format!("inline ; filename={}", uri.file_name())),
            content_type: Some(
                mime_guess::from_path(uri.file_name())
                    .first_raw()
                    .unwrap_or(DEFAULT_VIEW_CONTENT_TYPE)
                    .to_string(),
            ),
        },
    }
}

fn sync_description() -> String {
    format!(
        "Sync triggered at {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
    )
}

pub async fn list_documents(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<DocumentListResponse>> {
    let target = state.config.knowledge_base_target();
    let documents = reconcile::list_documents(
        state.storage.as_ref(),
        state.knowledge_base.as_ref(),
        &target,
        state.config.document_limit,
    )
    .await?;

    Ok(ApiResponse::ok(
        "Successfully retrieved documents",
        DocumentListResponse {
            document_details: documents,
        },
    ))
}

pub async fn sync_knowledge_base(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<SyncResponse>> {
    let target = state.config.knowledge_base_target();
    let job = state
        .knowledge_base
        .start_ingestion_job(&target, &sync_description())
        .await?;

    info!(
        ingestion_job_id = %job.ingestion_job_id,
        status = %job.status,
        "started knowledge base sync"
    );
    Ok(ApiResponse::ok("Success", SyncResponse::from(job)))
}

pub async fn delete_documents(
    State(state): State<AppState>,
    payload: Result<Json<DeleteDocumentsRequest>, JsonRejection>,
) -> AppResult<ApiResponse<DeleteDocumentsResponse>> {
    let Json(request) = payload?;
    let (keys, sync_required) = plan_deletion(&request.documents, state.storage.bucket())?;

    let outcome = state.storage.delete_objects(&keys).await?;
    if !outcome.failed.is_empty() {
        warn!(failed = ?outcome.failed, "some documents could not be deleted");
    }

    if sync_required {
        let target = state.config.knowledge_base_target();
        let job = state
            .knowledge_base
            .start_ingestion_job(&target, &sync_description())
            .await?;
        info!(
            ingestion_job_id = %job.ingestion_job_id,
            "started sync after deleting indexed documents"
        );
    }

    info!(
        requested = keys.len(),
        deleted = outcome.deleted.len(),
        failed = outcome.failed.len(),
        sync_required,
        "deleted documents"
    );

    Ok(ApiResponse::ok(
        "Success",
        DeleteDocumentsResponse {
            success: outcome.failed.is_empty(),
            deleted_count: outcome.deleted.len(),
            failed_ids: outcome.failed,
            sync_triggered: sync_required,
        },
    ))
}

pub async fn generate_download_link(
    State(state): State<AppState>,
    payload: Result<Json<DownloadLinkRequest>, JsonRejection>,
) -> AppResult<ApiResponse<DownloadLinkResponse>> {
    let Json(request) = payload?;
    let raw = request.s3_key.replace("%2F", "/");
    let uri = locate_in_bucket(&raw, state.storage.bucket())?;

    let url = state
        .storage
        .presign_get_object(
            uri.key(),
            download_overrides(&uri, request.action),
            state.config.presigned_url_expiry,
        )
        .await?;

    info!(key = %uri.key(), action = ?request.action, "issued download link");
    Ok(ApiResponse::ok("Success", DownloadLinkResponse { url }))
}

pub async fn generate_upload_links(
    State(state): State<AppState>,
    payload: Result<Json<UploadLinksRequest>, JsonRejection>,
) -> AppResult<ApiResponse<UploadLinksResponse>> {
    let Json(request) = payload?;
    let results = issue_upload_links(
        state.storage.as_ref(),
        &state.config.uploads,
        &request.files,
    )
    .await;

    let issued = results.iter().filter(|outcome| outcome.is_issued()).count();
    info!(
        requested = request.files.len(),
        issued,
        "issued upload links"
    );
    Ok(ApiResponse::ok("Success", UploadLinksResponse { results }))
}
