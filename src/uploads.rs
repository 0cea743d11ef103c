use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::storage::ContentStore;

pub const DOCUMENT_UPLOAD_TYPE: &str = "document";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 15 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub path_prefix: String,
    pub allowed_extensions: Vec<String>,
    pub max_file_size: u64,
    pub expires_in: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            path_prefix: String::new(),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            expires_in: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Upload type '{0}' is not supported")]
    UnsupportedType(String),
    #[error("Invalid file name")]
    MissingExtension,
    #[error("File size is required")]
    MissingSize,
    #[error("File extension '{0}' not allowed")]
    ExtensionNotAllowed(String),
    #[error("File size {size} exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("{0}")]
    Presign(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileRequest {
    pub file_name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub upload_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedUpload {
    pub file_name: String,
    pub success: bool,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedUpload {
    pub file_name: String,
    pub success: bool,
    pub error: String,
}

/// Outcome for one requested file; a rejected file never fails its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UploadOutcome {
    Issued(IssuedUpload),
    Rejected(RejectedUpload),
}

impl UploadOutcome {
    pub fn is_issued(&self) -> bool {
        matches!(self, Self::Issued(_))
    }
}

/// Where an accepted file goes and the exact length its upload is signed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub key: String,
    pub content_length: u64,
}

impl UploadPolicy {
    /// Checks the request against the policy and returns the object key and
    /// declared size the upload link will be signed for.
    pub fn upload_target(&self, file: &UploadFileRequest) -> Result<UploadTarget, UploadError> {
        let upload_type = file.upload_type.as_deref().unwrap_or(DOCUMENT_UPLOAD_TYPE);
        if upload_type != DOCUMENT_UPLOAD_TYPE {
            return Err(UploadError::UnsupportedType(upload_type.to_string()));
        }

        let (base_name, extension) = file
            .file_name
            .rsplit_once('.')
            .ok_or(UploadError::MissingExtension)?;
        let extension = extension.to_ascii_lowercase();
        if !self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            return Err(UploadError::ExtensionNotAllowed(extension));
        }

        let size = file.file_size.ok_or(UploadError::MissingSize)?;
        if size > self.max_file_size {
            return Err(UploadError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }

        let prefix = self.path_prefix.trim_matches('/');
        let key = if prefix.is_empty() {
            format!("{base_name}.{extension}")
        } else {
            format!("{prefix}/{base_name}.{extension}")
        };
        Ok(UploadTarget {
            key,
            content_length: size,
        })
    }
}

/// Content type to sign into the upload: the caller's, or one guessed from
/// the file name.
fn upload_content_type(file: &UploadFileRequest) -> Option<String> {
    file.file_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            mime_guess::from_path(Path::new(&file.file_name))
                .first_raw()
                .map(str::to_string)
        })
}

async fn issue_one(
    store: &dyn ContentStore,
    policy: &UploadPolicy,
    file: &UploadFileRequest,
) -> Result<IssuedUpload, UploadError> {
    let UploadTarget {
        key,
        content_length,
    } = policy.upload_target(file)?;
    let content_type = upload_content_type(file);
    let presigned = store
        .presign_put_object(
            &key,
            content_type.as_deref(),
            content_length,
            policy.expires_in,
        )
        .await
        .map_err(|err| UploadError::Presign(err.to_string()))?;

    Ok(IssuedUpload {
        file_name: file.file_name.clone(),
        success: true,
        url: presigned.url,
        method: presigned.method,
        headers: presigned.headers,
        key,
    })
}

/// Issues presigned upload links for each file, in request order.
pub async fn issue_upload_links(
    store: &dyn ContentStore,
    policy: &UploadPolicy,
    files: &[UploadFileRequest],
) -> Vec<UploadOutcome> {
    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        match issue_one(store, policy, file).await {
            Ok(issued) => outcomes.push(UploadOutcome::Issued(issued)),
            Err(err) => {
                warn!(file_name = %file.file_name, error = %err, "upload link rejected");
                outcomes.push(UploadOutcome::Rejected(RejectedUpload {
                    file_name: file.file_name.clone(),
                    success: false,
                    error: err.to_string(),
                }));
            }
        }
    }
    outcomes
}
