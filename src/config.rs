use std::{env, time::Duration};

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::{
    citations::{CitationField, CitationOptions, TimestampStyle},
    indexing::KnowledgeBaseTarget,
    uploads::{UploadPolicy, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_FILE_SIZE},
};

pub const DEFAULT_DOCUMENT_LIMIT: usize = 100;
pub const DEFAULT_RETRIEVAL_RESULT_COUNT: i32 = 5;
pub const DEFAULT_PRESIGNED_URL_EXPIRY_SECONDS: u64 = 3600;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub knowledge_base_bucket: String,
    pub knowledge_base_id: String,
    pub data_source_id: String,
    pub model_arn: String,
    pub document_limit: usize,
    pub retrieval_result_count: i32,
    pub presigned_url_expiry: Duration,
    pub uploads: UploadPolicy,
    pub citations: CitationOptions,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL")
            .ok()
            .map(|raw| validate_endpoint(&raw))
            .transpose()?;
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let knowledge_base_bucket =
            env::var("KNOWLEDGE_BASE_BUCKET").context("KNOWLEDGE_BASE_BUCKET must be set")?;
        let knowledge_base_id =
            env::var("KNOWLEDGE_BASE_ID").context("KNOWLEDGE_BASE_ID must be set")?;
        let data_source_id = env::var("DATA_SOURCE_ID").context("DATA_SOURCE_ID must be set")?;
        let model_arn = env::var("MODEL_ARN").context("MODEL_ARN must be set")?;
        let document_limit = env::var("KNOWLEDGE_BASE_DOCUMENT_LIMIT")
            .ok()
            .map(|value| value.parse())
            .transpose()
            .context("KNOWLEDGE_BASE_DOCUMENT_LIMIT must be a positive integer")?
            .unwrap_or(DEFAULT_DOCUMENT_LIMIT);
        let retrieval_result_count = env::var("RETRIEVAL_RESULT_COUNT")
            .ok()
            .map(|value| value.parse())
            .transpose()
            .context("RETRIEVAL_RESULT_COUNT must be an integer")?
            .unwrap_or(DEFAULT_RETRIEVAL_RESULT_COUNT);
        let presigned_url_expiry = Duration::from_secs(
            env::var("PRESIGNED_URL_EXPIRY_SECONDS")
                .unwrap_or_else(|_| DEFAULT_PRESIGNED_URL_EXPIRY_SECONDS.to_string())
                .parse()
                .context("PRESIGNED_URL_EXPIRY_SECONDS must be an integer")?,
        );

        let uploads = UploadPolicy {
            path_prefix: env::var("UPLOAD_PATH_PREFIX").unwrap_or_default(),
            allowed_extensions: env::var("UPLOAD_ALLOWED_EXTENSIONS")
                .map(|raw| parse_extensions(&raw))
                .unwrap_or_else(|_| {
                    DEFAULT_ALLOWED_EXTENSIONS
                        .iter()
                        .map(|ext| ext.to_string())
                        .collect()
                }),
            max_file_size: env::var("UPLOAD_MAX_FILE_SIZE")
                .unwrap_or_else(|_| DEFAULT_MAX_FILE_SIZE.to_string())
                .parse()
                .context("UPLOAD_MAX_FILE_SIZE must be an integer")?,
            expires_in: presigned_url_expiry,
        };

        let citations = CitationOptions {
            field: env::var("CITATION_FIELD")
                .ok()
                .map(|value| value.parse::<CitationField>())
                .transpose()
                .map_err(|err| anyhow!(err))
                .context("CITATION_FIELD is invalid")?
                .unwrap_or_default(),
            timestamps: env::var("CITATION_TIMESTAMPS")
                .ok()
                .map(|value| value.parse::<TimestampStyle>())
                .transpose()
                .map_err(|err| anyhow!(err))
                .context("CITATION_TIMESTAMPS is invalid")?
                .unwrap_or_default(),
            strip_markers: env::var("STRIP_CITATION_MARKERS")
                .map(|value| parse_flag(&value))
                .unwrap_or(true),
        };

        Ok(Self {
            server_host,
            server_port,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            knowledge_base_bucket,
            knowledge_base_id,
            data_source_id,
            model_arn,
            document_limit,
            retrieval_result_count,
            presigned_url_expiry,
            uploads,
            citations,
        })
    }

    pub fn knowledge_base_target(&self) -> KnowledgeBaseTarget {
        KnowledgeBaseTarget {
            knowledge_base_id: self.knowledge_base_id.clone(),
            data_source_id: self.data_source_id.clone(),
        }
    }
}

fn validate_endpoint(raw: &str) -> Result<String> {
    Url::parse(raw).with_context(|| format!("AWS_ENDPOINT_URL '{raw}' is not a valid URL"))?;
    Ok(raw.to_string())
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
