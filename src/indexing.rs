use async_trait::async_trait;
use aws_sdk_bedrockagent::Client as BedrockAgentClient;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{error::ServiceError, storage::to_chrono};

/// Service-side page size ceiling for document listings.
pub const MAX_PAGE_SIZE: usize = 100;

/// The knowledge base and data source every indexing call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseTarget {
    pub knowledge_base_id: String,
    pub data_source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub locator: String,
    pub knowledge_base_id: String,
    pub data_source_id: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexedPage {
    pub documents: Vec<IndexedDocument>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionJob {
    pub ingestion_job_id: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait IndexingService: Send + Sync + 'static {
    async fn list_documents(
        &self,
        target: &KnowledgeBaseTarget,
        max_results: usize,
        next_token: Option<String>,
    ) -> Result<IndexedPage, ServiceError>;

    async fn start_ingestion_job(
        &self,
        target: &KnowledgeBaseTarget,
        description: &str,
    ) -> Result<IngestionJob, ServiceError>;
}

pub struct BedrockKnowledgeBase {
    client: BedrockAgentClient,
}

impl BedrockKnowledgeBase {
    pub fn new(client: BedrockAgentClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IndexingService for BedrockKnowledgeBase {
    async fn list_documents(
        &self,
        target: &KnowledgeBaseTarget,
        max_results: usize,
        next_token: Option<String>,
    ) -> Result<IndexedPage, ServiceError> {
        let page_size = max_results.clamp(1, MAX_PAGE_SIZE) as i32;
        let response = self
            .client
            .list_knowledge_base_documents()
            .knowledge_base_id(&target.knowledge_base_id)
            .data_source_id(&target.data_source_id)
            .max_results(page_size)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let mut documents = Vec::with_capacity(response.document_details().len());
        for detail in response.document_details() {
            let Some(location) = detail.identifier().and_then(|identifier| identifier.s3())
            else {
                warn!(
                    knowledge_base_id = %detail.knowledge_base_id(),
                    status = %detail.status().as_str(),
                    "skipping indexed document without an s3 identifier"
                );
                continue;
            };

            documents.push(IndexedDocument {
                locator: location.uri().to_string(),
                knowledge_base_id: detail.knowledge_base_id().to_string(),
                data_source_id: detail.data_source_id().to_string(),
                status: detail.status().as_str().to_string(),
                status_reason: detail.status_reason().map(str::to_string),
                updated_at: detail.updated_at().and_then(to_chrono),
            });
        }

        Ok(IndexedPage {
            documents,
            next_token: response.next_token().map(str::to_string),
        })
    }

    async fn start_ingestion_job(
        &self,
        target: &KnowledgeBaseTarget,
        description: &str,
    ) -> Result<IngestionJob, ServiceError> {
        let response = self
            .client
            .start_ingestion_job()
            .knowledge_base_id(&target.knowledge_base_id)
            .data_source_id(&target.data_source_id)
            .description(description)
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let job = response
            .ingestion_job()
            .ok_or_else(|| ServiceError::unexpected("ingestion job missing from response"))?;

        Ok(IngestionJob {
            ingestion_job_id: job.ingestion_job_id().to_string(),
            status: job.status().as_str().to_string(),
            started_at: to_chrono(job.started_at()),
        })
    }
}
