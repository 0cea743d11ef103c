use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use kb_chatbot::citations::CitationOptions;
use kb_chatbot::config::AppConfig;
use kb_chatbot::error::ServiceError;
use kb_chatbot::indexing::{
    IndexedDocument, IndexedPage, IndexingService, IngestionJob, KnowledgeBaseTarget,
};
use kb_chatbot::retrieval::{GeneratedAnswer, RetrievalService};
use kb_chatbot::routes;
use kb_chatbot::state::AppState;
use kb_chatbot::storage::{
    ContentStore, DeleteOutcome, DownloadOverrides, ObjectPage, ObjectSummary, PresignedUpload,
};
use kb_chatbot::uploads::UploadPolicy;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

pub const TEST_BUCKET: &str = "kb-test-bucket";

#[allow(dead_code)]
pub fn upstream_error(status: u16, code: &str) -> ServiceError {
    ServiceError::Upstream {
        status,
        code: code.to_string(),
        message: format!("{code} raised by fake"),
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        cors_allowed_origin: None,
        aws_endpoint_url: None,
        aws_access_key_id: None,
        aws_secret_access_key: None,
        aws_region: "us-east-1".to_string(),
        knowledge_base_bucket: TEST_BUCKET.to_string(),
        knowledge_base_id: "kb-test".to_string(),
        data_source_id: "ds-test".to_string(),
        model_arn: "arn:aws:bedrock:us-east-1::foundation-model/test".to_string(),
        document_limit: 100,
        retrieval_result_count: 5,
        presigned_url_expiry: Duration::from_secs(600),
        uploads: UploadPolicy::default(),
        citations: CitationOptions::default(),
    }
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Vec<ObjectSummary>,
    page_size: usize,
    undeletable: HashSet<String>,
    list_failure: Option<(u16, String)>,
    list_calls: Mutex<Vec<Option<String>>>,
    delete_calls: Mutex<Vec<Vec<String>>>,
    presigned_gets: Mutex<Vec<(String, DownloadOverrides)>>,
    presigned_puts: Mutex<Vec<(String, u64)>>,
}

#[allow(dead_code)]
impl FakeStorage {
    pub fn with_objects(objects: Vec<ObjectSummary>, page_size: usize) -> Self {
        Self {
            objects,
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    pub fn failing_list(status: u16, code: &str) -> Self {
        Self {
            list_failure: Some((status, code.to_string())),
            ..Self::default()
        }
    }

    pub fn refuse_delete(mut self, key: &str) -> Self {
        self.undeletable.insert(key.to_string());
        self
    }

    pub async fn list_calls(&self) -> Vec<Option<String>> {
        self.list_calls.lock().await.clone()
    }

    pub async fn delete_calls(&self) -> Vec<Vec<String>> {
        self.delete_calls.lock().await.clone()
    }

    pub async fn presigned_gets(&self) -> Vec<(String, DownloadOverrides)> {
        self.presigned_gets.lock().await.clone()
    }

    pub async fn presigned_puts(&self) -> Vec<(String, u64)> {
        self.presigned_puts.lock().await.clone()
    }
}

#[async_trait]
impl ContentStore for FakeStorage {
    fn bucket(&self) -> &str {
        TEST_BUCKET
    }

    async fn list_objects(
        &self,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage, ServiceError> {
        self.list_calls.lock().await.push(continuation_token.clone());
        if let Some((status, code)) = &self.list_failure {
            return Err(upstream_error(*status, code));
        }

        let page_size = self.page_size.max(1);
        let start: usize = match continuation_token {
            Some(token) => token
                .parse()
                .map_err(|_| ServiceError::unexpected("bad continuation token"))?,
            None => 0,
        };
        let end = (start + page_size).min(self.objects.len());
        let objects = self.objects.get(start..end).unwrap_or_default().to_vec();

        Ok(ObjectPage {
            objects,
            continuation_token: (end < self.objects.len()).then(|| end.to_string()),
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<DeleteOutcome, ServiceError> {
        self.delete_calls.lock().await.push(keys.to_vec());
        let (failed, deleted): (Vec<String>, Vec<String>) = keys
            .iter()
            .cloned()
            .partition(|key| self.undeletable.contains(key));
        Ok(DeleteOutcome { deleted, failed })
    }

    async fn presign_get_object(
        &self,
        key: &str,
        overrides: DownloadOverrides,
        expires_in: Duration,
    ) -> Result<String, ServiceError> {
        self.presigned_gets
            .lock()
            .await
            .push((key.to_string(), overrides));
        Ok(format!(
            "https://fake-storage/{TEST_BUCKET}/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn presign_put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        content_length: u64,
        expires_in: Duration,
    ) -> Result<PresignedUpload, ServiceError> {
        self.presigned_puts
            .lock()
            .await
            .push((key.to_string(), content_length));
        let mut headers = BTreeMap::new();
        headers.insert("content-length".to_string(), content_length.to_string());
        if let Some(content_type) = content_type {
            headers.insert("content-type".to_string(), content_type.to_string());
        }
        Ok(PresignedUpload {
            url: format!(
                "https://fake-storage/{TEST_BUCKET}/{key}?expires_in={}",
                expires_in.as_secs()
            ),
            method: "PUT".to_string(),
            headers,
        })
    }
}

#[derive(Default)]
pub struct FakeIndex {
    documents: Vec<IndexedDocument>,
    page_size: usize,
    list_failure: Option<(u16, String)>,
    list_requests: Mutex<Vec<usize>>,
    ingestion_jobs: Mutex<Vec<(KnowledgeBaseTarget, String)>>,
}

#[allow(dead_code)]
impl FakeIndex {
    pub fn with_documents(documents: Vec<IndexedDocument>, page_size: usize) -> Self {
        Self {
            documents,
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    pub fn failing_list(status: u16, code: &str) -> Self {
        Self {
            list_failure: Some((status, code.to_string())),
            ..Self::default()
        }
    }

    pub async fn list_requests(&self) -> Vec<usize> {
        self.list_requests.lock().await.clone()
    }

    pub async fn ingestion_jobs(&self) -> Vec<(KnowledgeBaseTarget, String)> {
        self.ingestion_jobs.lock().await.clone()
    }
}

#[async_trait]
impl IndexingService for FakeIndex {
    async fn list_documents(
        &self,
        _target: &KnowledgeBaseTarget,
        max_results: usize,
        next_token: Option<String>,
    ) -> Result<IndexedPage, ServiceError> {
        self.list_requests.lock().await.push(max_results);
        if let Some((status, code)) = &self.list_failure {
            return Err(upstream_error(*status, code));
        }

        let start: usize = next_token.map_or(Ok(0), |token| {
            token
                .parse()
                .map_err(|_| ServiceError::unexpected("bad next token"))
        })?;
        let end = (start + max_results.min(self.page_size.max(1))).min(self.documents.len());
        let documents = self.documents.get(start..end).unwrap_or_default().to_vec();

        Ok(IndexedPage {
            documents,
            next_token: (end < self.documents.len()).then(|| end.to_string()),
        })
    }

    async fn start_ingestion_job(
        &self,
        target: &KnowledgeBaseTarget,
        description: &str,
    ) -> Result<IngestionJob, ServiceError> {
        let mut jobs = self.ingestion_jobs.lock().await;
        jobs.push((target.clone(), description.to_string()));
        Ok(IngestionJob {
            ingestion_job_id: format!("job-{}", jobs.len()),
            status: "STARTING".to_string(),
            started_at: None,
        })
    }
}

#[derive(Default)]
pub struct FakeRetrieval {
    answer: Option<GeneratedAnswer>,
    failure: Option<(u16, String)>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

#[allow(dead_code)]
impl FakeRetrieval {
    pub fn answering(answer: GeneratedAnswer) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }

    pub fn failing(status: u16, code: &str) -> Self {
        Self {
            failure: Some((status, code.to_string())),
            ..Self::default()
        }
    }

    pub async fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl RetrievalService for FakeRetrieval {
    async fn retrieve_and_generate(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<GeneratedAnswer, ServiceError> {
        self.requests
            .lock()
            .await
            .push((query.to_string(), session_id.map(str::to_string)));
        if let Some((status, code)) = &self.failure {
            return Err(upstream_error(*status, code));
        }
        self.answer
            .clone()
            .ok_or_else(|| ServiceError::unexpected("no answer configured"))
    }
}

pub struct TestApp {
    router: Router,
    storage: Arc<FakeStorage>,
    index: Arc<FakeIndex>,
    retrieval: Arc<FakeRetrieval>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn new(storage: FakeStorage, index: FakeIndex, retrieval: FakeRetrieval) -> Self {
        Self::with_config(test_config(), storage, index, retrieval)
    }

    pub fn with_config(
        config: AppConfig,
        storage: FakeStorage,
        index: FakeIndex,
        retrieval: FakeRetrieval,
    ) -> Self {
        let storage = Arc::new(storage);
        let index = Arc::new(index);
        let retrieval = Arc::new(retrieval);
        let state = AppState::new(config, storage.clone(), index.clone(), retrieval.clone());

        Self {
            router: routes::create_router(state),
            storage,
            index,
            retrieval,
        }
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn index(&self) -> Arc<FakeIndex> {
        self.index.clone()
    }

    pub fn retrieval(&self) -> Arc<FakeRetrieval> {
        self.retrieval.clone()
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<(StatusCode, Value)> {
        let body = serde_json::to_vec(payload)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn post_raw(&self, path: &str, body: &'static str) -> Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        let response = self.get_response(path).await?;
        into_status_and_json(response).await
    }

    pub async fn get_response(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.dispatch(request).await?;
        into_status_and_json(response).await
    }
}

async fn into_status_and_json(response: hyper::Response<Body>) -> Result<(StatusCode, Value)> {
    let status = response.status();
    let bytes = body_to_vec(response.into_body()).await?;
    let json = serde_json::from_slice(&bytes)
        .map_err(|err| anyhow!("response body is not JSON ({err}): {bytes:?}"))?;
    Ok((status, json))
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}
