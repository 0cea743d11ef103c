use std::collections::{HashMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    indexing::{IndexedDocument, IndexingService, KnowledgeBaseTarget, MAX_PAGE_SIZE},
    locator::{decode_locator, display_name, S3Uri},
    storage::ContentStore,
};

pub const STATUS_NOT_INDEXED: &str = "NOT_INDEXED";
pub const STATUS_INDEXED: &str = "INDEXED";
pub const STATUS_PARTIALLY_INDEXED: &str = "PARTIALLY_INDEXED";

pub const NOT_SYNCED_REASON: &str = "Knowledge base sync has not been triggered || Issue with knowledge base syncing check knowledge base on management console";
pub const MISSING_FROM_STORE_REASON: &str = "File not found in S3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: Uuid,
    pub knowledge_base_id: Option<String>,
    pub data_source_id: Option<String>,
    pub status: String,
    pub s3_key: String,
    pub status_reason: String,
    pub updated_at: Option<String>,
    pub display_name: String,
}

/// An object present in the content store, addressed by its full locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub locator: String,
    pub last_modified: Option<DateTime<Utc>>,
}

fn format_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
}

impl DocumentRecord {
    fn not_indexed(object: &StoredObject, locator: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            knowledge_base_id: None,
            data_source_id: None,
            status: STATUS_NOT_INDEXED.to_string(),
            display_name: display_name(&locator).to_string(),
            s3_key: locator,
            status_reason: NOT_SYNCED_REASON.to_string(),
            updated_at: format_timestamp(object.last_modified),
        }
    }

    fn indexed(document: &IndexedDocument, locator: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            knowledge_base_id: Some(document.knowledge_base_id.clone()),
            data_source_id: Some(document.data_source_id.clone()),
            status: document.status.clone(),
            display_name: display_name(&locator).to_string(),
            s3_key: locator,
            status_reason: document.status_reason.clone().unwrap_or_default(),
            updated_at: format_timestamp(document.updated_at),
        }
    }
}

/// Drains the store listing. Directory placeholders (keys ending in `/`)
/// are skipped.
pub async fn fetch_store_objects(
    store: &dyn ContentStore,
) -> Result<Vec<StoredObject>, ServiceError> {
    let mut objects = Vec::new();
    let mut continuation_token = None;
    let mut pages = 0usize;

    loop {
        let page = store.list_objects(continuation_token.take()).await?;
        pages += 1;

        objects.extend(
            page.objects
                .into_iter()
                .filter(|object| !object.key.ends_with('/'))
                .map(|object| StoredObject {
                    locator: S3Uri::new(store.bucket(), object.key).to_string(),
                    last_modified: object.last_modified,
                }),
        );

        match page.continuation_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    debug!(pages, objects = objects.len(), "listed content store");
    Ok(objects)
}

/// Pages through the index until `max_results` documents have been fetched
/// or the service stops returning a continuation token.
pub async fn fetch_indexed_documents(
    index: &dyn IndexingService,
    target: &KnowledgeBaseTarget,
    max_results: usize,
) -> Result<Vec<IndexedDocument>, ServiceError> {
    let mut documents = Vec::new();
    let mut next_token = None;

    while documents.len() < max_results {
        let page_size = (max_results - documents.len()).min(MAX_PAGE_SIZE);
        let page = index
            .list_documents(target, page_size, next_token.take())
            .await?;
        documents.extend(page.documents);

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    debug!(documents = documents.len(), max_results, "listed indexed documents");
    Ok(documents)
}

/// Merges the store listing with the indexed listing, keyed by decoded
/// locator. Each decoded locator is emitted once: index records win for
/// locators present in both, store-only objects are reported as not indexed
/// (the first of several raw keys decoding to the same locator wins), and
/// index-only documents keep their status but are flagged as missing from
/// the store. Output is sorted by `updatedAt` descending, absent timestamps
/// last.
pub fn reconcile_documents(
    stored: &[StoredObject],
    indexed: &[IndexedDocument],
) -> Vec<DocumentRecord> {
    let indexed_locators: Vec<String> = indexed
        .iter()
        .map(|document| decode_locator(&document.locator).into_owned())
        .collect();

    let mut lookup: HashMap<&str, &IndexedDocument> = HashMap::with_capacity(indexed.len());
    for (locator, document) in indexed_locators.iter().zip(indexed) {
        lookup.entry(locator.as_str()).or_insert(document);
    }

    let mut seen: HashSet<String> = HashSet::with_capacity(stored.len() + indexed.len());
    let mut merged = Vec::with_capacity(stored.len() + indexed.len());

    for object in stored {
        let locator = decode_locator(&object.locator).into_owned();
        if !seen.insert(locator.clone()) {
            debug!(raw = %object.locator, %locator, "store key collides with an earlier key");
            continue;
        }
        match lookup.get(locator.as_str()) {
            Some(document) => merged.push(DocumentRecord::indexed(document, locator)),
            None => merged.push(DocumentRecord::not_indexed(object, locator)),
        }
    }

    for locator in &indexed_locators {
        if !seen.insert(locator.clone()) {
            continue;
        }
        let document = lookup[locator.as_str()];
        let mut record = DocumentRecord::indexed(document, locator.clone());
        record.status_reason = MISSING_FROM_STORE_REASON.to_string();
        merged.push(record);
    }

    merged.sort_by(|a, b| {
        let a = a.updated_at.as_deref().unwrap_or("");
        let b = b.updated_at.as_deref().unwrap_or("");
        b.cmp(a)
    });
    merged
}

/// Fetches both listings and reconciles them. Either fetch failing fails
/// the whole listing.
pub async fn list_documents(
    store: &dyn ContentStore,
    index: &dyn IndexingService,
    target: &KnowledgeBaseTarget,
    max_results: usize,
) -> Result<Vec<DocumentRecord>, ServiceError> {
    let stored = fetch_store_objects(store).await?;
    let indexed = fetch_indexed_documents(index, target, max_results).await?;
    let merged = reconcile_documents(&stored, &indexed);

    info!(
        stored = stored.len(),
        indexed = indexed.len(),
        merged = merged.len(),
        "reconciled document listings"
    );
    Ok(merged)
}
