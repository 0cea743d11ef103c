use std::sync::Arc;

use crate::{
    config::AppConfig, indexing::IndexingService, retrieval::RetrievalService,
    storage::ContentStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ContentStore>,
    pub knowledge_base: Arc<dyn IndexingService>,
    pub retrieval: Arc<dyn RetrievalService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ContentStore>,
        knowledge_base: Arc<dyn IndexingService>,
        retrieval: Arc<dyn RetrievalService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            knowledge_base,
            retrieval,
        }
    }
}
