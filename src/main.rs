use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use kb_chatbot::aws::{
    build_bedrock_agent_client, build_bedrock_runtime_client, build_s3_client, load_sdk_config,
};
use kb_chatbot::config::AppConfig;
use kb_chatbot::indexing::BedrockKnowledgeBase;
use kb_chatbot::retrieval::BedrockRetrieval;
use kb_chatbot::routes;
use kb_chatbot::state::AppState;
use kb_chatbot::storage::S3Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        server_host = %config.server_host,
        server_port = config.server_port,
        aws_region = %config.aws_region,
        custom_endpoint = config.aws_endpoint_url.is_some(),
        bucket = %config.knowledge_base_bucket,
        knowledge_base_id = %config.knowledge_base_id,
        data_source_id = %config.data_source_id,
        citation_field = ?config.citations.field,
        citation_timestamps = ?config.citations.timestamps,
        strip_citation_markers = config.citations.strip_markers,
        "loaded backend configuration"
    );

    let sdk_config = load_sdk_config(&config).await?;
    let storage = Arc::new(S3Storage::new(
        build_s3_client(&sdk_config, &config),
        config.knowledge_base_bucket.clone(),
    ));
    let knowledge_base = Arc::new(BedrockKnowledgeBase::new(build_bedrock_agent_client(
        &sdk_config,
    )));
    let retrieval = Arc::new(BedrockRetrieval::new(
        build_bedrock_runtime_client(&sdk_config),
        config.knowledge_base_id.clone(),
        config.model_arn.clone(),
        config.retrieval_result_count,
    ));

    let listen_addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    let state = AppState::new(config, storage, knowledge_base, retrieval);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received shutdown signal");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
