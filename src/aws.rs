use anyhow::Result;
use aws_config::{meta::region::RegionProviderChain, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_bedrockagent::Client as BedrockAgentClient;
use aws_sdk_bedrockagentruntime::Client as BedrockAgentRuntimeClient;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::config::AppConfig;

pub async fn load_sdk_config(config: &AppConfig) -> Result<SdkConfig> {
    let region = Region::new(config.aws_region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region))
        .or_default_provider()
        .or_else("us-east-1");

    #[allow(deprecated)]
    let mut loader = aws_config::from_env().region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        loader = loader.credentials_provider(credentials);
    }

    Ok(loader.load().await)
}

/// Path-style addressing is forced only for custom endpoints (LocalStack,
/// MinIO); real S3 keeps virtual-hosted URLs in presigned links.
pub fn build_s3_client(base_config: &SdkConfig, config: &AppConfig) -> S3Client {
    let s3_config = S3ConfigBuilder::from(base_config)
        .force_path_style(config.aws_endpoint_url.is_some())
        .build();

    S3Client::from_conf(s3_config)
}

pub fn build_bedrock_agent_client(base_config: &SdkConfig) -> BedrockAgentClient {
    BedrockAgentClient::new(base_config)
}

pub fn build_bedrock_runtime_client(base_config: &SdkConfig) -> BedrockAgentRuntimeClient {
    BedrockAgentRuntimeClient::new(base_config)
}
