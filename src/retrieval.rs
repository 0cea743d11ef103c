use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_bedrockagentruntime::types::{
    GenerationConfiguration, KnowledgeBaseRetrievalConfiguration,
    KnowledgeBaseRetrieveAndGenerateConfiguration, KnowledgeBaseVectorSearchConfiguration,
    PromptTemplate, RetrieveAndGenerateConfiguration, RetrieveAndGenerateInput,
    RetrieveAndGenerateType, SearchType,
};
use aws_sdk_bedrockagentruntime::Client as BedrockAgentRuntimeClient;
use aws_smithy_types::{Document, Number};
use serde_json::Value;

use crate::error::ServiceError;

pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are a helpful AI assistant. Use the following context to answer the user's question accurately and helpfully. If the context doesn't contain enough information to answer the question, say so clearly.

Retrieved context: $search_results$

User question: $query$

Please provide a helpful and accurate response based on the retrieved context.";

/// Upstream answer as returned by the retrieve-and-generate call, before any
/// reshaping.
#[derive(Debug, Clone, Default)]
pub struct GeneratedAnswer {
    pub session_id: Option<String>,
    pub output_text: Option<String>,
    pub citations: Vec<CitationGroup>,
}

#[derive(Debug, Clone, Default)]
pub struct CitationGroup {
    pub retrieved_references: Vec<RetrievedReference>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievedReference {
    pub location_uri: Option<String>,
    pub content_text: Option<String>,
    pub metadata: HashMap<String, Value>,
}

#[async_trait]
pub trait RetrievalService: Send + Sync + 'static {
    async fn retrieve_and_generate(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<GeneratedAnswer, ServiceError>;
}

pub struct BedrockRetrieval {
    client: BedrockAgentRuntimeClient,
    knowledge_base_id: String,
    model_arn: String,
    number_of_results: i32,
}

impl BedrockRetrieval {
    pub fn new(
        client: BedrockAgentRuntimeClient,
        knowledge_base_id: impl Into<String>,
        model_arn: impl Into<String>,
        number_of_results: i32,
    ) -> Self {
        Self {
            client,
            knowledge_base_id: knowledge_base_id.into(),
            model_arn: model_arn.into(),
            number_of_results,
        }
    }

    fn configuration(&self) -> Result<RetrieveAndGenerateConfiguration, ServiceError> {
        let retrieval = KnowledgeBaseRetrievalConfiguration::builder()
            .vector_search_configuration(
                KnowledgeBaseVectorSearchConfiguration::builder()
                    .number_of_results(self.number_of_results)
                    .override_search_type(SearchType::Semantic)
                    .build(),
            )
            .build();

        let generation = GenerationConfiguration::builder()
            .prompt_template(
                PromptTemplate::builder()
                    .text_prompt_template(DEFAULT_PROMPT_TEMPLATE)
                    .build(),
            )
            .build();

        let knowledge_base = KnowledgeBaseRetrieveAndGenerateConfiguration::builder()
            .knowledge_base_id(&self.knowledge_base_id)
            .model_arn(&self.model_arn)
            .retrieval_configuration(retrieval)
            .generation_configuration(generation)
            .build()
            .map_err(ServiceError::unexpected)?;

        RetrieveAndGenerateConfiguration::builder()
            .r#type(RetrieveAndGenerateType::KnowledgeBase)
            .knowledge_base_configuration(knowledge_base)
            .build()
            .map_err(ServiceError::unexpected)
    }
}

#[async_trait]
impl RetrievalService for BedrockRetrieval {
    async fn retrieve_and_generate(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<GeneratedAnswer, ServiceError> {
        let input = RetrieveAndGenerateInput::builder()
            .text(query)
            .build()
            .map_err(ServiceError::unexpected)?;

        let response = self
            .client
            .retrieve_and_generate()
            .input(input)
            .retrieve_and_generate_configuration(self.configuration()?)
            .set_session_id(session_id.map(str::to_string))
            .send()
            .await
            .map_err(ServiceError::from_sdk)?;

        let citations = response
            .citations()
            .iter()
            .map(|citation| CitationGroup {
                retrieved_references: citation
                    .retrieved_references()
                    .iter()
                    .map(|reference| RetrievedReference {
                        location_uri: reference
                            .location()
                            .and_then(|location| location.s3_location())
                            .and_then(|s3| s3.uri())
                            .map(str::to_string),
                        content_text: reference
                            .content()
                            .map(|content| content.text())
                            .map(str::to_string),
                        metadata: reference
                            .metadata()
                            .map(|metadata| {
                                metadata
                                    .iter()
                                    .map(|(key, value)| (key.clone(), document_to_json(value)))
                                    .collect()
                            })
                            .unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect();

        Ok(GeneratedAnswer {
            session_id: Some(response.session_id())
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            output_text: response.output().map(|output| output.text().to_string()),
            citations,
        })
    }
}

fn document_to_json(document: &Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Bool(value) => Value::Bool(*value),
        Document::String(value) => Value::String(value.clone()),
        Document::Number(Number::PosInt(value)) => Value::from(*value),
        Document::Number(Number::NegInt(value)) => Value::from(*value),
        Document::Number(Number::Float(value)) => Value::from(*value),
        Document::Array(items) => Value::Array(items.iter().map(document_to_json).collect()),
        Document::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), document_to_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_metadata_documents() {
        let document = Document::Object(HashMap::from([
            (
                "x-amz-bedrock-kb-document-page-number".to_string(),
                Document::Number(Number::Float(4.0)),
            ),
            ("source".to_string(), Document::String("kb".to_string())),
        ]));

        let json = document_to_json(&document);
        assert_eq!(json["x-amz-bedrock-kb-document-page-number"], 4.0);
        assert_eq!(json["source"], "kb");
    }
}
