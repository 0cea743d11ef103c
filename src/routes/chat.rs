use axum::extract::{rejection::JsonRejection, Json, State};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ApiResponse;
use crate::citations::{format_answer, AssistantMessage};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// A chat turn as sent by the frontend: either bare text or a message
/// object with `content`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum ChatMessage {
    Text(String),
    Message { content: String },
}

impl ChatMessage {
    fn text(&self) -> &str {
        match self {
            ChatMessage::Text(text) => text,
            ChatMessage::Message { content } => content,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub assistant_message: AssistantMessage,
    pub session_id: String,
}

impl QueryRequest {
    /// The latest message is the question; earlier turns live in the
    /// upstream session.
    fn query(&self) -> AppResult<&str> {
        self.messages
            .last()
            .map(|message| message.text().trim())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AppError::bad_request("messages must end with a non-empty query"))
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

pub async fn query_knowledge_base(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> AppResult<ApiResponse<QueryResponse>> {
    let Json(request) = payload?;
    let query = request.query()?;
    let resumed = request.session_id();
    debug!(resumed_session = ?resumed, "querying knowledge base");

    let answer = state
        .retrieval
        .retrieve_and_generate(query, resumed)
        .await?;
    let message = format_answer(&answer, &state.config.citations).map_err(AppError::internal)?;

    info!(
        session_id = %message.session_id,
        citations = message.citation.len(),
        "generated assistant answer"
    );

    let session_id = message.session_id.clone();
    Ok(ApiResponse::ok(
        "Success",
        QueryResponse {
            assistant_message: message,
            session_id,
        },
    ))
}
