use std::{collections::HashMap, str::FromStr};

use chrono::{Local, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    locator::{LocatorError, S3Uri},
    retrieval::{GeneratedAnswer, RetrievedReference},
};

pub const ASSISTANT_ROLE: &str = "assistant";
pub const PAGE_NUMBER_METADATA_KEY: &str = "x-amz-bedrock-kb-document-page-number";
pub const UNKNOWN_PAGE: &str = "Unknown";

static CITATION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%\[(\d+)\]%").expect("valid citation marker pattern"));
static REPEATED_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*,(?:\s*,)+").expect("valid repeated comma pattern"));
static COMMA_BEFORE_COLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*:").expect("valid comma colon pattern"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Which locator a citation carries next to its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CitationField {
    /// The verbatim excerpt the answer was grounded on.
    #[default]
    Text,
    /// The page the excerpt came from, or `"Unknown"`.
    Page,
}

impl FromStr for CitationField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "page" => Ok(Self::Page),
            other => Err(format!("unknown citation field '{other}', expected text or page")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampStyle {
    /// Local wall-clock time without an offset.
    #[default]
    Naive,
    /// UTC with an explicit `+00:00` offset.
    Utc,
}

impl FromStr for TimestampStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "naive" | "local" => Ok(Self::Naive),
            "utc" => Ok(Self::Utc),
            other => Err(format!("unknown timestamp style '{other}', expected naive or utc")),
        }
    }
}

impl TimestampStyle {
    pub fn now(self) -> String {
        match self {
            Self::Naive => Local::now()
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            Self::Utc => Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitationOptions {
    pub field: CitationField,
    pub timestamps: TimestampStyle,
    pub strip_markers: bool,
}

impl Default for CitationOptions {
    fn default() -> Self {
        Self {
            field: CitationField::default(),
            timestamps: TimestampStyle::default(),
            strip_markers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PageNumber {
    Number(u64),
    Label(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageNumber>,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    pub id: Uuid,
    pub role: &'static str,
    pub content: String,
    pub citation: Vec<CitationReference>,
    pub timestamp: String,
    pub session_id: String,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("retrieval response has no session id")]
    MissingSessionId,
    #[error("retrieval response has no output text")]
    MissingOutput,
    #[error("citation {group}.{reference} has no source location")]
    MissingLocation { group: usize, reference: usize },
    #[error("citation {group}.{reference} has no excerpt text")]
    MissingExcerpt { group: usize, reference: usize },
    #[error("citation {group}.{reference}: {source}")]
    InvalidLocation {
        group: usize,
        reference: usize,
        #[source]
        source: LocatorError,
    },
}

/// Rewrites inline `%[n]%` markers to `[n]` and tidies the punctuation and
/// spacing the markers leave behind.
pub fn clean_answer_text(raw: &str) -> String {
    let text = CITATION_MARKER.replace_all(raw, "[$1]");
    let text = REPEATED_COMMA.replace_all(&text, ",");
    let text = COMMA_BEFORE_COLON.replace_all(&text, ":");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    text.trim().to_string()
}

fn page_number(metadata: &HashMap<String, Value>) -> PageNumber {
    match metadata.get(PAGE_NUMBER_METADATA_KEY) {
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.fract() == 0.0 && *value >= 0.0)
                    .map(|value| value as u64)
            })
            .map(PageNumber::Number)
            .unwrap_or(PageNumber::Label(UNKNOWN_PAGE)),
        Some(Value::String(raw)) => raw
            .trim()
            .parse()
            .map(PageNumber::Number)
            .unwrap_or(PageNumber::Label(UNKNOWN_PAGE)),
        _ => PageNumber::Label(UNKNOWN_PAGE),
    }
}

fn citation_reference(
    reference: &RetrievedReference,
    field: CitationField,
    group: usize,
    index: usize,
) -> Result<CitationReference, FormatError> {
    let uri = reference
        .location_uri
        .as_deref()
        .ok_or(FormatError::MissingLocation {
            group,
            reference: index,
        })?;
    let location = S3Uri::parse(uri).map_err(|source| FormatError::InvalidLocation {
        group,
        reference: index,
        source,
    })?;
    let file = location.file_name().to_string();

    Ok(match field {
        CitationField::Text => {
            let text = reference
                .content_text
                .clone()
                .ok_or(FormatError::MissingExcerpt {
                    group,
                    reference: index,
                })?;
            CitationReference {
                text: Some(text),
                page: None,
                file,
            }
        }
        CitationField::Page => CitationReference {
            text: None,
            page: Some(page_number(&reference.metadata)),
            file,
        },
    })
}

/// Flattens citation groups into one list in group-then-reference order.
pub fn flatten_citations(
    answer: &GeneratedAnswer,
    field: CitationField,
) -> Result<Vec<CitationReference>, FormatError> {
    let mut references = Vec::new();
    for (group_index, group) in answer.citations.iter().enumerate() {
        for (index, reference) in group.retrieved_references.iter().enumerate() {
            references.push(citation_reference(reference, field, group_index, index)?);
        }
    }
    Ok(references)
}

pub fn format_answer(
    answer: &GeneratedAnswer,
    options: &CitationOptions,
) -> Result<AssistantMessage, FormatError> {
    let session_id = answer
        .session_id
        .clone()
        .ok_or(FormatError::MissingSessionId)?;
    let raw = answer
        .output_text
        .as_deref()
        .ok_or(FormatError::MissingOutput)?;

    let content = if options.strip_markers {
        clean_answer_text(raw)
    } else {
        raw.to_string()
    };

    Ok(AssistantMessage {
        id: Uuid::new_v4(),
        role: ASSISTANT_ROLE,
        content,
        citation: flatten_citations(answer, options.field)?,
        timestamp: options.timestamps.now(),
        session_id,
    })
}
