//! Shared types used by the backend gateway: domain records, wire payloads, and errors.
//!
//! Wire structs mirror the backend's snake_case JSON; the public records are what the rest of
//! the crate works with. Conversions happen here and nowhere else.

use crate::session::SourceType;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{
    OffsetDateTime, PrimitiveDateTime,
    format_description::well_known::{Iso8601, Rfc3339},
};

/// Guidance shown instead of the raw backend text when a quota or rate limit is hit.
pub const QUOTA_GUIDANCE: &str = "API quota exceeded. The AI provider's plan limits how many embedding and chat requests can be made. Please wait a few minutes and try again, or check your API plan and usage limits.";

/// Errors returned by the backend gateway, tagged by cause.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),
    /// The request never produced a response (refused, reset, DNS, timeout).
    #[error("Cannot reach the document service at {url}: {reason}")]
    Connectivity {
        /// Endpoint that was being called.
        url: String,
        /// Transport diagnosis.
        reason: String,
    },
    /// The call was rejected locally before reaching the backend.
    #[error("{0}")]
    Validation(String),
    /// The backend answered with a non-success status.
    #[error("Service responded with {status}: {detail}")]
    Backend {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// `detail` or `error` field from the response body.
        detail: String,
    },
    /// The backend reported a quota or rate-limit condition.
    #[error("Service quota exceeded ({status}): {detail}")]
    Quota {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Raw backend message, kept for logs.
        detail: String,
    },
    /// The backend answered successfully but the payload did not match the contract.
    #[error("Malformed service response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether the failure happened at the transport level.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Whether the failure is a quota or rate-limit condition.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota { .. })
    }

    /// Whether the backend answered 404, which it does for unknown and expired sessions alike.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// Text suitable for inline display next to the triggering action.
    pub fn user_message(&self) -> String {
        match self {
            Self::Quota { .. } => QUOTA_GUIDANCE.to_string(),
            Self::Backend { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Classify a non-success response from its status and raw body.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown status")
                )
            });

        if status == StatusCode::TOO_MANY_REQUESTS || detail.to_lowercase().contains("quota") {
            Self::Quota { status, detail }
        } else {
            Self::Backend { status, detail }
        }
    }

    pub(crate) fn from_transport(url: &str, error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::Decode(error.to_string());
        }
        let reason = if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_connect() {
            format!("connection failed: {error}")
        } else {
            error.to_string()
        };
        Self::Connectivity {
            url: url.to_string(),
            reason,
        }
    }
}

/// Error payload; the backend uses either `error` or `detail`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        [self.detail, self.error]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                serde_json::Value::String(text) if !text.trim().is_empty() => Some(text),
                serde_json::Value::Null => None,
                serde_json::Value::String(_) => None,
                other => Some(other.to_string()),
            })
    }
}

/// Session record returned by create/get.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Backend-issued identifier.
    pub id: String,
    /// Expiry instant as sent by the backend.
    pub expires_at: OffsetDateTime,
    /// Source kind echoed by the backend, if present.
    pub source_type: Option<SourceType>,
    /// Creation instant, if reported.
    pub created_at: Option<OffsetDateTime>,
    /// The backend sent wall-clock readings without a UTC offset.
    ///
    /// `expires_at` and `created_at` then carry a placeholder UTC offset; only their difference
    /// is meaningful. Use [`SessionRecord::resolve_at`] rather than the raw fields.
    pub local_time: bool,
}

impl SessionRecord {
    /// Lifetime granted by the backend, when it reported a creation time.
    pub fn ttl(&self) -> Option<time::Duration> {
        self.created_at.map(|created_at| self.expires_at - created_at)
    }

    /// `(expires_at, created_at)` as absolute instants, given that the record arrived at `now`.
    ///
    /// Offset-less records are re-anchored so the granted lifetime starts at `now`, which holds
    /// whatever time zone the backend host runs in. A record without `created_at` cannot be
    /// re-anchored and keeps the UTC reading.
    pub fn resolve_at(&self, now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
        match (self.local_time, self.ttl()) {
            (true, Some(ttl)) => (now + ttl, now),
            _ => (self.expires_at, self.created_at.unwrap_or(now)),
        }
    }
}

/// Positional and source metadata attached to each chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    /// Document section heading, when detected.
    pub section: Option<String>,
    /// Page the chunk came from, when known.
    pub page_number: Option<u32>,
    /// Kind of document the chunk belongs to.
    pub source_type: SourceType,
}

/// Bounded unit of document text; the addressable unit cited by chat answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Backend-issued identifier.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Zero-based position within the document.
    pub index: usize,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// Result of the chunking stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBatch {
    /// Chunks in document order.
    pub chunks: Vec<Chunk>,
    /// Chunk total reported by the backend.
    pub total_chunks: usize,
}

/// Result of the embedding stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedSummary {
    /// Whether the backend acknowledged the batch.
    pub success: bool,
    /// Number of embeddings stored.
    pub embedding_count: usize,
}

/// Chat request against a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatQuery {
    /// Session the question is scoped to.
    pub session_id: String,
    /// Trimmed user question.
    pub query: String,
    /// Retrieval breadth.
    pub top_k: usize,
}

/// Generated answer with its supporting chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatAnswer {
    /// Answer text.
    pub answer: String,
    /// Identifiers of the chunks the answer relied on.
    pub sources: Vec<String>,
    /// Backend confidence score in `[0, 1]`.
    pub confidence: f32,
}

/// Outcome of a backend health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Whether the backend answered `/health` with a 2xx status in time.
    pub healthy: bool,
    /// Human-readable diagnosis.
    pub message: String,
    /// Base URL that was probed.
    pub service_url: String,
}

#[derive(Serialize)]
pub(crate) struct CreateSessionBody {
    pub(crate) source_type: SourceType,
}

#[derive(Serialize)]
pub(crate) struct ChunkRequestBody<'a> {
    pub(crate) text: &'a str,
    pub(crate) session_id: &'a str,
    pub(crate) source_type: SourceType,
}

#[derive(Serialize)]
pub(crate) struct EmbedRequestBody<'a> {
    pub(crate) session_id: &'a str,
    pub(crate) chunks: &'a [Chunk],
}

/// Timestamps arrive either as epoch milliseconds or as ISO 8601 text.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum WireTimestamp {
    Millis(i64),
    Text(String),
}

/// Decoded timestamp. `has_offset` is false for naive ISO text, whose instant is only a
/// wall-clock reading tagged as UTC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WireInstant {
    pub(crate) at: OffsetDateTime,
    pub(crate) has_offset: bool,
}

impl WireTimestamp {
    pub(crate) fn into_instant(self) -> Result<WireInstant, GatewayError> {
        match self {
            Self::Millis(millis) => {
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                    .map(|at| WireInstant {
                        at,
                        has_offset: true,
                    })
                    .map_err(|err| GatewayError::Decode(format!("invalid timestamp {millis}: {err}")))
            }
            Self::Text(text) => parse_timestamp(&text),
        }
    }
}

/// Parse RFC 3339 or ISO 8601 with an offset, falling back to a naive ISO 8601 reading.
pub(crate) fn parse_timestamp(text: &str) -> Result<WireInstant, GatewayError> {
    let trimmed = text.trim();
    OffsetDateTime::parse(trimmed, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(trimmed, &Iso8601::DEFAULT))
        .map(|at| WireInstant {
            at,
            has_offset: true,
        })
        .or_else(|_| {
            PrimitiveDateTime::parse(trimmed, &Iso8601::DEFAULT).map(|dt| WireInstant {
                at: dt.assume_utc(),
                has_offset: false,
            })
        })
        .map_err(|err| GatewayError::Decode(format!("invalid timestamp '{trimmed}': {err}")))
}

#[derive(Deserialize)]
pub(crate) struct SessionRecordWire {
    session_id: String,
    expires_at: WireTimestamp,
    #[serde(default)]
    source_type: Option<SourceType>,
    #[serde(default)]
    created_at: Option<WireTimestamp>,
}

impl SessionRecordWire {
    pub(crate) fn into_record(self) -> Result<SessionRecord, GatewayError> {
        if self.session_id.trim().is_empty() {
            return Err(GatewayError::Decode("session_id is empty".into()));
        }
        let expires_at = self.expires_at.into_instant()?;
        let created_at = self
            .created_at
            .map(WireTimestamp::into_instant)
            .transpose()?;
        let local_time = !expires_at.has_offset
            || created_at.is_some_and(|created_at| !created_at.has_offset);
        Ok(SessionRecord {
            id: self.session_id,
            expires_at: expires_at.at,
            source_type: self.source_type,
            created_at: created_at.map(|created_at| created_at.at),
            local_time,
        })
    }
}

#[derive(Deserialize)]
pub(crate) struct ChunkResponseWire {
    #[serde(default)]
    chunks: Vec<ChunkWire>,
    #[serde(default)]
    total_chunks: Option<usize>,
}

impl ChunkResponseWire {
    /// Convert wire chunks, filling a missing `source_type` with the requested one.
    pub(crate) fn into_batch(self, requested: SourceType) -> ChunkBatch {
        let chunks: Vec<Chunk> = self
            .chunks
            .into_iter()
            .map(|chunk| Chunk {
                id: chunk.id,
                text: chunk.text,
                index: chunk.index,
                metadata: ChunkMetadata {
                    section: chunk.metadata.section,
                    page_number: chunk.metadata.page_number,
                    source_type: chunk.metadata.source_type.unwrap_or(requested),
                },
            })
            .collect();
        let total_chunks = self.total_chunks.unwrap_or(chunks.len());
        ChunkBatch {
            chunks,
            total_chunks,
        }
    }
}

#[derive(Deserialize)]
struct ChunkWire {
    id: String,
    text: String,
    index: usize,
    #[serde(default)]
    metadata: ChunkMetadataWire,
}

#[derive(Default, Deserialize)]
struct ChunkMetadataWire {
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    source_type: Option<SourceType>,
}

#[derive(Default, Deserialize)]
pub(crate) struct EmbedResponseWire {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    embedding_count: Option<usize>,
}

impl EmbedResponseWire {
    pub(crate) fn into_summary(self, submitted: usize) -> EmbedSummary {
        EmbedSummary {
            success: self.success.unwrap_or(true),
            embedding_count: self.embedding_count.unwrap_or(submitted),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct ChatResponseWire {
    answer: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    confidence: f32,
}

impl From<ChatResponseWire> for ChatAnswer {
    fn from(wire: ChatResponseWire) -> Self {
        Self {
            answer: wire.answer,
            sources: wire.sources,
            confidence: wire.confidence.clamp(0.0, 1.0),
        }
    }
}
