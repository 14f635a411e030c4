//! HTTP client wrapper for the retrieval/generation backend.

use crate::config::Config;
use crate::gateway::health::probe_health;
use crate::gateway::types::{
    ChatAnswer, ChatQuery, ChatResponseWire, Chunk, ChunkBatch, ChunkRequestBody,
    ChunkResponseWire, CreateSessionBody, EmbedRequestBody, EmbedResponseWire, EmbedSummary,
    GatewayError, HealthReport, SessionRecord, SessionRecordWire,
};
use crate::session::SourceType;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Typed boundary to the backend's session, ingestion, chat, and health endpoints.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Create a session scoped to `source_type`.
    async fn create_session(&self, source_type: SourceType)
    -> Result<SessionRecord, GatewayError>;

    /// Delete a session and everything ingested into it.
    async fn delete_session(&self, session_id: &str) -> Result<(), GatewayError>;

    /// Fetch the backend's record of a session.
    async fn get_session(&self, session_id: &str) -> Result<SessionRecord, GatewayError>;

    /// Split `text` into chunks stored under the session.
    async fn chunk_text(
        &self,
        session_id: &str,
        text: &str,
        source_type: SourceType,
    ) -> Result<ChunkBatch, GatewayError>;

    /// Embed previously produced chunks into the session's vector index.
    async fn embed_chunks(
        &self,
        session_id: &str,
        chunks: &[Chunk],
    ) -> Result<EmbedSummary, GatewayError>;

    /// Ask a question grounded in the session's chunks.
    async fn chat(&self, query: ChatQuery) -> Result<ChatAnswer, GatewayError>;

    /// Probe backend reachability. Never fails; problems are reported in the result.
    async fn health(&self) -> HealthReport;
}

/// [`RemoteGateway`] over HTTP/JSON.
pub struct HttpGateway {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) health_timeout: Duration,
}

impl HttpGateway {
    /// Construct a client for `base_url`.
    pub fn new(base_url: &str, health_timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent("resumelens/0.1")
            .build()
            .map_err(|err| GatewayError::InvalidUrl(err.to_string()))?;
        let base_url = normalize_base_url(base_url).map_err(GatewayError::InvalidUrl)?;
        tracing::debug!(url = %base_url, ?health_timeout, "Initialized backend HTTP client");

        Ok(Self {
            client,
            base_url,
            health_timeout,
        })
    }

    /// Construct a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        Self::new(&config.service_url, config.health_timeout())
    }

    /// Normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> (String, reqwest::RequestBuilder) {
        let url = format_endpoint(&self.base_url, path);
        let builder = self.client.request(method, &url);
        (url, builder)
    }

    async fn send(
        &self,
        url: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = builder
            .send()
            .await
            .map_err(|err| GatewayError::from_transport(url, err))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = GatewayError::from_response(status, &body);
        tracing::error!(url, error = %error, "Backend request failed");
        Err(error)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(url, builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn create_session(
        &self,
        source_type: SourceType,
    ) -> Result<SessionRecord, GatewayError> {
        let (url, builder) = self.request(Method::POST, "api/session/create");
        let wire: SessionRecordWire = self
            .send_json(&url, builder.json(&CreateSessionBody { source_type }))
            .await?;
        let record = wire.into_record()?;
        tracing::debug!(session_id = %record.id, %source_type, "Session created");
        Ok(record)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), GatewayError> {
        let path = session_path(session_id)?;
        let (url, builder) = self.request(Method::DELETE, &path);
        self.send(&url, builder).await?;
        tracing::debug!(session_id, "Session deleted");
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionRecord, GatewayError> {
        let path = session_path(session_id)?;
        let (url, builder) = self.request(Method::GET, &path);
        let wire: SessionRecordWire = self.send_json(&url, builder).await?;
        wire.into_record()
    }

    async fn chunk_text(
        &self,
        session_id: &str,
        text: &str,
        source_type: SourceType,
    ) -> Result<ChunkBatch, GatewayError> {
        let (url, builder) = self.request(Method::POST, "api/chunk");
        let body = ChunkRequestBody {
            text,
            session_id,
            source_type,
        };
        let wire: ChunkResponseWire = self.send_json(&url, builder.json(&body)).await?;
        let batch = wire.into_batch(source_type);
        tracing::debug!(
            session_id,
            chunks = batch.chunks.len(),
            total_chunks = batch.total_chunks,
            "Document chunked"
        );
        Ok(batch)
    }

    async fn embed_chunks(
        &self,
        session_id: &str,
        chunks: &[Chunk],
    ) -> Result<EmbedSummary, GatewayError> {
        let (url, builder) = self.request(Method::POST, "api/embed");
        let body = EmbedRequestBody { session_id, chunks };
        let wire: EmbedResponseWire = self.send_json(&url, builder.json(&body)).await?;
        let summary = wire.into_summary(chunks.len());
        if !summary.success {
            return Err(GatewayError::Decode(
                "backend reported an unsuccessful embedding run".into(),
            ));
        }
        tracing::debug!(
            session_id,
            embeddings = summary.embedding_count,
            "Chunks embedded"
        );
        Ok(summary)
    }

    async fn chat(&self, query: ChatQuery) -> Result<ChatAnswer, GatewayError> {
        let (url, builder) = self.request(Method::POST, "api/rag/chat");
        let wire: ChatResponseWire = self.send_json(&url, builder.json(&query)).await?;
        Ok(wire.into())
    }

    async fn health(&self) -> HealthReport {
        probe_health(&self.client, &self.base_url, self.health_timeout).await
    }
}

fn session_path(session_id: &str) -> Result<String, GatewayError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '?', '#']) {
        return Err(GatewayError::Validation(format!(
            "Invalid session id: '{session_id}'"
        )));
    }
    Ok(format!("api/session/{trimmed}"))
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
