//! Backend gateway: typed HTTP boundary to the session, ingestion, and chat endpoints.

pub mod client;
mod health;
pub mod types;

pub use client::{HttpGateway, RemoteGateway};
pub use types::{
    ChatAnswer, ChatQuery, Chunk, ChunkBatch, ChunkMetadata, EmbedSummary, GatewayError,
    HealthReport, QUOTA_GUIDANCE, SessionRecord,
};
