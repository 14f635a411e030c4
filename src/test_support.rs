//! Scripted gateway and service harness shared by unit tests.

use crate::chat::ChatOrchestrator;
use crate::clock::{Clock, ManualClock};
use crate::extraction::LocalTextExtractor;
use crate::gateway::{
    ChatAnswer, ChatQuery, Chunk, ChunkBatch, ChunkMetadata, EmbedSummary, GatewayError,
    HealthReport, RemoteGateway, SessionRecord,
};
use crate::metrics::UsageMetrics;
use crate::pipeline::DocumentPipeline;
use crate::session::{SessionController, SourceType};
use crate::storage::{MemorySessionStorage, SessionStorage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::macros::datetime;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GatewayCall {
    CreateSession(SourceType),
    DeleteSession(String),
    GetSession(String),
    ChunkText {
        session_id: String,
        text: String,
        source_type: SourceType,
    },
    EmbedChunks {
        session_id: String,
        count: usize,
    },
    Chat(ChatQuery),
}

/// Gateway answering from per-operation queues, falling back to canned successes.
pub(crate) struct StubGateway {
    clock: ManualClock,
    next_id: AtomicUsize,
    calls: Mutex<Vec<GatewayCall>>,
    create: Mutex<VecDeque<Result<SessionRecord, GatewayError>>>,
    delete: Mutex<VecDeque<Result<(), GatewayError>>>,
    get: Mutex<VecDeque<Result<SessionRecord, GatewayError>>>,
    chunk: Mutex<VecDeque<Result<ChunkBatch, GatewayError>>>,
    embed: Mutex<VecDeque<Result<EmbedSummary, GatewayError>>>,
    chat: Mutex<VecDeque<Result<ChatAnswer, GatewayError>>>,
    get_gate: Mutex<Option<Arc<Notify>>>,
    chunk_gate: Mutex<Option<Arc<Notify>>>,
    chat_gate: Mutex<Option<Arc<Notify>>>,
}

impl StubGateway {
    pub(crate) fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            next_id: AtomicUsize::new(1),
            calls: Mutex::new(Vec::new()),
            create: Mutex::new(VecDeque::new()),
            delete: Mutex::new(VecDeque::new()),
            get: Mutex::new(VecDeque::new()),
            chunk: Mutex::new(VecDeque::new()),
            embed: Mutex::new(VecDeque::new()),
            chat: Mutex::new(VecDeque::new()),
            get_gate: Mutex::new(None),
            chunk_gate: Mutex::new(None),
            chat_gate: Mutex::new(None),
        }
    }

    pub(crate) async fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn push_create(&self, result: Result<SessionRecord, GatewayError>) {
        self.create.lock().await.push_back(result);
    }

    pub(crate) async fn push_delete(&self, result: Result<(), GatewayError>) {
        self.delete.lock().await.push_back(result);
    }

    pub(crate) async fn push_get(&self, result: Result<SessionRecord, GatewayError>) {
        self.get.lock().await.push_back(result);
    }

    pub(crate) async fn push_chunk(&self, result: Result<ChunkBatch, GatewayError>) {
        self.chunk.lock().await.push_back(result);
    }

    pub(crate) async fn push_embed(&self, result: Result<EmbedSummary, GatewayError>) {
        self.embed.lock().await.push_back(result);
    }

    pub(crate) async fn push_chat(&self, result: Result<ChatAnswer, GatewayError>) {
        self.chat.lock().await.push_back(result);
    }

    /// Hold every session lookup until the returned handle is notified.
    pub(crate) async fn gate_get(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.get_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    /// Hold every chunk call until the returned handle is notified.
    pub(crate) async fn gate_chunk(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.chunk_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    /// Hold every chat call until the returned handle is notified.
    pub(crate) async fn gate_chat(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.chat_gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    async fn record(&self, call: GatewayCall) {
        self.calls.lock().await.push(call);
    }

    async fn wait_on(gate: &Mutex<Option<Arc<Notify>>>) {
        let gate = gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl RemoteGateway for StubGateway {
    async fn create_session(
        &self,
        source_type: SourceType,
    ) -> Result<SessionRecord, GatewayError> {
        self.record(GatewayCall::CreateSession(source_type)).await;
        if let Some(result) = self.create.lock().await.pop_front() {
            return result;
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SessionRecord {
            id: format!("s{n}"),
            expires_at: self.clock.now() + time::Duration::minutes(30),
            source_type: Some(source_type),
            created_at: None,
            local_time: false,
        })
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::DeleteSession(session_id.to_string()))
            .await;
        self.delete.lock().await.pop_front().unwrap_or(Ok(()))
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionRecord, GatewayError> {
        self.record(GatewayCall::GetSession(session_id.to_string()))
            .await;
        Self::wait_on(&self.get_gate).await;
        if let Some(result) = self.get.lock().await.pop_front() {
            return result;
        }
        Ok(SessionRecord {
            id: session_id.to_string(),
            expires_at: self.clock.now() + time::Duration::minutes(30),
            source_type: None,
            created_at: None,
            local_time: false,
        })
    }

    async fn chunk_text(
        &self,
        session_id: &str,
        text: &str,
        source_type: SourceType,
    ) -> Result<ChunkBatch, GatewayError> {
        self.record(GatewayCall::ChunkText {
            session_id: session_id.to_string(),
            text: text.to_string(),
            source_type,
        })
        .await;
        Self::wait_on(&self.chunk_gate).await;
        if let Some(result) = self.chunk.lock().await.pop_front() {
            return result;
        }
        Ok(chunk_batch(text, source_type))
    }

    async fn embed_chunks(
        &self,
        session_id: &str,
        chunks: &[Chunk],
    ) -> Result<EmbedSummary, GatewayError> {
        self.record(GatewayCall::EmbedChunks {
            session_id: session_id.to_string(),
            count: chunks.len(),
        })
        .await;
        if let Some(result) = self.embed.lock().await.pop_front() {
            return result;
        }
        Ok(EmbedSummary {
            success: true,
            embedding_count: chunks.len(),
        })
    }

    async fn chat(&self, query: ChatQuery) -> Result<ChatAnswer, GatewayError> {
        let text = query.query.clone();
        self.record(GatewayCall::Chat(query)).await;
        Self::wait_on(&self.chat_gate).await;
        if let Some(result) = self.chat.lock().await.pop_front() {
            return result;
        }
        Ok(ChatAnswer {
            answer: format!("Answer to: {text}"),
            sources: vec!["chunk-0".to_string()],
            confidence: 0.9,
        })
    }

    async fn health(&self) -> HealthReport {
        HealthReport {
            healthy: true,
            message: "Document service is running".to_string(),
            service_url: "stub://gateway".to_string(),
        }
    }
}

/// One chunk per whitespace-separated word.
pub(crate) fn chunk_batch(text: &str, source_type: SourceType) -> ChunkBatch {
    let chunks: Vec<Chunk> = text
        .split_whitespace()
        .enumerate()
        .map(|(index, word)| Chunk {
            id: format!("chunk-{index}"),
            text: word.to_string(),
            index,
            metadata: ChunkMetadata {
                section: None,
                page_number: None,
                source_type,
            },
        })
        .collect();
    ChunkBatch {
        total_chunks: chunks.len(),
        chunks,
    }
}

/// Let spawned fire-and-forget tasks run to completion.
pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Services wired over a [`StubGateway`], an in-memory store and a frozen clock.
pub(crate) struct Harness {
    pub(crate) gateway: Arc<StubGateway>,
    pub(crate) clock: ManualClock,
    pub(crate) storage: Arc<MemorySessionStorage>,
    pub(crate) metrics: Arc<UsageMetrics>,
    pub(crate) sessions: Arc<SessionController>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_storage(MemorySessionStorage::new())
    }

    pub(crate) fn with_stored_id(session_id: &str) -> Self {
        Self::with_storage(MemorySessionStorage::with_session_id(session_id))
    }

    fn with_storage(storage: MemorySessionStorage) -> Self {
        let clock = ManualClock::new(datetime!(2025-03-01 09:00 UTC));
        let gateway = Arc::new(StubGateway::new(clock.clone()));
        let storage = Arc::new(storage);
        let sessions = Arc::new(SessionController::new(
            gateway.clone(),
            storage.clone(),
            Arc::new(clock.clone()),
        ));
        Self {
            gateway,
            clock,
            storage,
            metrics: Arc::new(UsageMetrics::new()),
            sessions,
        }
    }

    pub(crate) fn stored_id(&self) -> Option<String> {
        self.storage.get_session_id().ok().flatten()
    }

    pub(crate) fn pipeline(&self) -> DocumentPipeline {
        DocumentPipeline::new(
            Arc::new(LocalTextExtractor::new()),
            self.gateway.clone(),
            Arc::clone(&self.sessions),
            Arc::new(self.clock.clone()),
            Arc::clone(&self.metrics),
        )
    }

    pub(crate) fn chat(&self) -> ChatOrchestrator {
        ChatOrchestrator::new(
            self.gateway.clone(),
            Arc::clone(&self.sessions),
            Arc::new(self.clock.clone()),
            Arc::clone(&self.metrics),
            crate::config::DEFAULT_CHAT_TOP_K,
        )
    }
}
