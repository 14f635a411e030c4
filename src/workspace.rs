//! Wiring of the session, pipeline, and chat services for one application instance.

use crate::chat::ChatOrchestrator;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::extraction::{LocalTextExtractor, TextExtractor};
use crate::gateway::{GatewayError, HealthReport, HttpGateway, RemoteGateway};
use crate::metrics::{MetricsSnapshot, UsageMetrics};
use crate::pipeline::DocumentPipeline;
use crate::session::SessionController;
use crate::storage::{FileSessionStorage, SessionStorage};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Services sharing one gateway, one session, and one metrics registry.
///
/// Build it once near process start and pass it by reference; the pipeline and chat read the
/// session through the shared [`SessionController`].
pub struct Workspace {
    gateway: Arc<dyn RemoteGateway>,
    sessions: Arc<SessionController>,
    pipeline: DocumentPipeline,
    chat: ChatOrchestrator,
    metrics: Arc<UsageMetrics>,
    expiry_check: Duration,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Workspace {
    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let gateway = Arc::new(HttpGateway::from_config(config)?);
        tracing::debug!(service_url = %gateway.base_url(), state_dir = %config.state_dir.display(), "Building workspace");
        Ok(Self::new(
            gateway,
            Arc::new(FileSessionStorage::new(&config.state_dir)),
            Arc::new(LocalTextExtractor::new()),
            Arc::new(SystemClock),
            config,
        ))
    }

    /// Wire arbitrary collaborators; tuning values come from `config`.
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        storage: Arc<dyn SessionStorage>,
        extractor: Arc<dyn TextExtractor>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let metrics = Arc::new(UsageMetrics::new());
        let sessions = Arc::new(SessionController::new(
            Arc::clone(&gateway),
            storage,
            Arc::clone(&clock),
        ));
        let pipeline = DocumentPipeline::new(
            extractor,
            Arc::clone(&gateway),
            Arc::clone(&sessions),
            Arc::clone(&clock),
            Arc::clone(&metrics),
        );
        let chat = ChatOrchestrator::new(
            Arc::clone(&gateway),
            Arc::clone(&sessions),
            clock,
            Arc::clone(&metrics),
            config.chat_top_k,
        );

        Self {
            gateway,
            sessions,
            pipeline,
            chat,
            metrics,
            expiry_check: config.expiry_check_interval(),
            watcher: Mutex::new(None),
        }
    }

    /// Start the periodic expiry check. Must be called inside a tokio runtime; calling it again
    /// is a no-op while the watcher runs.
    pub fn start_expiry_watcher(&self) {
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *watcher = Some(self.sessions.spawn_expiry_watcher(self.expiry_check));
    }

    /// Session lifecycle.
    pub fn sessions(&self) -> &Arc<SessionController> {
        &self.sessions
    }

    /// Document ingestion.
    pub fn pipeline(&self) -> &DocumentPipeline {
        &self.pipeline
    }

    /// Conversation.
    pub fn chat(&self) -> &ChatOrchestrator {
        &self.chat
    }

    /// Probe the backend.
    pub async fn health(&self) -> HealthReport {
        self.gateway.health().await
    }

    /// Usage counters recorded so far.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Clear the session and reset the document and conversation.
    pub fn reset_all(&self) {
        self.sessions.clear_session();
        self.pipeline.reset();
        self.chat.reset();
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let watcher = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = watcher {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::SourceType;
    use crate::storage::MemorySessionStorage;
    use crate::test_support::StubGateway;
    use time::macros::datetime;

    fn workspace(clock: &ManualClock, gateway: Arc<StubGateway>) -> Workspace {
        let config = Config {
            expiry_check_ms: 5,
            ..Config::default()
        };
        Workspace::new(
            gateway,
            Arc::new(MemorySessionStorage::new()),
            Arc::new(LocalTextExtractor::new()),
            Arc::new(clock.clone()),
            &config,
        )
    }

    #[tokio::test]
    async fn services_share_one_session() {
        let clock = ManualClock::new(datetime!(2025-03-01 09:00 UTC));
        let workspace = workspace(&clock, Arc::new(StubGateway::new(clock.clone())));

        let outcome = workspace
            .pipeline()
            .ingest_pasted_text("hello world", SourceType::Resume)
            .await
            .unwrap();
        assert_eq!(workspace.sessions().current_id(), Some(outcome.session_id));

        workspace.chat().send_message("What skills?").await.unwrap();
        assert_eq!(workspace.chat().snapshot().messages.len(), 2);
        let metrics = workspace.metrics();
        assert_eq!(metrics.documents_ingested, 1);
        assert_eq!(metrics.chat_turns, 1);
        assert!(workspace.health().await.healthy);

        workspace.reset_all();
        assert!(!workspace.sessions().is_active());
        assert!(workspace.chat().snapshot().messages.is_empty());
        assert!(workspace.pipeline().snapshot().raw_text.is_none());
    }

    #[tokio::test]
    async fn watcher_expires_session() {
        let clock = ManualClock::new(datetime!(2025-03-01 09:00 UTC));
        let workspace = workspace(&clock, Arc::new(StubGateway::new(clock.clone())));
        workspace
            .sessions()
            .create_session(SourceType::Resume)
            .await
            .unwrap();
        workspace.start_expiry_watcher();
        workspace.start_expiry_watcher();

        clock.advance(time::Duration::hours(1));
        for _ in 0..50 {
            if workspace.sessions().snapshot().session.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(workspace.sessions().snapshot().session.is_none());
    }
}
