//! Ingestion pipeline: local extraction, then remote chunking and embedding.

use crate::clock::Clock;
use crate::extraction::{ExtractionError, FileKind, TextExtractor};
use crate::gateway::RemoteGateway;
use crate::metrics::UsageMetrics;
use crate::pipeline::types::{
    DocumentProgress, DocumentState, DocumentStatus, IngestOutcome, PROGRESS_EMBEDDING,
    PROGRESS_EXTRACTED, PROGRESS_READY, PROGRESS_STARTED, PipelineError,
};
use crate::session::{SessionController, SourceType};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;

/// Drives one document at a time from raw input to a queryable state.
///
/// Stages run strictly in sequence; a failure is terminal until the next run or [`Self::reset`].
/// A second run started while one is in flight is refused with [`PipelineError::Busy`].
/// The session id is captured before each remote stage and re-checked when it returns.
pub struct DocumentPipeline {
    extractor: Arc<dyn TextExtractor>,
    gateway: Arc<dyn RemoteGateway>,
    sessions: Arc<SessionController>,
    clock: Arc<dyn Clock>,
    metrics: Arc<UsageMetrics>,
    in_flight: AtomicBool,
    /// Bumped by every run and every reset; a run only writes state while it is the latest.
    generation: AtomicU64,
    state: Mutex<DocumentState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DocumentProgress>>>,
}

/// Identity and start time of one ingestion run.
#[derive(Clone, Copy)]
struct Run {
    generation: u64,
    started: Instant,
}

impl DocumentPipeline {
    /// Assemble the pipeline from its collaborators.
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        gateway: Arc<dyn RemoteGateway>,
        sessions: Arc<SessionController>,
        clock: Arc<dyn Clock>,
        metrics: Arc<UsageMetrics>,
    ) -> Self {
        Self {
            extractor,
            gateway,
            sessions,
            clock,
            metrics,
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            state: Mutex::new(DocumentState::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Ingest the file at `path`, inferring its format from the extension.
    pub async fn ingest_file(
        &self,
        path: &Path,
        source_type: SourceType,
    ) -> Result<IngestOutcome, PipelineError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file_kind = FileKind::from_path(path);
        let _guard = RunGuard::acquire(self)?;
        let run = self.begin(Some(file_name.clone()), file_kind, source_type);
        tracing::info!(file = %file_name, kind = ?file_kind, %source_type, "Starting document ingestion");

        let extracted = match file_kind {
            Some(kind) => self.extractor.extract_file(path, kind).await,
            None => Err(ExtractionError::UnsupportedFormat(
                path.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file_name.clone()),
            )),
        };
        self.finish(run, self.drive(extracted, source_type, run).await)
    }

    /// Ingest pasted text.
    pub async fn ingest_pasted_text(
        &self,
        text: &str,
        source_type: SourceType,
    ) -> Result<IngestOutcome, PipelineError> {
        let _guard = RunGuard::acquire(self)?;
        let run = self.begin(None, None, source_type);
        tracing::info!(chars = text.len(), %source_type, "Starting pasted text ingestion");

        let extracted = self.extractor.extract_pasted(text);
        self.finish(run, self.drive(extracted, source_type, run).await)
    }

    /// Discard all document state and return to idle.
    ///
    /// A run still in flight keeps going but no longer updates the state.
    pub fn reset(&self) {
        {
            let mut state = self.state();
            self.generation.fetch_add(1, Ordering::AcqRel);
            *state = DocumentState::default();
        }
        self.emit(DocumentProgress {
            status: DocumentStatus::Idle,
            progress: PROGRESS_STARTED,
        });
        tracing::debug!("Document pipeline reset");
    }

    /// Copy of the current document state.
    pub fn snapshot(&self) -> DocumentState {
        self.state().clone()
    }

    /// Whether an ingestion run is in flight.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Current status and progress.
    pub fn status(&self) -> DocumentProgress {
        self.state().progress()
    }

    /// Receive every status/progress transition from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DocumentProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn state(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(
        &self,
        file_name: Option<String>,
        file_kind: Option<FileKind>,
        source_type: SourceType,
    ) -> Run {
        let uploaded_at = file_name.as_ref().map(|_| self.clock.now());
        let generation = {
            let mut state = self.state();
            *state = DocumentState {
                file_name,
                file_kind,
                source_type: Some(source_type),
                status: DocumentStatus::Extracting,
                progress: PROGRESS_STARTED,
                uploaded_at,
                ..DocumentState::default()
            };
            self.generation.fetch_add(1, Ordering::AcqRel) + 1
        };
        self.emit(DocumentProgress {
            status: DocumentStatus::Extracting,
            progress: PROGRESS_STARTED,
        });
        Run {
            generation,
            started: Instant::now(),
        }
    }

    async fn drive(
        &self,
        extracted: Result<String, ExtractionError>,
        source_type: SourceType,
        run: Run,
    ) -> Result<IngestOutcome, PipelineError> {
        let text = extracted?;
        self.transition(run, |state| {
            state.raw_text = Some(text.clone());
            state.progress = PROGRESS_EXTRACTED;
        });

        let session_id = self.sessions.ensure_session(source_type).await?;

        self.transition(run, |state| state.status = DocumentStatus::Chunking);
        let batch = self
            .gateway
            .chunk_text(&session_id, &text, source_type)
            .await
            .map_err(PipelineError::Chunking)?;
        self.confirm_session(&session_id, DocumentStatus::Chunking)?;
        tracing::debug!(%session_id, chunks = batch.total_chunks, "Document chunked");

        let chunks = batch.chunks;
        let chunk_count = batch.total_chunks;
        self.transition(run, |state| {
            state.chunks = chunks.clone();
            state.chunk_count = chunk_count;
            state.status = DocumentStatus::Embedding;
            state.progress = PROGRESS_EMBEDDING;
        });
        let summary = self
            .gateway
            .embed_chunks(&session_id, &chunks)
            .await
            .map_err(PipelineError::Embedding)?;
        self.confirm_session(&session_id, DocumentStatus::Embedding)?;

        let processing_time = run.started.elapsed();
        self.transition(run, |state| {
            state.status = DocumentStatus::Ready;
            state.progress = PROGRESS_READY;
            state.processing_time = Some(processing_time);
        });
        self.metrics.record_document(chunk_count as u64);
        tracing::info!(
            %session_id,
            chunk_count,
            embedding_count = summary.embedding_count,
            elapsed_ms = processing_time.as_millis() as u64,
            "Document ready"
        );

        Ok(IngestOutcome {
            session_id,
            chunk_count,
            embedding_count: summary.embedding_count,
            processing_time,
        })
    }

    fn confirm_session(&self, session_id: &str, stage: DocumentStatus) -> Result<(), PipelineError> {
        if self.sessions.is_current(session_id) {
            Ok(())
        } else {
            Err(PipelineError::SessionLost { stage })
        }
    }

    fn finish(
        &self,
        run: Run,
        result: Result<IngestOutcome, PipelineError>,
    ) -> Result<IngestOutcome, PipelineError> {
        if let Err(error) = &result {
            let message = error.user_message();
            let stage = self.status().status;
            tracing::error!(%stage, error = %error, "Document ingestion failed");
            self.transition(run, |state| {
                state.status = DocumentStatus::Error;
                state.error = Some(message);
            });
        }
        result
    }

    fn transition(&self, run: Run, apply: impl FnOnce(&mut DocumentState)) {
        let progress = {
            let mut state = self.state();
            if self.generation.load(Ordering::Acquire) != run.generation {
                tracing::debug!(run = run.generation, "Dropping update from a superseded run");
                return;
            }
            apply(&mut state);
            state.progress()
        };
        self.emit(progress);
    }

    fn emit(&self, progress: DocumentProgress) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(progress).is_ok());
    }
}

/// Single-run token; dropping it lets the next run start.
struct RunGuard<'a> {
    pipeline: &'a DocumentPipeline,
}

impl<'a> RunGuard<'a> {
    fn acquire(pipeline: &'a DocumentPipeline) -> Result<Self, PipelineError> {
        match pipeline.in_flight.compare_exchange(
            false,
            true,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(Self { pipeline }),
            Err(_) => {
                tracing::debug!("Refusing ingestion while another run is in flight");
                Err(PipelineError::Busy)
            }
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.pipeline.in_flight.store(false, Ordering::Release);
    }
}
