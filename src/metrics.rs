use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and chat activity.
#[derive(Default)]
pub struct UsageMetrics {
    documents_ingested: AtomicU64,
    chunks_ingested: AtomicU64,
    chat_turns: AtomicU64,
    failed_turns: AtomicU64,
}

impl UsageMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document that reached the ready state and the number of chunks it produced.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_ingested
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a chat turn answered by the backend.
    pub fn record_chat_turn(&self) {
        self.chat_turns.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chat turn that was rolled back.
    pub fn record_failed_turn(&self) {
        self.failed_turns.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            chat_turns: self.chat_turns.load(Ordering::Relaxed),
            failed_turns: self.failed_turns.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of usage counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents that reached the ready state.
    pub documents_ingested: u64,
    /// Total chunk count produced across all ingested documents.
    pub chunks_ingested: u64,
    /// Chat turns that received an answer.
    pub chat_turns: u64,
    /// Chat turns that failed and were rolled back.
    pub failed_turns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = UsageMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_ingested, 5);
    }

    #[test]
    fn records_chat_outcomes_separately() {
        let metrics = UsageMetrics::new();
        metrics.record_chat_turn();
        metrics.record_chat_turn();
        metrics.record_failed_turn();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.chat_turns, 2);
        assert_eq!(snapshot.failed_turns, 1);
        assert_eq!(snapshot.documents_ingested, 0);
    }
}
