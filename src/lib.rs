#![deny(missing_docs)]

//! Session and document-ingestion orchestration core for ResumeLens.

/// Conversation orchestration and suggested questions.
pub mod chat;
/// Injectable wall clock.
pub mod clock;
/// Environment-driven configuration management.
pub mod config;
/// Local raw-text extraction.
pub mod extraction;
/// Typed HTTP boundary to the document service.
pub mod gateway;
/// Structured logging and tracing setup.
pub mod logging;
/// In-process usage counters.
pub mod metrics;
/// Document ingestion state machine.
pub mod pipeline;
/// Ephemeral session lifecycle.
pub mod session;
/// Persisted session identifier.
pub mod storage;
/// Service wiring for one application instance.
pub mod workspace;

#[cfg(test)]
mod test_support;
