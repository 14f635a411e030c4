//! Local raw-text extraction for uploaded files and pasted text.
//!
//! Format-specific parsing (PDF, DOCX) is an external capability: embedders plug it in by
//! implementing [`TextExtractor`]. The bundled [`LocalTextExtractor`] reads plain-text files and
//! reports the binary formats as unsupported.

pub mod clean;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use clean::clean_text;

/// Document kind inferred from a file's extension or MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
    /// Plain text.
    Text,
}

impl FileKind {
    /// Infer the kind from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "text" | "md" => Some(Self::Text),
            _ => None,
        }
    }

    /// Infer the kind from a MIME type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime == "application/pdf" {
            Some(Self::Pdf)
        } else if mime.contains("wordprocessingml") {
            Some(Self::Docx)
        } else if mime.starts_with("text/plain") {
            Some(Self::Text)
        } else {
            None
        }
    }

    /// Lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while turning a document into plain text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The input is not one of the accepted formats.
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    /// A format handler failed to parse the document.
    #[error("Failed to extract text from {kind}: {reason}")]
    Failed {
        /// Format being extracted.
        kind: FileKind,
        /// Handler-provided diagnosis.
        reason: String,
    },
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Extraction succeeded but left no text.
    #[error("The document contains no extractable text")]
    Empty,
}

/// Capability that produces normalized plain text from a file or a pasted string.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract and normalize the text of the file at `path`, already identified as `kind`.
    async fn extract_file(&self, path: &Path, kind: FileKind) -> Result<String, ExtractionError>;

    /// Normalize pasted text.
    fn extract_pasted(&self, text: &str) -> Result<String, ExtractionError> {
        non_empty(clean_text(text))
    }
}

/// Extractor for plain-text files; PDF and DOCX require an external [`TextExtractor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTextExtractor;

impl LocalTextExtractor {
    /// Construct the extractor.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for LocalTextExtractor {
    async fn extract_file(&self, path: &Path, kind: FileKind) -> Result<String, ExtractionError> {
        match kind {
            FileKind::Text => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ExtractionError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                tracing::debug!(path = %path.display(), bytes = raw.len(), "Read text document");
                non_empty(clean_text(&raw))
            }
            FileKind::Pdf | FileKind::Docx => Err(ExtractionError::UnsupportedFormat(format!(
                "{kind} (no {kind} extractor is configured)"
            ))),
        }
    }
}

fn non_empty(text: String) -> Result<String, ExtractionError> {
    if text.is_empty() {
        Err(ExtractionError::Empty)
    } else {
        Ok(text)
    }
}
