//! Session data model and errors.

use crate::gateway::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// Kind of document a session is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// A candidate's resume, read by recruiters.
    #[serde(rename = "resume")]
    Resume,
    /// A job description, read by job seekers.
    #[serde(rename = "jd", alias = "job-description")]
    JobDescription,
}

impl SourceType {
    /// Wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::JobDescription => "jd",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "resume" => Ok(Self::Resume),
            "jd" | "job-description" | "job_description" => Ok(Self::JobDescription),
            other => Err(format!(
                "unknown source type '{other}' (expected 'resume' or 'jd')"
            )),
        }
    }
}

/// A time-boxed session created by the backend.
///
/// `expires_at` is fixed at creation; a new session replaces the old one rather than patching it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque identifier issued by the backend.
    pub id: String,
    /// Absolute expiry instant.
    pub expires_at: OffsetDateTime,
    /// Document kind this session was created for.
    pub source_type: SourceType,
    /// Creation instant.
    pub created_at: OffsetDateTime,
}

impl Session {
    /// Whether the session is still live at `now`.
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry at `now`, saturating at zero.
    pub fn time_remaining_at(&self, now: OffsetDateTime) -> Duration {
        Duration::try_from(self.expires_at - now).unwrap_or(Duration::ZERO)
    }
}

/// Read-only view of the controller state for consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Current session, if one exists and has not been cleared.
    pub session: Option<Session>,
    /// `now < expires_at`.
    pub is_active: bool,
    /// `max(0, expires_at - now)`.
    pub time_remaining: Duration,
}

impl SessionSnapshot {
    /// Identifier of the current session.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.id.as_str())
    }

    /// One-line human readable status, e.g. `Active • 29m 05s remaining`.
    pub fn status_line(&self) -> String {
        if self.session.is_none() {
            return "No active session".to_string();
        }
        if !self.is_active {
            return "Expired".to_string();
        }
        let total = self.time_remaining.as_secs();
        format!("Active • {}m {:02}s remaining", total / 60, total % 60)
    }
}

/// Remediation appended to connectivity failures when creating a session.
pub const CONNECTIVITY_REMEDIATION: &str = "To fix this:\n1. Navigate to the python-service directory\n2. Activate the virtual environment\n3. Run: uvicorn app.main:app --reload";

/// Errors surfaced by the session controller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session creation failed; `message` is ready for display.
    #[error("{message}")]
    Create {
        /// Human-readable message, including remediation for connectivity failures.
        message: String,
        /// Gateway failure.
        #[source]
        source: GatewayError,
    },
    /// The backend rejected or could not confirm a persisted session.
    #[error("Failed to revalidate stored session: {0}")]
    Revalidate(#[source] GatewayError),
}

impl SessionError {
    pub(crate) fn create_failed(source: GatewayError) -> Self {
        let message = match &source {
            GatewayError::Connectivity { url, reason } => format!(
                "Cannot connect to the document service at {url}. Please ensure it is running.\n\n{CONNECTIVITY_REMEDIATION}\n\nError: {reason}"
            ),
            other => format!("Failed to create session: {}", other.user_message()),
        };
        Self::Create { message, source }
    }

    /// Underlying gateway failure.
    pub fn gateway_error(&self) -> &GatewayError {
        match self {
            Self::Create { source, .. } => source,
            Self::Revalidate(source) => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn session(expires_at: OffsetDateTime) -> Session {
        Session {
            id: "s1".into(),
            expires_at,
            source_type: SourceType::Resume,
            created_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    #[test]
    fn source_type_parses_aliases() {
        assert_eq!("resume".parse::<SourceType>(), Ok(SourceType::Resume));
        assert_eq!("JD".parse::<SourceType>(), Ok(SourceType::JobDescription));
        assert_eq!(
            "job-description".parse::<SourceType>(),
            Ok(SourceType::JobDescription)
        );
        assert!("cover-letter".parse::<SourceType>().is_err());

        let wire: SourceType = serde_json::from_str("\"job-description\"").unwrap();
        assert_eq!(wire, SourceType::JobDescription);
        assert_eq!(serde_json::to_string(&wire).unwrap(), "\"jd\"");
    }

    #[test]
    fn time_remaining_saturates_at_zero() {
        let session = session(datetime!(2025-01-01 00:00:05 UTC));
        let before = datetime!(2025-01-01 00:00:01 UTC);
        let after = datetime!(2025-01-01 00:00:06 UTC);

        assert!(session.is_active_at(before));
        assert_eq!(session.time_remaining_at(before), Duration::from_secs(4));
        assert!(!session.is_active_at(after));
        assert_eq!(session.time_remaining_at(after), Duration::ZERO);
        assert!(!session.is_active_at(session.expires_at));
    }

    #[test]
    fn status_line_formats_minutes_and_seconds() {
        let active = SessionSnapshot {
            session: Some(session(datetime!(2025-01-01 00:30 UTC))),
            is_active: true,
            time_remaining: Duration::from_secs(29 * 60 + 5),
        };
        assert_eq!(active.status_line(), "Active • 29m 05s remaining");

        let expired = SessionSnapshot {
            is_active: false,
            time_remaining: Duration::ZERO,
            ..active
        };
        assert_eq!(expired.status_line(), "Expired");

        let empty = SessionSnapshot {
            session: None,
            is_active: false,
            time_remaining: Duration::ZERO,
        };
        assert_eq!(empty.status_line(), "No active session");
    }

    #[test]
    fn connectivity_failures_carry_remediation() {
        let error = SessionError::create_failed(GatewayError::Connectivity {
            url: "http://localhost:8000".into(),
            reason: "connection refused".into(),
        });
        let message = error.to_string();
        assert!(message.contains("Cannot connect to the document service"));
        assert!(message.contains(CONNECTIVITY_REMEDIATION));
        assert!(message.contains("connection refused"));
    }
}
