//! Ephemeral session lifecycle.

pub mod controller;
pub mod types;

pub use controller::SessionController;
pub use types::{CONNECTIVITY_REMEDIATION, Session, SessionError, SessionSnapshot, SourceType};
