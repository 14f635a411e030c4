//! Canned starter questions and the channel that carries a selected one to the chat input.

use crate::session::SourceType;
use tokio::sync::mpsc;

const RESUME_QUESTIONS: [&str; 4] = [
    "What are the candidate's key skills and experience?",
    "Does the candidate have experience with React?",
    "What is the candidate's educational background?",
    "Summarize the candidate's work history",
];

const JOB_DESCRIPTION_QUESTIONS: [&str; 4] = [
    "What are the key required skills for this role?",
    "What is the expected experience level?",
    "What are the main responsibilities?",
    "Summarize the job requirements",
];

/// Starter questions for a document kind.
pub fn suggested_questions(source_type: SourceType) -> &'static [&'static str] {
    match source_type {
        SourceType::Resume => &RESUME_QUESTIONS,
        SourceType::JobDescription => &JOB_DESCRIPTION_QUESTIONS,
    }
}

/// Create a connected sender/receiver pair for suggestion selections.
pub fn suggestion_channel() -> (SuggestionSender, SuggestionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SuggestionSender { tx }, SuggestionReceiver { rx })
}

/// Held by whatever presents the suggestions.
#[derive(Debug, Clone)]
pub struct SuggestionSender {
    tx: mpsc::UnboundedSender<String>,
}

impl SuggestionSender {
    /// Publish a selected question. Returns `false` once the receiver is gone.
    pub fn select(&self, question: impl Into<String>) -> bool {
        self.tx.send(question.into()).is_ok()
    }
}

/// Held by the chat input that reacts to selections.
#[derive(Debug)]
pub struct SuggestionReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl SuggestionReceiver {
    /// Wait for the next selection; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next pending selection without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn questions_depend_on_source_type() {
        assert_eq!(suggested_questions(SourceType::Resume).len(), 4);
        assert!(suggested_questions(SourceType::Resume)[1].contains("React"));
        assert_eq!(
            suggested_questions(SourceType::JobDescription)[3],
            "Summarize the job requirements"
        );
    }

    #[tokio::test]
    async fn selections_arrive_in_order() {
        let (sender, mut receiver) = suggestion_channel();
        let questions = suggested_questions(SourceType::JobDescription);
        assert!(sender.select(questions[0]));
        assert!(sender.clone().select(questions[2]));

        assert_eq!(receiver.recv().await.as_deref(), Some(questions[0]));
        assert_eq!(receiver.try_recv().as_deref(), Some(questions[2]));
        assert_eq!(receiver.try_recv(), None);

        drop(receiver);
        assert!(!sender.select("anything"));
    }
}
