use serde::Deserialize;

/// An "attempt graded" notification as forwarded by the learning platform.
///
/// Either snapshot may be absent when the platform could not load it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttemptGradedEvent {
    pub attempt: Option<AttemptSnapshot>,
    pub quiz: Option<QuizSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttemptSnapshot {
    pub id: i64,
    pub userid: i64,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizSnapshot {
    pub id: i64,
}
