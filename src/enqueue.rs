//! Turns "attempt graded" notifications into queue records.
//!
//! [`enqueue_attempt`] holds the filtering rules and reports a typed outcome.
//! [`observe`] is the event-intake boundary: whatever happens inside, it logs
//! and returns normally so the caller's event pipeline is never disturbed.

use crate::error::StoreError;
use crate::models::{AttemptGradedEvent, NewQueueRecord, Settings};
use crate::store::QueueStore;

pub const FINISHED_STATE: &str = "finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { id: i64 },
    MissingSnapshot,
    Disabled,
    OtherQuiz,
    NotFinished,
    AlreadyQueued,
}

impl EnqueueOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnqueueOutcome::Queued { .. } => "queued",
            EnqueueOutcome::MissingSnapshot => "missing_snapshot",
            EnqueueOutcome::Disabled => "disabled",
            EnqueueOutcome::OtherQuiz => "other_quiz",
            EnqueueOutcome::NotFinished => "not_finished",
            EnqueueOutcome::AlreadyQueued => "already_queued",
        }
    }
}

pub async fn enqueue_attempt(
    store: &dyn QueueStore,
    settings: &Settings,
    event: &AttemptGradedEvent,
) -> Result<EnqueueOutcome, StoreError> {
    let (Some(attempt), Some(quiz)) = (&event.attempt, &event.quiz) else {
        return Ok(EnqueueOutcome::MissingSnapshot);
    };

    let Some(target_quiz) = settings.target_quiz() else {
        return Ok(EnqueueOutcome::Disabled);
    };

    if quiz.id != target_quiz {
        return Ok(EnqueueOutcome::OtherQuiz);
    }

    if attempt.state != FINISHED_STATE {
        return Ok(EnqueueOutcome::NotFinished);
    }

    if store.find_by_attempt(attempt.id).await?.is_some() {
        return Ok(EnqueueOutcome::AlreadyQueued);
    }

    let record = NewQueueRecord {
        user_id: attempt.userid,
        quiz_id: quiz.id,
        attempt_id: attempt.id,
        state: attempt.state.clone(),
        time_created: chrono::Utc::now().timestamp(),
    };

    match store.insert(record).await {
        Ok(id) => Ok(EnqueueOutcome::Queued { id }),
        // Another observer won the race between the lookup and the insert.
        Err(StoreError::DuplicateKey(_)) => Ok(EnqueueOutcome::AlreadyQueued),
        Err(e) => Err(e),
    }
}

/// Run the guard and swallow every failure. Returns `None` when an error was logged.
pub async fn observe(
    store: &dyn QueueStore,
    settings: &Settings,
    event: &AttemptGradedEvent,
) -> Option<EnqueueOutcome> {
    let attempt_id = event.attempt.as_ref().map(|a| a.id);

    match enqueue_attempt(store, settings, event).await {
        Ok(outcome) => {
            match outcome {
                EnqueueOutcome::Queued { id } => {
                    tracing::info!("Queued attempt {attempt_id:?} as record {id}");
                }
                EnqueueOutcome::MissingSnapshot => {
                    tracing::warn!("No attempt or quiz snapshot (attempt={attempt_id:?})");
                }
                EnqueueOutcome::Disabled => {
                    tracing::warn!("entry_test_id not configured, ignoring attempt {attempt_id:?}");
                }
                EnqueueOutcome::NotFinished => {
                    tracing::debug!("Attempt {attempt_id:?} not finished, ignoring");
                }
                EnqueueOutcome::OtherQuiz | EnqueueOutcome::AlreadyQueued => {
                    tracing::debug!("Attempt {attempt_id:?}: {}", outcome.as_str());
                }
            }
            Some(outcome)
        }
        Err(e) => {
            tracing::error!("Failed to enqueue attempt {attempt_id:?}: {e}");
            None
        }
    }
}
