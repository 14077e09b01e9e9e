use serde::{Deserialize, Serialize};

/// One attempt waiting for (or done with) delivery to the analysis API.
///
/// Timestamps are unix seconds. `time_sent == 0` means the record has not been
/// confirmed as delivered yet.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: i64,
    #[sqlx(rename = "userid")]
    pub user_id: i64,
    #[sqlx(rename = "quizid")]
    pub quiz_id: i64,
    #[sqlx(rename = "attemptid")]
    pub attempt_id: i64,
    pub state: String,
    #[sqlx(rename = "timecreated")]
    pub time_created: i64,
    #[sqlx(rename = "timesent")]
    pub time_sent: i64,
    pub status: String,
    pub attempts: i32,
}

impl QueueRecord {
    pub fn is_sent(&self) -> bool {
        self.time_sent != 0
    }
}

#[derive(Debug, Clone)]
pub struct NewQueueRecord {
    pub user_id: i64,
    pub quiz_id: i64,
    pub attempt_id: i64,
    pub state: String,
    pub time_created: i64,
}

/// The only fields the dispatcher is allowed to touch after enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub time_sent: i64,
    pub status: String,
    pub attempts: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub sent: i64,
}
