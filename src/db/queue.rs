use sqlx::PgPool;

use crate::models::{NewQueueRecord, QueueCounts, QueueRecord, RecordUpdate};

pub async fn insert(pool: &PgPool, record: &NewQueueRecord) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO entrance_queue (userid, quizid, attemptid, state, timecreated, timesent, status, attempts)
         VALUES ($1, $2, $3, $4, $5, 0, '', 0) RETURNING id",
    )
    .bind(record.user_id)
    .bind(record.quiz_id)
    .bind(record.attempt_id)
    .bind(&record.state)
    .bind(record.time_created)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>("SELECT * FROM entrance_queue WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_attempt(
    pool: &PgPool,
    attempt_id: i64,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>("SELECT * FROM entrance_queue WHERE attemptid = $1 LIMIT 1")
        .bind(attempt_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_pending(pool: &PgPool) -> Result<Vec<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        "SELECT * FROM entrance_queue WHERE timesent = 0 ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await
}

/// Returns the number of rows touched; zero means the id does not exist.
pub async fn update(pool: &PgPool, id: i64, update: &RecordUpdate) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE entrance_queue SET timesent = $2, status = $3, attempts = GREATEST(attempts, $4)
         WHERE id = $1",
    )
    .bind(id)
    .bind(update.time_sent)
    .bind(&update.status)
    .bind(update.attempts)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        "SELECT * FROM entrance_queue ORDER BY id DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn counts(pool: &PgPool) -> Result<QueueCounts, sqlx::Error> {
    let (pending, sent) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*) FILTER (WHERE timesent = 0),
                COUNT(*) FILTER (WHERE timesent <> 0)
         FROM entrance_queue",
    )
    .fetch_one(pool)
    .await?;
    Ok(QueueCounts { pending, sent })
}
