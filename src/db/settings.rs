use std::collections::HashMap;

use sqlx::PgPool;

pub async fn load_all(pool: &PgPool) -> Result<HashMap<String, String>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String)>("SELECT name, value FROM settings")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

pub async fn save_all(pool: &PgPool, pairs: &[(&str, String)]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for (name, value) in pairs {
        sqlx::query(
            "INSERT INTO settings (name, value) VALUES ($1, $2)
             ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(*name)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}
