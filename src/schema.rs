//! Database schema management for `crew-vitals`.
//!
//! Ensures the `vitals` table exists before serving requests.
//! Applied once on startup by `AppContext::initialize` when the
//! PostgreSQL store is selected.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the vitals schema (idempotent).
///
/// `doc_id` holds the `{crew_id}_{timestamp}` document key, so the primary
/// key constraint is what gives upserts their one-record-per-key guarantee.
/// Safe to call on every startup; no-op if objects already exist.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vitals (
            doc_id        TEXT             PRIMARY KEY,
            crew_id       TEXT             NOT NULL,
            heart_rate    DOUBLE PRECISION NOT NULL,
            sleep_hours   DOUBLE PRECISION NOT NULL,
            "timestamp"   TEXT             NOT NULL,
            stress_score  DOUBLE PRECISION NOT NULL,
            stress_flag   TEXT             NOT NULL,
            processed_at  TIMESTAMPTZ      NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_vitals_crew_id
            ON vitals (crew_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
