//! Document store for scored vitals.
//!
//! Records live under the `vitals` collection keyed by
//! `{crew_id}_{timestamp}`. Writes are upserts with last-write-wins
//! semantics, and `processed_at` is always assigned by the store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{ScoredVitals, VitalsRecord};

// ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence capability used by the ingestion handler.
#[async_trait]
pub trait VitalsStore: Send + Sync {
    /// Create or fully overwrite the document for `vitals.document_id()`.
    async fn upsert(&self, vitals: &ScoredVitals) -> Result<VitalsRecord, StoreError>;
}

/// PostgreSQL-backed store; the `vitals` table plays the collection.
pub struct PgVitalsStore {
    pool: PgPool,
}

impl PgVitalsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VitalsStore for PgVitalsStore {
    async fn upsert(&self, vitals: &ScoredVitals) -> Result<VitalsRecord, StoreError> {
        // ---
        let doc_id = vitals.document_id();

        let row = sqlx::query(
            r#"
            INSERT INTO vitals (
                doc_id, crew_id, heart_rate, sleep_hours, "timestamp",
                stress_score, stress_flag, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (doc_id) DO UPDATE SET
                crew_id      = EXCLUDED.crew_id,
                heart_rate   = EXCLUDED.heart_rate,
                sleep_hours  = EXCLUDED.sleep_hours,
                "timestamp"  = EXCLUDED."timestamp",
                stress_score = EXCLUDED.stress_score,
                stress_flag  = EXCLUDED.stress_flag,
                processed_at = EXCLUDED.processed_at
            RETURNING processed_at
            "#,
        )
        .bind(&doc_id)
        .bind(&vitals.crew_id)
        .bind(vitals.heart_rate)
        .bind(vitals.sleep_hours)
        .bind(&vitals.timestamp)
        .bind(vitals.stress_score)
        .bind(vitals.stress_flag.as_str())
        .fetch_one(&self.pool)
        .await?;

        let processed_at: DateTime<Utc> = row.try_get("processed_at")?;
        tracing::debug!("Upserted vitals document {} at {}", doc_id, processed_at);

        Ok(vitals.clone().into_record(processed_at))
    }
}

/// In-process store for local runs and tests.
#[derive(Default)]
pub struct MemoryVitalsStore {
    documents: Mutex<HashMap<String, VitalsRecord>>,
}

impl MemoryVitalsStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn get(&self, doc_id: &str) -> Option<VitalsRecord> {
        self.documents.lock().await.get(doc_id).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }
}

#[async_trait]
impl VitalsStore for MemoryVitalsStore {
    async fn upsert(&self, vitals: &ScoredVitals) -> Result<VitalsRecord, StoreError> {
        // ---
        let record = vitals.clone().into_record(Utc::now());
        self.documents
            .lock()
            .await
            .insert(vitals.document_id(), record.clone());
        Ok(record)
    }
}
