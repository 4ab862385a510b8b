//! PostgreSQL record store — one JSONB document per id.
//!
//! Tables are created by the migrations in `gatehouse_core/migrations/`.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{Collection, InsertOutcome, RecordStore, StoreError};

/// [`RecordStore`] backed by the `tokens` and `users` tables.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let sql = format!("SELECT document FROM {} WHERE id = $1", collection.as_str());
        let doc = sqlx::query_scalar::<_, serde_json::Value>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<InsertOutcome, StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, document) VALUES ($1, $2)",
            collection.as_str()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(document)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn replace(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, document) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document, updated_at = now()",
            collection.as_str()
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(document)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
