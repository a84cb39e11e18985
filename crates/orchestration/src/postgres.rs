//! PostgreSQL-backed saga instance store.
//!
//! One row per instance. The whole instance is serialized into a JSONB
//! column; state and version are lifted into their own columns so that
//! operational queries and the compare-and-swap do not have to open the
//! document. The CAS is a conditional `UPDATE ... WHERE version = $n`:
//! zero rows affected means someone else saved first.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use common::CorrelationId;

use crate::store::{Result, SagaData, SagaStore, StoreError, Version};

/// PostgreSQL-backed saga store implementation.
#[derive(Clone)]
pub struct PostgresSagaStore<T> {
    pool: PgPool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PostgresSagaStore<T> {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

impl<T> PostgresSagaStore<T>
where
    T: SagaData + Serialize + DeserializeOwned,
{
    /// Lists the correlation ids currently in the given state, oldest
    /// update first. Audit and reconciliation tooling reads this.
    pub async fn find_by_state(&self, state: &str) -> Result<Vec<CorrelationId>> {
        let rows = sqlx::query(
            "SELECT correlation_id FROM saga_instances WHERE state = $1 ORDER BY updated_at",
        )
        .bind(state)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CorrelationId::from_uuid(
                    row.try_get::<Uuid, _>("correlation_id")?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl<T> SagaStore<T> for PostgresSagaStore<T>
where
    T: SagaData + Serialize + DeserializeOwned,
{
    async fn create(&self, mut instance: T) -> Result<T> {
        let correlation_id = instance.correlation_id();
        instance.set_version(Version::first());
        let data = serde_json::to_value(&instance)?;

        let result = sqlx::query(
            r#"
            INSERT INTO saga_instances (correlation_id, state, version, data, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (correlation_id) DO NOTHING
            "#,
        )
        .bind(correlation_id.as_uuid())
        .bind(instance.state_label())
        .bind(Version::first().as_i64())
        .bind(&data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(correlation_id));
        }
        Ok(instance)
    }

    async fn load(&self, correlation_id: CorrelationId) -> Result<T> {
        let row = sqlx::query("SELECT data FROM saga_instances WHERE correlation_id = $1")
            .bind(correlation_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(correlation_id))?;

        let data: serde_json::Value = row.try_get("data")?;
        Ok(serde_json::from_value(data)?)
    }

    async fn save(&self, mut instance: T) -> Result<T> {
        let correlation_id = instance.correlation_id();
        let expected = instance.version();
        instance.set_version(expected.next());
        let data = serde_json::to_value(&instance)?;

        let result = sqlx::query(
            r#"
            UPDATE saga_instances
            SET state = $1, version = $2, data = $3, updated_at = NOW()
            WHERE correlation_id = $4 AND version = $5
            "#,
        )
        .bind(instance.state_label())
        .bind(instance.version().as_i64())
        .bind(&data)
        .bind(correlation_id.as_uuid())
        .bind(expected.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a lost CAS from a row that never existed.
            let actual: Option<i64> = sqlx::query_scalar(
                "SELECT version FROM saga_instances WHERE correlation_id = $1",
            )
            .bind(correlation_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

            return match actual {
                Some(actual) => Err(StoreError::ConcurrentModification {
                    correlation_id,
                    expected,
                    actual: Version::new(actual),
                }),
                None => Err(StoreError::NotFound(correlation_id)),
            };
        }
        Ok(instance)
    }
}
