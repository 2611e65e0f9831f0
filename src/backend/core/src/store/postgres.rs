//! Postgres-backed event store.
//!
//! Ids come from the `BIGSERIAL` column, so concurrent appends from any
//! number of tasks or processes never collide.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::{EventStore, MaterialCount, MaterialEvent, NewMaterialEvent};
use crate::config::DatabaseConfig;
use crate::error::Result;

/// Append-only event store over a `material_events` table.
#[derive(Clone, Debug)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool using the database settings.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connected to event store"
        );

        Ok(Self::new(pool))
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Event store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: &NewMaterialEvent) -> Result<MaterialEvent> {
        // Redelivered messages land here as new rows. Deduplication would hash
        // (material_id, event_type, timestamp, shelf_id, slot_id) into a key
        // column with a unique constraint and use ON CONFLICT DO NOTHING.
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO material_events (material_id, event_type, "timestamp", shelf_id, slot_id, worker_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&event.material_id)
        .bind(&event.event_type)
        .bind(event.timestamp)
        .bind(&event.shelf_id)
        .bind(&event.slot_id)
        .bind(&event.worker_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(event.with_id(id))
    }

    async fn count_by_material(&self, limit: usize) -> Result<Vec<MaterialCount>> {
        let rows = sqlx::query_as::<_, MaterialCount>(
            r#"
            SELECT material_id, COUNT(*) AS move_count
            FROM material_events
            GROUP BY material_id
            ORDER BY move_count DESC, MIN(id) ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    fn scan_all(&self) -> BoxStream<'_, Result<MaterialEvent>> {
        sqlx::query_as::<_, MaterialEvent>(
            r#"
            SELECT id, material_id, event_type, "timestamp", shelf_id, slot_id, worker_id
            FROM material_events
            ORDER BY id ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|row| row.map_err(Into::into))
        .boxed()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
