//! Warehouse access for the gold layer

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use wxp_common::StructuredRecord;

use crate::db::{create_pool, run_migrations, DbConfig};
use crate::error::{PipelineError, PipelineResult, PG_UNDEFINED_TABLE};

pub const OBSERVATIONS_TABLE: &str = "weather_observations";

/// Bind parameters per row in `insert_chunk`
pub const OBSERVATION_COLUMNS: usize = 7;

/// PostgreSQL limit on bind parameters in one statement
pub const PG_MAX_BIND_PARAMS: usize = 65_535;

/// Largest chunk one INSERT can carry (9362 rows)
pub const MAX_CHUNK_SIZE: usize = PG_MAX_BIND_PARAMS / OBSERVATION_COLUMNS;

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Latest loaded event time, `None` when nothing has been loaded
    async fn max_observation_time(&self) -> PipelineResult<Option<DateTime<Utc>>>;

    /// Insert every chunk inside one transaction; all or nothing.
    ///
    /// Returns the number of rows inserted.
    async fn append_chunks(&self, chunks: &[&[StructuredRecord]]) -> PipelineResult<u64>;
}

/// PostgreSQL warehouse
///
/// Built with [`PgWarehouse::lazy`], no connection is opened until the first
/// query; that query also applies the migrations.
pub struct PgWarehouse {
    config: Option<DbConfig>,
    pool: OnceCell<PgPool>,
}

impl PgWarehouse {
    /// Wrap an already connected pool. Migrations are left to the caller.
    pub fn new(pool: PgPool) -> Self {
        Self {
            config: None,
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    pub fn lazy(config: DbConfig) -> Self {
        Self {
            config: Some(config),
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> PipelineResult<&PgPool> {
        self.pool
            .get_or_try_init(|| async {
                let config = self
                    .config
                    .as_ref()
                    .ok_or_else(|| PipelineError::config("warehouse has no connection settings"))?;
                let pool = create_pool(config).await?;
                run_migrations(&pool).await?;
                Ok::<_, PipelineError>(pool)
            })
            .await
    }

    async fn insert_chunk(
        tx: &mut Transaction<'_, Postgres>,
        records: &[StructuredRecord],
    ) -> PipelineResult<u64> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO weather_observations (
                run_id,
                ingestion_time,
                temperature,
                windspeed,
                winddirection,
                weathercode,
                observation_time
            )
            "#,
        );

        query_builder.push_values(records, |mut b, record| {
            b.push_bind(record.run_id)
                .push_bind(record.ingestion_time)
                .push_bind(record.temperature)
                .push_bind(record.windspeed)
                .push_bind(record.winddirection)
                .push_bind(record.weathercode)
                .push_bind(record.observation_time);
        });

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn max_observation_time(&self) -> PipelineResult<Option<DateTime<Utc>>> {
        let pool = self.pool().await?;
        let result = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(observation_time) AS last_time FROM weather_observations",
        )
        .fetch_one(pool)
        .await;

        match result {
            Ok(last_time) => Ok(last_time),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(PG_UNDEFINED_TABLE) =>
            {
                warn!(table = OBSERVATIONS_TABLE, "Warehouse table does not exist yet; treating as empty");
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn append_chunks(&self, chunks: &[&[StructuredRecord]]) -> PipelineResult<u64> {
        let mut tx = self.pool().await?.begin().await?;

        let total_chunks = chunks.len();
        let mut inserted = 0;

        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            debug!(
                "Inserting observations chunk {} / {} ({} rows)",
                chunk_idx + 1,
                total_chunks,
                chunk.len()
            );

            inserted += Self::insert_chunk(&mut tx, chunk).await?;
        }

        tx.commit().await?;

        info!("Committed {} observations in {} chunks", inserted, total_chunks);

        Ok(inserted)
    }
}
