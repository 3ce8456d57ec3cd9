mod state;
mod weight;

use std::sync::Arc;

use sqlx::postgres::PgConnectOptions;
use state::DbState;
use time::OffsetDateTime;

pub use weight::{Reading, StoredReading, WeightRepository};

use crate::config::DbConfig;

/// Postgres-backed store of scale readings.
#[derive(Debug, Clone)]
pub struct WeightDb {
    state: Arc<DbState>,
}

impl WeightDb {
    pub async fn connect(config: &DbConfig) -> anyhow::Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);
        Self::connect_with(options).await
    }

    /// Connect from a `postgres://` URL.
    pub async fn connect_url(url: &str) -> anyhow::Result<Self> {
        Self::connect_with(url.parse()?).await
    }

    async fn connect_with(options: PgConnectOptions) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(DbState::connect(options).await?),
        })
    }

    pub async fn close(&self) {
        self.state.close().await;
    }
}

impl WeightRepository for WeightDb {
    async fn add_reading(&self, reading: &Reading, confirmed: bool) -> anyhow::Result<StoredReading> {
        let mut conn = self.state.conn().await?;
        let stored = sqlx::query_as::<_, StoredReading>(
            r#"INSERT INTO weights (weight, confirmed) VALUES ($1, $2)
            RETURNING id, weight, confirmed, created"#,
        )
        .bind(reading.as_str())
        .bind(confirmed)
        .fetch_one(&mut *conn)
        .await?;
        Ok(stored)
    }

    async fn recent_readings(&self, limit: i64) -> anyhow::Result<Vec<StoredReading>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, StoredReading>(
            r#"SELECT id, weight, confirmed, created FROM weights ORDER BY id DESC LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?)
    }

    async fn confirmed_since(&self, since: OffsetDateTime) -> anyhow::Result<Vec<StoredReading>> {
        let mut conn = self.state.conn().await?;
        Ok(sqlx::query_as::<_, StoredReading>(
            r#"SELECT id, weight, confirmed, created FROM weights
            WHERE confirmed = TRUE AND created > $1
            ORDER BY created ASC"#,
        )
        .bind(since)
        .fetch_all(&mut *conn)
        .await?)
    }
}
