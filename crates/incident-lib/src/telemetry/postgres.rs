//! PostgreSQL incident store

use super::sink::{IncidentStatus, IncidentStore, LogEntry, MetricRecord, NewIncident};
use crate::error::{SinkError, SinkResult};
use crate::models::IncidentId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::info;
use url::Url;
use uuid::Uuid;

/// Connection settings for the incident database
#[derive(Debug, Clone, PartialEq)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PostgresSettings {
    /// Read `POSTGRES_*` and `DB_POOL_*` settings through `lookup`
    ///
    /// Database, user and password are required; the error lists every
    /// missing variable.
    pub fn from_lookup<F>(lookup: F) -> SinkResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut required = |key: &'static str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key);
            }
            value.unwrap_or_default()
        };
        let database = required("POSTGRES_DB");
        let user = required("POSTGRES_USER");
        let password = required("POSTGRES_PASSWORD");
        if !missing.is_empty() {
            return Err(SinkError::Unavailable(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let number = |key: &str, default: u32| -> SinkResult<u32> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| SinkError::Unavailable(format!("{key} is not a number: {raw}"))),
                None => Ok(default),
            }
        };
        let port = number("POSTGRES_PORT", 5432)?;
        let port = u16::try_from(port)
            .map_err(|_| SinkError::Unavailable(format!("POSTGRES_PORT out of range: {port}")))?;

        Ok(Self {
            host: get("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            database,
            user,
            password,
            min_connections: number("DB_POOL_MIN_CONN", 1)?,
            max_connections: number("DB_POOL_MAX_CONN", 10)?,
            acquire_timeout: Duration::from_secs(5),
        })
    }

    pub fn from_env() -> SinkResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Connection URL with credentials percent-encoded
    pub fn connection_url(&self) -> SinkResult<Url> {
        let mut url = Url::parse(&format!(
            "postgres://{}:{}/{}",
            self.host, self.port, self.database
        ))?;
        url.set_username(&self.user)
            .and_then(|_| url.set_password(Some(&self.password)))
            .map_err(|_| SinkError::Unavailable("cannot encode database credentials".to_string()))?;
        Ok(url)
    }
}

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS incidents (
        id UUID PRIMARY KEY,
        incident_type TEXT NOT NULL,
        service_name TEXT NOT NULL,
        severity TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        description TEXT,
        affected_pods TEXT[],
        start_time TIMESTAMPTZ NOT NULL,
        end_time TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"CREATE INDEX IF NOT EXISTS incidents_status ON incidents(status);"#,
    r#"
    CREATE TABLE IF NOT EXISTS metrics (
        id BIGSERIAL PRIMARY KEY,
        timestamp TIMESTAMPTZ NOT NULL,
        service_name TEXT NOT NULL,
        pod_name TEXT NOT NULL,
        metric_name TEXT NOT NULL,
        metric_value DOUBLE PRECISION NOT NULL,
        incident_id UUID REFERENCES incidents(id),
        labels JSONB
    );
    "#,
    r#"CREATE INDEX IF NOT EXISTS metrics_service_time ON metrics(service_name, timestamp DESC);"#,
    r#"
    CREATE TABLE IF NOT EXISTS logs (
        id BIGSERIAL PRIMARY KEY,
        timestamp TIMESTAMPTZ NOT NULL,
        service_name TEXT NOT NULL,
        pod_name TEXT,
        log_level TEXT NOT NULL,
        message TEXT NOT NULL,
        incident_id UUID REFERENCES incidents(id),
        labels JSONB
    );
    "#,
    r#"CREATE INDEX IF NOT EXISTS logs_service_time ON logs(service_name, timestamp DESC);"#,
];

/// Incident store over a `sqlx` connection pool
#[derive(Debug, Clone)]
pub struct PostgresIncidentStore {
    pool: PgPool,
}

impl PostgresIncidentStore {
    /// Connect, verify the connection and create missing tables
    pub async fn connect(settings: &PostgresSettings) -> SinkResult<Self> {
        let url = settings.connection_url()?;
        let pool = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url.as_str())
            .await?;

        let store = Self { pool };
        store.test_connection().await?;
        store.initialize_schema().await?;
        info!(
            host = %settings.host,
            database = %settings.database,
            max_connections = settings.max_connections,
            "Incident store connected"
        );
        Ok(store)
    }

    pub async fn test_connection(&self) -> SinkResult<()> {
        let row = sqlx::query("SELECT 1 AS test")
            .fetch_one(&self.pool)
            .await?;
        let value: i32 = row.try_get("test")?;
        if value != 1 {
            return Err(SinkError::Unavailable(
                "connection test returned an unexpected value".to_string(),
            ));
        }
        Ok(())
    }

    async fn initialize_schema(&self) -> SinkResult<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn parse_incident_id(id: &IncidentId) -> SinkResult<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|_| SinkError::InvalidIncidentId(id.to_string()))
}

fn optional_incident_id(id: Option<&IncidentId>) -> SinkResult<Option<Uuid>> {
    id.map(parse_incident_id).transpose()
}

#[async_trait]
impl IncidentStore for PostgresIncidentStore {
    async fn create_incident(&self, incident: &NewIncident) -> SinkResult<IncidentId> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO incidents (id, incident_type, service_name, severity, description, affected_pods, start_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(incident.kind.as_str())
        .bind(&incident.service)
        .bind(incident.severity.to_string())
        .bind(&incident.description)
        .bind(&incident.affected_pods)
        .bind(incident.started_at)
        .fetch_one(&self.pool)
        .await?;

        let id: Uuid = row.try_get("id")?;
        Ok(IncidentId::new(id.to_string()))
    }

    async fn update_incident_status(
        &self,
        id: &IncidentId,
        status: IncidentStatus,
        end_time: Option<DateTime<Utc>>,
    ) -> SinkResult<()> {
        sqlx::query(
            r#"
            UPDATE incidents
            SET status = $1, end_time = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(end_time)
        .bind(parse_incident_id(id)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_metric(&self, record: &MetricRecord) -> SinkResult<()> {
        let labels = serde_json::to_value(&record.labels)
            .map_err(|e| SinkError::Unavailable(format!("labels not serializable: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO metrics (timestamp, service_name, pod_name, metric_name, metric_value, incident_id, labels)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.timestamp)
        .bind(&record.service)
        .bind(&record.pod)
        .bind(&record.metric)
        .bind(record.value)
        .bind(optional_incident_id(record.incident_id.as_ref())?)
        .bind(labels)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_log(&self, entry: &LogEntry) -> SinkResult<()> {
        let labels = serde_json::to_value(&entry.labels)
            .map_err(|e| SinkError::Unavailable(format!("labels not serializable: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO logs (timestamp, service_name, pod_name, log_level, message, incident_id, labels)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.timestamp)
        .bind(&entry.service)
        .bind(&entry.pod)
        .bind(entry.level.as_str().to_uppercase())
        .bind(&entry.message)
        .bind(optional_incident_id(entry.incident_id.as_ref())?)
        .bind(labels)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Incident store connection pool closed");
    }
}
