//! Statement execution with schema self-healing and a single cold-start retry.
//!
//! Every catalog statement, read or write, runs through [`Db::run`]:
//! - a missing `photos` relation is created, then the statement retried once;
//! - a transient backend failure waits `retry_delay`, then retries once;
//! - anything else is logged and returned untouched.

use std::future::Future;
use std::time::Duration;

use sqlx::sqlite::SqliteRow;
use sqlx::Executor;
use tracing::{error, info, instrument, warn};

use super::query::Statement;
use super::schema::CREATE_PHOTOS_TABLE;
use super::Pool;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

// Extended result codes: BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT.
const SQLITE_TRANSIENT_CODES: &[&str] = &["5", "6", "261", "262", "517"];
const PG_UNDEFINED_TABLE: &str = "42P01";
const PG_CANNOT_CONNECT_NOW: &str = "57P03";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SchemaMissing,
    TransientUnavailable,
    Other,
}

/// Classify a driver error, preferring error codes over message text.
pub fn classify(err: &sqlx::Error) -> FailureKind {
    match err {
        sqlx::Error::Database(db) => {
            if let Some(code) = db.code() {
                let code = code.as_ref();
                if code == PG_UNDEFINED_TABLE {
                    return FailureKind::SchemaMissing;
                }
                if code == PG_CANNOT_CONNECT_NOW || SQLITE_TRANSIENT_CODES.contains(&code) {
                    return FailureKind::TransientUnavailable;
                }
            }
            classify_message(db.message())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => FailureKind::TransientUnavailable,
        _ => FailureKind::Other,
    }
}

/// Fallback for drivers that report these conditions only as text.
fn classify_message(message: &str) -> FailureKind {
    let message = message.to_lowercase();
    if message.contains("no such table: photos") || message.contains(r#"relation "photos" does not exist"#) {
        FailureKind::SchemaMissing
    } else if message.contains("endpoint is in transition") || message.contains("database is locked") {
        FailureKind::TransientUnavailable
    } else {
        FailureKind::Other
    }
}

/// Pool handle that executes statements resiliently.
#[derive(Debug, Clone)]
pub struct Db {
    pool: Pool,
    retry_delay: Duration,
}

impl Db {
    pub fn new(pool: Pool, retry_delay: Duration) -> Self {
        Self { pool, retry_delay }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        self.pool.execute(CREATE_PHOTOS_TABLE).await?;
        Ok(())
    }

    /// Run `op`, healing a missing schema or waiting out a cold start once.
    #[instrument(skip_all)]
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, sqlx::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        match classify(&err) {
            FailureKind::SchemaMissing => {
                info!("creating table \"photos\" because it did not exist");
                self.ensure_schema().await?;
                op().await.map_err(|err| {
                    error!(%err, "sql error after creating schema");
                    err
                })
            }
            FailureKind::TransientUnavailable => {
                warn!(%err, delay_ms = self.retry_delay.as_millis() as u64, "backend unavailable; retrying once");
                tokio::time::sleep(self.retry_delay).await;
                op().await.map_err(|err| {
                    error!(%err, delay_ms = self.retry_delay.as_millis() as u64, "sql error on retry");
                    err
                })
            }
            FailureKind::Other => {
                error!(%err, "sql error");
                Err(err)
            }
        }
    }

    pub async fn fetch_all(&self, stmt: &Statement) -> Result<Vec<SqliteRow>, sqlx::Error> {
        self.run(|| stmt.as_query().fetch_all(&self.pool)).await
    }

    pub async fn fetch_optional(&self, stmt: &Statement) -> Result<Option<SqliteRow>, sqlx::Error> {
        self.run(|| stmt.as_query().fetch_optional(&self.pool)).await
    }

    pub async fn fetch_one(&self, stmt: &Statement) -> Result<SqliteRow, sqlx::Error> {
        self.run(|| stmt.as_query().fetch_one(&self.pool)).await
    }

    /// Execute a write, returning the number of affected rows.
    pub async fn execute(&self, stmt: &Statement) -> Result<u64, sqlx::Error> {
        self.run(|| async {
            stmt.as_query()
                .execute(&self.pool)
                .await
                .map(|done| done.rows_affected())
        })
        .await
    }
}
