//! Database module: statements, row mapping and resilient execution.
//!
//! Submodules:
//! - `schema`: idempotent DDL for the `photos` relation.
//! - `query`: typed options -> parameterized statements.
//! - `record`: row <-> `Photo` mapping and write statements.
//! - `exec`: `Db`, which runs statements with schema healing and a retry.
//! - `repo`: the read and mutation surface over `Db`.

pub mod exec;
pub mod query;
pub mod record;
pub mod repo;
pub mod schema;

pub use exec::{classify, Db, FailureKind};
pub use query::{PhotoQuery, Statement};
pub use record::PhotoRecord;
pub use repo::*;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::error::Result;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // WAL and stricter durability on every pooled connection.
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded_path}");
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}
