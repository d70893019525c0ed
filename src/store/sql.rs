//! SQL-backed ledger store (SQLite via sqlx).
//!
//! One row per entry, keyed by `sequence_id` with a unique index on
//! `entry_id`. The unique primary key is what makes cross-process appends
//! safe: a losing writer gets a `Conflict` and retries off the new head.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::entry::LedgerEntry;
use crate::store::{EntryFilter, EntryPage, LedgerStore};

const SCHEMA: &str = include_str!("../../migrations/001_ledger_schema.sql");

pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Connect to `database_url` and apply the ledger schema. The acquire
    /// timeout bounds how long any store operation may wait for a
    /// connection instead of hanging.
    pub async fn connect(
        database_url: &str,
        acquire_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| LedgerError::Storage(format!("invalid database url: {}", e)))?
            .create_if_missing(true);

        // SQLite is single-writer; one pooled connection avoids
        // SQLITE_BUSY churn under concurrent appends.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply the ledger schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, LedgerError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        debug!("ledger schema applied");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, LedgerError> {
    let actor_type: String = row.try_get("actor_type")?;
    let source: String = row.try_get("source")?;
    let payload: String = row.try_get("payload")?;

    Ok(LedgerEntry {
        sequence_id: row.try_get("sequence_id")?,
        entry_id: row.try_get("entry_id")?,
        previous_hash: row.try_get("previous_hash")?,
        entry_hash: row.try_get("entry_hash")?,
        actor_id: row.try_get("actor_id")?,
        actor_type: actor_type.parse()?,
        action: row.try_get("action")?,
        entity_type: row.try_get("entity_type")?,
        entity_id: row.try_get("entity_id")?,
        project_id: row.try_get("project_id")?,
        payload: serde_json::from_str(&payload)?,
        source: source.parse()?,
        ip_address: row.try_get("ip_address")?,
        session_id: row.try_get("session_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn push_filters<'args>(builder: &mut QueryBuilder<'args, Sqlite>, filter: &'args EntryFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(project_id) = &filter.project_id {
        builder.push(" AND project_id = ").push_bind(project_id.as_str());
    }
    if let Some(entity_type) = &filter.entity_type {
        builder.push(" AND entity_type = ").push_bind(entity_type.as_str());
    }
    if let Some(entity_id) = &filter.entity_id {
        builder.push(" AND entity_id = ").push_bind(entity_id.as_str());
    }
    if let Some(actor_id) = &filter.actor_id {
        builder.push(" AND actor_id = ").push_bind(actor_id.as_str());
    }
    if let Some(action) = &filter.action {
        builder.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(since) = filter.since {
        builder.push(" AND created_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        builder.push(" AND created_at <= ").push_bind(until);
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn insert(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let payload = serde_json::to_string(&entry.payload)?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                sequence_id, entry_id, previous_hash, entry_hash,
                actor_id, actor_type, action, entity_type, entity_id,
                project_id, payload, source, ip_address, session_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(entry.sequence_id)
        .bind(&entry.entry_id)
        .bind(&entry.previous_hash)
        .bind(&entry.entry_hash)
        .bind(&entry.actor_id)
        .bind(entry.actor_type.as_str())
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(entry.project_id.as_deref())
        .bind(payload)
        .bind(entry.source.as_str())
        .bind(entry.ip_address.as_deref())
        .bind(entry.session_id.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn head(&self) -> Result<Option<(i64, String)>, LedgerError> {
        let row = sqlx::query(
            "SELECT sequence_id, entry_hash FROM ledger_entries \
             ORDER BY sequence_id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some((
                row.try_get("sequence_id")?,
                row.try_get("entry_hash")?,
            ))),
            None => Ok(None),
        }
    }

    async fn find_by_entry_id(
        &self,
        entry_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let row = sqlx::query("SELECT * FROM ledger_entries WHERE entry_id = ?1")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn scan(
        &self,
        project_id: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM ledger_entries WHERE 1 = 1");
        if let Some(project_id) = project_id {
            builder.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(since) = since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        builder.push(" ORDER BY sequence_id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn query(&self, filter: &EntryFilter) -> Result<EntryPage, LedgerError> {
        let (limit, offset) = filter.page();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM ledger_entries");
        push_filters(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM ledger_entries");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, sequence_id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(&self.pool).await?;
        let entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EntryPage { entries, total })
    }
}
