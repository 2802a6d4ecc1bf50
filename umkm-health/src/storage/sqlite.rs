//! Local SQLite record store.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AnalysisStore, StorageError};
use crate::assessment::AnalysisRecord;

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS analysis_records (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    revenue REAL NOT NULL,
    cogs REAL NOT NULL,
    operating_expenses REAL NOT NULL,
    total_assets REAL NOT NULL,
    cash REAL,
    total_liabilities REAL NOT NULL,
    total_equity REAL NOT NULL,
    net_profit_margin REAL NOT NULL,
    current_ratio REAL NOT NULL,
    debt_to_equity REAL NOT NULL,
    roa REAL NOT NULL,
    asset_turnover REAL NOT NULL,
    prediction_status TEXT NOT NULL,
    recommendation TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analysis_records_user_created
ON analysis_records(user_id, created_at DESC);
"#;

const SELECT_COLUMNS: &str = "id, user_id, revenue, cogs, operating_expenses, total_assets, cash, \
     total_liabilities, total_equity, net_profit_margin, current_ratio, debt_to_equity, roa, \
     asset_turnover, prediction_status, recommendation, created_at";

/// SQLite-backed store.
pub struct SqliteStore {
    /// rusqlite::Connection is Send but not Sync
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path).context("Failed to open analysis database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        let store = Self::with_connection(conn)?;
        info!(db_path = %path.display(), "Initialized analysis storage");
        Ok(store)
    }

    /// In-memory database, mostly for tests.
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let db = self.db.lock().await;
        let count: i64 =
            db.query_row("SELECT COUNT(*) FROM analysis_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    let created_at: String = row.get(16)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(16, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(AnalysisRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        revenue: row.get(2)?,
        cogs: row.get(3)?,
        operating_expenses: row.get(4)?,
        total_assets: row.get(5)?,
        cash: row.get(6)?,
        total_liabilities: row.get(7)?,
        total_equity: row.get(8)?,
        net_profit_margin: row.get(9)?,
        current_ratio: row.get(10)?,
        debt_to_equity: row.get(11)?,
        roa: row.get(12)?,
        asset_turnover: row.get(13)?,
        prediction_status: row.get(14)?,
        recommendation: row.get(15)?,
        created_at,
    })
}

#[async_trait]
impl AnalysisStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StorageError> {
        let db = self.db.lock().await;
        db.execute(
            r#"INSERT INTO analysis_records
               (id, user_id, revenue, cogs, operating_expenses, total_assets, cash,
                total_liabilities, total_equity, net_profit_margin, current_ratio,
                debt_to_equity, roa, asset_turnover, prediction_status, recommendation,
                created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"#,
            params![
                record.id,
                record.user_id,
                record.revenue,
                record.cogs,
                record.operating_expenses,
                record.total_assets,
                record.cash,
                record.total_liabilities,
                record.total_equity,
                record.net_profit_margin,
                record.current_ratio,
                record.debt_to_equity,
                record.roa,
                record.asset_turnover,
                record.prediction_status,
                record.recommendation,
                record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;

        debug!(id = %record.id, user_id = %record.user_id, "Stored analysis record");
        Ok(())
    }

    async fn latest(&self, user_id: &str) -> Result<Option<AnalysisRecord>, StorageError> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM analysis_records WHERE user_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            SELECT_COLUMNS
        );

        let record = db
            .query_row(&sql, params![user_id], record_from_row)
            .optional()?;
        Ok(record)
    }
}
