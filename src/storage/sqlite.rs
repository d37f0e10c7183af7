//! SQLite record store
//!
//! One connection behind a `std::sync::Mutex` (a rusqlite `Connection` is
//! `Send` but not `Sync`). Every call runs on the blocking pool so async
//! callers never stall the runtime, and each call holds the lock for exactly
//! one logical operation.
//!
//! # Schema
//!
//! ```text
//! sentiment_analyses: id (AUTOINCREMENT), text, label, score, created_at (epoch ms),
//!                     processing_time_ms, model_name, is_batch
//! analysis_stats:     id, date (UNIQUE, YYYY-MM-DD), counts, averages, created_at, updated_at
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::store::RecordStore;
use crate::storage::types::{
    from_millis, AnalysisFilter, AnalysisRecord, DailyStat, Label, NewAnalysis,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sentiment_analyses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        label TEXT NOT NULL,
        score REAL NOT NULL CHECK (score >= 0.0 AND score <= 1.0),
        created_at INTEGER NOT NULL,
        processing_time_ms REAL,
        model_name TEXT,
        is_batch INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON sentiment_analyses(created_at);
    CREATE INDEX IF NOT EXISTS idx_analyses_label ON sentiment_analyses(label);

    CREATE TABLE IF NOT EXISTS analysis_stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL UNIQUE,
        total_analyses INTEGER NOT NULL DEFAULT 0,
        positive_count INTEGER NOT NULL DEFAULT 0,
        negative_count INTEGER NOT NULL DEFAULT 0,
        average_score REAL,
        average_processing_time REAL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
";

const RECORD_COLUMNS: &str =
    "id, text, label, score, created_at, processing_time_ms, model_name, is_batch";

const STAT_COLUMNS: &str = "date, total_analyses, positive_count, negative_count, \
     average_score, average_processing_time, created_at, updated_at";

/// SQLite-backed `RecordStore`
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Create or open a database file
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Self::init(conn, Some(path))
    }

    /// Private in-memory database (tests, ephemeral runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file path, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StorageError::Lock(e.to_string()))?;
            f(&mut guard)
        })
        .await?
    }
}

/// Raw column values before label/date decoding
struct RawRecord {
    id: i64,
    text: String,
    label: String,
    score: f64,
    created_at: i64,
    processing_time_ms: Option<f64>,
    model_name: Option<String>,
    is_batch: bool,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            text: row.get(1)?,
            label: row.get(2)?,
            score: row.get(3)?,
            created_at: row.get(4)?,
            processing_time_ms: row.get(5)?,
            model_name: row.get(6)?,
            is_batch: row.get(7)?,
        })
    }

    fn into_record(self) -> StorageResult<AnalysisRecord> {
        let label: Label = self.label.parse().map_err(|_| {
            StorageError::Corruption(format!("record {} has label {:?}", self.id, self.label))
        })?;
        Ok(AnalysisRecord {
            id: self.id,
            text: self.text,
            label,
            score: self.score,
            created_at: from_millis(self.created_at),
            processing_time_ms: self.processing_time_ms,
            model_name: self.model_name,
            is_batch: self.is_batch,
        })
    }
}

struct RawStat {
    date: String,
    total: i64,
    positive: i64,
    negative: i64,
    average_score: Option<f64>,
    average_processing_time: Option<f64>,
    created_at: i64,
    updated_at: i64,
}

impl RawStat {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get(0)?,
            total: row.get(1)?,
            positive: row.get(2)?,
            negative: row.get(3)?,
            average_score: row.get(4)?,
            average_processing_time: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_stat(self) -> StorageResult<DailyStat> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|e| StorageError::Corruption(format!("stat date {:?}: {}", self.date, e)))?;
        Ok(DailyStat {
            date,
            total_analyses: self.total.max(0) as u64,
            positive_count: self.positive.max(0) as u64,
            negative_count: self.negative.max(0) as u64,
            average_score: self.average_score,
            average_processing_time: self.average_processing_time,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

/// Build a WHERE clause and its positional parameters
fn filter_clause(filter: &AnalysisFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(label) = filter.label {
        clauses.push("label = ?");
        values.push(Value::Text(label.as_str().to_string()));
    }
    if let Some(min) = filter.min_score {
        clauses.push("score >= ?");
        values.push(Value::Real(min));
    }
    if let Some(start) = filter.start {
        clauses.push("created_at >= ?");
        values.push(Value::Integer(start.timestamp_millis()));
    }
    if let Some(end) = filter.end {
        clauses.push("created_at <= ?");
        values.push(Value::Integer(end.timestamp_millis()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

/// Escape LIKE wildcards so the term matches literally
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn collect_records(
    conn: &Connection,
    sql: &str,
    values: Vec<Value>,
) -> StorageResult<Vec<AnalysisRecord>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let raws = stmt
        .query_map(params_from_iter(values), RawRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    raws.into_iter().map(RawRecord::into_record).collect()
}

fn select_stat(conn: &Connection, date: &str) -> StorageResult<Option<DailyStat>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM analysis_stats WHERE date = ?1", STAT_COLUMNS),
            params![date],
            RawStat::from_row,
        )
        .optional()?;
    raw.map(RawStat::into_stat).transpose()
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    async fn create(&self, record: NewAnalysis) -> StorageResult<AnalysisRecord> {
        record.validate()?;

        self.with_conn(move |conn| {
            let now = Utc::now();
            let created_at = record.created_at.unwrap_or(now).timestamp_millis();
            conn.execute(
                "INSERT INTO sentiment_analyses
                 (text, label, score, created_at, processing_time_ms, model_name, is_batch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.text,
                    record.label.as_str(),
                    record.score,
                    created_at,
                    record.processing_time_ms,
                    record.model_name,
                    record.is_batch,
                ],
            )?;
            let id = conn.last_insert_rowid();
            tracing::debug!(analysis_id = id, "Created analysis");
            Ok(record.into_record(id, now))
        })
        .await
    }

    async fn get(&self, id: i64) -> StorageResult<AnalysisRecord> {
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {} FROM sentiment_analyses WHERE id = ?1", RECORD_COLUMNS),
                    params![id],
                    RawRecord::from_row,
                )
                .optional()?;
            raw.ok_or(StorageError::NotFound(id))?.into_record()
        })
        .await
    }

    async fn list(
        &self,
        filter: &AnalysisFilter,
        skip: usize,
        limit: usize,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let (clause, mut values) = filter_clause(filter);
        values.push(Value::Integer(to_sql_int(limit)));
        values.push(Value::Integer(to_sql_int(skip)));
        let sql = format!(
            "SELECT {} FROM sentiment_analyses{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            RECORD_COLUMNS, clause
        );

        self.with_conn(move |conn| collect_records(conn, &sql, values))
            .await
    }

    async fn count(&self) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM sentiment_analyses", [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        })
        .await
    }

    async fn count_filtered(&self, filter: &AnalysisFilter) -> StorageResult<u64> {
        let (clause, values) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM sentiment_analyses{}", clause);

        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
            Ok(n.max(0) as u64)
        })
        .await
    }

    async fn search(&self, term: &str, limit: usize) -> StorageResult<Vec<AnalysisRecord>> {
        let values = vec![
            Value::Text(like_pattern(term)),
            Value::Integer(to_sql_int(limit)),
        ];
        let sql = format!(
            "SELECT {} FROM sentiment_analyses WHERE text LIKE ? ESCAPE '\\' \
             ORDER BY created_at DESC, id DESC LIMIT ?",
            RECORD_COLUMNS
        );

        self.with_conn(move |conn| collect_records(conn, &sql, values))
            .await
    }

    async fn delete(&self, id: i64) -> StorageResult<bool> {
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM sentiment_analyses WHERE id = ?1", params![id])?;
            if removed > 0 {
                tracing::debug!(analysis_id = id, "Deleted analysis");
            }
            Ok(removed > 0)
        })
        .await
    }

    async fn records_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(start) = start {
            clauses.push("created_at >= ?");
            values.push(Value::Integer(start.timestamp_millis()));
        }
        if let Some(end) = end {
            clauses.push("created_at < ?");
            values.push(Value::Integer(end.timestamp_millis()));
        }
        let clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM sentiment_analyses{} ORDER BY created_at ASC, id ASC",
            RECORD_COLUMNS, clause
        );

        self.with_conn(move |conn| collect_records(conn, &sql, values))
            .await
    }

    async fn upsert_daily_stat(&self, stat: DailyStat) -> StorageResult<DailyStat> {
        self.with_conn(move |conn| {
            let date = stat.date.format(DATE_FORMAT).to_string();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO analysis_stats
                 (date, total_analyses, positive_count, negative_count,
                  average_score, average_processing_time, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(date) DO UPDATE SET
                    total_analyses = excluded.total_analyses,
                    positive_count = excluded.positive_count,
                    negative_count = excluded.negative_count,
                    average_score = excluded.average_score,
                    average_processing_time = excluded.average_processing_time,
                    updated_at = excluded.updated_at",
                params![
                    date,
                    i64::try_from(stat.total_analyses).unwrap_or(i64::MAX),
                    i64::try_from(stat.positive_count).unwrap_or(i64::MAX),
                    i64::try_from(stat.negative_count).unwrap_or(i64::MAX),
                    stat.average_score,
                    stat.average_processing_time,
                    stat.created_at.timestamp_millis(),
                    stat.updated_at.timestamp_millis(),
                ],
            )?;
            let stored = select_stat(&tx, &date)?;
            tx.commit()?;
            stored.ok_or_else(|| StorageError::Database(format!("upsert for {} vanished", date)))
        })
        .await
    }

    async fn daily_stat(&self, date: NaiveDate) -> StorageResult<Option<DailyStat>> {
        self.with_conn(move |conn| select_stat(conn, &date.format(DATE_FORMAT).to_string()))
            .await
    }

    async fn daily_stats(&self, from: NaiveDate, to: NaiveDate) -> StorageResult<Vec<DailyStat>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM analysis_stats WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
                STAT_COLUMNS
            ))?;
            let raws = stmt
                .query_map(
                    params![
                        from.format(DATE_FORMAT).to_string(),
                        to.format(DATE_FORMAT).to_string()
                    ],
                    RawStat::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(RawStat::into_stat).collect()
        })
        .await
    }
}
