use chrono::{DateTime, Duration, TimeZone, Utc};
use keyharvest_core::{
    normalize_term, CompetitionLevel, CoreError, DatabaseError, FilteredKeyword, KeywordRecord,
    SeedKeyword,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

fn sql_error(e: sqlx::Error) -> CoreError {
    CoreError::Database(DatabaseError::Sql(e))
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, sqlx::FromRow)]
struct CachedRow {
    text: String,
    volume: i64,
    competition_level: String,
    trend: f64,
    category: String,
    seed_keyword: Option<String>,
}

impl From<CachedRow> for KeywordRecord {
    fn from(row: CachedRow) -> Self {
        let mut record = KeywordRecord::new(row.text);
        record.volume = row.volume.max(0) as u64;
        record.competition_level = CompetitionLevel::parse(&row.competition_level);
        record.trend = row.trend;
        record.category = row.category;
        record.seed_keyword = row.seed_keyword;
        record
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SelectionRow {
    text: String,
    similarity: f64,
    score: f64,
    created_at: i64,
}

/// Cache, blacklist and selection tables behind a single SQLite connection.
///
/// A run owns the store for its whole duration; the pool is capped at one
/// connection so every write goes through the same session.
#[derive(Debug, Clone)]
pub struct KeywordStore {
    pool: SqlitePool,
}

impl KeywordStore {
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        debug!("Connected to keyword store");
        Ok(Self { pool })
    }

    /// Connect and bring the schema up to date.
    pub async fn open(database_url: &str) -> Result<Self, CoreError> {
        let store = Self::connect(database_url).await?;
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        info!("Keyword store migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Keyword store closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Cached raw records with `created_at >= now - ttl`.
    pub async fn fetch_unexpired_cache(&self, ttl: Duration) -> Result<Vec<KeywordRecord>, CoreError> {
        self.fetch_unexpired_cache_at(ttl, Utc::now()).await
    }

    pub async fn fetch_unexpired_cache_at(
        &self,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<KeywordRecord>, CoreError> {
        let cutoff = to_millis(now - ttl);
        let rows: Vec<CachedRow> = sqlx::query_as(
            r#"
            SELECT text, volume, competition_level, trend, category, seed_keyword
            FROM raw_keywords
            WHERE created_at >= ?
            ORDER BY id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error)?;

        debug!("Cache holds {} unexpired records", rows.len());
        Ok(rows.into_iter().map(KeywordRecord::from).collect())
    }

    /// Drop cache rows older than `now - ttl` so a fresh fetch can replace them.
    pub async fn prune_expired_cache(&self, ttl: Duration) -> Result<u64, CoreError> {
        self.prune_expired_cache_at(ttl, Utc::now()).await
    }

    pub async fn prune_expired_cache_at(
        &self,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM raw_keywords WHERE created_at < ?")
            .bind(to_millis(now - ttl))
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(result.rows_affected())
    }

    /// Insert raw records, ignoring texts already cached. Returns rows written.
    pub async fn write_cache(&self, records: &[KeywordRecord]) -> Result<u64, CoreError> {
        self.write_cache_at(records, Utc::now()).await
    }

    pub async fn write_cache_at(
        &self,
        records: &[KeywordRecord],
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let created_at = to_millis(now);
        let mut written = 0;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO raw_keywords (
                    text, volume, competition_level, trend, category, seed_keyword, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.text)
            .bind(record.volume.min(i64::MAX as u64) as i64)
            .bind(record.competition_level.as_str())
            .bind(record.trend)
            .bind(&record.category)
            .bind(&record.seed_keyword)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
            written += result.rows_affected();
        }
        debug!("Cached {} of {} raw records", written, records.len());
        Ok(written)
    }

    /// Terms blacklisted within the retention window, normalized.
    pub async fn fetch_active_blacklist(&self, retention: Duration) -> Result<HashSet<String>, CoreError> {
        self.fetch_active_blacklist_at(retention, Utc::now()).await
    }

    pub async fn fetch_active_blacklist_at(
        &self,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>, CoreError> {
        let terms: Vec<(String,)> =
            sqlx::query_as("SELECT term FROM blacklist WHERE created_at >= ?")
                .bind(to_millis(now - retention))
                .fetch_all(&self.pool)
                .await
                .map_err(sql_error)?;
        Ok(terms.into_iter().map(|(term,)| term).collect())
    }

    /// Blacklist `terms` as of now. Re-blacklisting a term restarts its window.
    pub async fn blacklist<S: AsRef<str>>(&self, terms: &[S]) -> Result<u64, CoreError> {
        self.blacklist_at(terms, Utc::now()).await
    }

    pub async fn blacklist_at<S: AsRef<str>>(
        &self,
        terms: &[S],
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let created_at = to_millis(now);
        let mut written = 0;
        for term in terms {
            let term = normalize_term(term.as_ref());
            if term.is_empty() {
                continue;
            }
            let result = sqlx::query(
                r#"
                INSERT INTO blacklist (term, created_at) VALUES (?, ?)
                ON CONFLICT(term) DO UPDATE SET created_at = excluded.created_at
                "#,
            )
            .bind(&term)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
            written += result.rows_affected();
        }
        info!("Blacklisted {} terms", written);
        Ok(written)
    }

    /// Append the final picks. Refuses the whole batch if any term is
    /// currently blacklisted; texts already persisted are skipped.
    pub async fn persist_selection(
        &self,
        records: &[KeywordRecord],
        retention: Duration,
    ) -> Result<u64, CoreError> {
        self.persist_selection_at(records, retention, Utc::now()).await
    }

    pub async fn persist_selection_at(
        &self,
        records: &[KeywordRecord],
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let active = self.fetch_active_blacklist_at(retention, now).await?;
        if let Some(record) = records
            .iter()
            .find(|record| active.contains(&record.normalized_text()))
        {
            return Err(DatabaseError::BlacklistedTerm {
                term: record.normalized_text(),
            }
            .into());
        }

        let created_at = to_millis(now);
        let mut written = 0;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO filtered_keywords (text, similarity, score, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&record.text)
            .bind(record.similarity)
            .bind(record.score)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
            if result.rows_affected() == 0 {
                warn!("'{}' was already persisted, skipping", record.text);
            }
            written += result.rows_affected();
        }
        info!("Persisted {} selected keywords", written);
        Ok(written)
    }

    /// Most recent selections first.
    pub async fn recent_selections(&self, limit: u32) -> Result<Vec<FilteredKeyword>, CoreError> {
        let rows: Vec<SelectionRow> = sqlx::query_as(
            r#"
            SELECT text, similarity, score, created_at
            FROM filtered_keywords
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error)?;

        Ok(rows
            .into_iter()
            .map(|row| FilteredKeyword {
                text: row.text,
                similarity: row.similarity,
                score: row.score,
                created_at: from_millis(row.created_at),
            })
            .collect())
    }

    pub async fn fetch_seed_keywords(&self) -> Result<Vec<SeedKeyword>, CoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT keyword, category FROM seed_keywords ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(sql_error)?;
        Ok(rows
            .into_iter()
            .map(|(keyword, category)| SeedKeyword::new(keyword, category))
            .collect())
    }

    /// Store a seed. Returns false when the keyword was already present.
    pub async fn add_seed_keyword(&self, seed: &SeedKeyword) -> Result<bool, CoreError> {
        let keyword = normalize_term(&seed.text);
        if keyword.is_empty() {
            return Err(CoreError::InvalidInput {
                message: "seed keyword must not be empty".to_string(),
            });
        }
        let result =
            sqlx::query("INSERT OR IGNORE INTO seed_keywords (keyword, category) VALUES (?, ?)")
                .bind(&keyword)
                .bind(seed.category.trim())
                .execute(&self.pool)
                .await
                .map_err(sql_error)?;
        Ok(result.rows_affected() > 0)
    }
}
