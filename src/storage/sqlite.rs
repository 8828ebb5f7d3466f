//! SQLite realization of the storage repository.
//!
//! Uses an r2d2 connection pool so concurrent read operations don't block
//! each other, the way the reference clipboard store's database layer does.
//! Write operations that need transactional grouping borrow a single
//! connection out of the pool for the duration of the (possibly nested)
//! transaction, tracked by a nesting counter per §9.

use super::{SnippetQuery, Storage};
use crate::config::StoreConfig;
use crate::error::{BackendError, Error, Result, RuntimeError};
use crate::identifier::ExternalId;
use crate::model::{
    FulltextIndexContent, PositionBag, SnippetFormat, SnippetRow, SnippetSource, TocEntry,
    TocEntryWithMetadata,
};
use crate::position::{self, Field, Position};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// State backing the reentrant transaction protocol: `depth == 0` means no
/// transaction is open; a borrowed connection is held only while `depth >
/// 0`, and only the outermost `start`/`commit`/`rollback` pair talks to the
/// backend.
struct TxState {
    depth: u32,
    conn: Option<PooledConnection<SqliteConnectionManager>>,
}

pub struct SqliteStorage {
    pool: Pool<SqliteConnectionManager>,
    config: StoreConfig,
    excluded_words: RwLock<HashSet<String>>,
    tx: Mutex<TxState>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA foreign_keys=ON;",
            )?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(BackendError::from)?;
        Self::from_pool(pool, config)
    }

    /// In-memory database, handy for tests and benches. A single-connection
    /// pool keeps every borrow pointed at the same database (a
    /// multi-connection in-memory pool would see independent, empty
    /// databases per connection).
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(BackendError::from)?;
        Self::from_pool(pool, StoreConfig::default())
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>, config: StoreConfig) -> Result<Self> {
        let storage = Self {
            pool,
            config,
            excluded_words: RwLock::new(HashSet::new()),
            tx: Mutex::new(TxState {
                depth: 0,
                conn: None,
            }),
        };
        storage.setup_schema()?;
        storage.refresh_excluded_words()?;
        Ok(storage)
    }

    fn table(&self, bare: &str) -> String {
        format!("{}{}", self.config.table_prefix, bare)
    }

    fn pooled_conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| BackendError::from(e).into())
    }

    /// Runs `f` against either the open transaction's connection or a fresh
    /// pooled one, whichever applies.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let guard = self.tx.lock();
        if let Some(conn) = guard.conn.as_ref() {
            return f(conn).map_err(|e| BackendError::from(e).into());
        }
        drop(guard);
        let conn = self.pooled_conn()?;
        f(&conn).map_err(|e| BackendError::from(e).into())
    }

    fn setup_schema(&self) -> Result<()> {
        let conn = self.pooled_conn()?;
        let toc = self.table("toc");
        let word = self.table("word");
        let fulltext = self.table("fulltext");
        let metadata = self.table("metadata");
        let snippet = self.table("snippet");

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {toc} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL,
                instance_id INTEGER NOT NULL DEFAULT 0,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                hash TEXT NOT NULL DEFAULT '',
                relevance_ratio REAL NOT NULL DEFAULT 1.0,
                date TEXT,
                metadata TEXT,
                UNIQUE(external_id, instance_id)
            );
            CREATE TABLE IF NOT EXISTS {word} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS {fulltext} (
                word_id INTEGER NOT NULL,
                toc_id INTEGER NOT NULL,
                positions TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{fulltext}_word ON {fulltext}(word_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_{fulltext}_word_toc ON {fulltext}(word_id, toc_id);
            CREATE TABLE IF NOT EXISTS {metadata} (
                toc_id INTEGER PRIMARY KEY,
                word_count INTEGER NOT NULL DEFAULT 0,
                images TEXT
            );
            CREATE TABLE IF NOT EXISTS {snippet} (
                toc_id INTEGER NOT NULL,
                min_word_pos INTEGER NOT NULL,
                max_word_pos INTEGER NOT NULL,
                snippet TEXT NOT NULL,
                format_id INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_{snippet}_toc ON {snippet}(toc_id, max_word_pos);
            "#
        ))?;

        tracing::debug!(table = %toc, "schema ensured");
        Ok(())
    }

    /// Recomputes the excluded-word set: words whose document frequency
    /// exceeds `excluded_word_threshold_ratio` of the current TOC size.
    /// Refreshed at construction and on `erase()`.
    fn refresh_excluded_words(&self) -> Result<()> {
        let toc_size = self.get_toc_size(None)?;
        if toc_size == 0 {
            self.excluded_words.write().clear();
            return Ok(());
        }

        let threshold = self.config.excluded_word_threshold_ratio * toc_size as f64;
        let word = self.table("word");
        let fulltext = self.table("fulltext");

        let names: Vec<String> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT w.name FROM {word} w
                 JOIN {fulltext} f ON f.word_id = w.id
                 GROUP BY w.id
                 HAVING COUNT(DISTINCT f.toc_id) > ?1"
            ))?;
            stmt.query_map(params![threshold], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;

        *self.excluded_words.write() = names.into_iter().collect();
        Ok(())
    }

    fn internal_id(&self, external_id: &ExternalId) -> Result<Option<i64>> {
        let toc = self.table("toc");
        let instance_id = external_id.instance_id.unwrap_or(0);
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT id FROM {toc} WHERE external_id = ?1 AND instance_id = ?2"),
                params![external_id.id, instance_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
    }

    fn word_id(&self, conn: &Connection, name: &str) -> rusqlite::Result<i64> {
        let word = self.table("word");
        let truncated = truncate_word(name, self.config.max_word_length);
        conn.execute(
            &format!("INSERT OR IGNORE INTO {word} (name) VALUES (?1)"),
            params![truncated],
        )?;
        conn.query_row(
            &format!("SELECT id FROM {word} WHERE name = ?1"),
            params![truncated],
            |row| row.get(0),
        )
    }
}

/// §3 Word: surface form truncated to at most `max_len` bytes at a UTF-8
/// boundary; uniqueness is on the truncated form.
fn truncate_word(word: &str, max_len: usize) -> &str {
    if word.len() <= max_len {
        return word;
    }
    let mut end = max_len;
    while !word.is_char_boundary(end) {
        end -= 1;
    }
    &word[..end]
}

impl Storage for SqliteStorage {
    fn add_entry_to_toc(&self, entry: &TocEntry, external_id: &ExternalId) -> Result<()> {
        let toc = self.table("toc");
        let instance_id = external_id.instance_id.unwrap_or(0);
        let date_str = entry.date.map(|d| d.to_rfc3339());
        let metadata_str = serde_json::to_string(&entry.metadata)
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;

        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {toc} (external_id, instance_id, title, url, hash, relevance_ratio, date, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(external_id, instance_id) DO UPDATE SET
                        title=excluded.title, url=excluded.url, hash=excluded.hash,
                        relevance_ratio=excluded.relevance_ratio, date=excluded.date,
                        metadata=excluded.metadata"
                ),
                params![
                    external_id.id,
                    instance_id,
                    entry.title,
                    entry.url,
                    entry.hash,
                    entry.external_relevance_ratio,
                    date_str,
                    metadata_str,
                ],
            )?;
            Ok(())
        })
    }

    fn upsert_if_changed(&self, entry: &TocEntry, external_id: &ExternalId) -> Result<bool> {
        let previous = self.get_toc_by_external_id(external_id)?;
        let changed = previous.as_ref().map(|p| p.hash != entry.hash).unwrap_or(true);
        self.add_entry_to_toc(entry, external_id)?;
        Ok(changed)
    }

    fn get_toc_by_external_id(&self, external_id: &ExternalId) -> Result<Option<TocEntry>> {
        let toc = self.table("toc");
        let instance_id = external_id.instance_id.unwrap_or(0);
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT title, url, hash, relevance_ratio, date, metadata
                     FROM {toc} WHERE external_id = ?1 AND instance_id = ?2"
                ),
                params![external_id.id, instance_id],
                row_to_toc_entry,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
    }

    fn get_toc_by_external_ids(&self, ids: &[ExternalId]) -> Result<Vec<TocEntryWithMetadata>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let toc = self.table("toc");
        let metadata = self.table("metadata");

        let mut out = Vec::with_capacity(ids.len());
        for external_id in ids {
            let instance_id = external_id.instance_id.unwrap_or(0);
            let row = self.with_conn(|conn| {
                conn.query_row(
                    &format!(
                        "SELECT t.id, t.title, t.url, t.hash, t.relevance_ratio, t.date, t.metadata,
                                COALESCE(m.word_count, 0)
                         FROM {toc} t
                         LEFT JOIN {metadata} m ON m.toc_id = t.id
                         WHERE t.external_id = ?1 AND t.instance_id = ?2"
                    ),
                    params![external_id.id, instance_id],
                    |row| {
                        let toc_id: i64 = row.get(0)?;
                        let entry = row_to_toc_entry_from_offset(row, 1)?;
                        let word_count: i64 = row.get(7)?;
                        Ok((toc_id, entry, word_count))
                    },
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
            })?;

            if let Some((toc_id, entry, word_count)) = row {
                out.push(TocEntryWithMetadata {
                    toc_id,
                    external_id: external_id.clone(),
                    entry,
                    word_count,
                });
            }
        }
        Ok(out)
    }

    fn remove_from_index(&self, external_id: &ExternalId) -> Result<()> {
        let Some(toc_id) = self.internal_id(external_id)? else {
            return Ok(());
        };
        let fulltext = self.table("fulltext");
        let metadata = self.table("metadata");
        let snippet = self.table("snippet");
        self.with_conn(|conn| {
            conn.execute(&format!("DELETE FROM {fulltext} WHERE toc_id = ?1"), params![toc_id])?;
            conn.execute(&format!("DELETE FROM {metadata} WHERE toc_id = ?1"), params![toc_id])?;
            conn.execute(&format!("DELETE FROM {snippet} WHERE toc_id = ?1"), params![toc_id])?;
            Ok(())
        })
    }

    fn remove_from_toc(&self, external_id: &ExternalId) -> Result<()> {
        let toc = self.table("toc");
        let instance_id = external_id.instance_id.unwrap_or(0);
        self.with_conn(|conn| {
            conn.execute(
                &format!("DELETE FROM {toc} WHERE external_id = ?1 AND instance_id = ?2"),
                params![external_id.id, instance_id],
            )?;
            Ok(())
        })
    }

    fn add_to_fulltext_index(
        &self,
        title_words: &HashMap<Position, String>,
        keyword_words: &HashMap<Position, String>,
        content_words: &HashMap<Position, String>,
        external_id: &ExternalId,
    ) -> Result<()> {
        let Some(toc_id) = self.internal_id(external_id)? else {
            return Err(Error::Runtime(RuntimeError::UnknownId(
                external_id.to_string(),
            )));
        };
        let fulltext = self.table("fulltext");

        // word -> (title_positions, keyword_positions, content_positions)
        let mut per_word: HashMap<String, (Vec<i32>, Vec<i32>, Vec<i32>)> = HashMap::new();
        for (pos, stem) in title_words {
            per_word.entry(stem.clone()).or_default().0.push(pos.truncated());
        }
        for (pos, stem) in keyword_words {
            per_word.entry(stem.clone()).or_default().1.push(pos.truncated());
        }
        for (pos, stem) in content_words {
            per_word.entry(stem.clone()).or_default().2.push(pos.truncated());
        }

        self.with_conn(|conn| {
            for (word, (title, keyword, content)) in &per_word {
                let word_id = self.word_id(conn, word)?;
                let packed = position::merge_packed(&[
                    &position::pack_positions(Field::Title, title),
                    &position::pack_positions(Field::Keyword, keyword),
                    &position::pack_positions(Field::Content, content),
                ]);
                conn.execute(
                    &format!(
                        "INSERT INTO {fulltext} (word_id, toc_id, positions) VALUES (?1, ?2, ?3)
                         ON CONFLICT(word_id, toc_id) DO UPDATE SET positions = ?3"
                    ),
                    params![word_id, toc_id, packed],
                )?;
            }
            Ok(())
        })?;

        self.refresh_excluded_words()
    }

    fn add_metadata(
        &self,
        external_id: &ExternalId,
        word_count: i64,
        images: serde_json::Value,
    ) -> Result<()> {
        let Some(toc_id) = self.internal_id(external_id)? else {
            return Err(Error::Runtime(RuntimeError::UnknownId(
                external_id.to_string(),
            )));
        };
        let metadata = self.table("metadata");
        let images_str =
            serde_json::to_string(&images).map_err(|e| Error::InvalidArgument(e.to_string()))?;
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {metadata} (toc_id, word_count, images) VALUES (?1, ?2, ?3)
                     ON CONFLICT(toc_id) DO UPDATE SET word_count = ?2, images = ?3"
                ),
                params![toc_id, word_count, images_str],
            )?;
            Ok(())
        })
    }

    fn add_snippets(&self, external_id: &ExternalId, sources: &[SnippetSource]) -> Result<()> {
        let Some(toc_id) = self.internal_id(external_id)? else {
            return Err(Error::Runtime(RuntimeError::UnknownId(
                external_id.to_string(),
            )));
        };
        let snippet = self.table("snippet");
        self.with_conn(|conn| {
            for source in sources {
                conn.execute(
                    &format!(
                        "INSERT INTO {snippet} (toc_id, min_word_pos, max_word_pos, snippet, format_id)
                         VALUES (?1, ?2, ?3, ?4, ?5)"
                    ),
                    params![
                        toc_id,
                        source.min_word_pos,
                        source.max_word_pos,
                        source.text,
                        source.format.as_id(),
                    ],
                )?;
            }
            Ok(())
        })
    }

    fn fulltext_result_by_words(
        &self,
        words: &[String],
        instance_id: Option<u32>,
    ) -> Result<FulltextIndexContent> {
        let word_table = self.table("word");
        let toc = self.table("toc");
        let fulltext = self.table("fulltext");
        let metadata = self.table("metadata");

        let mut content = FulltextIndexContent::default();

        for word in words {
            let truncated = truncate_word(word, self.config.max_word_length).to_string();
            let rows: Vec<(String, u32, Vec<i32>, Vec<i32>, Vec<i32>, i64, f64)> =
                self.with_conn(|conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT t.external_id, t.instance_id, f.positions,
                                COALESCE(m.word_count, 0), t.relevance_ratio
                         FROM {fulltext} f
                         JOIN {word_table} w ON w.id = f.word_id
                         JOIN {toc} t ON t.id = f.toc_id
                         LEFT JOIN {metadata} m ON m.toc_id = t.id
                         WHERE w.name = ?1"
                    ))?;
                    stmt.query_map(params![truncated], |row| {
                        let ext_id: String = row.get(0)?;
                        let inst_id: u32 = row.get(1)?;
                        let packed: String = row.get(2)?;
                        let word_count: i64 = row.get(3)?;
                        let ratio: f64 = row.get(4)?;
                        let (title, keyword, content) = position::unpack_positions(&packed);
                        Ok((ext_id, inst_id, title, keyword, content, word_count, ratio))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()
                })?;

            let mut by_doc = HashMap::new();
            for (ext_id, inst_id, title, keyword, content_pos, word_count, ratio) in rows {
                if let Some(wanted) = instance_id {
                    if inst_id != wanted {
                        continue;
                    }
                }
                let external_id = ExternalId::new(
                    ext_id,
                    if inst_id == 0 { None } else { Some(inst_id) },
                );
                by_doc.insert(
                    external_id,
                    PositionBag {
                        title_positions: title,
                        keyword_positions: keyword,
                        content_positions: content_pos,
                        word_count,
                        external_relevance_ratio: ratio,
                    },
                );
            }
            content.by_word.insert(word.clone(), by_doc);
        }

        Ok(content)
    }

    fn get_snippets(&self, query: &SnippetQuery) -> Result<Vec<SnippetRow>> {
        if query.requests.is_empty() {
            return Ok(Vec::new());
        }
        let toc = self.table("toc");
        let snippet = self.table("snippet");

        let mut rows_by_toc: HashMap<i64, ExternalId> = HashMap::new();
        for req in &query.requests {
            if let Some(toc_id) = self.internal_id(&req.external_id)? {
                rows_by_toc.insert(toc_id, req.external_id.clone());
            }
        }

        let mut out = Vec::new();
        for req in &query.requests {
            let Some(toc_id) = self.internal_id(&req.external_id)? else {
                continue;
            };

            // Matched-sentence set: every snippet row covering a matched
            // content position.
            let matched: Vec<(i32, i32, String, i32)> = if req.positions.is_empty() {
                Vec::new()
            } else {
                self.with_conn(|conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT min_word_pos, max_word_pos, snippet, format_id
                         FROM {snippet} WHERE toc_id = ?1
                         ORDER BY max_word_pos"
                    ))?;
                    stmt.query_map(params![toc_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()
                })?
                .into_iter()
                .filter(|(min_pos, max_pos, _, _)| {
                    req.positions.iter().any(|p| *p >= *min_pos && *p <= *max_pos)
                })
                .collect()
            };

            // Fallback set: first two rows ordered by max_word_pos, fetched
            // unconditionally for every requested toc_id per §4.5 — even
            // when the matched set above is already non-empty.
            let fallback: Vec<(i32, i32, String, i32)> = self.with_conn(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT min_word_pos, max_word_pos, snippet, format_id
                     FROM {snippet} WHERE toc_id = ?1
                     ORDER BY max_word_pos LIMIT 2"
                ))?;
                stmt.query_map(params![toc_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
            })?;

            // Union, deduplicated by (min_word_pos, max_word_pos) so a row
            // appearing in both sets isn't emitted twice.
            let mut seen: HashSet<(i32, i32)> = HashSet::new();
            let union: Vec<(i32, i32, String, i32)> = matched
                .into_iter()
                .chain(fallback)
                .filter(|(min_pos, max_pos, _, _)| seen.insert((*min_pos, *max_pos)))
                .collect();

            for (min_pos, max_pos, text, format_id) in union {
                out.push(SnippetRow {
                    external_id: req.external_id.clone(),
                    source: SnippetSource {
                        min_word_pos: min_pos,
                        max_word_pos: max_pos,
                        text,
                        format: SnippetFormat::from_id(format_id),
                    },
                });
            }
        }

        out.sort_by(|a, b| {
            let toc_a = rows_by_toc.iter().find(|(_, v)| **v == a.external_id).map(|(k, _)| *k);
            let toc_b = rows_by_toc.iter().find(|(_, v)| **v == b.external_id).map(|(k, _)| *k);
            toc_a
                .cmp(&toc_b)
                .then(a.source.max_word_pos.cmp(&b.source.max_word_pos))
        });

        Ok(out)
    }

    fn get_toc_size(&self, instance_id: Option<u32>) -> Result<i64> {
        let toc = self.table("toc");
        self.with_conn(|conn| match instance_id {
            Some(inst) => conn.query_row(
                &format!("SELECT COUNT(*) FROM {toc} WHERE instance_id = ?1"),
                params![inst],
                |row| row.get(0),
            ),
            None => conn.query_row(&format!("SELECT COUNT(*) FROM {toc}"), [], |row| row.get(0)),
        })
    }

    fn is_excluded_word(&self, word: &str) -> Result<bool> {
        Ok(self.excluded_words.read().contains(word))
    }

    fn erase(&self) -> Result<()> {
        self.drop_schema()?;
        self.setup_schema()?;
        self.refresh_excluded_words()
    }

    fn drop_schema(&self) -> Result<()> {
        let toc = self.table("toc");
        let word = self.table("word");
        let fulltext = self.table("fulltext");
        let metadata = self.table("metadata");
        let snippet = self.table("snippet");
        self.with_conn(|conn| {
            conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS {fulltext};
                 DROP TABLE IF EXISTS {metadata};
                 DROP TABLE IF EXISTS {snippet};
                 DROP TABLE IF EXISTS {toc};
                 DROP TABLE IF EXISTS {word};"
            ))
        })
    }

    fn start_transaction(&self) -> Result<()> {
        let mut guard = self.tx.lock();
        if guard.depth > 0 {
            guard.depth += 1;
            return Ok(());
        }
        let conn = self.pooled_conn()?;
        conn.execute_batch("BEGIN")
            .map_err(|e| Error::from(BackendError::from(e)))?;
        guard.depth = 1;
        guard.conn = Some(conn);
        tracing::debug!("transaction started");
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        let mut guard = self.tx.lock();
        if guard.depth == 0 {
            return Err(Error::InvalidArgument("no open transaction".to_string()));
        }
        guard.depth -= 1;
        if guard.depth == 0 {
            if let Some(conn) = guard.conn.take() {
                conn.execute_batch("COMMIT")
                    .map_err(|e| Error::from(BackendError::from(e)))?;
                tracing::debug!("transaction committed");
            }
        }
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<()> {
        let mut guard = self.tx.lock();
        if guard.depth == 0 {
            return Err(Error::InvalidArgument("no open transaction".to_string()));
        }
        guard.depth -= 1;
        if guard.depth == 0 {
            if let Some(conn) = guard.conn.take() {
                conn.execute_batch("ROLLBACK")
                    .map_err(|e| Error::from(BackendError::from(e)))?;
                tracing::debug!("transaction rolled back");
            }
        }
        Ok(())
    }
}

fn row_to_toc_entry(row: &rusqlite::Row) -> rusqlite::Result<TocEntry> {
    row_to_toc_entry_from_offset(row, 0)
}

fn row_to_toc_entry_from_offset(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<TocEntry> {
    let title: String = row.get(offset)?;
    let url: String = row.get(offset + 1)?;
    let hash: String = row.get(offset + 2)?;
    let ratio: f64 = row.get(offset + 3)?;
    let date_str: Option<String> = row.get(offset + 4)?;
    let metadata_str: Option<String> = row.get(offset + 5)?;

    let date = date_str.and_then(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    });
    let metadata = metadata_str
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);

    Ok(TocEntry {
        title,
        url,
        hash,
        external_relevance_ratio: ratio,
        date,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().unwrap()
    }

    #[test]
    fn toc_upsert_then_lookup_resolves() {
        let storage = storage();
        let id = ExternalId::without_instance("doc1");
        storage
            .add_entry_to_toc(&TocEntry::new("Title", "http://x", "h1"), &id)
            .unwrap();
        let entry = storage.get_toc_by_external_id(&id).unwrap().unwrap();
        assert_eq!(entry.title, "Title");
        assert_eq!(entry.hash, "h1");
    }

    #[test]
    fn upsert_if_changed_reports_first_insert_as_changed() {
        let storage = storage();
        let id = ExternalId::without_instance("doc1");
        let changed = storage
            .upsert_if_changed(&TocEntry::new("T", "u", "h1"), &id)
            .unwrap();
        assert!(changed);
        let changed_again = storage
            .upsert_if_changed(&TocEntry::new("T", "u", "h1"), &id)
            .unwrap();
        assert!(!changed_again);
        let changed_on_new_hash = storage
            .upsert_if_changed(&TocEntry::new("T", "u", "h2"), &id)
            .unwrap();
        assert!(changed_on_new_hash);
    }

    #[test]
    fn remove_from_index_is_idempotent_on_absence() {
        let storage = storage();
        let id = ExternalId::without_instance("missing");
        storage.remove_from_index(&id).unwrap();
        storage.remove_from_toc(&id).unwrap();
    }

    #[test]
    fn fulltext_position_bag_roundtrips_through_storage() {
        let storage = storage();
        let id = ExternalId::without_instance("doc1");
        storage
            .add_entry_to_toc(&TocEntry::new("T", "u", "h1"), &id)
            .unwrap();

        let mut content_words = HashMap::new();
        content_words.insert(Position::Integer(5), "hello".to_string());
        content_words.insert(Position::Integer(9), "hello".to_string());

        storage
            .add_to_fulltext_index(&HashMap::new(), &HashMap::new(), &content_words, &id)
            .unwrap();

        let result = storage
            .fulltext_result_by_words(&["hello".to_string()], None)
            .unwrap();
        let bag = &result.by_word["hello"][&id];
        let mut positions = bag.content_positions.clone();
        positions.sort();
        assert_eq!(positions, vec![5, 9]);
    }

    #[test]
    fn reentrant_transaction_only_outer_pair_commits() {
        let storage = storage();
        storage.start_transaction().unwrap();
        storage.start_transaction().unwrap();
        storage.commit_transaction().unwrap();
        // still nested, inner commit was a no-op
        assert_eq!(storage.tx.lock().depth, 1);
        storage.commit_transaction().unwrap();
        assert_eq!(storage.tx.lock().depth, 0);
    }

    #[test]
    fn truncate_word_respects_utf8_boundaries() {
        let long = "a".repeat(300);
        assert_eq!(truncate_word(&long, 255).len(), 255);

        let multibyte = "é".repeat(200); // 2 bytes each, 400 bytes total
        let truncated = truncate_word(&multibyte, 255);
        assert!(truncated.len() <= 255);
        assert!(truncated.is_char_boundary(truncated.len()));
    }

    #[test]
    fn erase_drops_and_recreates_schema() {
        let storage = storage();
        let id = ExternalId::without_instance("doc1");
        storage
            .add_entry_to_toc(&TocEntry::new("T", "u", "h1"), &id)
            .unwrap();
        storage.erase().unwrap();
        assert_eq!(storage.get_toc_size(None).unwrap(), 0);
    }

    /// `:memory:` databases aren't representative of the pooled multi-
    /// connection path `SqliteStorage::open` takes in production (each
    /// pooled connection would otherwise see its own empty in-memory
    /// database); an on-disk tempfile exercises the real pool.
    #[test]
    fn on_disk_pool_shares_state_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fulltext.sqlite3");
        let storage = SqliteStorage::open(&path, StoreConfig::default()).unwrap();

        let id = ExternalId::without_instance("doc1");
        storage
            .add_entry_to_toc(&TocEntry::new("T", "u", "h1"), &id)
            .unwrap();

        // A lookup that may borrow a different pooled connection must still
        // see the write above.
        let entry = storage.get_toc_by_external_id(&id).unwrap().unwrap();
        assert_eq!(entry.hash, "h1");
    }
}
