use crate::model::{Collection, CollectionSummary};
use folio_scanner::{ChapterRecord, ContentType, SelectorSet};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use std::fs;
use std::path::Path;

/// Key-value store of collections, keyed by collection id.
///
/// Selectors and chapters are kept as JSON and always read or written whole.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

const COLLECTION_COLUMNS: &str =
    "id, name, source_url, content_type, selectors, chapters, created_at, updated_at";

impl Database {
    /// Removes the database file along with any WAL sidecar files.
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)?;
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = Path::new(&sidecar);
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
        Ok(())
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Throwaway store, used when a run should not touch disk.
    pub fn in_memory() -> Result<Self> {
        let db = Database {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    source_url TEXT NOT NULL,
    content_type TEXT NOT NULL CHECK(content_type IN ('text', 'image')),
    selectors TEXT NOT NULL,  -- JSON object (titleSelector, contentSelector, nextPageSelector)
    chapters TEXT NOT NULL,   -- JSON array of chapters
    chapter_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_collections_name ON collections(name);
CREATE INDEX IF NOT EXISTS idx_collections_updated ON collections(updated_at);
            ",
        )?;

        Ok(())
    }

    /// Insert or wholesale replace a collection.
    pub fn save_collection(&self, collection: &Collection) -> Result<()> {
        let selectors = to_json(&collection.selectors)?;
        let chapters = to_json(&collection.chapters)?;

        self.conn.execute(
            "INSERT INTO collections (
                id, name, source_url, content_type, selectors, chapters,
                chapter_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                source_url = excluded.source_url,
                content_type = excluded.content_type,
                selectors = excluded.selectors,
                chapters = excluded.chapters,
                chapter_count = excluded.chapter_count,
                updated_at = excluded.updated_at",
            params![
                &collection.id,
                &collection.name,
                &collection.source_url,
                collection.content_type.as_str(),
                selectors,
                chapters,
                collection.chapters.len() as i64,
                collection.created_at,
                collection.updated_at,
            ],
        )?;

        Ok(())
    }

    pub fn get_collection(&self, id: &str) -> Result<Option<Collection>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM collections WHERE id = ?1",
            COLLECTION_COLUMNS
        ))?;

        stmt.query_row(params![id], row_to_collection).optional()
    }

    /// Look a collection up by exact id, then by unique id prefix, then by exact name.
    pub fn find_collection(&self, key: &str) -> Result<Option<Collection>> {
        if let Some(collection) = self.get_collection(key)? {
            return Ok(Some(collection));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id FROM collections WHERE id LIKE ?1 || '%' ESCAPE '\\' LIMIT 2")?;
        let prefixed = stmt
            .query_map(params![escape_like(key)], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>>>()?;
        if let [only] = prefixed.as_slice() {
            return self.get_collection(only);
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM collections WHERE name = ?1 ORDER BY updated_at DESC LIMIT 1",
            COLLECTION_COLUMNS
        ))?;
        stmt.query_row(params![key], row_to_collection).optional()
    }

    pub fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, source_url, content_type, chapter_count, updated_at
             FROM collections ORDER BY updated_at DESC, name",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(CollectionSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    source_url: row.get(2)?,
                    content_type: content_type_column(row, 3)?,
                    chapter_count: row.get::<_, i64>(4)? as usize,
                    updated_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(summaries)
    }

    /// Returns false when no collection has that id.
    pub fn rename_collection(&self, id: &str, name: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE collections SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, current_timestamp(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn update_selectors(&self, id: &str, selectors: &SelectorSet) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE collections SET selectors = ?1, updated_at = ?2 WHERE id = ?3",
            params![to_json(selectors)?, current_timestamp(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_collection(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM collections WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Add chapters to the end of an existing collection.
    pub fn append_chapters(&self, id: &str, chapters: &[ChapterRecord]) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT chapters FROM collections WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(existing) = existing else {
            return Ok(false);
        };

        let mut all: Vec<ChapterRecord> = from_json(&existing, 0)?;
        all.extend_from_slice(chapters);

        tx.execute(
            "UPDATE collections SET chapters = ?1, chapter_count = ?2, updated_at = ?3 WHERE id = ?4",
            params![to_json(&all)?, all.len() as i64, current_timestamp(), id],
        )?;
        tx.commit()?;

        Ok(true)
    }

    pub fn count_collections(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_collection(row: &Row<'_>) -> Result<Collection> {
    let selectors: String = row.get(4)?;
    let chapters: String = row.get(5)?;

    Ok(Collection {
        id: row.get(0)?,
        name: row.get(1)?,
        source_url: row.get(2)?,
        content_type: content_type_column(row, 3)?,
        selectors: from_json(&selectors, 4)?,
        chapters: from_json(&chapters, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn content_type_column(row: &Row<'_>, idx: usize) -> Result<ContentType> {
    let raw: String = row.get(idx)?;
    ContentType::from_str(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown content type '{}'", raw).into(),
        )
    })
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str, idx: usize) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
