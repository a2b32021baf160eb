use crate::db::*;
use crate::error::{AppError, Result};
use crate::navigation::PageId;
use crate::progress::ProgressRecord;
use crate::reading_time::PageReadingRecord;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Books opened at least once
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT,
                path TEXT NOT NULL,
                opened_at INTEGER NOT NULL
            );

            -- Reading progress, one row per book
            CREATE TABLE IF NOT EXISTS reading_progress (
                book_id TEXT PRIMARY KEY,
                chapter_index INTEGER,
                sub_page INTEGER,
                absolute_page INTEGER NOT NULL,
                chapter_label TEXT,
                position_fragment TEXT,
                total_pages INTEGER,
                percentage REAL NOT NULL DEFAULT 0,
                last_read_at INTEGER NOT NULL
            );

            -- Cumulative reading time per page
            CREATE TABLE IF NOT EXISTS page_reading_times (
                book_id TEXT NOT NULL,
                page_id TEXT NOT NULL,
                seconds INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (book_id, page_id),
                FOREIGN KEY (book_id) REFERENCES reading_progress(book_id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_opened ON books(opened_at);
            CREATE INDEX IF NOT EXISTS idx_progress_last_read ON reading_progress(last_read_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== BOOK OPERATIONS ==========

    /// Save or update a book.
    pub fn save_book(&self, book: &StoredBook) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books (id, title, author, path, opened_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                path = excluded.path,
                opened_at = excluded.opened_at",
            params![book.id, book.title, book.author, book.path, book.opened_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save book: {}", e)))?;
        Ok(())
    }

    /// Get a book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<StoredBook>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, title, author, path, opened_at FROM books WHERE id = ?1",
            params![id],
            Self::row_to_stored_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    fn row_to_stored_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredBook> {
        Ok(StoredBook {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            path: row.get(3)?,
            opened_at: row.get(4)?,
        })
    }

    // ========== PROGRESS OPERATIONS ==========

    /// Save or replace reading progress and its page reading times.
    pub fn save_progress(&self, book_id: &str, progress: &ProgressRecord) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO reading_progress
             (book_id, chapter_index, sub_page, absolute_page, chapter_label,
              position_fragment, total_pages, percentage, last_read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (book_id) DO UPDATE SET
                chapter_index = excluded.chapter_index,
                sub_page = excluded.sub_page,
                absolute_page = excluded.absolute_page,
                chapter_label = excluded.chapter_label,
                position_fragment = excluded.position_fragment,
                total_pages = excluded.total_pages,
                percentage = excluded.percentage,
                last_read_at = excluded.last_read_at",
            params![
                book_id,
                progress.chapter_index.map(|c| c as i64),
                progress.sub_page.map(|p| p as i64),
                progress.legacy_absolute_page as i64,
                progress.chapter_label,
                progress.fragment,
                progress.total_pages.map(|t| t as i64),
                progress.percent_complete,
                progress.last_read.timestamp(),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save progress: {}", e)))?;

        for record in &progress.page_reading_times {
            tx.execute(
                "INSERT INTO page_reading_times (book_id, page_id, seconds)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (book_id, page_id) DO UPDATE SET seconds = excluded.seconds",
                params![
                    book_id,
                    record.page_id.as_str(),
                    record.cumulative_seconds as i64
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to save reading time: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit progress: {}", e)))?;
        Ok(())
    }

    /// Get reading progress for a book.
    pub fn get_progress(&self, book_id: &str) -> Result<Option<ProgressRecord>> {
        let conn = self.conn.lock();
        let progress = conn
            .query_row(
                "SELECT chapter_index, sub_page, absolute_page, chapter_label, position_fragment,
                        total_pages, percentage, last_read_at
                 FROM reading_progress WHERE book_id = ?1",
                params![book_id],
                |row| {
                    Ok(ProgressRecord {
                        chapter_index: row.get::<_, Option<i64>>(0)?.map(|c| c as usize),
                        sub_page: row.get::<_, Option<i64>>(1)?.map(|p| p as usize),
                        legacy_absolute_page: row.get::<_, i64>(2)?.max(1) as usize,
                        chapter_label: row.get(3)?,
                        fragment: row.get(4)?,
                        total_pages: row.get::<_, Option<i64>>(5)?.map(|t| t as usize),
                        percent_complete: row.get(6)?,
                        last_read: timestamp_to_datetime(row.get(7)?),
                        page_reading_times: Vec::new(),
                    })
                },
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to get progress: {}", e)))?;

        let Some(mut progress) = progress else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT page_id, seconds FROM page_reading_times
                 WHERE book_id = ?1 ORDER BY page_id",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        progress.page_reading_times = stmt
            .query_map(params![book_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| AppError::Internal(format!("Failed to get reading times: {}", e)))?
            .filter_map(|r| r.ok())
            .filter_map(|(page_id, seconds)| {
                let page_id = page_id.parse::<PageId>().ok()?;
                Some(PageReadingRecord {
                    page_id,
                    cumulative_seconds: seconds.max(0) as u64,
                })
            })
            .collect();

        Ok(Some(progress))
    }

    /// Every stored progress record, most recently read first.
    pub fn list_progress(&self) -> Result<Vec<(String, ProgressRecord)>> {
        let book_ids: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare("SELECT book_id FROM reading_progress ORDER BY last_read_at DESC")
                .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

            stmt.query_map([], |row| row.get(0))
                .map_err(|e| AppError::Internal(format!("Failed to list progress: {}", e)))?
                .filter_map(|r| r.ok())
                .collect()
        };

        let mut records = Vec::with_capacity(book_ids.len());
        for book_id in book_ids {
            if let Some(progress) = self.get_progress(&book_id)? {
                records.push((book_id, progress));
            }
        }
        Ok(records)
    }
}
