//! Persisted reading progress and the store boundary.

use crate::db::Database;
use crate::error::Result;
use crate::navigation::NavigationPosition;
use crate::pagination::PaginationLedger;
use crate::reading_time::PageReadingRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reading progress for one document.
///
/// `chapter_index`/`sub_page` are authoritative; the absolute page and
/// percentage are written alongside for display and older readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Spine index; absent in legacy records.
    pub chapter_index: Option<usize>,
    /// Page within the chapter; absent in legacy records.
    pub sub_page: Option<usize>,
    /// 1-indexed absolute page at save time.
    pub legacy_absolute_page: usize,
    /// Chapter title at save time, display only.
    pub chapter_label: Option<String>,
    /// Last requested anchor. Advisory, not read back by the engine.
    pub fragment: Option<String>,
    /// Known total pages at save time.
    pub total_pages: Option<usize>,
    /// Percent complete, 0 to 100.
    pub percent_complete: f64,
    /// When the record was written.
    pub last_read: DateTime<Utc>,
    /// Cumulative reading time per page.
    pub page_reading_times: Vec<PageReadingRecord>,
}

impl ProgressRecord {
    /// A record carrying only the legacy absolute page.
    pub fn legacy(absolute_page: usize) -> Self {
        Self {
            chapter_index: None,
            sub_page: None,
            legacy_absolute_page: absolute_page,
            chapter_label: None,
            fragment: None,
            total_pages: None,
            percent_complete: 0.0,
            last_read: Utc::now(),
            page_reading_times: Vec::new(),
        }
    }

    /// The chapter-relative position, when both fields are present.
    pub fn position(&self) -> Option<NavigationPosition> {
        match (self.chapter_index, self.sub_page) {
            (Some(chapter), Some(sub_page)) => Some(NavigationPosition::new(chapter, sub_page)),
            _ => None,
        }
    }

    /// Position to resume at.
    ///
    /// The chapter-relative fields are trusted as stored; only when they are
    /// missing is the legacy absolute page mapped through `ledger`.
    pub fn resolve_position(&self, ledger: &PaginationLedger) -> NavigationPosition {
        match self.position() {
            Some(position) => position,
            None => {
                let position = ledger.page_and_chapter(self.legacy_absolute_page);
                tracing::info!(
                    absolute_page = self.legacy_absolute_page,
                    chapter = position.chapter,
                    sub_page = position.sub_page,
                    "Migrated legacy progress record"
                );
                position
            }
        }
    }
}

/// Persistence boundary for progress records.
pub trait ProgressStore: Send + Sync {
    /// Load the record for a book, if one was ever saved.
    fn load(&self, book_id: &str) -> Result<Option<ProgressRecord>>;

    /// Replace the record for a book.
    fn save(&self, book_id: &str, record: &ProgressRecord) -> Result<()>;
}

impl ProgressStore for Database {
    fn load(&self, book_id: &str) -> Result<Option<ProgressRecord>> {
        self.get_progress(book_id)
    }

    fn save(&self, book_id: &str, record: &ProgressRecord) -> Result<()> {
        self.save_progress(book_id, record)
    }
}
