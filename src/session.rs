//! An open reading session: the one owner of a document's navigation,
//! pagination and reading-time state.
//!
//! Every transition goes through the [`Navigator`], and the effects it
//! returns are applied here in order against the renderer, the reading-time
//! ledger and the progress store.

mod clock;

pub use clock::ReadingClock;

use crate::config::{Config, PreviousChapterLanding};
use crate::container::ContainerResolver;
use crate::document::{Document, TocNode};
use crate::error::{AppError, Result};
use crate::library::Book;
use crate::navigation::{Effect, NavigationPosition, Navigator, PageId};
use crate::pagination::{PaginationLedger, Provenance};
use crate::progress::{ProgressRecord, ProgressStore};
use crate::reading_time::ReadingTimeLedger;
use crate::renderer::Renderer;
use crate::toc::{TocResolver, TocTarget};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Seconds a page must be read before it unlocks.
    pub unlock_threshold_seconds: u64,
    /// Bytes per estimated page.
    pub bytes_per_page: u64,
    /// Estimate all chapters before the first render.
    pub estimate_on_open: bool,
    /// Landing page when paging back into the previous chapter.
    pub previous_chapter: PreviousChapterLanding,
    /// Position to open at instead of the stored one.
    pub initial: Option<NavigationPosition>,
}

impl SessionOptions {
    /// Options from the reading and pagination sections of `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            unlock_threshold_seconds: config.reading.unlock_threshold_seconds,
            bytes_per_page: config.pagination.bytes_per_page,
            estimate_on_open: config.pagination.estimate_on_open,
            previous_chapter: config.pagination.previous_chapter,
            initial: None,
        }
    }

    /// Open at `position` regardless of stored progress.
    pub fn with_initial(mut self, position: NavigationPosition) -> Self {
        self.initial = Some(position);
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Status line data for the current page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLabel {
    /// Spine index.
    pub chapter: usize,
    /// Resolved chapter title.
    pub chapter_title: String,
    /// Page within the chapter, 0-indexed.
    pub sub_page: usize,
    /// Pages in the chapter as currently known.
    pub chapter_pages: usize,
    /// 1-indexed absolute page.
    pub absolute_page: usize,
    /// Known total pages.
    pub total_pages: usize,
    /// Percent complete.
    pub percent_complete: f64,
}

impl PageLabel {
    /// `"Chapter {n}: {title}"`.
    pub fn chapter_text(&self) -> String {
        format!("Chapter {}: {}", self.chapter + 1, self.chapter_title)
    }

    /// `"Page {x} of {y}"`, chapter-relative.
    pub fn page_text(&self) -> String {
        format!("Page {} of {}", self.sub_page + 1, self.chapter_pages)
    }
}

impl fmt::Display for PageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {}/{} ({:.0}%)",
            self.chapter_text(),
            self.page_text(),
            self.absolute_page,
            self.total_pages,
            self.percent_complete
        )
    }
}

/// An open document bound to a renderer and a progress store.
pub struct ReaderSession<R: Renderer> {
    book: Book,
    document: Document,
    pagination: PaginationLedger,
    navigator: Navigator,
    reading: ReadingTimeLedger,
    store: Arc<dyn ProgressStore>,
    renderer: R,
    foreground: bool,
    fragment: Option<String>,
    selected_text: Option<String>,
}

impl<R: Renderer> ReaderSession<R> {
    /// Extract and parse `book`, restore its progress and open the first
    /// chapter to show.
    ///
    /// Extraction and parsing run on the blocking pool. If the returned
    /// future is dropped they still finish, and their result is discarded.
    pub async fn open(
        mut book: Book,
        resolver: &ContainerResolver,
        store: Arc<dyn ProgressStore>,
        renderer: R,
        options: SessionOptions,
    ) -> Result<Self> {
        let root = resolver.resolve(&book.path, &book.id).await?;

        let estimate = options.estimate_on_open;
        let (document, sizes) = tokio::task::spawn_blocking(move || {
            let document = Document::open(&root)?;
            let sizes = if estimate {
                document.chapter_sizes()
            } else {
                Vec::new()
            };
            Ok::<_, AppError>((document, sizes))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Parse task failed: {}", e)))??;

        book.apply_metadata(&document.metadata);

        let mut pagination = PaginationLedger::new(document.chapter_count());
        if estimate {
            pagination.estimate_from_sizes(&sizes, options.bytes_per_page);
        }

        let stored = match store.load(&book.id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(book = %book.id, error = %e, "Failed to load progress, starting fresh");
                None
            }
        };

        let reading = match &stored {
            Some(record) => ReadingTimeLedger::with_records(
                options.unlock_threshold_seconds,
                &record.page_reading_times,
            ),
            None => ReadingTimeLedger::new(options.unlock_threshold_seconds),
        };

        let position = match (options.initial, &stored) {
            (Some(initial), _) => {
                tracing::debug!(
                    chapter = initial.chapter,
                    sub_page = initial.sub_page,
                    "Opening at requested position"
                );
                initial
            }
            (None, Some(record)) => record.resolve_position(&pagination),
            (None, None) => NavigationPosition::default(),
        };

        tracing::info!(
            book = %book.id,
            title = %book.title,
            chapters = document.chapter_count(),
            chapter = position.chapter,
            sub_page = position.sub_page,
            "Opened reading session"
        );

        let mut session = Self {
            navigator: Navigator::new(document.chapter_count(), options.previous_chapter),
            book,
            document,
            pagination,
            reading,
            store,
            renderer,
            foreground: true,
            fragment: None,
            selected_text: None,
        };

        let effects = session.navigator.start(position);
        session.apply(effects);
        Ok(session)
    }

    // ========== NAVIGATION ==========

    /// Advance one page.
    pub fn next_page(&mut self) {
        let effects = self.navigator.next_page();
        self.apply(effects);
    }

    /// Go back one page.
    pub fn previous_page(&mut self) {
        let effects = self.navigator.previous_page();
        self.apply(effects);
    }

    /// Jump to a chapter, optionally to an anchor inside it.
    pub fn jump_to_chapter(&mut self, index: usize, fragment: Option<String>) {
        let effects = self.navigator.jump_to_chapter(index, fragment);
        self.apply(effects);
    }

    /// Jump to a chapter and page.
    pub fn jump_to_position(&mut self, position: NavigationPosition) {
        let effects = self.navigator.jump_to_position(position);
        self.apply(effects);
    }

    /// Jump to where a TOC entry points.
    ///
    /// Returns false, and stays put, when the entry resolves to no chapter.
    pub fn jump_to_toc(&mut self, entry: &TocNode) -> bool {
        let target = self.resolve_toc(entry);
        match target.spine_index {
            Some(index) => {
                self.jump_to_chapter(index, target.fragment);
                true
            }
            None => {
                tracing::debug!(label = %entry.label, "TOC entry does not resolve to a chapter");
                false
            }
        }
    }

    /// The renderer laid out `chapter` as `pages` pages.
    ///
    /// The count is always recorded; queued navigation is only honoured
    /// when `chapter` is still the current one.
    pub fn report_page_count(&mut self, chapter: usize, pages: usize) {
        self.pagination
            .record_page_count(chapter, pages, Provenance::Measured);
        let effects = self.navigator.on_page_count(chapter, pages);
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenChapter(chapter) => {
                    self.fragment = None;
                    match self.document.chapter_uri(chapter) {
                        Some(uri) => self.renderer.open_content(&uri),
                        None => tracing::warn!(chapter, "No content for chapter"),
                    }
                }
                Effect::ScrollToPage(page) => self.renderer.scroll_to_page(page),
                Effect::ScrollToFragment(fragment) => {
                    self.renderer.scroll_to_fragment(&fragment);
                    self.fragment = Some(fragment);
                }
                Effect::FlushReadingTime(page) => {
                    self.reading.flush(&page);
                }
                Effect::Persist => self.persist(),
            }
        }
    }

    // ========== READING TIME ==========

    /// Count one second on the current page, unless backgrounded.
    pub fn tick(&mut self) {
        if !self.foreground || self.document.is_empty() {
            return;
        }
        let page = self.current_page_identifier();
        self.reading.tick(&page);
    }

    /// Mark the session foregrounded or backgrounded.
    ///
    /// Going to the background flushes the current page and saves.
    pub fn set_foreground(&mut self, foreground: bool) {
        if self.foreground == foreground {
            return;
        }
        self.foreground = foreground;
        tracing::debug!(foreground, "Session visibility changed");
        if !foreground {
            self.checkpoint();
        }
    }

    /// Whether ticks are being counted.
    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// Flush the current page's reading time and save progress.
    pub fn checkpoint(&mut self) {
        if self.document.is_empty() {
            return;
        }
        let page = self.current_page_identifier();
        self.reading.flush(&page);
        self.persist();
    }

    /// End the session, saving the current page's time and position.
    pub fn close(mut self) -> R {
        self.checkpoint();
        tracing::info!(book = %self.book.id, "Closed reading session");
        self.renderer
    }

    /// Identifier of the page being read.
    ///
    /// While a stored page waits for the chapter's page count this is the
    /// stored page, not sub-page 0.
    pub fn current_page_identifier(&self) -> PageId {
        self.navigator.resume_position().page_id()
    }

    /// Whether `page` has enough flushed reading time.
    pub fn is_unlocked(&self, page: &PageId) -> bool {
        self.reading.is_unlocked(page)
    }

    /// Seconds still needed on `page` before it unlocks.
    pub fn seconds_remaining(&self, page: &PageId) -> u64 {
        self.reading.seconds_remaining(page)
    }

    /// Whether `target` counts as read from the current position.
    pub fn has_been_read(&self, target: NavigationPosition) -> bool {
        self.reading
            .has_been_read(target, self.navigator.resume_position())
    }

    /// Reading-time ledger.
    pub fn reading_time(&self) -> &ReadingTimeLedger {
        &self.reading
    }

    // ========== PROGRESS ==========

    /// Progress record for the current state, both encodings filled in.
    ///
    /// A restore still waiting for the page count is recorded as the
    /// position, so saving before the chapter is measured keeps it.
    pub fn progress_record(&self) -> ProgressRecord {
        let position = self.navigator.resume_position();
        let absolute_page = self.pagination.absolute_page(position);
        ProgressRecord {
            chapter_index: Some(position.chapter),
            sub_page: Some(position.sub_page),
            legacy_absolute_page: absolute_page,
            chapter_label: Some(self.chapter_title(position.chapter)),
            fragment: self
                .fragment
                .clone()
                .or_else(|| self.navigator.pending_fragment().map(String::from)),
            total_pages: Some(self.pagination.total_pages().max(absolute_page)),
            percent_complete: self.pagination.percent_complete(position),
            last_read: Utc::now(),
            page_reading_times: self.reading.records(),
        }
    }

    /// Save progress. Failures are logged; in-memory state stays authoritative.
    fn persist(&mut self) {
        if self.document.is_empty() {
            return;
        }

        let record = self.progress_record();
        match self.store.save(&self.book.id, &record) {
            Ok(()) => tracing::debug!(
                book = %self.book.id,
                chapter = ?record.chapter_index,
                sub_page = ?record.sub_page,
                absolute_page = record.legacy_absolute_page,
                "Saved progress"
            ),
            Err(e) => tracing::warn!(book = %self.book.id, error = %e, "Failed to save progress"),
        }
    }

    // ========== POSITION ==========

    /// Current position.
    pub fn position(&self) -> NavigationPosition {
        self.navigator.position()
    }

    /// 1-indexed absolute page of the current position.
    pub fn absolute_page(&self) -> usize {
        self.pagination.absolute_page(self.navigator.position())
    }

    /// Known total pages, never less than the current absolute page.
    pub fn total_pages(&self) -> usize {
        self.pagination.total_pages().max(self.absolute_page())
    }

    /// Approximate percent read.
    pub fn percent_complete(&self) -> f64 {
        if self.document.is_empty() {
            return 0.0;
        }
        self.pagination.percent_complete(self.navigator.position())
    }

    /// Pages of the current chapter: the measured count for this load, else
    /// the ledger's estimate.
    pub fn chapter_pages(&self) -> usize {
        if self.navigator.is_measured() {
            self.navigator.current_page_count()
        } else {
            self.pagination
                .pages_in(self.navigator.position().chapter)
                .max(1)
        }
    }

    /// Status line data for the current page.
    pub fn page_label(&self) -> PageLabel {
        let position = self.navigator.position();
        PageLabel {
            chapter: position.chapter,
            chapter_title: self.chapter_title(position.chapter),
            sub_page: position.sub_page,
            chapter_pages: self.chapter_pages(),
            absolute_page: self.absolute_page(),
            total_pages: self.total_pages(),
            percent_complete: self.percent_complete(),
        }
    }

    /// Per-chapter page counts.
    pub fn pagination(&self) -> &PaginationLedger {
        &self.pagination
    }

    // ========== TABLE OF CONTENTS ==========

    /// Top-level TOC entries.
    pub fn toc(&self) -> &[TocNode] {
        &self.document.toc
    }

    /// Where a TOC entry points.
    pub fn resolve_toc(&self, entry: &TocNode) -> TocTarget {
        TocResolver::new(&self.document).resolve(entry)
    }

    /// Title of a chapter.
    pub fn chapter_title(&self, chapter: usize) -> String {
        TocResolver::new(&self.document).find_title(chapter)
    }

    /// Whether a TOC entry points into the current chapter.
    pub fn is_current_chapter(&self, entry: &TocNode) -> bool {
        let current = self.navigator.position().chapter;
        TocResolver::new(&self.document).is_current_chapter(entry, current)
    }

    // ========== SELECTION ==========

    /// The renderer reports the user's text selection.
    pub fn report_selected_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.selected_text = (!text.trim().is_empty()).then_some(text);
    }

    /// Text currently selected, if any.
    pub fn selected_text(&self) -> Option<&str> {
        self.selected_text.as_deref()
    }

    /// Drop the current selection.
    pub fn clear_selection(&mut self) {
        self.selected_text = None;
    }

    // ========== ACCESSORS ==========

    /// Whether the document has no chapters.
    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// The open book.
    pub fn book(&self) -> &Book {
        &self.book
    }

    /// The parsed document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The navigation state machine.
    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// The renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The renderer, mutably.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}
