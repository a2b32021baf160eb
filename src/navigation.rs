//! Chapter/sub-page navigation state machine.
//!
//! Transitions return the effects the session must apply, in order, instead
//! of mutating collaborators directly.

use crate::config::PreviousChapterLanding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the reader is: the single source of truth for position.
///
/// Ordering is lexicographic on (chapter, sub-page).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NavigationPosition {
    /// Spine index.
    pub chapter: usize,
    /// Page within the chapter, 0-indexed.
    pub sub_page: usize,
}

impl NavigationPosition {
    /// Create a position.
    pub fn new(chapter: usize, sub_page: usize) -> Self {
        Self { chapter, sub_page }
    }

    /// Stable identifier for reading-time records.
    pub fn page_id(&self) -> PageId {
        PageId::from(*self)
    }
}

/// `"{chapter}-{sub_page}"`.
///
/// Unlike absolute page numbers this does not shift when earlier chapters
/// are re-measured.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Position encoded by this identifier, if well formed.
    pub fn position(&self) -> Option<NavigationPosition> {
        let (chapter, sub_page) = self.0.split_once('-')?;
        Some(NavigationPosition::new(
            chapter.parse().ok()?,
            sub_page.parse().ok()?,
        ))
    }
}

impl From<NavigationPosition> for PageId {
    fn from(position: NavigationPosition) -> Self {
        PageId(format!("{}-{}", position.chapter, position.sub_page))
    }
}

impl FromStr for PageId {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = PageId(s.to_string());
        match id.position() {
            Some(_) => Ok(id),
            None => Err(crate::error::AppError::InvalidPageId(s.to_string())),
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something the session must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Load a chapter's content in the renderer.
    OpenChapter(usize),
    /// Show a page of the loaded chapter.
    ScrollToPage(usize),
    /// Show an anchor of the loaded chapter.
    ScrollToFragment(String),
    /// Fold the time spent on the page being left into its record.
    FlushReadingTime(PageId),
    /// Save the progress record.
    Persist,
}

/// Page to apply once a chapter's page count is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreTarget {
    /// A specific sub-page, clamped to the measured count.
    Page(usize),
    /// The chapter's last page.
    LastPage,
}

/// Navigation state for one open document.
#[derive(Debug, Clone)]
pub struct Navigator {
    chapter_count: usize,
    position: NavigationPosition,
    /// Page count reported for the current load of the current chapter.
    loaded_pages: Option<usize>,
    pending_fragment: Option<String>,
    pending_restore: Option<RestoreTarget>,
    landing: PreviousChapterLanding,
}

impl Navigator {
    /// Create a navigator over `chapter_count` chapters, positioned at the
    /// start but with nothing opened yet.
    pub fn new(chapter_count: usize, landing: PreviousChapterLanding) -> Self {
        Self {
            chapter_count,
            position: NavigationPosition::default(),
            loaded_pages: None,
            pending_fragment: None,
            pending_restore: None,
            landing,
        }
    }

    /// Current position.
    pub fn position(&self) -> NavigationPosition {
        self.position
    }

    /// Number of chapters.
    pub fn chapter_count(&self) -> usize {
        self.chapter_count
    }

    /// Page count of the current chapter as loaded, 1 until measured.
    pub fn current_page_count(&self) -> usize {
        self.loaded_pages.unwrap_or(1).max(1)
    }

    /// Whether the renderer has reported a count for the current load.
    pub fn is_measured(&self) -> bool {
        self.loaded_pages.is_some()
    }

    /// Anchor waiting for the current chapter to load.
    pub fn pending_fragment(&self) -> Option<&str> {
        self.pending_fragment.as_deref()
    }

    /// Page waiting for the current chapter to load.
    pub fn pending_restore(&self) -> Option<RestoreTarget> {
        self.pending_restore
    }

    /// Position the reader is headed for: the current chapter at the
    /// queued page while a restore waits for the page count, else the
    /// current position.
    ///
    /// Progress and reading time are keyed by this position so an
    /// unmeasured chapter never overwrites a stored sub-page.
    pub fn resume_position(&self) -> NavigationPosition {
        match self.pending_restore {
            Some(RestoreTarget::Page(page)) => NavigationPosition::new(self.position.chapter, page),
            _ => self.position,
        }
    }

    /// Open the document at `position` (clamped to the spine).
    ///
    /// The sub-page is queued until the chapter reports its page count.
    pub fn start(&mut self, position: NavigationPosition) -> Vec<Effect> {
        if self.chapter_count == 0 {
            return Vec::new();
        }

        let chapter = position.chapter.min(self.chapter_count - 1);
        if chapter != position.chapter {
            tracing::warn!(
                requested = position.chapter,
                chapters = self.chapter_count,
                "Stored chapter out of range, clamping"
            );
        }

        self.position = NavigationPosition::new(chapter, 0);
        self.loaded_pages = None;
        self.pending_fragment = None;
        self.pending_restore =
            (position.sub_page > 0).then_some(RestoreTarget::Page(position.sub_page));

        vec![Effect::OpenChapter(chapter)]
    }

    /// Advance one page, crossing into the next chapter at the end of this one.
    pub fn next_page(&mut self) -> Vec<Effect> {
        if self.chapter_count == 0 {
            return Vec::new();
        }

        if self.position.sub_page + 1 < self.current_page_count() {
            let target = self.position.sub_page + 1;
            self.move_within_chapter(target)
        } else if self.position.chapter + 1 < self.chapter_count {
            self.enter_chapter(self.position.chapter + 1, None, None)
        } else {
            tracing::debug!(chapter = self.position.chapter, "Already at the last page");
            Vec::new()
        }
    }

    /// Go back one page, crossing into the previous chapter at sub-page 0.
    pub fn previous_page(&mut self) -> Vec<Effect> {
        if self.chapter_count == 0 {
            return Vec::new();
        }

        if self.position.sub_page > 0 {
            let target = self.position.sub_page - 1;
            self.move_within_chapter(target)
        } else if self.position.chapter > 0 {
            let restore = match self.landing {
                PreviousChapterLanding::Start => None,
                PreviousChapterLanding::End => Some(RestoreTarget::LastPage),
            };
            self.enter_chapter(self.position.chapter - 1, None, restore)
        } else {
            tracing::debug!("Already at the first page");
            Vec::new()
        }
    }

    /// Jump to the start of a chapter, optionally to an anchor inside it.
    ///
    /// Out-of-range indices are ignored.
    pub fn jump_to_chapter(&mut self, index: usize, fragment: Option<String>) -> Vec<Effect> {
        if index >= self.chapter_count {
            tracing::debug!(index, chapters = self.chapter_count, "Ignoring out-of-range jump");
            return Vec::new();
        }

        if index == self.position.chapter && self.loaded_pages.is_some() {
            // Already loaded: scroll in place
            let moved = self.position.sub_page != 0;
            let mut effects = Vec::new();
            if moved {
                effects.push(Effect::FlushReadingTime(self.position.page_id()));
                self.position.sub_page = 0;
            }
            effects.push(match fragment {
                Some(fragment) => Effect::ScrollToFragment(fragment),
                None => Effect::ScrollToPage(0),
            });
            if moved {
                effects.push(Effect::Persist);
            }
            return effects;
        }

        self.enter_chapter(index, fragment, None)
    }

    /// Jump to a chapter and page, applying the page once it is measured.
    pub fn jump_to_position(&mut self, position: NavigationPosition) -> Vec<Effect> {
        if position.chapter >= self.chapter_count {
            tracing::debug!(chapter = position.chapter, "Ignoring out-of-range jump");
            return Vec::new();
        }

        if position.chapter == self.position.chapter && let Some(pages) = self.loaded_pages {
            return self.move_within_chapter(position.sub_page.min(pages - 1));
        }

        let restore = (position.sub_page > 0).then_some(RestoreTarget::Page(position.sub_page));
        self.enter_chapter(position.chapter, None, restore)
    }

    /// The renderer measured `chapter` as `pages` pages.
    ///
    /// Reports for a chapter that is no longer current produce no effects.
    pub fn on_page_count(&mut self, chapter: usize, pages: usize) -> Vec<Effect> {
        if chapter != self.position.chapter || chapter >= self.chapter_count {
            tracing::debug!(
                chapter,
                current = self.position.chapter,
                "Ignoring page count for a chapter that is not current"
            );
            return Vec::new();
        }

        let pages = pages.max(1);
        self.loaded_pages = Some(pages);

        let mut effects = Vec::new();
        let shown = self.resume_position();
        let restore = self.pending_restore.take();
        let target = match restore {
            Some(RestoreTarget::Page(page)) => page.min(pages - 1),
            Some(RestoreTarget::LastPage) => pages - 1,
            None => self.position.sub_page.min(pages - 1),
        };

        if target != shown.sub_page {
            effects.push(Effect::FlushReadingTime(shown.page_id()));
        }
        if target != self.position.sub_page {
            self.position.sub_page = target;
            effects.push(Effect::ScrollToPage(target));
            effects.push(Effect::Persist);
        } else if target > 0 {
            effects.push(Effect::ScrollToPage(target));
        }

        if let Some(fragment) = self.pending_fragment.take() {
            effects.push(Effect::ScrollToFragment(fragment));
        }

        effects
    }

    fn move_within_chapter(&mut self, sub_page: usize) -> Vec<Effect> {
        if sub_page == self.position.sub_page {
            return Vec::new();
        }

        let left = self.position.page_id();
        self.position.sub_page = sub_page;
        tracing::debug!(chapter = self.position.chapter, sub_page, "Moved within chapter");

        vec![
            Effect::FlushReadingTime(left),
            Effect::ScrollToPage(sub_page),
            Effect::Persist,
        ]
    }

    fn enter_chapter(
        &mut self,
        chapter: usize,
        fragment: Option<String>,
        restore: Option<RestoreTarget>,
    ) -> Vec<Effect> {
        let left = self.resume_position().page_id();
        self.position = NavigationPosition::new(chapter, 0);
        self.loaded_pages = None;
        self.pending_fragment = fragment;
        self.pending_restore = restore;
        tracing::debug!(chapter, "Entered chapter");

        vec![
            Effect::FlushReadingTime(left),
            Effect::OpenChapter(chapter),
            Effect::Persist,
        ]
    }
}
