//! Absolute-page accounting across chapters.
//!
//! Each chapter has at most one page count. Estimates come from content
//! size before rendering; measurements come from the renderer and replace
//! them. Totals and percentages are only exact once every chapter up to the
//! position in question has been measured.

use crate::navigation::NavigationPosition;
use serde::{Deserialize, Serialize};

/// Where a page count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Derived from content size.
    Estimated,
    /// Reported by the renderer after layout.
    Measured,
}

/// A chapter's page count and its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    /// Number of pages, at least 1.
    pub pages: usize,
    /// Where the number came from.
    pub provenance: Provenance,
}

/// Pages a chapter of `bytes` is expected to fill.
pub fn estimate_pages(bytes: u64, bytes_per_page: u64) -> usize {
    let per_page = bytes_per_page.max(1);
    bytes.div_ceil(per_page).max(1) as usize
}

/// Per-chapter page counts for one document.
#[derive(Debug, Clone, Default)]
pub struct PaginationLedger {
    counts: Vec<Option<PageCount>>,
}

impl PaginationLedger {
    /// Create an empty ledger for `chapter_count` chapters.
    pub fn new(chapter_count: usize) -> Self {
        Self {
            counts: vec![None; chapter_count],
        }
    }

    /// Number of chapters tracked.
    pub fn chapter_count(&self) -> usize {
        self.counts.len()
    }

    /// Store a chapter's page count, replacing whatever was there.
    pub fn record_page_count(&mut self, chapter: usize, pages: usize, provenance: Provenance) {
        let Some(slot) = self.counts.get_mut(chapter) else {
            tracing::debug!(chapter, pages, "Ignoring page count for unknown chapter");
            return;
        };

        let count = PageCount {
            pages: pages.max(1),
            provenance,
        };
        if let Some(previous) = slot.replace(count)
            && previous != count
        {
            tracing::debug!(
                chapter,
                from = previous.pages,
                to = count.pages,
                ?provenance,
                "Page count replaced"
            );
        }
    }

    /// Estimate every chapter not yet measured from its size in bytes.
    ///
    /// Returns the number of chapters estimated.
    pub fn estimate_from_sizes(&mut self, sizes: &[u64], bytes_per_page: u64) -> usize {
        let mut estimated = 0;
        for (chapter, &bytes) in sizes.iter().enumerate().take(self.counts.len()) {
            if self.is_measured(chapter) {
                continue;
            }
            self.counts[chapter] = Some(PageCount {
                pages: estimate_pages(bytes, bytes_per_page),
                provenance: Provenance::Estimated,
            });
            estimated += 1;
        }

        tracing::debug!(estimated, total = self.total_pages(), "Estimated page counts");
        estimated
    }

    /// Stored count for a chapter.
    pub fn page_count(&self, chapter: usize) -> Option<PageCount> {
        self.counts.get(chapter).copied().flatten()
    }

    /// Known pages of a chapter, 0 if nothing is recorded.
    pub fn pages_in(&self, chapter: usize) -> usize {
        self.page_count(chapter).map_or(0, |c| c.pages)
    }

    /// Whether a chapter's count was measured by the renderer.
    pub fn is_measured(&self, chapter: usize) -> bool {
        self.page_count(chapter)
            .is_some_and(|c| c.provenance == Provenance::Measured)
    }

    /// Whether every chapter up to and including `chapter` is measured.
    pub fn is_measured_through(&self, chapter: usize) -> bool {
        chapter < self.counts.len() && (0..=chapter).all(|c| self.is_measured(c))
    }

    /// Whether every chapter is measured.
    pub fn is_fully_measured(&self) -> bool {
        (0..self.counts.len()).all(|c| self.is_measured(c))
    }

    /// 1-indexed page number across the whole document.
    ///
    /// Chapters before the position without a count contribute nothing.
    pub fn absolute_page(&self, position: NavigationPosition) -> usize {
        let before: usize = (0..position.chapter.min(self.counts.len()))
            .map(|c| self.pages_in(c))
            .sum();
        before + position.sub_page + 1
    }

    /// Sum of all known counts. Moves as estimates are replaced.
    pub fn total_pages(&self) -> usize {
        (0..self.counts.len()).map(|c| self.pages_in(c)).sum()
    }

    /// Approximate percent read at `position`, in `[0, 100]`.
    ///
    /// The current chapter counts as at least one page even if unset.
    pub fn percent_complete(&self, position: NavigationPosition) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }

        let absolute = self.absolute_page(position);
        let unset_current = usize::from(
            position.chapter < self.counts.len() && self.page_count(position.chapter).is_none(),
        );
        let total = (self.total_pages() + unset_current).max(absolute);

        (absolute as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Position of a 1-indexed absolute page.
    ///
    /// Beyond the known total this clamps to the last page of the last
    /// chapter with a count.
    pub fn page_and_chapter(&self, absolute_page: usize) -> NavigationPosition {
        let mut remaining = absolute_page.max(1) - 1;
        let mut last_known = None;

        for chapter in 0..self.counts.len() {
            let pages = self.pages_in(chapter);
            if pages == 0 {
                continue;
            }
            if remaining < pages {
                return NavigationPosition::new(chapter, remaining);
            }
            remaining -= pages;
            last_known = Some(NavigationPosition::new(chapter, pages - 1));
        }

        last_known.unwrap_or_default()
    }
}
