//! Table-of-contents to spine resolution.
//!
//! Producers disagree on how TOC hrefs relate to manifest paths, so a TOC
//! path is matched against each spine item with a ladder of strategies and
//! the first spine item satisfying any of them wins.

use crate::document::{Document, TocNode};

/// How a TOC path matched a manifest path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Paths are identical.
    Exact,
    /// The manifest path ends with the TOC path.
    ManifestSuffix,
    /// The TOC path ends with the manifest path.
    TocSuffix,
    /// Only the file names agree.
    FileName,
}

impl MatchStrategy {
    /// First strategy under which `manifest_path` matches `toc_path`.
    pub fn matching(manifest_path: &str, toc_path: &str) -> Option<Self> {
        if manifest_path == toc_path {
            Some(MatchStrategy::Exact)
        } else if manifest_path.ends_with(toc_path) {
            Some(MatchStrategy::ManifestSuffix)
        } else if toc_path.ends_with(manifest_path) {
            Some(MatchStrategy::TocSuffix)
        } else if file_name(manifest_path) == file_name(toc_path) {
            Some(MatchStrategy::FileName)
        } else {
            None
        }
    }
}

/// Where a TOC entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TocTarget {
    /// Spine index, `None` when nothing matched.
    pub spine_index: Option<usize>,
    /// In-page anchor.
    pub fragment: Option<String>,
}

impl TocTarget {
    /// Target that resolved nowhere.
    pub fn unresolved() -> Self {
        Self::default()
    }
}

/// Split an href on the first `#`; an empty fragment counts as none.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (href, None),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Resolves TOC entries and chapter titles against a document.
pub struct TocResolver<'a> {
    document: &'a Document,
}

impl<'a> TocResolver<'a> {
    /// Create a resolver for `document`.
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Map a TOC entry to a spine index and optional fragment.
    pub fn resolve(&self, entry: &TocNode) -> TocTarget {
        match entry.href.as_deref() {
            Some(href) => self.resolve_href(href),
            None => {
                tracing::debug!(label = %entry.label, "TOC entry has no target");
                TocTarget::unresolved()
            }
        }
    }

    /// Map an href (`path#fragment`) to a spine index and optional fragment.
    pub fn resolve_href(&self, href: &str) -> TocTarget {
        let (toc_path, fragment) = split_fragment(href);

        if toc_path.is_empty() {
            tracing::debug!(href, "TOC target has no path");
            return TocTarget::unresolved();
        }

        for (index, item) in self.document.spine.iter().enumerate() {
            let Some(manifest) = self.document.manifest.get(&item.idref) else {
                continue;
            };

            if let Some(strategy) = MatchStrategy::matching(&manifest.href, toc_path) {
                tracing::debug!(
                    index,
                    manifest = %manifest.href,
                    toc = toc_path,
                    ?strategy,
                    "Resolved TOC entry"
                );
                return TocTarget {
                    spine_index: Some(index),
                    fragment: fragment.map(String::from),
                };
            }
        }

        tracing::debug!(toc = toc_path, "No spine item matches TOC entry");
        TocTarget::unresolved()
    }

    /// Title of a spine item: the first TOC label whose path equals the
    /// item's manifest path, else `"Chapter N"` (1-indexed).
    pub fn find_title(&self, spine_index: usize) -> String {
        self.document
            .spine_path(spine_index)
            .ok()
            .and_then(|path| find_label(&self.document.toc, path))
            .map(String::from)
            .unwrap_or_else(|| format!("Chapter {}", spine_index + 1))
    }

    /// Whether `entry` points into the chapter at `current`.
    pub fn is_current_chapter(&self, entry: &TocNode, current: usize) -> bool {
        self.resolve(entry).spine_index == Some(current)
    }
}

/// Depth-first search for the label of a node targeting `spine_path`.
fn find_label<'t>(nodes: &'t [TocNode], spine_path: &str) -> Option<&'t str> {
    for node in nodes {
        if let Some(href) = node.href.as_deref()
            && split_fragment(href).0 == spine_path
        {
            return Some(&node.label);
        }

        if let Some(label) = find_label(&node.children, spine_path) {
            return Some(label);
        }
    }
    None
}
