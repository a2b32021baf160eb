//! Parsed document structure: spine, manifest and table of contents.

mod navigation;
mod package;

pub use navigation::{parse_nav_xhtml, parse_ncx};
pub use package::{Package, parse_package};

use crate::container::ContentRoot;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Entry of the reading order. Its identity is its position in the spine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpineItem {
    /// Manifest id this item refers to.
    pub idref: String,
    /// `linear="no"` items are auxiliary content.
    pub linear: bool,
}

/// A resource declared by the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Manifest id.
    pub id: String,
    /// Path relative to the content root, percent-decoded.
    pub href: String,
    /// Declared media type.
    pub media_type: Option<String>,
    /// `properties` tokens (`nav`, `cover-image`, ...).
    pub properties: Vec<String>,
}

/// Id to resource mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    entries: HashMap<String, ManifestEntry>,
}

impl Manifest {
    /// Insert an entry; a later duplicate id replaces the earlier one.
    pub fn insert(&mut self, entry: ManifestEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &str) -> Option<&ManifestEntry> {
        self.entries.get(id)
    }

    /// Number of declared resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest declares nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }
}

/// Table of contents node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocNode {
    /// Display label.
    pub label: String,
    /// Target path relative to the content root, possibly with `#fragment`.
    pub href: Option<String>,
    /// Nested entries.
    pub children: Vec<TocNode>,
}

impl TocNode {
    /// Count this node and all its descendants.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TocNode::count).sum::<usize>()
    }
}

/// Flatten a TOC forest into `(depth, node)` pairs in reading order.
pub fn flatten_toc(nodes: &[TocNode]) -> Vec<(usize, &TocNode)> {
    fn walk<'a>(nodes: &'a [TocNode], depth: usize, out: &mut Vec<(usize, &'a TocNode)>) {
        for node in nodes {
            out.push((depth, node));
            walk(&node.children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(nodes, 0, &mut out);
    out
}

/// Descriptive metadata from the package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// `dc:title`.
    pub title: Option<String>,
    /// `dc:creator` entries.
    pub authors: Vec<String>,
    /// `dc:language`.
    pub language: Option<String>,
}

/// A parsed document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Directory holding the package descriptor.
    pub content_root: PathBuf,
    /// Descriptive metadata.
    pub metadata: Metadata,
    /// Reading order.
    pub spine: Vec<SpineItem>,
    /// Declared resources.
    pub manifest: Manifest,
    /// Top-level TOC entries; the unlabelled root is implicit.
    pub toc: Vec<TocNode>,
}

impl Document {
    /// Parse the document whose content root was discovered as `root`.
    pub fn open(root: &ContentRoot) -> Result<Self> {
        let Some(descriptor) = root.descriptor.as_deref() else {
            return Err(AppError::MalformedDocument(format!(
                "No package descriptor under {}",
                root.extraction_root.display()
            )));
        };

        let content_root = root.path.clone();
        let content = std::fs::read_to_string(descriptor)?;
        let package = parse_package(&content)?;

        let toc = Self::load_toc(&content_root, &package);

        let document = Self {
            content_root,
            metadata: package.metadata,
            spine: package.spine,
            manifest: package.manifest,
            toc,
        };

        if document.is_empty() {
            tracing::warn!(descriptor = %descriptor.display(), "No chapters found in document");
        } else {
            tracing::info!(
                chapters = document.spine.len(),
                resources = document.manifest.len(),
                toc_entries = document.toc.iter().map(TocNode::count).sum::<usize>(),
                "Parsed document"
            );
        }

        Ok(document)
    }

    /// Load the TOC: navigation document first, NCX second.
    ///
    /// A broken TOC leaves the document navigable, so failures only log.
    fn load_toc(content_root: &Path, package: &Package) -> Vec<TocNode> {
        if let Some(nav) = package.nav_document() {
            match Self::read_resource(content_root, &nav.href)
                .and_then(|xml| parse_nav_xhtml(&xml, parent_dir(&nav.href)))
            {
                Ok(toc) if !toc.is_empty() => return toc,
                Ok(_) => tracing::debug!(href = %nav.href, "Navigation document has no TOC"),
                Err(e) => {
                    tracing::warn!(href = %nav.href, error = %e, "Failed to parse navigation document")
                }
            }
        }

        if let Some(ncx) = package.ncx_document() {
            match Self::read_resource(content_root, &ncx.href)
                .and_then(|xml| parse_ncx(&xml, parent_dir(&ncx.href)))
            {
                Ok(toc) => return toc,
                Err(e) => tracing::warn!(href = %ncx.href, error = %e, "Failed to parse NCX"),
            }
        }

        Vec::new()
    }

    fn read_resource(content_root: &Path, href: &str) -> Result<String> {
        Ok(std::fs::read_to_string(content_root.join(href))?)
    }

    /// Number of chapters in the spine.
    pub fn chapter_count(&self) -> usize {
        self.spine.len()
    }

    /// Whether the spine is empty.
    pub fn is_empty(&self) -> bool {
        self.spine.is_empty()
    }

    /// Manifest path of a spine item.
    pub fn spine_path(&self, index: usize) -> Result<&str> {
        let item = self
            .spine
            .get(index)
            .ok_or_else(|| AppError::NotFound(format!("Spine index {}", index)))?;

        self.manifest
            .get(&item.idref)
            .map(|entry| entry.href.as_str())
            .ok_or_else(|| AppError::ResourceNotFoundInManifest(item.idref.clone()))
    }

    /// Path of a chapter relative to the content root.
    ///
    /// An idref missing from the manifest is used as the path itself.
    pub fn chapter_href(&self, index: usize) -> Option<&str> {
        match self.spine_path(index) {
            Ok(path) => Some(path),
            Err(AppError::ResourceNotFoundInManifest(idref)) => {
                tracing::debug!(index, idref = %idref, "Resource not in manifest, using idref as path");
                self.spine.get(index).map(|item| item.idref.as_str())
            }
            Err(_) => None,
        }
    }

    /// Content URI of a chapter for the renderer.
    pub fn chapter_uri(&self, index: usize) -> Option<PathBuf> {
        self.chapter_href(index)
            .map(|href| self.content_root.join(href))
    }

    /// On-disk size of every chapter, 0 where the file is missing.
    pub fn chapter_sizes(&self) -> Vec<u64> {
        (0..self.spine.len())
            .map(|index| {
                self.chapter_uri(index)
                    .and_then(|uri| std::fs::metadata(uri).ok())
                    .map(|m| m.len())
                    .unwrap_or(0)
            })
            .collect()
    }
}

/// Directory part of a content-root relative path (`""` at the root).
pub(crate) fn parent_dir(href: &str) -> &str {
    let path = href.split('#').next().unwrap_or(href);
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve `href` against `base_dir`, decoding and normalising the path part.
///
/// Fragments are kept verbatim; absolute URLs are returned unchanged.
pub(crate) fn resolve_href(base_dir: &str, href: &str) -> String {
    if href.contains("://") {
        return href.to_string();
    }

    let (path, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };

    let decoded = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());

    let joined = if decoded.is_empty() {
        String::new()
    } else if decoded.starts_with('/') || base_dir.is_empty() {
        decoded
    } else {
        format!("{}/{}", base_dir.trim_end_matches('/'), decoded)
    };

    let mut normalized = normalize_path(&joined);
    if let Some(fragment) = fragment {
        normalized.push('#');
        normalized.push_str(fragment);
    }
    normalized
}

/// Collapse `.`/`..` segments and duplicate separators.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
