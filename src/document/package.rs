//! Package descriptor (OPF) parsing.

use super::{Manifest, ManifestEntry, Metadata, SpineItem, resolve_href};
use crate::error::{AppError, Result};
use roxmltree::{Document, ParsingOptions};

const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Contents of a package descriptor.
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// Descriptive metadata.
    pub metadata: Metadata,
    /// Declared resources, hrefs relative to the descriptor's directory.
    pub manifest: Manifest,
    /// Reading order.
    pub spine: Vec<SpineItem>,
    /// Manifest id named by `<spine toc="...">`.
    pub spine_toc: Option<String>,
}

impl Package {
    /// EPUB 3 navigation document, if declared.
    pub fn nav_document(&self) -> Option<&ManifestEntry> {
        self.manifest
            .iter()
            .filter(|e| e.properties.iter().any(|p| p == "nav"))
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// NCX document: the spine's `toc` reference, else by media type.
    pub fn ncx_document(&self) -> Option<&ManifestEntry> {
        self.spine_toc
            .as_deref()
            .and_then(|id| self.manifest.get(id))
            .or_else(|| {
                self.manifest
                    .iter()
                    .filter(|e| e.media_type.as_deref() == Some(NCX_MEDIA_TYPE))
                    .min_by(|a, b| a.id.cmp(&b.id))
            })
    }
}

pub(crate) fn xml_options<'input>() -> ParsingOptions<'input> {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

/// Parse an OPF document.
///
/// An empty spine is not an error here; callers report "no chapters".
pub fn parse_package(content: &str) -> Result<Package> {
    let doc = Document::parse_with_options(content.trim_start_matches('\u{feff}'), xml_options())
        .map_err(|e| AppError::MalformedDocument(format!("Package descriptor: {}", e)))?;

    if !doc.root_element().has_tag_name("package") {
        return Err(AppError::MalformedDocument(format!(
            "Expected <package> root, found <{}>",
            doc.root_element().tag_name().name()
        )));
    }

    let mut package = Package::default();

    for node in doc.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "title" => {
                if package.metadata.title.is_none()
                    && let Some(text) = node.text()
                {
                    package.metadata.title = Some(text.trim().to_string());
                }
            }
            "creator" => {
                if let Some(text) = node.text() {
                    package.metadata.authors.push(text.trim().to_string());
                }
            }
            "language" => {
                if package.metadata.language.is_none()
                    && let Some(text) = node.text()
                {
                    package.metadata.language = Some(text.trim().to_string());
                }
            }
            "item" => {
                let (Some(id), Some(href)) = (node.attribute("id"), node.attribute("href")) else {
                    tracing::debug!("Skipping manifest item without id or href");
                    continue;
                };

                package.manifest.insert(ManifestEntry {
                    id: id.to_string(),
                    href: resolve_href("", href),
                    media_type: node.attribute("media-type").map(String::from),
                    properties: node
                        .attribute("properties")
                        .map(|p| p.split_whitespace().map(String::from).collect())
                        .unwrap_or_default(),
                });
            }
            "spine" => {
                package.spine_toc = node.attribute("toc").map(String::from);
            }
            "itemref" => {
                if let Some(idref) = node.attribute("idref") {
                    package.spine.push(SpineItem {
                        idref: idref.to_string(),
                        linear: node.attribute("linear") != Some("no"),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(package)
}
