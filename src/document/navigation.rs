//! Table of contents parsing: EPUB 3 navigation documents and NCX.

use super::package::xml_options;
use super::{TocNode, resolve_href};
use crate::error::{AppError, Result};
use roxmltree::{Document, Node};

/// Parse the `toc` nav of an XHTML navigation document.
///
/// `base_dir` is the navigation document's directory relative to the
/// content root; hrefs are resolved against it.
pub fn parse_nav_xhtml(content: &str, base_dir: &str) -> Result<Vec<TocNode>> {
    let doc = Document::parse_with_options(content.trim_start_matches('\u{feff}'), xml_options())
        .map_err(|e| AppError::MalformedDocument(format!("Navigation document: {}", e)))?;

    let navs: Vec<Node> = doc.descendants().filter(|n| n.has_tag_name("nav")).collect();

    let toc_nav = navs
        .iter()
        .find(|nav| {
            nav.attributes().any(|a| {
                a.name() == "type" && a.value().split_whitespace().any(|v| v == "toc")
            })
        })
        .or_else(|| navs.first());

    let Some(nav) = toc_nav else {
        return Ok(Vec::new());
    };

    Ok(nav
        .children()
        .find(|n| n.has_tag_name("ol"))
        .map(|ol| parse_list(ol, base_dir))
        .unwrap_or_default())
}

fn parse_list(ol: Node, base_dir: &str) -> Vec<TocNode> {
    ol.children()
        .filter(|n| n.has_tag_name("li"))
        .filter_map(|li| {
            let head = li
                .children()
                .find(|n| n.has_tag_name("a") || n.has_tag_name("span"));
            let children = li
                .children()
                .find(|n| n.has_tag_name("ol"))
                .map(|ol| parse_list(ol, base_dir))
                .unwrap_or_default();

            let label = head.map(collect_text).unwrap_or_default();
            let href = head
                .and_then(|h| h.attribute("href"))
                .map(|href| resolve_href(base_dir, href));

            if label.is_empty() && href.is_none() && children.is_empty() {
                return None;
            }

            Some(TocNode {
                label,
                href,
                children,
            })
        })
        .collect()
}

/// Parse the `navMap` of an NCX document.
pub fn parse_ncx(content: &str, base_dir: &str) -> Result<Vec<TocNode>> {
    let doc = Document::parse_with_options(content.trim_start_matches('\u{feff}'), xml_options())
        .map_err(|e| AppError::MalformedDocument(format!("NCX: {}", e)))?;

    Ok(doc
        .descendants()
        .find(|n| n.has_tag_name("navMap"))
        .map(|map| parse_nav_points(map, base_dir))
        .unwrap_or_default())
}

fn parse_nav_points(parent: Node, base_dir: &str) -> Vec<TocNode> {
    parent
        .children()
        .filter(|n| n.has_tag_name("navPoint"))
        .map(|point| {
            let label = point
                .children()
                .find(|n| n.has_tag_name("navLabel"))
                .map(collect_text)
                .unwrap_or_default();
            let href = point
                .children()
                .find(|n| n.has_tag_name("content"))
                .and_then(|c| c.attribute("src"))
                .map(|src| resolve_href(base_dir, src));

            TocNode {
                label,
                href,
                children: parse_nav_points(point, base_dir),
            }
        })
        .collect()
}

/// All descendant text with whitespace collapsed.
fn collect_text(node: Node) -> String {
    let raw: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
