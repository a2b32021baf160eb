//! Rendering surface boundary.
//!
//! The engine never lays out content itself. It tells a renderer what to
//! show and the renderer reports back how many pages a loaded chapter has
//! (see [`crate::session::ReaderSession::report_page_count`]).

use std::path::{Path, PathBuf};

/// Something that can display chapter content.
pub trait Renderer: Send {
    /// Load a chapter file. Page counts for it arrive asynchronously.
    fn open_content(&mut self, uri: &Path);

    /// Show a page (0-indexed) of the loaded chapter.
    fn scroll_to_page(&mut self, page: usize);

    /// Show an anchor of the loaded chapter.
    fn scroll_to_fragment(&mut self, fragment: &str);
}

/// A command issued to a [`HeadlessRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    /// `open_content`.
    Open(PathBuf),
    /// `scroll_to_page`.
    ScrollToPage(usize),
    /// `scroll_to_fragment`.
    ScrollToFragment(String),
}

/// Renderer that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    commands: Vec<RenderCommand>,
}

impl HeadlessRenderer {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far.
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving the log empty.
    pub fn drain(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl Renderer for HeadlessRenderer {
    fn open_content(&mut self, uri: &Path) {
        tracing::trace!(uri = %uri.display(), "open");
        self.commands.push(RenderCommand::Open(uri.to_path_buf()));
    }

    fn scroll_to_page(&mut self, page: usize) {
        tracing::trace!(page, "scroll to page");
        self.commands.push(RenderCommand::ScrollToPage(page));
    }

    fn scroll_to_fragment(&mut self, fragment: &str) {
        tracing::trace!(fragment, "scroll to fragment");
        self.commands
            .push(RenderCommand::ScrollToFragment(fragment.to_string()));
    }
}
