//! Container extraction and content-root discovery.
//!
//! A book is unpacked once into `<cache>/<book id>/`; later opens reuse the
//! tree as long as the directory exists. Extraction goes through a hidden
//! staging directory so that directory is never left half-written. The content root is the directory
//! holding the package descriptor (`*.opf`).

use crate::config::{CacheConfig, ExtractorKind};
use crate::error::{AppError, Result};
use roxmltree::Document;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;
use zip::ZipArchive;

/// Extension of the package descriptor.
const DESCRIPTOR_EXTENSION: &str = "opf";

/// Unpacks a container into a destination directory.
pub trait Extractor: Send + Sync {
    /// Extract `archive` into `dest`, which already exists and is empty.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// In-process extraction with the zip crate.
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file).map_err(|e| AppError::ExtractionFailed {
            exit_code: None,
            reason: e.to_string(),
        })?;

        zip.extract(dest).map_err(|e| AppError::ExtractionFailed {
            exit_code: None,
            reason: e.to_string(),
        })
    }
}

/// Extraction through an external `unzip` binary.
pub struct UnzipCommand {
    program: PathBuf,
}

impl UnzipCommand {
    /// Use `unzip` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("unzip")
    }

    /// Use a specific unzip-compatible program.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for UnzipCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for UnzipCommand {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .args(["-o", "-q"])
            .arg(archive)
            .arg("-d")
            .arg(dest)
            .status()
            .map_err(|e| AppError::ExtractionFailed {
                exit_code: None,
                reason: format!("Failed to execute {}: {}", self.program.display(), e),
            })?;

        if !status.success() {
            return Err(AppError::ExtractionFailed {
                exit_code: status.code(),
                reason: format!("{} exited with {}", self.program.display(), status),
            });
        }

        Ok(())
    }
}

/// Result of resolving a book's content root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRoot {
    /// Directory that chapter paths are relative to.
    pub path: PathBuf,
    /// Directory the container was extracted into.
    pub extraction_root: PathBuf,
    /// Package descriptor, when one was found.
    pub descriptor: Option<PathBuf>,
}

impl ContentRoot {
    /// Find the content root of a tree extracted at `extraction_root`.
    ///
    /// Without a package descriptor the extraction root itself is used.
    pub fn discover(extraction_root: PathBuf) -> Self {
        let descriptor = find_package_descriptor(&extraction_root);

        let path = match descriptor {
            Some(ref opf) => opf
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| extraction_root.clone()),
            None => {
                tracing::warn!(
                    error = %AppError::ContentRootNotFound(extraction_root.clone()),
                    "Falling back to extraction root"
                );
                extraction_root.clone()
            }
        };

        Self {
            path,
            extraction_root,
            descriptor,
        }
    }
}

/// Locates, extracts and roots container documents.
#[derive(Clone)]
pub struct ContainerResolver {
    cache_root: PathBuf,
    extractor: Arc<dyn Extractor>,
}

impl ContainerResolver {
    /// Create a resolver extracting into `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            cache_root: cache_root.into(),
            extractor,
        }
    }

    /// Create a resolver from the cache section of the configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let extractor: Arc<dyn Extractor> = match config.extractor {
            ExtractorKind::Zip => Arc::new(ZipExtractor),
            ExtractorKind::Unzip => Arc::new(UnzipCommand::new()),
        };
        Self::new(config.dir.clone(), extractor)
    }

    /// Cache directory for a document identifier.
    pub fn cache_dir(&self, id: &str) -> PathBuf {
        self.cache_root.join(safe_name(id))
    }

    /// Hidden sibling of the cache directory that an extraction fills
    /// before it is moved into place.
    fn staging_dir(&self, id: &str) -> PathBuf {
        self.cache_root
            .join(format!(".{}.partial-{}", safe_name(id), Uuid::new_v4()))
    }

    /// Extract the document (first time only) and find its content root.
    pub async fn resolve(&self, path: &Path, id: &str) -> Result<ContentRoot> {
        if !path.exists() {
            return Err(AppError::NotFound(path.display().to_string()));
        }

        let dest = self.cache_dir(id);

        if dest.exists() {
            tracing::debug!(id, cache = %dest.display(), "Using cached extraction");
        } else {
            let extractor = Arc::clone(&self.extractor);
            let archive = path.to_path_buf();
            let staging = self.staging_dir(id);
            let target = dest.clone();
            let start = std::time::Instant::now();

            tokio::task::spawn_blocking(move || {
                extract_into_place(extractor.as_ref(), &archive, &staging, &target)
            })
            .await
            .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))??;

            tracing::info!(id, cache = %dest.display(), elapsed = ?start.elapsed(), "Extracted container");
        }

        tokio::task::spawn_blocking(move || ContentRoot::discover(dest))
            .await
            .map_err(|e| AppError::Internal(format!("Discovery task failed: {}", e)))
    }
}

/// Extract `archive` into `staging`, then rename it to `dest`.
///
/// `dest` only ever appears complete. On failure the staging tree is
/// removed before returning, whether or not anyone still awaits the result.
fn extract_into_place(
    extractor: &dyn Extractor,
    archive: &Path,
    staging: &Path,
    dest: &Path,
) -> Result<()> {
    std::fs::create_dir_all(staging)?;

    if let Err(e) = extractor.extract(archive, staging) {
        remove_staging(staging);
        return Err(e);
    }

    if let Err(e) = std::fs::rename(staging, dest) {
        remove_staging(staging);
        if dest.exists() {
            // Another open of the same book finished first
            tracing::debug!(cache = %dest.display(), "Extraction already in place");
            return Ok(());
        }
        return Err(e.into());
    }

    Ok(())
}

fn remove_staging(staging: &Path) {
    if let Err(e) = std::fs::remove_dir_all(staging) {
        tracing::warn!(cache = %staging.display(), error = %e, "Failed to remove partial extraction");
    }
}

fn safe_name(id: &str) -> String {
    id.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

/// Find the package descriptor under an extracted tree.
///
/// `META-INF/container.xml` wins when it names an existing rootfile;
/// otherwise the first `*.opf` in file-name order.
pub fn find_package_descriptor(root: &Path) -> Option<PathBuf> {
    if let Some(path) = rootfile_from_container(root) {
        return Some(path);
    }

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(DESCRIPTOR_EXTENSION))
        })
}

/// Read the rootfile path out of `META-INF/container.xml`.
fn rootfile_from_container(root: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(root.join("META-INF").join("container.xml")).ok()?;
    let doc = Document::parse(content.trim_start_matches('\u{feff}')).ok()?;

    let full_path = doc
        .descendants()
        .find(|n| n.has_tag_name("rootfile"))
        .and_then(|n| n.attribute("full-path"))?;

    let path = root.join(full_path);
    path.is_file().then_some(path)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}
