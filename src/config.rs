use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// EPUB reader engine: navigation, page accounting and reading progress.
#[derive(Parser, Debug, Clone)]
#[command(name = "ebook-nav")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "EBOOK_NAV_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Print the spine and table of contents of a book.
    Toc {
        /// Path to the EPUB file.
        file: PathBuf,
    },

    /// Open a book in an interactive reading session.
    Read {
        /// Path to the EPUB file.
        file: PathBuf,
        /// Chapter to open instead of the stored position (0-indexed).
        #[arg(long)]
        chapter: Option<usize>,
        /// Page within the chapter (0-indexed).
        #[arg(long)]
        page: Option<usize>,
    },

    /// Show stored reading progress.
    Progress {
        /// Limit output to one book.
        file: Option<PathBuf>,
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Extraction cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Reading-time configuration.
    #[serde(default)]
    pub reading: ReadingConfig,

    /// Pagination configuration.
    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/reader.db")
}

/// Which extractor unpacks containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// In-process extraction with the zip crate.
    Zip,
    /// External `unzip` process.
    Unzip,
}

/// Extraction cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one extracted tree per book.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Extractor used for new cache entries.
    #[serde(default = "default_extractor")]
    pub extractor: ExtractorKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            extractor: default_extractor(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("ebook-nav"))
        .unwrap_or_else(|| PathBuf::from("data/cache"))
}

fn default_extractor() -> ExtractorKind {
    ExtractorKind::Zip
}

/// Reading-time configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingConfig {
    /// Seconds a page must be read before gated features unlock.
    #[serde(default = "default_unlock_threshold")]
    pub unlock_threshold_seconds: u64,

    /// Reading clock period in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            unlock_threshold_seconds: default_unlock_threshold(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl ReadingConfig {
    /// Reading clock period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

fn default_unlock_threshold() -> u64 {
    20
}

fn default_tick_interval() -> u64 {
    1000
}

/// Where `previous_page` lands when it crosses into the previous chapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviousChapterLanding {
    /// First page of the previous chapter.
    #[default]
    Start,
    /// Last page of the previous chapter, once it has been measured.
    End,
}

/// Pagination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Content bytes assumed to fill one rendered page when estimating.
    #[serde(default = "default_bytes_per_page")]
    pub bytes_per_page: u64,

    /// Estimate every chapter's page count before the first render.
    #[serde(default = "default_estimate_on_open")]
    pub estimate_on_open: bool,

    /// Landing page when paging back across a chapter boundary.
    #[serde(default)]
    pub previous_chapter: PreviousChapterLanding,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            bytes_per_page: default_bytes_per_page(),
            estimate_on_open: default_estimate_on_open(),
            previous_chapter: PreviousChapterLanding::default(),
        }
    }
}

fn default_bytes_per_page() -> u64 {
    5000
}

fn default_estimate_on_open() -> bool {
    true
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        if config.pagination.bytes_per_page == 0 {
            return Err(crate::error::AppError::Config(
                "pagination.bytes_per_page must be greater than zero".into(),
            ));
        }

        Ok(config)
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("ebook-nav.toml"),
            dirs::config_dir()
                .map(|p| p.join("ebook-nav").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/ebook-nav/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# ebook-nav configuration

[database]
# path = "/var/lib/ebook-nav/reader.db"

[cache]
# Extracted books, one directory per book id
# dir = "/var/cache/ebook-nav"
# Extractor: "zip" (built in) or "unzip" (external process)
extractor = "zip"

[reading]
# Seconds spent on a page before gated features unlock
unlock_threshold_seconds = 20
tick_interval_ms = 1000

[pagination]
# Bytes of chapter content per estimated page
bytes_per_page = 5000
estimate_on_open = true
# Paging back into the previous chapter lands on its "start" or "end"
previous_chapter = "start"
"#
        .to_string()
    }
}
