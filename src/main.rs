//! ebook-nav entry point.

use clap::Parser;
use ebook_nav::{
    config::{Cli, Command, Config},
    container::ContainerResolver,
    db::{Database, StoredBook, now_timestamp},
    document::{Document, flatten_toc},
    error::AppError,
    library::Book,
    navigation::NavigationPosition,
    pagination::estimate_pages,
    progress::{ProgressRecord, ProgressStore},
    renderer::{HeadlessRenderer, RenderCommand},
    session::{ReaderSession, ReadingClock, SessionOptions},
    toc::TocResolver,
};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, stdout belongs to the commands)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ebook_nav=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        tracing::debug!(config = %path.display(), "Loading configuration");
        Config::load(path)?
    } else {
        Config::default()
    };

    // Handle command
    match cli.command {
        Command::Init { force } => cmd_init(force).await,
        Command::Toc { file } => cmd_toc(&file, &config).await,
        Command::Read {
            file,
            chapter,
            page,
        } => cmd_read(&file, chapter, page, &config).await,
        Command::Progress { file, json } => cmd_progress(file.as_deref(), json, &config),
    }
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    // Write default config
    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    // Initialize database
    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nThen run: ebook-nav read /path/to/book.epub");

    Ok(())
}

/// Resolve a user-supplied path into a book.
fn load_book(file: &Path) -> anyhow::Result<Book> {
    let path = std::fs::canonicalize(file).map_err(|_| {
        anyhow::anyhow!(AppError::NotFound(file.display().to_string()).user_message())
    })?;
    Ok(Book::new(path))
}

/// Print the spine and table of contents.
async fn cmd_toc(file: &Path, config: &Config) -> anyhow::Result<()> {
    let mut book = load_book(file)?;
    let resolver = ContainerResolver::from_config(&config.cache);

    let root = resolver
        .resolve(&book.path, &book.id)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let document = tokio::task::spawn_blocking(move || Document::open(&root))
        .await?
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    book.apply_metadata(&document.metadata);

    println!("{} - {}", book.title, book.authors_display());
    println!("Content root: {}", document.content_root.display());

    if document.is_empty() {
        println!("\nNo chapters found.");
        return Ok(());
    }

    let resolver = TocResolver::new(&document);

    println!("\n{:<6} {:<40} PATH", "INDEX", "TITLE");
    println!("{}", "-".repeat(80));
    for index in 0..document.chapter_count() {
        println!(
            "{:<6} {:<40} {}",
            index,
            resolver.find_title(index),
            document.chapter_href(index).unwrap_or("?")
        );
    }

    println!("\nTable of contents:");
    let entries = flatten_toc(&document.toc);
    if entries.is_empty() {
        println!("  (none)");
    }
    for (number, (depth, node)) in entries.iter().enumerate() {
        let target = resolver.resolve(node);
        let destination = match (target.spine_index, target.fragment) {
            (Some(index), Some(fragment)) => format!("-> {} #{}", index, fragment),
            (Some(index), None) => format!("-> {}", index),
            (None, _) => "(unresolved)".to_string(),
        };
        println!(
            "{:>4}  {}{} {}",
            number,
            "  ".repeat(*depth),
            node.label,
            destination
        );
    }

    Ok(())
}

/// Interactive reading session on stdin.
async fn cmd_read(
    file: &Path,
    chapter: Option<usize>,
    page: Option<usize>,
    config: &Config,
) -> anyhow::Result<()> {
    let book = load_book(file)?;
    let db = Database::open(&config.database.path)?;
    let resolver = ContainerResolver::from_config(&config.cache);

    let mut options = SessionOptions::from_config(config);
    if let Some(chapter) = chapter {
        options = options.with_initial(NavigationPosition::new(chapter, page.unwrap_or(0)));
    }

    let store: Arc<dyn ProgressStore> = Arc::new(db.clone());
    let mut session = ReaderSession::open(book, &resolver, store, HeadlessRenderer::new(), options)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let book = session.book();
    db.save_book(&StoredBook {
        id: book.id.clone(),
        title: book.title.clone(),
        author: book.authors.first().cloned(),
        path: book.path.to_string_lossy().to_string(),
        opened_at: now_timestamp(),
    })?;

    println!("{} - {}", book.title, book.authors_display());
    if session.is_empty() {
        println!("No chapters found.");
        return Ok(());
    }

    let bytes_per_page = config.pagination.bytes_per_page;
    settle(&mut session, bytes_per_page);
    print_status(&session);
    print_help();

    let session = Arc::new(Mutex::new(session));
    let clock = ReadingClock::start(Arc::clone(&session), config.reading.tick_interval());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if !handle_line(&mut session.lock(), line.trim(), bytes_per_page) {
            break;
        }
    }

    clock.stop().await;

    let mut session = session.lock();
    session.checkpoint();
    println!(
        "Saved at {} ({:.0}%)",
        session.page_label().page_text(),
        session.percent_complete()
    );

    Ok(())
}

/// Run one interactive command. Returns false to quit.
fn handle_line(
    session: &mut ReaderSession<HeadlessRenderer>,
    line: &str,
    bytes_per_page: u64,
) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("n") => session.next_page(),
        Some("p") => session.previous_page(),
        Some("j") => match parts.next().and_then(|c| c.parse::<usize>().ok()) {
            Some(chapter) => session.jump_to_chapter(chapter, parts.next().map(String::from)),
            None => println!("Usage: j <chapter> [fragment]"),
        },
        Some("t") => {
            let entry = parts.next().and_then(|n| n.parse::<usize>().ok()).and_then(|n| {
                flatten_toc(session.toc())
                    .get(n)
                    .map(|(_, node)| (*node).clone())
            });
            match entry {
                Some(entry) => {
                    if !session.jump_to_toc(&entry) {
                        println!("'{}' does not point into the book", entry.label);
                    }
                }
                None => print_toc(session),
            }
        }
        Some("s") => {}
        Some("q") => return false,
        Some(_) => print_help(),
        None => return true,
    }

    settle(session, bytes_per_page);
    print_status(session);
    true
}

/// Stand in for a layout engine: answer every chapter load with a page
/// count estimated from the chapter's size.
fn settle(session: &mut ReaderSession<HeadlessRenderer>, bytes_per_page: u64) {
    let mut opened = None;
    for command in session.renderer_mut().drain() {
        match command {
            RenderCommand::Open(uri) => opened = Some(uri),
            other => tracing::debug!(command = ?other, "Render"),
        }
    }

    if let Some(uri) = opened {
        let bytes = std::fs::metadata(&uri).map(|m| m.len()).unwrap_or(0);
        let chapter = session.position().chapter;
        session.report_page_count(chapter, estimate_pages(bytes, bytes_per_page));
        for command in session.renderer_mut().drain() {
            tracing::debug!(command = ?command, "Render");
        }
    }
}

fn print_status(session: &ReaderSession<HeadlessRenderer>) {
    println!("{}", session.page_label());

    let page = session.current_page_identifier();
    if session.is_unlocked(&page) {
        println!("  page {} unlocked", page);
    } else {
        println!(
            "  page {}: {}s of reading until unlocked",
            page,
            session.seconds_remaining(&page)
        );
    }
}

fn print_toc(session: &ReaderSession<HeadlessRenderer>) {
    for (number, (depth, node)) in flatten_toc(session.toc()).iter().enumerate() {
        let marker = if session.is_current_chapter(node) { "*" } else { " " };
        println!("{:>4}{} {}{}", number, marker, "  ".repeat(*depth), node.label);
    }
}

fn print_help() {
    println!("Commands: n (next), p (previous), j <chapter> [fragment], t [entry],");
    println!("          s (status), q (quit)");
}

/// Show stored reading progress.
fn cmd_progress(file: Option<&Path>, json: bool, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;

    if let Some(file) = file {
        let book = load_book(file)?;
        let Some(progress) = db.get_progress(&book.id)? else {
            println!("No progress stored for {}", book.path.display());
            return Ok(());
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&progress)?);
            return Ok(());
        }

        let title = db
            .get_book(&book.id)?
            .map(|b| b.title)
            .unwrap_or(book.title);
        print_progress(&title, &progress);

        if !progress.page_reading_times.is_empty() {
            println!("\n{:<12} SECONDS", "PAGE");
            for record in &progress.page_reading_times {
                println!("{:<12} {}", record.page_id, record.cumulative_seconds);
            }
        }
        return Ok(());
    }

    let records = db.list_progress()?;

    if json {
        let entries: Vec<serde_json::Value> = records
            .iter()
            .map(|(book_id, progress)| {
                serde_json::json!({
                    "book_id": book_id,
                    "progress": progress,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No progress stored.");
        return Ok(());
    }

    for (book_id, progress) in &records {
        let title = db
            .get_book(book_id)?
            .map(|b| b.title)
            .unwrap_or_else(|| book_id.clone());
        print_progress(&title, progress);
    }

    Ok(())
}

fn print_progress(title: &str, progress: &ProgressRecord) {
    let position = match progress.position() {
        Some(position) => format!("chapter {} page {}", position.chapter, position.sub_page + 1),
        None => format!("absolute page {} (legacy)", progress.legacy_absolute_page),
    };
    println!(
        "{:<40} {:<28} {:>5.1}%  {}",
        title,
        position,
        progress.percent_complete,
        progress.last_read.format("%Y-%m-%d %H:%M")
    );
}
