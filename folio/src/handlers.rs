use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use folio_core::data::Database;
use folio_core::model::Collection;
use folio_core::report::{ExportFormat, generate_chapter_listing, render_collection, save_report};
use folio_core::scrape::{ScrapeOptions, ScrapeReport, execute_scrape};
use folio_scanner::{
    CancellationToken, ChapterContent, ContentType, HttpFetcher, ModelConfig,
    OpenAiSelectorClient, StopReason, inference::DEFAULT_API_BASE,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/folio/";
pub const DATABASE_FILE: &str = "folio.db";

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Try to parse as-is
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
    {
        return Some(line.to_string());
    }

    // Try adding https://
    let with_scheme = format!("https://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some_and(|host| host.contains('.') || host == "localhost")
    {
        return Some(with_scheme);
    }

    None
}

/// Where the collection database lives: `--db` if given, else the default config directory.
pub fn resolve_db_path(explicit: Option<&PathBuf>) -> PathBuf {
    match explicit {
        Some(path) => PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref()),
        None => PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_DIR).as_ref()).join(DATABASE_FILE),
    }
}

/// Open an existing database, pointing at `folio init` when there is none.
pub fn open_database(path: &Path) -> Result<Database> {
    if !Database::exists(path) {
        bail!(
            "no collection database at {} (run `folio init` first, or pass --db)",
            path.display()
        );
    }
    Database::new(path).with_context(|| format!("failed to open database {}", path.display()))
}

/// Open the database, creating it and its directory on first use.
pub fn open_or_create_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Database::new(path).with_context(|| format!("failed to open database {}", path.display()))
}

/// Model settings from the environment, overridden by `--model` and `--api-base`.
pub fn model_config_from_args(args: &ArgMatches) -> ModelConfig {
    let mut config = ModelConfig::from_env();
    if let Some(model) = args.get_one::<String>("model") {
        config = config.with_model(model.as_str());
    }
    if let Some(api_base) = args.get_one::<String>("api-base") {
        config = config.with_api_base(api_base.as_str());
    }
    config
}

/// `--format` if given, else the `--output` extension, else text.
pub fn choose_export_format(format: Option<&String>, output: Option<&PathBuf>) -> ExportFormat {
    format
        .and_then(|f| ExportFormat::from_str(f))
        .or_else(|| output.and_then(|path| ExportFormat::from_path(path)))
        .unwrap_or(ExportFormat::Text)
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  FOLIO INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let config_dir = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_DIR);
    let force = args.get_flag("force");
    let expanded_config_dir = shellexpand::tilde(config_dir);
    let folio_config_dir = Path::new(expanded_config_dir.as_ref());
    let db_loc = folio_config_dir.join(DATABASE_FILE);
    let db_path = db_loc.as_path();

    println!(
        "{} Target: {}",
        "→".blue(),
        folio_config_dir.display().to_string().bright_white()
    );
    println!();

    if Database::exists(db_path) {
        let overwrite = if force {
            true
        } else {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("A collection database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!(
                "{}",
                "Overwriting it deletes every saved collection.".yellow()
            );
            println!();

            let response = print_prompt("Do you want to overwrite it? [y/N]:")?;
            println!();
            response == "y" || response == "yes"
        };

        if !overwrite {
            println!("{} Keeping existing database", "→".blue());
            println!();
            return Ok(());
        }

        Database::drop(db_path)
            .with_context(|| format!("failed to remove {}", db_path.display()))?;
        println!("{} Existing database removed", "✓".green().bold());
    }

    println!("{} Creating directory structure...", "→".blue());
    fs::create_dir_all(folio_config_dir).with_context(|| {
        format!(
            "failed to create config directory {}",
            folio_config_dir.display()
        )
    })?;

    println!("{} Creating database...", "→".blue());
    Database::new(db_path)
        .with_context(|| format!("failed to create database {}", db_path.display()))?;

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Config directory: {}",
        "✓".green().bold(),
        folio_config_dir.display().to_string().bright_white()
    );
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();

    Ok(())
}

pub async fn handle_scrape(args: &ArgMatches) -> Result<()> {
    let raw_url = args
        .get_one::<String>("url")
        .ok_or_else(|| anyhow!("--url is required"))?;
    let url = parse_url_line(raw_url).ok_or_else(|| anyhow!("invalid URL '{}'", raw_url))?;
    let start_chapter = *args.get_one::<u32>("start").unwrap_or(&1);
    let end_chapter = *args.get_one::<u32>("end").unwrap_or(&start_chapter);
    let content_type = args
        .get_one::<String>("type")
        .and_then(|t| ContentType::from_str(t))
        .unwrap_or_default();
    let timeout = *args.get_one::<u64>("timeout").unwrap_or(&15);
    let name = args.get_one::<String>("name").cloned();
    let no_save = args.get_flag("no-save");
    let output = args.get_one::<PathBuf>("output");
    let format = choose_export_format(args.get_one::<String>("format"), output);

    let model_config = model_config_from_args(args);
    if model_config.api_key.is_none() && model_config.api_base == DEFAULT_API_BASE {
        eprintln!(
            "{} OPENAI_API_KEY is not set; the model endpoint will likely refuse requests",
            "⚠".yellow().bold()
        );
    }

    let mut options = ScrapeOptions::new(url.clone(), start_chapter, end_chapter);
    options.content_type = content_type;
    options.concurrency = *args.get_one::<usize>("concurrency").unwrap_or(&4);
    options.chunk_chars = *args.get_one::<usize>("chunk-size").unwrap_or(&4000);
    options.next_case_insensitive = args.get_flag("next-case-insensitive");
    options.show_progress_bars = true;

    println!("\n📖 Scraping {}", url.bright_white());
    println!("Chapters: {}..={}", start_chapter, end_chapter);
    println!("Content: {}", content_type.as_str());
    println!("Model: {} @ {}\n", model_config.model, model_config.api_base);

    let fetcher = HttpFetcher::with_timeout(timeout).context("failed to build HTTP client")?;
    let inference = OpenAiSelectorClient::new(model_config).context("failed to build model client")?;
    let cancel = CancellationToken::new();

    let scrape = execute_scrape(options, &fetcher, &inference, cancel.clone(), None);
    tokio::pin!(scrape);

    let result = loop {
        tokio::select! {
            result = &mut scrape => break result,
            signal = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                if signal.is_ok() {
                    cancel.cancel("interrupted");
                    eprintln!(
                        "\n{} Interrupted, finishing the current page and keeping what was scraped...",
                        "⚠".yellow().bold()
                    );
                }
            }
        }
    };

    let report = result.map_err(|e| anyhow!("[{}] {}", e.kind(), e))?;
    print_scrape_summary(&report);

    let collection = report.into_collection(name);

    if no_save {
        debug!("Skipping save (--no-save)");
    } else if collection.chapters.is_empty() {
        println!("{} Nothing extracted, no collection saved", "→".blue());
    } else {
        let db_path = resolve_db_path(args.get_one::<PathBuf>("db"));
        let db = open_or_create_database(&db_path)?;
        db.save_collection(&collection)
            .context("failed to save collection")?;
        println!(
            "{} Saved collection {} ({})",
            "✓".green().bold(),
            collection.name.bright_white(),
            short_id(&collection.id).cyan()
        );
    }

    if let Some(path) = output {
        export_to_file(&collection, format, path)?;
    }

    Ok(())
}

fn print_scrape_summary(report: &ScrapeReport) {
    println!();
    match &report.stop_reason {
        StopReason::Completed | StopReason::NoNextPage => {
            println!("{} {}", "✓".green().bold(), report.message());
        }
        StopReason::FetchFailed { message, .. } => {
            println!("{} {}", "⚠".yellow().bold(), report.message());
            println!("  {} {}", "•".yellow(), message);
        }
        StopReason::Cancelled => println!("{} {}", "⚠".yellow().bold(), report.message()),
        StopReason::EmptyRange => println!("{} {}", "→".blue(), report.message()),
    }
    println!("  Stopped: {}", report.stop_reason.to_string().dimmed());
    println!(
        "  Selectors: title {} | content {} | next {}",
        display_selector(&report.selectors.title_selector).cyan(),
        display_selector(&report.selectors.content_selector).cyan(),
        display_selector(&report.selectors.next_page_selector).cyan()
    );

    for (idx, chapter) in report.chapters.iter().enumerate() {
        let title = if chapter.title.is_empty() {
            "(untitled)".dimmed().to_string()
        } else {
            chapter.title.clone()
        };
        println!(
            "  {:>4}  {}  {}",
            idx + 1,
            title,
            format!("({} items)", chapter.content.len()).dimmed()
        );
    }
    println!();
}

fn display_selector(selector: &str) -> &str {
    if selector.is_empty() { "-" } else { selector }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn export_to_file(collection: &Collection, format: ExportFormat, path: &Path) -> Result<()> {
    let content = render_collection(collection, format).context("failed to render collection")?;
    save_report(&content, path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "{} Exported {} to {}",
        "✓".green().bold(),
        format.extension(),
        path.display().to_string().bright_white()
    );
    Ok(())
}

fn find_collection(db: &Database, key: &str) -> Result<Collection> {
    db.find_collection(key)
        .context("failed to read collection")?
        .ok_or_else(|| anyhow!("no collection matches '{}'", key))
}

fn collection_key(args: &ArgMatches) -> Result<&str> {
    args.get_one::<String>("COLLECTION")
        .map(String::as_str)
        .ok_or_else(|| anyhow!("a collection id or name is required"))
}

pub fn handle_collection_list(args: &ArgMatches) -> Result<()> {
    let db = open_database(&resolve_db_path(args.get_one::<PathBuf>("db")))?;
    let summaries = db.list_collections().context("failed to list collections")?;

    if summaries.is_empty() {
        println!("No collections yet. Try `folio scrape`.");
        return Ok(());
    }

    println!(
        "{}",
        format!("{:<10} {:<36} {:<6} {:>8}", "ID", "NAME", "TYPE", "CHAPTERS").bold()
    );
    for summary in summaries {
        println!(
            "{:<10} {:<36} {:<6} {:>8}",
            short_id(&summary.id).cyan(),
            truncate(&summary.name, 36),
            summary.content_type.as_str(),
            summary.chapter_count
        );
    }
    Ok(())
}

pub fn handle_collection_show(args: &ArgMatches) -> Result<()> {
    let db = open_database(&resolve_db_path(args.get_one::<PathBuf>("db")))?;
    let collection = find_collection(&db, collection_key(args)?)?;

    if let Some(&index) = args.get_one::<u32>("chapter") {
        let chapter = collection.chapter(index as usize - 1).ok_or_else(|| {
            anyhow!(
                "chapter {} out of range ({} has {} chapters)",
                index,
                collection.name,
                collection.chapters.len()
            )
        })?;

        println!("{}\n", chapter.title.bright_white().bold());
        match &chapter.content {
            ChapterContent::Paragraphs(paragraphs) => {
                for paragraph in paragraphs.iter().filter(|p| !p.is_empty()) {
                    println!("{}\n", paragraph);
                }
            }
            ChapterContent::Images(images) => {
                for image in images {
                    println!("{}", image);
                }
            }
        }
        return Ok(());
    }

    print_divider();
    println!("  {}", collection.name.bright_white().bold());
    print_divider();
    println!("{} {}", "ID:".blue(), collection.id);
    println!("{} {}", "Source:".blue(), collection.source_url);
    println!("{} {}", "Type:".blue(), collection.content_type.as_str());
    println!(
        "{} title {} | content {} | next {}",
        "Selectors:".blue(),
        display_selector(&collection.selectors.title_selector),
        display_selector(&collection.selectors.content_selector),
        display_selector(&collection.selectors.next_page_selector)
    );
    println!();
    print!("{}", generate_chapter_listing(&collection));
    Ok(())
}

pub fn handle_collection_rename(args: &ArgMatches) -> Result<()> {
    let db = open_database(&resolve_db_path(args.get_one::<PathBuf>("db")))?;
    let collection = find_collection(&db, collection_key(args)?)?;
    let new_name = args
        .get_one::<String>("NEW_NAME")
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| anyhow!("the new name may not be empty"))?;

    db.rename_collection(&collection.id, new_name)
        .context("failed to rename collection")?;
    println!(
        "{} Renamed '{}' to '{}'",
        "✓".green().bold(),
        collection.name,
        new_name.bright_white()
    );
    Ok(())
}

pub fn handle_collection_remove(args: &ArgMatches) -> Result<()> {
    let db = open_database(&resolve_db_path(args.get_one::<PathBuf>("db")))?;
    let collection = find_collection(&db, collection_key(args)?)?;

    db.delete_collection(&collection.id)
        .context("failed to remove collection")?;
    println!(
        "{} Removed '{}' ({} chapters)",
        "✓".green().bold(),
        collection.name,
        collection.chapters.len()
    );
    Ok(())
}

pub fn handle_collection_export(args: &ArgMatches) -> Result<()> {
    let db = open_database(&resolve_db_path(args.get_one::<PathBuf>("db")))?;
    let collection = find_collection(&db, collection_key(args)?)?;
    let output = args.get_one::<PathBuf>("output");
    let format = choose_export_format(args.get_one::<String>("format"), output);

    match output {
        Some(path) => export_to_file(&collection, format, path),
        None => {
            let content =
                render_collection(&collection, format).context("failed to render collection")?;
            print!("{}", content);
            Ok(())
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
