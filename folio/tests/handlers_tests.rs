use folio::commands::command_argument_builder;
use folio::handlers::*;
use folio_core::data::Database;
use folio_core::model::Collection;
use folio_core::report::ExportFormat;
use folio_scanner::{ChapterContent, ChapterRecord, ContentType, SelectorSet};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn saved_collection(db_path: &Path, name: &str) -> Collection {
    let collection = Collection::new(
        name,
        "https://serial.example.com/chapter-1",
        ContentType::Text,
        SelectorSet::new("h1", "div.text p", "a.next"),
        vec![ChapterRecord::new(
            "https://serial.example.com/chapter-1".to_string(),
            "Arrival".to_string(),
            ChapterContent::Paragraphs(vec!["It was raining.".to_string()]),
        )],
    );
    let db = Database::new(db_path).unwrap();
    db.save_collection(&collection).unwrap();
    collection
}

/// Matches for `folio collection <args..>`, returning the innermost subcommand's matches.
fn collection_args(args: &[&str]) -> clap::ArgMatches {
    let mut argv = vec!["folio", "collection"];
    argv.extend_from_slice(args);
    let matches = command_argument_builder()
        .try_get_matches_from(argv)
        .unwrap();
    let (_, collection) = matches.subcommand().unwrap();
    let (_, action) = collection.subcommand().unwrap();
    action.clone()
}

// ============================================================================
// Argument helpers
// ============================================================================

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://example.com/chapter-1");
    assert_eq!(result, Some("https://example.com/chapter-1".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    let result = parse_url_line("  example.com/fiction/1 ");
    assert_eq!(result, Some("https://example.com/fiction/1".to_string()));
}

#[test]
fn test_parse_url_line_invalid() {
    assert_eq!(parse_url_line("not a valid url!!!"), None);
    assert_eq!(parse_url_line(""), None);
    assert_eq!(parse_url_line("ftp://example.com/file"), None);
}

#[test]
fn test_resolve_db_path() {
    let explicit = PathBuf::from("/tmp/books/folio.db");
    assert_eq!(resolve_db_path(Some(&explicit)), explicit);

    let default = resolve_db_path(None);
    assert!(default.ends_with(".config/folio/folio.db"));
}

#[test]
fn test_choose_export_format() {
    let md = PathBuf::from("book.md");
    let json = "json".to_string();

    assert_eq!(choose_export_format(None, None), ExportFormat::Text);
    assert_eq!(choose_export_format(None, Some(&md)), ExportFormat::Markdown);
    assert_eq!(choose_export_format(Some(&json), Some(&md)), ExportFormat::Json);
    assert_eq!(
        choose_export_format(None, Some(&PathBuf::from("book.epub"))),
        ExportFormat::Text
    );
}

#[test]
fn test_open_database_requires_init() {
    let temp_dir = TempDir::new().unwrap();
    let err = open_database(&temp_dir.path().join("folio.db")).unwrap_err();
    assert!(err.to_string().contains("folio init"));
}

// ============================================================================
// Init
// ============================================================================

#[test]
fn test_init_creates_database() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("config");
    let config_str = config_dir.to_string_lossy().to_string();

    let matches = command_argument_builder()
        .try_get_matches_from(["folio", "init", config_str.as_str()])
        .unwrap();
    let (_, init) = matches.subcommand().unwrap();

    handle_init(init).unwrap();
    assert!(Database::exists(&config_dir.join(DATABASE_FILE)));
}

#[test]
fn test_init_force_replaces_database() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join(DATABASE_FILE);
    saved_collection(&db_path, "Old");
    let dir_str = temp_dir.path().to_string_lossy().to_string();

    let matches = command_argument_builder()
        .try_get_matches_from(["folio", "init", dir_str.as_str(), "--force"])
        .unwrap();
    let (_, init) = matches.subcommand().unwrap();

    handle_init(init).unwrap();
    let db = Database::new(&db_path).unwrap();
    assert_eq!(db.count_collections().unwrap(), 0);
}

// ============================================================================
// Collection management
// ============================================================================

#[test]
fn test_collection_rename() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("folio.db");
    let collection = saved_collection(&db_path, "Working Title");
    let db_str = db_path.to_string_lossy().to_string();

    let args = collection_args(&["rename", &collection.id[..8], "Final Title", "--db", db_str.as_str()]);
    handle_collection_rename(&args).unwrap();

    let db = Database::new(&db_path).unwrap();
    let loaded = db.get_collection(&collection.id).unwrap().unwrap();
    assert_eq!(loaded.name, "Final Title");
}

#[test]
fn test_collection_remove() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("folio.db");
    saved_collection(&db_path, "Short Story");
    let db_str = db_path.to_string_lossy().to_string();

    let args = collection_args(&["remove", "Short Story", "--db", db_str.as_str()]);
    handle_collection_remove(&args).unwrap();

    let db = Database::new(&db_path).unwrap();
    assert_eq!(db.count_collections().unwrap(), 0);
}

#[test]
fn test_collection_unknown_key() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("folio.db");
    saved_collection(&db_path, "Short Story");
    let db_str = db_path.to_string_lossy().to_string();

    let args = collection_args(&["show", "Long Story", "--db", db_str.as_str()]);
    let err = handle_collection_show(&args).unwrap_err();
    assert!(err.to_string().contains("no collection matches"));
}

#[test]
fn test_collection_show_chapter_out_of_range() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("folio.db");
    saved_collection(&db_path, "Short Story");
    let db_str = db_path.to_string_lossy().to_string();

    let args = collection_args(&["show", "Short Story", "-c", "1", "--db", db_str.as_str()]);
    handle_collection_show(&args).unwrap();

    let args = collection_args(&["show", "Short Story", "-c", "2", "--db", db_str.as_str()]);
    let err = handle_collection_show(&args).unwrap_err();
    assert!(err.to_string().contains("out of range"));
}

#[test]
fn test_collection_export_to_file() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("folio.db");
    saved_collection(&db_path, "Exported");
    let db_str = db_path.to_string_lossy().to_string();
    let out_path = temp_dir.path().join("exported.md");
    let out_str = out_path.to_string_lossy().to_string();

    let args = collection_args(&["export", "Exported", "-o", out_str.as_str(), "--db", db_str.as_str()]);
    handle_collection_export(&args).unwrap();

    let written = std::fs::read_to_string(&out_path).unwrap();
    assert!(written.starts_with("# Exported\n"));
    assert!(written.contains("It was raining."));
}

// ============================================================================
// Scrape
// ============================================================================

#[tokio::test]
async fn test_scrape_saves_and_exports() {
    let site = MockServer::start().await;
    for (n, next) in [(1, Some(2)), (2, None)] {
        let link = next
            .map(|m| format!(r#"<a class="next" href="/chapter-{}">Next</a>"#, m))
            .unwrap_or_default();
        Mock::given(method("GET"))
            .and(path(format!("/chapter-{}", n)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(format!(
                        "<html><body><h1>Part {n}</h1><div class=\"text\"><p>Body {n}.</p></div>{link}</body></html>"
                    )),
            )
            .mount(&site)
            .await;
    }

    let model = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content":
                "{\"titleSelector\": \"h1\", \"contentSelector\": \"div.text p\", \"nextPageSelector\": \"a.next\"}"
            }}]
        })))
        .mount(&model)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("folio.db");
    let out_path = temp_dir.path().join("serial.json");
    let url = format!("{}/chapter-1", site.uri());
    let api_base = model.uri();
    let db_str = db_path.to_string_lossy().to_string();
    let out_str = out_path.to_string_lossy().to_string();

    let matches = command_argument_builder()
        .try_get_matches_from([
            "folio", "scrape", "-u", url.as_str(), "-s", "1", "-e", "5", "-n", "Mock Serial",
            "--api-base", api_base.as_str(), "--db", db_str.as_str(), "-o", out_str.as_str(),
        ])
        .unwrap();
    let (_, scrape) = matches.subcommand().unwrap();

    handle_scrape(scrape).await.unwrap();

    let db = Database::new(&db_path).unwrap();
    let saved = db.find_collection("Mock Serial").unwrap().unwrap();
    assert_eq!(saved.chapters.len(), 2);
    assert_eq!(saved.chapters[1].title, "Part 2");

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(exported["collection"]["chapterCount"], 2);
}

#[tokio::test]
async fn test_scrape_reports_unreachable_seed() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&site)
        .await;

    let url = format!("{}/missing", site.uri());
    let matches = command_argument_builder()
        .try_get_matches_from(["folio", "scrape", "-u", url.as_str(), "-s", "1", "-e", "2", "--no-save"])
        .unwrap();
    let (_, scrape) = matches.subcommand().unwrap();

    let err = handle_scrape(scrape).await.unwrap_err();
    assert!(err.to_string().starts_with("[fetch_error]"));
}
