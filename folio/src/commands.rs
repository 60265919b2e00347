use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

fn db_arg() -> clap::Arg {
    arg!(--"db" <PATH>)
        .required(false)
        .help("Collection database to use (default: ~/.config/folio/folio.db)")
        .value_parser(clap::value_parser!(PathBuf))
}

fn collection_key_arg() -> clap::Arg {
    arg!(<COLLECTION>)
        .required(true)
        .help("Collection id, unique id prefix, or exact name")
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("folio")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("folio")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the folio collection database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the folio database")
                        .default_value("~/.config/folio/"),
                )
                .arg(
                    arg!(-f --"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("scrape")
                .about(
                    "Locate the chapter content on a page and extract a range of chapters by \
                following next-page links.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The page holding the first chapter to extract"),
                )
                .arg(
                    arg!(-s --"start" <CHAPTER>)
                        .required(true)
                        .help("Number of the chapter at --url (1 or more)")
                        .value_parser(clap::value_parser!(u32).range(1..)),
                )
                .arg(
                    arg!(-e --"end" <CHAPTER>)
                        .required(true)
                        .help("Number of the last chapter to extract")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    arg!(-t --"type" <TYPE>)
                        .required(false)
                        .help("What the chapters hold")
                        .value_parser(["text", "image"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-n --"name" <NAME>)
                        .required(false)
                        .help("Name for the saved collection (default: derived from the URL)"),
                )
                .arg(
                    arg!(--"model" <MODEL>)
                        .required(false)
                        .help("Model used to locate the content (default: $FOLIO_MODEL or gpt-3.5-turbo)"),
                )
                .arg(
                    arg!(--"api-base" <URL>)
                        .required(false)
                        .help("OpenAI-compatible API base URL (default: $FOLIO_API_BASE or https://api.openai.com/v1)"),
                )
                .arg(
                    arg!(--"concurrency" <N>)
                        .required(false)
                        .help("Model requests in flight at once while locating content")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("4"),
                )
                .arg(
                    arg!(--"chunk-size" <CHARS>)
                        .required(false)
                        .help("Characters of page markup sent to the model per request")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("4000"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Page request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("15"),
                )
                .arg(
                    arg!(--"next-case-insensitive")
                        .required(false)
                        .help("Also accept links reading \"next\" in any letter case when no better next-page link exists")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(db_arg())
                .arg(
                    arg!(--"no-save")
                        .required(false)
                        .help("Do not store the result as a collection")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Also export the chapters to a file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Export format: text, json, markdown, html (default: from the --output extension, else text)")
                        .value_parser(["text", "json", "markdown", "html"]),
                ),
        )
        .subcommand(
            command!("collection")
                .about("Manage saved collections")
                .subcommand_required(true)
                .subcommand(
                    command!("list")
                        .about("List all saved collections")
                        .arg(db_arg()),
                )
                .subcommand(
                    command!("show")
                        .about("Show a collection, or read one of its chapters")
                        .arg(collection_key_arg())
                        .arg(
                            arg!(-c --"chapter" <INDEX>)
                                .required(false)
                                .help("Print this chapter (1-based) instead of the chapter list")
                                .value_parser(clap::value_parser!(u32).range(1..)),
                        )
                        .arg(db_arg()),
                )
                .subcommand(
                    command!("rename")
                        .about("Renames a collection")
                        .arg(collection_key_arg())
                        .arg(
                            arg!(<NEW_NAME>)
                                .required(true)
                                .help("The new name for the collection"),
                        )
                        .arg(db_arg()),
                )
                .subcommand(
                    command!("remove")
                        .about("Removes a collection")
                        .arg(collection_key_arg())
                        .arg(db_arg()),
                )
                .subcommand(
                    command!("export")
                        .about("Export a collection as text, JSON, Markdown or HTML")
                        .arg(collection_key_arg())
                        .arg(
                            arg!(-o --"output" <PATH>)
                                .required(false)
                                .help("Save to file (default: print to screen)")
                                .value_parser(clap::value_parser!(PathBuf)),
                        )
                        .arg(
                            arg!(-f --"format" <FORMAT>)
                                .required(false)
                                .help("Export format: text, json, markdown, html")
                                .value_parser(["text", "json", "markdown", "html"]),
                        )
                        .arg(db_arg()),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_definition_is_valid() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_scrape_arguments() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "folio", "scrape", "-u", "https://example.com/1", "-s", "1", "-e", "3", "-t",
                "image", "--no-save",
            ])
            .unwrap();
        let (name, scrape) = matches.subcommand().unwrap();

        assert_eq!(name, "scrape");
        assert_eq!(scrape.get_one::<u32>("start"), Some(&1));
        assert_eq!(scrape.get_one::<u32>("end"), Some(&3));
        assert_eq!(scrape.get_one::<String>("type").map(String::as_str), Some("image"));
        assert_eq!(scrape.get_one::<usize>("concurrency"), Some(&4));
        assert!(scrape.get_flag("no-save"));
        assert!(!scrape.get_flag("next-case-insensitive"));
    }

    #[test]
    fn test_scrape_rejects_chapter_zero() {
        let result = command_argument_builder().try_get_matches_from([
            "folio", "scrape", "-u", "https://example.com/1", "-s", "0", "-e", "3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_collection_requires_subcommand() {
        let result = command_argument_builder().try_get_matches_from(["folio", "collection"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_collection_show_chapter() {
        let matches = command_argument_builder()
            .try_get_matches_from(["folio", "collection", "show", "abc123", "-c", "2"])
            .unwrap();
        let (_, collection) = matches.subcommand().unwrap();
        let (name, show) = collection.subcommand().unwrap();

        assert_eq!(name, "show");
        assert_eq!(show.get_one::<String>("COLLECTION").map(String::as_str), Some("abc123"));
        assert_eq!(show.get_one::<u32>("chapter"), Some(&2));
    }
}
