use clap::ArgMatches;
use colored::Colorize;
use folio::commands::command_argument_builder;
use folio::handlers::{
    handle_collection_export, handle_collection_list, handle_collection_remove,
    handle_collection_rename, handle_collection_show, handle_init, handle_scrape,
};
use folio_core::print_banner;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    if let Err(e) = dispatch(&chosen_command).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(chosen_command: &ArgMatches) -> anyhow::Result<()> {
    match chosen_command.subcommand() {
        Some(("init", primary_command)) => handle_init(primary_command),
        Some(("scrape", primary_command)) => handle_scrape(primary_command).await,
        Some(("collection", primary_command)) => match primary_command.subcommand() {
            Some(("list", secondary_command)) => handle_collection_list(secondary_command),
            Some(("show", secondary_command)) => handle_collection_show(secondary_command),
            Some(("rename", secondary_command)) => handle_collection_rename(secondary_command),
            Some(("remove", secondary_command)) => handle_collection_remove(secondary_command),
            Some(("export", secondary_command)) => handle_collection_export(secondary_command),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

// Logs go to stderr so exports printed to stdout stay clean; RUST_LOG overrides the level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
