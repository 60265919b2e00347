pub mod data;
pub mod model;
pub mod report;
pub mod scrape;

use colored::Colorize;

const BANNER: &str = r#"
    ____      ___
   / __/___  / (_)___
  / /_/ __ \/ / / __ \
 / __/ /_/ / / / /_/ /
/_/  \____/_/_/\____/
"#;

pub fn print_banner() {
    println!("{}", BANNER.bright_cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_white(),
        "- pull serialized books off the web, one chapter at a time".dimmed()
    );
}
