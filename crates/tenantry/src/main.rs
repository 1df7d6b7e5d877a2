mod cli;

use clap::Parser;
use console::style;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    if let Err(e) = cli.execute().await {
        eprintln!();
        eprintln!("  {} {:#}", style("✗").red().bold(), e);
        eprintln!();
        std::process::exit(1);
    }
}
