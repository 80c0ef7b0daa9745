use clap::Parser;
use colored::Colorize;

mod cli;
mod commands;
mod logging;
mod output;
mod styles;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match commands::dispatch(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            std::process::exit(2);
        }
    }
}
