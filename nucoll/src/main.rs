use colored::Colorize;
use commands::command_argument_builder;
use nucoll::handlers::{
    GlobalArgs, handle_edgelist, handle_fetch, handle_init, handle_resolve, handle_tweets,
};
use tracing::Level;

mod commands;

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();

    let globals = match GlobalArgs::from_matches(&matches) {
        Ok(globals) => globals,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let level = if globals.quiet { Level::WARN } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let result = match matches.subcommand() {
        Some(("init", args)) => handle_init(&globals, args).await,
        Some(("fetch", args)) => handle_fetch(&globals, args).await,
        Some(("edgelist", args)) => handle_edgelist(&globals, args).await,
        Some(("tweets", args)) => handle_tweets(&globals, args).await,
        Some(("resolve", args)) => handle_resolve(&globals, args).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
