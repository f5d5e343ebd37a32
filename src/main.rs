use anyhow::Result;
use ciwait::cli::Cli;
use ciwait::output;
use clap::Parser;
use log::info;

fn init_logging() {
    let default_level = match std::env::var("DEBUG").as_deref() {
        Ok("true") => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting ciwait");
    cli.execute().await?;

    Ok(())
}
