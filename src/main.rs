use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = navscrape::cli::Cli::parse();
    navscrape::logging::init(cli.verbose).context("init logging")?;
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        navscrape::cli::Command::Scrape(args) => {
            navscrape::scrape::run(args).await.context("scrape")?;
        }
        navscrape::cli::Command::Detect(args) => {
            navscrape::detect::run(args).await.context("detect")?;
        }
    }

    Ok(())
}
