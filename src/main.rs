use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        if weread_sync::error::is_config_error(&err) {
            return ExitCode::from(EXIT_CONFIG);
        }
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    weread_sync::logging::init().context("init logging")?;
    weread_sync::config::load_dotenv()?;

    let cli = weread_sync::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        weread_sync::cli::Command::Sync(args) => {
            weread_sync::run::sync(args).context("sync")?;
        }
        weread_sync::cli::Command::BookUrl(args) => {
            weread_sync::run::book_url(args).context("book-url")?;
        }
    }

    Ok(())
}
