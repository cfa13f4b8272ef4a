mod cli;
mod commands;
mod error;
mod logging;

use crate::cli::Cli;
use crate::commands::Session;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use std::process::ExitCode;
use verso_config::Config;
use verso_store::Database;
use verso_vfs::Vfs;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(&cli.global);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.global.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(kind = %config.store.kind, path = %config.store.path.display(), "Opening store");
    let db = Database::open(&config.store).await.or_raise(|| ErrorKind::Store)?;
    let result = match Vfs::from_config(&db, &config.vfs).await.or_raise(|| ErrorKind::Store) {
        Ok(vfs) => cli.command.execute(&Session::new(vfs, &cli.global)).await,
        Err(err) => Err(err),
    };
    db.close().await;
    result
}
