mod cli;
mod commands;
mod error;
mod logging;
mod metadata;
mod output;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs)?;

    let output = commands::run(&cli).await?;
    output::render(&output.meta, &output.data, &output.table, cli.format, cli.pretty)?;

    if output.meta.failures > 0 {
        return Ok(ExitCode::from(3));
    }

    Ok(ExitCode::SUCCESS)
}
