mod detect;
mod fetch;
mod platforms;

use std::time::Instant;

use cpstats_core::PipelineConfig;
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::Metadata;
use crate::output::Table;

pub struct CommandResult {
    pub data: Value,
    pub table: Table,
    pub warnings: Vec<String>,
    pub failures: usize,
}

impl CommandResult {
    pub fn ok(data: Value, table: Table) -> Self {
        Self {
            data,
            table,
            warnings: Vec::new(),
            failures: 0,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_failures(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }
}

/// Finished command: metadata plus the payload in both renderings.
pub struct CommandOutput {
    pub meta: Metadata,
    pub data: Value,
    pub table: Table,
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let started = Instant::now();

    let (name, result) = match &cli.command {
        Command::Fetch(args) => ("fetch", fetch::run(args, load_config(cli)?).await?),
        Command::Detect(args) => ("detect", detect::run(args)?),
        Command::Platforms => ("platforms", platforms::run(&load_config(cli)?)?),
    };

    let CommandResult {
        data,
        table,
        warnings,
        failures,
    } = result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = Metadata::new(name, latency_ms, failures);
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(CommandOutput { meta, data, table })
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, CliError> {
    Ok(PipelineConfig::load(cli.config.as_deref())?)
}
