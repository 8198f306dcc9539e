//! CLI argument definitions for cpstats.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Look up one or more profiles through the pipeline |
//! | `detect` | Resolve profile URLs to `platform:username` without fetching |
//! | `platforms` | List supported platforms and their resilience policies |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | `$CPSTATS_CONFIG` | TOML configuration file |
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--verbose` | `false` | Debug-level logs on stderr |
//! | `--json-logs` | `false` | Emit logs as JSON lines |
//!
//! # Examples
//!
//! ```bash
//! cpstats fetch https://codeforces.com/profile/tourist --pretty
//! cpstats fetch leetcode:neal_wu github:torvalds --refresh --trace
//! cpstats detect https://atcoder.jp/users/tourist
//! cpstats platforms --format table
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// cpstats - competitive-programming profile statistics
///
/// Fetches LeetCode, Codeforces, GitHub, CodeChef and AtCoder profiles and
/// prints them in one canonical shape.
#[derive(Debug, Parser)]
#[command(
    name = "cpstats",
    author,
    version,
    about = "Competitive-programming profile statistics",
    long_about = "cpstats looks up public profile statistics on LeetCode, Codeforces, GitHub, \
CodeChef and AtCoder and normalizes them into one shape. Lookups are cached, \
rate limited per caller and protected by per-platform circuit breakers.\n\
\n\
Use 'cpstats <command> --help' for command-specific help."
)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "CPSTATS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log at debug level instead of warn.
    ///
    /// `RUST_LOG` takes precedence when set.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON document.
    Json,
    /// Aligned text table for terminal display.
    Table,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch profile statistics for one or more targets.
    ///
    /// Targets are profile URLs or `platform:username` pairs. Lookups run
    /// concurrently; each result carries its own trace id.
    ///
    /// # Examples
    ///
    ///   cpstats fetch https://leetcode.com/u/neal_wu/
    ///   cpstats fetch codeforces:tourist atcoder:tourist --pretty
    Fetch(FetchArgs),

    /// Resolve references to platform and username without any network call.
    ///
    /// # Examples
    ///
    ///   cpstats detect https://www.codechef.com/users/gennady
    Detect(DetectArgs),

    /// List platforms, adapter strategies and resilience policies.
    Platforms,
}

/// Arguments for the `fetch` command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Profile URLs or `platform:username` pairs.
    #[arg(required = true, num_args = 1..)]
    pub targets: Vec<String>,

    /// Skip the cache read but store the fresh result.
    #[arg(long, default_value_t = false, conflicts_with = "no_cache")]
    pub refresh: bool,

    /// Neither read nor write the cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    /// Attach the recorded stage trace to every result.
    #[arg(long, default_value_t = false)]
    pub trace: bool,

    /// Caller address used for rate and bandwidth admission.
    #[arg(long, default_value = "127.0.0.1")]
    pub caller_ip: String,
}

/// Arguments for the `detect` command.
#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Profile URLs or `platform:username` pairs.
    #[arg(required = true, num_args = 1..)]
    pub references: Vec<String>,
}
