use std::sync::Arc;

use cpstats_core::{
    CacheMode, CallerContext, LookupResponse, LookupTarget, PipelineConfig, ProfileReference,
    StatsPipeline,
};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::debug;

use crate::cli::FetchArgs;
use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

const COLUMNS: [&str; 7] = [
    "target", "platform", "username", "rating", "solved", "rank", "source",
];

pub async fn run(args: &FetchArgs, config: PipelineConfig) -> Result<CommandResult, CliError> {
    let mode = cache_mode(args);
    let pipeline = Arc::new(StatsPipeline::from_config(config)?);
    let caller = CallerContext::new(args.caller_ip.as_str());

    let mut lookups = JoinSet::new();
    for (index, raw) in args.targets.iter().enumerate() {
        let pipeline = Arc::clone(&pipeline);
        let caller = caller.clone();
        let target = target_from(raw);
        lookups.spawn(async move { (index, pipeline.lookup(&caller, target, mode).await) });
    }

    let mut responses = Vec::with_capacity(args.targets.len());
    while let Some(joined) = lookups.join_next().await {
        let (index, response) =
            joined.map_err(|error| CliError::Command(format!("lookup task failed: {error}")))?;
        responses.push((index, response));
    }
    responses.sort_by_key(|(index, _)| *index);

    let mut table = Table::new(COLUMNS.to_vec());
    let mut results = Vec::with_capacity(responses.len());
    let mut failures = 0;
    let mut warnings = Vec::new();
    for (index, response) in responses {
        let target = &args.targets[index];
        if !response.success {
            failures += 1;
        }
        table.push_row(row(target, &response));
        if let Some(error) = &response.error {
            warnings.push(format!("{target}: {}", error.message));
        }

        let mut value = serde_json::to_value(&response)?;
        if args.trace {
            let trace = pipeline.trace(&response.trace_id);
            debug!(trace_id = %response.trace_id, found = trace.is_some(), "attaching trace");
            if let (Value::Object(object), Some(trace)) = (&mut value, trace) {
                object.insert(String::from("trace"), serde_json::to_value(trace)?);
            }
        }
        results.push(value);
    }

    let result = warnings.into_iter().fold(
        CommandResult::ok(Value::Array(results), table),
        |result, warning| result.with_warning(warning),
    );
    Ok(result.with_failures(failures))
}

const fn cache_mode(args: &FetchArgs) -> CacheMode {
    if args.no_cache {
        CacheMode::Bypass
    } else if args.refresh {
        CacheMode::Refresh
    } else {
        CacheMode::Use
    }
}

/// `platform:username` pairs resolve up front; anything else goes through
/// URL detection inside the pipeline so its failure is traced.
fn target_from(raw: &str) -> LookupTarget {
    match ProfileReference::parse(raw) {
        Ok(reference) => LookupTarget::Reference(reference),
        Err(_) => LookupTarget::Url(raw.to_owned()),
    }
}

fn row(target: &str, response: &LookupResponse) -> Vec<String> {
    match (&response.data, &response.error) {
        (Some(profile), _) => vec![
            target.to_owned(),
            profile.platform.to_string(),
            profile.username.clone(),
            profile.rating.to_string(),
            profile.total_solved.to_string(),
            profile
                .rank
                .as_ref()
                .map_or_else(|| String::from("-"), ToString::to_string),
            String::from(if response.is_from_cache() { "cache" } else { "live" }),
        ],
        (None, Some(error)) => vec![
            target.to_owned(),
            String::from("-"),
            String::from("-"),
            String::from("-"),
            String::from("-"),
            String::from("-"),
            format!("error: {}", error.code),
        ],
        (None, None) => vec![target.to_owned()],
    }
}
