use cpstats_core::{Platform, PipelineConfig};
use serde_json::{json, Value};

use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

pub fn run(config: &PipelineConfig) -> Result<CommandResult, CliError> {
    let mut table = Table::new(vec![
        "platform",
        "strategy",
        "concurrency",
        "queue",
        "timeout_ms",
        "breaker",
        "retries",
    ]);
    let mut matrix = Vec::with_capacity(Platform::ALL.len());

    for platform in Platform::ALL {
        let policy = config.policy_for(platform);
        let call_timeout_ms = millis(policy.call_timeout);
        let cooldown_ms = millis(policy.breaker.cooldown);
        table.push_row(vec![
            platform.to_string(),
            policy.strategy.to_string(),
            policy.max_concurrency.to_string(),
            policy.max_queue.to_string(),
            call_timeout_ms.to_string(),
            format!("{} / {}ms", policy.breaker.failure_threshold, cooldown_ms),
            policy.retry_backoff.max_retries.to_string(),
        ]);
        matrix.push(json!({
            "platform": platform,
            "domain": platform.domain(),
            "strategy": policy.strategy,
            "maxConcurrency": policy.max_concurrency,
            "maxQueue": policy.max_queue,
            "callTimeoutMs": call_timeout_ms,
            "failureThreshold": policy.breaker.failure_threshold,
            "cooldownMs": cooldown_ms,
            "maxRetries": policy.retry_backoff.max_retries,
            "initialBackoffMs": millis(policy.retry_backoff.initial_delay),
            "maxBackoffMs": millis(policy.retry_backoff.max_delay),
        }));
    }

    let mut result = CommandResult::ok(Value::Array(matrix), table);
    if config.http.github_token.is_none() {
        result = result.with_warning("no GitHub token configured; the API allows 60 requests per hour");
    }
    Ok(result)
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
