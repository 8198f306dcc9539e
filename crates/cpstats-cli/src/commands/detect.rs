use cpstats_core::ProfileReference;
use serde_json::{json, Value};

use crate::cli::DetectArgs;
use crate::error::CliError;
use crate::output::Table;

use super::CommandResult;

pub fn run(args: &DetectArgs) -> Result<CommandResult, CliError> {
    let mut table = Table::new(vec!["reference", "platform", "username", "profile"]);
    let mut results = Vec::with_capacity(args.references.len());
    let mut failures = 0;

    for raw in &args.references {
        let entry = match ProfileReference::parse(raw) {
            Ok(reference) => {
                table.push_row(vec![
                    raw.clone(),
                    reference.platform().to_string(),
                    reference.username().to_owned(),
                    reference.profile_url(),
                ]);
                json!({
                    "reference": raw,
                    "platform": reference.platform(),
                    "username": reference.username(),
                    "cacheKey": reference.cache_key(),
                    "profileUrl": reference.profile_url(),
                })
            }
            Err(error) => {
                failures += 1;
                table.push_row(vec![raw.clone(), format!("error: {}", error.code())]);
                json!({
                    "reference": raw,
                    "error": { "code": error.code(), "message": error.to_string() },
                })
            }
        };
        results.push(entry);
    }

    Ok(CommandResult::ok(Value::Array(results), table).with_failures(failures))
}
