use std::fs;
use std::path::Path;

use anyhow::Context;
use leadflow_core::domain::lead::LeadFields;
use leadflow_core::intake;
use serde_json::json;

use crate::commands::{CommandResult, EXIT_INPUT};

/// Runs intake validation over a lead JSON file without contacting the backend.
pub fn run(path: &Path) -> CommandResult {
    let fields = match read_fields(path) {
        Ok(fields) => fields,
        Err(error) => {
            return CommandResult::failure("validate", "input", format!("{error:#}"), EXIT_INPUT)
        }
    };

    match intake::prepare_submission(&fields) {
        Ok(submission) => CommandResult::success_with_data(
            "validate",
            "lead is ready for submission",
            Some(json!(submission)),
        ),
        Err(invalid) => CommandResult::failure("validate", "validation", invalid.reason(), EXIT_INPUT),
    }
}

fn read_fields(path: &Path) -> anyhow::Result<LeadFields> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read lead file `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("lead file `{}` is not valid lead JSON", path.display()))
}
