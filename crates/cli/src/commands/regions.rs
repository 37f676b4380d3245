use leadflow_core::domain::region::supported_regions;
use serde_json::json;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let regions = supported_regions();
    CommandResult::success_with_data(
        "regions",
        format!("{} supported regions", regions.len()),
        Some(json!(regions)),
    )
}
