use leadflow_core::audit::{AuditContext, TracingAuditSink};
use leadflow_core::config::AppConfig;
use leadflow_core::funnel::LeadFunnel;
use leadflow_http::HttpFunnelBackend;
use serde_json::json;

use crate::commands::{load_config, runtime, CommandResult, EXIT_BACKEND, EXIT_CONFIG};

pub fn services() -> CommandResult {
    let (config, runtime) = match prepare("services") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    let funnel = match funnel("services", &config) {
        Ok(funnel) => funnel,
        Err(failure) => return failure,
    };

    match runtime.block_on(funnel.list_services()) {
        Ok(services) => CommandResult::success_with_data(
            "services",
            format!("{} services available", services.len()),
            Some(json!(services)),
        ),
        Err(error) => {
            CommandResult::failure("services", "backend", error.to_string(), EXIT_BACKEND)
        }
    }
}

pub fn packages(service: Option<&str>, region: Option<&str>) -> CommandResult {
    let (config, runtime) = match prepare("packages") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    let funnel = match funnel("packages", &config) {
        Ok(funnel) => funnel,
        Err(failure) => return failure,
    };

    match runtime.block_on(funnel.list_packages(service, region)) {
        Ok(packages) => CommandResult::success_with_data(
            "packages",
            format!("{} packages available", packages.len()),
            Some(json!(packages)),
        ),
        Err(error) => {
            CommandResult::failure("packages", "backend", error.to_string(), EXIT_BACKEND)
        }
    }
}

fn prepare(command: &str) -> Result<(AppConfig, tokio::runtime::Runtime), CommandResult> {
    let config = load_config(command)?;
    let runtime = runtime(command)?;
    Ok((config, runtime))
}

fn funnel(
    command: &str,
    config: &AppConfig,
) -> Result<LeadFunnel<HttpFunnelBackend, TracingAuditSink>, CommandResult> {
    let backend = HttpFunnelBackend::from_config(&config.backend).map_err(|error| {
        CommandResult::failure(command, "backend_client", error.to_string(), EXIT_CONFIG)
    })?;
    Ok(LeadFunnel::new(backend, TracingAuditSink, AuditContext::generated("leadflow-cli"))
        .with_checkout_settings(config.checkout_settings()))
}
