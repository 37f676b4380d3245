use clap::ValueEnum;
use leadflow_core::audit::{AuditContext, InMemoryAuditSink};
use leadflow_core::backend::InMemoryBackend;
use leadflow_core::domain::lead::LeadFields;
use leadflow_core::funnel::{CheckoutSignal, LeadFunnel, PaymentResolution};
use serde::Serialize;
use serde_json::json;

use crate::commands::{runtime, CommandResult, EXIT_BACKEND};

/// How the simulated checkout widget ends the demo payment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DemoOutcome {
    #[default]
    Verified,
    Failed,
    Dismissed,
}

#[derive(Debug, Serialize)]
struct AuditLine {
    event_type: String,
    outcome: String,
    order_id: Option<String>,
}

/// Walks one lead through the funnel against the in-memory backend, then fires a late
/// dismissal to show that it is suppressed.
pub fn run(outcome: DemoOutcome) -> CommandResult {
    let runtime = match runtime("demo") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let funnel = LeadFunnel::new(
        InMemoryBackend::default(),
        InMemoryAuditSink::default(),
        AuditContext::generated("leadflow-demo"),
    );

    let result = runtime.block_on(async {
        funnel.submit_lead(&demo_lead()).await.map_err(|error| error.to_string())?;
        let packages = funnel.load_packages().await.map_err(|error| error.to_string())?;
        let package = packages
            .into_iter()
            .find(|package| package.popular)
            .ok_or_else(|| "demo catalog has no popular package".to_string())?;
        let checkout = funnel.select_package(package).await.map_err(|error| error.to_string())?;

        let signal = match outcome {
            DemoOutcome::Verified => CheckoutSignal::Completed {
                payment_id: "pay_demo_0001".to_string(),
                signature: "demo-signature".to_string(),
            },
            DemoOutcome::Failed => CheckoutSignal::Failed {
                reason: "card_declined".to_string(),
                payment_id: Some("pay_demo_0001".to_string()),
            },
            DemoOutcome::Dismissed => CheckoutSignal::Dismissed,
        };
        let resolution = funnel
            .handle_checkout_signal(&checkout.order_id, signal)
            .await
            .map_err(|error| error.user_message())?;
        let late = funnel
            .handle_checkout_signal(&checkout.order_id, CheckoutSignal::Dismissed)
            .await
            .map_err(|error| error.user_message())?;

        Ok::<_, String>((checkout, resolution, late))
    });

    let (checkout, resolution, late) = match result {
        Ok(done) => done,
        Err(message) => return CommandResult::failure("demo", "funnel", message, EXIT_BACKEND),
    };

    let snapshot = funnel.snapshot();
    let audit: Vec<AuditLine> = funnel
        .audit_sink()
        .events()
        .into_iter()
        .map(|event| AuditLine {
            event_type: event.event_type,
            outcome: format!("{:?}", event.outcome).to_ascii_lowercase(),
            order_id: event.order_id.map(|id| id.0),
        })
        .collect();

    CommandResult::success_with_data(
        "demo",
        format!("funnel finished in {:?}", snapshot.state),
        Some(json!({
            "checkout": checkout,
            "resolution": resolution,
            "late_dismissal": late,
            "late_dismissal_suppressed": matches!(late, PaymentResolution::Ignored(_)),
            "dispositions": funnel.backend().dispositions(&checkout.order_id),
            "state": snapshot.state,
            "audit": audit,
        })),
    )
}

fn demo_lead() -> LeadFields {
    LeadFields {
        region: "India".to_string(),
        name: "Demo Lead".to_string(),
        email: "demo@example.com".to_string(),
        phone: "+91 9876543210".to_string(),
        company: Some("Demo Co".to_string()),
        service: Some("SEO".to_string()),
        message: Some("Interested in growth package".to_string()),
        consent: true,
    }
}
