use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::funnel::states::{
    FunnelAction, FunnelContext, FunnelEvent, FunnelState, IgnoreReason, Transition,
    TransitionOutcome,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FunnelTransitionError {
    #[error("invalid transition from {state:?} using event {event}")]
    InvalidTransition { state: FunnelState, event: &'static str },
    #[error("lead was acknowledged without an identifier")]
    EmptyLeadId,
    #[error("no lead has been registered for this workflow")]
    MissingLead,
    #[error("no package has been selected for this workflow")]
    MissingPackage,
}

/// Result of the pure transition function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Advance { to: FunnelState, context: FunnelContext, actions: Vec<FunnelAction> },
    Ignore(IgnoreReason),
}

/// Current state plus context for one workflow instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunnelMachine {
    state: FunnelState,
    context: FunnelContext,
}

impl Default for FunnelMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl FunnelMachine {
    pub fn new() -> Self {
        Self { state: FunnelState::LeadIntake, context: FunnelContext::default() }
    }

    pub fn state(&self) -> FunnelState {
        self.state
    }

    pub fn context(&self) -> &FunnelContext {
        &self.context
    }

    /// Applies `event`, committing state and context together.
    pub fn apply(&mut self, event: FunnelEvent) -> Result<Transition, FunnelTransitionError> {
        match transition(self.state, &self.context, &event)? {
            Step::Advance { to, context, actions } => {
                let from = self.state;
                self.state = to;
                self.context = context;
                Ok(Transition::Applied(TransitionOutcome { from, to, event, actions }))
            }
            Step::Ignore(reason) => Ok(Transition::Ignored { state: self.state, event, reason }),
        }
    }

    pub fn apply_with_audit<S>(
        &mut self,
        event: FunnelEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<Transition, FunnelTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let event_order = event.order_id().cloned();
        let event_name = event.name();
        let result = self.apply(event);
        let order_id = event_order.or_else(|| self.context.order_id.clone());

        let audit_event = match &result {
            Ok(Transition::Applied(outcome)) => AuditEvent::new(
                audit,
                "funnel.transition_applied",
                AuditCategory::Funnel,
                AuditOutcome::Success,
            )
            .with_metadata("from", format!("{:?}", outcome.from))
            .with_metadata("to", format!("{:?}", outcome.to))
            .with_metadata("event", event_name),
            Ok(Transition::Ignored { state, reason, .. }) => AuditEvent::new(
                audit,
                "funnel.transition_ignored",
                AuditCategory::Funnel,
                AuditOutcome::Suppressed,
            )
            .with_metadata("state", format!("{state:?}"))
            .with_metadata("reason", format!("{reason:?}"))
            .with_metadata("event", event_name),
            Err(error) => AuditEvent::new(
                audit,
                "funnel.transition_rejected",
                AuditCategory::Funnel,
                AuditOutcome::Rejected,
            )
            .with_metadata("error", error.to_string())
            .with_metadata("event", event_name),
        };
        sink.emit(
            audit_event.with_lead(self.context.lead_id.as_ref()).with_order(order_id.as_ref()),
        );

        result
    }
}

pub fn transition(
    current: FunnelState,
    context: &FunnelContext,
    event: &FunnelEvent,
) -> Result<Step, FunnelTransitionError> {
    use FunnelAction::{
        CreateOrder, FetchPackages, OpenCheckout, RecordOptOut, ReportAbandonment, ReportFailure,
        VerifyPayment,
    };
    use FunnelEvent::{
        BackRequested, CheckoutDismissed, LeadAccepted, OrderCreated, OrderCreationFailed,
        PackageSelected, PaymentCompleted, PaymentRejected, RetryRequested, SkipRequested,
        VerificationConfirmed, VerificationFailed,
    };
    use FunnelState::{
        AwaitingPayment, LeadIntake, OptedOut, OrderCreating, PackageSelection, PaymentAbandoned,
        PaymentFailed, PaymentSucceeded, VerificationRejected, Verifying,
    };

    // Widget signals and verification answers are keyed by order; anything aimed at a
    // superseded order, or at one that already has a disposition, is dropped here.
    if let Some(reason) = order_guard(context, event) {
        return Ok(Step::Ignore(reason));
    }

    let invalid = || FunnelTransitionError::InvalidTransition { state: current, event: event.name() };
    let mut next = context.clone();

    let (to, actions) = match (current, event) {
        (LeadIntake, LeadAccepted { lead_id }) => {
            if lead_id.0.trim().is_empty() {
                return Err(FunnelTransitionError::EmptyLeadId);
            }
            next.lead_id = Some(lead_id.clone());
            (PackageSelection, vec![FetchPackages])
        }
        (PackageSelection, PackageSelected { package_id }) => {
            if next.lead_id.is_none() {
                return Err(FunnelTransitionError::MissingLead);
            }
            next.package_id = Some(package_id.clone());
            next.reset_order_slot();
            (OrderCreating, vec![CreateOrder { attempt: next.order_attempt }])
        }
        (PackageSelection, SkipRequested) => (OptedOut, vec![RecordOptOut]),
        (PackageSelection, BackRequested) => {
            next.package_id = None;
            (LeadIntake, Vec::new())
        }
        (OrderCreating, OrderCreated { attempt, order_id }) => {
            if *attempt != context.order_attempt {
                return Ok(Step::Ignore(IgnoreReason::StaleResponse));
            }
            next.order_id = Some(order_id.clone());
            next.resolved = false;
            (AwaitingPayment, vec![OpenCheckout { order_id: order_id.clone() }])
        }
        (OrderCreating, OrderCreationFailed { attempt }) => {
            if *attempt != context.order_attempt {
                return Ok(Step::Ignore(IgnoreReason::StaleResponse));
            }
            (PaymentFailed, Vec::new())
        }
        (_, OrderCreated { .. } | OrderCreationFailed { .. }) => {
            return Ok(Step::Ignore(IgnoreReason::StaleResponse));
        }
        (AwaitingPayment, PaymentCompleted { order_id }) => {
            next.resolved = true;
            (Verifying, vec![VerifyPayment { order_id: order_id.clone() }])
        }
        (AwaitingPayment, PaymentRejected { order_id }) => {
            next.resolved = true;
            (PaymentFailed, vec![ReportFailure { order_id: order_id.clone() }])
        }
        (AwaitingPayment, CheckoutDismissed { order_id }) => {
            next.resolved = true;
            (PaymentAbandoned, vec![ReportAbandonment { order_id: order_id.clone() }])
        }
        (Verifying, VerificationConfirmed { .. }) => (PaymentSucceeded, Vec::new()),
        (Verifying, VerificationFailed { .. }) => (VerificationRejected, Vec::new()),
        (PaymentFailed | PaymentAbandoned, RetryRequested) => {
            if next.lead_id.is_none() {
                return Err(FunnelTransitionError::MissingLead);
            }
            if next.package_id.is_none() {
                return Err(FunnelTransitionError::MissingPackage);
            }
            next.reset_order_slot();
            (OrderCreating, vec![CreateOrder { attempt: next.order_attempt }])
        }
        (AwaitingPayment, BackRequested) => {
            // Leaving an open checkout is an abandonment of the live order.
            let order_id = context.order_id.clone().ok_or_else(invalid)?;
            next.package_id = None;
            next.reset_order_slot();
            (PackageSelection, vec![ReportAbandonment { order_id }])
        }
        (OrderCreating | PaymentFailed | PaymentAbandoned | VerificationRejected, BackRequested) => {
            next.package_id = None;
            next.reset_order_slot();
            (PackageSelection, Vec::new())
        }
        _ => return Err(invalid()),
    };

    Ok(Step::Advance { to, context: next, actions })
}

fn order_guard(context: &FunnelContext, event: &FunnelEvent) -> Option<IgnoreReason> {
    let order_id = match event {
        FunnelEvent::PaymentCompleted { order_id }
        | FunnelEvent::PaymentRejected { order_id }
        | FunnelEvent::CheckoutDismissed { order_id }
        | FunnelEvent::VerificationConfirmed { order_id }
        | FunnelEvent::VerificationFailed { order_id } => order_id,
        _ => return None,
    };

    if context.order_id.as_ref() != Some(order_id) {
        return Some(IgnoreReason::StaleOrder);
    }

    let widget_signal = matches!(
        event,
        FunnelEvent::PaymentCompleted { .. }
            | FunnelEvent::PaymentRejected { .. }
            | FunnelEvent::CheckoutDismissed { .. }
    );
    if widget_signal && context.resolved {
        return Some(IgnoreReason::AlreadyResolved);
    }

    None
}
