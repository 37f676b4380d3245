//! Drives one visitor through intake, package selection and payment.
//!
//! All shared data lives in a [`FunnelMachine`] behind a mutex that is held only while a
//! transition is applied, never across a backend call. Widget callbacks and backend
//! answers therefore interleave at transition granularity, and the machine's order
//! guard decides which of them still count.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::backend::FunnelBackend;
use crate::domain::lead::{LeadFields, LeadId, LeadSubmission};
use crate::domain::order::{DismissalReport, OrderId, PaymentOrder, PaymentVerification};
use crate::domain::package::{Package, PackageQuery};
use crate::errors::{FetchError, FunnelError, OrderCreationError, SubmitError, VerificationError};
use crate::funnel::checkout::{CheckoutRequest, CheckoutSettings, CheckoutSignal, PaymentResolution};
use crate::funnel::machine::{FunnelMachine, FunnelTransitionError};
use crate::funnel::states::{FunnelAction, FunnelEvent, FunnelState, Stage, Transition};
use crate::intake;

#[derive(Default)]
struct Session {
    machine: FunnelMachine,
    lead: Option<LeadSubmission>,
    packages: Vec<Package>,
    selected: Option<Package>,
    order: Option<PaymentOrder>,
    last_error: Option<String>,
    submitting_lead: bool,
}

/// Clears the in-flight lead marker however `submit_lead` exits, cancellation included.
struct SubmissionMarker<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for SubmissionMarker<'_> {
    fn drop(&mut self) {
        lock_session(self.session).submitting_lead = false;
    }
}

/// Read-only view for the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunnelSnapshot {
    pub state: FunnelState,
    pub stage: Stage,
    pub lead_id: Option<LeadId>,
    pub lead: Option<LeadSubmission>,
    pub packages: Vec<Package>,
    pub selected_package: Option<Package>,
    pub order: Option<PaymentOrder>,
    pub last_error: Option<String>,
}

pub struct LeadFunnel<B, S> {
    backend: B,
    sink: S,
    audit: AuditContext,
    checkout: CheckoutSettings,
    session: Mutex<Session>,
}

impl<B, S> LeadFunnel<B, S>
where
    B: FunnelBackend,
    S: AuditSink,
{
    pub fn new(backend: B, sink: S, audit: AuditContext) -> Self {
        Self {
            backend,
            sink,
            audit,
            checkout: CheckoutSettings::default(),
            session: Mutex::new(Session::default()),
        }
    }

    pub fn with_checkout_settings(mut self, checkout: CheckoutSettings) -> Self {
        self.checkout = checkout;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn audit_sink(&self) -> &S {
        &self.sink
    }

    pub fn state(&self) -> FunnelState {
        self.session().machine.state()
    }

    pub fn snapshot(&self) -> FunnelSnapshot {
        let session = self.session();
        let state = session.machine.state();
        FunnelSnapshot {
            state,
            stage: state.stage(),
            lead_id: session.machine.context().lead_id.clone(),
            lead: session.lead.clone(),
            packages: session.packages.clone(),
            selected_package: session.selected.clone(),
            order: session.order.clone(),
            last_error: session.last_error.clone(),
        }
    }

    /// Validates and registers the lead. The workflow only leaves intake once the backend
    /// has returned a non-empty lead id. A second call while one is in flight is refused
    /// before it reaches the backend.
    pub async fn submit_lead(&self, fields: &LeadFields) -> Result<LeadId, SubmitError> {
        {
            let mut session = self.session();
            let state = session.machine.state();
            if state != FunnelState::LeadIntake {
                return Err(FunnelTransitionError::InvalidTransition {
                    state,
                    event: "lead_accepted",
                }
                .into());
            }
            if session.submitting_lead {
                debug!(
                    event_name = "funnel.lead.duplicate_submit",
                    correlation_id = %self.audit.correlation_id,
                    "lead submission already in flight"
                );
                return Err(SubmitError::InFlight);
            }
            session.submitting_lead = true;
        }
        let _marker = SubmissionMarker { session: &self.session };

        let submission = match intake::prepare_submission(fields) {
            Ok(submission) => submission,
            Err(invalid) => {
                self.session().last_error = Some(invalid.reason());
                return Err(invalid.into());
            }
        };

        debug!(
            event_name = "funnel.lead.submitting",
            correlation_id = %self.audit.correlation_id,
            region = %submission.region,
            "submitting lead"
        );
        let lead_id = match self.backend.submit_lead(&submission).await {
            Ok(lead_id) => lead_id,
            Err(failure) => {
                warn!(
                    event_name = "funnel.lead.rejected",
                    correlation_id = %self.audit.correlation_id,
                    error = %failure,
                    "lead submission failed"
                );
                self.session().last_error = Some(failure.to_string());
                return Err(failure);
            }
        };

        let mut session = self.session();
        self.apply(&mut session, FunnelEvent::LeadAccepted { lead_id: lead_id.clone() })?;
        session.lead = Some(submission);
        session.last_error = None;
        info!(
            event_name = "funnel.lead.submitted",
            correlation_id = %self.audit.correlation_id,
            lead_id = %lead_id,
            "lead registered"
        );
        Ok(lead_id)
    }

    pub async fn list_services(&self) -> Result<Vec<String>, FetchError> {
        self.backend.list_services().await
    }

    /// Catalog query with optional filters. Packages priced for another region are dropped.
    pub async fn list_packages(
        &self,
        service: Option<&str>,
        region: Option<&str>,
    ) -> Result<Vec<Package>, FetchError> {
        let query = PackageQuery::new(service, region);
        let packages = self.backend.list_packages(&query).await?;
        Ok(match &query.region {
            Some(region) => {
                packages.into_iter().filter(|package| package.matches_region(region)).collect()
            }
            None => packages,
        })
    }

    /// Loads packages for the submitted lead's service and region into the session.
    pub async fn load_packages(&self) -> Result<Vec<Package>, FetchError> {
        let (service, region) = {
            let session = self.session();
            let lead = session.lead.as_ref();
            (lead.and_then(|lead| lead.service.clone()), lead.map(|lead| lead.region.clone()))
        };

        let result = self.list_packages(service.as_deref(), region.as_deref()).await;

        let mut session = self.session();
        match result {
            Ok(packages) => {
                debug!(
                    event_name = "funnel.catalog.loaded",
                    correlation_id = %self.audit.correlation_id,
                    count = packages.len(),
                    "packages loaded"
                );
                session.packages = packages.clone();
                session.last_error = None;
                Ok(packages)
            }
            Err(failure) => {
                warn!(
                    event_name = "funnel.catalog.failed",
                    correlation_id = %self.audit.correlation_id,
                    error = %failure,
                    "package listing failed"
                );
                session.last_error = Some(failure.to_string());
                Err(failure)
            }
        }
    }

    /// Selecting a package immediately creates its payment order.
    pub async fn select_package(
        &self,
        package: Package,
    ) -> Result<CheckoutRequest, OrderCreationError> {
        let attempt = {
            let mut session = self.session();
            let transition = self
                .apply(&mut session, FunnelEvent::PackageSelected { package_id: package.id.clone() })?;
            session.selected = Some(package);
            session.order = None;
            requested_attempt(&transition, &session)
        };
        self.create_order(attempt).await
    }

    /// Opts out of online payment. Recorded for manual follow-up.
    pub fn skip(&self) -> Result<(), FunnelTransitionError> {
        let mut session = self.session();
        self.apply(&mut session, FunnelEvent::SkipRequested)?;
        let lead_id = session.machine.context().lead_id.clone();
        self.sink.emit(
            AuditEvent::new(
                &self.audit,
                "funnel.lead.opted_out",
                AuditCategory::Intake,
                AuditOutcome::Success,
            )
            .with_lead(lead_id.as_ref())
            .with_metadata("follow_up", "manual"),
        );
        info!(
            event_name = "funnel.lead.opted_out",
            correlation_id = %self.audit.correlation_id,
            lead_id = lead_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            "lead skipped online payment"
        );
        Ok(())
    }

    /// Creates a fresh order for the same package after a failure or abandonment.
    pub async fn retry_order(&self) -> Result<CheckoutRequest, OrderCreationError> {
        let attempt = {
            let mut session = self.session();
            let transition = self.apply(&mut session, FunnelEvent::RetryRequested)?;
            session.order = None;
            requested_attempt(&transition, &session)
        };
        self.create_order(attempt).await
    }

    pub async fn go_back(&self) -> Result<FunnelState, FunnelTransitionError> {
        let (state, report) = {
            let mut session = self.session();
            let transition = self.apply(&mut session, FunnelEvent::BackRequested)?;
            let state = session.machine.state();
            session.order = None;
            session.selected = None;
            if state == FunnelState::LeadIntake {
                session.packages.clear();
            }
            (state, abandonment_report(&transition, &session))
        };

        if let Some(report) = report {
            self.send_abandonment(&report).await;
        }
        Ok(state)
    }

    pub async fn handle_checkout_signal(
        &self,
        order_id: &OrderId,
        signal: CheckoutSignal,
    ) -> Result<PaymentResolution, FunnelError> {
        match signal {
            CheckoutSignal::Completed { payment_id, signature } => {
                Ok(self.payment_completed(order_id, &payment_id, &signature).await?)
            }
            CheckoutSignal::Failed { reason, payment_id } => {
                Ok(self.payment_failed(order_id, &reason, payment_id.as_deref()).await?)
            }
            CheckoutSignal::Dismissed => Ok(self.checkout_dismissed(order_id).await?),
        }
    }

    /// Widget completion. Only a backend-confirmed verification reaches success.
    pub async fn payment_completed(
        &self,
        order_id: &OrderId,
        payment_id: &str,
        signature: &str,
    ) -> Result<PaymentResolution, VerificationError> {
        let lead_id = {
            let mut session = self.session();
            let transition = self
                .apply(&mut session, FunnelEvent::PaymentCompleted { order_id: order_id.clone() })?;
            if let Transition::Ignored { reason, .. } = transition {
                warn!(
                    event_name = "funnel.payment.completion_ignored",
                    correlation_id = %self.audit.correlation_id,
                    order_id = %order_id,
                    payment_id = %payment_id,
                    reason = ?reason,
                    "payment completion arrived for an order that is no longer open"
                );
                return Ok(PaymentResolution::Ignored(reason));
            }
            current_lead(&session)?
        };

        let verification =
            PaymentVerification::completed(order_id.clone(), lead_id, payment_id, signature);
        let verified = self.backend.verify_payment(&verification).await;

        let mut session = self.session();
        match verified {
            Ok(()) => {
                self.apply(
                    &mut session,
                    FunnelEvent::VerificationConfirmed { order_id: order_id.clone() },
                )?;
                session.last_error = None;
                info!(
                    event_name = "funnel.payment.verified",
                    correlation_id = %self.audit.correlation_id,
                    order_id = %order_id,
                    payment_id = %payment_id,
                    "payment verified"
                );
                Ok(PaymentResolution::Verified)
            }
            Err(failure) => {
                self.apply(
                    &mut session,
                    FunnelEvent::VerificationFailed { order_id: order_id.clone() },
                )?;
                session.last_error = Some(failure.to_string());
                error!(
                    event_name = "funnel.payment.verification_failed",
                    correlation_id = %self.audit.correlation_id,
                    order_id = %order_id,
                    payment_id = %payment_id,
                    error = %failure,
                    "payment completed in the widget but was not verified"
                );
                Err(failure)
            }
        }
    }

    /// Widget failure. The attempt is still forwarded to the verify endpoint so it is
    /// auditable; the backend's answer is only logged.
    pub async fn payment_failed(
        &self,
        order_id: &OrderId,
        reason: &str,
        payment_id: Option<&str>,
    ) -> Result<PaymentResolution, FunnelTransitionError> {
        let lead_id = {
            let mut session = self.session();
            let transition = self
                .apply(&mut session, FunnelEvent::PaymentRejected { order_id: order_id.clone() })?;
            if let Transition::Ignored { reason, .. } = transition {
                debug!(
                    event_name = "funnel.payment.failure_ignored",
                    correlation_id = %self.audit.correlation_id,
                    order_id = %order_id,
                    reason = ?reason,
                    "payment failure ignored"
                );
                return Ok(PaymentResolution::Ignored(reason));
            }
            session.last_error = Some(format!("payment failed: {reason}"));
            current_lead(&session)?
        };

        let record = PaymentVerification::failure_record(
            order_id.clone(),
            lead_id,
            payment_id.map(str::to_string),
        );
        match self.backend.verify_payment(&record).await {
            Ok(()) => info!(
                event_name = "funnel.payment.failure_reported",
                correlation_id = %self.audit.correlation_id,
                order_id = %order_id,
                reason = %reason,
                "failed payment recorded"
            ),
            Err(answer) => info!(
                event_name = "funnel.payment.failure_reported",
                correlation_id = %self.audit.correlation_id,
                order_id = %order_id,
                reason = %reason,
                backend_answer = %answer,
                "failed payment forwarded"
            ),
        }

        Ok(PaymentResolution::Failed { reason: reason.to_string() })
    }

    /// Widget closed. Fires for every close, so it only counts while the order is open.
    pub async fn checkout_dismissed(
        &self,
        order_id: &OrderId,
    ) -> Result<PaymentResolution, FunnelTransitionError> {
        let report = {
            let mut session = self.session();
            let transition = self
                .apply(&mut session, FunnelEvent::CheckoutDismissed { order_id: order_id.clone() })?;
            if let Transition::Ignored { reason, .. } = transition {
                debug!(
                    event_name = "funnel.payment.dismissal_suppressed",
                    correlation_id = %self.audit.correlation_id,
                    order_id = %order_id,
                    reason = ?reason,
                    "checkout dismissal suppressed"
                );
                return Ok(PaymentResolution::Ignored(reason));
            }
            abandonment_report(&transition, &session)
        };

        if let Some(report) = report {
            self.send_abandonment(&report).await;
        }
        Ok(PaymentResolution::Abandoned)
    }

    async fn create_order(&self, attempt: u32) -> Result<CheckoutRequest, OrderCreationError> {
        let (lead_id, lead, package) = {
            let session = self.session();
            let lead_id = current_lead(&session)?;
            let lead = session.lead.clone().ok_or(FunnelTransitionError::MissingLead)?;
            let package = session.selected.clone().ok_or(FunnelTransitionError::MissingPackage)?;
            (lead_id, lead, package)
        };

        let created = self.backend.create_order(&lead_id, &package.id).await;

        let stale = {
            let mut session = self.session();
            match created {
                Ok(created) => {
                    let order_id = created.order_id.clone();
                    let transition = self.apply(
                        &mut session,
                        FunnelEvent::OrderCreated { attempt, order_id: order_id.clone() },
                    )?;
                    if transition.is_applied() {
                        let order = PaymentOrder::bind(created, lead_id, package.id.clone());
                        let request =
                            CheckoutRequest::build(&self.checkout, &order, &package, &lead);
                        session.order = Some(order);
                        session.last_error = None;
                        info!(
                            event_name = "funnel.order.created",
                            correlation_id = %self.audit.correlation_id,
                            order_id = %order_id,
                            package_id = %package.id,
                            attempt,
                            "payment order created"
                        );
                        return Ok(request);
                    }

                    warn!(
                        event_name = "funnel.order.superseded",
                        correlation_id = %self.audit.correlation_id,
                        order_id = %order_id,
                        attempt,
                        "order created for an attempt that is no longer current"
                    );
                    DismissalReport { lead_id, order_id }
                }
                Err(failure) => {
                    let transition =
                        self.apply(&mut session, FunnelEvent::OrderCreationFailed { attempt })?;
                    if !transition.is_applied() {
                        return Err(OrderCreationError::Superseded { attempt });
                    }
                    session.last_error = Some(failure.to_string());
                    warn!(
                        event_name = "funnel.order.failed",
                        correlation_id = %self.audit.correlation_id,
                        package_id = %package.id,
                        attempt,
                        error = %failure,
                        "payment order creation failed"
                    );
                    return Err(failure);
                }
            }
        };

        // The backend holds an order nobody will pay for; close it out as abandoned.
        self.send_abandonment(&stale).await;
        Err(OrderCreationError::Superseded { attempt })
    }

    async fn send_abandonment(&self, report: &DismissalReport) {
        match self.backend.report_dismissal(report).await {
            Ok(()) => info!(
                event_name = "funnel.payment.abandoned",
                correlation_id = %self.audit.correlation_id,
                lead_id = %report.lead_id,
                order_id = %report.order_id,
                "checkout abandonment reported"
            ),
            Err(failure) => warn!(
                event_name = "funnel.payment.abandonment_unreported",
                correlation_id = %self.audit.correlation_id,
                lead_id = %report.lead_id,
                order_id = %report.order_id,
                error = %failure,
                "checkout abandonment could not be reported"
            ),
        }
    }

    fn apply(
        &self,
        session: &mut Session,
        event: FunnelEvent,
    ) -> Result<Transition, FunnelTransitionError> {
        session.machine.apply_with_audit(event, &self.sink, &self.audit)
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        lock_session(&self.session)
    }
}

fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    match session.lock() {
        Ok(session) => session,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn current_lead(session: &Session) -> Result<LeadId, FunnelTransitionError> {
    session.machine.context().lead_id.clone().ok_or(FunnelTransitionError::MissingLead)
}

fn requested_attempt(transition: &Transition, session: &Session) -> u32 {
    transition
        .actions()
        .iter()
        .find_map(|action| match action {
            FunnelAction::CreateOrder { attempt } => Some(*attempt),
            _ => None,
        })
        .unwrap_or(session.machine.context().order_attempt)
}

fn abandonment_report(transition: &Transition, session: &Session) -> Option<DismissalReport> {
    let lead_id = session.machine.context().lead_id.clone()?;
    transition.actions().iter().find_map(|action| match action {
        FunnelAction::ReportAbandonment { order_id } => {
            Some(DismissalReport { lead_id: lead_id.clone(), order_id: order_id.clone() })
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::LeadFunnel;
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::backend::contract::{CREATE_ORDER_PATH, LEAD_PATH, PACKAGES_PATH, VERIFY_PATH};
    use crate::backend::{BackendCall, FunnelBackend, InMemoryBackend, ScriptedResponse};
    use crate::domain::lead::{LeadFields, LeadId, LeadSubmission};
    use crate::domain::order::{
        CreatedOrder, DismissalReport, OrderId, PaymentDisposition, PaymentVerification,
    };
    use crate::domain::package::{Package, PackageId, PackageQuery};
    use crate::errors::{
        FetchError, OrderCreationError, ReportError, SubmitError, TransportError,
        VerificationError,
    };
    use crate::funnel::checkout::{CheckoutSignal, PaymentResolution};
    use crate::funnel::states::{FunnelState, IgnoreReason, Stage};

    type Funnel<B> = LeadFunnel<B, InMemoryAuditSink>;

    fn funnel<B: FunnelBackend>(backend: B) -> Funnel<B> {
        LeadFunnel::new(backend, InMemoryAuditSink::default(), AuditContext::new("req-1", "test"))
    }

    fn fields() -> LeadFields {
        LeadFields {
            region: "India".to_string(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone: "9876543210".to_string(),
            service: Some("SEO".to_string()),
            consent: true,
            ..LeadFields::default()
        }
    }

    fn order_script(order_id: &str) -> ScriptedResponse {
        ScriptedResponse::new(
            200,
            json!({
                "success": true,
                "orderId": order_id,
                "amount": 2_999_900,
                "currency": "INR",
                "keyId": "rzp_test_key"
            }),
        )
    }

    async fn at_selection<B: FunnelBackend>(funnel: &Funnel<B>) -> Package {
        funnel.submit_lead(&fields()).await.expect("lead accepted");
        let packages = funnel.load_packages().await.expect("packages");
        packages.into_iter().next().expect("at least one package")
    }

    /// Delegates to the in-memory backend after yielding, so joined futures interleave.
    struct YieldingBackend {
        inner: InMemoryBackend,
    }

    /// Holds order creation until released.
    struct GatedBackend {
        inner: InMemoryBackend,
        gate: Notify,
    }

    #[async_trait]
    impl FunnelBackend for YieldingBackend {
        async fn submit_lead(&self, lead: &LeadSubmission) -> Result<LeadId, SubmitError> {
            tokio::task::yield_now().await;
            self.inner.submit_lead(lead).await
        }

        async fn list_services(&self) -> Result<Vec<String>, FetchError> {
            self.inner.list_services().await
        }

        async fn list_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, FetchError> {
            self.inner.list_packages(query).await
        }

        async fn create_order(
            &self,
            lead_id: &LeadId,
            package_id: &PackageId,
        ) -> Result<CreatedOrder, OrderCreationError> {
            tokio::task::yield_now().await;
            self.inner.create_order(lead_id, package_id).await
        }

        async fn verify_payment(
            &self,
            verification: &PaymentVerification,
        ) -> Result<(), VerificationError> {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            self.inner.verify_payment(verification).await
        }

        async fn report_dismissal(&self, report: &DismissalReport) -> Result<(), ReportError> {
            tokio::task::yield_now().await;
            self.inner.report_dismissal(report).await
        }
    }

    #[async_trait]
    impl FunnelBackend for GatedBackend {
        async fn submit_lead(&self, lead: &LeadSubmission) -> Result<LeadId, SubmitError> {
            self.inner.submit_lead(lead).await
        }

        async fn list_services(&self) -> Result<Vec<String>, FetchError> {
            self.inner.list_services().await
        }

        async fn list_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, FetchError> {
            self.inner.list_packages(query).await
        }

        async fn create_order(
            &self,
            lead_id: &LeadId,
            package_id: &PackageId,
        ) -> Result<CreatedOrder, OrderCreationError> {
            self.gate.notified().await;
            self.inner.create_order(lead_id, package_id).await
        }

        async fn verify_payment(
            &self,
            verification: &PaymentVerification,
        ) -> Result<(), VerificationError> {
            self.inner.verify_payment(verification).await
        }

        async fn report_dismissal(&self, report: &DismissalReport) -> Result<(), ReportError> {
            self.inner.report_dismissal(report).await
        }
    }

    #[tokio::test]
    async fn accepted_lead_moves_to_package_selection() {
        let backend = InMemoryBackend::default();
        backend.script(LEAD_PATH, ScriptedResponse::new(200, json!({"success": true, "leadId": "L1"})));
        let funnel = funnel(backend);

        let lead_id = funnel.submit_lead(&fields()).await.expect("lead accepted");

        let snapshot = funnel.snapshot();
        assert_eq!(lead_id, LeadId("L1".to_string()));
        assert_eq!(snapshot.state, FunnelState::PackageSelection);
        assert_eq!(snapshot.stage, Stage::PackageSelection);
        assert_eq!(snapshot.lead_id, Some(LeadId("L1".to_string())));
        assert_eq!(snapshot.lead.map(|lead| lead.phone), Some("+91 9876543210".to_string()));
    }

    #[tokio::test]
    async fn acknowledgement_without_lead_id_keeps_intake() {
        let backend = InMemoryBackend::default();
        backend.script(LEAD_PATH, ScriptedResponse::new(200, json!({"success": true})));
        let funnel = funnel(backend);

        let error = funnel.submit_lead(&fields()).await.expect_err("no lead id");

        assert_eq!(error, SubmitError::MissingLeadId);
        let snapshot = funnel.snapshot();
        assert_eq!(snapshot.state, FunnelState::LeadIntake);
        assert_eq!(snapshot.lead_id, None);
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test]
    async fn every_failed_submission_stays_in_intake() {
        let scripts = [
            ScriptedResponse::new(500, json!({"success": true, "leadId": "L1"})),
            ScriptedResponse::new(200, json!({"success": false, "leadId": "L1"})),
            ScriptedResponse::new(200, json!({"success": true, "leadId": ""})),
            ScriptedResponse::new(200, json!("not an object")),
        ];

        for script in scripts {
            let backend = InMemoryBackend::default();
            backend.script(LEAD_PATH, script.clone());
            let funnel = funnel(backend);

            assert!(funnel.submit_lead(&fields()).await.is_err(), "{script:?}");
            assert_eq!(funnel.state(), FunnelState::LeadIntake, "{script:?}");
            assert_eq!(funnel.snapshot().lead_id, None);
        }
    }

    #[tokio::test]
    async fn invalid_fields_never_reach_the_backend() {
        let funnel = funnel(InMemoryBackend::default());
        let mut invalid = fields();
        invalid.consent = false;

        let error = funnel.submit_lead(&invalid).await.expect_err("consent required");

        assert!(matches!(error, SubmitError::Invalid(_)));
        assert!(funnel.backend().calls().is_empty());
        assert_eq!(funnel.state(), FunnelState::LeadIntake);
    }

    #[tokio::test]
    async fn resubmission_after_failure_succeeds() {
        let backend = InMemoryBackend::default();
        backend.script(
            LEAD_PATH,
            ScriptedResponse::new(503, json!({"message": "maintenance"})),
        );
        let funnel = funnel(backend);

        let first = funnel.submit_lead(&fields()).await.expect_err("unavailable");
        assert!(matches!(
            first,
            SubmitError::Transport(TransportError::Status { status: 503, .. })
        ));

        funnel.submit_lead(&fields()).await.expect("second attempt");
        assert_eq!(funnel.state(), FunnelState::PackageSelection);
    }

    #[tokio::test]
    async fn unknown_service_lists_no_packages() {
        let funnel = funnel(InMemoryBackend::default());
        let packages =
            funnel.list_packages(Some("NoSuchService"), Some("India")).await.expect("empty is ok");
        assert!(packages.is_empty());
    }

    #[tokio::test]
    async fn catalog_failure_keeps_the_lead() {
        let backend = InMemoryBackend::default();
        backend.script(PACKAGES_PATH, ScriptedResponse::new(502, json!({})));
        let funnel = funnel(backend);
        funnel.submit_lead(&fields()).await.expect("lead");

        assert!(funnel.load_packages().await.is_err());
        assert_eq!(funnel.state(), FunnelState::PackageSelection);
        assert!(funnel.snapshot().lead_id.is_some());

        let packages = funnel.load_packages().await.expect("retry succeeds");
        assert!(packages.iter().all(|package| package.service_name == "SEO"));
        assert!(packages.iter().all(|package| package.currency == "INR"));
    }

    #[tokio::test]
    async fn verified_payment_succeeds_and_late_dismissal_is_silent() {
        let funnel = funnel(InMemoryBackend::default());
        let package = at_selection(&funnel).await;

        let checkout = funnel.select_package(package).await.expect("order created");
        assert_eq!(funnel.state(), FunnelState::AwaitingPayment);
        assert_eq!(checkout.prefill.email, "asha@example.com");

        let resolution = funnel
            .handle_checkout_signal(
                &checkout.order_id,
                CheckoutSignal::Completed {
                    payment_id: "pay_1".to_string(),
                    signature: "sig_1".to_string(),
                },
            )
            .await
            .expect("verified");
        assert_eq!(resolution, PaymentResolution::Verified);
        assert_eq!(funnel.state(), FunnelState::PaymentSucceeded);

        let calls_before = funnel.backend().calls().len();
        let late = funnel
            .handle_checkout_signal(&checkout.order_id, CheckoutSignal::Dismissed)
            .await
            .expect("dismissal accepted");

        assert_eq!(late, PaymentResolution::Ignored(IgnoreReason::AlreadyResolved));
        assert_eq!(funnel.backend().calls().len(), calls_before);
        assert_eq!(
            funnel.backend().dispositions(&checkout.order_id),
            vec![PaymentDisposition::Verified]
        );
    }

    #[tokio::test]
    async fn retry_after_failure_ignores_late_dismissal_of_old_order() {
        let backend = InMemoryBackend::default();
        backend.script(CREATE_ORDER_PATH, order_script("O1"));
        backend.script(CREATE_ORDER_PATH, order_script("O2"));
        let funnel = funnel(backend);
        let package = at_selection(&funnel).await;

        let first = funnel.select_package(package).await.expect("O1");
        let o1 = OrderId("O1".to_string());
        assert_eq!(first.order_id, o1);

        let failed = funnel
            .payment_failed(&o1, "insufficient_funds", Some("pay_1"))
            .await
            .expect("failure handled");
        assert_eq!(failed, PaymentResolution::Failed { reason: "insufficient_funds".to_string() });
        assert_eq!(funnel.state(), FunnelState::PaymentFailed);
        assert!(funnel.backend().calls().iter().any(|call| matches!(
            call,
            BackendCall::VerifyPayment(record) if record.order_id == o1 && record.signature.is_empty()
        )));

        let second = funnel.retry_order().await.expect("O2");
        let o2 = OrderId("O2".to_string());
        assert_eq!(second.order_id, o2);

        let late = funnel.checkout_dismissed(&o1).await.expect("late dismissal");
        assert_eq!(late, PaymentResolution::Ignored(IgnoreReason::StaleOrder));
        assert_eq!(funnel.state(), FunnelState::AwaitingPayment);
        assert_eq!(funnel.snapshot().order.map(|order| order.id), Some(o2.clone()));
        assert!(funnel.backend().dispositions(&o2).is_empty());
        assert_eq!(funnel.backend().dispositions(&o1), vec![PaymentDisposition::Failed]);
    }

    #[tokio::test]
    async fn exactly_one_disposition_for_every_signal_order() {
        let signals = || {
            vec![
                CheckoutSignal::Completed {
                    payment_id: "pay_1".to_string(),
                    signature: "sig_1".to_string(),
                },
                CheckoutSignal::Failed {
                    reason: "card_declined".to_string(),
                    payment_id: Some("pay_1".to_string()),
                },
                CheckoutSignal::Dismissed,
            ]
        };
        let orders: [[usize; 3]; 6] =
            [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for order in orders {
            let funnel = funnel(InMemoryBackend::default());
            let package = at_selection(&funnel).await;
            let checkout = funnel.select_package(package).await.expect("order");
            let all = signals();

            for index in order {
                let _ = funnel.handle_checkout_signal(&checkout.order_id, all[index].clone()).await;
            }

            let reported = funnel.backend().dispositions(&checkout.order_id);
            assert_eq!(reported.len(), 1, "order {order:?} reported {reported:?}");
            assert!(funnel.state() != FunnelState::AwaitingPayment);
        }
    }

    #[tokio::test]
    async fn concurrent_signals_resolve_the_order_once() {
        for first_dismissed in [true, false] {
            let funnel = funnel(YieldingBackend { inner: InMemoryBackend::default() });
            let package = at_selection(&funnel).await;
            let checkout = funnel.select_package(package).await.expect("order");
            let order_id = checkout.order_id.clone();

            let completed = funnel.handle_checkout_signal(
                &order_id,
                CheckoutSignal::Completed {
                    payment_id: "pay_1".to_string(),
                    signature: "sig_1".to_string(),
                },
            );
            let dismissed = funnel.handle_checkout_signal(&order_id, CheckoutSignal::Dismissed);
            let failed = funnel.handle_checkout_signal(
                &order_id,
                CheckoutSignal::Failed { reason: "timeout".to_string(), payment_id: None },
            );

            let resolutions = if first_dismissed {
                let (dismissed, completed, failed) = tokio::join!(dismissed, completed, failed);
                vec![dismissed, completed, failed]
            } else {
                let (completed, dismissed, failed) = tokio::join!(completed, dismissed, failed);
                vec![completed, dismissed, failed]
            };

            let effective = resolutions
                .iter()
                .filter(|resolution| !matches!(resolution, Ok(PaymentResolution::Ignored(_))))
                .count();
            assert_eq!(effective, 1, "{resolutions:?}");
            assert_eq!(funnel.backend().inner.dispositions(&order_id).len(), 1);
        }
    }

    #[tokio::test]
    async fn rejected_verification_is_surfaced_without_retry() {
        let backend = InMemoryBackend::default();
        backend.script(
            VERIFY_PATH,
            ScriptedResponse::new(200, json!({"success": false, "message": "signature mismatch"})),
        );
        let funnel = funnel(backend);
        let package = at_selection(&funnel).await;
        let checkout = funnel.select_package(package).await.expect("order");

        let error = funnel
            .payment_completed(&checkout.order_id, "pay_1", "forged")
            .await
            .expect_err("rejected");

        assert_eq!(error, VerificationError::Rejected("signature mismatch".to_string()));
        assert_eq!(funnel.state(), FunnelState::VerificationRejected);
        assert!(funnel.retry_order().await.is_err());

        let dismissed = funnel.checkout_dismissed(&checkout.order_id).await.expect("close");
        assert_eq!(dismissed, PaymentResolution::Ignored(IgnoreReason::AlreadyResolved));
        assert_eq!(funnel.go_back().await, Ok(FunnelState::PackageSelection));
    }

    #[tokio::test]
    async fn order_creation_failure_allows_retry_without_new_lead() {
        let backend = InMemoryBackend::default();
        backend.script(
            CREATE_ORDER_PATH,
            ScriptedResponse::new(200, json!({"success": true, "amount": 100})),
        );
        let funnel = funnel(backend);
        let package = at_selection(&funnel).await;

        let error = funnel.select_package(package).await.expect_err("no order id");
        assert_eq!(error, OrderCreationError::MissingOrderId);
        assert_eq!(funnel.state(), FunnelState::PaymentFailed);

        funnel.retry_order().await.expect("retry creates an order");
        assert_eq!(funnel.state(), FunnelState::AwaitingPayment);

        let lead_submissions = funnel
            .backend()
            .calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::SubmitLead(_)))
            .count();
        assert_eq!(lead_submissions, 1);
    }

    #[tokio::test]
    async fn abandoned_checkout_is_reported_once() {
        let funnel = funnel(InMemoryBackend::default());
        let package = at_selection(&funnel).await;
        let checkout = funnel.select_package(package).await.expect("order");

        let first = funnel.checkout_dismissed(&checkout.order_id).await.expect("dismissed");
        let second = funnel.checkout_dismissed(&checkout.order_id).await.expect("again");

        assert_eq!(first, PaymentResolution::Abandoned);
        assert_eq!(second, PaymentResolution::Ignored(IgnoreReason::AlreadyResolved));
        assert_eq!(funnel.state(), FunnelState::PaymentAbandoned);
        assert_eq!(
            funnel.backend().dispositions(&checkout.order_id),
            vec![PaymentDisposition::Abandoned]
        );
    }

    #[tokio::test]
    async fn going_back_from_open_checkout_reports_abandonment() {
        let funnel = funnel(InMemoryBackend::default());
        let package = at_selection(&funnel).await;
        let checkout = funnel.select_package(package).await.expect("order");

        assert_eq!(funnel.go_back().await, Ok(FunnelState::PackageSelection));
        assert_eq!(
            funnel.backend().dispositions(&checkout.order_id),
            vec![PaymentDisposition::Abandoned]
        );

        let late = funnel.checkout_dismissed(&checkout.order_id).await.expect("late");
        assert_eq!(late, PaymentResolution::Ignored(IgnoreReason::StaleOrder));
        assert_eq!(funnel.backend().dispositions(&checkout.order_id).len(), 1);

        assert_eq!(funnel.go_back().await, Ok(FunnelState::LeadIntake));
        assert!(funnel.snapshot().packages.is_empty());
    }

    #[tokio::test]
    async fn late_order_response_after_navigation_is_discarded() {
        let funnel = funnel(GatedBackend { inner: InMemoryBackend::default(), gate: Notify::new() });
        let package = at_selection(&funnel).await;

        let selecting = funnel.select_package(package);
        let navigate = async {
            let state = funnel.go_back().await;
            funnel.backend().gate.notify_one();
            state
        };
        let (selected, navigated) = tokio::join!(selecting, navigate);

        assert_eq!(navigated, Ok(FunnelState::PackageSelection));
        assert_eq!(selected, Err(OrderCreationError::Superseded { attempt: 1 }));
        assert_eq!(funnel.state(), FunnelState::PackageSelection);
        assert_eq!(funnel.snapshot().order, None);

        let orphaned = OrderId("order_0001".to_string());
        assert_eq!(
            funnel.backend().inner.dispositions(&orphaned),
            vec![PaymentDisposition::Abandoned]
        );
    }

    #[tokio::test]
    async fn double_submit_registers_the_lead_once() {
        let funnel = funnel(YieldingBackend { inner: InMemoryBackend::default() });
        let lead = fields();

        let (first, second) = tokio::join!(funnel.submit_lead(&lead), funnel.submit_lead(&lead));

        assert_eq!(first, Ok(LeadId("lead_0001".to_string())));
        assert_eq!(second, Err(SubmitError::InFlight));
        assert_eq!(funnel.state(), FunnelState::PackageSelection);
        let registrations = funnel
            .backend()
            .inner
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::SubmitLead(_)))
            .count();
        assert_eq!(registrations, 1);
    }

    #[tokio::test]
    async fn failed_submit_releases_the_in_flight_marker() {
        let backend = InMemoryBackend::default();
        backend.script(LEAD_PATH, ScriptedResponse::new(502, json!({})));
        let funnel = funnel(YieldingBackend { inner: backend });

        assert!(funnel.submit_lead(&fields()).await.is_err());
        assert_eq!(funnel.submit_lead(&fields()).await, Ok(LeadId("lead_0001".to_string())));
    }

    #[tokio::test]
    async fn skipping_payment_is_terminal_and_audited() {
        let funnel = funnel(Arc::new(InMemoryBackend::default()));
        at_selection(&funnel).await;

        funnel.skip().expect("skip");

        assert_eq!(funnel.state(), FunnelState::OptedOut);
        assert_eq!(funnel.snapshot().stage, Stage::Complete);
        let opted_out = funnel.audit_sink().events_of_type("funnel.lead.opted_out");
        assert_eq!(opted_out.len(), 1);
        assert_eq!(opted_out[0].metadata.get("follow_up").map(String::as_str), Some("manual"));
        assert!(funnel.skip().is_err());
    }
}
