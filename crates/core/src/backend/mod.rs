pub mod contract;
pub mod memory;

use async_trait::async_trait;

use crate::domain::lead::{LeadId, LeadSubmission};
use crate::domain::order::{CreatedOrder, DismissalReport, PaymentVerification};
use crate::domain::package::{Package, PackageId, PackageQuery};
use crate::errors::{FetchError, OrderCreationError, ReportError, SubmitError, VerificationError};

pub use memory::{BackendCall, InMemoryBackend, ScriptedResponse};

/// The lead, catalog and payment endpoints the funnel talks to.
///
/// Implementations apply the per-endpoint success rules in [`contract`], so callers can
/// rely on `Ok` meaning the backend really accepted the request.
#[async_trait]
pub trait FunnelBackend: Send + Sync {
    async fn submit_lead(&self, lead: &LeadSubmission) -> Result<LeadId, SubmitError>;

    async fn list_services(&self) -> Result<Vec<String>, FetchError>;

    async fn list_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, FetchError>;

    async fn create_order(
        &self,
        lead_id: &LeadId,
        package_id: &PackageId,
    ) -> Result<CreatedOrder, OrderCreationError>;

    async fn verify_payment(
        &self,
        verification: &PaymentVerification,
    ) -> Result<(), VerificationError>;

    async fn report_dismissal(&self, report: &DismissalReport) -> Result<(), ReportError>;
}

#[async_trait]
impl<T> FunnelBackend for std::sync::Arc<T>
where
    T: FunnelBackend + ?Sized,
{
    async fn submit_lead(&self, lead: &LeadSubmission) -> Result<LeadId, SubmitError> {
        (**self).submit_lead(lead).await
    }

    async fn list_services(&self) -> Result<Vec<String>, FetchError> {
        (**self).list_services().await
    }

    async fn list_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, FetchError> {
        (**self).list_packages(query).await
    }

    async fn create_order(
        &self,
        lead_id: &LeadId,
        package_id: &PackageId,
    ) -> Result<CreatedOrder, OrderCreationError> {
        (**self).create_order(lead_id, package_id).await
    }

    async fn verify_payment(
        &self,
        verification: &PaymentVerification,
    ) -> Result<(), VerificationError> {
        (**self).verify_payment(verification).await
    }

    async fn report_dismissal(&self, report: &DismissalReport) -> Result<(), ReportError> {
        (**self).report_dismissal(report).await
    }
}
