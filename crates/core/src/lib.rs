pub mod audit;
pub mod backend;
pub mod config;
pub mod domain;
pub mod errors;
pub mod funnel;
pub mod intake;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use backend::{FunnelBackend, InMemoryBackend};
pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::lead::{LeadFields, LeadId, LeadSubmission};
pub use domain::order::{OrderId, PaymentDisposition, PaymentOrder};
pub use domain::package::{Package, PackageId, PackageQuery};
pub use domain::region::{region_profile, supported_regions, RegionProfile};
pub use errors::{
    FetchError, FunnelError, OrderCreationError, SubmitError, TransportError, ValidationError,
    VerificationError,
};
pub use funnel::{
    CheckoutRequest, CheckoutSignal, FunnelSnapshot, FunnelState, LeadFunnel, PaymentResolution,
    Stage,
};
