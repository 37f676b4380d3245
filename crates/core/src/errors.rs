use thiserror::Error;

use crate::funnel::FunnelTransitionError;

/// First intake rule a lead violates. The display text is shown inline on the form.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select your region")]
    MissingRegion,
    #[error("Region `{0}` is not supported")]
    UnsupportedRegion(String),
    #[error("Please enter your name")]
    MissingName,
    #[error("Please enter your email address")]
    MissingEmail,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Please enter your phone number")]
    MissingPhone,
    #[error("Phone number must contain digits only")]
    PhoneNotNumeric,
    #[error("Phone number must be between 6 and 15 digits (got {digits})")]
    PhoneLength { digits: usize },
    #[error("Please accept the terms to continue")]
    ConsentRequired,
}

impl ValidationError {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Failure below the endpoint's own success rule: the request never produced a usable body.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("backend returned status {status}")]
    Status { status: u16, message: Option<String> },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("lead submission failed: {0}")]
    Transport(#[from] TransportError),
    #[error("backend rejected the lead: {0}")]
    Rejected(String),
    #[error("backend acknowledged the lead without an identifier")]
    MissingLeadId,
    #[error("lead submission is already in progress")]
    InFlight,
    #[error(transparent)]
    Transition(#[from] FunnelTransitionError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("backend rejected the catalog request: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrderCreationError {
    #[error("order creation failed: {0}")]
    Transport(#[from] TransportError),
    #[error("backend rejected the order: {0}")]
    Rejected(String),
    #[error("backend created an order without an identifier")]
    MissingOrderId,
    #[error("order attempt {attempt} was superseded before the backend answered")]
    Superseded { attempt: u32 },
    #[error(transparent)]
    Transition(#[from] FunnelTransitionError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("payment verification failed: {0}")]
    Transport(#[from] TransportError),
    #[error("backend rejected the payment: {0}")]
    Rejected(String),
    #[error(transparent)]
    Transition(#[from] FunnelTransitionError),
}

/// Failure to deliver a fire-and-forget audit report. Logged, never surfaced as a state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("report delivery failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FunnelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Submit(SubmitError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    OrderCreation(#[from] OrderCreationError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Transition(#[from] FunnelTransitionError),
}

impl From<SubmitError> for FunnelError {
    fn from(value: SubmitError) -> Self {
        match value {
            SubmitError::Invalid(error) => Self::Validation(error),
            other => Self::Submit(other),
        }
    }
}

impl FunnelError {
    /// Inline message for the stage the error belongs to.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(error) => error.reason(),
            Self::Submit(_) => {
                "We could not save your details. Please check them and try again.".to_string()
            }
            Self::Fetch(_) => {
                "We could not load packages right now. Please retry or go back.".to_string()
            }
            Self::OrderCreation(_) => {
                "We could not start the payment. Please try again.".to_string()
            }
            Self::Verification(_) => "Your payment could not be verified. If money was deducted, \
                                      please contact support with your order reference."
                .to_string(),
            Self::Transition(_) => "That step is not available right now.".to_string(),
        }
    }

    /// Whether the presentation layer may offer a plain retry button.
    pub fn offers_retry(&self) -> bool {
        !matches!(self, Self::Verification(_) | Self::Transition(_))
    }
}
