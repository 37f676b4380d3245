use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadId;
use crate::domain::order::OrderId;
use crate::domain::package::PackageId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunnelState {
    LeadIntake,
    PackageSelection,
    OrderCreating,
    AwaitingPayment,
    Verifying,
    PaymentSucceeded,
    PaymentFailed,
    VerificationRejected,
    PaymentAbandoned,
    OptedOut,
}

/// Coarse step shown to the visitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    LeadIntake,
    PackageSelection,
    Payment,
    Complete,
}

impl FunnelState {
    pub fn stage(self) -> Stage {
        match self {
            Self::LeadIntake => Stage::LeadIntake,
            Self::PackageSelection => Stage::PackageSelection,
            Self::OrderCreating
            | Self::AwaitingPayment
            | Self::Verifying
            | Self::PaymentFailed
            | Self::VerificationRejected
            | Self::PaymentAbandoned => Stage::Payment,
            Self::PaymentSucceeded | Self::OptedOut => Stage::Complete,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PaymentSucceeded | Self::OptedOut)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunnelEvent {
    LeadAccepted { lead_id: LeadId },
    PackageSelected { package_id: PackageId },
    SkipRequested,
    BackRequested,
    RetryRequested,
    OrderCreated { attempt: u32, order_id: OrderId },
    OrderCreationFailed { attempt: u32 },
    PaymentCompleted { order_id: OrderId },
    PaymentRejected { order_id: OrderId },
    CheckoutDismissed { order_id: OrderId },
    VerificationConfirmed { order_id: OrderId },
    VerificationFailed { order_id: OrderId },
}

impl FunnelEvent {
    /// Order the event refers to, for events raised by the checkout widget or by
    /// backend answers about a specific order.
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            Self::PaymentCompleted { order_id }
            | Self::PaymentRejected { order_id }
            | Self::CheckoutDismissed { order_id }
            | Self::VerificationConfirmed { order_id }
            | Self::VerificationFailed { order_id }
            | Self::OrderCreated { order_id, .. } => Some(order_id),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LeadAccepted { .. } => "lead_accepted",
            Self::PackageSelected { .. } => "package_selected",
            Self::SkipRequested => "skip_requested",
            Self::BackRequested => "back_requested",
            Self::RetryRequested => "retry_requested",
            Self::OrderCreated { .. } => "order_created",
            Self::OrderCreationFailed { .. } => "order_creation_failed",
            Self::PaymentCompleted { .. } => "payment_completed",
            Self::PaymentRejected { .. } => "payment_rejected",
            Self::CheckoutDismissed { .. } => "checkout_dismissed",
            Self::VerificationConfirmed { .. } => "verification_confirmed",
            Self::VerificationFailed { .. } => "verification_failed",
        }
    }
}

/// The data shared across stages. Only the transition function writes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FunnelContext {
    pub lead_id: Option<LeadId>,
    pub package_id: Option<PackageId>,
    /// Generation of the order slot. Bumped whenever a new order is requested or the
    /// slot is abandoned by backward navigation, so late answers can be recognised.
    pub order_attempt: u32,
    pub order_id: Option<OrderId>,
    /// Set once a disposition for `order_id` has been decided.
    pub resolved: bool,
}

impl FunnelContext {
    pub(crate) fn reset_order_slot(&mut self) {
        self.order_attempt = self.order_attempt.saturating_add(1);
        self.order_id = None;
        self.resolved = false;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunnelAction {
    FetchPackages,
    CreateOrder { attempt: u32 },
    OpenCheckout { order_id: OrderId },
    VerifyPayment { order_id: OrderId },
    ReportFailure { order_id: OrderId },
    ReportAbandonment { order_id: OrderId },
    RecordOptOut,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FunnelState,
    pub to: FunnelState,
    pub event: FunnelEvent,
    pub actions: Vec<FunnelAction>,
}

/// Why an event was accepted but had no effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    /// The order already has a disposition.
    AlreadyResolved,
    /// The event names an order that is no longer current.
    StaleOrder,
    /// A backend answer for an order attempt that has been superseded.
    StaleResponse,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Applied(TransitionOutcome),
    Ignored { state: FunnelState, event: FunnelEvent, reason: IgnoreReason },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn actions(&self) -> &[FunnelAction] {
        match self {
            Self::Applied(outcome) => &outcome.actions,
            Self::Ignored { .. } => &[],
        }
    }
}
