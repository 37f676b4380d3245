pub mod checkout;
pub mod machine;
pub mod states;
pub mod workflow;

pub use checkout::{CheckoutRequest, CheckoutSettings, CheckoutSignal, PaymentResolution};
pub use machine::{transition, FunnelMachine, FunnelTransitionError, Step};
pub use states::{
    FunnelAction, FunnelContext, FunnelEvent, FunnelState, IgnoreReason, Stage, Transition,
    TransitionOutcome,
};
pub use workflow::{FunnelSnapshot, LeadFunnel};
