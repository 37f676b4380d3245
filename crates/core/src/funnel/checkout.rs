use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadSubmission;
use crate::domain::order::{OrderId, PaymentOrder};
use crate::domain::package::Package;
use crate::funnel::states::IgnoreReason;

/// Merchant branding applied to every checkout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSettings {
    pub merchant_name: String,
    pub theme_color: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self { merchant_name: "Leadflow".to_string(), theme_color: "#3399cc".to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPrefill {
    pub name: String,
    pub email: String,
    pub contact: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutTheme {
    pub color: String,
}

/// Options the presentation layer opens the payment widget with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub key: String,
    pub order_id: OrderId,
    pub amount: u64,
    pub currency: String,
    pub name: String,
    pub description: String,
    pub prefill: CheckoutPrefill,
    pub theme: CheckoutTheme,
}

impl CheckoutRequest {
    pub fn build(
        settings: &CheckoutSettings,
        order: &PaymentOrder,
        package: &Package,
        lead: &LeadSubmission,
    ) -> Self {
        Self {
            key: order.key_id.clone(),
            order_id: order.id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            name: settings.merchant_name.clone(),
            description: package.checkout_label(),
            prefill: CheckoutPrefill {
                name: lead.name.clone(),
                email: lead.email.clone(),
                contact: lead.phone.clone(),
            },
            theme: CheckoutTheme { color: settings.theme_color.clone() },
        }
    }
}

/// One of the three callbacks the widget may fire, in any order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutSignal {
    Completed { payment_id: String, signature: String },
    Failed { reason: String, payment_id: Option<String> },
    Dismissed,
}

/// What the workflow did with a widget signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentResolution {
    Verified,
    Failed { reason: String },
    Abandoned,
    Ignored(IgnoreReason),
}
