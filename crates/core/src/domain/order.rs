use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::lead::LeadId;
use crate::domain::package::PackageId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order as minted by `POST /payment/create-order`, before it is bound to the workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order_id: OrderId,
    /// Minor currency units, as the gateway expects them.
    pub amount: u64,
    pub currency: String,
    pub key_id: String,
    pub package_details: Option<Value>,
}

/// A payment intent bound to exactly one lead and one package.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub id: OrderId,
    pub lead_id: LeadId,
    pub package_id: PackageId,
    pub amount: u64,
    pub currency: String,
    pub key_id: String,
    pub package_details: Option<Value>,
}

impl PaymentOrder {
    pub fn bind(created: CreatedOrder, lead_id: LeadId, package_id: PackageId) -> Self {
        Self {
            id: created.order_id,
            lead_id,
            package_id,
            amount: created.amount,
            currency: created.currency,
            key_id: created.key_id,
            package_details: created.package_details,
        }
    }
}

/// Terminal outcome reported to the backend for one order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDisposition {
    Verified,
    Failed,
    Abandoned,
}

/// Body of `POST /payment/verify`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub order_id: OrderId,
    pub payment_id: String,
    pub signature: String,
    pub lead_id: LeadId,
}

impl PaymentVerification {
    pub fn completed(
        order_id: OrderId,
        lead_id: LeadId,
        payment_id: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self { order_id, payment_id: payment_id.into(), signature: signature.into(), lead_id }
    }

    /// Audit record for a gateway-rejected attempt. The signature is sent empty; the
    /// backend must treat an empty signature as "record failure", never as verified.
    pub fn failure_record(order_id: OrderId, lead_id: LeadId, payment_id: Option<String>) -> Self {
        Self { order_id, payment_id: payment_id.unwrap_or_default(), signature: String::new(), lead_id }
    }

    pub fn is_failure_record(&self) -> bool {
        self.signature.is_empty()
    }
}

/// Body of `POST /payment/modal-closed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissalReport {
    pub lead_id: LeadId,
    pub order_id: OrderId,
}
