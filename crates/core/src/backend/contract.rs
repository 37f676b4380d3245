//! Wire shapes of the funnel endpoints and the success rule for each of them.
//!
//! Every interpreter takes the HTTP status and the raw body, so the rules can be tested
//! without a network and shared by every transport.
//!
//! | endpoint                    | success iff                                   |
//! |-----------------------------|-----------------------------------------------|
//! | `POST /lead`                | 2xx, `success`, non-empty `leadId`            |
//! | `GET /packages/services`    | 2xx, `success`                                |
//! | `GET /packages`             | 2xx, `success` (no `packages` = empty list)   |
//! | `POST /payment/create-order`| 2xx, `success`, non-empty `orderId`           |
//! | `POST /payment/verify`      | 2xx, `success`                                |
//! | `POST /payment/modal-closed`| 2xx (body ignored)                            |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::lead::LeadId;
use crate::domain::order::{CreatedOrder, OrderId};
use crate::domain::package::Package;
use crate::errors::{
    FetchError, OrderCreationError, ReportError, SubmitError, TransportError, VerificationError,
};

pub const LEAD_PATH: &str = "/lead";
pub const SERVICES_PATH: &str = "/packages/services";
pub const PACKAGES_PATH: &str = "/packages";
pub const CREATE_ORDER_PATH: &str = "/payment/create-order";
pub const VERIFY_PATH: &str = "/payment/verify";
pub const MODAL_CLOSED_PATH: &str = "/payment/modal-closed";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "id")]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest<'a> {
    pub lead_id: &'a str,
    pub package_id: &'a str,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub package_details: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

pub fn interpret_lead(status: u16, body: &str) -> Result<LeadId, SubmitError> {
    let response: LeadResponse = decode(status, body)?;
    if !response.success {
        return Err(SubmitError::Rejected(rejection(response.message, "lead was not accepted")));
    }
    match response.lead_id.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => Ok(LeadId(id)),
        _ => Err(SubmitError::MissingLeadId),
    }
}

pub fn interpret_services(status: u16, body: &str) -> Result<Vec<String>, FetchError> {
    let response: ServicesResponse = decode(status, body)?;
    if !response.success {
        return Err(FetchError::Rejected(rejection(response.message, "services unavailable")));
    }
    Ok(response.services)
}

pub fn interpret_packages(status: u16, body: &str) -> Result<Vec<Package>, FetchError> {
    let response: PackagesResponse = decode(status, body)?;
    if !response.success {
        return Err(FetchError::Rejected(rejection(response.message, "packages unavailable")));
    }
    Ok(response.packages)
}

pub fn interpret_create_order(status: u16, body: &str) -> Result<CreatedOrder, OrderCreationError> {
    let response: CreateOrderResponse = decode(status, body)?;
    if !response.success {
        return Err(OrderCreationError::Rejected(rejection(
            response.message,
            "order could not be created",
        )));
    }

    let order_id = match response.order_id.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => OrderId(id),
        _ => return Err(OrderCreationError::MissingOrderId),
    };
    let missing = |field: &str| {
        OrderCreationError::Transport(TransportError::Malformed(format!(
            "create-order response is missing `{field}`"
        )))
    };

    Ok(CreatedOrder {
        order_id,
        amount: response.amount.ok_or_else(|| missing("amount"))?,
        currency: response.currency.filter(|c| !c.trim().is_empty()).ok_or_else(|| missing("currency"))?,
        key_id: response.key_id.filter(|k| !k.trim().is_empty()).ok_or_else(|| missing("keyId"))?,
        package_details: response.package_details,
    })
}

pub fn interpret_verify(status: u16, body: &str) -> Result<(), VerificationError> {
    let response: VerifyResponse = decode(status, body)?;
    if !response.success {
        return Err(VerificationError::Rejected(rejection(
            response.message,
            "payment verification failed",
        )));
    }
    Ok(())
}

pub fn interpret_report(status: u16, body: &str) -> Result<(), ReportError> {
    if is_success(status) {
        return Ok(());
    }
    Err(ReportError::Transport(TransportError::Status { status, message: body_message(body) }))
}

fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, TransportError> {
    if !is_success(status) {
        return Err(TransportError::Status { status, message: body_message(body) });
    }
    serde_json::from_str(body).map_err(|error| TransportError::Malformed(error.to_string()))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Best-effort `message` from an error body; non-JSON bodies yield nothing.
fn body_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .filter(|message| !message.trim().is_empty())
}

fn rejection(message: Option<String>, fallback: &str) -> String {
    message.filter(|message| !message.trim().is_empty()).unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        interpret_create_order, interpret_lead, interpret_packages, interpret_report,
        interpret_services, interpret_verify,
    };
    use crate::errors::{
        FetchError, OrderCreationError, SubmitError, TransportError, VerificationError,
    };

    #[test]
    fn lead_requires_status_flag_and_identifier() {
        let ok = json!({"success": true, "leadId": "L1"}).to_string();
        assert_eq!(interpret_lead(201, &ok).expect("accepted").0, "L1");

        let no_id = json!({"success": true}).to_string();
        assert_eq!(interpret_lead(200, &no_id), Err(SubmitError::MissingLeadId));

        let blank_id = json!({"success": true, "leadId": "  "}).to_string();
        assert_eq!(interpret_lead(200, &blank_id), Err(SubmitError::MissingLeadId));

        let refused = json!({"success": false, "leadId": "L1", "message": "duplicate"}).to_string();
        assert_eq!(interpret_lead(200, &refused), Err(SubmitError::Rejected("duplicate".into())));

        let server_error = json!({"success": true, "leadId": "L1", "message": "boom"}).to_string();
        assert_eq!(
            interpret_lead(500, &server_error),
            Err(SubmitError::Transport(TransportError::Status {
                status: 500,
                message: Some("boom".into())
            }))
        );
    }

    #[test]
    fn malformed_bodies_are_normalised() {
        assert!(matches!(
            interpret_lead(200, "<html>"),
            Err(SubmitError::Transport(TransportError::Malformed(_)))
        ));
        assert!(matches!(
            interpret_packages(200, "{\"success\": true, \"packages\": [{\"id\": 1}]}"),
            Err(FetchError::Transport(TransportError::Malformed(_)))
        ));
    }

    #[test]
    fn empty_catalog_is_success() {
        let body = json!({"success": true, "packages": []}).to_string();
        assert_eq!(interpret_packages(200, &body), Ok(Vec::new()));

        let missing = json!({"success": true}).to_string();
        assert_eq!(interpret_packages(200, &missing), Ok(Vec::new()));

        let refused = json!({"success": false}).to_string();
        assert_eq!(
            interpret_packages(200, &refused),
            Err(FetchError::Rejected("packages unavailable".into()))
        );
    }

    #[test]
    fn services_list_is_returned() {
        let body = json!({"success": true, "services": ["SEO", "Web Development"]}).to_string();
        assert_eq!(interpret_services(200, &body).expect("services").len(), 2);
        assert!(interpret_services(404, "").is_err());
    }

    #[test]
    fn create_order_requires_identifier_and_payment_fields() {
        let ok = json!({
            "success": true,
            "orderId": "order_O1",
            "amount": 4999900,
            "currency": "INR",
            "keyId": "rzp_test_key",
            "packageDetails": {"name": "SEO Growth"}
        })
        .to_string();
        let created = interpret_create_order(200, &ok).expect("created");
        assert_eq!(created.order_id.0, "order_O1");
        assert_eq!(created.amount, 4_999_900);

        let no_id = json!({"success": true, "amount": 1, "currency": "INR", "keyId": "k"});
        assert_eq!(
            interpret_create_order(200, &no_id.to_string()),
            Err(OrderCreationError::MissingOrderId)
        );

        let no_key = json!({"success": true, "orderId": "O1", "amount": 1, "currency": "INR"});
        assert!(matches!(
            interpret_create_order(200, &no_key.to_string()),
            Err(OrderCreationError::Transport(TransportError::Malformed(message)))
                if message.contains("keyId")
        ));
    }

    #[test]
    fn verify_and_report_rules() {
        assert_eq!(interpret_verify(200, "{\"success\": true}"), Ok(()));
        assert_eq!(
            interpret_verify(200, "{\"success\": false, \"message\": \"bad signature\"}"),
            Err(VerificationError::Rejected("bad signature".into()))
        );
        assert_eq!(interpret_report(204, ""), Ok(()));
        assert!(interpret_report(503, "unavailable").is_err());
    }
}
