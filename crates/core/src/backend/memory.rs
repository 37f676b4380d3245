//! Deterministic backend that keeps everything in memory.
//!
//! Default answers are generated from a small catalog and run through the same
//! [`contract`](super::contract) interpreters as the HTTP adapter. Tests can queue raw
//! `(status, body)` answers per endpoint to reproduce backend faults.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::backend::contract::{
    self, CREATE_ORDER_PATH, LEAD_PATH, MODAL_CLOSED_PATH, PACKAGES_PATH, SERVICES_PATH,
    VERIFY_PATH,
};
use crate::backend::FunnelBackend;
use crate::domain::lead::{LeadId, LeadSubmission};
use crate::domain::order::{
    CreatedOrder, DismissalReport, OrderId, PaymentDisposition, PaymentVerification,
};
use crate::domain::package::{Package, PackageId, PackageQuery};
use crate::domain::region::region_profile;
use crate::errors::{FetchError, OrderCreationError, ReportError, SubmitError, VerificationError};

pub const DEMO_KEY_ID: &str = "rzp_test_leadflow";

#[derive(Clone, Debug, PartialEq)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: Value,
}

impl ScriptedResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    SubmitLead(LeadSubmission),
    ListServices,
    ListPackages(PackageQuery),
    CreateOrder { lead_id: LeadId, package_id: PackageId },
    VerifyPayment(PaymentVerification),
    ReportDismissal(DismissalReport),
}

#[derive(Default)]
struct MemoryState {
    leads: BTreeMap<String, LeadSubmission>,
    orders: HashMap<String, (LeadId, PackageId)>,
    next_lead: u32,
    next_order: u32,
    calls: Vec<BackendCall>,
    scripted: HashMap<&'static str, VecDeque<ScriptedResponse>>,
}

pub struct InMemoryBackend {
    catalog: Vec<Package>,
    state: Mutex<MemoryState>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::with_catalog(demo_catalog())
    }
}

impl InMemoryBackend {
    pub fn with_catalog(catalog: Vec<Package>) -> Self {
        Self { catalog, state: Mutex::new(MemoryState::default()) }
    }

    /// Queues a raw answer for the next call to `path` (one of the `contract` paths).
    pub fn script(&self, path: &'static str, response: ScriptedResponse) {
        self.lock().scripted.entry(path).or_default().push_back(response);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn lead(&self, lead_id: &LeadId) -> Option<LeadSubmission> {
        self.lock().leads.get(&lead_id.0).cloned()
    }

    /// Every disposition the client has reported for `order_id`, in call order.
    pub fn dispositions(&self, order_id: &OrderId) -> Vec<PaymentDisposition> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::VerifyPayment(verification) if &verification.order_id == order_id => {
                    Some(if verification.is_failure_record() {
                        PaymentDisposition::Failed
                    } else {
                        PaymentDisposition::Verified
                    })
                }
                BackendCall::ReportDismissal(report) if &report.order_id == order_id => {
                    Some(PaymentDisposition::Abandoned)
                }
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take_script(state: &mut MemoryState, path: &'static str) -> Option<ScriptedResponse> {
        state.scripted.get_mut(path).and_then(VecDeque::pop_front)
    }

    fn packages_for(&self, query: &PackageQuery) -> Vec<&Package> {
        self.catalog
            .iter()
            .filter(|package| match &query.service {
                Some(service) => package.service_name.eq_ignore_ascii_case(service),
                None => true,
            })
            .filter(|package| match &query.region {
                Some(region) => package.matches_region(region),
                None => true,
            })
            .collect()
    }
}

#[async_trait]
impl FunnelBackend for InMemoryBackend {
    async fn submit_lead(&self, lead: &LeadSubmission) -> Result<LeadId, SubmitError> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SubmitLead(lead.clone()));

        let response = match Self::take_script(&mut state, LEAD_PATH) {
            Some(scripted) => scripted,
            None => {
                state.next_lead += 1;
                let lead_id = format!("lead_{:04}", state.next_lead);
                state.leads.insert(lead_id.clone(), lead.clone());
                ScriptedResponse::new(201, json!({ "success": true, "leadId": lead_id }))
            }
        };

        contract::interpret_lead(response.status, &response.body.to_string())
    }

    async fn list_services(&self) -> Result<Vec<String>, FetchError> {
        let mut state = self.lock();
        state.calls.push(BackendCall::ListServices);

        let response = Self::take_script(&mut state, SERVICES_PATH).unwrap_or_else(|| {
            let mut services: Vec<&str> =
                self.catalog.iter().map(|package| package.service_name.as_str()).collect();
            services.sort_unstable();
            services.dedup();
            ScriptedResponse::new(200, json!({ "success": true, "services": services }))
        });

        contract::interpret_services(response.status, &response.body.to_string())
    }

    async fn list_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, FetchError> {
        let mut state = self.lock();
        state.calls.push(BackendCall::ListPackages(query.clone()));

        let response = Self::take_script(&mut state, PACKAGES_PATH).unwrap_or_else(|| {
            let packages = self.packages_for(query);
            ScriptedResponse::new(200, json!({ "success": true, "packages": packages }))
        });

        contract::interpret_packages(response.status, &response.body.to_string())
    }

    async fn create_order(
        &self,
        lead_id: &LeadId,
        package_id: &PackageId,
    ) -> Result<CreatedOrder, OrderCreationError> {
        let mut state = self.lock();
        state.calls.push(BackendCall::CreateOrder {
            lead_id: lead_id.clone(),
            package_id: package_id.clone(),
        });

        let response = match Self::take_script(&mut state, CREATE_ORDER_PATH) {
            Some(scripted) => scripted,
            None => match self.catalog.iter().find(|package| &package.id == package_id) {
                Some(package) => {
                    state.next_order += 1;
                    let order_id = format!("order_{:04}", state.next_order);
                    state.orders.insert(order_id.clone(), (lead_id.clone(), package_id.clone()));
                    ScriptedResponse::new(
                        200,
                        json!({
                            "success": true,
                            "orderId": order_id,
                            "amount": minor_units(package.price),
                            "currency": package.currency,
                            "keyId": DEMO_KEY_ID,
                            "packageDetails": { "name": package.name, "tier": package.tier },
                        }),
                    )
                }
                None => ScriptedResponse::new(
                    404,
                    json!({ "success": false, "message": "package not found" }),
                ),
            },
        };

        contract::interpret_create_order(response.status, &response.body.to_string())
    }

    async fn verify_payment(
        &self,
        verification: &PaymentVerification,
    ) -> Result<(), VerificationError> {
        let mut state = self.lock();
        state.calls.push(BackendCall::VerifyPayment(verification.clone()));

        let response = Self::take_script(&mut state, VERIFY_PATH).unwrap_or_else(|| {
            let known = state
                .orders
                .get(&verification.order_id.0)
                .is_some_and(|(lead_id, _)| lead_id == &verification.lead_id);
            if known && !verification.is_failure_record() {
                ScriptedResponse::new(200, json!({ "success": true, "message": "payment verified" }))
            } else if known {
                ScriptedResponse::new(200, json!({ "success": false, "message": "failure recorded" }))
            } else {
                ScriptedResponse::new(400, json!({ "success": false, "message": "unknown order" }))
            }
        });

        contract::interpret_verify(response.status, &response.body.to_string())
    }

    async fn report_dismissal(&self, report: &DismissalReport) -> Result<(), ReportError> {
        let mut state = self.lock();
        state.calls.push(BackendCall::ReportDismissal(report.clone()));

        let response = Self::take_script(&mut state, MODAL_CLOSED_PATH)
            .unwrap_or_else(|| ScriptedResponse::new(200, json!({ "success": true })));

        contract::interpret_report(response.status, &response.body.to_string())
    }
}

fn minor_units(price: Decimal) -> u64 {
    (price * Decimal::ONE_HUNDRED).round().to_u64().unwrap_or(0)
}

/// Small catalog used by the CLI demo and tests.
pub fn demo_catalog() -> Vec<Package> {
    let package = |id: &str, name: &str, tier: &str, service: &str, price: i64, region: &str| {
        let profile = region_profile(region);
        let currency = profile.map(|p| p.currency).unwrap_or("USD");
        let price = Decimal::new(price, 0);
        Package {
            id: PackageId(id.to_string()),
            name: name.to_string(),
            tier: tier.to_string(),
            service_name: service.to_string(),
            description: format!("{name} for growing teams"),
            features: vec!["Dedicated manager".to_string(), "Monthly report".to_string()],
            popular: tier == "Growth",
            display_price: format!("{currency} {price}"),
            price,
            currency: currency.to_string(),
            region: Some(region.to_string()),
        }
    };

    vec![
        package("pkg-seo-starter-in", "SEO Starter", "Starter", "SEO", 14_999, "India"),
        package("pkg-seo-growth-in", "SEO Growth", "Growth", "SEO", 29_999, "India"),
        package("pkg-web-growth-in", "Website Build", "Growth", "Web Development", 74_999, "India"),
        package("pkg-seo-growth-us", "SEO Growth", "Growth", "SEO", 899, "United States"),
        package("pkg-web-growth-us", "Website Build", "Growth", "Web Development", 2_499, "United States"),
    ]
}
