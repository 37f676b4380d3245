//! `reqwest` implementation of [`FunnelBackend`].
//!
//! The adapter only moves bytes: it sends the request, reads status and body, and hands
//! both to the shared interpreters in [`leadflow_core::backend::contract`].

use std::time::Duration;

use async_trait::async_trait;
use leadflow_core::backend::contract::{
    self, CreateOrderRequest, CREATE_ORDER_PATH, LEAD_PATH, MODAL_CLOSED_PATH, PACKAGES_PATH,
    SERVICES_PATH, VERIFY_PATH,
};
use leadflow_core::backend::FunnelBackend;
use leadflow_core::config::BackendConfig;
use leadflow_core::domain::lead::{LeadId, LeadSubmission};
use leadflow_core::domain::order::{CreatedOrder, DismissalReport, PaymentVerification};
use leadflow_core::domain::package::{Package, PackageId, PackageQuery};
use leadflow_core::errors::{
    FetchError, OrderCreationError, ReportError, SubmitError, TransportError, VerificationError,
};
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HttpBackendError {
    #[error("could not build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("backend base url must not be empty")]
    EmptyBaseUrl,
}

#[derive(Clone, Debug)]
pub struct HttpFunnelBackend {
    client: Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl HttpFunnelBackend {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        api_token: Option<SecretString>,
    ) -> Result<Self, HttpBackendError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(HttpBackendError::EmptyBaseUrl);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url, api_token })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, HttpBackendError> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.api_token.clone(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> RequestBuilder {
        self.request(Method::POST, path).json(body)
    }

    async fn exchange(
        &self,
        path: &'static str,
        builder: RequestBuilder,
    ) -> Result<(u16, String), TransportError> {
        let response = builder.send().await.map_err(|error| {
            warn!(
                event_name = "http.backend.request_failed",
                path,
                timeout = error.is_timeout(),
                error = %error,
                "backend request failed"
            );
            TransportError::Network(describe(&error))
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| {
            warn!(
                event_name = "http.backend.body_unreadable",
                path,
                status,
                error = %error,
                "backend response body could not be read"
            );
            TransportError::Network(describe(&error))
        })?;

        debug!(event_name = "http.backend.response", path, status, "backend responded");
        Ok((status, body))
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else {
        error.to_string()
    }
}

#[async_trait]
impl FunnelBackend for HttpFunnelBackend {
    async fn submit_lead(&self, lead: &LeadSubmission) -> Result<LeadId, SubmitError> {
        let (status, body) = self.exchange(LEAD_PATH, self.post(LEAD_PATH, lead)).await?;
        contract::interpret_lead(status, &body)
    }

    async fn list_services(&self) -> Result<Vec<String>, FetchError> {
        let request = self.request(Method::GET, SERVICES_PATH);
        let (status, body) = self.exchange(SERVICES_PATH, request).await?;
        contract::interpret_services(status, &body)
    }

    async fn list_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, FetchError> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(service) = &query.service {
            params.push(("service", service.as_str()));
        }
        if let Some(region) = &query.region {
            params.push(("region", region.as_str()));
        }

        let request = self.request(Method::GET, PACKAGES_PATH).query(&params);
        let (status, body) = self.exchange(PACKAGES_PATH, request).await?;
        contract::interpret_packages(status, &body)
    }

    async fn create_order(
        &self,
        lead_id: &LeadId,
        package_id: &PackageId,
    ) -> Result<CreatedOrder, OrderCreationError> {
        let payload = CreateOrderRequest { lead_id: &lead_id.0, package_id: &package_id.0 };
        let request = self.post(CREATE_ORDER_PATH, &payload);
        let (status, body) = self.exchange(CREATE_ORDER_PATH, request).await?;
        contract::interpret_create_order(status, &body)
    }

    async fn verify_payment(
        &self,
        verification: &PaymentVerification,
    ) -> Result<(), VerificationError> {
        let request = self.post(VERIFY_PATH, verification);
        let (status, body) = self.exchange(VERIFY_PATH, request).await?;
        contract::interpret_verify(status, &body)
    }

    async fn report_dismissal(&self, report: &DismissalReport) -> Result<(), ReportError> {
        let request = self.post(MODAL_CLOSED_PATH, report);
        let (status, body) = self.exchange(MODAL_CLOSED_PATH, request).await?;
        contract::interpret_report(status, &body)
    }
}
