//! HTTP adapter for a Stripe-compatible payment intents API.

use crate::config::{CaptureMethod, GatewayConfig};
use crate::domain::payment::{Amount, Currency, RemoteIntent};
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Vec<RemoteIntent>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a non-success processor response onto the local error taxonomy.
pub fn classify_failure(status: StatusCode, body: &str) -> PaymentError {
    let error = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_default();
    let message = error
        .message
        .clone()
        .unwrap_or_else(|| format!("processor responded with {status}"));
    let detail = match (&error.r#type, &error.code) {
        (Some(kind), Some(code)) => format!("{message} ({kind}/{code})"),
        (Some(kind), None) => format!("{message} ({kind})"),
        (None, Some(code)) => format!("{message} ({code})"),
        (None, None) => message,
    };

    if status == StatusCode::NOT_FOUND || error.code.as_deref() == Some("resource_missing") {
        PaymentError::RemoteNotFound(detail)
    } else if status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
    {
        PaymentError::RemoteInvalidRequest(detail)
    } else {
        PaymentError::RemoteUnavailable(detail)
    }
}

fn check_id(id: &str) -> Result<&str> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(id)
    } else {
        Err(PaymentError::RemoteInvalidRequest(format!(
            "malformed payment intent id: {id:?}"
        )))
    }
}

/// Talks to the processor over HTTPS.
///
/// The API key comes from [`GatewayConfig`]; each instance carries its own.
/// No call is retried here.
#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    base_url: String,
    api_key: String,
    capture_method: CaptureMethod,
}

impl StripeGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .user_agent(concat!("paysync/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            capture_method: config.capture_method,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        form: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "processor request");

        let mut req = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.api_key);
        if !query.is_empty() {
            req = req.query(query);
        }
        if !form.is_empty() {
            req = req.form(form);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PaymentError::RemoteUnavailable(format!("{method} {path}: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| PaymentError::RemoteUnavailable(format!("{method} {path}: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            PaymentError::RemoteUnavailable(format!("undecodable response for {method} {path}: {e}"))
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create(&self, amount: Amount, currency: &Currency) -> Result<RemoteIntent> {
        let form = [
            ("amount", amount.value().to_string()),
            ("currency", currency.to_string()),
            ("capture_method", self.capture_method.as_str().to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("automatic_payment_methods[allow_redirects]", "never".to_string()),
        ];
        self.request(Method::POST, "/v1/payment_intents", &[], &form)
            .await
    }

    async fn confirm(&self, id: &str, payment_method: &str) -> Result<RemoteIntent> {
        let path = format!("/v1/payment_intents/{}/confirm", check_id(id)?);
        let form = [("payment_method", payment_method.to_string())];
        self.request(Method::POST, &path, &[], &form).await
    }

    async fn capture(&self, id: &str) -> Result<RemoteIntent> {
        let path = format!("/v1/payment_intents/{}/capture", check_id(id)?);
        self.request(Method::POST, &path, &[], &[]).await
    }

    async fn cancel(&self, id: &str) -> Result<RemoteIntent> {
        let path = format!("/v1/payment_intents/{}/cancel", check_id(id)?);
        self.request(Method::POST, &path, &[], &[]).await
    }

    async fn update_amount(&self, id: &str, amount: Amount) -> Result<RemoteIntent> {
        let path = format!("/v1/payment_intents/{}", check_id(id)?);
        let form = [("amount", amount.value().to_string())];
        self.request(Method::POST, &path, &[], &form).await
    }

    async fn retrieve(&self, id: &str) -> Result<RemoteIntent> {
        let path = format!("/v1/payment_intents/{}", check_id(id)?);
        self.request(Method::GET, &path, &[], &[]).await
    }

    async fn list(&self, limit: u32, starting_after: Option<&str>) -> Result<Vec<RemoteIntent>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = starting_after.filter(|c| !c.trim().is_empty()) {
            query.push(("starting_after", check_id(cursor)?.to_string()));
        }
        let page: ListResponse = self
            .request(Method::GET, "/v1/payment_intents", &query, &[])
            .await?;
        Ok(page.data)
    }
}
