// SAS portal HTTP client
//
// Wraps `reqwest::Client` with customer-scoped URL construction, bearer
// auth, and page-token pagination. All methods return decoded payloads.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::models::{DeviceListPage, SasDevice};
use crate::error::Error;

/// Upper bound on followed page tokens, in case the portal loops.
const MAX_PAGES: usize = 64;

/// Read-only client for a single SAS portal customer.
#[derive(Clone)]
pub struct SasClient {
    http: reqwest::Client,
    base_url: Url,
    customer_id: String,
    token: Option<SecretString>,
}

impl SasClient {
    /// Public portal endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://sasportal.googleapis.com/v1alpha1/";

    /// Create a client with its own connection pool and request timeout.
    ///
    /// `customer_id` is the portal resource name (`customers/<id>`). An empty
    /// id yields a client that reports [`Error::NotConfigured`] on every call.
    pub fn new(
        base_url: Url,
        customer_id: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("surfctl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http, base_url, customer_id, token))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        mut base_url: Url,
        customer_id: impl Into<String>,
        token: Option<SecretString>,
    ) -> Self {
        // `Url::join` drops the last path segment unless it ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http,
            base_url,
            customer_id: customer_id.into().trim_matches('/').to_owned(),
            token,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    /// Whether a customer account is configured at all.
    pub fn is_configured(&self) -> bool {
        !self.customer_id.is_empty()
    }

    /// List every device under the customer, following page tokens.
    pub async fn list_devices(&self) -> Result<Vec<SasDevice>, Error> {
        if !self.is_configured() {
            return Err(Error::NotConfigured { feed: "SAS portal" });
        }

        let url = self
            .base_url
            .join(&format!("{}/devices", self.customer_id))?;

        let mut devices = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut request = self.http.get(url.clone());
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let body: DeviceListPage = self.send(request).await?;
            trace!(page, count = body.devices.len(), "SAS device page");
            devices.extend(body.devices);

            match body.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(count = devices.len(), "listed SAS devices");
        Ok(devices)
    }

    /// Find a single device by manufacturer serial number.
    pub async fn device_by_serial(&self, serial_number: &str) -> Result<Option<SasDevice>, Error> {
        Ok(self
            .list_devices()
            .await?
            .into_iter()
            .find(|d| d.serial_number == serial_number))
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, Error> {
        let request = match self.token {
            Some(ref token) => request.bearer_auth(token.expose_secret()),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication { message: body });
        }
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

impl std::fmt::Debug for SasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasClient")
            .field("base_url", &self.base_url.as_str())
            .field("customer_id", &self.customer_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}
