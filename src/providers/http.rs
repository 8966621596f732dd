use async_trait::async_trait;
use tracing::debug;

use crate::error::ProviderError;
use crate::providers::{ProviderResponse, QuoteProvider};

/// GET `<base_url>?<param>=<key>` against a lookup service that already
/// returns a normalized JSON quote. Signing and token refresh live behind
/// that service.
pub struct HttpQuoteProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    param: &'static str,
    /// Status recorded for any non-2xx answer instead of the real one.
    failure_status: Option<u16>,
}

impl HttpQuoteProvider {
    pub fn new(name: &str, client: reqwest::Client, base_url: &str, param: &'static str) -> Self {
        Self {
            name: name.to_string(),
            client,
            base_url: base_url.to_string(),
            param,
            failure_status: None,
        }
    }

    pub fn with_failure_status(mut self, status: u16) -> Self {
        self.failure_status = Some(status);
        self
    }
}

#[async_trait]
impl QuoteProvider for HttpQuoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, key: &str) -> Result<ProviderResponse, ProviderError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[(self.param, key)])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        let mut payload = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .filter(|v| v.is_object());

        let status = match (status.is_success(), self.failure_status) {
            (true, _) | (false, None) => status.as_u16(),
            (false, Some(mapped)) => {
                // Keep the upstream status visible in the recorded error.
                let obj = payload.get_or_insert_with(|| serde_json::json!({}));
                if obj.get("error").is_none() {
                    obj["error"] = serde_json::Value::String(format!("http_{}", status.as_u16()));
                }
                mapped
            }
        };

        debug!(provider = %self.name, key = %key, status, "Provider responded");
        Ok(ProviderResponse { status, payload })
    }
}
