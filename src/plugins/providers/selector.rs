use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use url::Url;

use super::ProviderSettings;
use crate::extraction::{extract_html, Extracted};
use crate::models::{ProviderKind, TrackedItem};
use crate::plugins::traits::PriceProvider;
use crate::utils::error::{ExtractionError, ProviderError};

/// Fetches the item page over HTTP and reads the price with a CSS selector.
pub struct SelectorProvider {
    client: Client,
}

impl SelectorProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PriceProvider for SelectorProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Selector
    }

    async fn fetch(&self, item: &TrackedItem) -> Result<String, ProviderError> {
        let url = Url::parse(&item.url)
            .map_err(|e| ProviderError::InvalidTarget(format!("{}: {}", item.url, e)))?;

        tracing::debug!("GET {} for item {}", url, item.id);

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                url: item.url.clone(),
            });
        }

        Ok(response.text().await?)
    }

    fn extract(&self, raw: &str, item: &TrackedItem) -> Result<Extracted, ExtractionError> {
        extract_html(raw, &item.rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsConfig;
    use crate::models::{AlertThresholds, ExtractionRule};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(url: String) -> TrackedItem {
        TrackedItem {
            id: "lamp".to_string(),
            name: "Desk Lamp".to_string(),
            url,
            provider: ProviderKind::Selector,
            command: None,
            rule: ExtractionRule {
                selector: Some(".price".to_string()),
                currency: "USD".to_string(),
                ..Default::default()
            },
            thresholds: AlertThresholds::default(),
            schedule: None,
            retry_attempts: None,
            cache_ttl: None,
        }
    }

    fn provider() -> SelectorProvider {
        let mut defaults = DefaultsConfig::default();
        defaults.user_agent = "PriceTrekTest/1.0".to_string();
        SelectorProvider::new(&ProviderSettings::from_defaults(&defaults)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lamp"))
            .and(header("user-agent", "PriceTrekTest/1.0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<span class="price">$24.50</span>"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider();
        let item = item(format!("{}/lamp", server.uri()));
        let raw = provider.fetch(&item).await.unwrap();
        let extracted = provider.extract(&raw, &item).unwrap();
        assert_eq!(extracted.price, 24.5);
        assert!(extracted.in_stock);
    }

    #[tokio::test]
    async fn test_non_success_status_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider()
            .fetch(&item(format!("{}/lamp", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::HttpStatus { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retryable() {
        let err = provider().fetch(&item("not a url".to_string())).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidTarget(_)));
        assert!(!err.is_retryable());
    }
}
