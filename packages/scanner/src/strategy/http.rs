//! Direct-REST extraction strategy.
//!
//! Applies the configured retry policy on 429/5xx and network timeouts;
//! protocol problems (unparseable bodies) are never retried. A 404 is not
//! an error: it comes back as an `http_not_found` payload.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::{ScanStrategy, StrategyPayload};
use crate::browser::BrowserPage;
use crate::config::{FieldMap, ResponseKind, UpstreamRetry};
use crate::error::ScanError;
use crate::navigation::render_template;

pub struct HttpStrategy {
    pub(crate) id: String,
    pub(crate) priority: u32,
    pub(crate) url_template: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) response: ResponseKind,
    pub(crate) retry: UpstreamRetry,
    pub(crate) timeout: Duration,
    pub(crate) delay: Duration,
    pub(crate) field_map: Arc<FieldMap>,
    pub(crate) client: reqwest::Client,
}

#[async_trait]
impl ScanStrategy for HttpStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn requires_browser(&self) -> bool {
        false
    }

    async fn fetch(
        &self,
        product_id: &str,
        _page: Option<&mut (dyn BrowserPage + '_)>,
        cancel: &CancellationToken,
    ) -> Result<StrategyPayload, ScanError> {
        let url = render_template(&self.url_template, product_id);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = send_with_retry(&self.retry, cancel, || {
            let mut request = self.client.get(&url).timeout(self.timeout);
            for (name, value) in &self.headers {
                request = request.header(name, value);
            }
            request
        })
        .await?;

        let Some(response) = response else {
            return Ok(StrategyPayload::not_found());
        };

        let final_url = response.url().to_string();
        let body = response.text().await?;

        let payload = match self.response {
            ResponseKind::Json => StrategyPayload {
                value: serde_json::from_str(&body)
                    .map_err(|e| ScanError::Protocol(format!("invalid json body: {e}")))?,
                final_url: Some(final_url),
                http_not_found: false,
                canonical: false,
            },
            ResponseKind::Html => StrategyPayload {
                value: resolve_html_fields(&body, &self.field_map)?,
                final_url: Some(final_url),
                http_not_found: false,
                canonical: true,
            },
        };
        Ok(payload)
    }
}

/// Shared retry loop for HTTP-shaped strategies.
///
/// Returns `Ok(None)` on 404. Delay between attempts is linear:
/// `backoff_ms * attempt_index`.
pub(crate) async fn send_with_retry<F>(
    retry: &UpstreamRetry,
    cancel: &CancellationToken,
    make_request: F,
) -> Result<Option<reqwest::Response>, ScanError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        if attempt > 1 {
            tokio::time::sleep(Duration::from_millis(
                retry.backoff_ms * u64::from(attempt - 1),
            ))
            .await;
        }

        match make_request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() == 404 {
                    return Ok(None);
                }
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::debug!(status = status.as_u16(), attempt, "retryable upstream status");
                    last_error = Some(ScanError::transient(
                        Some(status.as_u16()),
                        format!("upstream returned {status}"),
                    ));
                    continue;
                }
                if !status.is_success() {
                    return Err(ScanError::Protocol(format!(
                        "unexpected upstream status {status}"
                    )));
                }
                return Ok(Some(response));
            }
            Err(e) => {
                let err = ScanError::from(e);
                if !err.is_transient() {
                    return Err(err);
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| ScanError::transient(None, "retry budget exhausted".to_string())))
}

/// Resolve the platform field map (CSS selectors) against an HTML body into
/// a canonically keyed payload. Synchronous: `scraper::Html` is not `Send`
/// and must not live across an await point.
pub(crate) fn resolve_html_fields(body: &str, map: &FieldMap) -> Result<Value, ScanError> {
    let document = scraper::Html::parse_document(body);
    let mut out = Map::new();

    let mut put = |key: &str, selector: Option<&str>| -> Result<(), ScanError> {
        let Some(selector) = selector else {
            return Ok(());
        };
        let parsed = scraper::Selector::parse(selector)
            .map_err(|e| ScanError::Config(format!("bad selector {selector:?}: {e:?}")))?;
        if let Some(element) = document.select(&parsed).next() {
            let text = element
                .value()
                .attr("src")
                .or_else(|| element.value().attr("content"))
                .map(str::to_string)
                .unwrap_or_else(|| element.text().collect::<String>());
            let text = text.trim();
            if !text.is_empty() {
                out.insert(key.to_string(), Value::String(text.to_string()));
            }
        }
        Ok(())
    };

    put("name", Some(&map.name))?;
    put("thumbnail_url", map.thumbnail_url.as_deref())?;
    put("original_price", map.original_price.as_deref())?;
    put("discounted_price", map.discounted_price.as_deref())?;
    put("sale_status", Some(&map.sale_status))?;
    for (key, selector) in &map.metadata {
        put(key, Some(selector))?;
    }

    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html_map() -> FieldMap {
        FieldMap {
            name: ".prd_name".into(),
            thumbnail_url: Some("img.prd_thumb".into()),
            original_price: Some(".price_org".into()),
            discounted_price: Some(".price_sale".into()),
            sale_status: ".sale_flag".into(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn html_fields_resolve_to_canonical_payload() {
        let body = r#"
            <html><body>
              <p class="prd_name"> Green Tea Serum </p>
              <img class="prd_thumb" src="https://img.example/serum.jpg"/>
              <span class="price_org">32,000원</span>
              <span class="price_sale">25,600원</span>
              <em class="sale_flag">SALE</em>
            </body></html>"#;
        let payload = resolve_html_fields(body, &html_map()).unwrap();
        assert_eq!(payload["name"], "Green Tea Serum");
        assert_eq!(payload["thumbnail_url"], "https://img.example/serum.jpg");
        assert_eq!(payload["sale_status"], "SALE");
    }

    #[test]
    fn missing_elements_are_omitted() {
        let payload = resolve_html_fields("<html></html>", &html_map()).unwrap();
        assert!(payload.as_object().unwrap().is_empty());
    }

    #[test]
    fn bad_selector_is_a_config_error() {
        let mut map = html_map();
        map.name = ":::".into();
        assert!(matches!(
            resolve_html_fields("<html></html>", &map),
            Err(ScanError::Config(_))
        ));
    }
}
