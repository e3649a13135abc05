//! Navigation phase of browser scanners.
//!
//! A navigation is a small interpreter over a list of tagged steps, with a
//! per-step timeout and a cancellation check between steps. Step URL and
//! text fields are templated with the product id.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserPage;
use crate::error::ScanError;

/// One navigation step. `{product_id}` in string fields is substituted
/// before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavStep {
    Navigate { url: String },
    WaitForSelector {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Wait { ms: u64 },
    Click { selector: String },
    Type { selector: String, text: String },
    /// Evaluate javascript; when `store_as` is set the result is kept in
    /// the navigation output map under that key.
    Evaluate {
        script: String,
        #[serde(default)]
        store_as: Option<String>,
    },
}

impl NavStep {
    fn label(&self) -> &'static str {
        match self {
            NavStep::Navigate { .. } => "navigate",
            NavStep::WaitForSelector { .. } => "wait_for_selector",
            NavStep::Wait { .. } => "wait",
            NavStep::Click { .. } => "click",
            NavStep::Type { .. } => "type",
            NavStep::Evaluate { .. } => "evaluate",
        }
    }
}

/// Substitute `{product_id}` in a template.
pub fn render_template(template: &str, product_id: &str) -> String {
    template.replace("{product_id}", product_id)
}

/// Run the navigation steps against a page.
///
/// Returns the map of `store_as` evaluation results. Cancellation is
/// honored between steps; in-flight waits are bounded by the step timeout.
pub async fn run_steps(
    page: &mut dyn BrowserPage,
    steps: &[NavStep],
    product_id: &str,
    default_step_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<HashMap<String, Value>, ScanError> {
    let mut outputs = HashMap::new();

    for step in steps {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let label = step.label();
        let run = async {
            match step {
                NavStep::Navigate { url } => {
                    page.goto(&render_template(url, product_id)).await
                }
                NavStep::WaitForSelector {
                    selector,
                    timeout_ms,
                } => {
                    let timeout = timeout_ms
                        .map(Duration::from_millis)
                        .unwrap_or(default_step_timeout);
                    page.wait_for_selector(selector, timeout).await
                }
                NavStep::Wait { ms } => {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    Ok(())
                }
                NavStep::Click { selector } => page.click(selector).await,
                NavStep::Type { selector, text } => {
                    page.type_text(selector, &render_template(text, product_id))
                        .await
                }
                NavStep::Evaluate { script, store_as } => {
                    let value = page
                        .evaluate(&render_template(script, product_id))
                        .await?;
                    if let Some(key) = store_as {
                        outputs.insert(key.clone(), value);
                    }
                    Ok(())
                }
            }
        };

        match tokio::time::timeout(default_step_timeout.max(step_budget(step)), run).await {
            Ok(Ok(())) => {}
            Ok(Err(ScanError::Cancelled)) => return Err(ScanError::Cancelled),
            Ok(Err(ScanError::BrowserCrashed(m))) => return Err(ScanError::BrowserCrashed(m)),
            Ok(Err(e)) => {
                return Err(ScanError::Navigation {
                    step: label.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ScanError::Navigation {
                    step: label.to_string(),
                    message: "step timeout".to_string(),
                })
            }
        }
    }

    Ok(outputs)
}

// Explicit waits budget their own duration on top of the step timeout so a
// configured `wait` longer than the default cannot time itself out.
fn step_budget(step: &NavStep) -> Duration {
    match step {
        NavStep::Wait { ms } => Duration::from_millis(ms + 100),
        NavStep::WaitForSelector {
            timeout_ms: Some(ms),
            ..
        } => Duration::from_millis(ms + 100),
        _ => Duration::ZERO,
    }
}
