//! HTTP bridges to the supplied capabilities: the automation/visual driver
//! sidecar and the step planner. The engine consumes these as traits; this
//! module is pure transport, with the error taxonomy carried over the wire
//! so cascade decisions (timeout vs. definite miss, stale vs. obscured)
//! survive the hop.

use async_trait::async_trait;
use base64::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use wayfarer::{
    AutomationDriver, ButtonRegion, ElementRef, EngineError, PageContent, PageSnapshot,
    PlanContext, Planner, ScreenshotResult, SearchScope, Step, TargetDescriptor, TextRegion,
    VisualDriver,
};

/// Error kinds a driver sidecar may report. Anything unrecognized degrades
/// to a generic driver error, which the cascade treats as definite.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum WireErrorKind {
    ElementNotFound,
    Timeout,
    StaleElement,
    ElementObscured,
    UnsupportedOperation,
    InvalidTarget,
    DriverError,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireError {
    kind: WireErrorKind,
    message: String,
}

impl WireError {
    fn into_engine(self) -> EngineError {
        match self.kind {
            WireErrorKind::ElementNotFound => EngineError::ElementNotFound(self.message),
            WireErrorKind::Timeout => EngineError::Timeout(self.message),
            WireErrorKind::StaleElement => EngineError::StaleElement(self.message),
            WireErrorKind::ElementObscured => EngineError::ElementObscured(self.message),
            WireErrorKind::UnsupportedOperation => {
                EngineError::UnsupportedOperation(self.message)
            }
            WireErrorKind::InvalidTarget => EngineError::InvalidTarget(self.message),
            WireErrorKind::DriverError | WireErrorKind::Other => {
                EngineError::DriverError(self.message)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvokeReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreenshotPayload {
    image_base64: String,
    width: u32,
    height: u32,
}

fn image_params(image: &ScreenshotResult) -> serde_json::Value {
    json!({
        "imageBase64": BASE64_STANDARD.encode(&image.image_data),
        "width": image.width,
        "height": image.height,
    })
}

/// Driver sidecar client. Every capability call is a `POST {base}/invoke`
/// with a `{method, params}` envelope; replies carry either a `result` or a
/// typed `error`.
pub struct RemoteDriver {
    client: reqwest::Client,
    invoke_url: String,
}

impl RemoteDriver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::DriverError(format!("driver client: {e}")))?;
        Ok(Self {
            client,
            invoke_url: format!("{}/invoke", base_url.trim_end_matches('/')),
        })
    }

    async fn invoke<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, EngineError> {
        debug!(method, "driver invoke");
        let reply: InvokeReply = self
            .client
            .post(&self.invoke_url)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .await
            .map_err(|e| EngineError::DriverError(format!("{method}: {e}")))?
            .error_for_status()
            .map_err(|e| EngineError::DriverError(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| EngineError::DriverError(format!("{method}: malformed reply: {e}")))?;

        if let Some(error) = reply.error {
            return Err(error.into_engine());
        }
        let value = reply.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value)
            .map_err(|e| EngineError::DriverError(format!("{method}: malformed result: {e}")))
    }
}

#[async_trait]
impl AutomationDriver for RemoteDriver {
    async fn navigate(&self, url: &str) -> Result<(), EngineError> {
        self.invoke("navigate", json!({ "url": url })).await
    }

    async fn find(
        &self,
        target: &TargetDescriptor,
        scope: SearchScope,
        timeout: Duration,
    ) -> Result<ElementRef, EngineError> {
        self.invoke(
            "find",
            json!({
                "target": target,
                "scope": scope,
                "timeoutMs": timeout.as_millis() as u64,
            }),
        )
        .await
    }

    async fn find_any_visible(
        &self,
        target: &TargetDescriptor,
        timeout: Duration,
    ) -> Result<ElementRef, EngineError> {
        self.invoke(
            "findAnyVisible",
            json!({
                "target": target,
                "timeoutMs": timeout.as_millis() as u64,
            }),
        )
        .await
    }

    async fn ancestor_interactive(&self, element: &ElementRef) -> Result<ElementRef, EngineError> {
        self.invoke("ancestorInteractive", json!({ "element": element }))
            .await
    }

    async fn click(&self, element: &ElementRef) -> Result<(), EngineError> {
        self.invoke("click", json!({ "element": element })).await
    }

    async fn script_click(&self, element: &ElementRef) -> Result<(), EngineError> {
        self.invoke("scriptClick", json!({ "element": element }))
            .await
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), EngineError> {
        self.invoke("clickAt", json!({ "x": x, "y": y })).await
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), EngineError> {
        self.invoke("typeText", json!({ "element": element, "text": text }))
            .await
    }

    async fn type_at_focus(&self, text: &str) -> Result<(), EngineError> {
        self.invoke("typeAtFocus", json!({ "text": text })).await
    }

    async fn scroll(&self, dx: f64, dy: f64) -> Result<(), EngineError> {
        self.invoke("scroll", json!({ "dx": dx, "dy": dy })).await
    }

    async fn page_content(&self) -> Result<PageContent, EngineError> {
        self.invoke("pageContent", json!({})).await
    }

    async fn screenshot(&self) -> Result<ScreenshotResult, EngineError> {
        let payload: ScreenshotPayload = self.invoke("screenshot", json!({})).await?;
        let image_data = BASE64_STANDARD
            .decode(&payload.image_base64)
            .map_err(|e| EngineError::DriverError(format!("screenshot: bad image data: {e}")))?;
        Ok(ScreenshotResult {
            image_data,
            width: payload.width,
            height: payload.height,
        })
    }

    async fn await_quiescence(&self, timeout: Duration) -> Result<bool, EngineError> {
        self.invoke(
            "awaitQuiescence",
            json!({ "timeoutMs": timeout.as_millis() as u64 }),
        )
        .await
    }
}

#[async_trait]
impl VisualDriver for RemoteDriver {
    async fn locate_text(
        &self,
        image: &ScreenshotResult,
        text: &str,
    ) -> Result<Vec<TextRegion>, EngineError> {
        let mut params = image_params(image);
        params["needle"] = json!(text);
        self.invoke("locateText", params).await
    }

    async fn locate_buttons(
        &self,
        image: &ScreenshotResult,
    ) -> Result<Vec<ButtonRegion>, EngineError> {
        self.invoke("locateButtons", image_params(image)).await
    }
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    steps: Vec<Step>,
}

/// Planner endpoint client: one `POST {base}/plan` per (re)planning request.
/// The orchestrator already bounds how long it will wait; the client timeout
/// only guards the connection itself.
pub struct RemotePlanner {
    client: reqwest::Client,
    plan_url: String,
}

impl RemotePlanner {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::PlannerError(format!("planner client: {e}")))?;
        Ok(Self {
            client,
            plan_url: format!("{}/plan", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Planner for RemotePlanner {
    async fn plan_steps(
        &self,
        task_description: &str,
        current: &PageSnapshot,
        history: &PlanContext,
    ) -> Result<Vec<Step>, EngineError> {
        let reply: PlanReply = self
            .client
            .post(&self.plan_url)
            .json(&json!({
                "taskDescription": task_description,
                "current": current,
                "completedSteps": history.completed_steps,
                "recentSnapshots": history.recent_snapshots,
                "revisionReason": history.revision_reason,
            }))
            .send()
            .await
            .map_err(|e| EngineError::PlannerError(e.to_string()))?
            .error_for_status()
            .map_err(|e| EngineError::PlannerError(e.to_string()))?
            .json()
            .await
            .map_err(|e| EngineError::PlannerError(format!("malformed plan: {e}")))?;
        Ok(reply.steps)
    }
}
