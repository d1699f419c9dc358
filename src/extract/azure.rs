//! Azure AI Document Intelligence `prebuilt-layout` client.
//!
//! Analysis is a two-step REST exchange:
//!
//! 1. `POST {endpoint}/documentintelligence/documentModels/prebuilt-layout:analyze`
//!    with the document as `base64Source`. The service answers `202 Accepted`
//!    and an `Operation-Location` header.
//! 2. `GET` the operation URL until `status` is `succeeded` or `failed`.
//!
//! HTTP status codes map onto [`ExtractionErrorKind`]:
//!
//! | Status | Kind |
//! |--------|------|
//! | 400, 413, 415 | Permanent (the document is the problem) |
//! | 401, 403, 404 | Unavailable (credentials or endpoint are wrong) |
//! | 408, 429, 5xx, network errors | Transient |

use crate::error::{ExtractionError, ExtractionErrorKind, RollcallError};
use crate::extract::{classify_service_message, Extraction, TableExtractor};
use crate::model::{RawTable, SourceDocument};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

pub const ENDPOINT_ENV: &str = "ROLLCALL_ENDPOINT";
pub const API_KEY_ENV: &str = "ROLLCALL_API_KEY";

const DEFAULT_API_VERSION: &str = "2024-11-30";
const DEFAULT_MODEL: &str = "prebuilt-layout";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Error codes in a failed operation that mean the document is unusable.
const PERMANENT_CODES: &[&str] = &[
    "InvalidContent",
    "InvalidContentDimensions",
    "InvalidContentLength",
    "InvalidRequest",
    "UnsupportedContent",
    "ContentSourceNotAccessible",
];

pub struct AzureLayoutExtractor {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    model_id: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl std::fmt::Debug for AzureLayoutExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureLayoutExtractor")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("model_id", &self.model_id)
            .field("poll_interval", &self.poll_interval)
            .field("max_polls", &self.max_polls)
            .finish_non_exhaustive()
    }
}

impl AzureLayoutExtractor {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RollcallError> {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        let api_key = api_key.into().trim().to_string();
        if endpoint.is_empty() || api_key.is_empty() {
            return Err(RollcallError::ExtractorNotConfigured {
                hint: format!("Both an endpoint and an API key are required ({ENDPOINT_ENV}, {API_KEY_ENV})."),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RollcallError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            api_version: DEFAULT_API_VERSION.to_string(),
            model_id: DEFAULT_MODEL.to_string(),
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        })
    }

    /// Build from `ROLLCALL_ENDPOINT` and `ROLLCALL_API_KEY`.
    pub fn from_env() -> Result<Self, RollcallError> {
        let endpoint = std::env::var(ENDPOINT_ENV).unwrap_or_default();
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        if endpoint.trim().is_empty() || api_key.trim().is_empty() {
            return Err(RollcallError::ExtractorNotConfigured {
                hint: format!(
                    "Set {ENDPOINT_ENV} to your Document Intelligence endpoint and {API_KEY_ENV} to its key,\n\
                     or pass --endpoint / --api-key."
                ),
            });
        }
        Self::new(endpoint, api_key)
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}",
            self.endpoint, self.model_id, self.api_version
        )
    }

    async fn poll(&self, operation_url: &str) -> Result<Extraction, ExtractionError> {
        for poll in 1..=self.max_polls {
            sleep(self.poll_interval).await;
            let response = self
                .client
                .get(operation_url)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(transport_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(transport_error)?;
            if !(200..300).contains(&status) {
                return Err(status_error(status, &body));
            }
            let operation: AnalyzeOperation = serde_json::from_str(&body)
                .map_err(|e| ExtractionError::transient(format!("unreadable operation status: {e}")))?;
            match operation.status.as_str() {
                "succeeded" => {
                    debug!("analysis succeeded after {} polls", poll);
                    return match operation.analyze_result {
                        Some(result) => into_extraction(result),
                        None => Ok(Extraction::default()),
                    };
                }
                "failed" => {
                    return Err(operation
                        .error
                        .map(operation_error)
                        .unwrap_or_else(|| ExtractionError::transient("analysis failed without an error body")));
                }
                _ => continue,
            }
        }
        Err(ExtractionError::transient(format!(
            "analysis still running after {} polls",
            self.max_polls
        )))
    }
}

#[async_trait]
impl TableExtractor for AzureLayoutExtractor {
    fn name(&self) -> &str {
        "azure-layout"
    }

    async fn analyze(&self, document: &SourceDocument) -> Result<Extraction, ExtractionError> {
        let body = serde_json::json!({ "base64Source": STANDARD.encode(&document.bytes) });
        let response = self
            .client
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }
        let operation_url = response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ExtractionError::transient("response has no Operation-Location header"))?;

        debug!("{}: analysis accepted, polling", document.name);
        self.poll(&operation_url).await
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tables: Vec<ServiceTable>,
}

#[derive(Debug, Deserialize)]
struct ServiceTable {
    #[serde(default)]
    cells: Vec<ServiceCell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceCell {
    row_index: usize,
    column_index: usize,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ServiceError,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    innererror: Option<InnerError>,
}

#[derive(Debug, Deserialize)]
struct InnerError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ServiceError {
    fn codes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.code.as_str())
            .chain(self.innererror.as_ref().and_then(|i| i.code.as_deref()))
    }

    fn describe(&self) -> String {
        match self.innererror.as_ref().and_then(|i| i.message.as_deref()) {
            Some(inner) => format!("{}: {} ({})", self.code, self.message, inner),
            None => format!("{}: {}", self.code, self.message),
        }
    }
}

/// Grid the reported cells. A table whose indices would need more than
/// [`crate::model::MAX_TABLE_CELLS`] cells fails the document permanently.
fn into_extraction(result: AnalyzeResult) -> Result<Extraction, ExtractionError> {
    let tables = result
        .tables
        .into_iter()
        .map(|t| {
            RawTable::from_cells(
                t.cells
                    .into_iter()
                    .map(|c| (c.row_index, c.column_index, c.content)),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Extraction {
        tables,
        content: result.content,
    })
}

fn operation_error(error: ServiceError) -> ExtractionError {
    let message = error.describe();
    if error.codes().any(|c| PERMANENT_CODES.contains(&c)) {
        ExtractionError::permanent(message)
    } else {
        ExtractionError::new(classify_service_message(&message), message)
    }
}

fn status_error(status: u16, body: &str) -> ExtractionError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.describe())
        .unwrap_or_else(|_| body.chars().take(200).collect());
    let message = format!("HTTP {status}: {detail}");
    let kind = match status {
        400 | 413 | 415 => ExtractionErrorKind::Permanent,
        401 | 403 | 404 => ExtractionErrorKind::Unavailable,
        408 | 429 | 500..=599 => ExtractionErrorKind::Transient,
        _ => classify_service_message(&message),
    };
    ExtractionError::new(kind, message)
}

fn transport_error(e: reqwest::Error) -> ExtractionError {
    if e.is_timeout() {
        ExtractionError::transient(format!("request timed out: {e}"))
    } else {
        ExtractionError::transient(format!("request failed: {e}"))
    }
}
