//! Errors - API エラーの正規化
//!
//! Every failure that crosses the API client boundary is turned into an
//! [`ApiError`]: a kind from the closed taxonomy, the HTTP status (when a
//! response was received), a short summary and an optional detail line.

use serde::Deserialize;

/// ErrorKind はエラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request payload (client-side check or HTTP 422).
    Validation,
    /// Unknown task id (HTTP 404).
    NotFound,
    /// The backend lacks the capability (HTTP 501).
    FeatureUnavailable,
    /// No response at all: connection refused, DNS, timeout.
    NetworkUnreachable,
    /// Any other non-2xx status, or an undecodable success body.
    Server,
}

/// Normalized error shape: `{status_code, summary, detail?}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    kind: ErrorKind,
    status_code: Option<u16>,
    summary: String,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, status_code: Option<u16>, summary: impl Into<String>) -> Self {
        Self {
            kind,
            status_code,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Client-side validation failure, one `(field, reason)` pair per violation.
    pub fn invalid_fields<F, R>(violations: impl IntoIterator<Item = (F, R)>) -> Self
    where
        F: AsRef<str>,
        R: AsRef<str>,
    {
        let joined = violations
            .into_iter()
            .map(|(field, reason)| format!("{} - {}", field.as_ref(), reason.as_ref()))
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(ErrorKind::Validation, None, "Request validation failed").with_detail(joined)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, Some(404), "Task not found").with_detail(what)
    }

    pub fn feature_unavailable(feature: &str) -> Self {
        Self::new(
            ErrorKind::FeatureUnavailable,
            Some(501),
            "Feature not available on this server",
        )
        .with_detail(format!("{feature} is not supported by the backend"))
    }

    /// Transport failure with no response; the detail tells the user what to check.
    pub fn network_unreachable(endpoint: &str, cause: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::NetworkUnreachable,
            None,
            "Cannot reach the task server",
        )
        .with_detail(format!(
            "no response from {endpoint} ({cause}); check that the backend is running and the URL is correct"
        ))
    }

    pub fn malformed_response(what: &str, cause: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Server, None, "Unexpected response from the task server")
            .with_detail(format!("{what}: {cause}"))
    }

    /// Maps a non-2xx status and its raw body onto the taxonomy.
    ///
    /// The body is expected to look like `{"detail": "..."}` or
    /// `{"detail": [{"loc": [...], "msg": "...", "type": "..."}]}`; anything
    /// else is kept verbatim (truncated) as the detail.
    pub fn from_response(status: u16, body: &str) -> Self {
        let detail = describe_body(body);
        let (kind, summary) = match status {
            404 => (ErrorKind::NotFound, "Task not found".to_string()),
            422 => (ErrorKind::Validation, "Request validation failed".to_string()),
            501 => (
                ErrorKind::FeatureUnavailable,
                "Feature not available on this server".to_string(),
            ),
            _ => (ErrorKind::Server, format!("Server error (HTTP {status})")),
        };
        let mut err = Self::new(kind, Some(status), summary);
        err.detail = detail;
        err
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_feature_unavailable(&self) -> bool {
        self.kind == ErrorKind::FeatureUnavailable
    }

    /// One line suitable for an alert: summary plus detail when present.
    pub fn user_message(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {}", self.summary, detail),
            None => self.summary.clone(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[{code}] ")?;
        }
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

impl FieldError {
    fn render(&self) -> String {
        let path = self
            .loc
            .iter()
            .map(|segment| match segment {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        if path.is_empty() {
            self.msg.clone()
        } else {
            format!("{path} - {}", self.msg)
        }
    }
}

const MAX_RAW_DETAIL: usize = 200;

fn describe_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(ErrorBody {
            detail: ErrorDetail::Message(message),
        }) => Some(message),
        Ok(ErrorBody {
            detail: ErrorDetail::Fields(fields),
        }) => Some(
            fields
                .iter()
                .map(FieldError::render)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Ok(ErrorBody {
            detail: ErrorDetail::Other(value),
        }) => Some(value.to_string()),
        Err(_) => Some(trimmed.chars().take(MAX_RAW_DETAIL).collect()),
    }
}
