use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Main Error Type
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    // Convenience constructors
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(ErrorCode::HttpStatus, format!("Upstream returned HTTP {}", status))
            .with_details(serde_json::json!({ "status": status, "body": body }))
    }

    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedFrame, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Stream cancelled")
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

// ============================================================================
// Error Codes
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Caller errors
    BadRequest,
    Cancelled,
    Config,

    // Upstream / system errors
    Transport,
    HttpStatus,
    MalformedFrame,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest | Self::Cancelled | Self::Config
        )
    }

    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Cancelled => "CANCELLED",
            Self::Config => "CONFIG_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::HttpStatus => "HTTP_STATUS",
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// Error Conversion Implementations
// ============================================================================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("IO error: {}", err))
    }
}

impl From<crate::connector::TransportError> for AppError {
    fn from(err: crate::connector::TransportError) -> Self {
        use crate::connector::TransportError;
        match err {
            TransportError::Status { status, body } => Self::http_status(status, body),
            TransportError::IdleTimeout(after) => {
                Self::timeout(format!("No data received for {:?}", after))
            }
            TransportError::Decode(_) => Self::malformed_frame(err.to_string()),
            TransportError::AlreadyOpened => Self::internal(err.to_string()),
            other => Self::transport(other.to_string()),
        }
    }
}

// ============================================================================
// Error Context Extension
// ============================================================================

pub trait ErrorContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<AppError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let mut err = e.into();
            err.message = format!("{}: {}", context.into(), err.message);
            err
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn log_error(error: &AppError) {
    if error.code.is_server_error() {
        log::error!("{}", error);
    } else {
        log::warn!("{}", error);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::TransportError;

    #[test]
    fn test_error_with_details() {
        let err = AppError::bad_request("Empty prompt")
            .with_details(serde_json::json!({"field": "content"}));
        assert!(err.details.is_some());
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[test]
    fn test_error_classification() {
        assert!(ErrorCode::Config.is_client_error());
        assert!(ErrorCode::Cancelled.is_client_error());
        assert!(ErrorCode::HttpStatus.is_server_error());
        assert!(ErrorCode::MalformedFrame.is_server_error());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::cancelled();
        let display = format!("{}", err);
        assert!(display.starts_with("[CANCELLED]"));
    }

    #[test]
    fn test_status_error_keeps_body() {
        let err: AppError = TransportError::Status {
            status: 401,
            body: "{\"error\":\"invalid key\"}".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::HttpStatus);
        let details = err.details.unwrap();
        assert_eq!(details["status"], 401);
        assert!(details["body"].as_str().unwrap().contains("invalid key"));
    }

    #[test]
    fn test_transport_error_codes() {
        let timeout: AppError = TransportError::IdleTimeout(std::time::Duration::from_secs(5)).into();
        assert_eq!(timeout.code, ErrorCode::Timeout);
        let decode: AppError = TransportError::Decode("expected value".to_string()).into();
        assert_eq!(decode.code, ErrorCode::MalformedFrame);
        let network: AppError = TransportError::Network("refused".to_string()).into();
        assert_eq!(network.code, ErrorCode::Transport);
    }

    #[test]
    fn test_context_prefixes_message() {
        let res: std::result::Result<(), AppError> = Err(AppError::config("missing key"));
        let err = res.context("Loading settings").unwrap_err();
        assert_eq!(err.message, "Loading settings: missing key");
    }

    #[test]
    fn test_json_serialization() {
        let err = AppError::malformed_frame("bad delta");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("MalformedFrame"));
    }
}
