//! Error types shared by the HTTP gateway implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::{gateway::GatewayError, model::EntityKind};

/// Convenient result alias returning [`HttpGatewayError`] failures.
pub type HttpResult<T> = Result<T, HttpGatewayError>;

/// Failures that can occur while talking to the quiz backend over HTTP.
#[derive(Debug, Error)]
pub enum HttpGatewayError {
    /// Configured base URL is unusable.
    #[error("invalid backend base URL `{url}`: {reason}")]
    InvalidBaseUrl {
        /// URL as configured.
        url: String,
        /// Why it was refused.
        reason: String,
    },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build HTTP client")]
    ClientBuilder {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent or timed out.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        /// Request path.
        path: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// Backend answered with a non-success status.
    #[error("unexpected response status {status} for `{path}`")]
    RequestStatus {
        /// Request path.
        path: String,
        /// Status the backend answered with.
        status: StatusCode,
        /// `detail` field of the error body, when the backend sent one.
        detail: Option<String>,
    },
    /// Response body could not be read as JSON.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        /// Request path.
        path: String,
        /// Underlying body read error.
        #[source]
        source: reqwest::Error,
    },
    /// A JSON value did not match the expected row shape.
    #[error("failed to deserialize response value for `{path}`")]
    DeserializeValue {
        /// Request path.
        path: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// Backend has no endpoint for this operation.
    #[error("backend has no endpoint to {operation} {kind} records")]
    Unsupported {
        /// Kind the operation was requested for.
        kind: EntityKind,
        /// Operation name, such as `list`.
        operation: &'static str,
    },
}

/// Statuses through which the backend refuses a payload rather than failing.
fn is_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::NOT_FOUND
            | StatusCode::CONFLICT
            | StatusCode::UNPROCESSABLE_ENTITY
    )
}

impl From<HttpGatewayError> for GatewayError {
    fn from(err: HttpGatewayError) -> Self {
        match err {
            HttpGatewayError::RequestStatus {
                status, detail, ..
            } if is_rejection(status) => GatewayError::Rejected {
                reason: detail.or_else(|| status.canonical_reason().map(str::to_string)),
            },
            HttpGatewayError::RequestStatus { status, detail, .. } => GatewayError::Network {
                reason: detail.or_else(|| Some(format!("status {status}"))),
            },
            HttpGatewayError::DecodeResponse { path, source } => GatewayError::Malformed {
                reason: format!("{path}: {source}"),
            },
            HttpGatewayError::DeserializeValue { path, source } => GatewayError::Malformed {
                reason: format!("{path}: {source}"),
            },
            HttpGatewayError::Unsupported { kind, operation } => {
                GatewayError::Unsupported { kind, operation }
            }
            other => GatewayError::Network {
                reason: Some(other.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_become_rejections_with_detail() {
        let err = HttpGatewayError::RequestStatus {
            path: "/user".into(),
            status: StatusCode::BAD_REQUEST,
            detail: Some("language_id does not exist".into()),
        };
        assert_eq!(
            GatewayError::from(err),
            GatewayError::Rejected {
                reason: Some("language_id does not exist".into())
            }
        );
    }

    #[test]
    fn server_errors_become_network_failures() {
        let err = HttpGatewayError::RequestStatus {
            path: "/all_kahoots".into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: None,
        };
        assert!(matches!(
            GatewayError::from(err),
            GatewayError::Network { reason: Some(_) }
        ));
    }

    #[test]
    fn undecodable_rows_are_malformed() {
        let source = serde_json::from_str::<i64>("\"x\"").unwrap_err();
        let err = HttpGatewayError::DeserializeValue {
            path: "/all_groups".into(),
            source,
        };
        assert!(matches!(GatewayError::from(err), GatewayError::Malformed { .. }));
    }
}
