/// Gateway talking to the quiz backend over HTTP.
#[cfg(feature = "http-gateway")]
pub mod http;
pub mod memory;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::model::{CollectionKey, Entity, EntityKind, Payload, ServerId};

/// Result alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Backend-neutral failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Backend unreachable or answered with a non-success status.
    #[error("backend unavailable: {}", reason.as_deref().unwrap_or("no reason given"))]
    Network {
        /// Reason reported by the transport or the backend, if any.
        reason: Option<String>,
    },
    /// Backend refused the request payload.
    #[error("backend rejected request: {}", reason.as_deref().unwrap_or("no reason given"))]
    Rejected {
        /// Reason reported by the backend, if any.
        reason: Option<String>,
    },
    /// Response could not be converted into typed records.
    #[error("malformed backend response: {reason}")]
    Malformed {
        /// What did not decode.
        reason: String,
    },
    /// Backend has no endpoint for this operation on this kind.
    #[error("backend cannot {operation} {kind} records")]
    Unsupported {
        /// Kind addressed.
        kind: EntityKind,
        /// Operation attempted.
        operation: &'static str,
    },
}

/// Remote collection backend consumed by the synchronisation engine.
///
/// Every payload leaving a gateway is already typed; raw JSON never travels further in.
pub trait CollectionGateway: Send + Sync {
    /// Whether [`CollectionGateway::fetch`] can list entities of `kind`.
    fn supports_fetch(&self, kind: EntityKind) -> bool;
    /// List the authoritative contents of a collection, in backend order.
    fn fetch(&self, collection: CollectionKey) -> BoxFuture<'static, GatewayResult<Vec<Entity>>>;
    /// Create a record, returning the backend id when the response carries one.
    fn create(&self, payload: Payload) -> BoxFuture<'static, GatewayResult<Option<ServerId>>>;
    /// Delete the record known to the backend as `id`; `payload` selects the endpoint.
    fn delete(&self, id: ServerId, payload: Payload) -> BoxFuture<'static, GatewayResult<()>>;
}
