use futures::future::BoxFuture;
use reqwest::{Client, Method, Response, Url};
use serde_json::Value;
use tracing::debug;

use crate::{
    gateway::{CollectionGateway, GatewayError, GatewayResult},
    model::{CollectionKey, Entity, EntityKind, Payload, ServerId},
};

use super::{
    config::HttpGatewayConfig,
    error::{HttpGatewayError, HttpResult},
    models::{create_request, created_id, decode_rows, delete_segments, error_detail, list_path},
};

/// Gateway talking JSON to the quiz backend.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    /// Build the HTTP client for the configured backend.
    pub fn new(config: HttpGatewayConfig) -> HttpResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| HttpGatewayError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    fn url<S: AsRef<str>>(&self, segments: &[S]) -> HttpResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| HttpGatewayError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> HttpResult<Response> {
        let path = url.path().to_string();
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| HttpGatewayError::RequestSend {
                path: path.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response.text().await.ok().and_then(|body| error_detail(&body));
        Err(HttpGatewayError::RequestStatus {
            path,
            status,
            detail,
        })
    }

    /// Read a success body as JSON, treating an empty body as `null`.
    async fn read_json(response: Response) -> HttpResult<Value> {
        let path = response.url().path().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| HttpGatewayError::DecodeResponse {
                path: path.clone(),
                source,
            })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|source| HttpGatewayError::DeserializeValue { path, source })
    }

    async fn list(&self, collection: CollectionKey) -> HttpResult<Vec<Entity>> {
        let path = list_path(collection).ok_or(HttpGatewayError::Unsupported {
            kind: collection.kind,
            operation: "list",
        })?;

        let response = self.send(Method::GET, self.url(&[path])?, None).await?;
        let body = Self::read_json(response).await?;
        let entities = decode_rows(collection.kind, path, body)?;
        debug!(%collection, count = entities.len(), "fetched collection");
        Ok(entities)
    }

    async fn post(&self, payload: &Payload) -> HttpResult<Option<ServerId>> {
        let (path, body) = create_request(payload)?;
        let response = self
            .send(Method::POST, self.url(&[path])?, Some(&body))
            .await?;
        let body = Self::read_json(response).await?;
        let id = created_id(&body);
        debug!(kind = %payload.kind(), id = ?id, "created record");
        Ok(id)
    }

    async fn remove(&self, id: ServerId, payload: &Payload) -> HttpResult<()> {
        let url = self.url(&delete_segments(id, payload))?;
        self.send(Method::DELETE, url, None).await?;
        debug!(kind = %payload.kind(), %id, "deleted record");
        Ok(())
    }
}

impl CollectionGateway for HttpGateway {
    fn supports_fetch(&self, kind: EntityKind) -> bool {
        list_path(CollectionKey::root(kind)).is_some()
    }

    fn fetch(&self, collection: CollectionKey) -> BoxFuture<'static, GatewayResult<Vec<Entity>>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.list(collection).await.map_err(GatewayError::from) })
    }

    fn create(&self, payload: Payload) -> BoxFuture<'static, GatewayResult<Option<ServerId>>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.post(&payload).await.map_err(GatewayError::from) })
    }

    fn delete(&self, id: ServerId, payload: Payload) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.remove(id, &payload).await.map_err(GatewayError::from) })
    }
}
