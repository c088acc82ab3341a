use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::storage::{Action, QueueRecord};

use super::NetworkError;

/// Sends one queued mutation to the remote store.
///
/// Implementations report any non-success outcome as an error; the sync
/// manager decides what that means for the record.
#[async_trait]
pub trait RemoteDispatcher: Send + Sync {
    async fn dispatch(&self, record: &QueueRecord) -> Result<(), NetworkError>;
}

/// HTTP request a record maps to.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest<'a> {
    pub method: Method,
    pub url: String,
    pub body: Option<&'a Value>,
}

/// Map a record onto the REST convention of the remote API:
/// `create` posts to the collection, `update` puts to the item and
/// `delete` deletes the item without a body.
pub fn request_for<'a>(api_root: &str, record: &'a QueueRecord) -> RemoteRequest<'a> {
    let collection = format!("{}/{}", api_root.trim_end_matches('/'), record.entity_type);

    match record.action {
        Action::Create => RemoteRequest {
            method: Method::POST,
            url: collection,
            body: Some(&record.data),
        },
        Action::Update => RemoteRequest {
            method: Method::PUT,
            url: format!("{}/{}", collection, record.id),
            body: Some(&record.data),
        },
        Action::Delete => RemoteRequest {
            method: Method::DELETE,
            url: format!("{}/{}", collection, record.id),
            body: None,
        },
    }
}

/// [`RemoteDispatcher`] speaking JSON over HTTP.
pub struct HttpDispatcher {
    client: Client,
    api_root: String,
    auth_token: Option<String>,
}

impl HttpDispatcher {
    pub fn new(config: &RemoteConfig) -> Result<Self, NetworkError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            api_root: config.api_root(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }
}

#[async_trait]
impl RemoteDispatcher for HttpDispatcher {
    async fn dispatch(&self, record: &QueueRecord) -> Result<(), NetworkError> {
        let request = request_for(&self.api_root, record);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url);
        if let Some(body) = request.body {
            builder = builder.json(body);
        }
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NetworkError::StatusError {
                method: request.method.to_string(),
                url: request.url,
                status: status.as_u16(),
            })
        }
    }
}
