//! reqwest-backed implementations of the remote data-source seams.

use std::{marker::PhantomData, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{ListQuery, ListResult, LoginRequest, LoginResponse, MeResponse},
};
use storage::{keys, KeyValueStore};
use url::Url;

use crate::{config::ClientSettings, list::ListFetcher, session::AuthApi};

pub fn build_http_client(settings: &ClientSettings) -> Result<Client> {
    Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .context("failed to build http client")
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url> {
    base_url
        .join(path.trim_start_matches('/'))
        .with_context(|| format!("invalid endpoint path '{path}'"))
}

async fn send(request: RequestBuilder) -> Result<Response> {
    request
        .send()
        .await
        .map_err(|err| ApiError::transport(err.to_string()).into())
}

/// Parses an auth envelope. Auth endpoints answer rejections with a non-2xx status and a
/// `{success:false}` body, so the body wins whenever it parses.
async fn read_envelope<D: DeserializeOwned>(response: Response, what: &str) -> Result<D> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| ApiError::transport(err.to_string()))?;
    match serde_json::from_slice::<D>(&body) {
        Ok(envelope) => Ok(envelope),
        Err(_) if !status.is_success() => Err(ApiError::new(
            ErrorCode::from_status(status.as_u16()),
            format!("{what} failed with status {status}"),
        )
        .into()),
        Err(err) => Err(err).with_context(|| format!("malformed {what} response")),
    }
}

pub struct HttpAuthApi {
    http: Client,
    base_url: Url,
}

impl HttpAuthApi {
    pub fn new(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let url = endpoint(&self.base_url, "auth/login")?;
        let response = send(self.http.post(url).json(request)).await?;
        read_envelope(response, "login").await
    }

    async fn me(&self, token: &str) -> Result<MeResponse> {
        let url = endpoint(&self.base_url, "auth/me")?;
        let response = send(self.http.get(url).bearer_auth(token)).await?;
        read_envelope(response, "identity check").await
    }
}

/// Fetches pages from `GET {base}/{resource}` with the query flattened into the URL.
/// The bearer token is read from the store on every call.
pub struct HttpListFetcher<T> {
    http: Client,
    base_url: Url,
    resource: String,
    store: Arc<dyn KeyValueStore>,
    _item: PhantomData<fn() -> T>,
}

impl<T> HttpListFetcher<T> {
    pub fn new(
        http: Client,
        base_url: Url,
        resource: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            http,
            base_url,
            resource: resource.into(),
            store,
            _item: PhantomData,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

#[async_trait]
impl<T, F> ListFetcher<T, F> for HttpListFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
    F: Serialize + Send + 'static,
{
    async fn fetch(&self, query: ListQuery<F>) -> Result<ListResult<T>> {
        let url = endpoint(&self.base_url, &self.resource)?;
        let pairs = query
            .query_pairs()
            .context("failed to encode list query")?;

        let mut request = self.http.get(url).query(&pairs);
        if let Some(token) = self.store.get(keys::ACCESS_TOKEN).await? {
            request = request.bearer_auth(token);
        }

        let response = send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::new(
                ErrorCode::from_status(status.as_u16()),
                format!("listing {} failed with status {status}", self.resource),
            )
            .into());
        }
        response
            .json::<ListResult<T>>()
            .await
            .with_context(|| format!("malformed {} page", self.resource))
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
