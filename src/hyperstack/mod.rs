//! Hyperstack implementation of the resource and catalog capabilities.
//!
//! Requests authenticate with the `api_key` header and every response is
//! checked twice: once for an accepted HTTP status and once for the
//! envelope's `status` flag.

mod catalog;
mod envelope;
mod error;
mod resources;
mod types;

use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ApiConfig;
use envelope::Reply;

pub use error::HyperstackError;

/// Base URL of the public Hyperstack API.
pub const DEFAULT_API_BASE: &str = "https://infrahub-api.nexgencloud.com/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const API_KEY_HEADER: &str = "api_key";

/// Backend that drives builds through the Hyperstack infrastructure API.
#[derive(Clone, Debug)]
pub struct HyperstackBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HyperstackBackend {
    /// Constructs a backend authenticating with `api_key` against
    /// `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`HyperstackError::Config`] when the key is empty or the HTTP
    /// client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, HyperstackError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| HyperstackError::Config(err.to_string()))?;
        Self::with_client(http, api_key, base_url)
    }

    /// Constructs a backend from loaded API settings.
    ///
    /// # Errors
    ///
    /// Returns [`HyperstackError::Config`] when no API key is configured.
    pub fn from_config(config: &ApiConfig) -> Result<Self, HyperstackError> {
        let api_key = config
            .require_api_key()
            .map_err(|err| HyperstackError::Config(err.to_string()))?;
        Self::new(api_key, config.api_base_url.as_str())
    }

    pub(crate) fn with_client(
        http: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, HyperstackError> {
        let key = api_key.into();
        if key.trim().is_empty() {
            return Err(HyperstackError::Config(String::from(
                "missing API key: set HYPERSTACK_API_KEY",
            )));
        }
        let base = base_url.into();
        Ok(Self {
            http,
            api_key: key,
            base_url: base.trim_end_matches('/').to_owned(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(
        &self,
        endpoint: String,
        request: RequestBuilder,
    ) -> Result<Reply, HyperstackError> {
        debug!(%endpoint, "Calling Hyperstack API");
        let response = request
            .send()
            .await
            .map_err(|err| HyperstackError::Transport {
                endpoint: endpoint.clone(),
                message: err.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| HyperstackError::Transport {
                endpoint: endpoint.clone(),
                message: err.to_string(),
            })?;
        debug!(%endpoint, status, "Hyperstack API replied");
        Ok(Reply {
            endpoint,
            status,
            body,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HyperstackError> {
        self.send(format!("GET {path}"), self.request(Method::GET, path))
            .await?
            .decode()
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, HyperstackError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync + ?Sized,
    {
        self.send(
            format!("POST {path}"),
            self.request(Method::POST, path).json(body),
        )
        .await?
        .decode()
    }

    async fn delete(&self, path: &str) -> Result<(), HyperstackError> {
        self.send(format!("DELETE {path}"), self.request(Method::DELETE, path))
            .await?
            .accept_delete()
    }
}
