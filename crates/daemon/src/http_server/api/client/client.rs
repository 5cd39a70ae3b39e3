use reqwest::{header::HeaderMap, header::HeaderValue, Client};
use url::Url;

use super::error::ApiError;
use super::ApiRequest;
use crate::http_server::api::v0::sync::IDENTITY_HEADER;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        Self::build(remote, HeaderMap::new())
    }

    /// Client whose every request is made as `identity`.
    pub fn with_identity(remote: &Url, identity: &str) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(identity).map_err(|_| {
            ApiError::HttpStatus(
                reqwest::StatusCode::BAD_REQUEST,
                format!("identity is not a valid header value: {:?}", identity),
            )
        })?;
        headers.insert(IDENTITY_HEADER, value);
        Self::build(remote, headers)
    }

    fn build(remote: &Url, mut default_headers: HeaderMap) -> Result<Self, ApiError> {
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = request_builder.send().await?;

        if response.status().is_success() {
            Ok(response.json::<T::Response>().await?)
        } else {
            Err(ApiError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
