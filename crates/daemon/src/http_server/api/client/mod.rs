#[allow(clippy::module_inception)]
mod client;
mod error;
mod remote;

pub use client::ApiClient;
pub use error::ApiError;
pub use remote::HttpRemote;

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError>;
}
