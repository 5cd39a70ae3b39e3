use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{RpcError, SyftUrl, DEFAULT_MESSAGE_EXPIRY};

/// Sender of responses synthesized locally while resolving a future.
pub const SYSTEM_SENDER: &str = "SYSTEM";

pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyftMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for SyftMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyftMethod::Get => "GET",
            SyftMethod::Head => "HEAD",
            SyftMethod::Post => "POST",
            SyftMethod::Put => "PUT",
            SyftMethod::Patch => "PATCH",
            SyftMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

impl FromStr for SyftMethod {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(SyftMethod::Get),
            "HEAD" => Ok(SyftMethod::Head),
            "POST" => Ok(SyftMethod::Post),
            "PUT" => Ok(SyftMethod::Put),
            "PATCH" => Ok(SyftMethod::Patch),
            "DELETE" => Ok(SyftMethod::Delete),
            _ => Err(RpcError::InvalidArgument(format!("unknown method: {}", s))),
        }
    }
}

/// HTTP-like status of a response. Serialized as the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum SyftStatus {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    Expired,
    ServerError,
}

impl SyftStatus {
    pub fn code(self) -> u16 {
        match self {
            SyftStatus::Ok => 200,
            SyftStatus::BadRequest => 400,
            SyftStatus::Forbidden => 403,
            SyftStatus::NotFound => 404,
            SyftStatus::Expired => 419,
            SyftStatus::ServerError => 500,
        }
    }

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.code())
    }

    pub fn is_error(self) -> bool {
        self.code() >= 400
    }
}

impl From<SyftStatus> for u16 {
    fn from(status: SyftStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u16> for SyftStatus {
    type Error = RpcError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(SyftStatus::Ok),
            400 => Ok(SyftStatus::BadRequest),
            403 => Ok(SyftStatus::Forbidden),
            404 => Ok(SyftStatus::NotFound),
            419 => Ok(SyftStatus::Expired),
            500 => Ok(SyftStatus::ServerError),
            other => Err(RpcError::InvalidArgument(format!(
                "unsupported status code: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SyftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Fields a message id is derived from.
#[serde_as]
#[derive(Serialize)]
struct IdentityFields<'a> {
    url: &'a SyftUrl,
    method: SyftMethod,
    sender: &'a str,
    headers: &'a Headers,
    #[serde_as(as = "Option<Base64>")]
    body: Option<&'a [u8]>,
}

impl IdentityFields<'_> {
    fn id(&self) -> Uuid {
        // serializing borrowed plain data cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&json);
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyftRequest {
    pub id: Uuid,
    pub sender: String,
    pub url: SyftUrl,
    #[serde(default)]
    pub method: SyftMethod,
    #[serde(default)]
    pub headers: Headers,
    #[serde_as(as = "Option<Base64>")]
    pub body: Option<Vec<u8>>,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl SyftRequest {
    pub fn new(sender: &str, url: SyftUrl, method: SyftMethod) -> Self {
        let created = Utc::now();
        let mut request = Self {
            id: Uuid::nil(),
            sender: sender.to_string(),
            url,
            method,
            headers: Headers::new(),
            body: None,
            created,
            expires: created + Duration::seconds(DEFAULT_MESSAGE_EXPIRY),
        };
        request.id = request.compute_id();
        request
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self.id = self.compute_id();
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self.id = self.compute_id();
        self
    }

    pub fn with_expiry(mut self, expires_in: Duration) -> Self {
        self.expires = self.created + expires_in;
        self
    }

    /// Deterministic id over url, method, sender, headers and body, so an
    /// identical request sent twice maps to the same files.
    pub fn compute_id(&self) -> Uuid {
        IdentityFields {
            url: &self.url,
            method: self.method,
            sender: &self.sender,
            headers: &self.headers,
            body: self.body.as_deref(),
        }
        .id()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RpcError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RpcError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyftResponse {
    /// Id of the request this answers.
    pub id: Uuid,
    pub sender: String,
    pub url: SyftUrl,
    pub status_code: SyftStatus,
    #[serde(default)]
    pub headers: Headers,
    #[serde_as(as = "Option<Base64>")]
    pub body: Option<Vec<u8>>,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl SyftResponse {
    pub fn new(id: Uuid, sender: &str, url: SyftUrl, status_code: SyftStatus) -> Self {
        let created = Utc::now();
        Self {
            id,
            sender: sender.to_string(),
            url,
            status_code,
            headers: Headers::new(),
            body: None,
            created,
            expires: created + Duration::seconds(DEFAULT_MESSAGE_EXPIRY),
        }
    }

    /// Answer to `request` from `sender`.
    pub fn for_request(request: &SyftRequest, sender: &str, status_code: SyftStatus) -> Self {
        Self::new(request.id, sender, request.url.clone(), status_code)
    }

    /// Response synthesized locally for a future that never got a real one.
    pub fn system(id: Uuid, url: SyftUrl, status_code: SyftStatus, message: &str) -> Self {
        Self::new(id, SYSTEM_SENDER, url, status_code).with_body(message)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }

    pub fn raise_for_status(&self) -> Result<&Self, RpcError> {
        if self.status_code.is_error() {
            return Err(RpcError::Status(self.status_code));
        }
        Ok(self)
    }

    /// Body as lossy UTF-8, empty when there is none.
    pub fn text(&self) -> String {
        self.body
            .as_deref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
            .unwrap_or_default()
    }

    /// Decode the body as JSON into the caller's type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        Ok(serde_json::from_slice(self.body.as_deref().unwrap_or(b"null"))?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RpcError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RpcError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> SyftUrl {
        SyftUrl::new("bob@x.org", "api_data/ping/rpc").unwrap()
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = SyftRequest::new("alice@x.org", url(), SyftMethod::Post).with_body("ping");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = SyftRequest::new("alice@x.org", url(), SyftMethod::Post).with_body("ping");
        assert_eq!(a.id, b.id);
        assert_ne!(a.created, b.created);

        let c = SyftRequest::new("alice@x.org", url(), SyftMethod::Post).with_body("pong");
        assert_ne!(a.id, c.id);
        let d = a.clone().with_header("content-type", "text/plain");
        assert_ne!(a.id, d.id);
    }

    #[test]
    fn test_wire_format() {
        let request = SyftRequest::new("alice@x.org", url(), SyftMethod::Put).with_body(vec![1, 2, 3]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "PUT");
        assert_eq!(json["url"], "syft://bob@x.org/api_data/ping/rpc");
        assert_eq!(json["body"], "AQID");
        assert_eq!(SyftRequest::from_bytes(&request.to_bytes().unwrap()).unwrap(), request);

        let response = SyftResponse::for_request(&request, "bob@x.org", SyftStatus::Expired);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status_code"], 419);
        assert_eq!(json["body"], serde_json::Value::Null);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let request = SyftRequest::new("alice@x.org", url(), SyftMethod::Get);
        let mut json = serde_json::to_value(SyftResponse::for_request(&request, "b", SyftStatus::Ok)).unwrap();
        json["status_code"] = 299.into();
        assert!(serde_json::from_value::<SyftResponse>(json).is_err());
    }

    #[test]
    fn test_typed_body() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Pong {
            count: u32,
        }

        let request = SyftRequest::new("alice@x.org", url(), SyftMethod::Get);
        let response = SyftResponse::for_request(&request, "bob@x.org", SyftStatus::Ok)
            .with_body(r#"{"count": 3}"#);
        assert_eq!(response.json::<Pong>().unwrap(), Pong { count: 3 });
        assert_eq!(response.text(), r#"{"count": 3}"#);
        assert!(response.raise_for_status().is_ok());

        let denied = SyftResponse::system(request.id, url(), SyftStatus::Forbidden, "no");
        assert!(matches!(
            denied.raise_for_status(),
            Err(RpcError::Status(SyftStatus::Forbidden))
        ));
        assert_eq!("delete".parse::<SyftMethod>().unwrap(), SyftMethod::Delete);
    }
}
