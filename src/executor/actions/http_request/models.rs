use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationType {
    #[default]
    NoAuth,
    /// `Authorization: Bearer <secret>`
    Bearer,
    /// `Authorization: Basic <secret>`, a `user:password` secret is base64 encoded
    Basic,
    /// raw secret in the configured header
    Header,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
pub enum HttpRequestMethod {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    None,
    Text,
    Json,
    #[serde(rename = "urlencoded")]
    UrlEncoded,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub auth_type: AuthorizationType,
    /// logical name of the secret holding the credential
    #[serde(default)]
    pub secret: Option<String>,
    /// header name, defaults to `Authorization`
    #[serde(default)]
    pub header: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpBody {
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub data: Option<JsonValue>,
}

fn default_timeout() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct HttpRequestConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpRequestMethod,
    #[serde(default)]
    pub auth: AuthorizationConfig,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: HttpBody,
    /// request timeout in milliseconds, capped by the node deadline
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}
