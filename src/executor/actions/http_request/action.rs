use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde_json::Value;

use crate::{
    ExecutionContext, NodeError, Secrets,
    executor::{Executor, NodeResult, actions::parse_config, template},
};

use super::models::*;

const STATUS_CODE_KEY: &str = "status_code";
const BODY_KEY: &str = "body";
const HEADERS_KEY: &str = "headers";

fn invalid(err: impl std::fmt::Display) -> NodeError {
    NodeError::configuration(err.to_string())
}

/// Calls an HTTP endpoint.
///
/// Output: `{status_code, headers, body}`; a JSON response body is parsed,
/// anything else is returned as text. A status of 400 or above fails the
/// attempt with a retryable execution error.
pub struct HttpRequestAction {
    client: reqwest::Client,
}

impl Default for HttpRequestAction {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequestAction {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Apply authorization headers based on auth config
    fn apply_auth_headers(
        auth: &AuthorizationConfig,
        secrets: &Secrets,
        headers: &mut HeaderMap,
    ) -> Result<(), NodeError> {
        if auth.auth_type == AuthorizationType::NoAuth {
            return Ok(());
        }

        let name = auth.secret.as_deref().ok_or_else(|| NodeError::configuration("auth.secret is required for authorization"))?;
        let credential = secrets.get(name).ok_or_else(|| NodeError::MissingSecret {
            key: name.to_string(),
        })?;

        // Default header name is "Authorization"
        let header_name = auth.header.as_deref().unwrap_or("Authorization");
        let header_key: HeaderName = header_name.parse().map_err(invalid)?;

        let header_value = match auth.auth_type {
            AuthorizationType::Bearer => format!("Bearer {}", credential),
            AuthorizationType::Basic => {
                let encoded = if credential.contains(':') {
                    STANDARD.encode(credential.as_bytes())
                } else {
                    credential.to_string()
                };
                format!("Basic {}", encoded)
            }
            AuthorizationType::Header | AuthorizationType::NoAuth => credential.to_string(),
        };

        let mut value: HeaderValue = header_value.parse().map_err(|err: InvalidHeaderValue| invalid(err))?;
        value.set_sensitive(true);
        headers.insert(header_key, value);
        Ok(())
    }

    fn build_request(
        &self,
        config: &HttpRequestConfig,
        input: &Value,
        secrets: &Secrets,
        ctx: &ExecutionContext,
    ) -> Result<reqwest::RequestBuilder, NodeError> {
        let resolved_url = template::resolve_template(input, secrets, &config.url)?;

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));

        Self::apply_auth_headers(&config.auth, secrets, &mut headers)?;

        for (key, value) in &config.headers {
            let resolved_value = template::resolve_template(input, secrets, value)?;
            headers.insert(key.parse::<HeaderName>().map_err(invalid)?, resolved_value.parse().map_err(|err: InvalidHeaderValue| invalid(err))?);
        }

        let mut query = BTreeMap::new();
        for (key, value) in &config.params {
            query.insert(key.clone(), template::resolve_template(input, secrets, value)?);
        }

        let method: reqwest::Method = config.method.as_ref().parse().map_err(invalid)?;
        let mut request = self.client.request(method, &resolved_url).headers(headers).query(&query);

        match config.body.content_type {
            ContentType::None => {}
            ContentType::Text => {
                if let Some(text) = &config.body.data {
                    let data = text.as_str().ok_or_else(|| NodeError::configuration("content_type did not match the body content"))?;
                    request = request.body(template::resolve_template(input, secrets, data)?);
                }
            }
            ContentType::Json => {
                if let Some(json) = &config.body.data {
                    request = request.json(&template::resolve_json_value(input, secrets, json)?);
                }
            }
            ContentType::UrlEncoded => {
                if let Some(form) = &config.body.data {
                    let resolved = template::resolve_json_value(input, secrets, form)?;
                    let data = resolved.as_object().ok_or_else(|| NodeError::configuration("content_type did not match the body content"))?;
                    request = request.form(data);
                }
            }
        }

        let mut timeout = Duration::from_millis(config.timeout);
        if let Some(remaining) = ctx.remaining() {
            timeout = timeout.min(remaining);
        }
        Ok(request.timeout(timeout))
    }

    async fn send(
        request: reqwest::RequestBuilder,
        ctx: &ExecutionContext,
    ) -> NodeResult {
        let res = request.send().await.map_err(|err| NodeError::execution(format!("http error: {}", err)))?;

        let status = res.status();
        let headers: serde_json::Map<String, Value> = res.headers().iter().map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or_default().to_string()))).collect();
        let is_json = res.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).is_some_and(|v| v.contains("json"));
        let text = res.text().await.map_err(|err| NodeError::execution(err.to_string()))?;

        ctx.emit_log(format!("HTTP {} ({} bytes)", status.as_u16(), text.len()));
        if status.as_u16() >= 400 {
            let snippet: String = text.chars().take(200).collect();
            return Err(NodeError::execution(format!("HTTP {}: {}", status.as_u16(), snippet)));
        }

        let body = if is_json { serde_json::from_str(&text).unwrap_or(Value::String(text)) } else { Value::String(text) };

        let mut outputs = serde_json::Map::new();
        outputs.insert(STATUS_CODE_KEY.to_string(), status.as_u16().into());
        outputs.insert(HEADERS_KEY.to_string(), Value::Object(headers));
        outputs.insert(BODY_KEY.to_string(), body);
        Ok(Value::Object(outputs))
    }
}

#[async_trait]
impl Executor for HttpRequestAction {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Request URL, supports {{#port.key#}} and {{$secret$}} placeholders"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                },
                "auth": {
                    "type": "object",
                    "properties": {
                        "auth_type": {
                            "type": "string",
                            "enum": ["no_auth", "bearer", "basic", "header"]
                        },
                        "secret": { "type": ["string", "null"] },
                        "header": { "type": ["string", "null"] }
                    }
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "params": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "body": {
                    "type": "object",
                    "properties": {
                        "content_type": {
                            "type": "string",
                            "enum": ["none", "text", "json", "urlencoded"]
                        },
                        "data": {}
                    }
                },
                "timeout": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Request timeout in milliseconds"
                }
            }
        })
    }

    async fn execute(
        &self,
        input: Value,
        config: &Value,
        secrets: &Secrets,
        ctx: &ExecutionContext,
    ) -> NodeResult {
        let config: HttpRequestConfig = parse_config(config)?;
        let request = self.build_request(&config, &input, secrets, ctx)?;

        tokio::select! {
            _ = ctx.cancelled() => Err(NodeError::Cancelled),
            res = Self::send(request, ctx) => res,
        }
    }
}
