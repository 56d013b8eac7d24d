//! HTTP transport seam
//!
//! The dispatcher only needs "send this request, give me status, headers and
//! body". Tests substitute a scripted transport.

use async_trait::async_trait;
use chat_common::{BotToken, RestConfig};
use reqwest::header::{HeaderValue, AUTHORIZATION};

use crate::error::TransportError;
use crate::routes::{Request, RestResponse};

/// Sends one request and returns the response whatever its status
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn send(&self, request: &Request) -> Result<RestResponse, TransportError>;
}

/// `reqwest`-backed transport with bot authorization
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    authorization: HeaderValue,
}

impl ReqwestTransport {
    pub fn new(config: &RestConfig, token: &BotToken) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;

        let mut authorization = HeaderValue::from_str(&token.authorization())
            .map_err(|_| TransportError::Other("bot token is not a valid header value".into()))?;
        authorization.set_sensitive(true);

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<RestResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.into(), self.url(&request.path))
            .header(AUTHORIZATION, self.authorization.clone());

        if let Some(reason) = &request.reason {
            let encoded: String = url::form_urlencoded::byte_serialize(reason.as_bytes()).collect();
            builder = builder.header("X-Audit-Log-Reason", encoded);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        tracing::trace!(
            method = %request.method,
            path = %request.path,
            status,
            bytes = body.len(),
            "HTTP response"
        );

        Ok(RestResponse {
            status,
            headers,
            body,
        })
    }
}
