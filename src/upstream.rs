//! Upstream HTTP access
//!
//! Shared reqwest client plus the client identity (User-Agent and friends)
//! presented to IPTV panels, both for our own requests and for ffmpeg.

use reqwest::header::{ACCEPT, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, Result};

pub struct Upstream {
    client: Client,
    config: UpstreamConfig,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// GET with the default identity (User-Agent, Origin/Referer if configured)
    pub fn get(&self, url: &str) -> RequestBuilder {
        let mut request = self.get_as(url, &self.config.user_agent);
        if let Some(referer) = &self.config.referer {
            request = request
                .header(ORIGIN, referer.as_str())
                .header(REFERER, referer.as_str());
        }
        request
    }

    /// GET presenting a specific User-Agent only
    pub fn get_as(&self, url: &str, user_agent: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "*/*")
    }

    /// The default identity expressed as ffmpeg input options
    pub fn ffmpeg_identity_args(&self) -> Vec<String> {
        let mut headers = String::from("Accept: */*\r\nConnection: keep-alive\r\n");
        if let Some(referer) = &self.config.referer {
            headers.push_str(&format!("Origin: {}\r\nReferer: {}\r\n", referer, referer));
        }
        vec![
            "-user_agent".to_string(),
            self.config.user_agent.clone(),
            "-headers".to_string(),
            headers,
        ]
    }
}

/// Send a request, bounding only the wait for response headers. The body is
/// left to the caller so long-lived streams are not cut off.
pub async fn send_with_timeout(request: RequestBuilder, timeout: Duration) -> Result<Response> {
    match tokio::time::timeout(timeout, request.send()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(GatewayError::UpstreamUnavailable(format!(
            "no response within {:?}",
            timeout
        ))),
    }
}
