//! HTTP client shared by every download task.

use std::time::Duration;

use reqwest::{header, Client, Response};
use tokio::time::sleep;

use crate::config::RequestConfig;
use crate::error::{Error, Result};

/// Timeout for JSON-RPC calls to the delegate daemon.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser-like headers sent with every request.
const DEFAULT_HEADERS: [(&str, &str); 4] = [
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    ("accept-charset", "UTF-8,*;q=0.5"),
    ("accept-language", "en-US,en;q=0.8"),
    ("user-agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_13_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/69.0.3497.81 Safari/537.36"),
];

/// HTTP client with header injection and fixed-delay retry.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_times: u32,
    retry_delay: Duration,
    cookie: Option<String>,
    user_agent: Option<String>,
    refer: Option<String>,
}

impl HttpClient {
    /// Build a client from the `[request]` configuration section.
    pub fn new(config: &RequestConfig) -> Result<Self> {
        let mut defaults = header::HeaderMap::new();
        for (name, value) in DEFAULT_HEADERS {
            defaults.insert(name, header::HeaderValue::from_static(value));
        }

        let client = Client::builder()
            .default_headers(defaults)
            .gzip(true)
            .deflate(true)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry_times: config.retry_times.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            cookie: config.cookie.clone().filter(|c| !c.is_empty()),
            user_agent: config.user_agent.clone().filter(|u| !u.is_empty()),
            refer: config.refer.clone().filter(|r| !r.is_empty()),
        })
    }

    /// Issue a GET with the configured headers, retrying transport errors and
    /// HTTP error statuses.
    ///
    /// `headers` override the defaults. Without an explicit `Referer` the request
    /// URL is used, unless a fixed referer is configured.
    pub async fn send(&self, url: &str, headers: header::HeaderMap) -> Result<Response> {
        let headers = self.build_headers(url, headers)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            tracing::debug!("GET {} (attempt {}/{})", url, attempt, self.retry_times);

            let err = match self.execute(url, headers.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if attempt >= self.retry_times {
                return Err(err);
            }
            tracing::debug!("{}, retrying in {:?}", err, self.retry_delay);
            sleep(self.retry_delay).await;
        }
    }

    /// Issue a single GET with the configured headers.
    ///
    /// Callers that run their own retry loop, such as ranged byte fetches, use
    /// this instead of [`HttpClient::send`].
    pub async fn send_once(&self, url: &str, headers: header::HeaderMap) -> Result<Response> {
        let headers = self.build_headers(url, headers)?;
        self.execute(url, headers).await
    }

    async fn execute(&self, url: &str, headers: header::HeaderMap) -> Result<Response> {
        match self.client.get(url).headers(headers).send().await {
            Ok(response) if response.status().as_u16() < 400 => Ok(response),
            Ok(response) => Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            }),
            Err(e) => Err(Error::Request {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Fetch a whole body, decoded.
    pub async fn get_bytes(&self, url: &str, refer: &str) -> Result<Vec<u8>> {
        let response = self.send(url, referer_header(refer)?).await?;
        let bytes = response.bytes().await.map_err(|e| Error::Request {
            url: url.to_string(),
            message: format!("failed to read body: {}", e),
        })?;
        Ok(bytes.to_vec())
    }

    /// Response headers of a GET to `url`.
    pub async fn headers(&self, url: &str, refer: &str) -> Result<header::HeaderMap> {
        let response = self.send(url, referer_header(refer)?).await?;
        Ok(response.headers().clone())
    }

    /// Probe the `Content-Length` of `url`.
    pub async fn content_length(&self, url: &str, refer: &str) -> Result<u64> {
        let headers = self.headers(url, refer).await?;
        let value = headers
            .get(header::CONTENT_LENGTH)
            .ok_or_else(|| Error::Request {
                url: url.to_string(),
                message: "Content-Length is missing".into(),
            })?;
        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| Error::Request {
                url: url.to_string(),
                message: format!("invalid Content-Length {:?}", value),
            })
    }

    /// Probe the media type of `url`, without parameters.
    pub async fn content_type(&self, url: &str, refer: &str) -> Result<String> {
        let headers = self.headers(url, refer).await?;
        let value = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Request {
                url: url.to_string(),
                message: "Content-Type is missing".into(),
            })?;
        Ok(value.split(';').next().unwrap_or(value).trim().to_string())
    }

    /// POST a JSON body, without retries.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .timeout(RPC_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    fn build_headers(
        &self,
        url: &str,
        overrides: header::HeaderMap,
    ) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();

        if let Some(cookie) = &self.cookie {
            headers.insert(header::COOKIE, header_value(cookie)?);
        }
        if let Some(user_agent) = &self.user_agent {
            headers.insert(header::USER_AGENT, header_value(user_agent)?);
        }
        headers.insert(header::REFERER, header_value(url)?);

        for (name, value) in overrides.iter() {
            headers.insert(name.clone(), value.clone());
        }

        if let Some(refer) = &self.refer {
            headers.insert(header::REFERER, header_value(refer)?);
        }

        Ok(headers)
    }
}

/// A header map holding only `Referer`, or nothing when `refer` is empty.
pub fn referer_header(refer: &str) -> Result<header::HeaderMap> {
    let mut headers = header::HeaderMap::new();
    if !refer.is_empty() {
        headers.insert(header::REFERER, header_value(refer)?);
    }
    Ok(headers)
}

fn header_value(value: &str) -> Result<header::HeaderValue> {
    header::HeaderValue::from_str(value)
        .map_err(|_| Error::Config(format!("Invalid header value: {}", value)))
}
