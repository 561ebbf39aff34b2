//! Handing a stream's parts to an aria2 daemon over JSON-RPC.

use serde_json::{json, Value};

use crate::config::Aria2Config;
use crate::error::{Error, Result};
use crate::fs::part_file_name;
use crate::http::HttpClient;
use crate::media::Stream;

/// Client for the `aria2.addUri` RPC.
#[derive(Clone)]
pub struct Aria2Client {
    client: HttpClient,
    endpoint: String,
    token: String,
}

impl Aria2Client {
    pub fn new(client: HttpClient, config: &Aria2Config) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: config.endpoint()?,
            token: config.token.clone(),
        })
    }

    /// Queue every part of `stream` as `<title>[i].<ext>` and return how many
    /// were queued. The daemon's progress is not tracked.
    pub async fn dispatch(&self, title: &str, stream: &Stream, refer: &str) -> Result<usize> {
        for (i, part) in stream.parts.iter().enumerate() {
            let out = part_file_name(title, i, &part.ext);
            self.add_uri(&part.url, &out, refer).await?;
            tracing::info!("Queued {} on aria2", out);
        }
        Ok(stream.parts.len())
    }

    /// Queue one URL. The response body is not inspected.
    pub async fn add_uri(&self, url: &str, out: &str, refer: &str) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let body = add_uri_request(&id, &self.token, url, out, refer);

        self.client
            .post_json(&self.endpoint, &body)
            .await
            .map_err(|e| Error::Delegate(format!("addUri {} failed: {}", url, e)))?;
        Ok(())
    }
}

/// JSON-RPC body of an `aria2.addUri` call.
pub fn add_uri_request(id: &str, token: &str, url: &str, out: &str, refer: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "aria2.addUri",
        "params": [
            format!("token:{}", token),
            [url],
            {
                "out": out,
                "header": [format!("Referer: {}", refer)],
            },
        ],
    })
}
