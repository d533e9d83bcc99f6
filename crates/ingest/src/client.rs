use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use url::Url;

use repomirror_types::{retry, HostingApi, HostingConfig, MirrorError, Result, RetryPolicy};

/// Authenticated JSON client for the hosting REST API.
pub struct HostingClient {
    client: Client,
    root: Url,
    retry: RetryPolicy,
}

impl HostingClient {
    pub fn new(config: &HostingConfig, retry: RetryPolicy) -> Result<Self> {
        let root = Url::parse(&config.api_endpoint).map_err(|e| {
            MirrorError::Config(format!(
                "hosting.api_endpoint '{}' is not a URL: {e}",
                config.api_endpoint
            ))
        })?;
        if root.cannot_be_a_base() {
            return Err(MirrorError::Config(format!(
                "hosting.api_endpoint '{}' cannot carry a path",
                config.api_endpoint
            )));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token)).map_err(|_| {
            MirrorError::Config("hosting.token contains characters not allowed in a header".into())
        })?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            root,
            retry,
        })
    }

    /// `root/segment/...?params`, each segment percent-encoded on its own.
    pub fn url(&self, segments: &[String], params: &[(String, String)]) -> Url {
        let mut url = self.root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        url
    }
}

impl HostingApi for HostingClient {
    fn get(&self, segments: &[String], params: &[(String, String)]) -> Result<Value> {
        let url = self.url(segments, params);
        let endpoint = format!("/{}", segments.join("/"));
        retry(self.retry, &endpoint, || {
            let response = self.client.get(url.clone()).send()?;
            let status = response.status();
            if !status.is_success() {
                tracing::error!(
                    endpoint = %endpoint,
                    status = status.as_u16(),
                    "hosting request stopped with response code {}",
                    status.as_u16()
                );
                return Err(MirrorError::Status {
                    endpoint: endpoint.clone(),
                    status: status.as_u16(),
                });
            }
            response.json::<Value>().map_err(|e| MirrorError::Decode {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })
        })
    }
}
