use anyhow::Result;
use log::info;
use reqwest::blocking::Client;

use crate::{error::ProvisionError, services::ScriptFetcher};

/// Plain HTTP(S) GET with redirects followed, like `curl -fL`.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<HttpFetcher> {
        let client = Client::builder()
            .user_agent(concat!("provision/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(HttpFetcher { client })
    }
}

impl ScriptFetcher for HttpFetcher {
    fn fetch(&mut self, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |reason: String| ProvisionError::Fetch {
            url: url.into(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| fetch_error(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("server responded with {}", status)).into());
        }

        let body = response
            .bytes()
            .map_err(|err| fetch_error(err.to_string()))?;
        info!("fetched {} bytes from {}", body.len(), url);

        Ok(body.to_vec())
    }
}
