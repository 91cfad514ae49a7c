//! Server-side export trigger
//!
//! The dashboard server can also build the document itself. This asks it to
//! and saves the returned bytes like a local export would be saved.

use crate::export::Delivery;
use crate::{Error, Result, EXPORT_FILE_NAME};
use log::info;
use reqwest::Client;

pub struct ServerExportClient {
    base_url: String,
    http: Client,
}

impl ServerExportClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Request the server-built document
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        let url = format!("{}/api/export_pdf", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::NetworkError(format!("Failed to generate PDF (HTTP {})", status)));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// Fetch the document and deliver it under the usual export name.
    pub async fn fetch_and_deliver<D: Delivery>(&self, sink: &mut D) -> Result<usize> {
        let bytes = self.fetch().await?;
        info!("Server export returned {} bytes", bytes.len());
        sink.deliver(EXPORT_FILE_NAME, &bytes)?;
        Ok(bytes.len())
    }
}
