//! Blob storage REST driver.
//!
//! Implements [`BlobStore`] over the vendor's blob REST API. All requests
//! authenticate with SAS tokens minted from the account key (see
//! [`super::sas`]), so no request signing state is shared beyond the key
//! itself.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use url::{form_urlencoded, Url};

use super::sas::{self, SasScope, SAS_VERSION};
use crate::config::AccountConfig;
use crate::core::{BlobInfo, BlobStore, CopyState, CopyStatus, Page, SasPermissions};
use crate::error::{ReplicateError, Result};

/// Timeout for single-shot requests (listing pages, properties, block
/// uploads). Streaming reads are bounded by the transfer-level timeout
/// instead.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Lifetime of the SAS tokens minted for the client's own requests.
const INTERNAL_SAS_TTL: Duration = Duration::from_secs(60 * 60);

/// Buffered chunks between the HTTP read pump and the consumer.
const READ_CHANNEL_DEPTH: usize = 8;

/// One storage account, addressed by name and authenticated by account key.
pub struct StorageAccount {
    http: reqwest::Client,
    name: String,
    key: String,
    endpoint_suffix: String,
}

impl StorageAccount {
    /// Build a storage client for the account described in the configuration.
    pub fn new(config: &AccountConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            name: config.storage_account_name.clone(),
            key: config.storage_account_key.clone(),
            endpoint_suffix: config.storage_endpoint_suffix.clone(),
        })
    }

    /// Bare URL of a container or blob, without query parameters.
    fn object_url(&self, container: &str, blob: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&format!("https://{}.blob.{}", self.name, self.endpoint_suffix))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ReplicateError::Sas("storage endpoint is not a base URL".into()))?;
            segments.push(container);
            if let Some(blob) = blob {
                // Blob names may contain '/' separators; each segment is
                // percent-encoded individually so the separators survive.
                for part in blob.split('/') {
                    segments.push(part);
                }
            }
        }
        Ok(url)
    }

    fn sas_query(
        &self,
        container: &str,
        blob: Option<&str>,
        permissions: SasPermissions,
        expires_in: Duration,
    ) -> Result<String> {
        sas::generate(
            &self.key,
            &SasScope {
                account: &self.name,
                container,
                blob,
            },
            permissions,
            expires_in,
        )
    }

    /// URL carrying a SAS for the client's own requests, with extra query
    /// pairs appended after the token.
    fn request_url(
        &self,
        container: &str,
        blob: Option<&str>,
        permissions: SasPermissions,
        extra: &[(&str, &str)],
    ) -> Result<Url> {
        let mut url = self.object_url(container, blob)?;
        let mut query = self.sas_query(container, blob, permissions, INTERNAL_SAS_TTL)?;
        if !extra.is_empty() {
            let tail: String = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(extra)
                .finish();
            query.push('&');
            query.push_str(&tail);
        }
        url.set_query(Some(&query));
        Ok(url)
    }
}

/// Surface a non-success response as a storage error with the body attached.
async fn check_response(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    body.truncate(512);
    Err(ReplicateError::storage(operation, status, body))
}

fn header_str<'a>(response: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl BlobStore for StorageAccount {
    fn account_name(&self) -> &str {
        &self.name
    }

    async fn list_blobs_page(
        &self,
        container: &str,
        marker: Option<&str>,
    ) -> Result<Page<BlobInfo>> {
        let mut extra = vec![("restype", "container"), ("comp", "list")];
        if let Some(marker) = marker {
            extra.push(("marker", marker));
        }
        let url = self.request_url(container, None, SasPermissions::read_list(), &extra)?;

        let response = self
            .http
            .get(url)
            .header("x-ms-version", SAS_VERSION)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let response = check_response("ListBlobs", response).await?;
        let body = response.text().await?;

        let listing: ListBlobsResponse = quick_xml::de::from_str(&body)?;
        let items = listing
            .blobs
            .map(|b| b.blob)
            .unwrap_or_default()
            .into_iter()
            .map(|b| BlobInfo {
                name: b.name,
                size: b.properties.content_length.unwrap_or(0),
            })
            .collect();

        Ok(Page {
            items,
            next: listing.next_marker.filter(|m| !m.is_empty()),
        })
    }

    fn blob_sas_url(
        &self,
        container: &str,
        blob: &str,
        permissions: SasPermissions,
        expires_in: Duration,
    ) -> Result<String> {
        let mut url = self.object_url(container, Some(blob))?;
        let query = self.sas_query(container, Some(blob), permissions, expires_in)?;
        url.set_query(Some(&query));
        Ok(url.into())
    }

    fn container_sas_url(
        &self,
        container: &str,
        permissions: SasPermissions,
        expires_in: Duration,
    ) -> Result<String> {
        let mut url = self.object_url(container, None)?;
        let query = self.sas_query(container, None, permissions, expires_in)?;
        url.set_query(Some(&query));
        Ok(url.into())
    }

    async fn begin_copy_from_url(
        &self,
        container: &str,
        blob: &str,
        source_url: &str,
    ) -> Result<()> {
        let url = self.request_url(container, Some(blob), SasPermissions::create_write(), &[])?;

        let response = self
            .http
            .put(url)
            .header("x-ms-version", SAS_VERSION)
            .header("x-ms-copy-source", source_url)
            .header("Content-Length", "0")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check_response("StartServerSideCopy", response).await?;
        debug!(container, blob, "server-side copy accepted");
        Ok(())
    }

    async fn copy_state(&self, container: &str, blob: &str) -> Result<CopyState> {
        let url = self.request_url(container, Some(blob), SasPermissions::read_list(), &[])?;

        let response = self
            .http
            .head(url)
            .header("x-ms-version", SAS_VERSION)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let response = check_response("GetBlobProperties", response).await?;

        let status = header_str(&response, "x-ms-copy-status")
            .and_then(CopyStatus::parse)
            .ok_or_else(|| {
                ReplicateError::storage(
                    "GetBlobProperties",
                    response.status().as_u16(),
                    format!("blob {}/{} has no copy state", container, blob),
                )
            })?;

        let (bytes_copied, bytes_total) = header_str(&response, "x-ms-copy-progress")
            .and_then(parse_copy_progress)
            .map_or((None, None), |(c, t)| (Some(c), Some(t)));

        Ok(CopyState {
            status,
            description: header_str(&response, "x-ms-copy-status-description").map(String::from),
            bytes_copied,
            bytes_total,
        })
    }

    async fn open_read(
        &self,
        container: &str,
        blob: &str,
    ) -> Result<mpsc::Receiver<Result<Bytes>>> {
        let url = self.request_url(container, Some(blob), SasPermissions::read_list(), &[])?;

        let response = self
            .http
            .get(url)
            .header("x-ms-version", SAS_VERSION)
            .send()
            .await?;
        let response = check_response("GetBlob", response).await?;

        let (tx, rx) = mpsc::channel(READ_CHANNEL_DEPTH);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(ReplicateError::from);
                if tx.send(chunk).await.is_err() {
                    // Consumer hung up; stop pulling bytes.
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn put_block(
        &self,
        container: &str,
        blob: &str,
        block_id: &str,
        data: Bytes,
    ) -> Result<()> {
        let url = self.request_url(
            container,
            Some(blob),
            SasPermissions::create_write(),
            &[("comp", "block"), ("blockid", block_id)],
        )?;

        let response = self
            .http
            .put(url)
            .header("x-ms-version", SAS_VERSION)
            .body(data)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check_response("PutBlock", response).await?;
        Ok(())
    }

    async fn commit_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[String],
    ) -> Result<()> {
        let url = self.request_url(
            container,
            Some(blob),
            SasPermissions::create_write(),
            &[("comp", "blocklist")],
        )?;

        let response = self
            .http
            .put(url)
            .header("x-ms-version", SAS_VERSION)
            .header("Content-Type", "application/xml")
            .body(block_list_body(block_ids))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check_response("PutBlockList", response).await?;
        Ok(())
    }
}

/// The copy-progress header is `"{copied}/{total}"`.
fn parse_copy_progress(value: &str) -> Option<(u64, u64)> {
    let (copied, total) = value.split_once('/')?;
    Some((copied.parse().ok()?, total.parse().ok()?))
}

fn block_list_body(block_ids: &[String]) -> String {
    let mut body = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for id in block_ids {
        body.push_str("<Latest>");
        body.push_str(id);
        body.push_str("</Latest>");
    }
    body.push_str("</BlockList>");
    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBlobsResponse {
    blobs: Option<BlobsNode>,
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobsNode {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobNode {
    name: String,
    #[serde(default)]
    properties: BlobPropertiesNode,
}

#[derive(Debug, Default, Deserialize)]
struct BlobPropertiesNode {
    #[serde(rename = "Content-Length")]
    content_length: Option<u64>,
}
