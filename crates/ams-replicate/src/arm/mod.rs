//! Management API driver.
//!
//! [`ArmClient`] owns the HTTP client, token provider and the media
//! account's provider URL; [`ResourceClient`] is the generic
//! [`ResourceOperations`] implementation, instantiated once per resource
//! kind (including nested kinds such as asset filters and live outputs).

mod auth;
pub mod models;

pub use auth::TokenProvider;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::AccountConfig;
use crate::core::{NamedResource, Page, ResourceOperations};
use crate::error::{ReplicateError, Result};
use models::{
    AccountFilter, Asset, AssetFilter, ContentKeyPolicy, ContentKeyPolicyProperties, LiveEvent,
    LiveOutput, StreamingEndpoint, StreamingLocator, Transform,
};

/// Media services API version used for every request.
pub const API_VERSION: &str = "2021-11-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One listing page as returned by the management API.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct ArmPage<T> {
    #[serde(default)]
    value: Vec<T>,

    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// Typed client for one media account's management surface.
pub struct ArmClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    /// `{arm_endpoint}/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Media/mediaServices/{account}`
    account_url: Url,
}

impl ArmClient {
    /// Build a management client for the account described in the
    /// configuration.
    pub fn new(config: &AccountConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let mut account_url = Url::parse(config.arm_endpoint.trim_end_matches('/'))?;
        account_url
            .path_segments_mut()
            .map_err(|_| ReplicateError::Config("arm_endpoint is not a base URL".into()))?
            .extend([
                "subscriptions",
                config.subscription_id.as_str(),
                "resourceGroups",
                config.resource_group.as_str(),
                "providers",
                "Microsoft.Media",
                "mediaServices",
                config.account_name.as_str(),
            ]);

        Ok(Self {
            tokens: TokenProvider::new(http.clone(), config),
            http,
            account_url,
        })
    }

    /// Verify credentials and account visibility with a single GET of the
    /// media account resource.
    pub async fn check_access(&self) -> Result<()> {
        let mut url = self.account_url.clone();
        url.set_query(Some(&format!("api-version={}", API_VERSION)));
        let response = self.request(reqwest::Method::GET, url).await?.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }

    fn collection_url(&self, segments: &[&str]) -> Url {
        let mut url = self.account_url.clone();
        // account_url is always a valid https base, so segments can't fail.
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    async fn request(&self, method: reqwest::Method, url: Url) -> Result<reqwest::RequestBuilder> {
        let token = self.tokens.token().await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let response = self.request(reqwest::Method::GET, url).await?.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn put_json<T: DeserializeOwned>(&self, url: Url, body: &serde_json::Value) -> Result<T> {
        let response = self
            .request(reqwest::Method::PUT, url)
            .await?
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn post_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .request(reqwest::Method::POST, url)
            .await?
            .header("Content-Length", "0")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn fetch_page<T: DeserializeOwned>(&self, url: Url) -> Result<ArmPage<T>> {
        let response = self.request(reqwest::Method::GET, url).await?.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.json().await?)
    }

    fn kind_client<T>(&self, kind: &'static str, segments: &[&str]) -> ResourceClient<'_, T> {
        ResourceClient {
            client: self,
            kind,
            collection: self.collection_url(segments),
            _marker: PhantomData,
        }
    }

    pub fn assets(&self) -> ResourceClient<'_, Asset> {
        self.kind_client("asset", &["assets"])
    }

    pub fn asset_filters(&self, asset_name: &str) -> ResourceClient<'_, AssetFilter> {
        self.kind_client("asset filter", &["assets", asset_name, "assetFilters"])
    }

    pub fn account_filters(&self) -> ResourceClient<'_, AccountFilter> {
        self.kind_client("account filter", &["accountFilters"])
    }

    pub fn content_key_policies(&self) -> ResourceClient<'_, ContentKeyPolicy> {
        self.kind_client("content key policy", &["contentKeyPolicies"])
    }

    pub fn transforms(&self) -> ResourceClient<'_, Transform> {
        self.kind_client("transform", &["transforms"])
    }

    pub fn streaming_endpoints(&self) -> ResourceClient<'_, StreamingEndpoint> {
        self.kind_client("streaming endpoint", &["streamingEndpoints"])
    }

    pub fn streaming_locators(&self) -> ResourceClient<'_, StreamingLocator> {
        self.kind_client("streaming locator", &["streamingLocators"])
    }

    pub fn live_events(&self) -> ResourceClient<'_, LiveEvent> {
        self.kind_client("live event", &["liveEvents"])
    }

    pub fn live_outputs(&self, event_name: &str) -> ResourceClient<'_, LiveOutput> {
        self.kind_client("live output", &["liveEvents", event_name, "liveOutputs"])
    }

    /// Fetch a content-key policy's properties through the secret-bearing
    /// endpoint; the plain listing strips key material.
    pub async fn policy_properties_with_secrets(
        &self,
        policy_name: &str,
    ) -> Result<ContentKeyPolicyProperties> {
        let mut url =
            self.collection_url(&["contentKeyPolicies", policy_name, "getPolicyPropertiesWithSecrets"]);
        url.set_query(Some(&format!("api-version={}", API_VERSION)));
        self.post_json(url).await
    }
}

async fn api_error(response: reqwest::Response) -> ReplicateError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let detail = serde_json::from_str::<ArmErrorBody>(&body)
        .ok()
        .and_then(|b| b.error);

    let (code, message) = match detail {
        Some(detail) => (
            detail.code.unwrap_or_else(|| "Unknown".into()),
            detail.message.unwrap_or_default(),
        ),
        None => {
            let mut body = body;
            body.truncate(512);
            ("Unknown".into(), body)
        }
    };

    ReplicateError::Api {
        status,
        code,
        message,
    }
}

/// Generic {List, Get, Create} client for one resource kind.
pub struct ResourceClient<'c, T> {
    client: &'c ArmClient,
    kind: &'static str,
    collection: Url,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceClient<'_, T> {
    fn item_url(&self, name: &str) -> Url {
        let mut url = self.collection.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.push(name);
        }
        url.set_query(Some(&format!("api-version={}", API_VERSION)));
        url
    }
}

#[async_trait]
impl<T> ResourceOperations for ResourceClient<'_, T>
where
    T: NamedResource + Serialize + DeserializeOwned + Send + Sync,
{
    type Resource = T;

    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<Page<T>> {
        let url = match cursor {
            // The continuation cursor is a complete URL handed back by the
            // service.
            Some(next) => Url::parse(next)?,
            None => {
                let mut url = self.collection.clone();
                url.set_query(Some(&format!("api-version={}", API_VERSION)));
                url
            }
        };

        let page: ArmPage<T> = self.client.fetch_page(url).await?;
        Ok(Page {
            items: page.value,
            next: page.next_link,
        })
    }

    async fn get(&self, name: &str) -> Result<Option<T>> {
        self.client.get_json(self.item_url(name)).await
    }

    async fn create(&self, name: &str, resource: &T) -> Result<T> {
        debug!(kind = self.kind, name, "creating resource");
        let body = creation_body(resource)?;
        self.client.put_json(self.item_url(name), &body).await
    }
}

/// Content-key policy operations whose reads return the secret-bearing
/// properties. The plain listing strips key material, so mirroring from it
/// would replicate gutted policies.
pub struct ContentKeyPolicyOperations<'c> {
    inner: ResourceClient<'c, ContentKeyPolicy>,
}

impl ArmClient {
    /// Policy operations suitable for mirroring (reads carry secrets).
    pub fn content_key_policies_with_secrets(&self) -> ContentKeyPolicyOperations<'_> {
        ContentKeyPolicyOperations {
            inner: self.content_key_policies(),
        }
    }
}

#[async_trait]
impl ResourceOperations for ContentKeyPolicyOperations<'_> {
    type Resource = ContentKeyPolicy;

    fn kind(&self) -> &'static str {
        self.inner.kind
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<Page<ContentKeyPolicy>> {
        let mut page = self.inner.list_page(cursor).await?;
        for policy in &mut page.items {
            policy.properties = self
                .inner
                .client
                .policy_properties_with_secrets(&policy.name)
                .await?;
        }
        Ok(page)
    }

    async fn get(&self, name: &str) -> Result<Option<ContentKeyPolicy>> {
        let Some(mut policy) = self.inner.get(name).await? else {
            return Ok(None);
        };
        policy.properties = self
            .inner
            .client
            .policy_properties_with_secrets(name)
            .await?;
        Ok(Some(policy))
    }

    async fn create(&self, name: &str, resource: &ContentKeyPolicy) -> Result<ContentKeyPolicy> {
        self.inner.create(name, resource).await
    }
}

/// Serialize a resource for a create request, stripping the read-only
/// envelope fields the service assigns itself.
fn creation_body<T: Serialize>(resource: &T) -> Result<serde_json::Value> {
    let mut body = serde_json::to_value(resource)?;
    if let Some(object) = body.as_object_mut() {
        for read_only in ["name", "id", "type", "systemData"] {
            object.remove(read_only);
        }
    }
    Ok(body)
}
