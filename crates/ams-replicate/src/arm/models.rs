//! Wire models for the mirrored resource kinds.
//!
//! Only the fields the engine reads or rewrites are typed; everything else
//! rides through a flattened passthrough map so provider fields this tool
//! has never heard of still mirror verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::NamedResource;

macro_rules! named_resource {
    ($($ty:ty),* $(,)?) => {
        $(impl NamedResource for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

named_resource!(
    Asset,
    AssetFilter,
    AccountFilter,
    ContentKeyPolicy,
    Transform,
    StreamingEndpoint,
    StreamingLocator,
    LiveEvent,
    LiveOutput,
);

/// A media asset backed by one storage container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(default)]
    pub properties: AssetProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Server-assigned container name. May be absent on a create response,
    /// which is why assets are re-fetched after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_account_name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Asset {
    /// The record sent when mirroring this asset: only alternate id and
    /// description carry over; the container is assigned by the destination.
    pub fn creation_record(&self) -> Asset {
        Asset {
            name: self.name.clone(),
            properties: AssetProperties {
                alternate_id: self.properties.alternate_id.clone(),
                description: self.properties.description.clone(),
                container: None,
                storage_account_name: None,
                extra: Map::new(),
            },
        }
    }
}

/// A per-asset filter, mirrored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetFilter {
    pub name: String,
    #[serde(default)]
    pub properties: Value,
}

/// An account-level filter, mirrored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountFilter {
    pub name: String,
    #[serde(default)]
    pub properties: Value,
}

/// A content-key policy. The plain listing omits secret material; the
/// driver swaps in the secret-bearing properties before mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentKeyPolicy {
    pub name: String,
    #[serde(default)]
    pub properties: ContentKeyPolicyProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentKeyPolicyProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub options: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An encoding transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    #[serde(default)]
    pub properties: TransformProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub outputs: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A streaming endpoint (location-bound resource).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingEndpoint {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,

    #[serde(default)]
    pub properties: StreamingEndpointProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingEndpointProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_units: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_set_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cache_age: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_host_names: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_site_access_policies: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A streaming locator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingLocator {
    pub name: String,
    #[serde(default)]
    pub properties: StreamingLocatorProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingLocatorProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_policy_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_content_key_policy_name: Option<String>,

    /// Must be created as null, never as an empty list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_keys: Option<Vec<Value>>,

    /// Must be created as null, never as an empty list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A live event (location-bound resource with nested live outputs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEvent {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,

    #[serde(default)]
    pub properties: LiveEventProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEventProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<LiveEventInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<LiveEventPreview>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcriptions: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_site_access_policies: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_static_hostname: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname_prefix: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEventInput {
    /// Ingest endpoints are assigned by the destination account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<Value>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEventPreview {
    /// The preview locator is assigned by the destination account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_locator: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A live output under a live event, mirrored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveOutput {
    pub name: String,
    #[serde(default)]
    pub properties: Value,
}
