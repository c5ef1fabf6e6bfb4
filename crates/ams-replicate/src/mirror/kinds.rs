//! Per-kind mirror rewrites.
//!
//! Each resource kind carries its record to the destination verbatim except
//! for an explicit, named list of fields the destination assigns itself (or
//! that must be remapped to the destination's environment). Those lists are
//! the constants below; the `prepare_*` functions apply them.

use serde_json::Map;

use crate::arm::models::{
    ContentKeyPolicy, ContentKeyPolicyProperties, LiveEvent, StreamingEndpoint,
    StreamingEndpointProperties, StreamingLocator, StreamingLocatorProperties, Transform,
    TransformProperties,
};
use crate::error::Result;

/// Streaming endpoint fields the destination assigns itself; `location` is
/// additionally remapped to the destination account's region.
pub const STREAMING_ENDPOINT_FIELDS_NOT_CARRIED: &[&str] = &[
    "hostName",
    "provisioningState",
    "resourceState",
    "freeTrialEndTime",
    "created",
    "lastModified",
];

/// Streaming locator fields the destination assigns itself.
pub const STREAMING_LOCATOR_FIELDS_NOT_CARRIED: &[&str] = &["streamingLocatorId", "created"];

/// Live event fields cleared on create; `location` is remapped to the
/// destination account's region.
pub const LIVE_EVENT_FIELDS_NOT_CARRIED: &[&str] = &[
    "input.endpoints",
    "preview.previewLocator",
    "provisioningState",
    "resourceState",
    "created",
    "lastModified",
];

/// Identity rewrite for kinds mirrored verbatim (account filters, asset
/// filters, live outputs).
pub fn prepare_verbatim<T: Clone>(resource: &T) -> Result<T> {
    Ok(resource.clone())
}

/// Carry options and description; everything else (policy id, timestamps)
/// is destination-assigned.
pub fn prepare_content_key_policy(policy: &ContentKeyPolicy) -> ContentKeyPolicy {
    ContentKeyPolicy {
        name: policy.name.clone(),
        properties: ContentKeyPolicyProperties {
            description: policy.properties.description.clone(),
            options: policy.properties.options.clone(),
            extra: Map::new(),
        },
    }
}

/// Carry outputs and description.
pub fn prepare_transform(transform: &Transform) -> Transform {
    Transform {
        name: transform.name.clone(),
        properties: TransformProperties {
            description: transform.properties.description.clone(),
            outputs: transform.properties.outputs.clone(),
            extra: Map::new(),
        },
    }
}

/// Carry the documented field set and replace the location with the
/// destination account's region. See
/// [`STREAMING_ENDPOINT_FIELDS_NOT_CARRIED`].
pub fn prepare_streaming_endpoint(
    endpoint: &StreamingEndpoint,
    destination_location: &str,
) -> StreamingEndpoint {
    let source = &endpoint.properties;
    StreamingEndpoint {
        name: endpoint.name.clone(),
        location: Some(destination_location.to_string()),
        tags: endpoint.tags.clone(),
        properties: StreamingEndpointProperties {
            description: source.description.clone(),
            scale_units: source.scale_units,
            availability_set_name: source.availability_set_name.clone(),
            access_control: source.access_control.clone(),
            max_cache_age: source.max_cache_age,
            custom_host_names: source.custom_host_names.clone(),
            cdn_enabled: source.cdn_enabled,
            cdn_provider: source.cdn_provider.clone(),
            cdn_profile: source.cdn_profile.clone(),
            cross_site_access_policies: source.cross_site_access_policies.clone(),
            extra: Map::new(),
        },
    }
}

/// Carry the locator's referenced names and time window. Empty content-key
/// and filter lists become null, never empty lists. See
/// [`STREAMING_LOCATOR_FIELDS_NOT_CARRIED`].
pub fn prepare_streaming_locator(locator: &StreamingLocator) -> StreamingLocator {
    let source = &locator.properties;
    StreamingLocator {
        name: locator.name.clone(),
        properties: StreamingLocatorProperties {
            asset_name: source.asset_name.clone(),
            streaming_policy_name: source.streaming_policy_name.clone(),
            start_time: source.start_time.clone(),
            end_time: source.end_time.clone(),
            default_content_key_policy_name: source.default_content_key_policy_name.clone(),
            content_keys: drop_if_empty(source.content_keys.clone()),
            filters: drop_if_empty(source.filters.clone()),
            extra: Map::new(),
        },
    }
}

/// Carry the event definition, clear the destination-assigned ingest
/// endpoints and preview locator, and remap the location. See
/// [`LIVE_EVENT_FIELDS_NOT_CARRIED`].
pub fn prepare_live_event(event: &LiveEvent, destination_location: &str) -> LiveEvent {
    let mut properties = event.properties.clone();
    properties.extra = Map::new();

    if let Some(input) = properties.input.as_mut() {
        input.endpoints = None;
    }
    if let Some(preview) = properties.preview.as_mut() {
        preview.preview_locator = None;
    }

    LiveEvent {
        name: event.name.clone(),
        location: Some(destination_location.to_string()),
        tags: event.tags.clone(),
        properties,
    }
}

fn drop_if_empty<T>(list: Option<Vec<T>>) -> Option<Vec<T>> {
    list.filter(|values| !values.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_empty_lists_become_null() {
        let locator: StreamingLocator = serde_json::from_value(serde_json::json!({
            "name": "loc-1",
            "properties": {
                "assetName": "asset-1",
                "streamingPolicyName": "Predefined_ClearStreamingOnly",
                "contentKeys": [],
                "filters": [],
                "streamingLocatorId": "11112222",
                "created": "2023-01-01T00:00:00Z"
            }
        }))
        .unwrap();

        let prepared = prepare_streaming_locator(&locator);
        assert!(prepared.properties.content_keys.is_none());
        assert!(prepared.properties.filters.is_none());

        let json = serde_json::to_value(&prepared).unwrap();
        let properties = json["properties"].as_object().unwrap();
        assert!(!properties.contains_key("contentKeys"));
        assert!(!properties.contains_key("filters"));
        for field in STREAMING_LOCATOR_FIELDS_NOT_CARRIED {
            assert!(!properties.contains_key(*field), "carried {}", field);
        }
    }

    #[test]
    fn test_locator_populated_lists_carried() {
        let locator: StreamingLocator = serde_json::from_value(serde_json::json!({
            "name": "loc-2",
            "properties": {
                "assetName": "asset-2",
                "contentKeys": [{"id": "k1"}],
                "filters": ["f1"]
            }
        }))
        .unwrap();

        let prepared = prepare_streaming_locator(&locator);
        assert_eq!(prepared.properties.content_keys.as_ref().unwrap().len(), 1);
        assert_eq!(
            prepared.properties.filters.as_deref(),
            Some(&["f1".to_string()][..])
        );
    }

    #[test]
    fn test_streaming_endpoint_rewrite() {
        let endpoint: StreamingEndpoint = serde_json::from_value(serde_json::json!({
            "name": "default",
            "location": "westeurope",
            "tags": {"env": "prod"},
            "properties": {
                "description": "origin",
                "scaleUnits": 2,
                "cdnEnabled": true,
                "cdnProvider": "StandardVerizon",
                "hostName": "default-mediasrc.streaming.media.azure.net",
                "provisioningState": "Succeeded",
                "resourceState": "Running"
            }
        }))
        .unwrap();

        let prepared = prepare_streaming_endpoint(&endpoint, "northeurope");
        assert_eq!(prepared.location.as_deref(), Some("northeurope"));
        assert_eq!(prepared.properties.scale_units, Some(2));
        assert_eq!(prepared.properties.cdn_enabled, Some(true));
        assert_eq!(prepared.tags.as_ref().unwrap()["env"], "prod");

        let json = serde_json::to_value(&prepared).unwrap();
        let properties = json["properties"].as_object().unwrap();
        for field in STREAMING_ENDPOINT_FIELDS_NOT_CARRIED {
            assert!(!properties.contains_key(*field), "carried {}", field);
        }
    }

    #[test]
    fn test_live_event_rewrite() {
        let event: LiveEvent = serde_json::from_value(serde_json::json!({
            "name": "event-1",
            "location": "westeurope",
            "properties": {
                "description": "live",
                "useStaticHostname": true,
                "hostnamePrefix": "show",
                "streamOptions": ["LowLatency"],
                "input": {
                    "streamingProtocol": "RTMP",
                    "keyFrameIntervalDuration": "PT2S",
                    "endpoints": [{"protocol": "RTMP", "url": "rtmp://source-ingest"}]
                },
                "preview": {
                    "previewLocator": "99990000",
                    "endpoints": [{"protocol": "FragmentedMP4", "url": "https://preview"}]
                },
                "resourceState": "Stopped"
            }
        }))
        .unwrap();

        let prepared = prepare_live_event(&event, "northeurope");
        assert_eq!(prepared.location.as_deref(), Some("northeurope"));

        let input = prepared.properties.input.as_ref().unwrap();
        assert!(input.endpoints.is_none());
        // The rest of the input definition is carried.
        assert_eq!(input.extra["streamingProtocol"], "RTMP");
        assert_eq!(input.extra["keyFrameIntervalDuration"], "PT2S");

        let preview = prepared.properties.preview.as_ref().unwrap();
        assert!(preview.preview_locator.is_none());
        assert!(preview.extra.contains_key("endpoints"));

        assert_eq!(prepared.properties.use_static_hostname, Some(true));
        assert_eq!(prepared.properties.hostname_prefix.as_deref(), Some("show"));
        assert!(!prepared.properties.extra.contains_key("resourceState"));
    }

    #[test]
    fn test_transform_and_policy_subsets() {
        let transform: Transform = serde_json::from_value(serde_json::json!({
            "name": "encode",
            "properties": {
                "description": "adaptive",
                "outputs": [{"preset": {"@odata.type": "#Microsoft.Media.BuiltInStandardEncoderPreset"}}],
                "created": "2023-01-01T00:00:00Z"
            }
        }))
        .unwrap();
        let prepared = prepare_transform(&transform);
        assert_eq!(prepared.properties.outputs.len(), 1);
        assert!(prepared.properties.extra.is_empty());

        let policy: ContentKeyPolicy = serde_json::from_value(serde_json::json!({
            "name": "drm",
            "properties": {
                "description": "widevine",
                "options": [{"name": "option1"}],
                "policyId": "aaaa-bbbb"
            }
        }))
        .unwrap();
        let prepared = prepare_content_key_policy(&policy);
        assert_eq!(prepared.properties.options.len(), 1);
        assert!(prepared.properties.extra.is_empty());
    }
}
