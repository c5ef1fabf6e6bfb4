//! Service SAS minting, signed locally with the storage account key.
//!
//! Every storage request this tool makes (its own listing/upload/copy calls
//! as well as the URLs handed to the copy service and the external bulk-copy
//! tool) authenticates with a short-lived SAS minted here. Tokens are always
//! scoped to a single container or blob, carry the minimum permission set
//! the operation needs, and expire within hours (at most one day).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use url::form_urlencoded;

use crate::core::SasPermissions;
use crate::error::{ReplicateError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Storage service version the string-to-sign is built against.
pub const SAS_VERSION: &str = "2021-08-06";

/// Start time is backdated to tolerate clock skew between this host and the
/// service.
const CLOCK_SKEW_MINUTES: i64 = 5;

/// The storage resource a token is scoped to.
#[derive(Debug, Clone, Copy)]
pub struct SasScope<'a> {
    pub account: &'a str,
    pub container: &'a str,
    /// `None` scopes the token to the whole container.
    pub blob: Option<&'a str>,
}

impl SasScope<'_> {
    fn signed_resource(&self) -> &'static str {
        if self.blob.is_some() {
            "b"
        } else {
            "c"
        }
    }

    fn canonicalized_resource(&self) -> String {
        match self.blob {
            Some(blob) => format!("/blob/{}/{}/{}", self.account, self.container, blob),
            None => format!("/blob/{}/{}", self.account, self.container),
        }
    }
}

/// Mint a service SAS query string for the given scope.
pub fn generate(
    account_key_base64: &str,
    scope: &SasScope<'_>,
    permissions: SasPermissions,
    expires_in: Duration,
) -> Result<String> {
    generate_at(account_key_base64, scope, permissions, expires_in, Utc::now())
}

/// Mint a service SAS with an explicit "now" (deterministic for tests).
pub fn generate_at(
    account_key_base64: &str,
    scope: &SasScope<'_>,
    permissions: SasPermissions,
    expires_in: Duration,
    now: DateTime<Utc>,
) -> Result<String> {
    if expires_in > Duration::from_secs(24 * 60 * 60) {
        return Err(ReplicateError::Sas(format!(
            "SAS expiry {}s exceeds the 1 day bound",
            expires_in.as_secs()
        )));
    }

    let permissions = permissions.to_permission_string();
    if permissions.is_empty() {
        return Err(ReplicateError::Sas("empty SAS permission set".into()));
    }

    let start = format_time(now - chrono::Duration::minutes(CLOCK_SKEW_MINUTES));
    let expiry = now
        + chrono::Duration::from_std(expires_in)
            .map_err(|e| ReplicateError::Sas(format!("invalid expiry: {}", e)))?;
    let expiry = format_time(expiry);

    // Field order is fixed by the service for this signed version:
    // sp, st, se, canonicalized resource, identifier, IP, protocol, version,
    // resource, snapshot time, encryption scope, then the five response
    // header overrides.
    let string_to_sign = format!(
        "{sp}\n{st}\n{se}\n{resource}\n\n\n{spr}\n{sv}\n{sr}\n\n\n\n\n\n\n",
        sp = permissions,
        st = start,
        se = expiry,
        resource = scope.canonicalized_resource(),
        spr = "https",
        sv = SAS_VERSION,
        sr = scope.signed_resource(),
    );

    let key = BASE64
        .decode(account_key_base64)
        .map_err(|e| ReplicateError::Sas(format!("invalid account key: {}", e)))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| ReplicateError::Sas(format!("failed to create HMAC: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("sv", SAS_VERSION)
        .append_pair("spr", "https")
        .append_pair("st", &start)
        .append_pair("se", &expiry)
        .append_pair("sr", scope.signed_resource())
        .append_pair("sp", &permissions)
        .append_pair("sig", &signature)
        .finish();

    Ok(query)
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    const TEST_KEY: &str = "c2VjcmV0LWFjY291bnQta2V5"; // base64("secret-account-key")

    fn scope<'a>() -> SasScope<'a> {
        SasScope {
            account: "mediastorage",
            container: "asset-abc123",
            blob: None,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn query_map(query: &str) -> HashMap<String, String> {
        form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_container_token_fields() {
        let query = generate_at(
            TEST_KEY,
            &scope(),
            SasPermissions::read_list(),
            Duration::from_secs(3600),
            fixed_now(),
        )
        .unwrap();

        let params = query_map(&query);
        assert_eq!(params["sv"], SAS_VERSION);
        assert_eq!(params["spr"], "https");
        assert_eq!(params["sr"], "c");
        assert_eq!(params["sp"], "rl");
        assert_eq!(params["st"], "2024-03-01T11:55:00Z");
        assert_eq!(params["se"], "2024-03-01T13:00:00Z");
        assert!(!params["sig"].is_empty());
    }

    #[test]
    fn test_blob_token_resource() {
        let blob_scope = SasScope {
            blob: Some("video/segment0.ts"),
            ..scope()
        };
        let query = generate_at(
            TEST_KEY,
            &blob_scope,
            SasPermissions::read_list(),
            Duration::from_secs(3600),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(query_map(&query)["sr"], "b");
    }

    #[test]
    fn test_signature_is_deterministic_and_scope_sensitive() {
        let args = (
            SasPermissions::read_list(),
            Duration::from_secs(3600),
            fixed_now(),
        );
        let a = generate_at(TEST_KEY, &scope(), args.0, args.1, args.2).unwrap();
        let b = generate_at(TEST_KEY, &scope(), args.0, args.1, args.2).unwrap();
        assert_eq!(a, b);

        let other_scope = SasScope {
            container: "asset-other",
            ..scope()
        };
        let c = generate_at(TEST_KEY, &other_scope, args.0, args.1, args.2).unwrap();
        assert_ne!(query_map(&a)["sig"], query_map(&c)["sig"]);
    }

    #[test]
    fn test_expiry_bound_enforced() {
        let result = generate_at(
            TEST_KEY,
            &scope(),
            SasPermissions::read_list(),
            Duration::from_secs(25 * 60 * 60),
            fixed_now(),
        );
        assert!(matches!(result, Err(ReplicateError::Sas(_))));
    }

    #[test]
    fn test_empty_permissions_rejected() {
        let result = generate_at(
            TEST_KEY,
            &scope(),
            SasPermissions::default(),
            Duration::from_secs(3600),
            fixed_now(),
        );
        assert!(matches!(result, Err(ReplicateError::Sas(_))));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let result = generate_at(
            "not-base64!!!",
            &scope(),
            SasPermissions::read_list(),
            Duration::from_secs(3600),
            fixed_now(),
        );
        assert!(matches!(result, Err(ReplicateError::Sas(_))));
    }

    #[test]
    fn test_signature_is_url_safe_in_query() {
        // Raw base64 signatures contain '+', '/' and '='; the rendered query
        // string must carry them percent-encoded.
        let query = generate_at(
            TEST_KEY,
            &scope(),
            SasPermissions::read_list(),
            Duration::from_secs(3600),
            fixed_now(),
        )
        .unwrap();
        let sig_raw = query.split("sig=").nth(1).unwrap();
        assert!(!sig_raw.contains('+'));
        assert!(!sig_raw.contains('/'));
    }
}
