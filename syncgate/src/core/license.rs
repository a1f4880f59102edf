//! License context extraction
//!
//! The upstream authorizer verifies the caller's token and attaches an
//! opaque claims map to the request before it reaches this subsystem. The
//! extractor derives the rate-limit partition key (a pseudonymous license
//! hash, never raw personal data) and the license tier from those claims.
//! A request without a license hash never gets this far legitimately, so
//! extraction failing is a pass-through authentication error, not a rate
//! limiting outcome.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Claim carrying the pseudonymous license key hash.
pub const LICENSE_HASH_CLAIM: &str = "license_key_hash";

/// Claim carrying the license tier name.
pub const LICENSE_TIER_CLAIM: &str = "license_tier";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("license key hash missing from identity claims")]
    Unauthenticated,
}

/// Verified identity claims handed over by the upstream authorizer.
///
/// Opaque to this subsystem beyond the two license claims; unknown entries
/// are carried but ignored.
#[derive(Debug, Clone, Default)]
pub struct Claims(HashMap<String, String>);

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for Claims {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Claims(iter.into_iter().collect())
    }
}

/// License tier derived from the tier claim.
///
/// Unrecognized tier names parse to [`Unknown`](LicenseTier::Unknown) and
/// degrade to basic limits at quota lookup; they never fail the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    Basic,
    Premium,
    #[serde(other)]
    Unknown,
}

impl LicenseTier {
    pub fn parse(s: &str) -> LicenseTier {
        match s {
            "basic" => LicenseTier::Basic,
            "premium" => LicenseTier::Premium,
            _ => LicenseTier::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseTier::Basic => "basic",
            LicenseTier::Premium => "premium",
            LicenseTier::Unknown => "unknown",
        }
    }
}

/// Per-request license identity: the rate-limit partition key and tier.
///
/// Derived from claims on every request, never persisted by this subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseContext {
    pub license_hash: String,
    pub tier: LicenseTier,
}

impl LicenseContext {
    /// Derive the license context from the authorizer's claims map.
    ///
    /// A missing or empty license hash claim means the authorizer never ran
    /// for this request; the caller must reject it rather than rate-limit
    /// it. A missing tier claim is [`LicenseTier::Unknown`].
    pub fn from_claims(claims: &Claims) -> Result<LicenseContext, AuthError> {
        let license_hash = match claims.get(LICENSE_HASH_CLAIM) {
            Some(hash) if !hash.is_empty() => hash.to_string(),
            _ => return Err(AuthError::Unauthenticated),
        };

        let tier = claims
            .get(LICENSE_TIER_CLAIM)
            .map(LicenseTier::parse)
            .unwrap_or(LicenseTier::Unknown);

        Ok(LicenseContext { license_hash, tier })
    }

    /// Truncated hash for log lines; the full hash stays out of logs.
    pub fn hash_prefix(&self) -> String {
        truncate_hash(&self.license_hash)
    }
}

pub(crate) fn truncate_hash(hash: &str) -> String {
    match hash.get(..8) {
        Some(prefix) => format!("{prefix}..."),
        None => hash.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(entries: &[(&str, &str)]) -> Claims {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extracts_hash_and_tier() {
        let claims = claims(&[
            (LICENSE_HASH_CLAIM, "sha256:9f86d081884c7d65"),
            (LICENSE_TIER_CLAIM, "premium"),
        ]);

        let ctx = LicenseContext::from_claims(&claims).unwrap();
        assert_eq!(ctx.license_hash, "sha256:9f86d081884c7d65");
        assert_eq!(ctx.tier, LicenseTier::Premium);
    }

    #[test]
    fn test_missing_hash_is_unauthenticated() {
        let claims = claims(&[(LICENSE_TIER_CLAIM, "basic")]);
        assert_eq!(
            LicenseContext::from_claims(&claims),
            Err(AuthError::Unauthenticated)
        );
    }

    #[test]
    fn test_empty_hash_is_unauthenticated() {
        let claims = claims(&[(LICENSE_HASH_CLAIM, "")]);
        assert_eq!(
            LicenseContext::from_claims(&claims),
            Err(AuthError::Unauthenticated)
        );
    }

    #[test]
    fn test_missing_tier_is_unknown() {
        let claims = claims(&[(LICENSE_HASH_CLAIM, "sha256:abc123def456")]);
        let ctx = LicenseContext::from_claims(&claims).unwrap();
        assert_eq!(ctx.tier, LicenseTier::Unknown);
    }

    #[test]
    fn test_unrecognized_tier_is_unknown() {
        assert_eq!(LicenseTier::parse("enterprise"), LicenseTier::Unknown);
        assert_eq!(LicenseTier::parse("Premium"), LicenseTier::Unknown);
        assert_eq!(LicenseTier::parse("basic"), LicenseTier::Basic);
    }

    #[test]
    fn test_hash_prefix_truncates() {
        let ctx = LicenseContext {
            license_hash: "sha256:9f86d081884c7d65".to_string(),
            tier: LicenseTier::Basic,
        };
        assert_eq!(ctx.hash_prefix(), "sha256:9...");

        let short = LicenseContext {
            license_hash: "abc".to_string(),
            tier: LicenseTier::Basic,
        };
        assert_eq!(short.hash_prefix(), "abc");
    }
}
