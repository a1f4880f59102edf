//! Tier × category quota table
//!
//! The table is static configuration supplied at startup (or the built-in
//! defaults). Lookup never fails: an unknown tier degrades to basic limits
//! and a category missing from a tier's table degrades to the built-in
//! conservative default. Configuration gaps therefore fail closed — a more
//! restrictive limit — instead of silently granting unlimited traffic.

use super::category::EndpointCategory;
use super::license::LicenseTier;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Limit applied when neither the tier nor the built-in defaults know the
/// category.
const CONSERVATIVE_LIMIT: u32 = 10;
const DEFAULT_WINDOW_SECS: u64 = 60;

/// Request budget for one (tier, category) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Quota {
    /// Requests admitted per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Quota {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Quota { limit, window_secs }
    }

    /// The fallback quota for configuration gaps.
    pub fn conservative() -> Self {
        Quota::new(CONSERVATIVE_LIMIT, DEFAULT_WINDOW_SECS)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("quota for {scope} must have a positive limit and window")]
pub struct InvalidQuota {
    scope: String,
}

/// Static tier → category → quota configuration.
///
/// Deserializable so operators can supply the table as JSON:
///
/// ```json
/// {
///   "tiers": {
///     "basic": { "auth": { "limit": 5, "window_secs": 60 } }
///   },
///   "default_quota": { "limit": 10, "window_secs": 60 }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaTable {
    tiers: HashMap<LicenseTier, HashMap<EndpointCategory, Quota>>,
    /// Tier applied when the claimed tier is not in the table.
    #[serde(default = "default_tier")]
    default_tier: LicenseTier,
    /// Applied when a category is missing from the effective tier's table.
    #[serde(default = "Quota::conservative")]
    default_quota: Quota,
}

fn default_tier() -> LicenseTier {
    LicenseTier::Basic
}

impl QuotaTable {
    pub fn new(
        tiers: HashMap<LicenseTier, HashMap<EndpointCategory, Quota>>,
        default_quota: Quota,
    ) -> Self {
        QuotaTable {
            tiers,
            default_tier: default_tier(),
            default_quota,
        }
    }

    /// Replace the fallback tier for unrecognized tier claims.
    pub fn with_default_tier(mut self, tier: LicenseTier) -> Self {
        self.default_tier = tier;
        self
    }

    /// Look up the quota for a tier and category.
    ///
    /// Unknown tiers degrade to the default tier (basic unless configured
    /// otherwise); categories absent from the effective tier degrade to the
    /// conservative default. Both degradations log at WARN and keep
    /// serving.
    pub fn lookup(&self, tier: LicenseTier, category: EndpointCategory) -> Quota {
        let effective_tier = if self.tiers.contains_key(&tier) {
            tier
        } else {
            tracing::warn!(
                tier = tier.as_str(),
                fallback = self.default_tier.as_str(),
                "license tier not in quota table, falling back to default tier limits"
            );
            self.default_tier
        };

        match self
            .tiers
            .get(&effective_tier)
            .and_then(|limits| limits.get(&category))
        {
            Some(quota) => *quota,
            None => {
                tracing::warn!(
                    tier = effective_tier.as_str(),
                    category = category.as_str(),
                    limit = self.default_quota.limit,
                    "no quota configured, applying conservative default"
                );
                self.default_quota
            }
        }
    }

    /// Reject tables carrying zero limits or zero-length windows.
    pub fn validate(&self) -> Result<(), InvalidQuota> {
        if self.default_quota.limit == 0 || self.default_quota.window_secs == 0 {
            return Err(InvalidQuota {
                scope: "default".to_string(),
            });
        }
        for (tier, limits) in &self.tiers {
            for (category, quota) in limits {
                if quota.limit == 0 || quota.window_secs == 0 {
                    return Err(InvalidQuota {
                        scope: format!("{}/{}", tier.as_str(), category.as_str()),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for QuotaTable {
    /// Built-in per-minute limits for the sync API.
    fn default() -> Self {
        use EndpointCategory::*;

        let basic = HashMap::from([
            (Auth, Quota::new(5, 60)),
            (Workspace, Quota::new(10, 60)),
            (Member, Quota::new(10, 60)),
            (File, Quota::new(100, 60)),
            (Annotation, Quota::new(1000, 60)),
            (Location, Quota::new(100, 60)),
        ]);

        let premium = HashMap::from([
            (Auth, Quota::new(10, 60)),
            (Workspace, Quota::new(100, 60)),
            (Member, Quota::new(100, 60)),
            (File, Quota::new(500, 60)),
            (Annotation, Quota::new(5000, 60)),
            (Location, Quota::new(500, 60)),
        ]);

        QuotaTable {
            tiers: HashMap::from([
                (LicenseTier::Basic, basic),
                (LicenseTier::Premium, premium),
            ]),
            default_tier: default_tier(),
            default_quota: Quota::conservative(),
        }
    }
}
