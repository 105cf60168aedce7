//! Plan catalog types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ParseEnumError;

/// Billing cadence of a known plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanSlug {
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "quarterly")]
    Quarterly,
    #[serde(rename = "half-yearly")]
    HalfYearly,
    #[serde(rename = "annual")]
    Annual,
}

impl PlanSlug {
    pub const ALL: [Self; 4] = [Self::Monthly, Self::Quarterly, Self::HalfYearly, Self::Annual];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::HalfYearly => "half-yearly",
            Self::Annual => "annual",
        }
    }

    /// Number of months one payment covers (used to normalize price to a monthly rate)
    pub const fn months(&self) -> i64 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::HalfYearly => 6,
            Self::Annual => 12,
        }
    }
}

impl std::fmt::Display for PlanSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanSlug {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "half-yearly" => Ok(Self::HalfYearly),
            "annual" => Ok(Self::Annual),
            other => Err(ParseEnumError::new("plan slug", other)),
        }
    }
}

/// A purchasable plan. Immutable reference data looked up by id or slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    /// Catalog slug; not every stored slug maps to a [`PlanSlug`]
    pub slug: String,
    pub name: String,
    /// Price in paise
    pub price_paise: i64,
    pub duration_days: i32,
    /// Feature map as stored in the catalog (feature slug -> limit/flag)
    pub features: serde_json::Value,
    pub is_active: bool,
}

impl Plan {
    /// Known cadence for this plan, if its slug is one of the standard ones
    pub fn known_slug(&self) -> Option<PlanSlug> {
        self.slug.parse().ok()
    }

    /// Price normalized to one month, in (fractional) paise.
    ///
    /// Unknown slugs contribute nothing to recurring revenue.
    pub fn monthly_rate_paise(&self) -> f64 {
        self.known_slug()
            .map_or(0.0, |slug| self.price_paise as f64 / slug.months() as f64)
    }
}
