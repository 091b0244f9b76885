use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::seat::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShowtimeId(String);

impl ShowtimeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShowtimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Showtime data supplied by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: ShowtimeId,
    pub movie_id: String,
    pub theater_id: String,
    pub starts_at: DateTime<Utc>,
}

/// Unit price per tier, in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPriceTable {
    pub regular: u64,
    pub premium: u64,
    pub vip: u64,
}

impl TierPriceTable {
    pub fn price(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Regular => self.regular,
            Tier::Premium => self.premium,
            Tier::Vip => self.vip,
        }
    }
}

impl Default for TierPriceTable {
    fn default() -> Self {
        Self { regular: 150, premium: 250, vip: 400 }
    }
}
